//! Accept loop for inbound q2q connections
//!
//! Every accepted socket runs the handshake as the daemon's identity. Once the
//! peer is authenticated it is issued a session cookie and greeted with a
//! single line: `welcome <peer> <cookie>`.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;

use common::prelude::{
    IdentityAddress, Q2QTransport, SessionTokenStorage, StoreError, TransportError,
};

use crate::ServiceState;

pub const GREETING: &str = "welcome";

/// Bind `listen_addr` and serve connections until `shutdown_rx` fires
pub async fn run_listener(
    listen_addr: SocketAddr,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), ListenerError> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(ListenerError::Bind)?;
    tracing::info!(addr = %listen_addr, "q2q listener started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::info!("q2q listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("failed to accept connection: {}", e);
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    match serve_connection(socket, &state).await {
                        Ok(peer) => tracing::info!(%remote, %peer, "served q2q peer"),
                        Err(e) => tracing::warn!(%remote, "q2q connection failed: {}", e),
                    }
                });
            }
        }
    }
}

/// Authenticate one connection and greet the peer with a fresh session cookie
pub async fn serve_connection<S>(stream: S, state: &ServiceState) -> Result<IdentityAddress, ListenerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut transport = Q2QTransport::new(stream, state.credentials().clone(), state.trust());

    let limit = state.handshake_timeout();
    match timeout(limit, transport.handshake()).await {
        Ok(result) => result?,
        Err(_) => return Err(ListenerError::HandshakeTimeout(limit)),
    };

    let mut stream = transport.into_authenticated()?;
    let peer = stream.q2q_peer().clone();
    let cookie = state.database().issue_cookie(&peer).await?;

    stream
        .write_all(format!("{} {} {}\n", GREETING, peer, cookie).as_bytes())
        .await?;
    stream.flush().await?;
    Ok(peer)
}

/// Read the greeting line written by [`serve_connection`], returning the
/// identity the daemon saw and the cookie it issued. Anything the peer sent
/// after the line stays buffered in `reader`.
pub async fn read_greeting<R>(
    reader: &mut BufReader<R>,
) -> Result<(IdentityAddress, String), ListenerError>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let mut parts = line.trim_end().split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(GREETING), Some(peer), Some(cookie), None) => {
            let peer = peer
                .parse()
                .map_err(|_| ListenerError::BadGreeting(line.clone()))?;
            Ok((peer, cookie.to_string()))
        }
        _ => Err(ListenerError::BadGreeting(line)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),
    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected greeting: {0:?}")]
    BadGreeting(String),
}
