//! Byte streams whose two ends have proven who they are
//!
//! [`Q2QTransport`] wraps any `AsyncRead + AsyncWrite` stream and runs a
//! symmetric handshake over it:
//!
//! ```text
//!  Connecting --hello sent--> AwaitingPeerCertificate --hello received--> Verifying
//!  Verifying --chain + proof ok--> Authenticated
//!  any state --error or cancel--> Failed
//! ```
//!
//! Each side sends a [`Hello`] carrying its claimed identity, a certificate
//! covering it and a fresh nonce. The peer certificate is checked against the
//! trust store's self-signed certificate for the claimed domain, then each
//! side signs a transcript of both nonces to prove it holds the key.
//!
//! Nothing about the peer is observable until `Authenticated`. A failure
//! closes and drops the stream, and so does dropping an in-flight
//! handshake.

mod codec;
mod messages;

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::certificate::{now_unix, Certificate, CertificateError, PrivateCertificate, Subject};
use crate::identity::IdentityAddress;
use crate::store::{CertificateStorage, StoreError};

pub use codec::{read_message, write_message, MAX_FRAME_SIZE};
pub use messages::{transcript, Hello, Message, Proof, NONCE_SIZE, PROTOCOL_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not authenticated")]
    NotAuthenticated,
    #[error("transport io error: {0}")]
    Io(#[from] io::Error),
    #[error("handshake protocol error: {0}")]
    Codec(String),
    #[error("no trusted certificate for domain {0}")]
    UnknownDomain(String),
    #[error("certificate rejected: {0}")]
    Certificate(#[from] CertificateError),
    #[error("certificate for {subject} does not cover {claimed}")]
    IdentityMismatch {
        claimed: IdentityAddress,
        subject: Subject,
    },
    #[error("peer failed to prove possession of its key")]
    BadProof,
    #[error("trust store error: {0}")]
    Store(#[from] StoreError),
    #[error("handshake was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Connecting,
    AwaitingPeerCertificate,
    Verifying,
    Authenticated,
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Authenticated | HandshakeState::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakeState::Connecting => "connecting",
            HandshakeState::AwaitingPeerCertificate => "awaiting peer certificate",
            HandshakeState::Verifying => "verifying",
            HandshakeState::Authenticated => "authenticated",
            HandshakeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The identity this side claims and the private certificate backing it
#[derive(Debug, Clone)]
pub struct LocalCredentials {
    identity: IdentityAddress,
    certificate: PrivateCertificate,
}

impl LocalCredentials {
    pub fn new(
        identity: IdentityAddress,
        certificate: PrivateCertificate,
    ) -> Result<Self, TransportError> {
        identity.validate().map_err(CertificateError::from)?;
        let subject = certificate.certificate().subject();
        if !subject.covers(&identity) {
            return Err(TransportError::IdentityMismatch {
                claimed: identity,
                subject: subject.clone(),
            });
        }
        Ok(Self {
            identity,
            certificate,
        })
    }

    /// Speak for `identity` with its domain's private certificate
    pub async fn from_store(
        identity: IdentityAddress,
        store: &dyn CertificateStorage,
    ) -> Result<Self, TransportError> {
        let certificate = store.get_private_certificate(identity.domain()).await?;
        Self::new(identity, certificate)
    }

    pub fn identity(&self) -> &IdentityAddress {
        &self.identity
    }

    pub fn certificate(&self) -> &PrivateCertificate {
        &self.certificate
    }
}

#[derive(Debug, Clone)]
struct PeerInfo {
    identity: IdentityAddress,
    certificate: Certificate,
}

/// A stream going through, or done with, the q2q handshake
#[derive(Debug)]
pub struct Q2QTransport<S> {
    stream: Option<S>,
    state: HandshakeState,
    credentials: LocalCredentials,
    trust: Arc<dyn CertificateStorage>,
    peer: Option<PeerInfo>,
    cancelled: bool,
}

impl<S> Q2QTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, credentials: LocalCredentials, trust: Arc<dyn CertificateStorage>) -> Self {
        Self {
            stream: Some(stream),
            state: HandshakeState::Connecting,
            credentials,
            trust,
            peer: None,
            cancelled: false,
        }
    }

    /// Run the handshake to a terminal state
    ///
    /// Returns the authenticated peer identity. On error the transport is
    /// `Failed` and its stream already closed. If the returned future is
    /// dropped before completion the transport is left `Failed` as well.
    pub async fn handshake(&mut self) -> Result<IdentityAddress, TransportError> {
        match self.state {
            HandshakeState::Authenticated => return self.q2q_peer().cloned(),
            HandshakeState::Failed if self.cancelled => return Err(TransportError::Cancelled),
            HandshakeState::Failed => return Err(TransportError::NotAuthenticated),
            _ => {}
        }

        let mut guard = FailOnDrop {
            transport: &mut *self,
            armed: true,
        };
        let result = guard.transport.exchange().await;
        guard.settle(result).await
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == HandshakeState::Authenticated
    }

    /// The local identity, once authenticated
    pub fn q2q_host(&self) -> Result<&IdentityAddress, TransportError> {
        match self.state {
            HandshakeState::Authenticated => Ok(&self.credentials.identity),
            _ => Err(TransportError::NotAuthenticated),
        }
    }

    /// The verified peer identity, once authenticated
    pub fn q2q_peer(&self) -> Result<&IdentityAddress, TransportError> {
        match (&self.state, &self.peer) {
            (HandshakeState::Authenticated, Some(peer)) => Ok(&peer.identity),
            _ => Err(TransportError::NotAuthenticated),
        }
    }

    pub fn peer_certificate(&self) -> Result<&Certificate, TransportError> {
        match (&self.state, &self.peer) {
            (HandshakeState::Authenticated, Some(peer)) => Ok(&peer.certificate),
            _ => Err(TransportError::NotAuthenticated),
        }
    }

    /// Give up the handshake wrapper for the authenticated stream
    pub fn into_authenticated(mut self) -> Result<AuthenticatedStream<S>, TransportError> {
        if self.state != HandshakeState::Authenticated {
            return Err(TransportError::NotAuthenticated);
        }
        match (self.stream.take(), self.peer.take()) {
            (Some(stream), Some(peer)) => Ok(AuthenticatedStream {
                stream,
                host: self.credentials.identity,
                peer: peer.identity,
                peer_certificate: peer.certificate,
            }),
            _ => Err(TransportError::NotAuthenticated),
        }
    }

    async fn exchange(&mut self) -> Result<PeerInfo, TransportError> {
        let Self {
            stream,
            state,
            credentials,
            trust,
            ..
        } = self;
        let stream = stream.as_mut().ok_or(TransportError::Cancelled)?;

        *state = HandshakeState::Connecting;
        let local_nonce = messages::new_nonce();
        let local_certificate = credentials.certificate.certificate();
        let local_fingerprint = local_certificate.fingerprint()?;
        write_message(
            stream,
            &Message::Hello(Hello {
                version: PROTOCOL_VERSION,
                identity: credentials.identity.clone(),
                certificate: local_certificate.clone(),
                nonce: local_nonce,
            }),
        )
        .await?;

        *state = HandshakeState::AwaitingPeerCertificate;
        let hello = match read_message(stream).await? {
            Message::Hello(hello) => hello,
            other => {
                return Err(TransportError::Codec(format!(
                    "expected hello, got {}",
                    other.kind()
                )))
            }
        };
        if hello.version != PROTOCOL_VERSION {
            return Err(TransportError::Codec(format!(
                "unsupported protocol version {}",
                hello.version
            )));
        }
        if hello.nonce == local_nonce {
            return Err(TransportError::BadProof);
        }

        *state = HandshakeState::Verifying;
        tracing::debug!(
            "verifying certificate {} for {}",
            hello.certificate.subject(),
            hello.identity
        );
        verify_peer(&**trust, &hello.identity, &hello.certificate).await?;
        let peer_fingerprint = hello.certificate.fingerprint()?;

        let signature = credentials.certificate.sign(&transcript(
            &credentials.identity,
            &local_fingerprint,
            &local_nonce,
            &hello.nonce,
        ));
        write_message(stream, &Message::Proof(Proof { signature })).await?;

        let proof = match read_message(stream).await? {
            Message::Proof(proof) => proof,
            other => {
                return Err(TransportError::Codec(format!(
                    "expected proof, got {}",
                    other.kind()
                )))
            }
        };
        let expected = transcript(
            &hello.identity,
            &peer_fingerprint,
            &hello.nonce,
            &local_nonce,
        );
        hello
            .certificate
            .public_key()
            .verify(&expected, &proof.signature)
            .map_err(|_| TransportError::BadProof)?;

        Ok(PeerInfo {
            identity: hello.identity,
            certificate: hello.certificate,
        })
    }

    fn fail(&mut self) -> Option<S> {
        self.state = HandshakeState::Failed;
        self.peer = None;
        self.stream.take()
    }

    fn authenticated_stream(&mut self) -> io::Result<&mut S> {
        match (self.state, self.stream.as_mut()) {
            (HandshakeState::Authenticated, Some(stream)) => Ok(stream),
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is not authenticated",
            )),
        }
    }
}

/// Check `certificate` against the trust store's root for `identity`'s domain
async fn verify_peer(
    trust: &dyn CertificateStorage,
    identity: &IdentityAddress,
    certificate: &Certificate,
) -> Result<(), TransportError> {
    identity.validate().map_err(CertificateError::from)?;

    let root = match trust.get_self_signed_certificate(identity.domain()).await {
        Ok(root) => root,
        Err(StoreError::CertificateNotFound(domain)) => {
            return Err(TransportError::UnknownDomain(domain))
        }
        Err(e) => return Err(e.into()),
    };

    if certificate.is_self_signed() {
        certificate.verify_self_signed()?;
        let (found, expected) = (certificate.fingerprint()?, root.fingerprint()?);
        if found != expected {
            return Err(CertificateError::IssuerMismatch {
                expected: expected.to_hex(),
                found: found.to_hex(),
            }
            .into());
        }
    } else {
        certificate.verify_issued_by(&root)?;
    }

    let now = now_unix();
    root.check_validity(now)?;
    certificate.check_validity(now)?;

    if !certificate.subject().covers(identity) {
        return Err(TransportError::IdentityMismatch {
            claimed: identity.clone(),
            subject: certificate.subject().clone(),
        });
    }
    Ok(())
}

/// Leaves the transport `Failed` unless the handshake settles
struct FailOnDrop<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    transport: &'a mut Q2QTransport<S>,
    armed: bool,
}

impl<S> FailOnDrop<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn settle(
        &mut self,
        result: Result<PeerInfo, TransportError>,
    ) -> Result<IdentityAddress, TransportError> {
        match result {
            Ok(peer) => {
                tracing::info!(
                    "authenticated {} as {}",
                    peer.identity,
                    self.transport.credentials.identity
                );
                let identity = peer.identity.clone();
                self.transport.peer = Some(peer);
                self.transport.state = HandshakeState::Authenticated;
                self.armed = false;
                Ok(identity)
            }
            Err(e) => {
                tracing::warn!(
                    "handshake for {} failed: {}",
                    self.transport.credentials.identity,
                    e
                );
                let stream = self.transport.fail();
                self.armed = false;
                if let Some(mut stream) = stream {
                    let _ = stream.shutdown().await;
                }
                Err(e)
            }
        }
    }
}

impl<S> Drop for FailOnDrop<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(
                "handshake for {} cancelled in state {}",
                self.transport.credentials.identity,
                self.transport.state
            );
            self.transport.cancelled = true;
            drop(self.transport.fail());
        }
    }
}

impl<S> AsyncRead for Q2QTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().authenticated_stream() {
            Ok(stream) => Pin::new(stream).poll_read(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl<S> AsyncWrite for Q2QTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().authenticated_stream() {
            Ok(stream) => Pin::new(stream).poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().authenticated_stream() {
            Ok(stream) => Pin::new(stream).poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().authenticated_stream() {
            Ok(stream) => Pin::new(stream).poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

/// A stream whose handshake completed
///
/// Only obtainable through [`Q2QTransport::into_authenticated`], so holding
/// one is proof that both identities were verified.
#[derive(Debug)]
pub struct AuthenticatedStream<S> {
    stream: S,
    host: IdentityAddress,
    peer: IdentityAddress,
    peer_certificate: Certificate,
}

impl<S> AuthenticatedStream<S> {
    pub fn q2q_host(&self) -> &IdentityAddress {
        &self.host
    }

    pub fn q2q_peer(&self) -> &IdentityAddress {
        &self.peer
    }

    pub fn peer_certificate(&self) -> &Certificate {
        &self.peer_certificate
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for AuthenticatedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for AuthenticatedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
