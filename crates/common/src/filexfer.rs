//! File transfer over an authenticated stream
//!
//! Only the boundary lives here: a [`FileTransfer`] hands out sinks, sources
//! and listings for a peer that has already completed the handshake. Every
//! operation takes the [`AuthenticatedStream`] it serves, which can only be
//! obtained from a finished handshake.

use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::identity::IdentityAddress;
use crate::transport::AuthenticatedStream;

/// MIME type reported for directories in listings
pub const DIRECTORY_MIME: &str = "inode/directory";

pub type DataSink = Pin<Box<dyn AsyncWrite + Send>>;
pub type DataSource = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum FileTransferError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("path not found: {0}")]
    NotFound(String),
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub name: String,
    /// Size in bytes, zero for directories
    pub size: u64,
    pub mime: String,
    /// Last modification, unix seconds
    pub modified: i64,
}

#[async_trait]
pub trait FileTransfer: Send + Sync + Debug {
    /// Open `path` for writing on behalf of the stream's peer, creating parents
    async fn upload_sink<S: Send + Sync>(
        &self,
        stream: &AuthenticatedStream<S>,
        path: &str,
    ) -> Result<DataSink, FileTransferError>;

    /// Open `path` for reading on behalf of the stream's peer
    async fn download_source<S: Send + Sync>(
        &self,
        stream: &AuthenticatedStream<S>,
        path: &str,
    ) -> Result<DataSource, FileTransferError>;

    /// List the directory at `path`, sorted by name
    async fn list_children<S: Send + Sync>(
        &self,
        stream: &AuthenticatedStream<S>,
        path: &str,
    ) -> Result<Vec<ChildEntry>, FileTransferError>;
}

/// Serves a local directory, giving each peer its own `root/<domain>/<user>`
#[derive(Debug, Clone)]
pub struct DirectoryTransfer {
    root: PathBuf,
}

impl DirectoryTransfer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The peer's home directory
    ///
    /// Identity fields may hold any printable text, so each must name exactly
    /// one plain directory entry before it is joined onto the root.
    fn peer_root(&self, peer: &IdentityAddress) -> Result<PathBuf, FileTransferError> {
        let domain = single_component(peer.domain())?;
        let username = single_component(peer.username())?;
        Ok(self.root.join(domain).join(username))
    }

    /// Resolve `path` inside the peer's directory
    fn resolve(&self, peer: &IdentityAddress, path: &str) -> Result<PathBuf, FileTransferError> {
        let mut resolved = self.peer_root(peer)?;
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(FileTransferError::InvalidPath(path.to_string()))
                }
            }
        }
        Ok(resolved)
    }
}

fn single_component(field: &str) -> Result<&Path, FileTransferError> {
    let path = Path::new(field);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None)
            if part == path.as_os_str() && !field.contains('\\') =>
        {
            Ok(path)
        }
        _ => Err(FileTransferError::InvalidPath(field.to_string())),
    }
}

fn not_found(path: &str, e: std::io::Error) -> FileTransferError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FileTransferError::NotFound(path.to_string())
    } else {
        e.into()
    }
}

#[async_trait]
impl FileTransfer for DirectoryTransfer {
    async fn upload_sink<S: Send + Sync>(
        &self,
        stream: &AuthenticatedStream<S>,
        path: &str,
    ) -> Result<DataSink, FileTransferError> {
        let target = self.resolve(stream.q2q_peer(), path)?;
        if target == self.peer_root(stream.q2q_peer())? {
            return Err(FileTransferError::InvalidPath(path.to_string()));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(&target).await?;
        tracing::debug!("upload from {} to {}", stream.q2q_peer(), target.display());
        Ok(Box::pin(file))
    }

    async fn download_source<S: Send + Sync>(
        &self,
        stream: &AuthenticatedStream<S>,
        path: &str,
    ) -> Result<DataSource, FileTransferError> {
        let target = self.resolve(stream.q2q_peer(), path)?;
        let file = tokio::fs::File::open(&target)
            .await
            .map_err(|e| not_found(path, e))?;
        if file.metadata().await?.is_dir() {
            return Err(FileTransferError::InvalidPath(path.to_string()));
        }
        tracing::debug!("download by {} of {}", stream.q2q_peer(), target.display());
        Ok(Box::pin(file))
    }

    async fn list_children<S: Send + Sync>(
        &self,
        stream: &AuthenticatedStream<S>,
        path: &str,
    ) -> Result<Vec<ChildEntry>, FileTransferError> {
        let peer = stream.q2q_peer();
        let target = self.resolve(peer, path)?;
        // a peer that never uploaded has an empty home
        if target == self.peer_root(peer)? && !tokio::fs::try_exists(&target).await? {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&target)
            .await
            .map_err(|e| not_found(path, e))?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().to_string();
            let (size, mime) = if metadata.is_dir() {
                (0, DIRECTORY_MIME.to_string())
            } else {
                (
                    metadata.len(),
                    mime_guess::from_path(&name)
                        .first_or_octet_stream()
                        .to_string(),
                )
            };
            let modified = metadata
                .modified()
                .map(|at| time::OffsetDateTime::from(at).unix_timestamp())
                .unwrap_or_default();
            children.push(ChildEntry {
                name,
                size,
                mime,
                modified,
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }
}
