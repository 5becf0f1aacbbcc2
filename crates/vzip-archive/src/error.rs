use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vzip_crypto::CryptoError;

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Failures of the container library itself.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("cannot open container: {0}")]
    Open(String),

    #[error("container write failed: {0}")]
    Write(String),

    #[error("container read failed: {0}")]
    Read(String),

    #[error("unsafe entry path '{0}'")]
    UnsafeEntryPath(String),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create directory {}: {source}", path.display())]
    PathCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single entry failed to seal or open.
    #[error("entry '{entry}': {source}")]
    Entry {
        entry: String,
        #[source]
        source: CryptoError,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl ArchiveError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            ArchiveError::SourceNotFound(path)
        } else {
            ArchiveError::SourceUnreadable { path, source }
        }
    }

    /// The envelope-layer cause, if this failure came from sealing or opening.
    pub fn crypto_error(&self) -> Option<&CryptoError> {
        match self {
            ArchiveError::Entry { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.crypto_error(), Some(CryptoError::AuthenticationFailed))
    }
}
