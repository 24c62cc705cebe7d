use std::fmt;
use std::path::PathBuf;

use ledger_core::{Digest, ManifestError};

#[derive(Debug)]
pub enum StoreError {
    /// Object lookup miss. Locally recoverable, always surfaced.
    ObjectNotFound { digest: Digest },
    /// Manifest lookup miss.
    ManifestNotFound { id: Digest },
    /// A manifest already exists under this id with different content.
    /// Byte-identical re-submission is not an error.
    AlreadyExists { id: Digest },
    /// Structurally malformed manifest rejected at admission.
    InvalidManifest(ManifestError),
    /// A stored manifest exists but cannot be trusted: undecodable, or its
    /// recorded id disagrees with the path it was loaded from. Tamper
    /// signal, never folded into NotFound.
    CorruptManifest { id: Digest, reason: String },
    /// Ref points at a node the registry does not know.
    InvalidTarget { name: String, id: Digest },
    /// Ref lookup miss.
    RefNotFound { name: String },
    /// Ref name would escape the refs directory or is otherwise unusable.
    InvalidRefName { name: String, reason: String },
    Io { path: PathBuf, message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ObjectNotFound { digest } => {
                write!(f, "missing object: {}", digest)
            }
            StoreError::ManifestNotFound { id } => {
                write!(f, "missing node manifest: {}", id)
            }
            StoreError::AlreadyExists { id } => {
                write!(
                    f,
                    "node manifest already exists with different content: {}",
                    id
                )
            }
            StoreError::InvalidManifest(err) => write!(f, "invalid manifest: {}", err),
            StoreError::CorruptManifest { id, reason } => {
                write!(f, "corrupt manifest for {}: {}", id, reason)
            }
            StoreError::InvalidTarget { name, id } => {
                write!(f, "ref {:?} targets unknown node {}", name, id)
            }
            StoreError::RefNotFound { name } => write!(f, "missing ref: {:?}", name),
            StoreError::InvalidRefName { name, reason } => {
                write!(f, "invalid ref name {:?}: {}", name, reason)
            }
            StoreError::Io { path, message } => {
                write!(f, "io error at {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<ManifestError> for StoreError {
    fn from(err: ManifestError) -> Self {
        StoreError::InvalidManifest(err)
    }
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
