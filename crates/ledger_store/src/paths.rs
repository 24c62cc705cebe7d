use std::fs;
use std::path::{Path, PathBuf};

use ledger_core::Digest;

use crate::error::StoreError;

const LEDGER_DIR: &str = "ledger";
const OBJECTS_DIR: &str = "objects";
const NODES_DIR: &str = "nodes";
const REFS_DIR: &str = "refs";
const LOCKS_DIR: &str = ".locks";

/// Shard objects by the first two hex chars to bound directory fan-out.
const SHARD_PREFIX_LEN: usize = 2;

/// Maximum parent directories walked when discovering the repo root.
const DISCOVERY_DEPTH: usize = 20;

/// All persisted state lives under `<root>/ledger/`. Layout is stable and
/// per-id: external policy (hooks, CI diff checks) relies on these paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPaths {
    root: PathBuf,
}

impl LedgerPaths {
    pub fn from_repo_root(root: impl Into<PathBuf>) -> Self {
        LedgerPaths { root: root.into() }
    }

    /// Walk up from `start` until a directory containing `ledger/` is found.
    pub fn discover(start: &Path) -> Option<Self> {
        let mut current = start.to_path_buf();
        for _ in 0..DISCOVERY_DEPTH {
            if current.join(LEDGER_DIR).is_dir() {
                return Some(LedgerPaths { root: current });
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        None
    }

    /// Create the ledger directory skeleton. Idempotent.
    pub fn init_layout(&self) -> Result<(), StoreError> {
        for dir in [self.objects_dir(), self.nodes_dir(), self.refs_dir()] {
            fs::create_dir_all(&dir).map_err(|err| StoreError::io(&dir, err))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.root.join(LEDGER_DIR)
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.ledger_dir().join(OBJECTS_DIR)
    }

    pub fn nodes_dir(&self) -> PathBuf {
        self.ledger_dir().join(NODES_DIR)
    }

    pub fn refs_dir(&self) -> PathBuf {
        self.ledger_dir().join(REFS_DIR)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.ledger_dir().join(LOCKS_DIR)
    }

    pub fn object_path(&self, digest: &Digest) -> PathBuf {
        self.objects_dir()
            .join(digest.hex_prefix(SHARD_PREFIX_LEN))
            .join(digest.to_string())
    }

    pub fn node_manifest_path(&self, id: &Digest) -> PathBuf {
        self.nodes_dir().join(format!("{}.json", id))
    }

    pub fn ref_path(&self, name: &str) -> PathBuf {
        self.refs_dir().join(name)
    }

    pub fn ingest_lock_path(&self) -> PathBuf {
        self.locks_dir().join("ingest.lock")
    }
}
