use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use ledger_core::{Digest, NodeManifest};

use crate::error::StoreError;
use crate::paths::LedgerPaths;

/// Append-only map from node id to manifest. The integrity guarantee is the
/// API surface itself: there is no update or delete here, and `create` can
/// never replace a visible manifest, only collide with it.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    paths: LedgerPaths,
}

impl NodeRegistry {
    pub fn new(paths: LedgerPaths) -> Self {
        NodeRegistry { paths }
    }

    /// Admit a manifest. Byte-identical re-submission is idempotent success;
    /// a different manifest under an existing id is `AlreadyExists`.
    ///
    /// Does not check `id == hash(artifact)` or parent reachability — that
    /// is verification, kept separate so ingestion stays cheap.
    pub fn create(&self, manifest: &NodeManifest) -> Result<(), StoreError> {
        manifest.validate()?;

        let final_path = self.manifest_path(&manifest.id);
        if final_path.is_file() {
            return self.reconcile_existing(manifest);
        }

        let nodes_dir = self.paths.nodes_dir();
        fs::create_dir_all(&nodes_dir).map_err(|err| StoreError::io(&nodes_dir, err))?;

        let tmp_path = nodes_dir.join(tmp_name(&manifest.id));
        fs::write(&tmp_path, manifest.to_pretty_json())
            .map_err(|err| StoreError::io(&tmp_path, err))?;

        // Hard link, never rename: a rename would silently replace a
        // manifest that appeared between the exists-check and now.
        let link_result = fs::hard_link(&tmp_path, &final_path);
        let _ = fs::remove_file(&tmp_path);
        match link_result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                // Lost a race; decide idempotent-duplicate vs conflict.
                self.reconcile_existing(manifest)
            }
            Err(err) => Err(StoreError::io(&final_path, err)),
        }
    }

    pub fn get(&self, id: &Digest) -> Result<NodeManifest, StoreError> {
        let path = self.manifest_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ManifestNotFound { id: *id });
            }
            Err(err) => return Err(StoreError::io(&path, err)),
        };
        let manifest =
            NodeManifest::from_json_bytes(&bytes).map_err(|err| StoreError::CorruptManifest {
                id: *id,
                reason: err.to_string(),
            })?;
        if manifest.id != *id {
            return Err(StoreError::CorruptManifest {
                id: *id,
                reason: format!("manifest records id {}", manifest.id),
            });
        }
        Ok(manifest)
    }

    pub fn exists(&self, id: &Digest) -> bool {
        self.manifest_path(id).is_file()
    }

    pub fn manifest_path(&self, id: &Digest) -> PathBuf {
        self.paths.node_manifest_path(id)
    }

    /// All admitted node ids, sorted. Read-only enumeration for derived
    /// indexes (child edges are computed, not stored).
    pub fn ids(&self) -> Result<Vec<Digest>, StoreError> {
        let nodes_dir = self.paths.nodes_dir();
        let entries = match fs::read_dir(&nodes_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&nodes_dir, err)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&nodes_dir, err))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(id) = stem.parse::<Digest>() {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Content comparison against the stored manifest, digest-for-digest:
    /// canonical bytes equality, not an existence-only check.
    fn reconcile_existing(&self, submitted: &NodeManifest) -> Result<(), StoreError> {
        let stored = self.get(&submitted.id)?;
        if stored.canonical_bytes() == submitted.canonical_bytes() {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists { id: submitted.id })
        }
    }
}

fn tmp_name(id: &Digest) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(".tmp-{}-{}-{}", id.hex_prefix(8), std::process::id(), nanos)
}
