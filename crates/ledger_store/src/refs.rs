use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;

use ledger_core::Digest;

use crate::error::StoreError;
use crate::paths::LedgerPaths;
use crate::registry::NodeRegistry;

/// Mutable name → node id pointers; the only overwritable persisted state.
/// A ref is a convenience pointer, not a truth claim: `set` never verifies
/// the target node, it only (by default) requires the target to exist.
#[derive(Debug, Clone)]
pub struct RefStore {
    paths: LedgerPaths,
    allow_dangling: bool,
}

impl RefStore {
    /// Strict by default: refs must target known nodes.
    pub fn new(paths: LedgerPaths) -> Self {
        RefStore {
            paths,
            allow_dangling: false,
        }
    }

    /// Permit refs to ids with no manifest yet, for staged multi-step
    /// ingestion flows that publish pointers before nodes.
    pub fn allowing_dangling(mut self) -> Self {
        self.allow_dangling = true;
        self
    }

    /// Create or overwrite a ref. Last-writer-wins; no ordering guarantee
    /// relative to node creation or other refs.
    pub fn set(&self, name: &str, id: &Digest) -> Result<(), StoreError> {
        validate_name(name)?;

        if !self.allow_dangling {
            let registry = NodeRegistry::new(self.paths.clone());
            if !registry.exists(id) {
                return Err(StoreError::InvalidTarget {
                    name: name.to_string(),
                    id: *id,
                });
            }
        }

        let refs_dir = self.paths.refs_dir();
        fs::create_dir_all(&refs_dir).map_err(|err| StoreError::io(&refs_dir, err))?;

        // Refs are legitimately overwritable, so temp + rename is the right
        // atomicity here (readers see the old or the new id, never a torn
        // write).
        let final_path = self.paths.ref_path(name);
        let tmp_path = refs_dir.join(format!(
            ".tmp-ref-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default()
        ));
        fs::write(&tmp_path, format!("{}\n", id)).map_err(|err| StoreError::io(&tmp_path, err))?;
        fs::rename(&tmp_path, &final_path).map_err(|err| StoreError::io(&final_path, err))
    }

    pub fn get(&self, name: &str) -> Result<Digest, StoreError> {
        validate_name(name)?;
        let path = self.paths.ref_path(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::RefNotFound {
                    name: name.to_string(),
                });
            }
            Err(err) => return Err(StoreError::io(&path, err)),
        };
        text.trim()
            .parse::<Digest>()
            .map_err(|err| StoreError::Io {
                path,
                message: format!("unreadable ref contents: {}", err),
            })
    }

    /// All refs, sorted by name. Unparseable pointer files are skipped
    /// rather than failing the listing; `get` on them reports the problem.
    pub fn list(&self) -> Result<BTreeMap<String, Digest>, StoreError> {
        let refs_dir = self.paths.refs_dir();
        let entries = match fs::read_dir(&refs_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(StoreError::io(&refs_dir, err)),
        };

        let mut refs = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&refs_dir, err))?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if validate_name(&name).is_err() {
                continue;
            }
            if let Ok(id) = self.get(&name) {
                refs.insert(name, id);
            }
        }
        Ok(refs)
    }
}

/// Ref names are single path components: no separators, no traversal, no
/// dotfiles (temp files and locks live beside refs).
fn validate_name(name: &str) -> Result<(), StoreError> {
    let reason = if name.is_empty() {
        Some("empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("contains a path separator")
    } else if name == "." || name == ".." {
        Some("path traversal")
    } else if name.starts_with('.') {
        Some("leading dot is reserved")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StoreError::InvalidRefName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
