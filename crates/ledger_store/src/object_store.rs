use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ledger_core::Digest;

use crate::error::StoreError;
use crate::paths::LedgerPaths;

/// Content-addressed blob storage. Add-only: `put` of already-present bytes
/// is a successful no-op, and nothing in this API can overwrite or remove a
/// published object.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    paths: LedgerPaths,
}

impl ObjectStore {
    pub fn new(paths: LedgerPaths) -> Self {
        ObjectStore { paths }
    }

    /// Store a blob, returning its digest. Idempotent.
    pub fn put(&self, bytes: &[u8]) -> Result<Digest, StoreError> {
        let digest = Digest::of_bytes(bytes);
        self.publish(&digest, bytes)?;
        Ok(digest)
    }

    /// Store a file's bytes, hashing in streamed chunks first.
    pub fn put_file(&self, path: &Path) -> Result<Digest, StoreError> {
        let mut file = File::open(path).map_err(|err| StoreError::io(path, err))?;
        let digest =
            Digest::of_reader(&mut file).map_err(|err| StoreError::io(path, err))?;
        if !self.contains(&digest) {
            let bytes = fs::read(path).map_err(|err| StoreError::io(path, err))?;
            self.publish(&digest, &bytes)?;
        }
        Ok(digest)
    }

    pub fn get(&self, digest: &Digest) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(digest);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::ObjectNotFound { digest: *digest })
            }
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.object_path(digest).is_file()
    }

    /// Replay materializes parents by path; the layout is part of the
    /// external interface, so the path is exposed rather than hidden.
    pub fn object_path(&self, digest: &Digest) -> PathBuf {
        self.paths.object_path(digest)
    }

    /// Publish bytes under their digest. Full bytes land in a temp file
    /// first, then a hard link makes them visible all-or-nothing; a link
    /// collision means another writer published identical content, which is
    /// success, not an error.
    fn publish(&self, digest: &Digest, bytes: &[u8]) -> Result<(), StoreError> {
        let final_path = self.object_path(digest);
        if final_path.is_file() {
            return Ok(());
        }

        let shard_dir = final_path
            .parent()
            .expect("object path has a shard parent")
            .to_path_buf();
        fs::create_dir_all(&shard_dir).map_err(|err| StoreError::io(&shard_dir, err))?;

        let tmp_path = shard_dir.join(tmp_name(digest));
        fs::write(&tmp_path, bytes).map_err(|err| StoreError::io(&tmp_path, err))?;

        let link_result = fs::hard_link(&tmp_path, &final_path);
        let _ = fs::remove_file(&tmp_path);
        match link_result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(StoreError::io(&final_path, err)),
        }
    }
}

fn tmp_name(digest: &Digest) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        ".tmp-{}-{}-{}",
        digest.hex_prefix(8),
        std::process::id(),
        nanos
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> ObjectStore {
        ObjectStore::new(LedgerPaths::from_repo_root(dir))
    }

    #[test]
    fn put_then_get_roundtrips_exact_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());

        let digest = store.put(b"hello").unwrap();
        assert_eq!(
            digest.to_string(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(store.get(&digest).unwrap(), b"hello");
    }

    #[test]
    fn duplicate_put_is_a_successful_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());

        let first = store.put(b"same bytes").unwrap();
        let second = store.put(b"same bytes").unwrap();
        assert_eq!(first, second);

        // Exactly one object file exists (no duplicate storage).
        let shard = store.object_path(&first).parent().unwrap().to_path_buf();
        let entries: Vec<_> = fs::read_dir(shard).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn get_of_absent_digest_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());

        let absent = Digest::of_bytes(b"never stored");
        match store.get(&absent) {
            Err(StoreError::ObjectNotFound { digest }) => assert_eq!(digest, absent),
            other => panic!("expected ObjectNotFound, got {:?}", other),
        }
    }

    #[test]
    fn put_file_matches_put_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());

        let src = tmp.path().join("artifact.bin");
        fs::write(&src, b"file contents").unwrap();

        let from_file = store.put_file(&src).unwrap();
        let from_bytes = Digest::of_bytes(b"file contents");
        assert_eq!(from_file, from_bytes);
        assert!(store.contains(&from_file));
    }

    #[test]
    fn no_partial_object_is_left_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let digest = store.put(b"payload").unwrap();

        let shard = store.object_path(&digest).parent().unwrap().to_path_buf();
        for entry in fs::read_dir(shard).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(!name.to_string_lossy().starts_with(".tmp-"));
        }
    }
}
