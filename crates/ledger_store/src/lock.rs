use std::fs::{self, File, OpenOptions};

use fs2::FileExt;

use crate::error::StoreError;
use crate::paths::LedgerPaths;

/// Env override for the repo-wide ingest-session lock. Unknown values mean
/// the default, which is ON.
pub const SESSION_LOCK_ENV: &str = "LEDGER_INGEST_SESSION_LOCK";

/// Cross-process exclusive advisory lock held for the duration of one
/// ingest. Lock lifetime is tied to the open file handle, so a crashed
/// writer releases it.
#[derive(Debug)]
pub struct IngestSessionLock {
    file: File,
}

impl IngestSessionLock {
    /// Block until the repo-wide ingest lock is held.
    pub fn acquire(paths: &LedgerPaths) -> Result<Self, StoreError> {
        let locks_dir = paths.locks_dir();
        fs::create_dir_all(&locks_dir).map_err(|err| StoreError::io(&locks_dir, err))?;

        let lock_path = paths.ingest_lock_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&lock_path)
            .map_err(|err| StoreError::io(&lock_path, err))?;
        file.lock_exclusive()
            .map_err(|err| StoreError::io(&lock_path, err))?;
        Ok(IngestSessionLock { file })
    }
}

impl Drop for IngestSessionLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Resolve whether the session lock is enabled. Caller opt-out wins, then
/// the env override; the default is ON.
pub fn session_lock_enabled(caller_opt_out: bool) -> bool {
    if caller_opt_out {
        return false;
    }
    match std::env::var(SESSION_LOCK_ENV) {
        Ok(value) => {
            let v = value.trim().to_ascii_lowercase();
            if ["0", "false", "no", "n", "off"].contains(&v.as_str()) {
                false
            } else {
                // "1"/"true"/"yes" and anything unrecognized: ON.
                true
            }
        }
        Err(_) => true,
    }
}
