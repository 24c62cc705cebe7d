use std::path::{Path, PathBuf};

use ledger_store::LedgerPaths;

use crate::error::CliError;

/// Resolve the repo root: an explicit `--root` wins, otherwise walk up from
/// the working directory looking for a `ledger/` directory.
pub fn resolve_root(explicit: Option<&Path>) -> Result<LedgerPaths, CliError> {
    match explicit {
        Some(root) => Ok(LedgerPaths::from_repo_root(root)),
        None => {
            let cwd = std::env::current_dir().map_err(|_| CliError::RootNotFound)?;
            LedgerPaths::discover(&cwd).ok_or(CliError::RootNotFound)
        }
    }
}

/// Create the ledger skeleton under `root`. Idempotent; safe on an
/// existing repo.
pub fn run_init(root: &Path) -> Result<PathBuf, CliError> {
    let paths = LedgerPaths::from_repo_root(root);
    paths.init_layout()?;
    Ok(paths.ledger_dir())
}
