use std::fmt;
use std::path::PathBuf;

use ledger_store::StoreError;
use ledger_verify::ReplayError;

#[derive(Debug)]
pub enum CliError {
    /// No `ledger/` directory found walking up from the working directory.
    RootNotFound,
    NoSuchFile(PathBuf),
    InvalidDigest { value: String, reason: String },
    /// `--params-json` did not decode to a JSON object.
    InvalidParams(String),
    Store(StoreError),
    Replay(ReplayError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::RootNotFound => write!(
                f,
                "could not find repo root (missing ./ledger directory); run inside the repo or pass --root"
            ),
            CliError::NoSuchFile(path) => write!(f, "no such file: {}", path.display()),
            CliError::InvalidDigest { value, reason } => {
                write!(f, "invalid digest {:?}: {}", value, reason)
            }
            CliError::InvalidParams(reason) => {
                write!(f, "--params-json must decode to a JSON object: {}", reason)
            }
            CliError::Store(err) => write!(f, "{}", err),
            CliError::Replay(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CliError {}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        CliError::Store(err)
    }
}

impl From<ReplayError> for CliError {
    fn from(err: ReplayError) -> Self {
        CliError::Replay(err)
    }
}
