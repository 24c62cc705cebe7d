pub mod error;
pub mod ingest;
pub mod refs;
pub mod root;
pub mod verify;

pub use error::CliError;
pub use ingest::{parse_digest, run_hash, run_ingest, IngestInput};
pub use refs::{run_refs_get, run_refs_list, run_refs_set};
pub use root::{resolve_root, run_init};
pub use verify::{
    run_replay, run_verify, run_verify_reachable, CheckReport, ReplayInput, VerifyInput,
};
