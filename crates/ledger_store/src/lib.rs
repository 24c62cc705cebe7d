pub mod error;
pub mod ingest;
pub mod lock;
pub mod object_store;
pub mod paths;
pub mod refs;
pub mod registry;

pub use error::StoreError;
pub use ingest::{ingest, IngestRequest, TransformSpec};
pub use lock::{session_lock_enabled, IngestSessionLock, SESSION_LOCK_ENV};
pub use object_store::ObjectStore;
pub use paths::LedgerPaths;
pub use refs::RefStore;
pub use registry::NodeRegistry;
