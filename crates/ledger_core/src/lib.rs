pub mod canonical;
pub mod id;
pub mod manifest;

pub use canonical::canonical_json_bytes;
pub use id::{Digest, DigestParseError};
pub use manifest::{ManifestError, NodeManifest, Transform};
