use ledger_core::{Digest, NodeManifest, Transform};
use serde_json::Value;

use crate::error::StoreError;
use crate::lock::{session_lock_enabled, IngestSessionLock};
use crate::object_store::ObjectStore;
use crate::paths::LedgerPaths;
use crate::registry::NodeRegistry;

/// Transform half of an ingest: the descriptor plus, optionally, the
/// definition blob itself. When the definition is given its digest becomes
/// the transform digest and the blob lands in the object store, making the
/// node replayable. Without it the digest falls back to the hash of the
/// name's UTF-8 bytes — a stable identifier, but such a node can only ever
/// be weakly verified.
#[derive(Debug, Clone)]
pub struct TransformSpec {
    pub name: String,
    pub definition: Option<Vec<u8>>,
    pub params: Value,
    pub runner: Option<Vec<String>>,
    pub env_digest: Option<Digest>,
}

impl TransformSpec {
    pub fn named(name: impl Into<String>) -> Self {
        TransformSpec {
            name: name.into(),
            definition: None,
            params: Value::Object(Default::default()),
            runner: None,
            env_digest: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub artifact: Vec<u8>,
    pub parents: Vec<Digest>,
    pub transform: TransformSpec,
    /// Non-semantic annotations; stored verbatim, excluded from validity.
    pub meta: Option<Value>,
    /// Repo-wide session lock around the whole ingest. Resolved together
    /// with the `LEDGER_INGEST_SESSION_LOCK` env override.
    pub session_lock: bool,
}

impl IngestRequest {
    pub fn new(artifact: Vec<u8>, parents: Vec<Digest>, transform: TransformSpec) -> Self {
        IngestRequest {
            artifact,
            parents,
            transform,
            meta: None,
            session_lock: true,
        }
    }
}

/// The only node-creation path: store the artifact (and transform blob if
/// given), then commit the manifest. Returns the new node id, which is the
/// artifact digest.
pub fn ingest(paths: &LedgerPaths, request: &IngestRequest) -> Result<Digest, StoreError> {
    let _guard = if session_lock_enabled(!request.session_lock) {
        Some(IngestSessionLock::acquire(paths)?)
    } else {
        None
    };

    let store = ObjectStore::new(paths.clone());
    let artifact_id = store.put(&request.artifact)?;

    let transform_digest = match &request.transform.definition {
        Some(definition) => store.put(definition)?,
        None => Digest::of_bytes(request.transform.name.as_bytes()),
    };

    let mut transform = Transform::new(
        request.transform.name.clone(),
        transform_digest,
        request.transform.params.clone(),
    );
    transform.runner = request.transform.runner.clone();
    transform.env_digest = request.transform.env_digest;

    let mut manifest = NodeManifest::new(artifact_id, request.parents.clone(), transform);
    if let Some(meta) = &request.meta {
        manifest = manifest.with_meta(meta.clone());
    }

    NodeRegistry::new(paths.clone()).create(&manifest)?;
    Ok(artifact_id)
}
