use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::canonical_json_bytes;
use crate::id::Digest;

/// How a node's artifact was derived: a hash-pinned executable plus its
/// canonical parameters. `name` is a display label only; everything else is
/// semantic and participates in the derivation contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    pub digest: Digest,
    pub params: Value,
    /// Replay argv prefix pinning the execution entrypoint, e.g. ["python3"].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<Vec<String>>,
    /// Digest of an execution-environment description blob (lockfile, nix
    /// flake, container recipe). Semantic if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_digest: Option<Digest>,
}

impl Transform {
    pub fn new(name: impl Into<String>, digest: Digest, params: Value) -> Self {
        Transform {
            name: name.into(),
            digest,
            params,
            runner: None,
            env_digest: None,
        }
    }
}

/// The atomic unit of the ledger: an artifact digest paired with its declared
/// derivation lineage. Immutable once admitted; `meta` is the only field
/// excluded from all validity checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeManifest {
    pub id: Digest,
    pub parents: Vec<Digest>,
    pub transform: Transform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl NodeManifest {
    pub fn new(id: Digest, parents: Vec<Digest>, transform: Transform) -> Self {
        NodeManifest {
            id,
            parents,
            transform,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Structural well-formedness of the manifest itself. Registry admission
    /// rejects manifests failing this; lineage checks (parent reachability,
    /// artifact hash) belong to the verifier, not here.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.transform.name.is_empty() {
            return Err(ManifestError::EmptyTransformName);
        }
        if !self.transform.params.is_object() {
            return Err(ManifestError::ParamsNotObject);
        }
        if let Some(runner) = &self.transform.runner {
            if runner.is_empty() {
                return Err(ManifestError::EmptyRunner);
            }
            if runner.iter().any(|arg| arg.trim().is_empty()) {
                return Err(ManifestError::BlankRunnerArg);
            }
        }
        Ok(())
    }

    /// Persistence form: pretty JSON, sorted keys, trailing newline.
    pub fn to_pretty_json(&self) -> Vec<u8> {
        let value = serde_json::to_value(self).expect("manifest serializes");
        let mut text =
            serde_json::to_string_pretty(&value).expect("manifest value serializes");
        text.push('\n');
        text.into_bytes()
    }

    /// Canonical bytes for content comparison. Two manifests are "the same
    /// submission" iff these bytes are equal, regardless of formatting.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value = serde_json::to_value(self).expect("manifest serializes");
        canonical_json_bytes(&value)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        serde_json::from_slice(bytes).map_err(|err| ManifestError::Decode(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    EmptyTransformName,
    ParamsNotObject,
    EmptyRunner,
    BlankRunnerArg,
    Decode(String),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::EmptyTransformName => write!(f, "transform.name must not be empty"),
            ManifestError::ParamsNotObject => {
                write!(f, "transform.params must be a JSON object")
            }
            ManifestError::EmptyRunner => {
                write!(f, "transform.runner must have at least one element when present")
            }
            ManifestError::BlankRunnerArg => {
                write!(f, "transform.runner entries must not be blank")
            }
            ManifestError::Decode(err) => write!(f, "manifest decode failed: {}", err),
        }
    }
}

impl std::error::Error for ManifestError {}
