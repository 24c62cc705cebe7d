use std::fs;
use std::path::{Path, PathBuf};

use ledger_core::Digest;
use ledger_store::{ingest, IngestRequest, LedgerPaths, TransformSpec};
use serde_json::json;

use crate::error::CliError;

/// Fallback display label when neither a transform name nor a definition
/// file is given.
const UNSPECIFIED_TRANSFORM: &str = "unspecified";

#[derive(Debug, Clone, Default)]
pub struct IngestInput {
    pub path: PathBuf,
    pub parents: Vec<String>,
    pub transform: Option<String>,
    pub transform_file: Option<PathBuf>,
    pub runner: Option<Vec<String>>,
    pub env_digest: Option<String>,
    pub params_json: Option<String>,
    pub note: Option<String>,
    pub no_session_lock: bool,
}

/// Compute the digest of a file, streaming.
pub fn run_hash(path: &Path) -> Result<Digest, CliError> {
    let mut file =
        fs::File::open(path).map_err(|_| CliError::NoSuchFile(path.to_path_buf()))?;
    Digest::of_reader(&mut file).map_err(|_| CliError::NoSuchFile(path.to_path_buf()))
}

/// Store the artifact (and transform definition, when given) and commit the
/// node manifest. Prints nothing; returns the new node id.
pub fn run_ingest(paths: &LedgerPaths, input: &IngestInput) -> Result<Digest, CliError> {
    let artifact = fs::read(&input.path).map_err(|_| CliError::NoSuchFile(input.path.clone()))?;

    let mut parents = Vec::with_capacity(input.parents.len());
    for raw in &input.parents {
        parents.push(parse_digest(raw)?);
    }

    let mut transform = match &input.transform_file {
        Some(file) => {
            let definition = fs::read(file).map_err(|_| CliError::NoSuchFile(file.clone()))?;
            let name = input.transform.clone().unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| UNSPECIFIED_TRANSFORM.to_string())
            });
            let mut spec = TransformSpec::named(name);
            spec.definition = Some(definition);
            spec
        }
        None => TransformSpec::named(
            input
                .transform
                .clone()
                .unwrap_or_else(|| UNSPECIFIED_TRANSFORM.to_string()),
        ),
    };

    if let Some(raw) = &input.params_json {
        let params: serde_json::Value =
            serde_json::from_str(raw).map_err(|err| CliError::InvalidParams(err.to_string()))?;
        if !params.is_object() {
            return Err(CliError::InvalidParams("not an object".to_string()));
        }
        transform.params = params;
    }
    transform.runner = input.runner.clone();
    transform.env_digest = match &input.env_digest {
        Some(raw) => Some(parse_digest(raw)?),
        None => None,
    };

    let mut request = IngestRequest::new(artifact, parents, transform);
    if let Some(note) = &input.note {
        request.meta = Some(json!({ "note": note }));
    }
    request.session_lock = !input.no_session_lock;

    Ok(ingest(paths, &request)?)
}

pub fn parse_digest(raw: &str) -> Result<Digest, CliError> {
    raw.trim().parse::<Digest>().map_err(|err| CliError::InvalidDigest {
        value: raw.to_string(),
        reason: err.to_string(),
    })
}
