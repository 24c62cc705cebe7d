use std::path::PathBuf;
use std::time::Duration;

use ledger_core::Digest;
use ledger_store::LedgerPaths;
use ledger_verify::{ReplayEngine, ReplayOptions, Replayed, Verdict, Verifier};
use serde::Serialize;

use crate::error::CliError;
use crate::ingest::parse_digest;

/// Machine-readable verdict for CI: the id, the outcome, the reason when
/// not ok, and when the check ran. `checked_at` is output-only and never
/// persisted, so stamping it does not disturb any content addressing.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: String,
}

impl CheckReport {
    pub fn for_verdict(id: &Digest, verdict: &Verdict) -> Self {
        CheckReport {
            id: id.to_string(),
            ok: verdict.is_valid(),
            detail: match verdict {
                Verdict::Valid => None,
                other => Some(other.to_string()),
            },
            checked_at: now_rfc3339(),
        }
    }

    pub fn for_replay(id: &Digest, outcome: &Result<Replayed, CliError>) -> Self {
        let (ok, detail) = match outcome {
            Ok(replayed) if replayed.matched => (true, None),
            Ok(replayed) => (
                false,
                Some(format!(
                    "derivation mismatch: expected {}, got {}",
                    id, replayed.output_digest
                )),
            ),
            Err(err) => (false, Some(err.to_string())),
        };
        CheckReport {
            id: id.to_string(),
            ok,
            detail,
            checked_at: now_rfc3339(),
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, Default)]
pub struct VerifyInput {
    pub id: String,
    pub replay: bool,
    pub timeout_secs: Option<u64>,
}

fn verifier_for(paths: &LedgerPaths, input: &VerifyInput) -> Verifier {
    let options = ReplayOptions {
        timeout: input.timeout_secs.map(Duration::from_secs),
        ..Default::default()
    };
    Verifier::new(paths.clone()).with_replay_options(options)
}

/// Weak or replay-gated verification of one node.
pub fn run_verify(paths: &LedgerPaths, input: &VerifyInput) -> Result<Verdict, CliError> {
    let id = parse_digest(&input.id)?;
    Ok(verifier_for(paths, input).verify(&id, input.replay))
}

/// Verification of the full reachable ancestry, parents first.
pub fn run_verify_reachable(
    paths: &LedgerPaths,
    input: &VerifyInput,
) -> Result<Verdict, CliError> {
    let id = parse_digest(&input.id)?;
    Ok(verifier_for(paths, input).verify_reachable(&id, input.replay))
}

#[derive(Debug, Clone, Default)]
pub struct ReplayInput {
    pub id: String,
    pub workdir: Option<PathBuf>,
    pub keep: bool,
    pub timeout_secs: Option<u64>,
}

/// Re-execute one node's derivation and compare output hashes.
pub fn run_replay(paths: &LedgerPaths, input: &ReplayInput) -> Result<Replayed, CliError> {
    let id = parse_digest(&input.id)?;
    let options = ReplayOptions {
        workdir: input.workdir.clone(),
        keep: input.keep,
        timeout: input.timeout_secs.map(Duration::from_secs),
    };
    Ok(ReplayEngine::new(paths.clone()).replay_with(&id, &options)?)
}
