use std::collections::BTreeMap;

use ledger_core::Digest;
use ledger_store::{LedgerPaths, RefStore};

use crate::error::CliError;
use crate::ingest::parse_digest;

fn ref_store(paths: &LedgerPaths, allow_dangling: bool) -> RefStore {
    let store = RefStore::new(paths.clone());
    if allow_dangling {
        store.allowing_dangling()
    } else {
        store
    }
}

pub fn run_refs_set(
    paths: &LedgerPaths,
    name: &str,
    id: &str,
    allow_dangling: bool,
) -> Result<(), CliError> {
    let id = parse_digest(id)?;
    Ok(ref_store(paths, allow_dangling).set(name, &id)?)
}

pub fn run_refs_get(paths: &LedgerPaths, name: &str) -> Result<Digest, CliError> {
    Ok(ref_store(paths, false).get(name)?)
}

pub fn run_refs_list(paths: &LedgerPaths) -> Result<BTreeMap<String, Digest>, CliError> {
    Ok(ref_store(paths, false).list()?)
}
