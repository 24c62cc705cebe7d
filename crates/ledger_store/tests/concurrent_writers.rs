use std::sync::Arc;
use std::thread;

use ledger_core::{Digest, NodeManifest, Transform};
use ledger_store::{LedgerPaths, NodeRegistry, ObjectStore, StoreError};
use serde_json::json;

const WRITERS: usize = 8;

#[test]
fn concurrent_identical_puts_all_succeed() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = Arc::new(LedgerPaths::from_repo_root(tmp.path()));

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let paths = Arc::clone(&paths);
            thread::spawn(move || ObjectStore::new((*paths).clone()).put(b"shared artifact"))
        })
        .collect();

    let expected = Digest::of_bytes(b"shared artifact");
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), expected);
    }
    assert_eq!(
        ObjectStore::new((*paths).clone()).get(&expected).unwrap(),
        b"shared artifact"
    );
}

#[test]
fn concurrent_identical_creates_are_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = Arc::new(LedgerPaths::from_repo_root(tmp.path()));

    let manifest = NodeManifest::new(
        Digest::of_bytes(b"artifact"),
        vec![],
        Transform::new("admit", Digest::of_bytes(b"admit"), json!({})),
    );

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let paths = Arc::clone(&paths);
            let manifest = manifest.clone();
            thread::spawn(move || NodeRegistry::new((*paths).clone()).create(&manifest))
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(
        NodeRegistry::new((*paths).clone()).get(&manifest.id).unwrap(),
        manifest
    );
}

#[test]
fn conflicting_create_race_has_exactly_one_winner() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = Arc::new(LedgerPaths::from_repo_root(tmp.path()));

    let id = Digest::of_bytes(b"artifact");
    let transform = Transform::new("admit", Digest::of_bytes(b"admit"), json!({}));
    let first = NodeManifest::new(id, vec![], transform.clone());
    let second = NodeManifest::new(id, vec![], transform).with_meta(json!({"note": "rival"}));

    let handles: Vec<_> = [first.clone(), second.clone()]
        .into_iter()
        .map(|manifest| {
            let paths = Arc::clone(&paths);
            thread::spawn(move || NodeRegistry::new((*paths).clone()).create(&manifest))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::AlreadyExists { .. })))
        .count();
    assert_eq!(winners, 1, "exactly one writer commits: {:?}", results);
    assert_eq!(conflicts, 1, "the loser sees AlreadyExists: {:?}", results);

    // The stored manifest is exactly one submission, never a blend.
    let stored = NodeRegistry::new((*paths).clone()).get(&id).unwrap();
    assert!(stored == first || stored == second);
}
