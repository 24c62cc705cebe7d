use std::fs;

use ledger_core::{Digest, NodeManifest, Transform};
use ledger_store::{ingest, IngestRequest, LedgerPaths, NodeRegistry, ObjectStore, TransformSpec};
use ledger_verify::{StructuralViolation, Verdict, Verifier};
use serde_json::json;

fn admit(paths: &LedgerPaths, bytes: &[u8], parents: Vec<Digest>) -> Digest {
    let mut request =
        IngestRequest::new(bytes.to_vec(), parents, TransformSpec::named("admit"));
    request.session_lock = false;
    ingest(paths, &request).unwrap()
}

#[test]
fn root_node_is_valid_iff_digest_matches() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let id = admit(&paths, b"hello", vec![]);
    assert_eq!(
        id.to_string(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );

    let verifier = Verifier::new(paths.clone());
    assert!(verifier.verify(&id, false).is_valid());

    // Single-bit-style corruption of the stored artifact flips the verdict.
    let store = ObjectStore::new(paths);
    fs::write(store.object_path(&id), b"hellx").unwrap();
    match verifier.verify(&id, false) {
        Verdict::Invalid(StructuralViolation::DigestMismatch { id: bad, actual }) => {
            assert_eq!(bad, id);
            assert_eq!(actual, Digest::of_bytes(b"hellx"));
        }
        other => panic!("expected DigestMismatch, got {:?}", other),
    }
}

#[test]
fn chain_failure_names_the_deep_ancestor() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let a = admit(&paths, b"a", vec![]);
    let b = admit(&paths, b"b", vec![a]);
    let c = admit(&paths, b"c", vec![b]);

    let verifier = Verifier::new(paths.clone());
    assert!(verifier.verify_reachable(&c, false).is_valid());

    // Corrupt A's stored object: verify_reachable(C) must name A, not C.
    let store = ObjectStore::new(paths.clone());
    fs::write(store.object_path(&a), b"tampered").unwrap();
    match verifier.verify_reachable(&c, false) {
        Verdict::Invalid(StructuralViolation::DigestMismatch { id, .. }) => assert_eq!(id, a),
        other => panic!("expected DigestMismatch at A, got {:?}", other),
    }

    // Remove A's manifest instead: still named as the failing node.
    fs::write(store.object_path(&a), b"a").unwrap();
    let registry = NodeRegistry::new(paths);
    fs::remove_file(registry.manifest_path(&a)).unwrap();
    match verifier.verify_reachable(&c, false) {
        Verdict::Invalid(StructuralViolation::UnreachableParent { missing, referenced_by }) => {
            assert_eq!(missing, a);
            assert_eq!(referenced_by, b);
        }
        other => panic!("expected UnreachableParent at A, got {:?}", other),
    }
}

#[test]
fn verify_of_unknown_id_reports_missing_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let ghost = Digest::of_bytes(b"never ingested");
    match Verifier::new(paths).verify(&ghost, false) {
        Verdict::Invalid(StructuralViolation::MissingManifest { id }) => assert_eq!(id, ghost),
        other => panic!("expected MissingManifest, got {:?}", other),
    }
}

#[test]
fn diamond_ancestry_verifies_once_and_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let a = admit(&paths, b"a", vec![]);
    let b = admit(&paths, b"b", vec![a]);
    let c = admit(&paths, b"c", vec![a]);
    let d = admit(&paths, b"d", vec![b, c]);

    let verifier = Verifier::new(paths);
    assert!(verifier.verify_reachable(&d, false).is_valid());
    assert!(verifier.verify(&d, false).is_valid());
}

#[test]
fn doctored_cycle_fails_closed() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let a = admit(&paths, b"a", vec![]);
    let b = admit(&paths, b"b", vec![a]);

    // Doctor A's manifest on disk so its parent set includes its own
    // descendant. No API can produce this; simulate the tampering.
    let registry = NodeRegistry::new(paths.clone());
    let doctored = NodeManifest::new(
        a,
        vec![b],
        Transform::new("admit", Digest::of_bytes(b"admit"), json!({})),
    );
    fs::write(registry.manifest_path(&a), doctored.to_pretty_json()).unwrap();

    let verifier = Verifier::new(paths);
    match verifier.verify(&b, false) {
        Verdict::Invalid(StructuralViolation::CycleDetected { .. }) => {}
        other => panic!("expected CycleDetected, got {:?}", other),
    }
    match verifier.verify_reachable(&b, false) {
        Verdict::Invalid(StructuralViolation::CycleDetected { .. }) => {}
        other => panic!("expected CycleDetected, got {:?}", other),
    }
}

#[test]
fn malformed_stored_manifest_is_invalid_not_absent() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let id = admit(&paths, b"payload", vec![]);
    let registry = NodeRegistry::new(paths.clone());
    fs::write(registry.manifest_path(&id), b"{\"garbage\": true}").unwrap();

    match Verifier::new(paths).verify(&id, false) {
        Verdict::Invalid(StructuralViolation::CorruptManifest { id: bad, .. }) => {
            assert_eq!(bad, id)
        }
        other => panic!("expected CorruptManifest, got {:?}", other),
    }
}
