use std::time::Duration;

use ledger_core::Digest;
use ledger_store::{ingest, IngestRequest, LedgerPaths, TransformSpec};
use ledger_verify::{ReplayEngine, ReplayError, ReplayFailure, ReplayOptions, Verdict, Verifier};
use serde_json::json;

/// Concatenates ordered parents, the fixture derivation of the original
/// design. Flag order is fixed by the argument contract, so a shell
/// transform can address operands positionally.
const CONCAT_TRANSFORM: &str = "#!/bin/sh
# argv: --parents-manifest M --parents-dir D --params-path P --out O
dir=$4
out=$8
cat \"$dir\"/*.bin > \"$out\"
";

fn admit(paths: &LedgerPaths, bytes: &[u8]) -> Digest {
    let mut request = IngestRequest::new(bytes.to_vec(), vec![], TransformSpec::named("admit"));
    request.session_lock = false;
    ingest(paths, &request).unwrap()
}

fn derive(
    paths: &LedgerPaths,
    bytes: &[u8],
    parents: Vec<Digest>,
    transform_body: &str,
) -> Digest {
    let mut transform = TransformSpec::named("concat");
    transform.definition = Some(transform_body.as_bytes().to_vec());
    transform.runner = Some(vec!["sh".to_string()]);
    transform.params = json!({});

    let mut request = IngestRequest::new(bytes.to_vec(), parents, transform);
    request.session_lock = false;
    ingest(paths, &request).unwrap()
}

#[test]
fn replay_reproduces_a_faithful_derivation() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"hello");
    let p2 = admit(&paths, b"world");
    // Child bytes really are transform(p1, p2).
    let child = derive(&paths, b"helloworld", vec![p1, p2], CONCAT_TRANSFORM);

    let engine = ReplayEngine::new(paths.clone());
    let replayed = engine.replay(&child).unwrap();
    assert!(replayed.matched);
    assert_eq!(replayed.output_digest, child);

    // Strong verification agrees end to end.
    assert!(Verifier::new(paths).verify(&child, true).is_valid());
}

#[test]
fn replay_detects_a_forged_child() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"hello");
    // Claimed bytes are NOT what the transform produces from p1.
    let forged = derive(&paths, b"EVIL", vec![p1], CONCAT_TRANSFORM);

    let engine = ReplayEngine::new(paths.clone());
    let replayed = engine.replay(&forged).unwrap();
    assert!(!replayed.matched);
    assert_eq!(replayed.output_digest, Digest::of_bytes(b"hello"));

    match Verifier::new(paths).verify(&forged, true) {
        Verdict::ReplayFailed(ReplayFailure::HashMismatch { id, actual }) => {
            assert_eq!(id, forged);
            assert_eq!(actual, Digest::of_bytes(b"hello"));
        }
        other => panic!("expected HashMismatch, got {:?}", other),
    }
}

#[test]
fn parent_order_is_semantic() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"hello");
    let p2 = admit(&paths, b"world");
    // Same parents, swapped order: concat produces "worldhello".
    let child = derive(&paths, b"worldhello", vec![p2, p1], CONCAT_TRANSFORM);

    let replayed = ReplayEngine::new(paths).replay(&child).unwrap();
    assert!(replayed.matched);
}

#[test]
fn tampered_parent_bytes_break_the_replay_match() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"hello");
    let p2 = admit(&paths, b"world");
    let child = derive(&paths, b"helloworld", vec![p1, p2], CONCAT_TRANSFORM);

    // Mutate p1's stored object without touching the child's declared id.
    // The engine materializes whatever the store holds; the mismatch is the
    // whole point of strong verification.
    let store = ledger_store::ObjectStore::new(paths.clone());
    std::fs::write(store.object_path(&p1), b"HELLO").unwrap();

    let replayed = ReplayEngine::new(paths).replay(&child).unwrap();
    assert!(!replayed.matched);
    assert_eq!(replayed.output_digest, Digest::of_bytes(b"HELLOworld"));
}

#[test]
fn params_participate_in_the_derivation() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    // Appends the canonical params bytes after the parents, so the declared
    // params are observable in the output.
    let params_transform = "#!/bin/sh
dir=$4
params=$6
out=$8
cat \"$dir\"/*.bin \"$params\" > \"$out\"
";

    let p1 = admit(&paths, b"hello");
    let params = json!({"suffix": "!"});
    let mut expected = b"hello".to_vec();
    expected.extend(ledger_core::canonical_json_bytes(&params));
    expected.push(b'\n');

    let mut transform = TransformSpec::named("concat-params");
    transform.definition = Some(params_transform.as_bytes().to_vec());
    transform.runner = Some(vec!["sh".to_string()]);
    transform.params = params;
    let mut request = IngestRequest::new(expected.clone(), vec![p1], transform);
    request.session_lock = false;
    let child = ingest(&paths, &request).unwrap();

    let replayed = ReplayEngine::new(paths.clone()).replay(&child).unwrap();
    assert!(replayed.matched, "faithful params reproduce the child");

    // Doctor the stored manifest's params without updating the id: the
    // replayed output no longer matches.
    let registry = ledger_store::NodeRegistry::new(paths.clone());
    let mut doctored = registry.get(&child).unwrap();
    doctored.transform.params = json!({"suffix": "?"});
    std::fs::write(registry.manifest_path(&child), doctored.to_pretty_json()).unwrap();

    let replayed = ReplayEngine::new(paths).replay(&child).unwrap();
    assert!(!replayed.matched);
}

#[test]
fn root_nodes_have_no_derivation_to_replay() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let root = admit(&paths, b"hello");
    match ReplayEngine::new(paths.clone()).replay(&root) {
        Err(ReplayError::NoDerivation { id }) => assert_eq!(id, root),
        other => panic!("expected NoDerivation, got {:?}", other),
    }

    // But verify(replay=true) reports a parentless node Valid on
    // structural success alone.
    assert!(Verifier::new(paths).verify(&root, true).is_valid());
}

#[test]
fn unstored_transform_definition_blocks_replay() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"hello");
    // Name-only transform: digest falls back to sha256(name), no blob.
    let mut request = IngestRequest::new(
        b"derived".to_vec(),
        vec![p1],
        TransformSpec::named("opaque-step"),
    );
    request.session_lock = false;
    let child = ingest(&paths, &request).unwrap();

    match ReplayEngine::new(paths).replay(&child) {
        Err(ReplayError::MissingTransform { id, digest }) => {
            assert_eq!(id, child);
            assert_eq!(digest, Digest::of_bytes(b"opaque-step"));
        }
        other => panic!("expected MissingTransform, got {:?}", other),
    }
}

#[test]
fn nonzero_exit_surfaces_captured_diagnostics() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"hello");
    let failing = "#!/bin/sh\necho boom >&2\nexit 3\n";
    let child = derive(&paths, b"whatever", vec![p1], failing);

    match ReplayEngine::new(paths).replay(&child) {
        Err(ReplayError::NonZeroExit {
            code, stderr, ..
        }) => {
            assert_eq!(code, Some(3));
            assert!(stderr.contains("boom"), "diagnostics forwarded: {:?}", stderr);
        }
        other => panic!("expected NonZeroExit, got {:?}", other),
    }
}

#[test]
fn silent_transform_yields_output_missing() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"hello");
    let silent = "#!/bin/sh\nexit 0\n";
    let child = derive(&paths, b"whatever", vec![p1], silent);

    assert!(matches!(
        ReplayEngine::new(paths).replay(&child),
        Err(ReplayError::OutputMissing { .. })
    ));
}

#[test]
fn timeout_kills_the_transform_and_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"hello");
    let sleeper = "#!/bin/sh\nsleep 30\n";
    let child = derive(&paths, b"whatever", vec![p1], sleeper);

    let options = ReplayOptions {
        timeout: Some(Duration::from_millis(250)),
        ..Default::default()
    };
    let started = std::time::Instant::now();
    match ReplayEngine::new(paths).replay_with(&child, &options) {
        Err(ReplayError::Timeout { id, .. }) => assert_eq!(id, child),
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert!(
        started.elapsed() < Duration::from_secs(20),
        "child must be killed at the deadline, not awaited"
    );
}

#[test]
fn kept_workspace_survives_for_debugging() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = LedgerPaths::from_repo_root(tmp.path());

    let p1 = admit(&paths, b"foo");
    let p2 = admit(&paths, b"bar");
    let child = derive(&paths, b"foobar", vec![p1, p2], CONCAT_TRANSFORM);

    let workdir = tmp.path().join("replay-debug");
    let options = ReplayOptions {
        workdir: Some(workdir.clone()),
        ..Default::default()
    };
    let replayed = ReplayEngine::new(paths)
        .replay_with(&child, &options)
        .unwrap();
    assert!(replayed.matched);

    // Materialized evidence stays on disk.
    assert!(workdir.join("parents.json").is_file());
    assert!(workdir.join("params.json").is_file());
    assert!(workdir.join("out.bin").is_file());
    assert!(workdir.join("parents").is_dir());
}
