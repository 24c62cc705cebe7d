use std::fmt;

use ledger_core::Digest;
use ledger_dag::{EdgeView, TraversalError};
use ledger_store::{LedgerPaths, NodeRegistry, ObjectStore, StoreError};

use crate::replay::{ReplayEngine, ReplayError, ReplayOptions};
use crate::sandbox::SandboxSpec;
use crate::structural::{StructuralChecker, StructuralViolation};

/// Terminal state of a verification request. Failures carry the offending
/// node and the violated clause; no failure mode ever falls back to
/// `Valid`.
#[derive(Debug)]
pub enum Verdict {
    Valid,
    Invalid(StructuralViolation),
    ReplayFailed(ReplayFailure),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Valid => write!(f, "valid"),
            Verdict::Invalid(violation) => write!(f, "invalid: {}", violation),
            Verdict::ReplayFailed(failure) => write!(f, "replay failed: {}", failure),
        }
    }
}

#[derive(Debug)]
pub enum ReplayFailure {
    /// The execution succeeded but reproduced different bytes.
    HashMismatch { id: Digest, actual: Digest },
    Engine(ReplayError),
}

impl fmt::Display for ReplayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayFailure::HashMismatch { id, actual } => {
                write!(f, "derivation mismatch: expected {}, got {}", id, actual)
            }
            ReplayFailure::Engine(err) => write!(f, "{}", err),
        }
    }
}

/// Two-tier verification over the ledger. Weak verification runs the
/// derivation contract only; strong verification additionally replays the
/// derivation of every non-root node it certifies.
#[derive(Debug)]
pub struct Verifier {
    registry: NodeRegistry,
    objects: ObjectStore,
    engine: ReplayEngine,
    replay_options: ReplayOptions,
}

impl Verifier {
    pub fn new(paths: LedgerPaths) -> Self {
        Verifier {
            registry: NodeRegistry::new(paths.clone()),
            objects: ObjectStore::new(paths.clone()),
            engine: ReplayEngine::new(paths),
            replay_options: ReplayOptions::default(),
        }
    }

    /// Replay policy (timeout, workspace retention) for replay-gated
    /// verification.
    pub fn with_replay_options(mut self, options: ReplayOptions) -> Self {
        self.replay_options = options;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxSpec) -> Self {
        self.engine = self.engine.with_sandbox(sandbox);
        self
    }

    /// Verify one node: the derivation contract over its full ancestry,
    /// plus its own replay when `replay` is set. A node with no parents has
    /// nothing to recompute and is `Valid` on structural success alone.
    pub fn verify(&self, id: &Digest, replay: bool) -> Verdict {
        let mut checker = StructuralChecker::new(&self.registry, &self.objects);
        self.verify_node(id, replay, &mut checker)
    }

    /// Verify every node reachable from `id`, in the edge view's
    /// deterministic parents-first order, short-circuiting on the first
    /// failure. The order guarantees the deepest offending ancestor is the
    /// one named, and that repeated runs report identically.
    pub fn verify_reachable(&self, id: &Digest, replay: bool) -> Verdict {
        let mut checker = StructuralChecker::new(&self.registry, &self.objects);
        let view = EdgeView::new(&self.registry);

        for step in view.reachable_from(*id) {
            let node = match step {
                Ok(node) => node,
                Err(err) => return Verdict::Invalid(traversal_violation(err, id)),
            };
            match self.verify_node(&node, replay, &mut checker) {
                Verdict::Valid => continue,
                failure => return failure,
            }
        }
        Verdict::Valid
    }

    fn verify_node(
        &self,
        id: &Digest,
        replay: bool,
        checker: &mut StructuralChecker<'_>,
    ) -> Verdict {
        if let Err(violation) = checker.check(id) {
            return Verdict::Invalid(violation);
        }
        if !replay {
            return Verdict::Valid;
        }

        // Structurally valid, so the manifest is readable.
        let manifest = match self.registry.get(id) {
            Ok(manifest) => manifest,
            Err(err) => {
                return Verdict::Invalid(StructuralViolation::Store {
                    id: *id,
                    reason: err.to_string(),
                });
            }
        };
        if manifest.parents.is_empty() {
            return Verdict::Valid;
        }

        match self.engine.replay_with(id, &self.replay_options) {
            Ok(replayed) if replayed.matched => Verdict::Valid,
            Ok(replayed) => Verdict::ReplayFailed(ReplayFailure::HashMismatch {
                id: *id,
                actual: replayed.output_digest,
            }),
            Err(err) => Verdict::ReplayFailed(ReplayFailure::Engine(err)),
        }
    }
}

/// Map a traversal failure to its violation; `queried` anchors errors the
/// walk cannot attribute to a specific ancestor.
fn traversal_violation(err: TraversalError, queried: &Digest) -> StructuralViolation {
    match err {
        TraversalError::UnreachableParent {
            missing,
            referenced_by,
        } => StructuralViolation::UnreachableParent {
            missing,
            referenced_by,
        },
        TraversalError::CycleDetected { node } => StructuralViolation::CycleDetected { node },
        TraversalError::Registry(StoreError::ManifestNotFound { id }) => {
            StructuralViolation::MissingManifest { id }
        }
        TraversalError::Registry(StoreError::CorruptManifest { id, reason }) => {
            StructuralViolation::CorruptManifest { id, reason }
        }
        TraversalError::Registry(err) => StructuralViolation::Store {
            id: *queried,
            reason: err.to_string(),
        },
    }
}
