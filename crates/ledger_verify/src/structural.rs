use std::collections::{HashMap, HashSet};
use std::fmt;

use ledger_core::Digest;
use ledger_store::{NodeRegistry, ObjectStore, StoreError};

/// A violated clause of the derivation contract, always naming the
/// offending node. "Invalid" without a clause and a node id is useless to
/// both humans and CI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralViolation {
    MissingManifest {
        id: Digest,
    },
    CorruptManifest {
        id: Digest,
        reason: String,
    },
    MalformedManifest {
        id: Digest,
        reason: String,
    },
    MissingObject {
        id: Digest,
    },
    /// The recomputed artifact digest disagrees with the node id. Tamper
    /// signal, not a repair target.
    DigestMismatch {
        id: Digest,
        actual: Digest,
    },
    UnreachableParent {
        missing: Digest,
        referenced_by: Digest,
    },
    CycleDetected {
        node: Digest,
    },
    Store {
        id: Digest,
        reason: String,
    },
}

impl StructuralViolation {
    /// The node the violation is anchored to.
    pub fn node(&self) -> Digest {
        match self {
            StructuralViolation::MissingManifest { id }
            | StructuralViolation::CorruptManifest { id, .. }
            | StructuralViolation::MalformedManifest { id, .. }
            | StructuralViolation::MissingObject { id }
            | StructuralViolation::DigestMismatch { id, .. }
            | StructuralViolation::Store { id, .. } => *id,
            StructuralViolation::UnreachableParent { missing, .. } => *missing,
            StructuralViolation::CycleDetected { node } => *node,
        }
    }
}

impl fmt::Display for StructuralViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralViolation::MissingManifest { id } => {
                write!(f, "missing manifest: {}", id)
            }
            StructuralViolation::CorruptManifest { id, reason } => {
                write!(f, "corrupt manifest for {}: {}", id, reason)
            }
            StructuralViolation::MalformedManifest { id, reason } => {
                write!(f, "malformed manifest for {}: {}", id, reason)
            }
            StructuralViolation::MissingObject { id } => {
                write!(f, "missing object: {}", id)
            }
            StructuralViolation::DigestMismatch { id, actual } => {
                write!(f, "object hash mismatch: expected {}, got {}", id, actual)
            }
            StructuralViolation::UnreachableParent {
                missing,
                referenced_by,
            } => {
                write!(
                    f,
                    "missing parent manifest {} referenced by {}",
                    missing, referenced_by
                )
            }
            StructuralViolation::CycleDetected { node } => {
                write!(f, "lineage cycle through {}", node)
            }
            StructuralViolation::Store { id, reason } => {
                write!(f, "storage error at {}: {}", id, reason)
            }
        }
    }
}

impl std::error::Error for StructuralViolation {}

/// The weak tier of verification: "the claimed lineage is internally
/// consistent, and every ancestor's is too." Never executes any code.
///
/// Ancestor verdicts are memoized, so verifying every node of a deep or
/// wide graph stays linear even with heavily shared ancestry. Traversal is
/// an explicit stack keyed by node id: long chains cannot exhaust the call
/// stack, and a cycle is detected deterministically.
pub struct StructuralChecker<'a> {
    registry: &'a NodeRegistry,
    objects: &'a ObjectStore,
    memo: HashMap<Digest, Result<(), StructuralViolation>>,
}

impl<'a> StructuralChecker<'a> {
    pub fn new(registry: &'a NodeRegistry, objects: &'a ObjectStore) -> Self {
        StructuralChecker {
            registry,
            objects,
            memo: HashMap::new(),
        }
    }

    /// Check `id` and its full ancestry against the derivation contract.
    pub fn check(&mut self, id: &Digest) -> Result<(), StructuralViolation> {
        if let Some(verdict) = self.memo.get(id) {
            return verdict.clone();
        }

        let mut stack: Vec<Frame> = vec![Frame::start(*id)];
        let mut on_path: HashSet<Digest> = HashSet::from([*id]);

        while let Some(top) = stack.last() {
            let node = top.node;

            if stack.last().expect("top").parents.is_none() {
                // First touch: run the node-local clauses and load parents.
                let parents = match self.check_local(&node) {
                    Ok(parents) => parents,
                    Err(violation) => {
                        self.memo.insert(node, Err(violation.clone()));
                        return Err(violation);
                    }
                };
                stack.last_mut().expect("top").parents = Some(parents);
                continue;
            }

            let frame = stack.last_mut().expect("top");
            let parents = frame.parents.as_ref().expect("loaded");
            if frame.next < parents.len() {
                let parent = parents[frame.next];
                frame.next += 1;

                match self.memo.get(&parent) {
                    Some(Ok(())) => continue,
                    Some(Err(violation)) => {
                        let violation = violation.clone();
                        self.memo.insert(node, Err(violation.clone()));
                        return Err(violation);
                    }
                    None => {}
                }
                if on_path.contains(&parent) {
                    let violation = StructuralViolation::CycleDetected { node: parent };
                    self.memo.insert(parent, Err(violation.clone()));
                    return Err(violation);
                }
                if !self.registry.exists(&parent) {
                    let violation = StructuralViolation::UnreachableParent {
                        missing: parent,
                        referenced_by: node,
                    };
                    self.memo.insert(node, Err(violation.clone()));
                    return Err(violation);
                }
                on_path.insert(parent);
                stack.push(Frame::start(parent));
                continue;
            }

            // Node-local clauses passed and every ancestor is valid.
            let finished = stack.pop().expect("top");
            on_path.remove(&finished.node);
            self.memo.insert(finished.node, Ok(()));
        }

        Ok(())
    }

    /// Node-local clauses: manifest readable and well-formed, artifact
    /// present, recomputed digest equal to the id (case-normalized by
    /// construction of `Digest`).
    fn check_local(&self, id: &Digest) -> Result<Vec<Digest>, StructuralViolation> {
        let manifest = match self.registry.get(id) {
            Ok(manifest) => manifest,
            Err(StoreError::ManifestNotFound { id }) => {
                return Err(StructuralViolation::MissingManifest { id });
            }
            Err(StoreError::CorruptManifest { id, reason }) => {
                return Err(StructuralViolation::CorruptManifest { id, reason });
            }
            Err(err) => {
                return Err(StructuralViolation::Store {
                    id: *id,
                    reason: err.to_string(),
                });
            }
        };

        if let Err(err) = manifest.validate() {
            return Err(StructuralViolation::MalformedManifest {
                id: *id,
                reason: err.to_string(),
            });
        }

        let bytes = match self.objects.get(id) {
            Ok(bytes) => bytes,
            Err(StoreError::ObjectNotFound { digest }) => {
                return Err(StructuralViolation::MissingObject { id: digest });
            }
            Err(err) => {
                return Err(StructuralViolation::Store {
                    id: *id,
                    reason: err.to_string(),
                });
            }
        };

        let actual = Digest::of_bytes(&bytes);
        if actual != *id {
            return Err(StructuralViolation::DigestMismatch { id: *id, actual });
        }

        Ok(manifest.parents)
    }
}

struct Frame {
    node: Digest,
    parents: Option<Vec<Digest>>,
    next: usize,
}

impl Frame {
    fn start(node: Digest) -> Self {
        Frame {
            node,
            parents: None,
            next: 0,
        }
    }
}
