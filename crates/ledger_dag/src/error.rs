use std::fmt;

use ledger_core::Digest;
use ledger_store::StoreError;

/// Failure modes of a reachability walk. A missing parent is a named
/// lineage-integrity problem, distinct from a generic lookup miss.
#[derive(Debug)]
pub enum TraversalError {
    UnreachableParent {
        missing: Digest,
        referenced_by: Digest,
    },
    /// A parent edge re-entered the active path: the "DAG" is not acyclic.
    CycleDetected { node: Digest },
    Registry(StoreError),
}

impl fmt::Display for TraversalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalError::UnreachableParent {
                missing,
                referenced_by,
            } => write!(
                f,
                "unreachable parent {} referenced by {}",
                missing, referenced_by
            ),
            TraversalError::CycleDetected { node } => {
                write!(f, "cycle detected through {}", node)
            }
            TraversalError::Registry(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for TraversalError {}

impl From<StoreError> for TraversalError {
    fn from(err: StoreError) -> Self {
        TraversalError::Registry(err)
    }
}
