use std::collections::HashSet;

use ledger_core::Digest;
use ledger_store::{NodeRegistry, StoreError};

use crate::error::TraversalError;

/// Derived read-only index over the node registry. Edges are implicit in
/// each manifest's ordered parent list; children are computed on demand,
/// never stored.
#[derive(Debug)]
pub struct EdgeView<'a> {
    registry: &'a NodeRegistry,
}

impl<'a> EdgeView<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        EdgeView { registry }
    }

    /// Direct read of a node's ordered parent ids.
    pub fn parents_of(&self, id: &Digest) -> Result<Vec<Digest>, StoreError> {
        Ok(self.registry.get(id)?.parents)
    }

    /// All nodes that list `id` among their parents, sorted. Linear scan of
    /// the registry; the ledger stores no reverse index.
    pub fn children_of(&self, id: &Digest) -> Result<Vec<Digest>, StoreError> {
        let mut children = Vec::new();
        for candidate in self.registry.ids()? {
            if self.registry.get(&candidate)?.parents.contains(id) {
                children.push(candidate);
            }
        }
        Ok(children)
    }

    /// Lazy traversal of everything reachable from `id` via parent links,
    /// including `id` itself. Each call returns independent state, so the
    /// walk is restartable.
    ///
    /// Order is deterministic and parents-first: a node is yielded only
    /// after all of its ancestors, following declared parent order depth
    /// first. Each node is visited at most once (diamonds converge), a
    /// missing parent manifest yields `UnreachableParent`, and an edge back
    /// into the active path yields `CycleDetected` — the walk fails closed
    /// instead of looping.
    pub fn reachable_from(&self, id: Digest) -> Reachable<'a> {
        Reachable {
            registry: self.registry,
            stack: vec![Frame::start(id)],
            visited: HashSet::new(),
            on_path: HashSet::from([id]),
            done: false,
        }
    }
}

struct Frame {
    node: Digest,
    /// None until the node's manifest has been read.
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

/// Iterative explicit-stack DFS; graphs of unbounded depth cannot exhaust
/// the call stack. Fuses after the first error.
pub struct Reachable<'a> {
    registry: &'a NodeRegistry,
    stack: Vec<Frame>,
    visited: HashSet<Digest>,
    on_path: HashSet<Digest>,
    done: bool,
}

impl Iterator for Reachable<'_> {
    type Item = Result<Digest, TraversalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let depth = self.stack.len();
            if depth == 0 {
                self.done = true;
                return None;
            }

            // Load the top frame's manifest on first touch.
            if self.stack[depth - 1].parents.is_none() {
                let node = self.stack[depth - 1].node;
                match self.registry.get(&node) {
                    Ok(manifest) => {
                        self.stack[depth - 1].parents = Some(manifest.parents);
                    }
                    Err(StoreError::ManifestNotFound { id }) => {
                        self.done = true;
                        // Distinguish a missing ancestor (a lineage break,
                        // named with its referrer) from an absent start node.
                        return Some(Err(match depth.checked_sub(2) {
                            Some(i) => TraversalError::UnreachableParent {
                                missing: id,
                                referenced_by: self.stack[i].node,
                            },
                            None => {
                                TraversalError::Registry(StoreError::ManifestNotFound { id })
                            }
                        }));
                    }
                    Err(err) => {
                        self.done = true;
                        return Some(Err(TraversalError::Registry(err)));
                    }
                }
            }

            let frame = &mut self.stack[depth - 1];
            let parents = frame.parents.as_ref().expect("parents loaded above");

            if frame.next < parents.len() {
                let parent = parents[frame.next];
                frame.next += 1;

                if self.visited.contains(&parent) {
                    continue;
                }
                if self.on_path.contains(&parent) {
                    self.done = true;
                    return Some(Err(TraversalError::CycleDetected { node: parent }));
                }
                self.on_path.insert(parent);
                self.stack.push(Frame::start(parent));
                continue;
            }

            // All parents emitted; the node itself is next in post-order.
            let finished = self.stack.pop().expect("frame present");
            self.on_path.remove(&finished.node);
            self.visited.insert(finished.node);
            return Some(Ok(finished.node));
        }
    }
}
