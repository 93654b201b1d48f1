use crate::{
    sync::{RwLock, recover},
    types::{HashSet, NodeId},
};

/// Cycle-local execution status of dependency nodes.
///
/// Graph nodes are shared between cycles and stay immutable; whether a node
/// ran or failed in *this* cycle is recorded here by node id. Both sets sit
/// behind one reader/writer lock because they are written by graph executor
/// workers while the controlling thread reads them.
///
/// A node is never recorded as both executed and failed: marking one clears
/// the other.
#[derive(Debug)]
pub struct NodeExecutionStatus {
    sets: RwLock<StatusSets>,
}

#[derive(Debug, Default)]
struct StatusSets {
    executed: HashSet<NodeId>,
    failed: HashSet<NodeId>,
}

impl Default for NodeExecutionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeExecutionStatus {
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(StatusSets::default()),
        }
    }

    pub fn is_executed(&self, node: NodeId) -> bool {
        recover(self.sets.read()).executed.contains(&node)
    }

    pub fn mark_executed(&self, node: NodeId) {
        let mut sets = recover(self.sets.write());
        sets.failed.remove(&node);
        sets.executed.insert(node);
    }

    pub fn is_failed(&self, node: NodeId) -> bool {
        recover(self.sets.read()).failed.contains(&node)
    }

    pub fn mark_failed(&self, node: NodeId) {
        let mut sets = recover(self.sets.write());
        sets.executed.remove(&node);
        sets.failed.insert(node);
    }

    pub fn executed_count(&self) -> usize {
        recover(self.sets.read()).executed.len()
    }

    pub fn failed_count(&self) -> usize {
        recover(self.sets.read()).failed.len()
    }
}
