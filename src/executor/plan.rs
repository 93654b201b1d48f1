use crate::{
    graph::SubGraph,
    handle::ExecutionError,
    types::{HashMap, NodeId},
};
use core::sync::atomic::AtomicU32;
use rustc_hash::FxBuildHasher;
use unzip3::Unzip3;

/// Scheduling layout of one submitted sub-graph.
///
/// Slots are indexed in the sub-graph's topological order; children are
/// referenced by slot index.
#[derive(Debug)]
pub(super) struct ExecutionPlan {
    pub(super) slots: Vec<NodeSlot>,
    pub(super) counters: Vec<ParentCounter>,
    /// Slots without a parent inside the sub-graph.
    pub(super) roots: Vec<u32>,
}

#[derive(Debug)]
pub(super) struct NodeSlot {
    pub(super) node: NodeId,
    /// Producers of this node's inputs that are part of the sub-graph.
    pub(super) parents: Vec<NodeId>,
    /// Children whose only parent in the sub-graph is this node. They can be
    /// started right after this node completes, without synchronization.
    pub(super) owned_children: Vec<u32>,
    /// Children with several parents in the sub-graph.
    pub(super) shared_children: Vec<u32>,
}

#[derive(Debug)]
#[repr(align(128))]
pub(super) struct ParentCounter {
    /// Number of parents that haven't finished yet.
    pub(super) parents_left: AtomicU32,
}

impl ExecutionPlan {
    /// # Errors
    /// The sub-graph cannot be indexed with `u32`.
    pub(super) fn new(sub_graph: &SubGraph) -> Result<Self, ExecutionError> {
        let len = sub_graph.len();
        if u32::try_from(len).is_err() {
            return Err(ExecutionError::PlanTooLarge(len));
        }
        let graph = sub_graph.graph();
        let index: HashMap<NodeId, u32> = sub_graph.node_ids().zip(0u32..).collect();
        let mut parents: Vec<Vec<NodeId>> = sub_graph
            .node_ids()
            .map(|id| {
                graph
                    .input_nodes(id)
                    .filter(|parent| index.contains_key(parent))
                    .collect()
            })
            .collect();

        let parent_counts: Vec<usize> = parents.iter().map(Vec::len).collect();
        let mut children_index = HashMap::with_capacity_and_hasher(len, FxBuildHasher);
        for (child_idx, child_parents) in parents.iter().enumerate() {
            for parent in child_parents {
                children_index
                    .entry(*parent)
                    .or_insert_with(Vec::new)
                    .push(child_idx);
            }
        }

        let (slots, counters, is_root): (Vec<_>, Vec<_>, Vec<_>) = sub_graph
            .node_ids()
            .zip(parents.iter_mut())
            .map(|(node, node_parents)| {
                let mut owned_children = vec![];
                let mut shared_children = vec![];
                for &child_idx in children_index.get(&node).into_iter().flatten() {
                    // `len` fits in u32, checked above.
                    let child_slot = child_idx as u32;
                    if parent_counts[child_idx] == 1 {
                        owned_children.push(child_slot);
                    } else {
                        shared_children.push(child_slot);
                    }
                }
                // Sort children's indexes to achieve better cache locality.
                owned_children.sort_unstable();
                shared_children.sort_unstable();
                let parents_total = node_parents.len() as u32;
                let slot = NodeSlot {
                    node,
                    parents: core::mem::take(node_parents),
                    owned_children,
                    shared_children,
                };
                let counter = ParentCounter {
                    parents_left: AtomicU32::new(parents_total),
                };
                (slot, counter, parents_total == 0)
            })
            .unzip3();

        let roots = is_root
            .into_iter()
            .zip(0u32..)
            .filter_map(|(root, idx)| root.then_some(idx))
            .collect();

        Ok(Self {
            slots,
            counters,
            roots,
        })
    }
}
