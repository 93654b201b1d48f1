use crate::{
    cache::ComputationCache,
    graph::DependencyGraph,
    types::{IndexSet, NodeId},
};
use derive_more::Debug;

/// Splits the nodes of a graph into those whose outputs may differ from the
/// previous cycle and those that provably reproduce them.
///
/// Walking the graph in topological order, a node is changed when
/// - any node producing one of its inputs changed, or
/// - an input without a producer in the graph (market data fed straight into
///   the cache) differs between the two caches, or
/// - it is a live data node whose value differs between the two caches, or
/// - any of its outputs has no value in the previous cache (never computed,
///   or failed last time).
///
/// Everything else is unchanged: identical inputs through the same function
/// give identical outputs, so unchanged-ness is transitive downstream.
#[derive(Debug)]
pub struct LiveDataDeltaCalculator<'a, V> {
    #[debug(skip)]
    graph: &'a DependencyGraph,
    #[debug(skip)]
    cache: &'a dyn ComputationCache<V>,
    #[debug(skip)]
    previous_cache: &'a dyn ComputationCache<V>,
    changed: IndexSet<NodeId>,
    unchanged: IndexSet<NodeId>,
}

impl<'a, V: PartialEq> LiveDataDeltaCalculator<'a, V> {
    pub fn new(
        graph: &'a DependencyGraph,
        cache: &'a dyn ComputationCache<V>,
        previous_cache: &'a dyn ComputationCache<V>,
    ) -> Self {
        Self {
            graph,
            cache,
            previous_cache,
            changed: IndexSet::default(),
            unchanged: IndexSet::default(),
        }
    }

    pub fn compute_delta(&mut self) {
        for &id in self.graph.topological_order() {
            if self.unchanged.contains(&id) || self.changed.contains(&id) {
                continue;
            }
            if self.has_changed(id) {
                self.changed.insert(id);
            } else {
                self.unchanged.insert(id);
            }
        }
    }

    fn has_changed(&self, id: NodeId) -> bool {
        // Producers precede `id` in topological order, so they are classified.
        if self
            .graph
            .input_nodes(id)
            .any(|input| self.changed.contains(&input))
        {
            return true;
        }
        let Some(node) = self.graph.node(id) else {
            return true;
        };
        let external_input_changed = node
            .input_values()
            .iter()
            .filter(|spec| self.graph.producer_of(spec).is_none())
            .any(|spec| self.cache.get_value(spec) != self.previous_cache.get_value(spec));
        if external_input_changed {
            return true;
        }
        node.output_values().iter().any(|spec| {
            let Some(previous) = self.previous_cache.get_value(spec) else {
                return true;
            };
            node.is_live_data_sourcing() && self.cache.get_value(spec).as_ref() != Some(&previous)
        })
    }

    pub fn changed_nodes(&self) -> &IndexSet<NodeId> {
        &self.changed
    }

    pub fn unchanged_nodes(&self) -> &IndexSet<NodeId> {
        &self.unchanged
    }
}
