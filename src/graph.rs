use crate::{
    types::{HashMap, IndexMap, IndexSet, NodeId},
    value::{ComputationTargetSpecification, ValueRequirement, ValueSpecification},
};
use core::fmt;
use derive_more::Display;
use rustc_hash::FxBuildHasher;
use std::{collections::VecDeque, sync::Arc};
use thiserror::Error;

/// Error returned when a dependency graph cannot be assembled.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum GraphError {
    /// Two nodes were added under the same id.
    #[error("node {0} is defined more than once")]
    DuplicateNode(NodeId),
    /// Two nodes declare the same output.
    #[error("{specification} is produced by both node {first} and node {second}")]
    DuplicateProducer {
        specification: ValueSpecification,
        first: NodeId,
        second: NodeId,
    },
    /// The declared inputs and outputs form cycle(s).
    #[error("graph contains cycle(s)")]
    Cycle,
}

/// What a node does when it is executed.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub enum NodeFunction {
    /// Placeholder for an externally supplied value. Its output is placed in
    /// the cache while inputs are prepared, so it is never invoked.
    #[display("LiveDataSourcing[{requirement}]")]
    LiveDataSourcing { requirement: ValueRequirement },
    /// A calculation looked up by id in the function runtime.
    #[display("{function_id}")]
    Compute { function_id: String },
}

/// A unit of computation: one function applied to one target.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyNode {
    id: NodeId,
    target: ComputationTargetSpecification,
    function: NodeFunction,
    inputs: IndexSet<ValueSpecification>,
    outputs: IndexSet<ValueSpecification>,
}

impl DependencyNode {
    /// A node computing `function_id` on `target`; declare its values with
    /// [`with_input`](Self::with_input) and [`with_output`](Self::with_output).
    pub fn compute(
        id: NodeId,
        target: ComputationTargetSpecification,
        function_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            target,
            function: NodeFunction::Compute {
                function_id: function_id.into(),
            },
            inputs: IndexSet::default(),
            outputs: IndexSet::default(),
        }
    }

    /// A node sourcing `requirement` from market data.
    pub fn live_data(id: NodeId, requirement: ValueRequirement) -> Self {
        let output = ValueSpecification::from_requirement(&requirement);
        Self {
            id,
            target: requirement.target().clone(),
            function: NodeFunction::LiveDataSourcing { requirement },
            inputs: IndexSet::default(),
            outputs: IndexSet::from_iter([output]),
        }
    }

    #[must_use]
    pub fn with_input(mut self, specification: ValueSpecification) -> Self {
        self.inputs.insert(specification);
        self
    }

    #[must_use]
    pub fn with_output(mut self, specification: ValueSpecification) -> Self {
        self.outputs.insert(specification);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn target(&self) -> &ComputationTargetSpecification {
        &self.target
    }

    pub fn function(&self) -> &NodeFunction {
        &self.function
    }

    pub fn is_live_data_sourcing(&self) -> bool {
        matches!(self.function, NodeFunction::LiveDataSourcing { .. })
    }

    pub fn input_values(&self) -> &IndexSet<ValueSpecification> {
        &self.inputs
    }

    pub fn output_values(&self) -> &IndexSet<ValueSpecification> {
        &self.outputs
    }
}

/// Assembles and validates a [`DependencyGraph`].
#[derive(Debug)]
pub struct DependencyGraphBuilder {
    configuration_name: String,
    nodes: Vec<DependencyNode>,
    terminal_outputs: IndexSet<ValueSpecification>,
}

impl DependencyGraphBuilder {
    pub fn new(configuration_name: impl Into<String>) -> Self {
        Self {
            configuration_name: configuration_name.into(),
            nodes: Vec::new(),
            terminal_outputs: IndexSet::default(),
        }
    }

    #[must_use]
    pub fn node(mut self, node: DependencyNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Marks `specification` as an output the view explicitly asked for.
    #[must_use]
    pub fn terminal_output(mut self, specification: ValueSpecification) -> Self {
        self.terminal_outputs.insert(specification);
        self
    }

    /// Resolves every declared input to its producing node and computes a
    /// topological order.
    ///
    /// Inputs without a producer are allowed: they are expected to be found in
    /// the cache (or to be missing, in which case the consumer fails at run
    /// time).
    ///
    /// # Errors
    /// On duplicate node ids, duplicate producers, or cycles.
    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        let Self {
            configuration_name,
            nodes: node_list,
            terminal_outputs,
        } = self;

        let mut nodes = IndexMap::with_capacity_and_hasher(node_list.len(), FxBuildHasher);
        let mut producers = HashMap::default();
        for node in node_list {
            for output in &node.outputs {
                if let Some(&first) = producers.get(output) {
                    return Err(GraphError::DuplicateProducer {
                        specification: output.clone(),
                        first,
                        second: node.id,
                    });
                }
                producers.insert(output.clone(), node.id);
            }
            let id = node.id;
            if nodes.insert(id, node).is_some() {
                return Err(GraphError::DuplicateNode(id));
            }
        }

        // Edges: a node's parents are the producers of its inputs.
        let mut input_nodes: IndexMap<NodeId, IndexSet<NodeId>> = IndexMap::default();
        let mut dependent_nodes: IndexMap<NodeId, IndexSet<NodeId>> = IndexMap::default();
        for node in nodes.values() {
            for input in &node.inputs {
                let Some(&producer) = producers.get(input) else {
                    continue;
                };
                if producer == node.id {
                    return Err(GraphError::Cycle);
                }
                input_nodes.entry(node.id).or_default().insert(producer);
                dependent_nodes.entry(producer).or_default().insert(node.id);
            }
        }

        let order = topological_order(&nodes, &input_nodes, &dependent_nodes)?;

        Ok(DependencyGraph {
            configuration_name,
            nodes,
            producers,
            input_nodes,
            dependent_nodes,
            order,
            terminal_outputs,
        })
    }
}

/// Kahn-like ordering with progress detection.
///
/// Roots come first in insertion order. Each candidate child is placed once
/// all of its parents are placed; otherwise it is deferred until a missing
/// parent is placed and re-enqueues it. If no candidate could be placed for
/// as many iterations as the queue held at the last placement, the remaining
/// nodes form a cycle.
fn topological_order(
    nodes: &IndexMap<NodeId, DependencyNode>,
    input_nodes: &IndexMap<NodeId, IndexSet<NodeId>>,
    dependent_nodes: &IndexMap<NodeId, IndexSet<NodeId>>,
) -> Result<Vec<NodeId>, GraphError> {
    let mut placed: IndexSet<NodeId> = nodes
        .keys()
        .filter(|id| !input_nodes.contains_key(*id))
        .copied()
        .collect();
    if placed.is_empty() && !nodes.is_empty() {
        return Err(GraphError::Cycle);
    }

    let mut pending_queue = VecDeque::new();
    let mut pending_set = IndexSet::default();
    for id in &placed {
        for &child in dependent_nodes.get(id).into_iter().flatten() {
            if pending_set.insert(child) {
                pending_queue.push_back(child);
            }
        }
    }

    let mut last_progress_iter = 0usize;
    let mut last_progress_queue_len = pending_queue.len();
    let mut iter = 0usize;

    'process_pending: while let Some(id) = pending_queue.pop_front() {
        pending_set.swap_remove(&id);
        if iter - last_progress_iter >= last_progress_queue_len {
            return Err(GraphError::Cycle);
        }
        iter += 1;
        for parent in input_nodes.get(&id).into_iter().flatten() {
            if !placed.contains(parent) {
                continue 'process_pending;
            }
        }
        placed.insert(id);
        for &child in dependent_nodes.get(&id).into_iter().flatten() {
            if pending_set.insert(child) {
                pending_queue.push_back(child);
            }
        }
        last_progress_iter = iter;
        last_progress_queue_len = pending_queue.len();
    }

    if placed.len() != nodes.len() {
        return Err(GraphError::Cycle);
    }
    Ok(placed.into_iter().collect())
}

/// Immutable graph of the calculations for one calculation configuration.
#[derive(Debug)]
pub struct DependencyGraph {
    configuration_name: String,
    nodes: IndexMap<NodeId, DependencyNode>,
    producers: HashMap<ValueSpecification, NodeId>,
    input_nodes: IndexMap<NodeId, IndexSet<NodeId>>,
    dependent_nodes: IndexMap<NodeId, IndexSet<NodeId>>,
    order: Vec<NodeId>,
    terminal_outputs: IndexSet<ValueSpecification>,
}

impl DependencyGraph {
    pub fn builder(configuration_name: impl Into<String>) -> DependencyGraphBuilder {
        DependencyGraphBuilder::new(configuration_name)
    }

    pub fn configuration_name(&self) -> &str {
        &self.configuration_name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(&id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    /// Node ids such that every node comes after the producers of its inputs.
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn producer_of(&self, specification: &ValueSpecification) -> Option<NodeId> {
        self.producers.get(specification).copied()
    }

    /// Nodes producing the inputs of `id`.
    pub fn input_nodes(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.input_nodes.get(&id).into_iter().flatten().copied()
    }

    /// Nodes consuming an output of `id`.
    pub fn dependent_nodes(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.dependent_nodes.get(&id).into_iter().flatten().copied()
    }

    /// Every value produced by a node of this graph.
    pub fn output_values(&self) -> impl Iterator<Item = &ValueSpecification> {
        self.nodes.values().flat_map(|node| node.outputs.iter())
    }

    pub fn terminal_output_values(&self) -> &IndexSet<ValueSpecification> {
        &self.terminal_outputs
    }

    /// Market data this graph consumes, keyed by the requirement asked of the
    /// snapshot provider.
    pub fn live_data_requirements(&self) -> IndexMap<ValueRequirement, ValueSpecification> {
        self.nodes
            .values()
            .filter_map(|node| match &node.function {
                NodeFunction::LiveDataSourcing { requirement } => Some((
                    requirement.clone(),
                    ValueSpecification::from_requirement(requirement),
                )),
                NodeFunction::Compute { .. } => None,
            })
            .collect()
    }

    /// A derived view holding the nodes accepted by `filter`, in topological
    /// order. The graph itself is not modified.
    pub fn sub_graph(self: &Arc<Self>, mut filter: impl FnMut(&DependencyNode) -> bool) -> SubGraph {
        let nodes = self
            .order
            .iter()
            .filter(|id| filter(&self.nodes[*id]))
            .copied()
            .collect();
        SubGraph {
            graph: Arc::clone(self),
            nodes,
        }
    }
}

/// Part of a [`DependencyGraph`] selected for execution.
#[derive(Debug, Clone)]
pub struct SubGraph {
    graph: Arc<DependencyGraph>,
    nodes: IndexSet<NodeId>,
}

impl fmt::Display for SubGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DependencyGraph[{} of {} nodes for {}]",
            self.nodes.len(),
            self.graph.len(),
            self.graph.configuration_name()
        )
    }
}

impl SubGraph {
    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    pub fn configuration_name(&self) -> &str {
        self.graph.configuration_name()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Node ids in topological order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.iter().filter_map(|id| self.graph.node(*id))
    }
}
