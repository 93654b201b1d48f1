use crate::{
    config::{Config, Value},
    graph::{DependencyNode, NodeFunction},
    types::IndexMap,
    value::{ComputedValue, ValueSpecification},
};
use derive_more::{Debug, Deref};
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single node's function. Isolated to that node (and, through
/// propagation, its dependents) by the graph executor.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum FunctionError {
    #[error("no function registered as {0}")]
    UnknownFunction(String),
    #[error("input {0} is not available")]
    MissingInput(ValueSpecification),
    #[error("{0}")]
    Failed(String),
}

/// Input values of one node invocation, read from the configuration's cache.
#[derive(Debug, Deref)]
pub struct FunctionInputs<V>(IndexMap<ValueSpecification, V>);

impl<V> Default for FunctionInputs<V> {
    fn default() -> Self {
        Self(IndexMap::default())
    }
}

impl<V> FunctionInputs<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, specification: ValueSpecification, value: V) {
        self.0.insert(specification, value);
    }

    /// # Errors
    /// `specification` was not among the node's inputs.
    pub fn value(&self, specification: &ValueSpecification) -> Result<&V, FunctionError> {
        self.0
            .get(specification)
            .ok_or_else(|| FunctionError::MissingInput(specification.clone()))
    }
}

impl<V> FromIterator<(ValueSpecification, V)> for FunctionInputs<V> {
    fn from_iter<I: IntoIterator<Item = (ValueSpecification, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The node-level function runtime invoked by graph executors.
///
/// `invoke` is called at most once per node and cycle, only after every
/// input of the node is present in the cache. Returned values whose
/// specification the node does not declare as an output are ignored.
pub trait FunctionInvoker<C: Config>: Send + Sync {
    /// # Errors
    /// The function could not produce its outputs.
    fn invoke(
        &self,
        node: &DependencyNode,
        inputs: &FunctionInputs<Value<C>>,
    ) -> Result<Vec<ComputedValue<Value<C>>>, FunctionError>;
}

type FunctionImpl<C> = dyn Fn(&DependencyNode, &FunctionInputs<Value<C>>) -> Result<Vec<ComputedValue<Value<C>>>, FunctionError>
    + Send
    + Sync;

/// [`FunctionInvoker`] dispatching on the node's function id to registered
/// closures.
#[derive(Debug)]
pub struct FunctionRepository<C: Config> {
    #[debug(skip)]
    functions: IndexMap<String, Arc<FunctionImpl<C>>>,
}

impl<C: Config> Default for FunctionRepository<C> {
    fn default() -> Self {
        Self {
            functions: IndexMap::default(),
        }
    }
}

impl<C: Config> FunctionRepository<C> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_function<F>(mut self, function_id: impl Into<String>, function: F) -> Self
    where
        F: Fn(&DependencyNode, &FunctionInputs<Value<C>>) -> Result<Vec<ComputedValue<Value<C>>>, FunctionError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(function_id.into(), Arc::new(function));
        self
    }

    pub fn contains(&self, function_id: &str) -> bool {
        self.functions.contains_key(function_id)
    }
}

impl<C: Config> FunctionInvoker<C> for FunctionRepository<C> {
    fn invoke(
        &self,
        node: &DependencyNode,
        inputs: &FunctionInputs<Value<C>>,
    ) -> Result<Vec<ComputedValue<Value<C>>>, FunctionError> {
        match node.function() {
            NodeFunction::Compute { function_id } => {
                let function = self
                    .functions
                    .get(function_id)
                    .ok_or_else(|| FunctionError::UnknownFunction(function_id.clone()))?;
                function(node, inputs)
            }
            NodeFunction::LiveDataSourcing { requirement } => Err(FunctionError::Failed(format!(
                "live data for {requirement} is sourced from the snapshot, not invoked"
            ))),
        }
    }
}
