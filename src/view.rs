use crate::{
    cache::ComputationCacheSource,
    config::{Config, Value},
    executor::DependencyGraphExecutor,
    graph::DependencyGraph,
    stats::GraphExecutorStatisticsGatherer,
    types::IndexMap,
    value::{ComputationTargetType, Portfolio, ValueRequirement, ValueSpecification},
};
use core::time::Duration;
use derive_more::Debug;
use std::{path::PathBuf, sync::Arc};

/// How long the controlling thread waits on one execution handle before
/// moving on to the next pending one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Which computed values of a target type end up in the result model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultOutputMode {
    None,
    /// Only values the view explicitly asked for.
    TerminalOutputs,
    #[default]
    All,
}

/// Result-model filtering policy of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultModelDefinition {
    portfolio_node_outputs: ResultOutputMode,
    position_outputs: ResultOutputMode,
    security_outputs: ResultOutputMode,
    primitive_outputs: ResultOutputMode,
}

impl Default for ResultModelDefinition {
    fn default() -> Self {
        Self::uniform(ResultOutputMode::All)
    }
}

impl ResultModelDefinition {
    pub fn uniform(mode: ResultOutputMode) -> Self {
        Self {
            portfolio_node_outputs: mode,
            position_outputs: mode,
            security_outputs: mode,
            primitive_outputs: mode,
        }
    }

    #[must_use]
    pub fn with_output_mode(mut self, target_type: ComputationTargetType, mode: ResultOutputMode) -> Self {
        *self.mode_mut(target_type) = mode;
        self
    }

    pub fn output_mode(&self, target_type: ComputationTargetType) -> ResultOutputMode {
        match target_type {
            ComputationTargetType::PortfolioNode => self.portfolio_node_outputs,
            ComputationTargetType::Position => self.position_outputs,
            ComputationTargetType::Security => self.security_outputs,
            ComputationTargetType::Primitive => self.primitive_outputs,
        }
    }

    fn mode_mut(&mut self, target_type: ComputationTargetType) -> &mut ResultOutputMode {
        match target_type {
            ComputationTargetType::PortfolioNode => &mut self.portfolio_node_outputs,
            ComputationTargetType::Position => &mut self.position_outputs,
            ComputationTargetType::Security => &mut self.security_outputs,
            ComputationTargetType::Primitive => &mut self.primitive_outputs,
        }
    }

    pub fn should_output_result(&self, specification: &ValueSpecification, graph: &DependencyGraph) -> bool {
        match self.output_mode(specification.target().target_type()) {
            ResultOutputMode::None => false,
            ResultOutputMode::TerminalOutputs => {
                graph.terminal_output_values().contains(specification)
            }
            ResultOutputMode::All => true,
        }
    }
}

/// Static definition of a view plus its cycle settings.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    name: String,
    result_model_definition: ResultModelDefinition,
    dump_computation_cache_to_disk: bool,
    dump_directory: Option<PathBuf>,
    poll_interval: Duration,
}

impl ViewDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result_model_definition: ResultModelDefinition::default(),
            dump_computation_cache_to_disk: false,
            dump_directory: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_result_model_definition(mut self, definition: ResultModelDefinition) -> Self {
        self.result_model_definition = definition;
        self
    }

    /// Dump every configuration's cache to a temporary file on release.
    #[must_use]
    pub fn with_dump_computation_cache_to_disk(mut self, dump: bool) -> Self {
        self.dump_computation_cache_to_disk = dump;
        self
    }

    /// Directory for cache dumps; the system temporary directory otherwise.
    #[must_use]
    pub fn with_dump_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.dump_directory = Some(directory.into());
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result_model_definition(&self) -> &ResultModelDefinition {
        &self.result_model_definition
    }

    pub fn is_dump_computation_cache_to_disk(&self) -> bool {
        self.dump_computation_cache_to_disk
    }

    pub fn dump_directory(&self) -> Option<&PathBuf> {
        self.dump_directory.as_ref()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Shared services a view's cycles run against.
#[derive(Debug)]
pub struct ViewProcessingContext<C: Config> {
    #[debug(skip)]
    pub cache_source: Arc<dyn ComputationCacheSource<Value<C>>>,
    #[debug(skip)]
    pub graph_executor: Arc<dyn DependencyGraphExecutor<C>>,
    #[debug(skip)]
    pub statistics: Arc<dyn GraphExecutorStatisticsGatherer>,
}

impl<C: Config> Clone for ViewProcessingContext<C> {
    fn clone(&self) -> Self {
        Self {
            cache_source: Arc::clone(&self.cache_source),
            graph_executor: Arc::clone(&self.graph_executor),
            statistics: Arc::clone(&self.statistics),
        }
    }
}

#[derive(Debug)]
pub struct View<C: Config> {
    definition: ViewDefinition,
    processing_context: ViewProcessingContext<C>,
}

impl<C: Config> View<C> {
    pub fn new(definition: ViewDefinition, processing_context: ViewProcessingContext<C>) -> Self {
        Self {
            definition,
            processing_context,
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }

    pub fn processing_context(&self) -> &ViewProcessingContext<C> {
        &self.processing_context
    }
}

/// Compiled form of a view: one dependency graph per calculation
/// configuration, in configuration order.
///
/// Node ids identify nodes within one graph; graphs of different
/// configurations may reuse them.
#[derive(Debug, Clone, Default)]
pub struct ViewEvaluationModel {
    graphs: IndexMap<String, Arc<DependencyGraph>>,
    portfolio: Option<Portfolio>,
    function_init_id: u64,
}

impl ViewEvaluationModel {
    pub fn new(graphs: impl IntoIterator<Item = DependencyGraph>) -> Self {
        Self {
            graphs: graphs
                .into_iter()
                .map(|graph| (graph.configuration_name().to_owned(), Arc::new(graph)))
                .collect(),
            portfolio: None,
            function_init_id: 0,
        }
    }

    #[must_use]
    pub fn with_portfolio(mut self, portfolio: Portfolio) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    #[must_use]
    pub fn with_function_init_id(mut self, function_init_id: u64) -> Self {
        self.function_init_id = function_init_id;
        self
    }

    pub fn configuration_names(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    pub fn dependency_graph(&self, configuration_name: &str) -> Option<&Arc<DependencyGraph>> {
        self.graphs.get(configuration_name)
    }

    pub fn dependency_graphs(&self) -> impl Iterator<Item = (&str, &Arc<DependencyGraph>)> {
        self.graphs.iter().map(|(name, graph)| (name.as_str(), graph))
    }

    pub fn portfolio(&self) -> Option<&Portfolio> {
        self.portfolio.as_ref()
    }

    pub fn function_init_id(&self) -> u64 {
        self.function_init_id
    }

    /// Distinct live data requirements across every configuration.
    pub fn all_live_data_requirements(&self) -> IndexMap<ValueRequirement, ValueSpecification> {
        let mut requirements = IndexMap::default();
        for graph in self.graphs.values() {
            requirements.extend(graph.live_data_requirements());
        }
        requirements
    }
}
