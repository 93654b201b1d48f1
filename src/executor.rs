mod execute;
mod plan;

use crate::{
    cache::{CacheSelectHint, ComputationCache},
    config::{Config, Value},
    executor::{execute::GraphRun, plan::ExecutionPlan},
    function::FunctionInvoker,
    graph::SubGraph,
    handle::ExecutionHandle,
    stats::{GraphExecutionStatistics, GraphExecutorStatisticsGatherer},
    status::NodeExecutionStatus,
};
use derive_more::Debug;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::{sync::Arc, time::Instant};
use tracing::debug;

/// One unit of work handed to a [`DependencyGraphExecutor`]: a sub-graph of a
/// single calculation configuration together with the cache it reads inputs
/// from and writes outputs to, and the cycle's node status it reports into.
#[derive(Debug, Clone)]
pub struct GraphSubmission<V> {
    pub graph: SubGraph,
    #[debug(skip)]
    pub cache: Arc<dyn ComputationCache<V>>,
    /// Partition node outputs are written to.
    pub cache_hint: CacheSelectHint,
    pub status: Arc<NodeExecutionStatus>,
}

/// Runs sub-graphs asynchronously.
///
/// The executor owns intra-graph parallelism and ordering (a node runs only
/// after the producers of its inputs inside the sub-graph) and isolates node
/// failures: a failed node is marked failed, its dependents are marked failed
/// without being invoked, and unrelated nodes proceed. The returned handle
/// only reports failures of the submission as a whole.
pub trait DependencyGraphExecutor<C: Config>: Send + Sync {
    fn execute(
        &self,
        submission: GraphSubmission<Value<C>>,
        statistics: Arc<dyn GraphExecutorStatisticsGatherer>,
    ) -> ExecutionHandle;
}

/// [`DependencyGraphExecutor`] running every submission on a rayon pool.
///
/// Scheduling per submission:
/// - Roots of the sub-graph (no parent inside it) are spawned onto one rayon
///   scope.
/// - A child whose only parent in the sub-graph is the finished node becomes
///   ready right after it, without synchronization ("owned"). One ready child
///   continues on the same worker; the others are spawned onto the scope.
/// - A child with several parents ("shared") holds a countdown of unfinished
///   parents; the parent that brings it to zero runs it. A Release fence
///   before the decrements and an Acquire fence before running a promoted
///   child order each parent's writes before the child's reads.
#[must_use]
#[derive(Debug)]
pub struct ParallelGraphExecutor<C: Config> {
    pool: Arc<ThreadPool>,
    #[debug(skip)]
    invoker: Arc<dyn FunctionInvoker<C>>,
}

impl<C: Config> ParallelGraphExecutor<C> {
    pub fn new(pool: Arc<ThreadPool>, invoker: Arc<dyn FunctionInvoker<C>>) -> Self {
        Self { pool, invoker }
    }

    /// Builds a dedicated pool of `num_threads` workers.
    ///
    /// # Errors
    /// The thread pool could not be created.
    pub fn with_threads(
        num_threads: usize,
        invoker: Arc<dyn FunctionInvoker<C>>,
    ) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|idx| format!("graph-executor-{idx}"))
            .build()?;
        Ok(Self::new(Arc::new(pool), invoker))
    }
}

impl<C: Config> DependencyGraphExecutor<C> for ParallelGraphExecutor<C> {
    fn execute(
        &self,
        submission: GraphSubmission<Value<C>>,
        statistics: Arc<dyn GraphExecutorStatisticsGatherer>,
    ) -> ExecutionHandle {
        let (handle, completer) = ExecutionHandle::new();
        let invoker = Arc::clone(&self.invoker);
        self.pool.spawn(move || {
            let started = Instant::now();
            let plan = match ExecutionPlan::new(&submission.graph) {
                Ok(plan) => plan,
                Err(err) => {
                    completer.complete(Err(err));
                    return;
                }
            };
            let run = GraphRun::<C> {
                plan,
                submission: &submission,
                invoker: invoker.as_ref(),
                completer: &completer,
                counters: Default::default(),
            };
            run.run();
            let (executed_nodes, failed_nodes) = run.counts();
            let processed_nodes = submission.graph.len();
            let report = GraphExecutionStatistics {
                configuration: submission.graph.configuration_name().to_owned(),
                processed_nodes,
                executed_nodes,
                failed_nodes,
                skipped_nodes: processed_nodes - executed_nodes - failed_nodes,
                duration: started.elapsed(),
            };
            debug!(
                configuration = %report.configuration,
                executed = report.executed_nodes,
                failed = report.failed_nodes,
                skipped = report.skipped_nodes,
                "Finished executing {}",
                submission.graph
            );
            statistics.graph_executed(report);
            completer.complete(Ok(()));
        });
        handle
    }
}
