//! One pass of computing a view at a valuation time.
//!
//! A [`SingleComputationCycle`] is driven by a single controlling thread:
//! [`prepare_inputs`](SingleComputationCycle::prepare_inputs), optionally
//! [`compute_delta`](SingleComputationCycle::compute_delta) against a finished
//! cycle, [`execute_plans`](SingleComputationCycle::execute_plans),
//! [`populate_result_model`](SingleComputationCycle::populate_result_model) and
//! [`release_resources`](SingleComputationCycle::release_resources).
//!
//! Every field of the cycle is written by the controlling thread only, except
//! the executed/failed node sets, which graph executor workers update
//! concurrently through a shared [`NodeExecutionStatus`]. There is one status
//! per calculation configuration, so graphs of different configurations may
//! reuse node ids.

mod execute;
mod prepare;
mod release;
mod results;

use crate::{
    cache::ComputationCache,
    config::{Config, Value},
    error::CycleError,
    handle::Interrupter,
    livedata::SnapshotProvider,
    result::ViewComputationResultModel,
    status::NodeExecutionStatus,
    types::{IndexMap, NodeId},
    view::{View, ViewEvaluationModel},
};
use chrono::{DateTime, Utc};
use core::time::Duration;
use derive_more::{Debug, Display};
use std::{sync::Arc, time::Instant};
use tracing::warn;

/// Lifecycle of a [`SingleComputationCycle`].
///
/// ```text
/// CREATED -> INPUTS_PREPARED -> EXECUTING -> FINISHED --------------> CLEANED
///                                        \-> EXECUTION_INTERRUPTED -/
/// ```
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    #[display("CREATED")]
    Created,
    #[display("INPUTS_PREPARED")]
    InputsPrepared,
    #[display("EXECUTING")]
    Executing,
    #[display("EXECUTION_INTERRUPTED")]
    ExecutionInterrupted,
    #[display("FINISHED")]
    Finished,
    #[display("CLEANED")]
    Cleaned,
}

/// A single computation of a view's dependency graphs at one valuation time.
///
/// Borrows the view, its compiled evaluation model and the snapshot provider;
/// owns its caches, its node execution status and the result model.
#[derive(Debug)]
pub struct SingleComputationCycle<'a, C: Config> {
    #[debug(skip)]
    view: &'a View<C>,
    evaluation_model: &'a ViewEvaluationModel,
    #[debug(skip)]
    snapshot_provider: &'a dyn SnapshotProvider<Value<C>>,
    valuation_time: DateTime<Utc>,
    state: CycleState,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    #[debug(skip)]
    caches: IndexMap<String, Arc<dyn ComputationCache<Value<C>>>>,
    node_status: IndexMap<String, Arc<NodeExecutionStatus>>,
    result_model: ViewComputationResultModel<Value<C>>,
    interrupter: Interrupter,
}

impl<'a, C: Config> SingleComputationCycle<'a, C> {
    pub fn new(
        view: &'a View<C>,
        evaluation_model: &'a ViewEvaluationModel,
        snapshot_provider: &'a dyn SnapshotProvider<Value<C>>,
        valuation_time: DateTime<Utc>,
    ) -> Self {
        let mut result_model = ViewComputationResultModel::default();
        result_model.set_calculation_configuration_names(evaluation_model.configuration_names());
        if let Some(portfolio) = evaluation_model.portfolio() {
            result_model.set_portfolio(portfolio.clone());
        }
        Self {
            view,
            evaluation_model,
            snapshot_provider,
            valuation_time,
            state: CycleState::Created,
            start_time: None,
            end_time: None,
            caches: IndexMap::default(),
            node_status: evaluation_model
                .configuration_names()
                .map(|name| (name.to_owned(), Arc::new(NodeExecutionStatus::new())))
                .collect(),
            result_model,
            interrupter: Interrupter::new(),
        }
    }

    /// Prepares inputs, executes every configuration and releases resources
    /// without materializing results.
    ///
    /// An interruption is logged and otherwise swallowed.
    ///
    /// # Errors
    /// The cycle was not freshly created, a submitted graph failed, or the
    /// cache dump failed.
    pub fn execute(&mut self) -> Result<(), CycleError> {
        self.prepare_inputs()?;
        match self.execute_plans() {
            Ok(()) => {}
            Err(CycleError::Interrupted) => {
                warn!("Interrupted while attempting to run a single computation cycle. No results will be output.");
            }
            Err(err) => {
                self.release_after_failure();
                return Err(err);
            }
        }
        self.release_resources().map(drop)
    }

    /// Runs the whole cycle and returns its results, or `None` when it was
    /// interrupted.
    ///
    /// # Errors
    /// The cycle was not freshly created, a submitted graph failed, or the
    /// cache dump failed. No partial results are returned on failure.
    pub fn execute_with_result(
        &mut self,
    ) -> Result<Option<&ViewComputationResultModel<Value<C>>>, CycleError> {
        self.prepare_inputs()?;
        match self.execute_plans() {
            Ok(()) => {}
            Err(CycleError::Interrupted) => {
                warn!("Interrupted while attempting to run a single computation cycle. No results will be output.");
                self.release_resources()?;
                return Ok(None);
            }
            Err(err) => {
                self.release_after_failure();
                return Err(err);
            }
        }
        self.populate_result_model()?;
        self.release_resources()?;
        Ok(Some(&self.result_model))
    }

    fn release_after_failure(&mut self) {
        if let Err(err) = self.release_resources() {
            warn!(error = %err, "Unable to release resources of a failed cycle");
        }
    }

    fn require_state(&self, expected: &'static [CycleState]) -> Result<(), CycleError> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(CycleError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    /// Key of this cycle's caches and snapshot.
    fn valuation_timestamp_millis(&self) -> i64 {
        self.valuation_time.timestamp_millis()
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn view(&self) -> &'a View<C> {
        self.view
    }

    pub fn view_name(&self) -> &str {
        self.view.name()
    }

    pub fn evaluation_model(&self) -> &'a ViewEvaluationModel {
        self.evaluation_model
    }

    pub fn valuation_time(&self) -> DateTime<Utc> {
        self.valuation_time
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<Instant> {
        self.end_time
    }

    /// Time from preparing inputs to materializing results, on the monotonic
    /// clock.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end_time?.duration_since(self.start_time?))
    }

    pub fn result_model(&self) -> &ViewComputationResultModel<Value<C>> {
        &self.result_model
    }

    /// Identifier of the function repository initialization the evaluation
    /// model was compiled against.
    pub fn function_init_id(&self) -> u64 {
        self.evaluation_model.function_init_id()
    }

    pub fn configuration_names(&self) -> impl Iterator<Item = &'a str> {
        self.evaluation_model.configuration_names()
    }

    /// Cache of `configuration_name`, available once inputs are prepared.
    pub fn computation_cache(
        &self,
        configuration_name: &str,
    ) -> Option<&Arc<dyn ComputationCache<Value<C>>>> {
        self.caches.get(configuration_name)
    }

    pub fn caches_by_configuration(&self) -> &IndexMap<String, Arc<dyn ComputationCache<Value<C>>>> {
        &self.caches
    }

    /// Signal that interrupts [`execute_plans`](Self::execute_plans) from
    /// another thread.
    pub fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }

    /// Executed/failed node sets of `configuration_name`.
    pub fn node_status(&self, configuration_name: &str) -> Option<&Arc<NodeExecutionStatus>> {
        self.node_status.get(configuration_name)
    }

    pub fn is_executed(&self, configuration_name: &str, node: NodeId) -> bool {
        self.node_status(configuration_name)
            .is_some_and(|status| status.is_executed(node))
    }

    /// No-op for a configuration the evaluation model does not define.
    pub fn mark_executed(&self, configuration_name: &str, node: NodeId) {
        if let Some(status) = self.node_status(configuration_name) {
            status.mark_executed(node);
        }
    }

    pub fn is_failed(&self, configuration_name: &str, node: NodeId) -> bool {
        self.node_status(configuration_name)
            .is_some_and(|status| status.is_failed(node))
    }

    /// No-op for a configuration the evaluation model does not define.
    pub fn mark_failed(&self, configuration_name: &str, node: NodeId) {
        if let Some(status) = self.node_status(configuration_name) {
            status.mark_failed(node);
        }
    }
}
