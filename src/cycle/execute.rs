use crate::{
    cache::CacheSelectHint,
    config::Config,
    cycle::{CycleState, SingleComputationCycle},
    error::CycleError,
    executor::GraphSubmission,
    graph::SubGraph,
    handle::WaitStatus,
};
use std::{collections::VecDeque, sync::Arc};
use tracing::{error, info};

impl<C: Config> SingleComputationCycle<'_, C> {
    /// The part of `configuration_name`'s graph that still has to run: every
    /// node not yet marked executed.
    ///
    /// Live data nodes are marked executed while filtering, since their values
    /// were placed in the cache when inputs were prepared.
    pub fn executable_dependency_graph(&self, configuration_name: &str) -> Option<SubGraph> {
        let graph = self.evaluation_model.dependency_graph(configuration_name)?;
        let status = self.node_status.get(configuration_name)?;
        Some(graph.sub_graph(|node| {
            if node.is_live_data_sourcing() {
                status.mark_executed(node.id());
            }
            !status.is_executed(node.id())
        }))
    }

    /// Submits the executable sub-graph of every configuration to the view's
    /// graph executor and waits for all of them.
    ///
    /// Handles are polled round-robin, each for at most the view's poll
    /// interval. Raising the [`interrupter`](Self::interrupter) cancels every
    /// pending submission and leaves the cycle
    /// [`ExecutionInterrupted`](CycleState::ExecutionInterrupted). A submission
    /// failing as a whole does the same and is reported as
    /// [`CycleError::Execution`]; failures of individual nodes are not.
    ///
    /// # Errors
    /// The cycle is not [`CycleState::InputsPrepared`], execution was
    /// interrupted, or a submission failed.
    pub fn execute_plans(&mut self) -> Result<(), CycleError> {
        self.require_state(&[CycleState::InputsPrepared])?;
        self.state = CycleState::Executing;

        let context = self.view.processing_context();
        let mut pending = VecDeque::with_capacity(self.caches.len());
        for (name, cache) in &self.caches {
            info!("Executing plans for calculation configuration {name}");
            let (Some(graph), Some(status)) =
                (self.executable_dependency_graph(name), self.node_status.get(name))
            else {
                continue;
            };
            info!("Submitting {graph} for execution");
            let submission = GraphSubmission {
                graph,
                cache: Arc::clone(cache),
                cache_hint: CacheSelectHint::AllShared,
                status: Arc::clone(status),
            };
            let handle = context
                .graph_executor
                .execute(submission, Arc::clone(&context.statistics));
            pending.push_back((name.clone(), handle));
        }

        let poll_interval = self.view.definition().poll_interval();
        while let Some((name, handle)) = pending.pop_front() {
            match handle.wait_for(poll_interval, &self.interrupter) {
                Ok(WaitStatus::Done) => {}
                Ok(WaitStatus::TimedOut) => {
                    info!("Waiting for execution of calculation configuration {name}");
                    pending.push_back((name, handle));
                }
                Ok(WaitStatus::Interrupted) => {
                    handle.cancel();
                    for (_, other) in &pending {
                        other.cancel();
                    }
                    self.state = CycleState::ExecutionInterrupted;
                    info!("Execution interrupted before completion.");
                    return Err(CycleError::Interrupted);
                }
                Err(source) => {
                    error!(configuration = %name, error = %source, "Unable to execute dependency graph");
                    for (_, other) in &pending {
                        other.cancel();
                    }
                    self.state = CycleState::ExecutionInterrupted;
                    return Err(CycleError::Execution {
                        configuration: name,
                        source,
                    });
                }
            }
        }

        self.state = CycleState::Finished;
        Ok(())
    }
}
