use crate::{
    config::Config,
    cycle::{CycleState, SingleComputationCycle},
    delta::LiveDataDeltaCalculator,
    error::CycleError,
    livedata::format_missing_live_data,
    types::IndexSet,
    value::ComputedValue,
};
use std::time::Instant;
use tracing::{debug, info, warn};

impl<C: Config> SingleComputationCycle<'_, C> {
    /// Creates one cache per configuration and loads every live data
    /// requirement of the view from a snapshot at the valuation time.
    ///
    /// Missing live data is reported once as a warning; nodes depending on it
    /// fail individually during execution.
    ///
    /// # Errors
    /// The cycle is not [`CycleState::Created`].
    pub fn prepare_inputs(&mut self) -> Result<(), CycleError> {
        self.require_state(&[CycleState::Created])?;
        self.start_time = Some(Instant::now());

        self.result_model.set_view_name(self.view.name());
        self.result_model.set_valuation_time(self.valuation_time);

        self.create_all_caches();

        let requirements = self.evaluation_model.all_live_data_requirements();
        let timestamp = self.valuation_timestamp_millis();
        debug!(
            snapshot = %self.valuation_time,
            "Populating {} market data items",
            requirements.len()
        );
        self.snapshot_provider.snapshot(timestamp);

        let mut missing = IndexSet::default();
        for (requirement, specification) in requirements {
            let Some(value) = self.snapshot_provider.query_snapshot(timestamp, &requirement) else {
                debug!(
                    %requirement,
                    snapshot = %self.valuation_time,
                    "Unable to load live data value"
                );
                missing.insert(specification);
                continue;
            };
            let computed = ComputedValue::new(specification, value);
            for cache in self.caches.values() {
                cache.put_shared_value(computed.clone());
            }
            self.result_model.add_live_data(computed);
        }
        if !missing.is_empty() {
            warn!(
                "Missing {} live data elements: {}",
                missing.len(),
                format_missing_live_data(&missing)
            );
        }

        self.state = CycleState::InputsPrepared;
        Ok(())
    }

    fn create_all_caches(&mut self) {
        let cache_source = &self.view.processing_context().cache_source;
        let timestamp = self.valuation_timestamp_millis();
        for name in self.evaluation_model.configuration_names() {
            let cache = cache_source.get_cache(self.view.name(), name, timestamp);
            self.caches.insert(name.to_owned(), cache);
        }
    }

    /// Reuses results of `previous` for every node whose inputs did not change
    /// since it ran.
    ///
    /// Unchanged nodes are marked executed in this cycle and their outputs
    /// are copied from the previous cache into this cycle's shared partition.
    /// Configurations the previous cycle has no cache for are recomputed in
    /// full.
    ///
    /// # Errors
    /// This cycle is not [`CycleState::InputsPrepared`] or `previous` is not
    /// [`CycleState::Finished`].
    pub fn compute_delta(&mut self, previous: &SingleComputationCycle<'_, C>) -> Result<(), CycleError> {
        self.require_state(&[CycleState::InputsPrepared])?;
        if previous.state != CycleState::Finished {
            return Err(CycleError::PreviousCycleState {
                actual: previous.state,
            });
        }

        for (name, graph) in self.evaluation_model.dependency_graphs() {
            let Some(cache) = self.caches.get(name) else {
                continue;
            };
            let Some(status) = self.node_status.get(name) else {
                continue;
            };
            let Some(previous_cache) = previous.caches.get(name) else {
                debug!(configuration = name, "Previous cycle has no cache, recomputing every node");
                continue;
            };

            let mut delta = LiveDataDeltaCalculator::new(graph, cache.as_ref(), previous_cache.as_ref());
            delta.compute_delta();
            info!(
                "Computed delta for calc conf {name}. Of {} nodes, {} require recomputation.",
                graph.len(),
                delta.changed_nodes().len()
            );

            for &id in delta.unchanged_nodes() {
                status.mark_executed(id);
                let Some(node) = graph.node(id) else {
                    continue;
                };
                for specification in node.output_values() {
                    if let Some(value) = previous_cache.get_value(specification) {
                        cache.put_shared_value(ComputedValue::new(specification.clone(), value));
                    }
                }
            }
        }
        Ok(())
    }
}

