use crate::{
    cache::CacheSelectHint,
    config::Config,
    cycle::{CycleState, SingleComputationCycle},
    error::CycleError,
    value::ComputedValue,
};
use chrono::Utc;
use std::time::Instant;

impl<C: Config> SingleComputationCycle<'_, C> {
    /// Copies every output value of every configuration from its cache into
    /// the result model, skipping absent values and values the view's result
    /// model definition filters out.
    ///
    /// All configurations share one result timestamp, read from the wall
    /// clock before the first of them is materialized. The end time used for
    /// [`duration`](Self::duration) is taken from the monotonic clock
    /// afterwards; the two are never compared.
    ///
    /// # Errors
    /// The cycle is not [`CycleState::Finished`].
    pub fn populate_result_model(&mut self) -> Result<(), CycleError> {
        self.require_state(&[CycleState::Finished])?;
        self.result_model.set_result_timestamp(Utc::now());

        let definition = self.view.definition().result_model_definition();
        for (name, graph) in self.evaluation_model.dependency_graphs() {
            let Some(cache) = self.caches.get(name) else {
                continue;
            };
            let values = cache.get_values(&mut graph.output_values(), &CacheSelectHint::AllShared);
            for (specification, value) in values {
                let Some(value) = value else {
                    continue;
                };
                if !definition.should_output_result(&specification, graph) {
                    continue;
                }
                self.result_model
                    .add_value(name, ComputedValue::new(specification, value));
            }
        }

        self.end_time = Some(Instant::now());
        Ok(())
    }
}
