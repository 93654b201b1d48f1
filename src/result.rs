use crate::{
    types::IndexMap,
    value::{ComputedValue, Portfolio, ValueSpecification},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outputs of one computation cycle.
///
/// Filled in by the cycle while it prepares inputs and materializes results;
/// read-only for everybody else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewComputationResultModel<V> {
    view_name: Option<String>,
    calculation_configuration_names: Vec<String>,
    portfolio: Option<Portfolio>,
    valuation_time: Option<DateTime<Utc>>,
    result_timestamp: Option<DateTime<Utc>>,
    live_data: Vec<ComputedValue<V>>,
    values: IndexMap<String, Vec<ComputedValue<V>>>,
}

impl<V> Default for ViewComputationResultModel<V> {
    fn default() -> Self {
        Self {
            view_name: None,
            calculation_configuration_names: Vec::new(),
            portfolio: None,
            valuation_time: None,
            result_timestamp: None,
            live_data: Vec::new(),
            values: IndexMap::default(),
        }
    }
}

impl<V> ViewComputationResultModel<V> {
    pub fn view_name(&self) -> Option<&str> {
        self.view_name.as_deref()
    }

    pub fn calculation_configuration_names(&self) -> &[String] {
        &self.calculation_configuration_names
    }

    pub fn portfolio(&self) -> Option<&Portfolio> {
        self.portfolio.as_ref()
    }

    pub fn valuation_time(&self) -> Option<DateTime<Utc>> {
        self.valuation_time
    }

    /// Wall-clock time results were materialized; `None` until then.
    pub fn result_timestamp(&self) -> Option<DateTime<Utc>> {
        self.result_timestamp
    }

    /// Live data values loaded from the snapshot, in requirement order.
    pub fn live_data(&self) -> &[ComputedValue<V>] {
        &self.live_data
    }

    /// Computed values of `configuration_name`, in materialization order.
    pub fn values(&self, configuration_name: &str) -> &[ComputedValue<V>] {
        self.values
            .get(configuration_name)
            .map_or(&[], Vec::as_slice)
    }

    pub fn value(&self, configuration_name: &str, specification: &ValueSpecification) -> Option<&V> {
        self.values(configuration_name)
            .iter()
            .find(|computed| computed.specification() == specification)
            .map(ComputedValue::value)
    }

    pub(crate) fn set_view_name(&mut self, view_name: impl Into<String>) {
        self.view_name = Some(view_name.into());
    }

    pub(crate) fn set_calculation_configuration_names(
        &mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.calculation_configuration_names = names.into_iter().map(Into::into).collect();
    }

    pub(crate) fn set_portfolio(&mut self, portfolio: Portfolio) {
        self.portfolio = Some(portfolio);
    }

    pub(crate) fn set_valuation_time(&mut self, valuation_time: DateTime<Utc>) {
        self.valuation_time = Some(valuation_time);
    }

    pub(crate) fn set_result_timestamp(&mut self, result_timestamp: DateTime<Utc>) {
        self.result_timestamp = Some(result_timestamp);
    }

    pub(crate) fn add_live_data(&mut self, value: ComputedValue<V>) {
        self.live_data.push(value);
    }

    pub(crate) fn add_value(&mut self, configuration_name: &str, value: ComputedValue<V>) {
        if let Some(values) = self.values.get_mut(configuration_name) {
            values.push(value);
        } else {
            self.values.insert(configuration_name.to_owned(), vec![value]);
        }
    }
}
