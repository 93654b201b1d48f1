use crate::sync::recover;
use core::time::Duration;
use std::sync::Mutex;

/// Counters reported by a graph executor once a submitted sub-graph finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphExecutionStatistics {
    /// Calculation configuration the sub-graph belongs to.
    pub configuration: String,
    /// Nodes in the submitted sub-graph.
    pub processed_nodes: usize,
    /// Nodes that ran successfully.
    pub executed_nodes: usize,
    /// Nodes whose function failed or panicked, or whose input was missing
    /// or came from a failed node.
    pub failed_nodes: usize,
    /// Nodes never started because the execution was cancelled.
    pub skipped_nodes: usize,
    /// Wall time from planning the sub-graph to its last node finishing.
    pub duration: Duration,
}

/// Sink for per-submission execution statistics.
pub trait GraphExecutorStatisticsGatherer: Send + Sync {
    /// Called from an executor worker once per finished submission.
    fn graph_executed(&self, statistics: GraphExecutionStatistics);
}

/// Drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardingStatisticsGatherer;

impl GraphExecutorStatisticsGatherer for DiscardingStatisticsGatherer {
    fn graph_executed(&self, _statistics: GraphExecutionStatistics) {}
}

/// Keeps every report it receives.
#[derive(Debug, Default)]
pub struct TotallingStatisticsGatherer {
    reports: Mutex<Vec<GraphExecutionStatistics>>,
}

impl TotallingStatisticsGatherer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every report received so far, oldest first.
    pub fn reports(&self) -> Vec<GraphExecutionStatistics> {
        recover(self.reports.lock()).clone()
    }

    /// Reports received for `configuration`, oldest first.
    pub fn reports_for(&self, configuration: &str) -> Vec<GraphExecutionStatistics> {
        recover(self.reports.lock())
            .iter()
            .filter(|report| report.configuration == configuration)
            .cloned()
            .collect()
    }

    /// Sum of executed nodes over every report.
    pub fn total_executed_nodes(&self) -> usize {
        recover(self.reports.lock())
            .iter()
            .map(|report| report.executed_nodes)
            .sum()
    }
}

impl GraphExecutorStatisticsGatherer for TotallingStatisticsGatherer {
    fn graph_executed(&self, statistics: GraphExecutionStatistics) {
        recover(self.reports.lock()).push(statistics);
    }
}
