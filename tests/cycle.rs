#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use chrono::{DateTime, Utc};
use computation_cycle::{
    CycleError, CycleState, SingleComputationCycle,
    cache::{ComputationCache, ComputationCacheSource, InMemoryComputationCacheSource},
    config::Config,
    executor::{DependencyGraphExecutor, GraphSubmission, ParallelGraphExecutor},
    function::{FunctionError, FunctionRepository},
    graph::{DependencyGraph, DependencyNode},
    handle::{Completer, ExecutionError, ExecutionHandle},
    livedata::InMemorySnapshotProvider,
    stats::{GraphExecutorStatisticsGatherer, TotallingStatisticsGatherer},
    types::NodeId,
    value::{
        ComputationTargetSpecification, ComputationTargetType, ComputedValue, Portfolio, UniqueId,
        ValueRequirement, ValueSpecification,
    },
    view::{
        ResultModelDefinition, ResultOutputMode, View, ViewDefinition, ViewEvaluationModel,
        ViewProcessingContext,
    },
};
use core::{num::NonZeroU32, time::Duration};
use std::{
    fs,
    sync::{Arc, Condvar, Mutex, mpsc},
    thread,
};

struct TestConfig;

impl Config for TestConfig {
    type Value = f64;
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn nid(x: u32) -> NodeId {
    NonZeroU32::new(x).unwrap()
}

fn target(name: &str) -> ComputationTargetSpecification {
    ComputationTargetSpecification::primitive(UniqueId::new("TICKER", name))
}

fn spec(name: &str) -> ValueSpecification {
    ValueSpecification::new(name, target(name))
}

fn requirement(name: &str) -> ValueRequirement {
    ValueRequirement::new(name, target(name))
}

fn valuation(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap()
}

/// View, market and collaborators shared by the cycles of one test.
struct Harness {
    market: InMemorySnapshotProvider<f64>,
    cache_source: Arc<InMemoryComputationCacheSource<f64>>,
    statistics: Arc<TotallingStatisticsGatherer>,
    view: View<TestConfig>,
}

impl Harness {
    fn new(definition: ViewDefinition, functions: FunctionRepository<TestConfig>) -> Self {
        let executor = ParallelGraphExecutor::<TestConfig>::with_threads(4, Arc::new(functions))
            .expect("thread pool must build");
        Self::with_executor(definition, Arc::new(executor))
    }

    fn with_executor(
        definition: ViewDefinition,
        graph_executor: Arc<dyn DependencyGraphExecutor<TestConfig>>,
    ) -> Self {
        init_tracing();
        let cache_source = Arc::new(InMemoryComputationCacheSource::new());
        let statistics = Arc::new(TotallingStatisticsGatherer::new());
        let context = ViewProcessingContext {
            cache_source: cache_source.clone(),
            graph_executor,
            statistics: statistics.clone(),
        };
        Self {
            market: InMemorySnapshotProvider::new(),
            cache_source,
            statistics,
            view: View::new(definition, context),
        }
    }

    fn cycle<'a>(
        &'a self,
        model: &'a ViewEvaluationModel,
        seconds: i64,
    ) -> SingleComputationCycle<'a, TestConfig> {
        SingleComputationCycle::new(&self.view, model, &self.market, valuation(seconds))
    }
}

/// `x` (node 1, no inputs) feeds `y` (node 2).
fn round_trip_graph(configuration: &str) -> DependencyGraph {
    DependencyGraph::builder(configuration)
        .node(DependencyNode::compute(nid(1), target("x"), "constant").with_output(spec("x")))
        .node(
            DependencyNode::compute(nid(2), target("y"), "double")
                .with_input(spec("x"))
                .with_output(spec("y")),
        )
        .build()
        .unwrap()
}

//  spot(1)   rate(2)
//    |         |
//  pv(3)     df(4)
fn pricing_graph() -> DependencyGraph {
    DependencyGraph::builder("Default")
        .node(DependencyNode::live_data(nid(1), requirement("spot")))
        .node(DependencyNode::live_data(nid(2), requirement("rate")))
        .node(
            DependencyNode::compute(nid(3), target("pv"), "pv")
                .with_input(spec("spot"))
                .with_output(spec("pv")),
        )
        .node(
            DependencyNode::compute(nid(4), target("df"), "df")
                .with_input(spec("rate"))
                .with_output(spec("df")),
        )
        .build()
        .unwrap()
}

fn functions() -> FunctionRepository<TestConfig> {
    FunctionRepository::<TestConfig>::new()
        .with_function("constant", |_, _| Ok(vec![ComputedValue::new(spec("x"), 21.0)]))
        .with_function("double", |_, inputs| {
            let x = inputs.value(&spec("x"))?;
            Ok(vec![ComputedValue::new(spec("y"), x * 2.0)])
        })
        .with_function("pv", |_, inputs| {
            let spot = inputs.value(&spec("spot"))?;
            Ok(vec![ComputedValue::new(spec("pv"), spot * 2.0)])
        })
        .with_function("df", |_, inputs| {
            let rate = inputs.value(&spec("rate"))?;
            Ok(vec![ComputedValue::new(spec("df"), rate * 10.0)])
        })
        .with_function("failing", |_, _| Err(FunctionError::Failed("no curve".to_owned())))
        .with_function("panicking", |_, _| panic!("division by zero"))
}

#[test]
fn execute_plans_requires_prepared_inputs() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    let model = ViewEvaluationModel::new([round_trip_graph("Default")]);
    let mut cycle = harness.cycle(&model, 1);

    let err = cycle.execute_plans().unwrap_err();
    assert!(matches!(
        err,
        CycleError::InvalidState {
            actual: CycleState::Created,
            ..
        }
    ));
    assert!(matches!(
        cycle.release_resources(),
        Err(CycleError::InvalidState { .. })
    ));

    cycle.prepare_inputs().unwrap();
    assert!(matches!(
        cycle.prepare_inputs(),
        Err(CycleError::InvalidState { .. })
    ));
    cycle.execute_plans().unwrap();
    assert_eq!(cycle.state(), CycleState::Finished);

    let err = cycle.execute_plans().unwrap_err();
    assert!(matches!(
        err,
        CycleError::InvalidState {
            actual: CycleState::Finished,
            ..
        }
    ));
}

#[test]
fn execute_with_result_materializes_every_output() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    let model = ViewEvaluationModel::new([round_trip_graph("Default")])
        .with_portfolio(Portfolio::new(UniqueId::new("PORTFOLIO", "1"), "Book"))
        .with_function_init_id(7);
    let mut cycle = harness.cycle(&model, 1);
    assert_eq!(cycle.function_init_id(), 7);

    let result = cycle.execute_with_result().unwrap().unwrap().clone();

    assert_eq!(result.view_name(), Some("View"));
    assert_eq!(result.calculation_configuration_names(), ["Default".to_owned()]);
    assert_eq!(result.portfolio().map(Portfolio::name), Some("Book"));
    assert_eq!(result.valuation_time(), Some(valuation(1)));
    assert!(result.result_timestamp().is_some());
    assert_eq!(result.value("Default", &spec("x")), Some(&21.0));
    assert_eq!(result.value("Default", &spec("y")), Some(&42.0));
    assert_eq!(result.values("Default").len(), 2);

    assert_eq!(cycle.state(), CycleState::Cleaned);
    assert!(cycle.duration().is_some());
    assert_eq!(harness.cache_source.cache_count(), 0);
    assert!(harness.market.snapshot_timestamps().is_empty());
}

#[test]
fn execute_releases_without_materializing() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    let model = ViewEvaluationModel::new([round_trip_graph("Default")]);
    let mut cycle = harness.cycle(&model, 1);

    cycle.execute().unwrap();

    assert_eq!(cycle.state(), CycleState::Cleaned);
    assert!(cycle.is_executed("Default", nid(1)));
    assert!(cycle.is_executed("Default", nid(2)));
    assert!(cycle.result_model().values("Default").is_empty());
    assert!(cycle.result_model().result_timestamp().is_none());
}

#[test]
fn missing_live_data_only_fails_dependent_nodes() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    harness.market.set_value(requirement("spot"), 100.0);
    harness.market.set_value(requirement("rate"), 0.5);
    let graph = DependencyGraph::builder("Default")
        .node(DependencyNode::live_data(nid(1), requirement("spot")))
        .node(DependencyNode::live_data(nid(2), requirement("rate")))
        .node(DependencyNode::live_data(nid(5), requirement("vol")))
        .node(
            DependencyNode::compute(nid(3), target("pv"), "pv")
                .with_input(spec("spot"))
                .with_output(spec("pv")),
        )
        .node(
            DependencyNode::compute(nid(6), target("vega"), "pv")
                .with_input(spec("vol"))
                .with_output(spec("vega")),
        )
        .build()
        .unwrap();
    let model = ViewEvaluationModel::new([graph]);
    let mut cycle = harness.cycle(&model, 1);

    cycle.prepare_inputs().unwrap();
    let live_data: Vec<_> = cycle
        .result_model()
        .live_data()
        .iter()
        .map(|value| value.specification().clone())
        .collect();
    assert_eq!(live_data, vec![spec("spot"), spec("rate")]);

    cycle.execute_plans().unwrap();
    cycle.populate_result_model().unwrap();

    assert!(cycle.is_executed("Default", nid(3)));
    assert!(cycle.is_failed("Default", nid(6)));
    let result = cycle.result_model();
    assert_eq!(result.value("Default", &spec("pv")), Some(&200.0));
    assert_eq!(result.value("Default", &spec("vega")), None);
    cycle.release_resources().unwrap();
}

#[test]
fn live_data_is_loaded_into_every_configuration() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    harness.market.set_value(requirement("spot"), 100.0);
    harness.market.set_value(requirement("rate"), 0.5);
    let stressed = DependencyGraph::builder("Stressed")
        .node(DependencyNode::live_data(nid(11), requirement("spot")))
        .node(
            DependencyNode::compute(nid(13), target("pv"), "pv")
                .with_input(spec("spot"))
                .with_output(spec("pv")),
        )
        .build()
        .unwrap();
    let model = ViewEvaluationModel::new([pricing_graph(), stressed]);
    let mut cycle = harness.cycle(&model, 1);

    let result = cycle.execute_with_result().unwrap().unwrap();

    assert_eq!(
        result.calculation_configuration_names(),
        ["Default".to_owned(), "Stressed".to_owned()]
    );
    assert_eq!(result.live_data().len(), 2);
    assert_eq!(result.value("Default", &spec("df")), Some(&5.0));
    assert_eq!(result.value("Stressed", &spec("pv")), Some(&200.0));
    assert_eq!(result.value("Stressed", &spec("df")), None);
}

#[test]
fn computation_cache_is_stable_within_a_cycle() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    let model = ViewEvaluationModel::new([round_trip_graph("Default")]);
    let mut cycle = harness.cycle(&model, 1);
    assert!(cycle.computation_cache("Default").is_none());

    cycle.prepare_inputs().unwrap();

    let first = cycle.computation_cache("Default").unwrap();
    let second = cycle.computation_cache("Default").unwrap();
    assert!(Arc::ptr_eq(first, second));
    let from_source =
        harness
            .cache_source
            .get_cache("View", "Default", valuation(1).timestamp_millis());
    assert!(Arc::ptr_eq(first, &from_source));
    assert!(cycle.computation_cache("Unknown").is_none());
}

#[test]
fn delta_reuses_results_of_unchanged_nodes() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    harness.market.set_value(requirement("spot"), 100.0);
    harness.market.set_value(requirement("rate"), 0.5);
    let model = ViewEvaluationModel::new([pricing_graph()]);

    let mut previous = harness.cycle(&model, 1);
    previous.prepare_inputs().unwrap();
    previous.execute_plans().unwrap();

    harness.market.set_value(requirement("spot"), 101.0);
    let mut cycle = harness.cycle(&model, 2);
    cycle.prepare_inputs().unwrap();
    cycle.compute_delta(&previous).unwrap();

    // `df` is copied forward before anything runs; `pv` must be recomputed.
    let cache = cycle.computation_cache("Default").unwrap();
    assert_eq!(cache.get_value(&spec("df")), Some(5.0));
    assert_eq!(cache.get_value(&spec("pv")), None);
    assert!(cycle.is_executed("Default", nid(2)));
    assert!(cycle.is_executed("Default", nid(4)));
    assert!(!cycle.is_executed("Default", nid(3)));

    // Four nodes minus unchanged {2, 4} and live data {1, 2}.
    let executable = cycle.executable_dependency_graph("Default").unwrap();
    assert_eq!(executable.node_ids().collect::<Vec<_>>(), vec![nid(3)]);

    cycle.execute_plans().unwrap();
    cycle.populate_result_model().unwrap();
    let result = cycle.result_model();
    assert_eq!(result.value("Default", &spec("pv")), Some(&202.0));
    assert_eq!(result.value("Default", &spec("df")), Some(&5.0));

    let reports = harness.statistics.reports_for("Default");
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].processed_nodes, 2);
    assert_eq!(reports[0].executed_nodes, 2);
    assert_eq!(reports[1].processed_nodes, 1);
    assert_eq!(reports[1].executed_nodes, 1);

    cycle.release_resources().unwrap();
    previous.release_resources().unwrap();
    assert_eq!(harness.cache_source.cache_count(), 0);
}

#[test]
fn delta_requires_a_finished_previous_cycle() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    let model = ViewEvaluationModel::new([round_trip_graph("Default")]);
    let mut previous = harness.cycle(&model, 1);
    previous.prepare_inputs().unwrap();
    let mut cycle = harness.cycle(&model, 2);

    assert!(matches!(
        cycle.compute_delta(&previous),
        Err(CycleError::InvalidState {
            actual: CycleState::Created,
            ..
        })
    ));
    cycle.prepare_inputs().unwrap();
    assert!(matches!(
        cycle.compute_delta(&previous),
        Err(CycleError::PreviousCycleState {
            actual: CycleState::InputsPrepared
        })
    ));
}

#[test]
fn failed_nodes_do_not_stop_unrelated_nodes() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    //  curve(1, fails)   ratio(3, panics)   x(4)
    //      |                                 |
    //  bumped(2)                            y(5)
    let graph = DependencyGraph::builder("Default")
        .node(DependencyNode::compute(nid(1), target("curve"), "failing").with_output(spec("curve")))
        .node(
            DependencyNode::compute(nid(2), target("bumped"), "double")
                .with_input(spec("curve"))
                .with_output(spec("bumped")),
        )
        .node(DependencyNode::compute(nid(3), target("ratio"), "panicking").with_output(spec("ratio")))
        .node(DependencyNode::compute(nid(4), target("x"), "constant").with_output(spec("x")))
        .node(
            DependencyNode::compute(nid(5), target("y"), "double")
                .with_input(spec("x"))
                .with_output(spec("y")),
        )
        .build()
        .unwrap();
    let model = ViewEvaluationModel::new([graph]);
    let mut cycle = harness.cycle(&model, 1);

    let result = cycle.execute_with_result().unwrap().unwrap().clone();

    assert!(cycle.is_failed("Default", nid(1)));
    assert!(cycle.is_failed("Default", nid(2)));
    assert!(cycle.is_failed("Default", nid(3)));
    assert!(cycle.is_executed("Default", nid(4)));
    assert!(cycle.is_executed("Default", nid(5)));
    assert_eq!(result.value("Default", &spec("y")), Some(&42.0));
    assert_eq!(result.values("Default").len(), 2);

    let report = &harness.statistics.reports()[0];
    assert_eq!(report.executed_nodes, 2);
    assert_eq!(report.failed_nodes, 3);
}

#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

#[test]
fn interrupt_cancels_execution_and_release_still_succeeds() {
    let gate = Arc::new(Gate::default());
    let (started_tx, started_rx) = mpsc::sync_channel(1);
    let functions = {
        let gate = Arc::clone(&gate);
        functions().with_function("gated", move |_, _| {
            let _ = started_tx.send(());
            gate.wait();
            Ok(vec![ComputedValue::new(spec("x"), 1.0)])
        })
    };
    let definition = ViewDefinition::new("View").with_poll_interval(Duration::from_millis(10));
    let harness = Harness::new(definition, functions);
    let graph = DependencyGraph::builder("Default")
        .node(DependencyNode::compute(nid(1), target("x"), "gated").with_output(spec("x")))
        .node(
            DependencyNode::compute(nid(2), target("y"), "double")
                .with_input(spec("x"))
                .with_output(spec("y")),
        )
        .build()
        .unwrap();
    let model = ViewEvaluationModel::new([graph]);
    let mut cycle = harness.cycle(&model, 1);
    cycle.prepare_inputs().unwrap();

    let interrupter = cycle.interrupter().clone();
    let raiser = thread::spawn(move || {
        started_rx.recv().unwrap();
        interrupter.interrupt();
    });
    let err = cycle.execute_plans().unwrap_err();
    raiser.join().unwrap();
    gate.open();

    assert!(matches!(err, CycleError::Interrupted));
    assert_eq!(cycle.state(), CycleState::ExecutionInterrupted);
    assert!(!cycle.is_executed("Default", nid(2)));

    cycle.release_resources().unwrap();
    assert_eq!(cycle.state(), CycleState::Cleaned);
    assert_eq!(harness.cache_source.cache_count(), 0);
}

#[test]
fn interrupted_cycle_returns_no_result() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    let model = ViewEvaluationModel::new([round_trip_graph("Default")]);
    let mut cycle = harness.cycle(&model, 1);
    cycle.interrupter().interrupt();

    assert!(cycle.execute_with_result().unwrap().is_none());
    assert_eq!(cycle.state(), CycleState::Cleaned);
    assert!(cycle.result_model().result_timestamp().is_none());
}

#[test]
fn result_model_definition_filters_outputs() {
    let definition = ViewDefinition::new("View").with_result_model_definition(
        ResultModelDefinition::uniform(ResultOutputMode::All)
            .with_output_mode(ComputationTargetType::Primitive, ResultOutputMode::TerminalOutputs),
    );
    let harness = Harness::new(definition, functions());
    let graph = DependencyGraph::builder("Default")
        .node(DependencyNode::compute(nid(1), target("x"), "constant").with_output(spec("x")))
        .node(
            DependencyNode::compute(nid(2), target("y"), "double")
                .with_input(spec("x"))
                .with_output(spec("y")),
        )
        .terminal_output(spec("y"))
        .build()
        .unwrap();
    let model = ViewEvaluationModel::new([graph]);
    let mut cycle = harness.cycle(&model, 1);

    let result = cycle.execute_with_result().unwrap().unwrap();

    assert_eq!(result.value("Default", &spec("x")), None);
    assert_eq!(result.value("Default", &spec("y")), Some(&42.0));
}

#[test]
fn cache_dump_writes_one_sorted_file_per_configuration() {
    let directory = tempfile::tempdir().unwrap();
    let definition = ViewDefinition::new("View")
        .with_dump_computation_cache_to_disk(true)
        .with_dump_directory(directory.path());
    let harness = Harness::new(definition, functions());
    let graph = DependencyGraph::builder("Default")
        .node(DependencyNode::compute(nid(3), target("z"), "failing").with_output(spec("z")))
        .node(DependencyNode::compute(nid(1), target("x"), "constant").with_output(spec("x")))
        .node(
            DependencyNode::compute(nid(2), target("y"), "double")
                .with_input(spec("x"))
                .with_output(spec("y")),
        )
        .build()
        .unwrap();
    let model = ViewEvaluationModel::new([graph]);
    let mut cycle = harness.cycle(&model, 1);
    cycle.prepare_inputs().unwrap();
    cycle.execute_plans().unwrap();

    let paths = cycle.release_resources().unwrap();

    assert_eq!(cycle.state(), CycleState::Cleaned);
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with(directory.path()));
    let file_name = paths[0].file_name().unwrap().to_str().unwrap();
    assert!(file_name.starts_with("computation-cache-Default-"));
    assert!(file_name.ends_with(".txt"));
    let contents = fs::read_to_string(&paths[0]).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(
        lines,
        vec![
            format!("{} -> 21", spec("x")),
            format!("{} -> 42", spec("y")),
            format!("{} -> null", spec("z")),
        ]
    );
}

#[test]
fn cache_dump_failure_is_reported_after_release() {
    let directory = tempfile::tempdir().unwrap();
    let missing = directory.path().join("missing");
    let definition = ViewDefinition::new("View")
        .with_dump_computation_cache_to_disk(true)
        .with_dump_directory(&missing);
    let harness = Harness::new(definition, functions());
    let model = ViewEvaluationModel::new([round_trip_graph("Default")]);
    let mut cycle = harness.cycle(&model, 1);
    cycle.prepare_inputs().unwrap();
    cycle.execute_plans().unwrap();

    let err = cycle.release_resources().unwrap_err();

    assert!(matches!(err, CycleError::CacheDump { ref configuration, .. } if configuration == "Default"));
    assert_eq!(cycle.state(), CycleState::Cleaned);
    assert_eq!(harness.cache_source.cache_count(), 0);
}

#[test]
fn result_model_serializes_to_json() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    let model = ViewEvaluationModel::new([round_trip_graph("Default")]);
    let mut cycle = harness.cycle(&model, 1);
    let result = cycle.execute_with_result().unwrap().unwrap();

    let json = serde_json::to_value(result).unwrap();

    assert_eq!(json["view_name"], "View");
    assert_eq!(json["calculation_configuration_names"][0], "Default");
    let values = json["values"]["Default"].as_array().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["specification"]["value_name"], "x");
    assert_eq!(values[0]["value"], 21.0);
    assert!(json["result_timestamp"].is_string());
}

#[test]
fn configurations_may_reuse_node_ids() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    harness.market.set_value(requirement("spot"), 100.0);
    // Node 1 is live data in "Spot" and a computed constant in "RoundTrip".
    let spot = DependencyGraph::builder("Spot")
        .node(DependencyNode::live_data(nid(1), requirement("spot")))
        .node(
            DependencyNode::compute(nid(2), target("pv"), "pv")
                .with_input(spec("spot"))
                .with_output(spec("pv")),
        )
        .build()
        .unwrap();
    let model = ViewEvaluationModel::new([spot, round_trip_graph("RoundTrip")]);
    let mut cycle = harness.cycle(&model, 1);

    let result = cycle.execute_with_result().unwrap().unwrap().clone();

    assert_eq!(result.value("Spot", &spec("pv")), Some(&200.0));
    assert_eq!(result.value("RoundTrip", &spec("x")), Some(&21.0));
    assert_eq!(result.value("RoundTrip", &spec("y")), Some(&42.0));
    assert_eq!(harness.statistics.reports_for("RoundTrip")[0].executed_nodes, 2);
    assert!(cycle.is_executed("RoundTrip", nid(1)));
    assert!(!Arc::ptr_eq(
        cycle.node_status("Spot").unwrap(),
        cycle.node_status("RoundTrip").unwrap()
    ));
    assert!(!cycle.is_executed("Unknown", nid(1)));
}

#[test]
fn failure_marks_stay_within_their_configuration() {
    let harness = Harness::new(ViewDefinition::new("View"), functions());
    let failing = DependencyGraph::builder("Failing")
        .node(DependencyNode::compute(nid(1), target("curve"), "failing").with_output(spec("curve")))
        .node(
            DependencyNode::compute(nid(2), target("bumped"), "double")
                .with_input(spec("curve"))
                .with_output(spec("bumped")),
        )
        .build()
        .unwrap();
    let model = ViewEvaluationModel::new([failing, round_trip_graph("RoundTrip")]);
    let mut cycle = harness.cycle(&model, 1);

    let result = cycle.execute_with_result().unwrap().unwrap().clone();

    assert!(cycle.is_failed("Failing", nid(1)));
    assert!(cycle.is_failed("Failing", nid(2)));
    assert!(!cycle.is_failed("RoundTrip", nid(1)));
    assert!(cycle.is_executed("RoundTrip", nid(2)));
    assert_eq!(result.value("RoundTrip", &spec("y")), Some(&42.0));
    assert!(result.values("Failing").is_empty());
}

#[test]
fn long_dependency_chain_runs_to_completion() {
    const DEPTH: u32 = 20_000;

    fn link(i: u32) -> ValueSpecification {
        spec(&format!("n{i}"))
    }

    let functions = functions()
        .with_function("seed", |_, _| Ok(vec![ComputedValue::new(link(1), 0.0)]))
        .with_function("inc", |node, inputs| {
            let i = node.id().get();
            let previous = inputs.value(&link(i - 1))?;
            Ok(vec![ComputedValue::new(link(i), previous + 1.0)])
        });
    let harness = Harness::new(ViewDefinition::new("View"), functions);
    let mut builder = DependencyGraph::builder("Default")
        .node(DependencyNode::compute(nid(1), target("n1"), "seed").with_output(link(1)));
    for i in 2..=DEPTH {
        builder = builder.node(
            DependencyNode::compute(nid(i), target("n"), "inc")
                .with_input(link(i - 1))
                .with_output(link(i)),
        );
    }
    let model = ViewEvaluationModel::new([builder.build().unwrap()]);
    let mut cycle = harness.cycle(&model, 1);

    let result = cycle.execute_with_result().unwrap().unwrap();

    assert_eq!(
        result.value("Default", &link(DEPTH)),
        Some(&f64::from(DEPTH - 1))
    );
    assert_eq!(harness.statistics.reports()[0].executed_nodes, DEPTH as usize);
}

/// Executor that abandons submissions of the "Broken" configuration and
/// leaves every other submission pending.
#[derive(Default)]
struct AbandoningExecutor {
    handles: Mutex<Vec<(String, ExecutionHandle)>>,
    pending: Mutex<Vec<Completer>>,
}

impl AbandoningExecutor {
    fn handle(&self, configuration: &str) -> ExecutionHandle {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == configuration)
            .map(|(_, handle)| handle.clone())
            .unwrap()
    }
}

impl DependencyGraphExecutor<TestConfig> for AbandoningExecutor {
    fn execute(
        &self,
        submission: GraphSubmission<f64>,
        _statistics: Arc<dyn GraphExecutorStatisticsGatherer>,
    ) -> ExecutionHandle {
        let (handle, completer) = ExecutionHandle::new();
        let configuration = submission.graph.configuration_name().to_owned();
        if configuration == "Broken" {
            drop(completer);
        } else {
            self.pending.lock().unwrap().push(completer);
        }
        self.handles
            .lock()
            .unwrap()
            .push((configuration, handle.clone()));
        handle
    }
}

#[test]
fn failed_submission_cancels_the_rest_and_release_still_succeeds() {
    let executor = Arc::new(AbandoningExecutor::default());
    let harness = Harness::with_executor(ViewDefinition::new("View"), executor.clone());
    let model = ViewEvaluationModel::new([round_trip_graph("Broken"), round_trip_graph("Healthy")]);
    let mut cycle = harness.cycle(&model, 1);
    cycle.prepare_inputs().unwrap();

    let err = cycle.execute_plans().unwrap_err();

    assert!(matches!(
        &err,
        CycleError::Execution {
            configuration,
            source: ExecutionError::Abandoned,
        } if configuration == "Broken"
    ));
    assert_eq!(cycle.state(), CycleState::ExecutionInterrupted);
    assert!(executor.handle("Healthy").is_cancelled());
    assert!(matches!(
        cycle.populate_result_model(),
        Err(CycleError::InvalidState { .. })
    ));

    cycle.release_resources().unwrap();
    assert_eq!(cycle.state(), CycleState::Cleaned);
    assert_eq!(harness.cache_source.cache_count(), 0);
    assert!(harness.market.snapshot_timestamps().is_empty());
}

#[test]
fn failed_submission_returns_no_result() {
    let executor = Arc::new(AbandoningExecutor::default());
    // "Healthy" times out and is requeued before "Broken" is waited on.
    let definition = ViewDefinition::new("View").with_poll_interval(Duration::from_millis(10));
    let harness = Harness::with_executor(definition, executor.clone());
    let model = ViewEvaluationModel::new([round_trip_graph("Healthy"), round_trip_graph("Broken")]);
    let mut cycle = harness.cycle(&model, 1);

    let outcome = cycle.execute_with_result().map(|result| result.is_some());

    assert!(matches!(outcome, Err(CycleError::Execution { .. })));
    assert_eq!(cycle.state(), CycleState::Cleaned);
    assert!(cycle.result_model().result_timestamp().is_none());
    assert!(cycle.result_model().values("Healthy").is_empty());
    assert!(executor.handle("Healthy").is_cancelled());
    assert_eq!(harness.cache_source.cache_count(), 0);
}
