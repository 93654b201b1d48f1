//! Single-pass computation cycle over per-configuration dependency graphs.
//!
//! A cycle takes a view, its compiled dependency graphs (one per calculation
//! configuration) and a snapshot of market data at a valuation time, and:
//! - Creates one computation cache per configuration and loads live data into
//!   every cache's shared partition.
//! - Optionally reuses the results of a previous finished cycle for every node
//!   whose inputs did not change.
//! - Submits the remaining nodes of each configuration to a concurrent graph
//!   executor and waits for all of them, with bounded polling and cooperative
//!   interruption.
//! - Materializes the requested outputs into a serializable result model and
//!   releases its caches and snapshot.
//!
//! Key modules:
//! - `config`: binds the value type flowing through the cycle via the
//!   `Config` trait.
//! - `cycle`: the `SingleComputationCycle` state machine.
//! - `executor`: the `DependencyGraphExecutor` seam and a rayon-backed
//!   implementation with per-node failure isolation.
//! - `cache`, `livedata`, `function`: collaborator traits with in-memory
//!   implementations.
//!
//! Quick start:
//! 1. Implement `Config` with your value type.
//! 2. Build a `DependencyGraph` per configuration and wrap them in a
//!    `ViewEvaluationModel`.
//! 3. Register node functions in a `FunctionRepository`, hand it to a
//!    `ParallelGraphExecutor` and build a `View` around it.
//! 4. Create a `SingleComputationCycle` and call `execute_with_result`.

/// In-process computation caches and the cache source handing them out.
pub mod cache;
/// Public interface to configure the value type of a cycle.
pub mod config;
/// The computation cycle and its lifecycle states.
pub mod cycle;
/// Classification of nodes changed since a previous cycle.
pub mod delta;
/// Errors surfaced by a computation cycle.
pub mod error;
/// Asynchronous execution of dependency sub-graphs.
///
/// Contains the execution plan (parent counts, owned/shared children) and the
/// parallel walk with memory fences ordering parents' cache writes before
/// their children's reads.
pub mod executor;
/// Node-level function runtime.
pub mod function;
/// Immutable dependency graphs and derived sub-graphs.
pub mod graph;
/// Completion handles of submitted executions and cycle interruption.
pub mod handle;
/// Market data snapshots.
pub mod livedata;
/// Serializable results of a finished cycle.
pub mod result;
/// Execution statistics sinks.
pub mod stats;
/// Cycle-local executed/failed node sets.
pub mod status;
mod sync;
/// Core aliases used across the crate (node ids, hashed collections).
pub mod types;
/// Value identities: targets, requirements, specifications.
pub mod value;
/// View definitions, processing context and evaluation model.
pub mod view;

pub use crate::{
    cycle::{CycleState, SingleComputationCycle},
    error::CycleError,
};
