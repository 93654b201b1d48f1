use crate::{
    config::Config,
    executor::{
        GraphSubmission,
        plan::{ExecutionPlan, NodeSlot},
    },
    function::{FunctionInputs, FunctionInvoker},
    graph::{DependencyNode, NodeFunction},
    handle::Completer,
    value::ComputedValue,
};
use core::sync::atomic::{AtomicUsize, Ordering, fence};
use rayon::Scope;
use std::{any::Any, panic::AssertUnwindSafe};
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
pub(super) struct RunCounters {
    executed: AtomicUsize,
    failed: AtomicUsize,
}

/// A single execution of an [`ExecutionPlan`] against one submission.
pub(super) struct GraphRun<'a, C: Config> {
    pub(super) plan: ExecutionPlan,
    pub(super) submission: &'a GraphSubmission<C::Value>,
    pub(super) invoker: &'a dyn FunctionInvoker<C>,
    pub(super) completer: &'a Completer,
    pub(super) counters: RunCounters,
}

impl<C: Config> GraphRun<'_, C> {
    pub(super) fn run(&self) {
        rayon::scope(|scope| {
            for &root in &self.plan.roots {
                scope.spawn(move |scope| self.exec(scope, root));
            }
        });
    }

    /// Executed and failed node counts.
    pub(super) fn counts(&self) -> (usize, usize) {
        (
            self.counters.executed.load(Ordering::Relaxed),
            self.counters.failed.load(Ordering::Relaxed),
        )
    }

    /// Runs the slot at `idx`, then keeps running one of the children it made
    /// ready on this worker. Other ready children are spawned onto `scope`,
    /// so stack depth does not grow with the length of dependency chains.
    fn exec<'s>(&'s self, scope: &Scope<'s>, mut idx: u32) {
        loop {
            // Cancellation stops the walk: neither this node nor anything
            // reachable only through it is started.
            if self.completer.is_cancelled() {
                return;
            }
            let slot = &self.plan.slots[idx as usize];
            self.execute_node(slot);

            if !slot.shared_children.is_empty() {
                fence(Ordering::Release);
            }
            let mut promoted = vec![];
            for &child in &slot.shared_children {
                let counter = &self.plan.counters[child as usize];
                if counter.parents_left.fetch_sub(1, Ordering::Relaxed) == 1 {
                    promoted.push(child);
                }
            }
            if !promoted.is_empty() {
                fence(Ordering::Acquire);
            }

            let mut ready = slot.owned_children.iter().copied().chain(promoted);
            let Some(next) = ready.next() else {
                return;
            };
            for child in ready {
                scope.spawn(move |scope| self.exec(scope, child));
            }
            idx = next;
        }
    }

    fn execute_node(&self, slot: &NodeSlot) {
        let GraphSubmission {
            graph,
            cache,
            cache_hint: _,
            status,
        } = self.submission;
        let Some(node) = graph.graph().node(slot.node) else {
            self.fail(slot, "node is missing from its graph");
            return;
        };

        if let Some(parent) = slot.parents.iter().find(|parent| status.is_failed(**parent)) {
            debug!(node = %node.id(), parent = %parent, "Skipping node of failed input node");
            self.fail(slot, "input node failed");
            return;
        }

        if let NodeFunction::LiveDataSourcing { requirement } = node.function() {
            if node.output_values().iter().all(|spec| cache.get_value(spec).is_some()) {
                self.succeed(slot);
            } else {
                debug!(node = %node.id(), %requirement, "Live data is not in the cache");
                self.fail(slot, "live data is not available");
            }
            return;
        }

        let mut inputs = FunctionInputs::new();
        for spec in node.input_values() {
            let Some(value) = cache.get_value(spec) else {
                debug!(node = %node.id(), input = %spec, "Input value is not available");
                self.fail(slot, "input value is not available");
                return;
            };
            inputs.insert(spec.clone(), value);
        }

        match std::panic::catch_unwind(AssertUnwindSafe(|| self.invoker.invoke(node, &inputs))) {
            Ok(Ok(values)) => {
                self.publish(node, values);
                self.succeed(slot);
            }
            Ok(Err(err)) => {
                warn!(node = %node.id(), function = %node.function(), error = %err, "Node function failed");
                self.fail(slot, "function failed");
            }
            Err(payload) => {
                error!(
                    node = %node.id(),
                    function = %node.function(),
                    panic = panic_message(payload.as_ref()),
                    "Node function panicked"
                );
                self.fail(slot, "function panicked");
            }
        }
    }

    fn publish(&self, node: &DependencyNode, values: Vec<ComputedValue<C::Value>>) {
        for value in values {
            if node.output_values().contains(value.specification()) {
                self.submission
                    .cache
                    .put_value(value, &self.submission.cache_hint);
            } else {
                warn!(
                    node = %node.id(),
                    output = %value.specification(),
                    "Ignoring value the node does not declare as an output"
                );
            }
        }
    }

    fn succeed(&self, slot: &NodeSlot) {
        self.submission.status.mark_executed(slot.node);
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
    }

    fn fail(&self, slot: &NodeSlot, reason: &str) {
        debug!(node = %slot.node, reason, "Marking node failed");
        self.submission.status.mark_failed(slot.node);
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
