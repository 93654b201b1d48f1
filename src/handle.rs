//! Completion handles for submitted graph executions and the interruption
//! signal the controlling thread waits on.
//!
//! A graph executor creates an [`ExecutionHandle`]/[`Completer`] pair per
//! submission, hands the handle back to the cycle and resolves the completer
//! from its workers. The cycle waits on handles with a bounded timeout and
//! wakes early when its [`Interrupter`] is raised from another thread.
//!
//! Wake-up protocol: a waiter registers its handle with the interrupter
//! *before* taking the handle's state lock and checking the interrupt flag;
//! the interrupter raises the flag *before* looking up the registered waiter
//! and notifies it under the same state lock. Either the waiter observes the
//! flag, or the notification reaches it while it sleeps.

use crate::sync::recover;
use core::time::Duration;
use std::{
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use thiserror::Error;

/// Failure of a whole submitted execution, as opposed to a failure of an
/// individual node inside it.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The handle was cancelled before the execution completed.
    #[error("execution was cancelled")]
    Cancelled,
    /// The executor dropped the execution without resolving it.
    #[error("execution was abandoned by the graph executor")]
    Abandoned,
    /// The sub-graph has more nodes than an execution plan can index.
    #[error("execution plan of {0} nodes is too large")]
    PlanTooLarge(usize),
}

/// Outcome of a bounded wait on an [`ExecutionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The execution completed successfully.
    Done,
    /// The timeout elapsed first; the execution is still running.
    TimedOut,
    /// The interrupter was raised while waiting.
    Interrupted,
}

#[derive(Debug)]
enum State {
    Pending,
    Completed(Result<(), ExecutionError>),
    Cancelled,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
    cancelled: AtomicBool,
}

impl Shared {
    fn resolve(&self, state: State) {
        let mut current = recover(self.state.lock());
        if matches!(*current, State::Pending) {
            *current = state;
        }
        self.changed.notify_all();
    }

    fn wake(&self) {
        let _state = recover(self.state.lock());
        self.changed.notify_all();
    }
}

/// Cancellable handle on one submitted graph execution.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    shared: Arc<Shared>,
}

/// Resolving side of an [`ExecutionHandle`], owned by the executor.
///
/// Dropping it without calling [`complete`](Self::complete) resolves the
/// handle with [`ExecutionError::Abandoned`].
#[derive(Debug)]
pub struct Completer {
    shared: Arc<Shared>,
}

impl ExecutionHandle {
    /// Creates a pending handle and the completer that resolves it.
    pub fn new() -> (Self, Completer) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::Pending),
            changed: Condvar::new(),
            cancelled: AtomicBool::new(false),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Completer { shared },
        )
    }

    /// Waits up to `timeout` for the execution to complete.
    ///
    /// # Errors
    /// The execution failed, was cancelled, or was abandoned.
    pub fn wait_for(
        &self,
        timeout: Duration,
        interrupter: &Interrupter,
    ) -> Result<WaitStatus, ExecutionError> {
        let _watch = interrupter.watch(&self.shared);
        let deadline = Instant::now() + timeout;
        let mut state = recover(self.shared.state.lock());
        loop {
            if interrupter.is_raised() {
                return Ok(WaitStatus::Interrupted);
            }
            match &*state {
                State::Completed(result) => return result.clone().map(|()| WaitStatus::Done),
                State::Cancelled => return Err(ExecutionError::Cancelled),
                State::Pending => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitStatus::TimedOut);
            }
            state = recover(self.shared.changed.wait_timeout(state, deadline - now)).0;
        }
    }

    /// Requests cancellation. Nodes already running finish; no further node
    /// is started.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.resolve(State::Cancelled);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the execution completed, failed or was cancelled.
    pub fn is_done(&self) -> bool {
        !matches!(*recover(self.shared.state.lock()), State::Pending)
    }
}

impl Completer {
    /// Whether the handle was cancelled. Executors check this between nodes
    /// and stop starting new ones once it is set.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves the handle. Has no effect once it was cancelled.
    pub fn complete(self, result: Result<(), ExecutionError>) {
        self.shared.resolve(State::Completed(result));
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        self.shared
            .resolve(State::Completed(Err(ExecutionError::Abandoned)));
    }
}

/// Cooperative cancellation signal of a cycle.
///
/// Clones share the same signal, so another thread can interrupt a cycle
/// that is blocked in `execute_plans`.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    shared: Arc<InterruptShared>,
}

#[derive(Debug, Default)]
struct InterruptShared {
    raised: AtomicBool,
    waiting: Mutex<Option<Arc<Shared>>>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal and wakes the handle the cycle is waiting on, if
    /// any. The signal stays raised.
    pub fn interrupt(&self) {
        self.shared.raised.store(true, Ordering::SeqCst);
        let waiting = recover(self.shared.waiting.lock()).clone();
        if let Some(handle) = waiting {
            handle.wake();
        }
    }

    /// Whether [`interrupt`](Self::interrupt) was called on any clone.
    pub fn is_raised(&self) -> bool {
        self.shared.raised.load(Ordering::SeqCst)
    }

    fn watch(&self, handle: &Arc<Shared>) -> Watch<'_> {
        *recover(self.shared.waiting.lock()) = Some(Arc::clone(handle));
        Watch { interrupter: self }
    }
}

struct Watch<'a> {
    interrupter: &'a Interrupter,
}

impl Drop for Watch<'_> {
    fn drop(&mut self) {
        recover(self.interrupter.shared.waiting.lock()).take();
    }
}
