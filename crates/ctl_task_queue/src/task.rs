use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// Outcome of a single run of a [`Task`]'s body.
///
/// Mirrors `roc_ctl::TaskQueue::TaskResult` one-to-one: a task either ran and reported
/// success or failure, or never ran because it was cancelled first.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TaskResult {
    Succeeded,
    Failed,
    Cancelled,
}

/// Body of a task. Returning `true` reports [`TaskResult::Succeeded`], `false` reports
/// [`TaskResult::Failed`]. A panic unwinding out of the body is also reported as
/// [`TaskResult::Failed`] rather than propagated into the worker thread.
pub type TaskBody = dyn FnMut() -> bool + Send;

/// Invoked on the queue's worker thread once per run, after the body has returned (or been
/// skipped because the task was cancelled) and before the task is visible as finished to any
/// `wait`/`schedule_and_wait` caller.
pub type CompletionHandler = dyn FnMut(&Task, TaskResult) + Send;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum State {
    Idle,
    Pending { deadline: Option<Instant> },
    Finished(TaskResult),
}

pub(crate) struct TaskInner {
    pub(crate) state: Mutex<State>,
    pub(crate) finished: Condvar,
    pub(crate) cancel_requested: std::sync::atomic::AtomicBool,
    pub(crate) body: Mutex<Box<TaskBody>>,
    pub(crate) handler: Mutex<Option<Box<CompletionHandler>>>,
}

impl Drop for TaskInner {
    fn drop(&mut self) {
        // Best-effort diagnostic: the `Arc` sharing between a task's owner and the queue's
        // internal pending list means a task can never actually dangle while pending (unlike
        // the intrusive-list original, which required the caller to keep a pending task alive
        // themselves). This only fires if every last handle, including the queue's own, goes
        // away with the task still pending, which signals a bug rather than ordinary misuse.
        if matches!(*self.state.get_mut().unwrap(), State::Pending { .. }) {
            panic!("ctl_task_queue: a pending task was destroyed");
        }
    }
}

/// A unit of control-plane work dispatched through a [`crate::TaskQueue`].
///
/// Cloning a `Task` clones the handle, not the task: every clone refers to the same
/// underlying scheduling state, so any clone can be used to read `result()` or to submit the
/// task again once it is idle or finished.
#[derive(Clone)]
pub struct Task {
    pub(crate) inner: Arc<TaskInner>,
}

impl Task {
    /// Wraps `body` as a new, idle task. `body` is run at most once per scheduled episode, on
    /// the queue's worker thread.
    pub fn new(body: impl FnMut() -> bool + Send + 'static) -> Self {
        Task {
            inner: Arc::new(TaskInner {
                state: Mutex::new(State::Idle),
                finished: Condvar::new(),
                cancel_requested: std::sync::atomic::AtomicBool::new(false),
                body: Mutex::new(Box::new(body)),
                handler: Mutex::new(None),
            }),
        }
    }

    /// The task's result, once it has finished. `None` before the first run completes.
    pub fn result(&self) -> Option<TaskResult> {
        match *self.inner.state.lock().unwrap() {
            State::Finished(r) => Some(r),
            _ => None,
        }
    }

    /// Shorthand for `result() == Some(TaskResult::Succeeded)`.
    pub fn success(&self) -> bool {
        matches!(self.result(), Some(TaskResult::Succeeded))
    }

    /// Shorthand for `result() == Some(TaskResult::Cancelled)`.
    pub fn cancelled(&self) -> bool {
        matches!(self.result(), Some(TaskResult::Cancelled))
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("state", &*self.inner.state.lock().unwrap())
            .finish()
    }
}
