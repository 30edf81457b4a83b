use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Body of a pipeline task. Returning `true` reports success.
pub type TaskBody = dyn FnMut() -> bool + Send;

/// Invoked once a task leaves `Scheduled`, on whichever caller thread actually ran it
/// (a `schedule` caller, the audio thread inside a frame, or a `process_tasks` drain).
pub type CompletionHandler = dyn FnMut(&Task) + Send;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum State {
    New,
    Scheduled,
    Finished,
}

/// How a finished task's caller (if any) is notified. `schedule` installs a `Handler`;
/// `schedule_and_wait` installs a `Semaphore` it blocks on; a task that is never actually
/// scheduled through either path carries `None`.
pub(crate) enum Completion {
    None,
    Handler(Box<CompletionHandler>),
    Semaphore(Arc<(Mutex<bool>, Condvar)>),
}

pub(crate) struct TaskInner {
    pub(crate) state: Mutex<State>,
    pub(crate) success: AtomicBool,
    pub(crate) body: Mutex<Box<TaskBody>>,
    pub(crate) completion: Mutex<Completion>,
}

impl Drop for TaskInner {
    fn drop(&mut self) {
        if matches!(*self.state.get_mut().unwrap(), State::Scheduled) {
            panic!("task_pipeline: a scheduled task was destroyed before it finished");
        }
    }
}

/// A unit of control-plane work dispatched through a [`crate::TaskPipeline`].
///
/// Like `ctl_task_queue::Task`, cloning shares the same underlying task rather than copying
/// it: any clone can be used to read `success()` once the task is finished.
#[derive(Clone)]
pub struct Task {
    pub(crate) inner: Arc<TaskInner>,
}

impl Task {
    /// Wraps `body` as a new, unscheduled task.
    pub fn new(body: impl FnMut() -> bool + Send + 'static) -> Self {
        Task {
            inner: Arc::new(TaskInner {
                state: Mutex::new(State::New),
                success: AtomicBool::new(false),
                body: Mutex::new(Box::new(body)),
                completion: Mutex::new(Completion::None),
            }),
        }
    }

    /// `true` iff the task has finished and its body reported success.
    pub fn success(&self) -> bool {
        matches!(*self.inner.state.lock().unwrap(), State::Finished) && self.inner.success.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("state", &*self.inner.state.lock().unwrap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_not_successful() {
        let task = Task::new(|| true);
        assert!(!task.success());
    }

    #[test]
    #[should_panic(expected = "a scheduled task was destroyed before it finished")]
    fn destroying_a_scheduled_task_panics() {
        let task = Task::new(|| true);
        *task.inner.state.lock().unwrap() = State::Scheduled;
        drop(task);
    }
}
