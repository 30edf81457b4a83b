use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::pending_list::PendingList;
use crate::task::{CompletionHandler, State, Task, TaskInner, TaskResult};
use crate::wakeup_timer::WakeupTimer;

struct QueueState {
    pending: PendingList,
    currently_executing: Option<Arc<TaskInner>>,
    /// Set by `reschedule_at` when it targets the task the worker is currently running;
    /// consumed by the worker right after the run finishes.
    reschedule_request: Option<Option<Instant>>,
    stopped: bool,
}

pub(crate) struct Inner {
    state: Mutex<QueueState>,
    timer: WakeupTimer,
}

fn compute_deadline(delay: Duration) -> Option<Instant> {
    if delay.is_zero() {
        None
    } else {
        Some(
            Instant::now()
                .checked_add(delay)
                .expect("ctl_task_queue: delay does not fit in the clock's range"),
        )
    }
}

fn update_timer(inner: &Inner, st: &QueueState) {
    let deadline = match st.pending.front() {
        None => None,
        Some(entry) => Some(entry.deadline.unwrap_or_else(Instant::now)),
    };
    inner.timer.set_deadline(deadline);
}

/// Inserts `task` as newly pending, overwriting its completion handler. Used by the public
/// `schedule`/`schedule_at` entry points, which own the handler for this run.
fn schedule_new_locked(
    inner: &Inner,
    st: &mut QueueState,
    task: &Task,
    deadline: Option<Instant>,
    handler: Option<Box<CompletionHandler>>,
) {
    if st.stopped {
        panic!("ctl_task_queue: attempt to schedule task after calling stop_and_wait()");
    }
    {
        let mut guard = task.inner.state.lock().unwrap();
        if matches!(*guard, State::Pending { .. }) {
            panic!("ctl_task_queue: attempt to re-schedule task before finishing it");
        }
        *guard = State::Pending { deadline };
    }
    task.inner.cancel_requested.store(false, Ordering::Release);
    *task.inner.handler.lock().unwrap() = handler;
    log::trace!(
        "ctl_task_queue: enqueuing task deadline={:?}",
        deadline.map(|d| d.duration_since(Instant::now()))
    );
    st.pending.insert(task.inner.clone(), deadline);
    update_timer(inner, st);
}

/// Re-inserts `task` as pending without touching its handler: used for `reschedule_at` and for
/// the worker's own re-enqueue of a reschedule requested while the task was running.
fn requeue_locked(inner: &Inner, st: &mut QueueState, task: Arc<TaskInner>, deadline: Option<Instant>) {
    *task.state.lock().unwrap() = State::Pending { deadline };
    task.cancel_requested.store(false, Ordering::Release);
    st.pending.insert(task, deadline);
    update_timer(inner, st);
}

fn run_task(inner: &Arc<Inner>, task_inner: Arc<TaskInner>) {
    let cancelled = task_inner.cancel_requested.load(Ordering::Acquire);
    let result = if cancelled {
        log::trace!("ctl_task_queue: cancelling task");
        TaskResult::Cancelled
    } else {
        log::trace!("ctl_task_queue: processing task");
        let ok = {
            let mut body = task_inner.body.lock().unwrap();
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (body)())).unwrap_or(false)
        };
        if ok {
            TaskResult::Succeeded
        } else {
            TaskResult::Failed
        }
    };

    // Establishes happens-before between this store and any `wait`/`result()` observer that
    // reads `Finished` through the same mutex.
    *task_inner.state.lock().unwrap() = State::Finished(result);
    task_inner.finished.notify_all();

    if let Some(mut handler) = task_inner.handler.lock().unwrap().take() {
        let task_handle = Task {
            inner: task_inner.clone(),
        };
        handler(&task_handle, result);
        *task_inner.handler.lock().unwrap() = Some(handler);
    }

    let mut st = inner.state.lock().unwrap();
    st.currently_executing = None;
    if let Some(deadline) = st.reschedule_request.take() {
        requeue_locked(inner, &mut st, task_inner, deadline);
    }
    update_timer(inner, &st);
}

fn run_worker(inner: Arc<Inner>) {
    log::debug!("ctl_task_queue: starting event loop");
    loop {
        inner.timer.wait_deadline();

        let picked = {
            let mut st = inner.state.lock().unwrap();
            let ready = st
                .pending
                .front()
                .is_some_and(|entry| entry.deadline.map_or(true, |d| d <= Instant::now()));
            if ready {
                let entry = st.pending.pop_front().unwrap();
                st.currently_executing = Some(entry.task.clone());
                update_timer(&inner, &st);
                Some(entry.task)
            } else {
                // Spurious wakeup, or the front task's deadline hasn't arrived yet.
                update_timer(&inner, &st);
                None
            }
        };

        let task_inner = match picked {
            Some(t) => t,
            None => {
                let st = inner.state.lock().unwrap();
                if st.stopped && st.pending.is_empty() {
                    break;
                }
                continue;
            }
        };

        run_task(&inner, task_inner);
    }
    log::debug!("ctl_task_queue: finishing event loop");
}

/// A cheap-to-clone reference to a running [`TaskQueue`], usable to submit, reschedule and
/// cancel tasks without owning the queue's worker thread or its shutdown lifecycle.
///
/// `task_pipeline` uses this as the concrete adapter behind its `TaskScheduler` trait: the
/// pipeline never starts or stops a queue itself, it only re-arms a `drain_tasks` task through
/// a handle supplied by its owner.
#[derive(Clone)]
pub struct TaskQueueHandle {
    pub(crate) inner: Arc<Inner>,
}

impl TaskQueueHandle {
    /// Enqueues `task` for immediate execution. `handler`, if given, runs on the worker thread
    /// once the task leaves `Pending`.
    pub fn schedule(&self, task: &Task, handler: Option<Box<CompletionHandler>>) {
        self.schedule_at(task, Duration::ZERO, handler);
    }

    /// Enqueues `task` to become eligible after `delay` (zero means immediate).
    pub fn schedule_at(&self, task: &Task, delay: Duration, handler: Option<Box<CompletionHandler>>) {
        let deadline = compute_deadline(delay);
        let mut st = self.inner.state.lock().unwrap();
        schedule_new_locked(&self.inner, &mut st, task, deadline, handler);
    }

    /// Enqueues `task` with no handler and blocks the caller until it finishes.
    /// Returns `true` iff it succeeded.
    pub fn schedule_and_wait(&self, task: &Task) -> bool {
        {
            let mut st = self.inner.state.lock().unwrap();
            schedule_new_locked(&self.inner, &mut st, task, None, None);
        }
        self.wait(task);
        task.success()
    }

    /// Changes `task`'s deadline to `delay` from now, reusing whatever handler is already set.
    ///
    /// - If the task is sitting in the pending list, it is moved to its new position.
    /// - If the task is the one currently executing, the worker re-enqueues it with the new
    ///   deadline right after the current run's handler returns; the handler fires once for
    ///   the in-progress run and again for the new one.
    /// - Otherwise (idle or finished) this behaves like `schedule_at` with the task's existing
    ///   handler, per the source this is ported from: reschedule reuses the handler pointer.
    pub fn reschedule_at(&self, task: &Task, delay: Duration) {
        let deadline = compute_deadline(delay);
        let mut st = self.inner.state.lock().unwrap();
        if st.stopped {
            panic!("ctl_task_queue: attempt to reschedule task after calling stop_and_wait()");
        }
        log::trace!("ctl_task_queue: rescheduling task");
        if st.pending.contains(&task.inner) {
            st.pending.remove(&task.inner);
            requeue_locked(&self.inner, &mut st, task.inner.clone(), deadline);
        } else if st
            .currently_executing
            .as_ref()
            .is_some_and(|t| Arc::ptr_eq(t, &task.inner))
        {
            st.reschedule_request = Some(deadline);
        } else {
            requeue_locked(&self.inner, &mut st, task.inner.clone(), deadline);
        }
    }

    /// Requests cancellation of `task`. A hint, not a guarantee: if the worker has already
    /// detached the task from the pending list by the time this runs, cancellation loses the
    /// race and the task runs normally. Calling this twice is equivalent to calling it once.
    /// A no-op if `task` is not currently pending.
    pub fn async_cancel(&self, task: &Task) {
        let mut st = self.inner.state.lock().unwrap();
        if st.stopped {
            panic!("ctl_task_queue: attempt to cancel task after calling stop_and_wait()");
        }
        let Some(deadline) = st.pending.deadline_of(&task.inner) else {
            return;
        };
        log::trace!("ctl_task_queue: requesting to cancel task");
        task.inner.cancel_requested.store(true, Ordering::Release);
        if deadline.is_some() {
            st.pending.remove(&task.inner);
            st.pending.insert(task.inner.clone(), None);
            update_timer(&self.inner, &st);
        }
    }

    /// `async_cancel` followed by `wait`, as a single call.
    pub fn cancel_and_wait(&self, task: &Task) {
        self.async_cancel(task);
        self.wait(task);
    }

    /// Blocks until `task` is `Finished`, returning immediately if it already is.
    pub fn wait(&self, task: &Task) {
        let mut guard = task.inner.state.lock().unwrap();
        while !matches!(*guard, State::Finished(_)) {
            guard = task.inner.finished.wait(guard).unwrap();
        }
    }
}

/// Deadline-ordered, cancellable, completion-notifying dispatcher over a single background
/// worker thread.
///
/// Submitting a task to a queue that has been stopped, or destroying a task while it is
/// pending, are both programming errors and panic rather than returning a `Result` — there is
/// no recovery available to the caller at either site that wouldn't itself be a bug.
pub struct TaskQueue {
    handle: TaskQueueHandle,
    worker: Option<thread::JoinHandle<()>>,
}

impl TaskQueue {
    /// Starts the worker thread and returns a queue ready to accept tasks.
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState {
                pending: PendingList::default(),
                currently_executing: None,
                reschedule_request: None,
                stopped: false,
            }),
            timer: WakeupTimer::new(),
        });
        let worker_inner = inner.clone();
        let worker = thread::Builder::new()
            .name("ctl_task_queue".to_string())
            .spawn(move || run_worker(worker_inner))
            .expect("ctl_task_queue: failed to spawn worker thread");
        TaskQueue {
            handle: TaskQueueHandle { inner },
            worker: Some(worker),
        }
    }

    /// A cheap-to-clone handle that can submit/reschedule/cancel tasks without sharing in this
    /// queue's shutdown lifecycle.
    pub fn handle(&self) -> TaskQueueHandle {
        self.handle.clone()
    }

    pub fn schedule(&self, task: &Task, handler: Option<Box<CompletionHandler>>) {
        self.handle.schedule(task, handler);
    }

    pub fn schedule_at(&self, task: &Task, delay: Duration, handler: Option<Box<CompletionHandler>>) {
        self.handle.schedule_at(task, delay, handler);
    }

    pub fn schedule_and_wait(&self, task: &Task) -> bool {
        self.handle.schedule_and_wait(task)
    }

    pub fn reschedule_at(&self, task: &Task, delay: Duration) {
        self.handle.reschedule_at(task, delay);
    }

    pub fn async_cancel(&self, task: &Task) {
        self.handle.async_cancel(task);
    }

    pub fn cancel_and_wait(&self, task: &Task) {
        self.handle.cancel_and_wait(task);
    }

    pub fn wait(&self, task: &Task) {
        self.handle.wait(task);
    }

    /// Precondition: no pending tasks. Stops the worker thread and joins it.
    pub fn stop_and_wait(mut self) {
        {
            let mut st = self.handle.inner.state.lock().unwrap();
            if !st.pending.is_empty() {
                panic!(
                    "ctl_task_queue: attempt to call stop_and_wait() before finishing all tasks"
                );
            }
            st.stopped = true;
        }
        self.handle.inner.timer.set_deadline(Some(Instant::now()));
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .expect("ctl_task_queue: worker thread panicked");
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if self.worker.is_some() && !thread::panicking() {
            panic!("ctl_task_queue: attempt to drop TaskQueue before calling stop_and_wait()");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn schedule_and_wait_reports_success_and_failure() {
        let queue = TaskQueue::new();
        let ok = Task::new(|| true);
        let fail = Task::new(|| false);
        assert!(queue.schedule_and_wait(&ok));
        assert!(!queue.schedule_and_wait(&fail));
        queue.stop_and_wait();
    }

    #[test]
    fn immediate_tasks_execute_in_submission_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let tasks: Vec<Task> = (0..4)
            .map(|i| {
                let order = order.clone();
                Task::new(move || {
                    order.lock().unwrap().push(i);
                    true
                })
            })
            .collect();
        for t in &tasks {
            queue.schedule(t, None);
        }
        for t in &tasks {
            queue.wait(t);
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        queue.stop_and_wait();
    }

    #[test]
    fn shuffled_deadlines_drain_in_deadline_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let delays_ms = [1u64, 4, 2, 5];
        let tasks: Vec<Task> = delays_ms
            .iter()
            .map(|&ms| {
                let order = order.clone();
                Task::new(move || {
                    order.lock().unwrap().push(ms);
                    true
                })
            })
            .collect();
        for (t, &ms) in tasks.iter().zip(delays_ms.iter()) {
            queue.schedule_at(t, Duration::from_millis(ms), None);
        }
        for t in &tasks {
            queue.wait(t);
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 4, 5]);
        queue.stop_and_wait();
    }

    #[test]
    fn cancel_before_pickup_reports_cancelled_and_runs_handler_once() {
        let queue = TaskQueue::new();
        let handler_calls = Arc::new(Mutex::new(0));
        let task = Task::new(|| true);
        let calls = handler_calls.clone();
        queue.schedule_at(
            &task,
            Duration::from_secs(999),
            Some(Box::new(move |_task: &Task, result: TaskResult| {
                *calls.lock().unwrap() += 1;
                assert_eq!(result, TaskResult::Cancelled);
            })),
        );
        queue.async_cancel(&task);
        queue.wait(&task);
        assert!(task.cancelled());
        assert_eq!(*handler_calls.lock().unwrap(), 1);
        queue.stop_and_wait();
    }

    #[test]
    fn cancelling_twice_is_idempotent() {
        let queue = TaskQueue::new();
        let task = Task::new(|| true);
        queue.schedule_at(&task, Duration::from_secs(999), None);
        queue.async_cancel(&task);
        queue.async_cancel(&task);
        queue.wait(&task);
        assert!(task.cancelled());
        queue.stop_and_wait();
    }

    #[test]
    fn cancelling_an_already_picked_up_task_loses_the_race() {
        // A task already running (or finished) is no longer in the pending list, so
        // async_cancel on it is a no-op: cancellation never un-runs a task.
        let queue = TaskQueue::new();
        let task = Task::new(|| true);
        assert!(queue.schedule_and_wait(&task));
        queue.async_cancel(&task);
        assert!(task.success());
        assert!(!task.cancelled());
        queue.stop_and_wait();
    }

    #[test]
    fn reschedule_while_executing_runs_handler_twice() {
        let queue = TaskQueue::new();
        let (unblock_tx, unblock_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let run_count = Arc::new(Mutex::new(0));
        let started_tx = Mutex::new(Some(started_tx));
        let unblock_rx = Mutex::new(unblock_rx);
        let runs = run_count.clone();
        let task = Task::new(move || {
            let mut n = runs.lock().unwrap();
            *n += 1;
            if *n == 1 {
                if let Some(tx) = started_tx.lock().unwrap().take() {
                    tx.send(()).unwrap();
                }
                unblock_rx.lock().unwrap().recv().unwrap();
            }
            true
        });

        let handler_calls = Arc::new(Mutex::new(0));
        let calls = handler_calls.clone();
        queue.schedule(
            &task,
            Some(Box::new(move |_t: &Task, _r: TaskResult| {
                *calls.lock().unwrap() += 1;
            })),
        );

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        queue.reschedule_at(&task, Duration::from_millis(1));
        unblock_tx.send(()).unwrap();

        // Wait for the second run's handler to fire.
        let deadline = Instant::now() + Duration::from_secs(5);
        while *handler_calls.lock().unwrap() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*handler_calls.lock().unwrap(), 2);
        assert_eq!(*run_count.lock().unwrap(), 2);
        queue.stop_and_wait();
    }

    #[test]
    #[should_panic(expected = "attempt to schedule task after calling stop_and_wait")]
    fn scheduling_after_stop_panics() {
        let queue = TaskQueue::new();
        let handle = queue.handle();
        queue.stop_and_wait();
        let task = Task::new(|| true);
        handle.schedule(&task, None);
    }

    #[test]
    #[should_panic(expected = "attempt to call stop_and_wait() before finishing all tasks")]
    fn stop_with_pending_tasks_panics() {
        let queue = TaskQueue::new();
        let task = Task::new(|| true);
        queue.schedule_at(&task, Duration::from_secs(999), None);
        queue.stop_and_wait();
    }
}
