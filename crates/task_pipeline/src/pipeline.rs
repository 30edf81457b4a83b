//! Ties frame processing and task processing together on whatever threads call into them,
//! the way `task_pipeline.cpp` interleaves `process_frame_and_tasks()` (called by the one
//! audio thread) with `schedule()`/`schedule_and_wait()` (called by arbitrary control-plane
//! threads) without a thread of its own.
//!
//! Three locks are involved, always acquired in this order when more than one is needed:
//!
//! 1. The exclusive pipeline mutex, held for the duration of one frame (or sub-frame) and any
//!    tasks drained alongside it. At most one caller runs inside it at a time.
//! 2. The task FIFO's own mutex, acquired only to push or pop a `Task`, never held across a
//!    task's execution.
//! 3. The scheduler mutex, which guards `ProcessingPhase` and the stats rate limiter. It is
//!    always a leaf: code holding it never tries to acquire either of the locks above, so it
//!    is safe to take from inside the exclusive mutex's critical section (as `report_stats`
//!    and `maybe_process_tasks` both do) as well as outside it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::clock::{Clock, DeadlineCell, PipelineInstant};
use crate::config::PipelineConfig;
use crate::frame::{Frame, SampleSpec};
use crate::handler::PipelineHandler;
use crate::scheduler::TaskScheduler;
use crate::stats::{RateLimiter, Stats};
use crate::task::{Completion, CompletionHandler, Task};

const STATS_REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessingPhase {
    NotScheduled,
    Scheduled,
    Running,
}

struct SchedulerState {
    phase: ProcessingPhase,
    rate_limiter: RateLimiter,
}

/// Fields only ever touched while the exclusive pipeline mutex is held, tracking progress
/// through the current frame's sub-frame splitting and in-frame drain windows. Bundled behind
/// their own small mutex rather than the pipeline mutex itself, since `Mutex<()>` guards
/// mutual exclusion but carries no payload.
struct FrameDrainState {
    subframe_tasks_deadline: PipelineInstant,
    samples_processed: usize,
    enough_samples: bool,
}

/// Serializes real-time frame processing with best-effort control-plane task processing on
/// whichever threads call into it, with no dedicated worker thread of its own.
///
/// `H` is the frame-processing body, `C` the time source, `S` how the pipeline asks its owner
/// to invoke [`TaskPipeline::process_tasks`] later (see [`crate::scheduler::QueueScheduler`]
/// for the concrete adapter onto a `ctl_task_queue::TaskQueue`).
pub struct TaskPipeline<H, C, S> {
    config: PipelineConfig,
    sample_spec: SampleSpec,
    clock: C,
    scheduler: S,
    handler: Mutex<H>,

    pipeline_mutex: Mutex<()>,
    task_queue: Mutex<VecDeque<Task>>,
    pending_tasks: AtomicUsize,
    pending_frames: AtomicUsize,
    next_frame_deadline: DeadlineCell,
    frame_drain_state: Mutex<FrameDrainState>,
    scheduler_state: Mutex<SchedulerState>,
    stats: Mutex<Stats>,
}

impl<H, C, S> TaskPipeline<H, C, S>
where
    H: PipelineHandler,
    C: Clock,
    S: TaskScheduler,
{
    pub fn new(handler: H, clock: C, scheduler: S, config: PipelineConfig, sample_spec: SampleSpec) -> Self {
        TaskPipeline {
            config,
            sample_spec,
            clock,
            scheduler,
            handler: Mutex::new(handler),
            pipeline_mutex: Mutex::new(()),
            task_queue: Mutex::new(VecDeque::new()),
            pending_tasks: AtomicUsize::new(0),
            pending_frames: AtomicUsize::new(0),
            next_frame_deadline: DeadlineCell::new(),
            frame_drain_state: Mutex::new(FrameDrainState {
                subframe_tasks_deadline: PipelineInstant::from_nanos(0),
                samples_processed: 0,
                enough_samples: false,
            }),
            scheduler_state: Mutex::new(SchedulerState {
                phase: ProcessingPhase::NotScheduled,
                rate_limiter: RateLimiter::new(STATS_REPORT_INTERVAL),
            }),
            stats: Mutex::new(Stats::default()),
        }
    }

    /// Tasks sitting in the FIFO, not yet picked up by any drainage path.
    pub fn num_pending_tasks(&self) -> usize {
        self.pending_tasks.load(Ordering::Acquire)
    }

    /// `process_frame_and_tasks` calls currently in flight.
    pub fn num_pending_frames(&self) -> usize {
        self.pending_frames.load(Ordering::Acquire)
    }

    /// A snapshot of the running counters, with the two gauges above folded in.
    pub fn stats(&self) -> Stats {
        let mut stats = *self.stats.lock().unwrap();
        stats.pending_tasks = self.num_pending_tasks();
        stats.pending_frames = self.num_pending_frames();
        stats
    }

    /// Schedules `task`, invoking `completion` once it finishes on whichever thread actually
    /// ran it. Never blocks the caller.
    pub fn schedule(&self, task: &Task, completion: Box<CompletionHandler>) {
        *task.inner.completion.lock().unwrap() = Completion::Handler(completion);
        self.schedule_and_maybe_process(task);
    }

    /// Schedules `task` and blocks the calling thread until it finishes, returning whether it
    /// succeeded.
    pub fn schedule_and_wait(&self, task: &Task) -> bool {
        let gate = std::sync::Arc::new((Mutex::new(false), Condvar::new()));
        *task.inner.completion.lock().unwrap() = Completion::Semaphore(gate.clone());

        let processed_in_place = self.schedule_and_maybe_process(task);
        if !processed_in_place {
            let (lock, cvar) = &*gate;
            let mut done = lock.lock().unwrap();
            while !*done {
                done = cvar.wait(done).unwrap();
            }
        }
        task.success()
    }

    /// Runs any tasks currently eligible for asynchronous drainage, then re-arms or clears the
    /// scheduler request as appropriate. This is the body the `TaskScheduler` is asked to
    /// invoke later; it is never called directly by application code.
    pub fn process_tasks(&self) -> bool {
        let needs_reschedule = self.maybe_process_tasks();
        self.scheduler_state.lock().unwrap().phase = ProcessingPhase::NotScheduled;
        if needs_reschedule {
            self.schedule_async_task_processing();
        }
        true
    }

    /// Runs `frame` through the handler, interleaving eligible task drainage around or inside
    /// it depending on `config.enable_precise_task_scheduling`.
    pub fn process_frame_and_tasks(&self, frame: &mut Frame<'_>) -> bool {
        if self.config.enable_precise_task_scheduling {
            self.process_frame_and_tasks_precise(frame)
        } else {
            self.process_frame_and_tasks_simple(frame)
        }
    }

    fn schedule_and_maybe_process(&self, task: &Task) -> bool {
        {
            let mut state = task.inner.state.lock().unwrap();
            if !matches!(*state, crate::task::State::New) {
                panic!("task_pipeline: attempt to schedule a task more than once");
            }
            *state = crate::task::State::Scheduled;
        }

        if self.pending_tasks.fetch_add(1, Ordering::AcqRel) != 0 {
            self.push_task(task.clone());
            return false;
        }

        let Some(next_frame_deadline) = self.next_frame_deadline.try_load() else {
            self.push_task(task.clone());
            return false;
        };

        if !self.interframe_task_processing_allowed(next_frame_deadline) {
            self.push_task(task.clone());
            if self.pending_frames.load(Ordering::Acquire) == 0 {
                self.schedule_async_task_processing();
            }
            return false;
        }

        let Ok(guard) = self.pipeline_mutex.try_lock() else {
            self.push_task(task.clone());
            return false;
        };

        self.run_task(task, false);
        self.pending_tasks.fetch_sub(1, Ordering::AcqRel);

        {
            let mut stats = self.stats.lock().unwrap();
            stats.tasks_processed_total += 1;
            stats.tasks_processed_in_place += 1;
        }

        let pending_frames = self.pending_frames.load(Ordering::Acquire);
        if pending_frames != 0 {
            self.stats.lock().unwrap().preemptions += 1;
        }

        drop(guard);

        if pending_frames == 0 && self.pending_tasks.load(Ordering::Acquire) != 0 {
            self.schedule_async_task_processing();
        }

        true
    }

    fn push_task(&self, task: Task) {
        self.task_queue.lock().unwrap().push_back(task);
    }

    fn pop_task(&self) -> Option<Task> {
        self.task_queue.lock().unwrap().pop_front()
    }

    /// Executes `task`'s body, records its result, and fires whatever completion it carries.
    /// `notify` controls whether a `Semaphore` completion is posted — the in-place path in
    /// `schedule_and_maybe_process` passes `false` since its caller never actually waits (it
    /// learns of success through the `true` return from `schedule_and_maybe_process` itself);
    /// every drainage path passes `true`.
    fn run_task(&self, task: &Task, notify: bool) {
        let ok = {
            let mut body = task.inner.body.lock().unwrap();
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (body)())).unwrap_or(false)
        };
        task.inner.success.store(ok, Ordering::Release);
        *task.inner.state.lock().unwrap() = crate::task::State::Finished;

        let mut completion = task.inner.completion.lock().unwrap();
        match &mut *completion {
            Completion::Handler(handler) => handler(task),
            Completion::Semaphore(gate) if notify => {
                let (lock, cvar) = &**gate;
                *lock.lock().unwrap() = true;
                cvar.notify_all();
            }
            Completion::Semaphore(_) | Completion::None => {}
        }
    }

    fn maybe_process_tasks(&self) -> bool {
        let Some(next_frame_deadline) = self.next_frame_deadline.try_load() else {
            return false;
        };
        let Ok(guard) = self.pipeline_mutex.try_lock() else {
            return false;
        };

        self.scheduler_state.lock().unwrap().phase = ProcessingPhase::Running;

        let mut pending_frames_snapshot = 0usize;
        loop {
            if !self.interframe_task_processing_allowed(next_frame_deadline) {
                break;
            }
            pending_frames_snapshot = self.pending_frames.load(Ordering::Acquire);
            if pending_frames_snapshot != 0 {
                break;
            }
            let Some(task) = self.pop_task() else {
                break;
            };
            self.run_task(&task, true);
            self.pending_tasks.fetch_sub(1, Ordering::AcqRel);
            let mut stats = self.stats.lock().unwrap();
            stats.tasks_processed_total += 1;
            stats.tasks_processed_async += 1;
        }

        if pending_frames_snapshot != 0 {
            self.stats.lock().unwrap().preemptions += 1;
        }

        drop(guard);

        pending_frames_snapshot == 0 && self.pending_tasks.load(Ordering::Acquire) != 0
    }

    fn process_frame_and_tasks_simple(&self, frame: &mut Frame<'_>) -> bool {
        self.pending_frames.fetch_add(1, Ordering::AcqRel);
        self.cancel_async_task_processing();

        let frame_res = {
            let _guard = self.pipeline_mutex.lock().unwrap();
            self.handler.lock().unwrap().process_frame(frame)
        };

        let remaining = self.pending_frames.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.pending_tasks.load(Ordering::Acquire) != 0 {
            self.schedule_async_task_processing();
        }
        frame_res
    }

    fn process_frame_and_tasks_precise(&self, frame: &mut Frame<'_>) -> bool {
        self.pending_frames.fetch_add(1, Ordering::AcqRel);
        let frame_start = self.clock.now();
        self.cancel_async_task_processing();

        let guard = self.pipeline_mutex.lock().unwrap();

        let total = frame.len();
        let frame_duration = self.sample_spec.samples_to_duration(total);
        let next_frame_deadline = frame_start + frame_duration;
        self.next_frame_deadline.publish(next_frame_deadline);

        let max_sub_samples = self
            .sample_spec
            .duration_to_samples(self.config.max_frame_length_between_tasks);

        let mut frame_pos = 0usize;
        let mut frame_res = true;
        loop {
            let remaining = total - frame_pos;
            let sub_len = if max_sub_samples == 0 {
                remaining
            } else {
                remaining.min(max_sub_samples)
            };

            {
                let mut sub = frame.sub_frame(frame_pos, sub_len);
                frame_res = self.handler.lock().unwrap().process_frame(&mut sub);
            }
            frame_pos += sub_len;

            let now = self.clock.now();
            {
                let mut drain_state = self.frame_drain_state.lock().unwrap();
                drain_state.subframe_tasks_deadline = now + self.config.max_inframe_task_processing;
                if !drain_state.enough_samples {
                    drain_state.samples_processed += sub_len;
                    let min_samples = self
                        .sample_spec
                        .duration_to_samples(self.config.min_frame_length_between_tasks);
                    if drain_state.samples_processed >= min_samples {
                        drain_state.enough_samples = true;
                    }
                }
            }

            if self.start_subframe_task_processing() {
                loop {
                    let Some(task) = self.pop_task() else {
                        break;
                    };
                    self.run_task(&task, true);
                    self.pending_tasks.fetch_sub(1, Ordering::AcqRel);
                    {
                        let mut stats = self.stats.lock().unwrap();
                        stats.tasks_processed_total += 1;
                        stats.tasks_processed_in_frame += 1;
                    }
                    if !self.subframe_task_processing_allowed(next_frame_deadline) {
                        break;
                    }
                }
            }

            if !frame_res || frame_pos >= total {
                break;
            }
        }

        self.report_stats();
        drop(guard);

        let remaining_frames = self.pending_frames.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining_frames == 0 && self.pending_tasks.load(Ordering::Acquire) != 0 {
            self.schedule_async_task_processing();
        }

        frame_res
    }

    fn start_subframe_task_processing(&self) -> bool {
        if self.pending_tasks.load(Ordering::Acquire) == 0 {
            return false;
        }
        let mut drain_state = self.frame_drain_state.lock().unwrap();
        if !drain_state.enough_samples {
            return false;
        }
        drain_state.enough_samples = false;
        drain_state.samples_processed = 0;
        true
    }

    fn subframe_task_processing_allowed(&self, next_frame_deadline: PipelineInstant) -> bool {
        let now = self.clock.now();
        if now >= self.frame_drain_state.lock().unwrap().subframe_tasks_deadline {
            return false;
        }
        now < next_frame_deadline - self.config.no_task_proc_half_interval()
    }

    fn interframe_task_processing_allowed(&self, next_frame_deadline: PipelineInstant) -> bool {
        if !self.config.enable_precise_task_scheduling {
            return true;
        }
        let now = self.clock.now();
        let half = self.config.no_task_proc_half_interval();
        now < next_frame_deadline - half || now >= next_frame_deadline + half
    }

    fn compute_drainage_deadline(&self, next_frame_deadline: PipelineInstant) -> PipelineInstant {
        if !self.config.enable_precise_task_scheduling {
            return self.clock.now();
        }
        let now = self.clock.now();
        let half = self.config.no_task_proc_half_interval();
        if now < next_frame_deadline - half {
            now
        } else if now < next_frame_deadline + half {
            next_frame_deadline + half
        } else {
            now
        }
    }

    fn schedule_async_task_processing(&self) {
        let Some(next_frame_deadline) = self.next_frame_deadline.try_load() else {
            return;
        };
        let Ok(mut state) = self.scheduler_state.try_lock() else {
            return;
        };

        if state.phase == ProcessingPhase::NotScheduled {
            let deadline = self.compute_drainage_deadline(next_frame_deadline);
            self.scheduler.schedule_task_processing(deadline);
            self.stats.lock().unwrap().scheduler_calls += 1;
            state.phase = ProcessingPhase::Scheduled;
        }
        drop(state);

        if self.pending_frames.load(Ordering::Acquire) != 0 {
            self.cancel_async_task_processing();
        }
    }

    fn cancel_async_task_processing(&self) {
        let Ok(mut state) = self.scheduler_state.try_lock() else {
            return;
        };
        if state.phase == ProcessingPhase::Scheduled {
            self.scheduler.cancel_task_processing();
            self.stats.lock().unwrap().scheduler_cancellations += 1;
            state.phase = ProcessingPhase::NotScheduled;
        }
    }

    fn report_stats(&self) {
        let now = self.clock.now();
        let Ok(mut state) = self.scheduler_state.try_lock() else {
            return;
        };
        if state.rate_limiter.allow(now) {
            let stats = *self.stats.lock().unwrap();
            log::debug!(
                "task_pipeline: total={} in_place={} in_frame={} async={} preemptions={} sched={}/{}",
                stats.tasks_processed_total,
                stats.tasks_processed_in_place,
                stats.tasks_processed_in_frame,
                stats.tasks_processed_async,
                stats.preemptions,
                stats.scheduler_calls,
                stats.scheduler_cancellations,
            );
        }
    }
}
