//! A deadline-ordered, cancellable task dispatcher backed by a single background thread.
//!
//! This crate is self-contained and usable on its own: it implements the control-plane half
//! of a cooperative frame/task pipeline (see `task_pipeline`), but has no notion of frames or
//! real-time deadlines itself. It just runs short callbacks, in submission/deadline order, on
//! one worker thread, and lets callers cancel or reschedule them.
//!
//! ```
//! use ctl_task_queue::{Task, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! let task = Task::new(|| true);
//! assert!(queue.schedule_and_wait(&task));
//! queue.stop_and_wait();
//! ```

mod pending_list;
mod queue;
mod task;
mod wakeup_timer;

pub use queue::{TaskQueue, TaskQueueHandle};
pub use task::{CompletionHandler, Task, TaskBody, TaskResult};
