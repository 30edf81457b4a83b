//! Serializes real-time audio frame processing and best-effort control-plane task processing
//! onto whichever threads call into a [`TaskPipeline`], without a dedicated thread of its own.
//!
//! Pair this with a [`ctl_task_queue::TaskQueue`] through [`scheduler::QueueScheduler`] to get
//! a background thread that drains queued tasks whenever no frame is in flight and the next
//! frame deadline is comfortably far away.

mod clock;
mod config;
mod frame;
mod handler;
mod pipeline;
mod scheduler;
mod stats;
mod task;

pub use clock::{Clock, PipelineInstant, RealClock, VirtualClock};
pub use config::PipelineConfig;
pub use frame::{Frame, SampleSpec};
pub use handler::PipelineHandler;
pub use pipeline::TaskPipeline;
pub use scheduler::{QueueScheduler, TaskScheduler};
pub use stats::Stats;
pub use task::{CompletionHandler, Task, TaskBody};
