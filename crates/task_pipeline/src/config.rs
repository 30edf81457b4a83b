use std::time::Duration;

/// Tunables governing how aggressively the pipeline interleaves task drainage with frame
/// processing. Mirrors the reference crate's `ServerOptions`-style pattern: a plain
/// `Default`-implementing struct with documented, realistic field values, no file or CLI
/// parsing (both are out of scope for this crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// If `false`, frame and task processing simply compete for a mutex and every scheduling
    /// heuristic below is disabled.
    pub enable_precise_task_scheduling: bool,

    /// Lower bound on audio processed since the last in-frame drain before another one is
    /// allowed. Accumulates across frame boundaries rather than resetting at each one — kept
    /// as a running counter intentionally; see `DESIGN.md`.
    pub min_frame_length_between_tasks: Duration,

    /// Upper bound on one sub-frame. `Duration::ZERO` means "never split a frame."
    pub max_frame_length_between_tasks: Duration,

    /// Maximum time one in-frame drainage window may run between two sub-frames.
    pub max_inframe_task_processing: Duration,

    /// Symmetric guard band around the next frame deadline during which tasks are neither
    /// executed in-place nor asynchronously. Half of this is the "no-task-processing half
    /// interval" used on both sides of the deadline.
    pub task_processing_prohibited_interval: Duration,
}

impl PipelineConfig {
    pub(crate) fn no_task_proc_half_interval(&self) -> Duration {
        self.task_processing_prohibited_interval / 2
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            enable_precise_task_scheduling: true,
            min_frame_length_between_tasks: Duration::from_millis(4),
            max_frame_length_between_tasks: Duration::ZERO,
            max_inframe_task_processing: Duration::from_micros(200),
            task_processing_prohibited_interval: Duration::from_micros(400),
        }
    }
}
