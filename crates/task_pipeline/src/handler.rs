use crate::frame::Frame;

/// The frame-processing body a `TaskPipeline` drives. This is the one genuinely "real work"
/// hook this crate exposes a seam for: everything RTP/FEC/resampling/codec-shaped that would
/// actually fill in `process_frame` lives outside this crate's scope and is supplied by
/// whoever owns the pipeline.
///
/// In precise-scheduling mode this may be called once per sub-frame rather than once per
/// frame, with borrows into progressively later parts of the same underlying frame.
pub trait PipelineHandler: Send {
    /// Process one (sub-)frame in place. A `false` return is a fatal processing failure,
    /// propagated to `process_frame_and_tasks`'s own return value; pipeline state stays
    /// consistent regardless.
    fn process_frame(&mut self, frame: &mut Frame<'_>) -> bool;
}

impl<F: FnMut(&mut Frame<'_>) -> bool + Send> PipelineHandler for F {
    fn process_frame(&mut self, frame: &mut Frame<'_>) -> bool {
        self(frame)
    }
}
