use std::time::Duration;

use crate::clock::PipelineInstant;

/// Read-only snapshot of the pipeline's task-processing activity. No wire format: this exists
/// for logging and tests, same as the original's `Stats` struct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub tasks_processed_total: u64,
    pub tasks_processed_in_place: u64,
    pub tasks_processed_in_frame: u64,
    pub tasks_processed_async: u64,
    pub preemptions: u64,
    pub scheduler_calls: u64,
    pub scheduler_cancellations: u64,
    /// Tasks currently sitting in the FIFO, awaiting drainage.
    pub pending_tasks: usize,
    /// `process_frame_and_tasks` calls currently running or blocked.
    pub pending_frames: usize,
}

/// Rate-limits the periodic stats log line to at most once per `interval`, the way
/// `task_pipeline.cpp` limits its summary to once a minute (`StatsReportInterval`). Gated
/// behind the same scheduler mutex as the scheduling state it logs, so it never contends
/// with frame processing.
pub(crate) struct RateLimiter {
    interval: Duration,
    last_report: Option<PipelineInstant>,
}

impl RateLimiter {
    pub(crate) fn new(interval: Duration) -> Self {
        RateLimiter {
            interval,
            last_report: None,
        }
    }

    /// Returns `true` and records `now` as the last report time iff enough time elapsed since
    /// the previous report (or this is the first one).
    pub(crate) fn allow(&mut self, now: PipelineInstant) -> bool {
        let ready = match self.last_report {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if ready {
            self.last_report = Some(now);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_the_first_call_and_then_rate_limits() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60));
        let t0 = PipelineInstant::from_nanos(0);
        assert!(limiter.allow(t0));
        assert!(!limiter.allow(t0 + Duration::from_secs(1)));
        assert!(limiter.allow(t0 + Duration::from_secs(61)));
    }
}
