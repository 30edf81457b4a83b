//! The pipeline's own notion of time.
//!
//! `process_frame_and_tasks` needs a clock that tests can drive deterministically (to
//! reproduce exact race windows around a frame deadline), which rules out `std::time::Instant`
//! — it can't be constructed at an arbitrary value. `PipelineInstant` is a transparent
//! nanosecond count on an arbitrary monotonic origin instead, mirroring the plain integer
//! timestamp type the rest of this kind of codebase uses internally.

use std::ops::{Add, Sub};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use audio_synchronization::sync::AtomicI64;

/// A point in the pipeline's time domain: nanoseconds since an arbitrary origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipelineInstant(i64);

impl PipelineInstant {
    pub const fn from_nanos(nanos: i64) -> Self {
        PipelineInstant(nanos)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, delta: Duration) -> Option<Self> {
        i64::try_from(delta.as_nanos())
            .ok()
            .and_then(|d| self.0.checked_add(d))
            .map(PipelineInstant)
    }

    pub fn checked_sub(self, delta: Duration) -> Option<Self> {
        i64::try_from(delta.as_nanos())
            .ok()
            .and_then(|d| self.0.checked_sub(d))
            .map(PipelineInstant)
    }

    /// Saturating duration since an earlier instant; `self` before `earlier` saturates to zero
    /// rather than panicking, matching `Instant::duration_since`'s documented fallback.
    pub fn saturating_duration_since(self, earlier: PipelineInstant) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0).max(0) as u64)
    }
}

impl Add<Duration> for PipelineInstant {
    type Output = PipelineInstant;

    fn add(self, rhs: Duration) -> PipelineInstant {
        self.checked_add(rhs)
            .expect("PipelineInstant addition overflowed i64 nanoseconds")
    }
}

impl Sub<Duration> for PipelineInstant {
    type Output = PipelineInstant;

    fn sub(self, rhs: Duration) -> PipelineInstant {
        self.checked_sub(rhs)
            .expect("PipelineInstant subtraction overflowed i64 nanoseconds")
    }
}

impl Sub<PipelineInstant> for PipelineInstant {
    type Output = Duration;

    fn sub(self, rhs: PipelineInstant) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

/// Supplies the current time to a [`crate::TaskPipeline`]. Production code uses [`RealClock`];
/// tests use [`VirtualClock`] to advance time in controlled steps without real sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> PipelineInstant;
}

/// A `Clock` backed by the real OS monotonic clock, relative to its own construction time.
#[derive(Clone, Copy)]
pub struct RealClock {
    origin: std::time::Instant,
}

impl RealClock {
    pub fn new() -> Self {
        RealClock {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RealClock {
    fn now(&self) -> PipelineInstant {
        PipelineInstant::from_nanos(self.origin.elapsed().as_nanos() as i64)
    }
}

/// A clock that only moves when told to. Shareable/cloneable: every clone reads and advances
/// the same underlying counter, so a test can hold one handle for assertions and hand another
/// to the pipeline under test.
#[derive(Clone)]
pub struct VirtualClock {
    nanos: Arc<AtomicI64>,
}

impl VirtualClock {
    pub fn new(start: PipelineInstant) -> Self {
        VirtualClock {
            nanos: Arc::new(AtomicI64::new(start.as_nanos())),
        }
    }

    pub fn set(&self, instant: PipelineInstant) {
        self.nanos.store(instant.as_nanos(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(delta.as_nanos() as i64, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> PipelineInstant {
        PipelineInstant::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// The lock-free slot `process_frame_and_tasks` publishes `next_frame_deadline` through, and
/// `schedule`/`process_tasks` read without blocking.
///
/// A single 64-bit atomic word never tears on any platform Rust targets, so unlike the
/// generation-counter trick `audio_synchronization::generational_atomic` uses for 32-bit
/// payloads, one plain store/load pair is already a correct publish: there is no intermediate
/// state a reader could observe. "Read failed" (spec's `try_load`) is simply "never
/// published yet", represented with a reserved `i64::MIN` sentinel instead of wrapping every
/// value in another atomic.
pub(crate) struct DeadlineCell {
    raw: AtomicI64,
}

const UNSET: i64 = i64::MIN;

impl DeadlineCell {
    pub(crate) fn new() -> Self {
        DeadlineCell {
            raw: AtomicI64::new(UNSET),
        }
    }

    pub(crate) fn publish(&self, instant: PipelineInstant) {
        debug_assert_ne!(instant.as_nanos(), UNSET, "reserved sentinel collided with a real timestamp");
        self.raw.store(instant.as_nanos(), Ordering::Release);
    }

    pub(crate) fn try_load(&self) -> Option<PipelineInstant> {
        match self.raw.load(Ordering::Acquire) {
            UNSET => None,
            nanos => Some(PipelineInstant::from_nanos(nanos)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_cell_starts_unset() {
        let cell = DeadlineCell::new();
        assert_eq!(cell.try_load(), None);
    }

    #[test]
    fn deadline_cell_round_trips_a_published_value() {
        let cell = DeadlineCell::new();
        let instant = PipelineInstant::from_nanos(42);
        cell.publish(instant);
        assert_eq!(cell.try_load(), Some(instant));
    }

    #[test]
    fn virtual_clock_advances_deterministically() {
        let clock = VirtualClock::new(PipelineInstant::from_nanos(1_000));
        assert_eq!(clock.now().as_nanos(), 1_000);
        clock.advance(Duration::from_nanos(500));
        assert_eq!(clock.now().as_nanos(), 1_500);
        clock.set(PipelineInstant::from_nanos(9_000));
        assert_eq!(clock.now().as_nanos(), 9_000);
    }

    #[test]
    fn subtraction_saturates_instead_of_panicking() {
        let a = PipelineInstant::from_nanos(10);
        let b = PipelineInstant::from_nanos(100);
        assert_eq!(a - b, Duration::ZERO);
        assert_eq!(b - a, Duration::from_nanos(90));
    }
}
