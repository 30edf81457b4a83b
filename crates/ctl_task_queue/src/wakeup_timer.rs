use std::sync::{Condvar, Mutex};
use std::time::Instant;

/// A single-waiter timer that sleeps until a settable deadline, waking early whenever the
/// deadline is moved earlier than the one it is currently sleeping against.
///
/// This is the concrete implementation backing [`crate::TaskQueue`]'s worker thread. It plays
/// the same role `roc_core::Timer` plays for `roc_ctl::TaskQueue`: the worker parks here
/// between tasks rather than busy-polling, and any thread that schedules, reschedules or
/// cancels a task can shorten the wait without waking the worker spuriously for deadlines
/// further out than the one it is already honoring.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Deadline {
    Infinite,
    At(Instant),
}

pub(crate) struct WakeupTimer {
    deadline: Mutex<Deadline>,
    cond: Condvar,
}

impl WakeupTimer {
    pub(crate) fn new() -> Self {
        WakeupTimer {
            deadline: Mutex::new(Deadline::Infinite),
            cond: Condvar::new(),
        }
    }

    /// Replace the deadline. `None` means "never wake up on its own." Wakes the waiter
    /// immediately if the new deadline is earlier than what it was waiting for, or if it was
    /// waiting forever.
    pub(crate) fn set_deadline(&self, deadline: Option<Instant>) {
        let mut guard = self.deadline.lock().unwrap();
        let new = deadline.map_or(Deadline::Infinite, Deadline::At);
        let wake = match (*guard, new) {
            (_, Deadline::Infinite) => false,
            (Deadline::Infinite, Deadline::At(_)) => true,
            (Deadline::At(cur), Deadline::At(next)) => next < cur,
        };
        *guard = new;
        if wake {
            self.cond.notify_all();
        }
    }

    /// Blocks until the current deadline has passed. Returns immediately if the deadline is
    /// already in the past, or if there was never a deadline set and one arrives in the past.
    pub(crate) fn wait_deadline(&self) {
        let mut guard = self.deadline.lock().unwrap();
        loop {
            match *guard {
                Deadline::Infinite => {
                    guard = self.cond.wait(guard).unwrap();
                }
                Deadline::At(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return;
                    }
                    let (next_guard, timeout) =
                        self.cond.wait_timeout(guard, deadline - now).unwrap();
                    guard = next_guard;
                    if timeout.timed_out() {
                        return;
                    }
                    // Spurious wakeup or the deadline moved: loop and recheck against the
                    // current deadline rather than the one we started waiting on.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn wakes_at_deadline() {
        let timer = Arc::new(WakeupTimer::new());
        timer.set_deadline(Some(Instant::now() + Duration::from_millis(20)));
        let started = Instant::now();
        timer.wait_deadline();
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn infinite_deadline_blocks_until_shortened() {
        let timer = Arc::new(WakeupTimer::new());
        let worker_timer = timer.clone();
        let handle = std::thread::spawn(move || {
            worker_timer.wait_deadline();
        });
        std::thread::sleep(Duration::from_millis(10));
        timer.set_deadline(Some(Instant::now()));
        handle.join().unwrap();
    }

    #[test]
    fn shortening_a_deadline_wakes_early() {
        let timer = Arc::new(WakeupTimer::new());
        timer.set_deadline(Some(Instant::now() + Duration::from_secs(3600)));
        let worker_timer = timer.clone();
        let handle = std::thread::spawn(move || {
            let started = Instant::now();
            worker_timer.wait_deadline();
            started.elapsed()
        });
        std::thread::sleep(Duration::from_millis(10));
        timer.set_deadline(Some(Instant::now()));
        let elapsed = handle.join().unwrap();
        assert!(elapsed < Duration::from_secs(1));
    }
}
