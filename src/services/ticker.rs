use std::thread;
use std::time::{Duration, Instant};

/// Fixed-period timer for a single synchronous task.
///
/// Deadlines that pass while the task is still running are dropped rather
/// than queued: after an over-run the next `wait` returns immediately once,
/// then the schedule restarts from that point.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    /// The first deadline is one `period` from now. A zero period is
    /// raised to one millisecond.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Blocks until the next deadline and returns how many deadlines were
    /// dropped because the caller was late.
    pub fn wait(&mut self) -> u64 {
        let now = Instant::now();

        if now < self.next {
            thread::sleep(self.next - now);
            self.next += self.period;
            return 0;
        }

        let behind = now - self.next;
        let dropped = (behind.as_nanos() / self.period.as_nanos()) as u64;
        self.next = now + self.period;
        dropped
    }
}
