use std::time::Duration;
use tokio::time::Instant;
use anyhow::Result;

/// Fixed-rate pacing for sequential probes.
///
/// A tick is armed `interval` after the previous tick *started*. When a probe
/// overruns the interval the next tick is due immediately, with no catch-up.
pub struct Scheduler {
    interval: Duration,
    count: u64,
    max_duration: Option<Duration>,
    started: Instant,
    next: Instant,
}

impl Scheduler {
    pub fn new(interval: Duration, count: u64, max_duration: Option<Duration>) -> Result<Self> {
        anyhow::ensure!(!interval.is_zero(), "probe interval must be greater than zero");
        let now = Instant::now();
        Ok(Self {
            interval,
            count,
            max_duration,
            started: now,
            next: now,
        })
    }

    /// When the next tick may start.
    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Record that a tick starts now and arm the following one.
    pub fn begin_tick(&mut self) -> Instant {
        let now = Instant::now();
        self.next = now + self.interval;
        now
    }

    /// Limits are only consulted between ticks.
    pub fn exhausted(&self, probes_done: u64) -> bool {
        if self.count > 0 && probes_done >= self.count {
            return true;
        }
        self.max_duration
            .is_some_and(|limit| self.started.elapsed() >= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Scheduler::new(Duration::ZERO, 0, None).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_due_immediately() {
        let scheduler = Scheduler::new(Duration::from_secs(1), 0, None).unwrap();
        assert!(scheduler.deadline() <= Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn next_tick_is_paced_from_previous_start() {
        let mut scheduler = Scheduler::new(Duration::from_secs(1), 0, None).unwrap();
        let start = scheduler.begin_tick();
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(scheduler.deadline(), start + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_does_not_add_delay() {
        let mut scheduler = Scheduler::new(Duration::from_secs(1), 0, None).unwrap();
        scheduler.begin_tick();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(scheduler.deadline() <= Instant::now());
    }

    #[test]
    fn count_limit_is_checked_against_completed_probes() {
        let scheduler = Scheduler::new(Duration::from_secs(1), 3, None).unwrap();
        assert!(!scheduler.exhausted(2));
        assert!(scheduler.exhausted(3));
    }

    #[tokio::test(start_paused = true)]
    async fn duration_limit_expires() {
        let scheduler =
            Scheduler::new(Duration::from_secs(1), 0, Some(Duration::from_secs(5))).unwrap();
        assert!(!scheduler.exhausted(0));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(scheduler.exhausted(0));
    }
}
