//! UP/DOWN state machine over probe outcomes.
//!
//! The session starts optimistically UP. An uptime interval opens at the
//! first success (or at a recovery) and a downtime interval at the first
//! failure after being UP, so a session that starts with failures never
//! records a zero-evidence uptime.

use crate::stats::{Interval, ProbeOutcome, RunningStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// UP→DOWN. `uptime` is the interval that just closed, if one was open.
    WentDown { uptime: Option<Interval> },
    /// DOWN→UP with the downtime interval that just closed.
    Recovered { downtime: Interval },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StateTracker;

impl StateTracker {
    pub fn new() -> Self {
        Self
    }

    /// Fold one outcome into `stats`, returning the state transition it caused.
    pub fn update(&self, stats: &mut RunningStats, outcome: &ProbeOutcome) -> Option<Transition> {
        let at = outcome.observed_at;

        if outcome.success {
            let transition = if stats.is_currently_down {
                let since = stats.current_state_since.unwrap_or(at);
                let downtime = Interval::new(since, at);
                keep_longest(&mut stats.longest_downtime, downtime);
                stats.current_state_since = Some(at);
                stats.is_currently_down = false;
                stats.ongoing_unsuccessful_streak = 0;
                Some(Transition::Recovered { downtime })
            } else {
                if stats.current_state_since.is_none() {
                    stats.current_state_since = Some(at);
                }
                None
            };

            stats.total_uptime += outcome.elapsed;
            stats.total_successful_probes += 1;
            stats.ongoing_successful_streak += 1;
            stats.rtt_samples.push(outcome.rtt);
            stats.last_successful_at = Some(at);
            transition
        } else {
            let transition = if stats.is_currently_down {
                None
            } else {
                let uptime = stats.current_state_since.map(|since| Interval::new(since, at));
                if let Some(uptime) = uptime {
                    keep_longest(&mut stats.longest_uptime, uptime);
                }
                stats.current_state_since = Some(at);
                stats.is_currently_down = true;
                stats.ongoing_successful_streak = 0;
                Some(Transition::WentDown { uptime })
            };

            stats.total_downtime += outcome.elapsed;
            stats.total_unsuccessful_probes += 1;
            stats.ongoing_unsuccessful_streak += 1;
            stats.last_unsuccessful_at = Some(at);
            transition
        }
    }
}

// Ties go to the most recent interval.
fn keep_longest(slot: &mut Option<Interval>, candidate: Interval) {
    match slot {
        Some(longest) if candidate.duration < longest.duration => {}
        _ => *slot = Some(candidate),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn success(secs: i64, rtt_ms: u64) -> ProbeOutcome {
        ProbeOutcome {
            success: true,
            rtt: Duration::from_millis(rtt_ms),
            elapsed: Duration::from_secs(1),
            observed_at: at(secs),
            source: None,
        }
    }

    fn failure(secs: i64) -> ProbeOutcome {
        ProbeOutcome {
            success: false,
            rtt: Duration::from_secs(1),
            elapsed: Duration::from_secs(1),
            observed_at: at(secs),
            source: None,
        }
    }

    fn fresh() -> RunningStats {
        RunningStats::new("192.0.2.1".parse().unwrap(), t0())
    }

    fn assert_invariants(stats: &RunningStats, executed: u64) {
        assert_eq!(stats.total_probes(), executed);
        assert!(stats.ongoing_successful_streak == 0 || stats.ongoing_unsuccessful_streak == 0);
    }

    #[test]
    fn consecutive_successes_accumulate_uptime_and_rtt() {
        let tracker = StateTracker::new();
        let mut stats = fresh();
        for (i, rtt) in [10, 20, 15, 12, 18].into_iter().enumerate() {
            assert_eq!(tracker.update(&mut stats, &success(i as i64 + 1, rtt)), None);
        }

        assert_eq!(stats.total_successful_probes, 5);
        assert_eq!(stats.total_unsuccessful_probes, 0);
        assert_eq!(stats.total_uptime, Duration::from_secs(5));
        assert_eq!(stats.total_downtime, Duration::ZERO);
        assert_eq!(stats.longest_downtime, None);

        let rtt = stats.rtt_summary().unwrap();
        assert_eq!(rtt.min, Duration::from_millis(10));
        assert_eq!(rtt.avg, Duration::from_millis(15));
        assert_eq!(rtt.max, Duration::from_millis(20));
    }

    #[test]
    fn recovery_closes_downtime_interval() {
        let tracker = StateTracker::new();
        let mut stats = fresh();
        let mut recoveries = Vec::new();
        let outcomes = [failure(1), failure(2), failure(3), success(4, 12)];
        for outcome in &outcomes {
            if let Some(Transition::Recovered { downtime }) = tracker.update(&mut stats, outcome) {
                recoveries.push(downtime);
            }
        }

        assert_eq!(recoveries.len(), 1);
        assert_eq!(recoveries[0].duration, Duration::from_secs(3));
        assert_eq!(stats.longest_downtime, Some(recoveries[0]));
        assert_eq!(stats.ongoing_successful_streak, 1);
        assert_eq!(stats.ongoing_unsuccessful_streak, 0);
        assert!(!stats.is_currently_down);
        assert_eq!(stats.current_state_since, Some(at(4)));
    }

    #[test]
    fn leading_failures_record_no_uptime() {
        let tracker = StateTracker::new();
        let mut stats = fresh();
        let transition = tracker.update(&mut stats, &failure(1));
        assert_eq!(transition, Some(Transition::WentDown { uptime: None }));
        assert_eq!(stats.longest_uptime, None);
        assert!(stats.is_currently_down);
    }

    #[test]
    fn all_failure_session_never_populates_uptime() {
        let tracker = StateTracker::new();
        let mut stats = fresh();
        for secs in 1..=10 {
            tracker.update(&mut stats, &failure(secs));
        }
        assert_eq!(stats.longest_uptime, None);
        assert_eq!(stats.longest_downtime, None);
        assert_eq!(stats.rtt_summary(), None);
        assert_eq!(stats.ongoing_unsuccessful_streak, 10);
        assert_invariants(&stats, 10);
    }

    #[test]
    fn going_down_closes_uptime_from_first_success() {
        let tracker = StateTracker::new();
        let mut stats = fresh();
        tracker.update(&mut stats, &success(2, 5));
        tracker.update(&mut stats, &success(3, 5));
        let transition = tracker.update(&mut stats, &failure(7));

        let expected = Interval::new(at(2), at(7));
        assert_eq!(transition, Some(Transition::WentDown { uptime: Some(expected) }));
        assert_eq!(stats.longest_uptime, Some(expected));
        assert_eq!(stats.ongoing_successful_streak, 0);
        assert_eq!(stats.ongoing_unsuccessful_streak, 1);
    }

    #[test]
    fn equal_intervals_replace_the_stored_record() {
        let tracker = StateTracker::new();
        let mut stats = fresh();
        // Two 2s outages: [1,3) and [5,7).
        for outcome in [failure(1), success(3, 5), success(4, 5), failure(5), success(7, 5)] {
            tracker.update(&mut stats, &outcome);
        }
        let longest = stats.longest_downtime.unwrap();
        assert_eq!(longest.duration, Duration::from_secs(2));
        assert_eq!(longest.start, at(5));
    }

    #[test]
    fn longest_downtime_tracks_maximum_of_closed_intervals() {
        let tracker = StateTracker::new();
        let mut stats = fresh();
        let pattern = [
            failure(1),
            failure(2),
            failure(3),
            failure(4),
            success(5, 3), // 4s outage
            failure(6),
            success(7, 3), // 1s outage
            failure(8),
            failure(9),
        ];
        let mut executed = 0;
        for outcome in &pattern {
            tracker.update(&mut stats, outcome);
            executed += 1;
            assert_invariants(&stats, executed);
        }
        // The open outage starting at 8 is not counted.
        let longest = stats.longest_downtime.unwrap();
        assert_eq!(longest.duration, Duration::from_secs(4));
        assert_eq!(longest.start, at(1));
        assert_eq!(stats.total_downtime, Duration::from_secs(7));
        assert_eq!(stats.total_uptime, Duration::from_secs(2));
    }

    #[test]
    fn failures_do_not_record_rtt_samples() {
        let tracker = StateTracker::new();
        let mut stats = fresh();
        tracker.update(&mut stats, &failure(1));
        tracker.update(&mut stats, &success(2, 40));
        assert_eq!(stats.rtt_samples, vec![Duration::from_millis(40)]);
        assert_eq!(stats.last_unsuccessful_at, Some(at(1)));
        assert_eq!(stats.last_successful_at, Some(at(2)));
    }
}
