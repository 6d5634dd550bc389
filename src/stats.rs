//! Session statistics and the immutable snapshots handed to sinks.
//!
//! [`RunningStats`] is written only by the tick path (`StateTracker::update`
//! and `Resolver::retry_resolve`). Everything else sees a [`Snapshot`].

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::{Session, Target};
use crate::util::serialize_ms;

/// A closed `[start, end)` span spent in one state.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_ms")]
    pub duration: Duration,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        // A wall clock stepping backwards yields an empty interval.
        let duration = (end - start).to_std().unwrap_or(Duration::ZERO);
        Self {
            start,
            end,
            duration,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct AddressChange {
    pub address: IpAddr,
    pub observed_at: DateTime<Utc>,
}

/// The result of one tick, as folded into [`RunningStats`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub success: bool,
    #[serde(rename = "rtt_ms", serialize_with = "serialize_ms")]
    pub rtt: Duration,
    /// Wall-clock span the tick occupied; this is what uptime/downtime grow by.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_ms")]
    pub elapsed: Duration,
    /// When the attempt started.
    pub observed_at: DateTime<Utc>,
    pub source: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct RttSummary {
    #[serde(rename = "min_ms", serialize_with = "serialize_ms")]
    pub min: Duration,
    #[serde(rename = "avg_ms", serialize_with = "serialize_ms")]
    pub avg: Duration,
    #[serde(rename = "max_ms", serialize_with = "serialize_ms")]
    pub max: Duration,
    pub samples: usize,
}

impl RttSummary {
    /// Aggregate a full sample set. `None` means "no results".
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        let first = *samples.first()?;
        let (min, max, total) = samples.iter().fold(
            (first, first, 0u128),
            |(min, max, total), &rtt| (min.min(rtt), max.max(rtt), total + rtt.as_nanos()),
        );
        let mean = total / samples.len() as u128;
        let avg = Duration::new(
            (mean / 1_000_000_000) as u64,
            (mean % 1_000_000_000) as u32,
        );
        Some(Self {
            min,
            avg,
            max,
            samples: samples.len(),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunningStats {
    pub total_successful_probes: u64,
    pub total_unsuccessful_probes: u64,
    pub ongoing_successful_streak: u64,
    pub ongoing_unsuccessful_streak: u64,
    #[serde(rename = "total_uptime_ms", serialize_with = "serialize_ms")]
    pub total_uptime: Duration,
    #[serde(rename = "total_downtime_ms", serialize_with = "serialize_ms")]
    pub total_downtime: Duration,
    pub last_successful_at: Option<DateTime<Utc>>,
    pub last_unsuccessful_at: Option<DateTime<Utc>>,
    /// Start of the open interval. Unset until the first success or failure
    /// establishes a state.
    pub current_state_since: Option<DateTime<Utc>>,
    pub is_currently_down: bool,
    pub longest_uptime: Option<Interval>,
    pub longest_downtime: Option<Interval>,
    #[serde(skip)]
    pub rtt_samples: Vec<Duration>,
    pub address_changes: Vec<AddressChange>,
    pub retry_count: u32,
}

impl RunningStats {
    pub fn new(initial: IpAddr, observed_at: DateTime<Utc>) -> Self {
        Self {
            total_successful_probes: 0,
            total_unsuccessful_probes: 0,
            ongoing_successful_streak: 0,
            ongoing_unsuccessful_streak: 0,
            total_uptime: Duration::ZERO,
            total_downtime: Duration::ZERO,
            last_successful_at: None,
            last_unsuccessful_at: None,
            current_state_since: None,
            is_currently_down: false,
            longest_uptime: None,
            longest_downtime: None,
            rtt_samples: Vec::new(),
            address_changes: vec![AddressChange {
                address: initial,
                observed_at,
            }],
            retry_count: 0,
        }
    }

    pub fn total_probes(&self) -> u64 {
        self.total_successful_probes + self.total_unsuccessful_probes
    }

    /// Address currently probed: the latest entry of the change log.
    pub fn current_address(&self) -> Option<IpAddr> {
        self.address_changes.last().map(|c| c.address)
    }

    pub fn rtt_summary(&self) -> Option<RttSummary> {
        RttSummary::from_samples(&self.rtt_samples)
    }

    /// Percentage of failed probes, `0.0` before any probe.
    pub fn loss_percent(&self) -> f64 {
        match self.total_probes() {
            0 => 0.0,
            total => self.total_unsuccessful_probes as f64 * 100.0 / total as f64,
        }
    }

    /// Append `address` to the change log if it differs from the latest
    /// entry. Keeps the log strictly increasing by `observed_at`.
    pub(crate) fn record_address(&mut self, address: IpAddr, observed_at: DateTime<Utc>) -> bool {
        let at = match self.address_changes.last() {
            Some(last) if last.address == address => return false,
            Some(last) if observed_at <= last.observed_at => {
                last.observed_at + chrono::Duration::nanoseconds(1)
            }
            _ => observed_at,
        };
        self.address_changes.push(AddressChange {
            address,
            observed_at: at,
        });
        true
    }
}

/// Point-in-time copy of the session and its statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Snapshot {
    pub target: Target,
    pub session_started_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub total_probes: u64,
    pub loss_percent: f64,
    pub rtt: Option<RttSummary>,
    /// The interval still open at `taken_at`; never part of the longest records.
    pub current_interval: Option<Interval>,
    pub stats: RunningStats,
}

impl Snapshot {
    pub fn capture(session: &Session, stats: &RunningStats, taken_at: DateTime<Utc>) -> Self {
        let current = stats.current_address().unwrap_or(session.address);
        Self {
            target: session.target(current),
            session_started_at: session.started_at,
            taken_at,
            total_probes: stats.total_probes(),
            loss_percent: stats.loss_percent(),
            rtt: stats.rtt_summary(),
            current_interval: stats
                .current_state_since
                .map(|since| Interval::new(since, taken_at)),
            stats: stats.clone(),
        }
    }

    pub fn session_duration(&self) -> Duration {
        Interval::new(self.session_started_at, self.taken_at).duration
    }
}
