use std::fmt::Write as _;
use std::io::Write;

use chrono::{DateTime, Local, Utc};

use super::{Event, Sink};
use crate::stats::{Interval, ProbeOutcome, Snapshot};
use crate::util::{humanize, millis};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Plain-text, line-oriented renderer.
pub struct TextSink {
    out: Box<dyn Write + Send>,
    show_timestamp: bool,
    show_source_address: bool,
}

impl TextSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            show_timestamp: false,
            show_source_address: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn show_timestamp(mut self, enabled: bool) -> Self {
        self.show_timestamp = enabled;
        self
    }

    pub fn show_source_address(mut self, enabled: bool) -> Self {
        self.show_source_address = enabled;
        self
    }

    fn stamp(&self, at: DateTime<Utc>) -> String {
        if self.show_timestamp {
            format!("{} ", local(at))
        } else {
            String::new()
        }
    }

    fn reply_line(&self, probe: &ProbeOutcome, snapshot: &Snapshot) -> String {
        let mut line = format!(
            "{}Reply from {} on port {} TCP_conn={} time={:.3} ms",
            self.stamp(probe.observed_at),
            snapshot.target,
            snapshot.target.port,
            snapshot.stats.ongoing_successful_streak,
            millis(probe.rtt),
        );
        if self.show_source_address {
            if let Some(source) = probe.source {
                let _ = write!(line, " using {source}");
            }
        }
        line
    }

    fn no_reply_line(&self, probe: &ProbeOutcome, snapshot: &Snapshot) -> String {
        format!(
            "{}No reply from {} on port {} TCP_conn={}",
            self.stamp(probe.observed_at),
            snapshot.target,
            snapshot.target.port,
            snapshot.stats.ongoing_unsuccessful_streak,
        )
    }

    pub fn render(&self, event: &Event) -> String {
        match event {
            Event::SessionStart { target } => {
                format!("TCPinging {} on port {}", target, target.port)
            }
            Event::ProbeSuccess { probe, snapshot } => self.reply_line(probe, snapshot),
            Event::ProbeFailure { probe, snapshot } => self.no_reply_line(probe, snapshot),
            Event::RecoveredFromDowntime { downtime, snapshot } => format!(
                "{}{} on port {} is reachable again after {} of downtime",
                self.stamp(snapshot.taken_at),
                snapshot.target,
                snapshot.target.port,
                humanize(*downtime),
            ),
            Event::RetryingResolution { target } => {
                format!("Retrying to resolve {}", target.hostname)
            }
            Event::AddressChanged { target, previous } => format!(
                "IP address of {} changed from {} to {}",
                target.hostname, previous, target.address
            ),
            Event::ResolutionFailed { target, reason } => format!(
                "Failed to resolve {} ({}), still probing {}",
                target.hostname, reason, target.address
            ),
            Event::SnapshotRequested { snapshot } => render_statistics(snapshot, false),
            Event::SessionEnd { snapshot } => render_statistics(snapshot, true),
            Event::SessionAborted {
                hostname,
                port,
                reason,
            } => format!("Cannot probe {hostname} on port {port}: {reason}"),
        }
    }
}

impl Sink for TextSink {
    fn on_event(&mut self, event: &Event) -> anyhow::Result<()> {
        let text = self.render(event);
        writeln!(self.out, "{text}")?;
        self.out.flush()?;
        Ok(())
    }
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

fn interval_line(interval: Option<&Interval>) -> String {
    match interval {
        Some(i) => format!(
            "{} from {} to {}",
            humanize(i.duration),
            local(i.start),
            local(i.end)
        ),
        None => "none".to_string(),
    }
}

/// The statistics block printed on request and at the end of a session.
pub fn render_statistics(snapshot: &Snapshot, final_summary: bool) -> String {
    let stats = &snapshot.stats;
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "--- {} TCPing statistics ---", snapshot.target);
    let _ = writeln!(
        out,
        "{} probes transmitted on port {} | {} received, {:.2}% packet loss",
        snapshot.total_probes,
        snapshot.target.port,
        stats.total_successful_probes,
        snapshot.loss_percent
    );
    let _ = writeln!(out, "successful probes:   {}", stats.total_successful_probes);
    let _ = writeln!(out, "unsuccessful probes: {}", stats.total_unsuccessful_probes);
    let _ = writeln!(
        out,
        "last successful probe:   {}",
        stats.last_successful_at.map_or("never succeeded".to_string(), local)
    );
    let _ = writeln!(
        out,
        "last unsuccessful probe: {}",
        stats.last_unsuccessful_at.map_or("never failed".to_string(), local)
    );
    let _ = writeln!(out, "total uptime:   {}", humanize(stats.total_uptime));
    let _ = writeln!(out, "total downtime: {}", humanize(stats.total_downtime));
    let _ = writeln!(
        out,
        "longest consecutive uptime:   {}",
        interval_line(stats.longest_uptime.as_ref())
    );
    let _ = writeln!(
        out,
        "longest consecutive downtime: {}",
        interval_line(stats.longest_downtime.as_ref())
    );
    if let Some(current) = &snapshot.current_interval {
        let state = if stats.is_currently_down { "down" } else { "up" };
        let _ = writeln!(out, "currently {state} for {}", humanize(current.duration));
    }
    if !snapshot.target.literal {
        let _ = writeln!(out, "retried to resolve hostname {} times", stats.retry_count);
        if stats.address_changes.len() > 1 {
            let _ = writeln!(out, "IP address changes:");
            for change in &stats.address_changes {
                let _ = writeln!(out, "  {} at {}", change.address, local(change.observed_at));
            }
        }
    }
    match &snapshot.rtt {
        Some(rtt) => {
            let _ = writeln!(
                out,
                "rtt min/avg/max: {:.3}/{:.3}/{:.3} ms",
                millis(rtt.min),
                millis(rtt.avg),
                millis(rtt.max)
            );
        }
        None => {
            let _ = writeln!(out, "rtt min/avg/max: no results");
        }
    }
    let _ = writeln!(out, "--------------------------------------");
    let _ = writeln!(out, "TCPing started at: {}", local(snapshot.session_started_at));
    if final_summary {
        let _ = writeln!(out, "TCPing ended at:   {}", local(snapshot.taken_at));
    }
    let _ = write!(out, "duration: {}", humanize(snapshot.session_duration()));
    out
}
