//! Event boundary between the probing engine and its renderers.
//!
//! The engine emits one [`Event`] per observable occurrence. Each output
//! format is one [`Sink`] implementation; [`FanoutSink`] lets several run
//! side by side.

use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;

use crate::session::Target;
use crate::stats::{ProbeOutcome, Snapshot};
use crate::util::serialize_ms;

pub mod json;
pub mod metrics;
pub mod text;

pub use json::JsonSink;
pub use metrics::MetricsSink;
pub use text::TextSink;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SessionStart {
        target: Target,
    },
    ProbeSuccess {
        probe: ProbeOutcome,
        snapshot: Snapshot,
    },
    ProbeFailure {
        probe: ProbeOutcome,
        snapshot: Snapshot,
    },
    RecoveredFromDowntime {
        #[serde(rename = "downtime_ms", serialize_with = "serialize_ms")]
        downtime: Duration,
        snapshot: Snapshot,
    },
    RetryingResolution {
        target: Target,
    },
    AddressChanged {
        target: Target,
        previous: IpAddr,
    },
    /// Re-resolution failed; probing continues against `target.address`.
    ResolutionFailed {
        target: Target,
        reason: String,
    },
    SnapshotRequested {
        snapshot: Snapshot,
    },
    SessionEnd {
        snapshot: Snapshot,
    },
    /// The first resolution failed, so no session was started.
    SessionAborted {
        hostname: String,
        port: u16,
        reason: String,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SessionStart { .. } => "session_start",
            Event::ProbeSuccess { .. } => "probe_success",
            Event::ProbeFailure { .. } => "probe_failure",
            Event::RecoveredFromDowntime { .. } => "recovered_from_downtime",
            Event::RetryingResolution { .. } => "retrying_resolution",
            Event::AddressChanged { .. } => "address_changed",
            Event::ResolutionFailed { .. } => "resolution_failed",
            Event::SnapshotRequested { .. } => "snapshot_requested",
            Event::SessionEnd { .. } => "session_end",
            Event::SessionAborted { .. } => "session_aborted",
        }
    }
}

/// Consumer of engine events. Errors are logged by the caller and never stop probing.
pub trait Sink: Send {
    fn on_event(&mut self, event: &Event) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn Sink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn with(mut self, sink: Box<dyn Sink>) -> Self {
        self.push(sink);
        self
    }
}

impl Sink for FanoutSink {
    fn on_event(&mut self, event: &Event) -> anyhow::Result<()> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.on_event(event) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
