use prometheus::{Encoder, TextEncoder, HistogramVec, IntCounterVec, GaugeVec, Opts, Registry};
use warp::Filter;
use std::net::SocketAddr;
use std::sync::Mutex;
use once_cell::sync::Lazy;
use tracing::warn;

use super::{Event, Sink};
use crate::stats::{ProbeOutcome, Snapshot};
use crate::util::millis;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static RTT_GAUGE: Lazy<GaugeVec> = Lazy::new(|| {
    let opts = Opts::new("tcp_probe_rtt_milliseconds_current", "Most recent connect time in milliseconds");
    let gauge = GaugeVec::new(opts, &["target", "port"]).expect("creating rtt gauge");
    REGISTRY.register(Box::new(gauge.clone())).expect("registering rtt gauge");
    gauge
});

static UP_GAUGE: Lazy<GaugeVec> = Lazy::new(|| {
    let opts = Opts::new("tcp_probe_up", "1 while the target accepts connections, 0 while it is down");
    let gauge = GaugeVec::new(opts, &["target", "port"]).expect("creating up gauge");
    REGISTRY.register(Box::new(gauge.clone())).expect("registering up gauge");
    gauge
});

static PROBE_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("tcp_probe_probes_total", "Total number of probes by result");
    let ctr = IntCounterVec::new(opts, &["target", "port", "result"]).expect("creating probe counter");
    REGISTRY.register(Box::new(ctr.clone())).expect("registering probe counter");
    ctr
});

static RECOVERY_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("tcp_probe_recoveries_total", "Total number of DOWN to UP transitions");
    let ctr = IntCounterVec::new(opts, &["target", "port"]).expect("creating recovery counter");
    REGISTRY.register(Box::new(ctr.clone())).expect("registering recovery counter");
    ctr
});

static RETRY_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("tcp_probe_resolution_retries_total", "Total number of hostname re-resolutions");
    let ctr = IntCounterVec::new(opts, &["target"]).expect("creating retry counter");
    REGISTRY.register(Box::new(ctr.clone())).expect("registering retry counter");
    ctr
});

// Only registered when latency history is enabled.
static LATENCY_HIST: Lazy<Mutex<Option<HistogramVec>>> = Lazy::new(|| Mutex::new(None));

fn initialize_histogram() {
    let Ok(mut guard) = LATENCY_HIST.lock() else {
        return;
    };
    if guard.is_some() {
        return;
    }

    let opts = Opts::new("tcp_probe_rtt_milliseconds", "Connect time in milliseconds");
    let hist = HistogramVec::new(
        prometheus::HistogramOpts {
            common_opts: opts,
            buckets: vec![
                0.05, 0.1, 0.2, 0.5, 1.0,
                2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0, 1000.0
            ],
        },
        &["target", "port"],
    );
    match hist {
        Ok(hist) => match REGISTRY.register(Box::new(hist.clone())) {
            Ok(()) => *guard = Some(hist),
            Err(e) => warn!("failed to register latency histogram: {}", e),
        },
        Err(e) => warn!("failed to create latency histogram: {}", e),
    }
}

/// Publishes probe results as Prometheus metrics.
pub struct MetricsSink {
    latency_history: bool,
}

impl MetricsSink {
    pub fn new(enable_latency_history: bool) -> Self {
        if enable_latency_history {
            initialize_histogram();
        }
        Self {
            latency_history: enable_latency_history,
        }
    }

    fn observe(&self, probe: &ProbeOutcome, snapshot: &Snapshot) {
        let target = snapshot.target.hostname.as_str();
        let port = snapshot.target.port.to_string();
        let labels = [target, port.as_str()];

        let result = if probe.success { "success" } else { "failure" };
        PROBE_COUNTER
            .with_label_values(&[target, port.as_str(), result])
            .inc();
        UP_GAUGE
            .with_label_values(&labels)
            .set(if snapshot.stats.is_currently_down { 0.0 } else { 1.0 });

        if !probe.success {
            return;
        }

        let latency_ms = millis(probe.rtt);
        RTT_GAUGE.with_label_values(&labels).set(latency_ms);

        if self.latency_history {
            if let Ok(guard) = LATENCY_HIST.lock() {
                if let Some(ref hist) = *guard {
                    hist.with_label_values(&labels).observe(latency_ms);
                }
            }
        }
    }
}

impl Sink for MetricsSink {
    fn on_event(&mut self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::ProbeSuccess { probe, snapshot } | Event::ProbeFailure { probe, snapshot } => {
                self.observe(probe, snapshot);
            }
            Event::RecoveredFromDowntime { snapshot, .. } => {
                let port = snapshot.target.port.to_string();
                RECOVERY_COUNTER
                    .with_label_values(&[snapshot.target.hostname.as_str(), port.as_str()])
                    .inc();
            }
            Event::RetryingResolution { target } => {
                RETRY_COUNTER.with_label_values(&[target.hostname.as_str()]).inc();
            }
            _ => {}
        }
        Ok(())
    }
}

pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mf = REGISTRY.gather();
    let mut buf = Vec::new();
    encoder.encode(&mf, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

pub async fn serve_metrics(addr: SocketAddr) {
    let metrics_route = warp::path!("metrics").map(move || {
        let body = gather_text().unwrap_or_else(|e| {
            warn!("failed to encode metrics: {}", e);
            String::new()
        });
        warp::reply::with_header(body, "Content-Type", TextEncoder::new().format_type().to_string())
    });

    warp::serve(metrics_route).run(addr).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::resolver::Resolved;
    use crate::session::Session;
    use crate::stats::RunningStats;

    #[test]
    fn probe_events_show_up_in_exposition() {
        let session = Session::new(
            "metrics.example",
            Resolved {
                address: "192.0.2.1".parse().unwrap(),
                literal: false,
            },
            8443,
        );
        let stats = RunningStats::new(session.address, session.started_at);
        let probe = ProbeOutcome {
            success: true,
            rtt: Duration::from_millis(25),
            elapsed: Duration::from_secs(1),
            observed_at: Utc::now(),
            source: None,
        };

        let mut sink = MetricsSink::new(true);
        sink.on_event(&Event::ProbeSuccess {
            probe,
            snapshot: Snapshot::capture(&session, &stats, Utc::now()),
        })
        .unwrap();

        let text = gather_text().unwrap();
        assert!(text.contains("tcp_probe_rtt_milliseconds_current{port=\"8443\",target=\"metrics.example\"} 25"));
        assert!(text.contains("tcp_probe_up{port=\"8443\",target=\"metrics.example\"} 1"));
        assert!(text.contains("tcp_probe_rtt_milliseconds_bucket"));
    }
}
