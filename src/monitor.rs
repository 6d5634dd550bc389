//! The probe loop: one task owns the session statistics and drives
//! resolve → probe → update → notify on every tick.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::prober::Prober;
use crate::resolver::{Resolver, retry_due};
use crate::scheduler::Scheduler;
use crate::session::{Session, Target};
use crate::sink::{Event, Sink};
use crate::stats::{ProbeOutcome, RunningStats, Snapshot};
use crate::tracker::{StateTracker, Transition};

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub timeout: Duration,
    /// 0 = unlimited.
    pub count: u64,
    pub max_duration: Option<Duration>,
    /// Consecutive failures before re-resolving; 0 disables.
    pub retry_resolve_after: u32,
}

/// Control lines feeding the loop from outside.
pub struct Controls {
    /// Each message asks for a statistics snapshot.
    pub snapshots: mpsc::Receiver<()>,
    /// Flips to `true` to end the session.
    pub shutdown: watch::Receiver<bool>,
}

pub struct Monitor {
    session: Session,
    settings: MonitorSettings,
    resolver: Resolver,
    prober: Box<dyn Prober>,
    sink: Box<dyn Sink>,
    tracker: StateTracker,
    stats: RunningStats,
    /// Monotonic instant matching `session.started_at`.
    origin: Instant,
}

impl Monitor {
    pub fn new(
        session: Session,
        settings: MonitorSettings,
        resolver: Resolver,
        prober: Box<dyn Prober>,
        sink: Box<dyn Sink>,
    ) -> Self {
        let stats = RunningStats::new(session.address, session.started_at);
        Self {
            session,
            settings,
            resolver,
            prober,
            sink,
            tracker: StateTracker::new(),
            stats,
            origin: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.session, &self.stats, self.wall_time(Instant::now()))
    }

    /// Session wall-clock time of a monotonic instant. Intervals are measured
    /// on the same clock that paces the ticks.
    fn wall_time(&self, at: Instant) -> DateTime<Utc> {
        let offset = at.saturating_duration_since(self.origin);
        self.session.started_at
            + chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn target(&self) -> Target {
        self.session
            .target(self.stats.current_address().unwrap_or(self.session.address))
    }

    fn emit(&mut self, event: Event) {
        if let Err(e) = self.sink.on_event(&event) {
            warn!(event = event.kind(), error = %e, "sink failed to handle event");
        }
    }

    /// Run until a limit is reached or shutdown is signalled, returning the
    /// final snapshot. Only a fatal resolution error ends the loop with `Err`;
    /// the sink still receives `SessionEnd` first.
    pub async fn run(mut self, controls: Controls) -> anyhow::Result<Snapshot> {
        let Controls {
            snapshots,
            mut shutdown,
        } = controls;
        let mut snapshots = Some(snapshots);
        let mut scheduler = Scheduler::new(
            self.settings.interval,
            self.settings.count,
            self.settings.max_duration,
        )?;

        info!(target_host = %self.session.hostname, address = %self.session.address, port = self.session.port, "starting session");
        let target = self.target();
        self.emit(Event::SessionStart { target });

        let mut fatal = None;
        'session: loop {
            if *shutdown.borrow() || scheduler.exhausted(self.stats.total_probes()) {
                break;
            }

            // Idle until the next tick, answering snapshot requests meanwhile.
            let deadline = scheduler.deadline();
            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => break,
                    _ = stopped(&mut shutdown) => break 'session,
                    request = next_request(&mut snapshots) => match request {
                        Some(()) => {
                            let snapshot = self.snapshot();
                            self.emit(Event::SnapshotRequested { snapshot });
                        }
                        None => snapshots = None,
                    },
                }
            }
            if scheduler.exhausted(self.stats.total_probes()) {
                break;
            }

            let tick_start = scheduler.begin_tick();
            let tick = self.tick(tick_start);
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => {
                    debug!("shutdown during probe, dropping its result");
                    break;
                }
                result = tick => {
                    if let Err(e) = result {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }

        let snapshot = self.snapshot();
        info!(
            probes = snapshot.total_probes,
            loss = snapshot.loss_percent,
            "session finished"
        );
        self.emit(Event::SessionEnd {
            snapshot: snapshot.clone(),
        });

        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(snapshot),
        }
    }

    /// One probe cycle. Every outcome is stamped with the tick's start, so a
    /// run of N failures spans N intervals whatever the probe timeout.
    async fn tick(&mut self, tick_start: Instant) -> Result<(), ResolveError> {
        if retry_due(&self.session, &self.stats, self.settings.retry_resolve_after) {
            let target = self.target();
            self.emit(Event::RetryingResolution { target });

            let now = self.wall_time(tick_start);
            let report = self
                .resolver
                .retry_resolve(&self.session, &mut self.stats, now)
                .await?;
            if report.changed {
                let target = self.target();
                self.emit(Event::AddressChanged {
                    target,
                    previous: report.previous,
                });
            } else if let Some(err) = report.error {
                let target = self.target();
                self.emit(Event::ResolutionFailed {
                    target,
                    reason: err.to_string(),
                });
            }
        }

        let address = self.stats.current_address().unwrap_or(self.session.address);
        let result = self
            .prober
            .probe(SocketAddr::new(address, self.session.port), self.settings.timeout)
            .await;

        let outcome = ProbeOutcome {
            success: result.success,
            rtt: result.rtt,
            elapsed: result.rtt.max(self.settings.interval),
            observed_at: self.wall_time(tick_start),
            source: result.source,
        };
        let transition = self.tracker.update(&mut self.stats, &outcome);

        match transition {
            Some(Transition::Recovered { downtime }) => {
                info!(%address, downtime = ?downtime.duration, "target recovered");
                let snapshot = self.snapshot();
                self.emit(Event::RecoveredFromDowntime {
                    downtime: downtime.duration,
                    snapshot,
                });
            }
            Some(Transition::WentDown { .. }) => {
                info!(%address, "target went down");
            }
            None => {}
        }

        let snapshot = self.snapshot();
        if outcome.success {
            self.emit(Event::ProbeSuccess {
                probe: outcome,
                snapshot,
            });
        } else {
            self.emit(Event::ProbeFailure {
                probe: outcome,
                snapshot,
            });
        }
        Ok(())
    }
}

/// Resolves once shutdown is requested; never resolves if the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

async fn next_request(rx: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
