use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::session::Session;
use crate::stats::RunningStats;

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IpPreference {
    #[default]
    Any,
    V4,
    V6,
}

impl IpPreference {
    pub fn accepts(self, ip: &IpAddr) -> bool {
        match self {
            IpPreference::Any => true,
            IpPreference::V4 => ip.is_ipv4(),
            IpPreference::V6 => ip.is_ipv6(),
        }
    }
}

impl std::fmt::Display for IpPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IpPreference::Any => "IP",
            IpPreference::V4 => "IPv4",
            IpPreference::V6 => "IPv6",
        })
    }
}

/// Name lookup backend. Deadlines are applied by [`Resolver`].
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// The operating system resolver (`getaddrinfo`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub address: IpAddr,
    pub literal: bool,
}

/// What a re-resolution did to the session.
#[derive(Debug)]
pub struct RetryReport {
    pub previous: IpAddr,
    pub address: IpAddr,
    pub changed: bool,
    /// Set when the lookup failed and the previous address was kept.
    pub error: Option<ResolveError>,
}

pub struct Resolver {
    lookup: Box<dyn Lookup>,
    preference: IpPreference,
    timeout: Duration,
    rng: StdRng,
}

impl Resolver {
    pub fn new(lookup: Box<dyn Lookup>, preference: IpPreference) -> Self {
        Self {
            lookup,
            preference,
            timeout: DEFAULT_RESOLVE_TIMEOUT,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pin the source used to pick among several candidate addresses.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub async fn resolve(&mut self, host: &str) -> Result<Resolved, ResolveError> {
        if let Ok(address) = host.parse::<IpAddr>() {
            return Ok(Resolved {
                address,
                literal: true,
            });
        }

        let candidates = match tokio::time::timeout(self.timeout, self.lookup.lookup(host)).await {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(source)) => {
                return Err(ResolveError::Lookup {
                    host: host.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(ResolveError::TimedOut {
                    host: host.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let matching: Vec<IpAddr> = candidates
            .into_iter()
            .filter(|ip| self.preference.accepts(ip))
            .collect();
        debug!(host, candidates = matching.len(), preference = %self.preference, "resolved");

        let address = *matching
            .choose(&mut self.rng)
            .ok_or_else(|| ResolveError::NoCandidates {
                host: host.to_string(),
                preference: self.preference,
            })?;

        Ok(Resolved {
            address,
            literal: false,
        })
    }

    /// Resolve again after a failure streak. The streak is cleared and the
    /// retry counted whatever the lookup returns. A lookup failure keeps the
    /// previous address once any probe has completed.
    pub async fn retry_resolve(
        &mut self,
        session: &Session,
        stats: &mut RunningStats,
        observed_at: DateTime<Utc>,
    ) -> Result<RetryReport, ResolveError> {
        let previous = stats.current_address().unwrap_or(session.address);
        stats.ongoing_unsuccessful_streak = 0;
        stats.retry_count += 1;

        match self.resolve(&session.hostname).await {
            Ok(resolved) => {
                let changed = stats.record_address(resolved.address, observed_at);
                if changed {
                    info!(host = %session.hostname, %previous, current = %resolved.address, "address changed");
                }
                Ok(RetryReport {
                    previous,
                    address: resolved.address,
                    changed,
                    error: None,
                })
            }
            Err(err) if !err.is_always_fatal() && stats.total_probes() > 0 => {
                warn!(host = %session.hostname, error = %err, "re-resolution failed, keeping {}", previous);
                Ok(RetryReport {
                    previous,
                    address: previous,
                    changed: false,
                    error: Some(err),
                })
            }
            Err(err) => Err(err),
        }
    }
}

/// Whether the tick path should call [`Resolver::retry_resolve`] now.
pub fn retry_due(session: &Session, stats: &RunningStats, threshold: u32) -> bool {
    threshold > 0 && !session.literal && stats.ongoing_unsuccessful_streak >= u64::from(threshold)
}
