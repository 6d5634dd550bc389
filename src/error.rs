use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::resolver::IpPreference;

/// Hostname resolution failures.
///
/// Whether one of these ends the session depends on when it happens: see
/// [`ResolveError::is_always_fatal`] and `Resolver::retry_resolve`.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no {preference} address found for {host}")]
    NoCandidates {
        host: String,
        preference: IpPreference,
    },

    #[error("failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resolving {host} timed out after {timeout:?}")]
    TimedOut { host: String, timeout: Duration },
}

impl ResolveError {
    /// An empty candidate set after filtering cannot be fixed by waiting.
    pub fn is_always_fatal(&self) -> bool {
        matches!(self, ResolveError::NoCandidates { .. })
    }
}

/// Configuration errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing target host")]
    MissingHost,

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("probe timeout {timeout:?} exceeds interval {interval:?} (pass --allow-timeout-overrun to permit)")]
    TimeoutExceedsInterval { timeout: Duration, interval: Duration },

    #[error("binding to interface {0} is only supported on Linux; pass a source address instead")]
    UnsupportedInterface(String),

    #[error("source address {source_addr} cannot reach {target}")]
    SourceFamilyMismatch { source_addr: IpAddr, target: IpAddr },

    #[error("source address {source_addr} conflicts with the {preference} preference")]
    SourcePreferenceConflict {
        source_addr: IpAddr,
        preference: IpPreference,
    },

    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
