use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resolver::Resolved;

/// The probed destination, fixed for the lifetime of the process.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Session {
    pub hostname: String,
    pub address: IpAddr,
    pub port: u16,
    /// The target was given as a numeric address; it is never re-resolved.
    pub literal: bool,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(hostname: impl Into<String>, resolved: Resolved, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            address: resolved.address,
            port,
            literal: resolved.literal,
            started_at: Utc::now(),
        }
    }

    /// Describe the session as it is currently probed.
    pub fn target(&self, current: IpAddr) -> Target {
        Target {
            hostname: self.hostname.clone(),
            address: current,
            port: self.port,
            literal: self.literal,
        }
    }
}

/// Read-only description of the destination handed to sinks.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Target {
    pub hostname: String,
    pub address: IpAddr,
    pub port: u16,
    pub literal: bool,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.literal {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.hostname, self.address)
        }
    }
}
