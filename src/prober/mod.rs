use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod tcp_connect;

pub use tcp_connect::TcpProber;

/// One connection attempt. Every failure cause collapses into `success == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub success: bool,
    pub rtt: Duration,
    /// Local end of the connection, when one was established.
    pub source: Option<SocketAddr>,
}

impl ProbeResult {
    pub fn success(rtt: Duration, source: Option<SocketAddr>) -> Self {
        Self {
            success: true,
            rtt,
            source,
        }
    }

    pub fn failure(rtt: Duration) -> Self {
        Self {
            success: false,
            rtt,
            source: None,
        }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: SocketAddr, timeout: Duration) -> ProbeResult;
}

/// Where outgoing probes are bound: a local source address or a named interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    Source(IpAddr),
    Device(String),
}

impl Binding {
    /// A numeric value is a source address, anything else an interface name.
    pub fn parse(value: &str) -> Self {
        match value.parse::<IpAddr>() {
            Ok(ip) => Binding::Source(ip),
            Err(_) => Binding::Device(value.to_string()),
        }
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Source(ip) => write!(f, "{ip}"),
            Binding::Device(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_parse_distinguishes_address_and_interface() {
        assert_eq!(
            Binding::parse("10.0.0.5"),
            Binding::Source("10.0.0.5".parse().unwrap())
        );
        assert_eq!(Binding::parse("eth0"), Binding::Device("eth0".to_string()));
    }
}
