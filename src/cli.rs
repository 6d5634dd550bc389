use std::net::SocketAddr;

use clap::Parser;

use crate::config::{LogFormat, OutputFormat, ProbeConfig};
use crate::resolver::IpPreference;
use crate::util::parse_host_port;

/// Repeatedly test whether a host accepts TCP connections.
#[derive(Debug, Parser)]
#[command(name = "tcp-probe", version, about)]
pub struct Cli {
    /// Hostname or IP address, optionally as host:port
    pub host: Option<String>,

    /// TCP port to probe
    pub port: Option<u16>,

    /// Stop after this many probes (0 = unlimited)
    #[arg(short = 'c', long)]
    pub count: Option<u64>,

    /// Seconds between probe starts
    #[arg(short = 'i', long, value_name = "SECONDS")]
    pub interval: Option<f64>,

    /// Seconds to wait for each connection attempt
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Stop after this many seconds (0 = unlimited)
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<u64>,

    /// Only use IPv4 addresses
    #[arg(short = '4', long = "ipv4", conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Only use IPv6 addresses
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Re-resolve the hostname after this many consecutive failures
    #[arg(short = 'r', long, value_name = "FAILURES")]
    pub retry_resolve_after: Option<u32>,

    /// Interface name or local source address to send probes from
    #[arg(short = 'I', long)]
    pub interface: Option<String>,

    /// Permit a probe timeout longer than the interval
    #[arg(long)]
    pub allow_timeout_overrun: bool,

    /// Print one JSON object per event
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Indent JSON output
    #[arg(long, requires = "json")]
    pub pretty: bool,

    /// Prefix every probe line with a timestamp
    #[arg(short = 'D', long)]
    pub show_timestamp: bool,

    /// Show the local address each successful probe used
    #[arg(long)]
    pub show_source_address: bool,

    /// Serve Prometheus metrics on this address, e.g. 0.0.0.0:9100
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Also record a latency histogram in the metrics
    #[arg(long)]
    pub latency_history: bool,

    /// JSON config file; flags override its values (falls back to $TARGET_CONFIG)
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_format: Option<CliLogFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliLogFormat {
    Pretty,
    Json,
}

fn seconds_to_ms(field: &'static str, secs: f64) -> anyhow::Result<u64> {
    anyhow::ensure!(
        secs.is_finite() && secs > 0.0,
        "{field} must be a positive number of seconds"
    );
    Ok((secs * 1000.0).round().max(1.0) as u64)
}

impl Cli {
    /// Build the effective configuration: config file first, then flags.
    pub async fn into_config(self) -> anyhow::Result<ProbeConfig> {
        let file = self
            .config
            .clone()
            .or_else(|| std::env::var("TARGET_CONFIG").ok());
        let mut config = match file {
            Some(path) => ProbeConfig::load_file_config(&path).await?,
            None => ProbeConfig::default(),
        };
        self.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply(self, config: &mut ProbeConfig) -> anyhow::Result<()> {
        if let Some(host) = self.host {
            let default_port = self.port.or((config.port != 0).then_some(config.port));
            let (host, port) = parse_host_port(&host, default_port);
            config.host = host;
            if let Some(port) = self.port.or(port) {
                config.port = port;
            }
        } else if let Some(port) = self.port {
            config.port = port;
        }

        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(interval) = self.interval {
            config.probe_interval_ms = seconds_to_ms("interval", interval)?;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_ms = seconds_to_ms("timeout", timeout)?;
        }
        if let Some(duration) = self.duration {
            config.max_duration_secs = duration;
        }
        if self.ipv4 {
            config.ip_version = IpPreference::V4;
        } else if self.ipv6 {
            config.ip_version = IpPreference::V6;
        }
        if let Some(threshold) = self.retry_resolve_after {
            config.retry_resolve_after = threshold;
        }
        if self.interface.is_some() {
            config.interface = self.interface;
        }
        config.allow_timeout_overrun |= self.allow_timeout_overrun;

        if self.json {
            config.output.format = OutputFormat::Json;
        }
        config.output.pretty_json |= self.pretty;
        config.output.show_timestamp |= self.show_timestamp;
        config.output.show_source_address |= self.show_source_address;
        if self.metrics_addr.is_some() {
            config.output.metrics_addr = self.metrics_addr;
        }
        config.output.enable_latency_history |= self.latency_history;

        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        match self.log_format {
            Some(CliLogFormat::Json) => config.log_format = LogFormat::Json,
            Some(CliLogFormat::Pretty) => config.log_format = LogFormat::Pretty,
            None => {}
        }
        Ok(())
    }
}
