use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::error::ConfigError;
use crate::monitor::MonitorSettings;
use crate::prober::Binding;
use crate::resolver::IpPreference;

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub show_timestamp: bool,
    #[serde(default)]
    pub show_source_address: bool,
    /// Serve Prometheus metrics on this address when set.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
    #[serde(default)]
    pub enable_latency_history: bool,
    #[serde(default)]
    pub pretty_json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProbeConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    /// Stop after this many probes; 0 = unlimited.
    #[serde(default)]
    pub count: u64,
    /// Stop after this many seconds; 0 = unlimited.
    #[serde(default)]
    pub max_duration_secs: u64,
    #[serde(default)]
    pub ip_version: IpPreference,
    /// Re-resolve the host after this many consecutive failures; 0 = never.
    #[serde(default)]
    pub retry_resolve_after: u32,
    /// Interface name or local source address to bind probes to.
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub allow_timeout_overrun: bool,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_resolve_timeout_ms() -> u64 {
    2000
}

// Probe results go to stdout; only problems are logged by default.
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            probe_interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            count: 0,
            max_duration_secs: 0,
            ip_version: IpPreference::Any,
            retry_resolve_after: 0,
            interface: None,
            allow_timeout_overrun: false,
            output: OutputConfig::default(),
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ProbeConfig {
    /// Get the log level as a tracing::Level
    pub fn get_tracing_level(&self) -> Result<tracing::Level, ConfigError> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(tracing::Level::TRACE),
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" | "warning" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            _ => Err(ConfigError::InvalidValue {
                field: "log_level",
                reason: format!("{}; valid levels are trace, debug, info, warn, error", self.log_level),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn binding(&self) -> Option<Binding> {
        self.interface.as_deref().map(Binding::parse)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: self.interval(),
            timeout: self.timeout(),
            count: self.count,
            max_duration: (self.max_duration_secs > 0)
                .then(|| Duration::from_secs(self.max_duration_secs)),
            retry_resolve_after: self.retry_resolve_after,
        }
    }

    /// Address family the resolver may pick. A bound source address pins it
    /// to the source's family, so re-resolution cannot move the target to an
    /// address the source cannot reach.
    pub fn resolver_preference(&self) -> Result<IpPreference, ConfigError> {
        let Some(Binding::Source(source)) = self.binding() else {
            return Ok(self.ip_version);
        };
        let family = if source.is_ipv4() {
            IpPreference::V4
        } else {
            IpPreference::V6
        };
        match self.ip_version {
            IpPreference::Any => Ok(family),
            preference if preference == family => Ok(family),
            preference => Err(ConfigError::SourcePreferenceConflict {
                source_addr: source,
                preference,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }
        if self.probe_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "probe_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.resolve_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolve_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.timeout() > self.interval() && !self.allow_timeout_overrun {
            return Err(ConfigError::TimeoutExceedsInterval {
                timeout: self.timeout(),
                interval: self.interval(),
            });
        }
        if let Some(Binding::Device(name)) = self.binding() {
            if !cfg!(any(target_os = "linux", target_os = "android")) {
                return Err(ConfigError::UnsupportedInterface(name));
            }
        }
        self.resolver_preference()?;
        self.get_tracing_level().map(|_| ())
    }

    pub async fn load_file_config(file_path: &str) -> Result<ProbeConfig, ConfigError> {
        if !Path::new(file_path).exists() {
            return Err(ConfigError::ReadFile {
                path: file_path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            });
        }

        let content = fs::read_to_string(file_path)
            .await
            .map_err(|source| ConfigError::ReadFile {
                path: file_path.to_string(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: file_path.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProbeConfig {
        ProbeConfig {
            host: "example.com".to_string(),
            port: 443,
            ..ProbeConfig::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config: ProbeConfig = serde_json::from_str(r#"{"host": "example.com", "port": 22}"#).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert_eq!(config.resolve_timeout(), Duration::from_secs(2));
        assert_eq!(config.ip_version, IpPreference::Any);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.count, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_fields_deserialize() {
        let config: ProbeConfig = serde_json::from_str(
            r#"{
                "host": "db.internal",
                "port": 5432,
                "probe_interval_ms": 500,
                "timeout_ms": 250,
                "ip_version": "v6",
                "retry_resolve_after": 3,
                "interface": "10.0.0.5",
                "output": {"format": "json", "show_timestamp": true},
                "log_level": "debug"
            }"#,
        )
        .unwrap();
        assert_eq!(config.ip_version, IpPreference::V6);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.show_timestamp);
        assert_eq!(config.binding(), Some(Binding::Source("10.0.0.5".parse().unwrap())));
        assert_eq!(config.get_tracing_level().unwrap(), tracing::Level::DEBUG);
        assert_eq!(config.monitor_settings().retry_resolve_after, 3);
    }

    #[test]
    fn missing_host_is_rejected() {
        let config = ProbeConfig {
            port: 80,
            ..ProbeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingHost)));
    }

    #[test]
    fn timeout_longer_than_interval_needs_override() {
        let mut config = valid();
        config.timeout_ms = 5000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeoutExceedsInterval { .. })
        ));

        config.allow_timeout_overrun = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut config = valid();
        config.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "log_level", .. })
        ));
    }

    #[test]
    fn bound_source_pins_resolver_family() {
        let mut config = valid();
        assert_eq!(config.resolver_preference().unwrap(), IpPreference::Any);

        config.interface = Some("192.0.2.10".to_string());
        assert_eq!(config.resolver_preference().unwrap(), IpPreference::V4);

        config.interface = Some("2001:db8::10".to_string());
        assert_eq!(config.resolver_preference().unwrap(), IpPreference::V6);
    }

    #[test]
    fn source_family_conflicting_with_preference_is_rejected() {
        let mut config = valid();
        config.interface = Some("192.0.2.10".to_string());
        config.ip_version = IpPreference::V6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SourcePreferenceConflict { .. })
        ));

        config.ip_version = IpPreference::V4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duration_limit_maps_to_settings() {
        let mut config = valid();
        assert_eq!(config.monitor_settings().max_duration, None);
        config.max_duration_secs = 30;
        assert_eq!(config.monitor_settings().max_duration, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn missing_config_file_is_a_read_error() {
        let err = ProbeConfig::load_file_config("/nonexistent/tcp-probe.json")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
