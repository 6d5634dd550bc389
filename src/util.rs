// Small helpers shared by config parsing and the serializable stats types.

use std::net::IpAddr;
use std::time::Duration;

use serde::Serializer;

/// Split `host:port`, `[v6]:port` or a bare host. A bare IPv6 literal keeps
/// all of its colons and falls back to `default_port`.
pub fn parse_host_port(s: &str, default_port: Option<u16>) -> (String, Option<u16>) {
    if let Some(rest) = s.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .or(default_port);
            return (host.to_string(), port);
        }
    }

    if s.parse::<IpAddr>().is_ok() {
        return (s.to_string(), default_port);
    }

    if let Some(idx) = s.rfind(':') {
        if let Ok(port) = s[idx + 1..].parse::<u16>() {
            return (s[..idx].to_string(), Some(port));
        }
    }
    (s.to_string(), default_port)
}

pub fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Serialize a `Duration` as fractional milliseconds.
pub fn serialize_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(millis(*d))
}

/// Human-readable duration used by the text renderer, e.g. `1 hour 2 minutes 3 seconds`.
pub fn humanize(d: Duration) -> String {
    let total = d.as_secs();
    if total == 0 {
        return format!("{:.3} seconds", d.as_secs_f64());
    }

    let parts = [
        (total / 86_400, "day"),
        ((total % 86_400) / 3_600, "hour"),
        ((total % 3_600) / 60, "minute"),
        (total % 60, "second"),
    ];

    parts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| {
            if *n == 1 {
                format!("{n} {unit}")
            } else {
                format!("{n} {unit}s")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_port_splits_hostname() {
        assert_eq!(
            parse_host_port("example.com:443", None),
            ("example.com".to_string(), Some(443))
        );
    }

    #[test]
    fn parse_host_port_keeps_default_without_port() {
        assert_eq!(
            parse_host_port("example.com", Some(80)),
            ("example.com".to_string(), Some(80))
        );
    }

    #[test]
    fn parse_host_port_handles_bare_ipv6() {
        assert_eq!(
            parse_host_port("2001:db8::1", Some(22)),
            ("2001:db8::1".to_string(), Some(22))
        );
    }

    #[test]
    fn parse_host_port_handles_bracketed_ipv6() {
        assert_eq!(
            parse_host_port("[2001:db8::1]:8443", None),
            ("2001:db8::1".to_string(), Some(8443))
        );
    }

    #[test]
    fn humanize_formats_compound_durations() {
        assert_eq!(humanize(Duration::from_secs(3_723)), "1 hour 2 minutes 3 seconds");
        assert_eq!(humanize(Duration::from_secs(3)), "3 seconds");
        assert_eq!(humanize(Duration::from_millis(250)), "0.250 seconds");
    }
}
