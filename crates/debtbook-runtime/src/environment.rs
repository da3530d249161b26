#![forbid(unsafe_code)]

//! Development-context detection.
//!
//! The scheduler only uses this to pick how loudly to complain about a
//! caller bug (invalidating a key nobody renders). The probe looks at the
//! host the application was served from: loopback hosts and `file:` pages
//! count as development.

use std::net::IpAddr;

/// Where the application is being served from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInfo {
    /// Host name without port, e.g. `"localhost"` or `"debtbook.example"`.
    pub hostname: String,
    /// Scheme including the trailing colon, e.g. `"https:"` or `"file:"`.
    pub protocol: String,
}

impl HostInfo {
    /// Create host info from a hostname and protocol.
    pub fn new(hostname: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            protocol: protocol.into(),
        }
    }

    /// Host info for a page opened straight from disk.
    #[must_use]
    pub fn file() -> Self {
        Self::new("", "file:")
    }
}

/// Decides whether the process runs in a local/development context.
pub trait DevProbe {
    /// `true` when `host` looks like a development environment.
    fn is_development(&self, host: &HostInfo) -> bool;
}

/// Heuristic probe: loopback addresses, `localhost` and `file:` pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackProbe;

impl DevProbe for LoopbackProbe {
    fn is_development(&self, host: &HostInfo) -> bool {
        is_development_host(&host.hostname, &host.protocol)
    }
}

/// A probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl DevProbe for StaticProbe {
    fn is_development(&self, _: &HostInfo) -> bool {
        self.0
    }
}

/// Loopback/file heuristic shared by [`LoopbackProbe`].
#[must_use]
pub fn is_development_host(hostname: &str, protocol: &str) -> bool {
    if protocol.trim().trim_end_matches(':').eq_ignore_ascii_case("file") {
        return true;
    }
    let host = normalize_hostname(hostname);
    if host.is_empty() {
        return true;
    }
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

fn normalize_hostname(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(raw);
    raw.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_is_development() {
        assert!(is_development_host("localhost", "http:"));
        assert!(is_development_host("LOCALHOST.", "http:"));
        assert!(is_development_host("app.localhost", "https:"));
    }

    #[test]
    fn loopback_addresses_are_development() {
        assert!(is_development_host("127.0.0.1", "http:"));
        assert!(is_development_host("127.4.5.6", "http:"));
        assert!(is_development_host("[::1]", "http:"));
        assert!(is_development_host("::1", "http:"));
        assert!(is_development_host("0.0.0.0", "http:"));
    }

    #[test]
    fn file_protocol_is_development() {
        assert!(is_development_host("", "file:"));
        assert!(is_development_host("anything", "FILE:"));
        assert!(LoopbackProbe.is_development(&HostInfo::file()));
    }

    #[test]
    fn public_hosts_are_production() {
        assert!(!is_development_host("debtbook.example", "https:"));
        assert!(!is_development_host("192.168.1.10", "http:"));
        assert!(!is_development_host("localhost.example.com", "https:"));
    }

    #[test]
    fn static_probe_pins_answer() {
        let host = HostInfo::new("debtbook.example", "https:");
        assert!(StaticProbe(true).is_development(&host));
        assert!(!StaticProbe(false).is_development(&HostInfo::file()));
    }
}
