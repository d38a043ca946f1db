//! Configuration types for weighted-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::DnsError;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS listener configuration.
    pub dns: DnsConfig,

    /// Upstream forwarding configuration.
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Administrative HTTP interface configuration.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Static routing entries installed at startup.
    #[serde(default)]
    pub routes: Vec<StaticRoute>,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), DnsError> {
        if self.dns.udp_addr.is_none() && self.dns.tcp_addr.is_none() {
            return Err(DnsError::Config(
                "at least one of dns.udp_addr or dns.tcp_addr must be set".to_string(),
            ));
        }

        for route in &self.routes {
            if route.domain.is_empty() || route.candidate.is_empty() {
                return Err(DnsError::Config(format!(
                    "static route {:?} -> {:?} has an empty field",
                    route.domain, route.candidate
                )));
            }
            if route.weight == 0 {
                return Err(DnsError::Config(format!(
                    "static route {} -> {} has zero weight",
                    route.domain, route.candidate
                )));
            }
        }

        for rule in &self.forward.suffixes {
            if rule.suffix.is_empty() {
                return Err(DnsError::Config(format!(
                    "forward suffix rule for {} has an empty suffix",
                    rule.addr
                )));
            }
        }

        Ok(())
    }
}

/// DNS listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// UDP listen address. No UDP listener when unset.
    #[serde(default)]
    pub udp_addr: Option<SocketAddr>,

    /// TCP listen address. No TCP listener when unset.
    #[serde(default)]
    pub tcp_addr: Option<SocketAddr>,

    /// TTL for synthesized records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Idle timeout for TCP connections in seconds.
    #[serde(default = "default_tcp_timeout_secs")]
    pub tcp_timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            udp_addr: None,
            tcp_addr: None,
            ttl: default_ttl(),
            tcp_timeout_secs: default_tcp_timeout_secs(),
        }
    }
}

/// Upstream forwarding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    /// Upstream used when no suffix rule applies.
    #[serde(default)]
    pub default_addr: Option<SocketAddr>,

    /// Time to wait for an upstream reply, in milliseconds.
    #[serde(default = "default_forward_timeout_ms")]
    pub timeout_ms: u64,

    /// Suffix rules, checked in order.
    #[serde(default)]
    pub suffixes: Vec<ForwardSuffixRule>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            default_addr: None,
            timeout_ms: default_forward_timeout_ms(),
            suffixes: Vec::new(),
        }
    }
}

/// Routes questions ending in `suffix` to `addr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardSuffixRule {
    /// Name suffix, e.g. "internal." or "corp.example.com.".
    pub suffix: String,

    /// Upstream DNS server for matching names.
    pub addr: SocketAddr,
}

/// Administrative HTTP interface configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Listen address. The interface is disabled when unset.
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,

    /// JSON snapshot loaded into the table at startup, if the file exists.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

/// A routing entry declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Domain to answer for.
    pub domain: String,

    /// Address or domain name to resolve to.
    pub candidate: String,

    /// Relative selection weight.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "weighted_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "weighted-dns".to_string()
}

fn default_ttl() -> u32 {
    3600
}

fn default_tcp_timeout_secs() -> u64 {
    30
}

fn default_forward_timeout_ms() -> u64 {
    2000
}

fn default_weight() -> u32 {
    1
}
