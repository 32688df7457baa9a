//! Configuration types for lease-hosts.
//!
//! The configuration file is YAML:
//!
//! ```yaml
//! socket: /var/run/libvirt/libvirt-sock
//! network: default
//! interval: 5000          # milliseconds
//! hostfile: /run/lease-hosts/hosts
//! domain: vm.lan
//! format: address-first   # or name-first
//! ```
//!
//! Any key can be overridden from the environment with the `LEASE_HOSTS`
//! prefix and `__` as separator, e.g. `LEASE_HOSTS__INTERVAL=1000`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HostsError;
use crate::hosts::LineFormat;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "LEASE_HOSTS";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the libvirt daemon's unix socket.
    #[serde(default = "default_socket")]
    pub socket: PathBuf,

    /// Connection URI sent when opening the session (e.g. "qemu:///system").
    /// The daemon picks its default when unset.
    #[serde(default)]
    pub uri: Option<String>,

    /// Name of the virtual network to watch.
    #[serde(default = "default_network")]
    pub network: String,

    /// Poll interval in milliseconds.
    pub interval: u64,

    /// Output hosts file.
    pub hostfile: PathBuf,

    /// Domain appended to every hostname (e.g. "vm.lan").
    /// Hostnames are written bare when empty.
    #[serde(default)]
    pub domain: String,

    /// Field order of each hosts file line.
    #[serde(default)]
    pub format: LineFormat,

    /// Timeout for a single libvirt call in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "lease_hosts=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log line format.
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
    /// Human readable lines.
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

fn default_socket() -> PathBuf {
    PathBuf::from("/var/run/libvirt/libvirt-sock")
}

fn default_network() -> String {
    "default".to_string()
}

fn default_timeout() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "lease-hosts".to_string()
}

fn env_overrides() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load from a YAML file with environment overrides, then validate.
    pub fn load(path: &Path) -> Result<Self, HostsError> {
        Self::load_with(path, env_overrides())
    }

    fn load_with(path: &Path, env: config::Environment) -> Result<Self, HostsError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse YAML text without environment overrides, then validate.
    pub fn from_yaml(text: &str) -> Result<Self, HostsError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), HostsError> {
        if self.interval == 0 {
            return Err(HostsError::Config(
                "interval must be a positive number of milliseconds".to_string(),
            ));
        }
        if self.timeout == 0 {
            return Err(HostsError::Config(
                "timeout must be a positive number of milliseconds".to_string(),
            ));
        }
        if self.socket.as_os_str().is_empty() {
            return Err(HostsError::Config("socket must not be empty".to_string()));
        }
        if self.network.trim().is_empty() {
            return Err(HostsError::Config("network must not be empty".to_string()));
        }
        if self.hostfile.file_name().is_none() {
            return Err(HostsError::Config(format!(
                "hostfile must name a file, got {:?}",
                self.hostfile
            )));
        }
        if self.domain.chars().any(char::is_whitespace) {
            return Err(HostsError::Config(format!(
                "domain must not contain whitespace, got {:?}",
                self.domain
            )));
        }
        Ok(())
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    /// Per-call timeout for libvirt requests.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}
