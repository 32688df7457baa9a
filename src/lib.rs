//! lease-hosts - Mirror libvirt DHCP leases into a hosts file.
//!
//! This crate polls a libvirt virtual network for its DHCP leases and
//! rewrites a hosts file with one `<address> <hostname>.<domain>` line per
//! named guest, so a local resolver (dnsmasq `addn-hosts`, CoreDNS `hosts`,
//! ...) can answer for VM names without talking to the hypervisor.
//!
//! ## Features
//!
//! - Native libvirt remote protocol client over the unix socket
//! - Atomic hosts file replacement on every cycle
//! - Query and write failures are contained to a single cycle
//! - Graceful shutdown on SIGINT/SIGTERM
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         lease-hosts                          │
//! │                                                              │
//! │  ┌──────────────────┐  leases   ┌──────────────────┐         │
//! │  │  LibvirtClient   │──────────▶│   LeaseWatcher   │         │
//! │  │  (remote proto)  │           │   (poll loop)    │         │
//! │  └────────▲─────────┘           └────────┬─────────┘         │
//! │           │                              │ render + rename   │
//! │           │ unix socket                  ▼                   │
//! │   libvirtd / virtnetworkd         hosts file ──▶ resolver    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use lease_hosts::{Config, LeaseWatcher, LibvirtClient};
//! use tripwire::Tripwire;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load("lease-hosts.yaml".as_ref()).unwrap();
//!     let client = LibvirtClient::new(&config.socket)
//!         .with_uri(config.uri.clone())
//!         .with_call_timeout(config.call_timeout());
//!
//!     let (tripwire, worker) = Tripwire::new_signals();
//!     tokio::spawn(worker);
//!
//!     LeaseWatcher::new(&config, client).run(tripwire).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hosts;
pub mod hypervisor;
pub mod libvirt;
pub mod metrics;
pub mod telemetry;
pub mod watcher;

// Re-export main types
pub use config::{Config, LogFormat, TelemetryConfig};
pub use error::{HostsError, RpcError};
pub use hosts::LineFormat;
pub use hypervisor::{Hypervisor, Lease, NetworkHandle};
pub use libvirt::LibvirtClient;
pub use watcher::{CycleOutcome, LeaseWatcher};
