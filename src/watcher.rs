//! The lease watch loop.
//!
//! ```text
//! Initializing ──connect──▶ Connected ──version, lookup──▶ Watching
//!                                                            │  ▲
//!                                            interval elapsed│  │ publish / log failure
//!                                                            ▼  │
//!                                                          poll cycle
//!                                                            │
//!                                                  shutdown  ▼
//!                                   ShuttingDown ──disconnect──▶ Terminated
//! ```
//!
//! Failures before `Watching` are returned to the caller. Failures inside a
//! cycle are logged and the loop keeps going.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::HostsError;
use crate::hosts::{self, LineFormat};
use crate::hypervisor::{Hypervisor, NetworkHandle};
use crate::metrics::{self, PollResult, Timer};

/// Result of a single poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The hosts file was rewritten.
    Published {
        /// Leases returned by the hypervisor.
        leases: usize,
        /// Lines written (leases with a hostname).
        lines: usize,
    },
    /// Leases could not be fetched; the hosts file was left as is.
    QueryFailed,
    /// Leases were fetched but the hosts file could not be written.
    WriteFailed,
}

impl CycleOutcome {
    fn poll_result(&self) -> PollResult {
        match self {
            CycleOutcome::Published { .. } => PollResult::Published,
            CycleOutcome::QueryFailed => PollResult::QueryFailed,
            CycleOutcome::WriteFailed => PollResult::WriteFailed,
        }
    }
}

/// Mirrors the DHCP leases of one network into a hosts file.
pub struct LeaseWatcher<H> {
    hypervisor: H,
    network: String,
    interval: Duration,
    hostfile: PathBuf,
    domain: String,
    format: LineFormat,
}

impl<H: Hypervisor> LeaseWatcher<H> {
    /// Create a watcher over `hypervisor` using the settings in `config`.
    pub fn new(config: &Config, hypervisor: H) -> Self {
        Self {
            hypervisor,
            network: config.network.clone(),
            interval: config.interval(),
            hostfile: config.hostfile.clone(),
            domain: config.domain.clone(),
            format: config.format,
        }
    }

    /// Connect, resolve the network and watch it until `shutdown` resolves.
    ///
    /// Once `connect` succeeds the session is released exactly once before
    /// returning, whether the loop ended on shutdown or on a startup error.
    pub async fn run<S>(mut self, shutdown: S) -> Result<(), HostsError>
    where
        S: Future<Output = ()>,
    {
        self.hypervisor.connect().await?;

        let result = self.watch(shutdown).await;

        info!("shutting down daemon");
        if let Err(e) = self.hypervisor.disconnect().await {
            warn!(error = %e, "failed to disconnect");
        }

        result
    }

    async fn watch<S>(&mut self, shutdown: S) -> Result<(), HostsError>
    where
        S: Future<Output = ()>,
    {
        let version = self.hypervisor.version().await?;
        info!(%version, "connected to libvirt");

        let network = self.hypervisor.lookup_network(&self.network).await?;
        info!(network = %network.name, "found network");

        info!(
            interval_ms = self.interval.as_millis() as u64,
            hostfile = %self.hostfile.display(),
            domain = %self.domain,
            "watching leases"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("shutdown requested");
                    return Ok(());
                }

                _ = tokio::time::sleep(self.interval) => {}
            }

            self.poll_once(&network).await;
        }
    }

    /// Run one cycle: fetch leases, render them and publish the hosts file.
    ///
    /// Never fails; errors are logged and reported through the outcome.
    pub async fn poll_once(&mut self, network: &NetworkHandle) -> CycleOutcome {
        let timer = Timer::start();

        let outcome = match self.hypervisor.dhcp_leases(network).await {
            Err(e) => {
                error!(network = %network.name, error = %e, "failed to get leases");
                CycleOutcome::QueryFailed
            }
            Ok(leases) => {
                let body = hosts::render(&leases, &self.domain, self.format);
                let lines = body.lines().count();

                match hosts::publish(&self.hostfile, body).await {
                    Ok(()) => {
                        debug!(
                            leases = leases.len(),
                            lines,
                            hostfile = %self.hostfile.display(),
                            "published hosts file"
                        );
                        metrics::record_published(leases.len(), lines);
                        CycleOutcome::Published {
                            leases: leases.len(),
                            lines,
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "failed to write hostfile");
                        CycleOutcome::WriteFailed
                    }
                }
            }
        };

        metrics::record_poll(outcome.poll_result(), timer.elapsed());
        outcome
    }
}
