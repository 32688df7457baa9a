//! lease-hosts binary entry point.

use clap::Parser;
use lease_hosts::{telemetry, Config, LeaseWatcher, LibvirtClient};
use std::path::PathBuf;
use tracing::{error, info};
use tripwire::Tripwire;

/// Mirror libvirt DHCP leases into a hosts file.
#[derive(Parser, Debug)]
#[command(name = "lease-hosts")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML).
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let _telemetry = telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        socket = %config.socket.display(),
        network = %config.network,
        hostfile = %config.hostfile.display(),
        "Starting lease-hosts"
    );

    // Setup graceful shutdown
    let (tripwire, tripwire_worker) = Tripwire::new_signals();
    tokio::spawn(tripwire_worker);

    let client = LibvirtClient::new(&config.socket)
        .with_uri(config.uri.clone())
        .with_call_timeout(config.call_timeout());

    if let Err(e) = LeaseWatcher::new(&config, client).run(tripwire).await {
        error!("error: {}", e);
        return Err(e.into());
    }

    info!("lease-hosts shutdown complete");
    Ok(())
}
