//! Hosts file rendering and publication.
//!
//! Each lease with a hostname becomes one line:
//!
//! ```text
//! address-first:  192.168.122.10<TAB>web.vm.lan
//! name-first:     web.vm.lan<TAB>192.168.122.10
//! ```
//!
//! The file is replaced atomically on every cycle.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::HostsError;
use crate::hypervisor::Lease;

/// Field order of a hosts file line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineFormat {
    /// `<address>\t<fqdn>`, the `/etc/hosts` layout.
    #[default]
    AddressFirst,
    /// `<fqdn>\t<address>`
    NameFirst,
}

/// Join a hostname with the domain suffix.
///
/// Dots around `domain` are ignored; an empty domain yields the bare hostname.
pub fn qualify(hostname: &str, domain: &str) -> String {
    let domain = domain.trim_matches('.');
    if domain.is_empty() {
        hostname.to_string()
    } else {
        format!("{}.{}", hostname, domain)
    }
}

/// Render the full hosts file body for `leases`.
///
/// Leases without a usable hostname are skipped. Order follows the input.
pub fn render(leases: &[Lease], domain: &str, format: LineFormat) -> String {
    let mut body = String::new();
    for lease in leases {
        let Some(hostname) = lease.primary_hostname() else {
            if !lease.hostnames.is_empty() {
                warn!(
                    address = %lease.ip_address,
                    hostnames = ?lease.hostnames,
                    "skipping lease with unusable hostname"
                );
            }
            continue;
        };
        let name = qualify(hostname, domain);
        // Writing to a String cannot fail.
        let _ = match format {
            LineFormat::AddressFirst => writeln!(body, "{}\t{}", lease.ip_address, name),
            LineFormat::NameFirst => writeln!(body, "{}\t{}", name, lease.ip_address),
        };
    }
    body
}

/// Path of the scratch file used while publishing `target`.
pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Replace `target` with `content` atomically.
///
/// Writes a sibling temporary file, syncs it, sets mode 0644 and renames it
/// over the target. Readers see either the old or the new file.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<(), HostsError> {
    let write_err = |source: std::io::Error| HostsError::Write {
        path: target.to_path_buf(),
        source,
    };
    let temp = temp_path(target);

    let result = (|| {
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(content)?;
        file.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o644))?;
        }

        std::fs::rename(&temp, target)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result.map_err(write_err)
}

/// Publish `body` to `target` from the blocking pool.
pub async fn publish(target: &Path, body: String) -> Result<(), HostsError> {
    let path = target.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, body.as_bytes()))
        .await
        .map_err(|e| HostsError::Write {
            path: target.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })?
}
