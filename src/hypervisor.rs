//! The narrow hypervisor surface the watch loop depends on.

use async_trait::async_trait;

use crate::error::HostsError;

/// A virtual network resolved by name.
///
/// Obtained once at startup and passed by reference to every lease query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    /// Network name.
    pub name: String,
    /// Network UUID.
    pub uuid: [u8; 16],
}

/// One active DHCP lease at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Bridge interface the lease was handed out on.
    pub interface: String,
    /// Leased address.
    pub ip_address: String,
    /// Prefix length of the leased address.
    pub prefix: u32,
    /// Client MAC address, if known.
    pub mac: Option<String>,
    /// Expiry as seconds since the epoch.
    pub expiry_time: i64,
    /// Client-reported hostnames, possibly empty.
    pub hostnames: Vec<String>,
}

impl Lease {
    /// Create a lease with just an address and hostnames.
    pub fn new(ip_address: impl Into<String>, hostnames: Vec<String>) -> Self {
        Self {
            interface: String::new(),
            ip_address: ip_address.into(),
            prefix: 0,
            mac: None,
            expiry_time: 0,
            hostnames,
        }
    }

    /// The name published for this lease: the first usable hostname.
    pub fn primary_hostname(&self) -> Option<&str> {
        self.hostnames
            .iter()
            .map(String::as_str)
            .find(|h| is_usable_hostname(h))
    }
}

/// Whether a guest-reported hostname can be written as a single hosts field.
///
/// Whitespace and control characters would split or break the line, and `#`
/// would start a comment.
pub fn is_usable_hostname(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '#')
}

/// Session with a virtualization management daemon.
///
/// The session is owned by a single caller and used sequentially.
#[async_trait]
pub trait Hypervisor: Send {
    /// Open the session.
    async fn connect(&mut self) -> Result<(), HostsError>;

    /// Remote daemon version, for diagnostics.
    async fn version(&mut self) -> Result<String, HostsError>;

    /// Resolve a virtual network by name.
    async fn lookup_network(&mut self, name: &str) -> Result<NetworkHandle, HostsError>;

    /// All current DHCP leases of `network`, unfiltered.
    async fn dhcp_leases(&mut self, network: &NetworkHandle) -> Result<Vec<Lease>, HostsError>;

    /// Release the session.
    async fn disconnect(&mut self) -> Result<(), HostsError>;
}
