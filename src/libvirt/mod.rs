//! Minimal client for the libvirt remote protocol.
//!
//! Only the calls needed to read DHCP leases are implemented:
//! open/close, library version, network lookup and lease listing.

pub mod client;
pub mod protocol;
pub mod xdr;

pub use client::LibvirtClient;
