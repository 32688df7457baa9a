//! libvirt remote protocol client over the local unix socket.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{
    self, ConnectOpenArgs, Header, LibVersion, MessageStatus, MessageType,
    NetworkGetDhcpLeasesArgs, NetworkGetDhcpLeasesRet, NetworkLookupByNameArgs, Packet,
    Procedure, RemoteError, RemoteNetwork, ERR_NO_NETWORK,
};
use super::xdr::Xdr;
use crate::error::{HostsError, RpcError};
use crate::hypervisor::{Hypervisor, Lease, NetworkHandle};
use crate::metrics::{self, ReconnectReason};

/// Timeout for dialing the daemon socket.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for a single remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the libvirt daemon's remote protocol.
///
/// A transport failure drops the socket; the next lease query dials again.
pub struct LibvirtClient {
    socket: PathBuf,
    uri: Option<String>,
    call_timeout: Duration,
    stream: Option<UnixStream>,
    serial: u32,
}

impl LibvirtClient {
    /// Create a client for the daemon listening on `socket`.
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            uri: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            stream: None,
            serial: 0,
        }
    }

    /// Connection URI sent on open (e.g. `qemu:///system`).
    pub fn with_uri(mut self, uri: Option<String>) -> Self {
        self.uri = uri;
        self
    }

    /// Bound every remote call by `call_timeout`.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Whether a session is currently open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn open(&mut self) -> Result<(), RpcError> {
        let stream = timeout(DIAL_TIMEOUT, UnixStream::connect(&self.socket))
            .await
            .map_err(|_| RpcError::Timeout(DIAL_TIMEOUT))??;
        self.stream = Some(stream);
        debug!(socket = %self.socket.display(), "socket connected");

        let args = ConnectOpenArgs {
            name: self.uri.clone(),
            flags: 0,
        };
        if let Err(e) = self.call::<_, ()>(Procedure::ConnectOpen, &args).await {
            self.stream = None;
            return Err(e);
        }
        Ok(())
    }

    async fn call<A, R>(&mut self, procedure: Procedure, args: &A) -> Result<R, RpcError>
    where
        A: Xdr + Sync,
        R: Xdr,
    {
        let call_timeout = self.call_timeout;
        let result = match timeout(call_timeout, self.exchange(procedure, args)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(call_timeout)),
        };

        if let Err(ref e) = result {
            if e.breaks_session() && self.stream.take().is_some() {
                warn!(procedure = ?procedure, error = %e, "dropping libvirt session");
            }
        }
        result
    }

    async fn exchange<A, R>(&mut self, procedure: Procedure, args: &A) -> Result<R, RpcError>
    where
        A: Xdr + Sync,
        R: Xdr,
    {
        self.serial = self.serial.wrapping_add(1);
        let serial = self.serial;
        let stream = self.stream.as_mut().ok_or(RpcError::NotConnected)?;

        let request = Packet::new(Header::call(procedure, serial), args);
        protocol::write_packet(stream, &request).await?;

        loop {
            let reply = protocol::read_packet(stream).await?;
            let header = &reply.header;

            if header.kind != MessageType::Reply || header.serial != serial {
                debug!(
                    procedure = header.procedure,
                    serial = header.serial,
                    kind = ?header.kind,
                    "skipping unrelated packet"
                );
                continue;
            }
            if header.procedure != procedure as u32 {
                return Err(RpcError::Malformed(format!(
                    "reply for procedure {} to call {:?}",
                    header.procedure, procedure
                )));
            }

            return match header.status {
                MessageStatus::Ok => reply.payload(),
                MessageStatus::Error => Err(reply.payload::<RemoteError>()?.into()),
                MessageStatus::Continue => Err(RpcError::Malformed(
                    "unexpected stream continuation".to_string(),
                )),
            };
        }
    }
}

impl From<RemoteNetwork> for NetworkHandle {
    fn from(net: RemoteNetwork) -> Self {
        Self {
            name: net.name,
            uuid: net.uuid,
        }
    }
}

impl From<&NetworkHandle> for RemoteNetwork {
    fn from(handle: &NetworkHandle) -> Self {
        Self {
            name: handle.name.clone(),
            uuid: handle.uuid,
        }
    }
}

impl From<protocol::DhcpLease> for Lease {
    fn from(lease: protocol::DhcpLease) -> Self {
        Self {
            interface: lease.iface,
            ip_address: lease.ipaddr,
            prefix: lease.prefix,
            mac: lease.mac,
            expiry_time: lease.expiry_time,
            hostnames: lease.hostname.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Hypervisor for LibvirtClient {
    async fn connect(&mut self) -> Result<(), HostsError> {
        self.open().await.map_err(HostsError::Connect)?;
        info!(socket = %self.socket.display(), uri = ?self.uri, "connected to libvirt daemon");
        Ok(())
    }

    async fn version(&mut self) -> Result<String, HostsError> {
        let version: LibVersion = self
            .call(Procedure::ConnectGetLibVersion, &())
            .await
            .map_err(HostsError::Query)?;
        Ok(version.to_dotted())
    }

    async fn lookup_network(&mut self, name: &str) -> Result<NetworkHandle, HostsError> {
        let args = NetworkLookupByNameArgs {
            name: name.to_string(),
        };
        match self
            .call::<_, RemoteNetwork>(Procedure::NetworkLookupByName, &args)
            .await
        {
            Ok(net) => Ok(net.into()),
            Err(e) if e.remote_code() == Some(ERR_NO_NETWORK) => {
                Err(HostsError::NetworkNotFound(name.to_string()))
            }
            Err(e) => Err(HostsError::Lookup(e)),
        }
    }

    async fn dhcp_leases(&mut self, network: &NetworkHandle) -> Result<Vec<Lease>, HostsError> {
        if self.stream.is_none() {
            info!(socket = %self.socket.display(), "reconnecting to libvirt daemon");
            metrics::record_reconnect(ReconnectReason::SessionLost);
            self.open().await.map_err(HostsError::Query)?;
        }

        let args = NetworkGetDhcpLeasesArgs {
            net: network.into(),
            mac: None,
            need_results: 1,
            flags: 0,
        };
        let ret: NetworkGetDhcpLeasesRet = self
            .call(Procedure::NetworkGetDhcpLeases, &args)
            .await
            .map_err(HostsError::Query)?;

        debug!(network = %network.name, count = ret.ret, "received leases");
        Ok(ret.leases.into_iter().map(Lease::from).collect())
    }

    async fn disconnect(&mut self) -> Result<(), HostsError> {
        if self.stream.is_none() {
            return Ok(());
        }
        let result = self.call::<_, ()>(Procedure::ConnectClose, &()).await;
        self.stream = None;
        result.map_err(HostsError::Disconnect)
    }
}
