//! Shared test infrastructure for lease-hosts integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use lease_hosts::error::{HostsError, RpcError};
use lease_hosts::{Config, Hypervisor, Lease, NetworkHandle};

// --- Constants ---

pub const NETWORK: &str = "default";
pub const DOMAIN: &str = "lan";
pub const INTERVAL_MS: u64 = 1000;

// --- Lease helpers ---

pub fn lease(ip: &str, hostnames: &[&str]) -> Lease {
    Lease::new(ip, hostnames.iter().map(|h| h.to_string()).collect())
}

// --- MockHypervisor ---

/// Scripted answer for one `dhcp_leases` call.
pub enum LeaseReply {
    Leases(Vec<Lease>),
    Fail,
}

#[derive(Default)]
pub struct MockState {
    pub connect_calls: usize,
    pub disconnect_calls: usize,
    pub lookup_calls: usize,
    pub lease_calls: Vec<Instant>,
    pub replies: VecDeque<LeaseReply>,
    pub fallback: Vec<Lease>,
    pub fail_connect: bool,
    pub fail_disconnect: bool,
    pub networks: Vec<String>,
}

/// In-memory hypervisor whose lease answers are scripted per call.
///
/// Cloning shares the recorded calls, so a test can keep a handle after the
/// mock has been moved into the watcher.
#[derive(Clone)]
pub struct MockHypervisor {
    state: Arc<Mutex<MockState>>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        let state = MockState {
            networks: vec![NETWORK.to_string()],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Queue the answer for the next unanswered lease query.
    pub fn push(&self, reply: LeaseReply) -> &Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    /// Answer used once the scripted replies run out.
    pub fn set_fallback(&self, leases: Vec<Lease>) {
        self.state.lock().unwrap().fallback = leases;
    }

    pub fn fail_connect(&self) {
        self.state.lock().unwrap().fail_connect = true;
    }

    pub fn fail_disconnect(&self) {
        self.state.lock().unwrap().fail_disconnect = true;
    }

    pub fn without_networks(&self) {
        self.state.lock().unwrap().networks.clear();
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().unwrap().disconnect_calls
    }

    pub fn lookup_calls(&self) -> usize {
        self.state.lock().unwrap().lookup_calls
    }

    pub fn lease_calls(&self) -> Vec<Instant> {
        self.state.lock().unwrap().lease_calls.clone()
    }
}

#[async_trait]
impl Hypervisor for MockHypervisor {
    async fn connect(&mut self) -> Result<(), HostsError> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.fail_connect {
            return Err(HostsError::Connect(RpcError::Closed));
        }
        Ok(())
    }

    async fn version(&mut self) -> Result<String, HostsError> {
        Ok("10.0.0".to_string())
    }

    async fn lookup_network(&mut self, name: &str) -> Result<NetworkHandle, HostsError> {
        let mut state = self.state.lock().unwrap();
        state.lookup_calls += 1;
        if state.networks.iter().any(|n| n == name) {
            Ok(NetworkHandle {
                name: name.to_string(),
                uuid: [7u8; 16],
            })
        } else {
            Err(HostsError::NetworkNotFound(name.to_string()))
        }
    }

    async fn dhcp_leases(&mut self, _network: &NetworkHandle) -> Result<Vec<Lease>, HostsError> {
        let mut state = self.state.lock().unwrap();
        state.lease_calls.push(Instant::now());
        match state.replies.pop_front() {
            Some(LeaseReply::Leases(leases)) => Ok(leases),
            Some(LeaseReply::Fail) => Err(HostsError::Query(RpcError::Timeout(
                Duration::from_secs(30),
            ))),
            None => Ok(state.fallback.clone()),
        }
    }

    async fn disconnect(&mut self) -> Result<(), HostsError> {
        let mut state = self.state.lock().unwrap();
        state.disconnect_calls += 1;
        if state.fail_disconnect {
            return Err(HostsError::Disconnect(RpcError::Closed));
        }
        Ok(())
    }
}

// --- Config builders ---

pub fn test_config(hostfile: &Path) -> Config {
    let yaml = format!(
        "network: {}\ninterval: {}\nhostfile: {}\ndomain: {}\n",
        NETWORK,
        INTERVAL_MS,
        hostfile.display(),
        DOMAIN
    );
    Config::from_yaml(&yaml).expect("test config must be valid")
}

pub fn read_hosts(path: &Path) -> String {
    std::fs::read_to_string(path).expect("hosts file should exist")
}

// --- FakeLibvirtd ---

use lease_hosts::libvirt::protocol::{
    read_packet, write_packet, ConnectOpenArgs, DhcpLease, Header, LibVersion, MessageStatus,
    MessageType, NetworkGetDhcpLeasesArgs, NetworkGetDhcpLeasesRet, NetworkLookupByNameArgs,
    Packet, Procedure, RemoteError, RemoteNetwork, ERR_NO_NETWORK,
};
use std::path::PathBuf;
use tokio::net::{UnixListener, UnixStream};

/// Library version reported by the fake daemon (10.1.0).
pub const FAKE_LIB_VERSION: u64 = 10_001_000;

#[derive(Default)]
pub struct FakeState {
    pub networks: Vec<RemoteNetwork>,
    pub leases: Vec<DhcpLease>,
    pub calls: Vec<Procedure>,
    pub open_uris: Vec<Option<String>>,
    pub lease_args: Vec<NetworkGetDhcpLeasesArgs>,
    pub connections: usize,
    /// Close the connection instead of answering the next lease query.
    pub drop_next_lease_query: bool,
    /// Never answer the next lease query.
    pub hang_next_lease_query: bool,
    /// Send an unsolicited event packet before every reply.
    pub send_events: bool,
}

/// A libvirt daemon stand-in speaking the remote protocol on a temp socket.
pub struct FakeLibvirtd {
    pub socket: PathBuf,
    state: Arc<Mutex<FakeState>>,
    _dir: tempfile::TempDir,
}

pub fn dhcp_lease(ip: &str, hostname: Option<&str>) -> DhcpLease {
    DhcpLease {
        iface: "virbr0".to_string(),
        expiry_time: 1_900_000_000,
        kind: 0,
        mac: Some("52:54:00:00:00:01".to_string()),
        iaid: None,
        ipaddr: ip.to_string(),
        prefix: 24,
        hostname: hostname.map(String::from),
        clientid: None,
    }
}

impl FakeLibvirtd {
    /// Start serving with a single network named [`NETWORK`].
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let socket = dir.path().join("libvirt-sock");
        let listener = UnixListener::bind(&socket).expect("failed to bind fake libvirtd socket");

        let state = Arc::new(Mutex::new(FakeState {
            networks: vec![RemoteNetwork {
                name: NETWORK.to_string(),
                uuid: [0xab; 16],
            }],
            ..Default::default()
        }));

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.lock().unwrap().connections += 1;
                tokio::spawn(serve(stream, accept_state.clone()));
            }
        });

        Self {
            socket,
            state,
            _dir: dir,
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<Procedure> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn count(&self, procedure: Procedure) -> usize {
        self.calls().iter().filter(|p| **p == procedure).count()
    }

    pub fn connections(&self) -> usize {
        self.with_state(|s| s.connections)
    }
}

fn ok_reply<T: lease_hosts::libvirt::xdr::Xdr>(call: &Header, payload: &T) -> Packet {
    Packet::new(Header::reply_to(call, MessageStatus::Ok), payload)
}

fn error_reply(call: &Header, code: i32, message: &str) -> Packet {
    let err = RemoteError {
        code,
        domain: 19,
        message: Some(message.to_string()),
        level: 2,
    };
    Packet::new(Header::reply_to(call, MessageStatus::Error), &err)
}

async fn serve(stream: UnixStream, state: Arc<Mutex<FakeState>>) {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let Ok(call) = read_packet(&mut reader).await else {
            return;
        };
        let header = call.header.clone();
        let procedure = Procedure::from_u32(header.procedure);

        let reply = {
            let mut st = state.lock().unwrap();
            if let Some(p) = procedure {
                st.calls.push(p);
            }

            match procedure {
                Some(Procedure::ConnectOpen) => {
                    let args: ConnectOpenArgs = call.payload().expect("bad open args");
                    st.open_uris.push(args.name);
                    Some(ok_reply(&header, &()))
                }
                Some(Procedure::ConnectClose) => Some(ok_reply(&header, &())),
                Some(Procedure::ConnectGetLibVersion) => {
                    Some(ok_reply(&header, &LibVersion(FAKE_LIB_VERSION)))
                }
                Some(Procedure::NetworkLookupByName) => {
                    let args: NetworkLookupByNameArgs = call.payload().expect("bad lookup args");
                    match st.networks.iter().find(|n| n.name == args.name) {
                        Some(net) => Some(ok_reply(&header, net)),
                        None => Some(error_reply(
                            &header,
                            ERR_NO_NETWORK,
                            &format!("Network not found: no network with matching name '{}'", args.name),
                        )),
                    }
                }
                Some(Procedure::NetworkGetDhcpLeases) => {
                    let args: NetworkGetDhcpLeasesArgs = call.payload().expect("bad lease args");
                    st.lease_args.push(args);
                    if st.drop_next_lease_query {
                        st.drop_next_lease_query = false;
                        return;
                    }
                    if st.hang_next_lease_query {
                        st.hang_next_lease_query = false;
                        None
                    } else {
                        let ret = NetworkGetDhcpLeasesRet {
                            leases: st.leases.clone(),
                            ret: st.leases.len() as u32,
                        };
                        Some(ok_reply(&header, &ret))
                    }
                }
                None => Some(error_reply(&header, 1, "unsupported procedure")),
            }
        };

        let Some(reply) = reply else {
            continue;
        };

        if state.lock().unwrap().send_events {
            let event = Packet::new(
                Header {
                    kind: MessageType::Message,
                    serial: 0,
                    ..header.clone()
                },
                &(),
            );
            if write_packet(&mut writer, &event).await.is_err() {
                return;
            }
        }

        if write_packet(&mut writer, &reply).await.is_err() {
            return;
        }
        if procedure == Some(Procedure::ConnectClose) {
            return;
        }
    }
}
