//! libvirt remote protocol framing and the messages lease-hosts needs.
//!
//! ```text
//! +--------+---------+---------+-----------+------+--------+--------+---------+
//! | length | program | version | procedure | type | serial | status | body... |
//! +--------+---------+---------+-----------+------+--------+--------+---------+
//!   u32      u32       u32       i32         i32    u32      i32      XDR
//! ```
//!
//! `length` counts the whole packet, itself included.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::xdr::{Decoder, Encoder, Xdr, ARRAY_MAX};
use crate::error::RpcError;

/// `REMOTE_PROGRAM`
pub const PROGRAM: u32 = 0x2000_8086;

/// `REMOTE_PROTOCOL_VERSION`
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the length word.
pub const LEN_SIZE: usize = 4;

/// Size of the fixed header following the length word.
pub const HEADER_SIZE: usize = 24;

/// `VIR_NET_MESSAGE_MAX`
pub const MAX_PACKET: usize = 32 * 1024 * 1024;

/// `VIR_ERR_NO_NETWORK`
pub const ERR_NO_NETWORK: i32 = 43;

/// Remote procedures used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Procedure {
    /// `REMOTE_PROC_CONNECT_OPEN`
    ConnectOpen = 1,
    /// `REMOTE_PROC_CONNECT_CLOSE`
    ConnectClose = 2,
    /// `REMOTE_PROC_NETWORK_LOOKUP_BY_NAME`
    NetworkLookupByName = 46,
    /// `REMOTE_PROC_CONNECT_GET_LIB_VERSION`
    ConnectGetLibVersion = 157,
    /// `REMOTE_PROC_NETWORK_GET_DHCP_LEASES`
    NetworkGetDhcpLeases = 341,
}

impl Procedure {
    /// Map a wire procedure number back to a known procedure.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Procedure::ConnectOpen),
            2 => Some(Procedure::ConnectClose),
            46 => Some(Procedure::NetworkLookupByName),
            157 => Some(Procedure::ConnectGetLibVersion),
            341 => Some(Procedure::NetworkGetDhcpLeases),
            _ => None,
        }
    }
}

/// `virNetMessageType`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Client to server call.
    Call,
    /// Server reply to a call.
    Reply,
    /// Asynchronous event from the server.
    Message,
    /// Stream data.
    Stream,
    /// Call carrying file descriptors.
    CallWithFds,
    /// Reply carrying file descriptors.
    ReplyWithFds,
}

impl MessageType {
    fn to_i32(self) -> i32 {
        match self {
            MessageType::Call => 0,
            MessageType::Reply => 1,
            MessageType::Message => 2,
            MessageType::Stream => 3,
            MessageType::CallWithFds => 4,
            MessageType::ReplyWithFds => 5,
        }
    }

    fn from_i32(v: i32) -> Result<Self, RpcError> {
        Ok(match v {
            0 => MessageType::Call,
            1 => MessageType::Reply,
            2 => MessageType::Message,
            3 => MessageType::Stream,
            4 => MessageType::CallWithFds,
            5 => MessageType::ReplyWithFds,
            other => return Err(RpcError::Malformed(format!("unknown message type {}", other))),
        })
    }
}

/// `virNetMessageStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Success.
    Ok,
    /// Body is a `remote_error`.
    Error,
    /// More stream data follows.
    Continue,
}

impl MessageStatus {
    fn to_i32(self) -> i32 {
        match self {
            MessageStatus::Ok => 0,
            MessageStatus::Error => 1,
            MessageStatus::Continue => 2,
        }
    }

    fn from_i32(v: i32) -> Result<Self, RpcError> {
        Ok(match v {
            0 => MessageStatus::Ok,
            1 => MessageStatus::Error,
            2 => MessageStatus::Continue,
            other => return Err(RpcError::Malformed(format!("unknown message status {}", other))),
        })
    }
}

/// Fixed packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Program number, always [`PROGRAM`] for the remote driver.
    pub program: u32,
    /// Program version.
    pub version: u32,
    /// Procedure number.
    pub procedure: u32,
    /// Packet direction and kind.
    pub kind: MessageType,
    /// Serial used to pair replies with calls.
    pub serial: u32,
    /// Call outcome, `Ok` for calls.
    pub status: MessageStatus,
}

impl Header {
    /// Header for a call.
    pub fn call(procedure: Procedure, serial: u32) -> Self {
        Self {
            program: PROGRAM,
            version: PROTOCOL_VERSION,
            procedure: procedure as u32,
            kind: MessageType::Call,
            serial,
            status: MessageStatus::Ok,
        }
    }

    /// Header for the reply to `call`.
    pub fn reply_to(call: &Header, status: MessageStatus) -> Self {
        Self {
            kind: MessageType::Reply,
            status,
            ..call.clone()
        }
    }
}

impl Xdr for Header {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u32(self.program);
        enc.put_u32(self.version);
        enc.put_u32(self.procedure);
        enc.put_i32(self.kind.to_i32());
        enc.put_u32(self.serial);
        enc.put_i32(self.status.to_i32());
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(Self {
            program: dec.get_u32()?,
            version: dec.get_u32()?,
            procedure: dec.get_u32()?,
            kind: MessageType::from_i32(dec.get_i32()?)?,
            serial: dec.get_u32()?,
            status: MessageStatus::from_i32(dec.get_i32()?)?,
        })
    }
}

/// A header plus its XDR body.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header.
    pub header: Header,
    /// Encoded body.
    pub body: Bytes,
}

impl Packet {
    /// Build a packet whose body is the encoding of `payload`.
    pub fn new<T: Xdr>(header: Header, payload: &T) -> Self {
        let mut enc = Encoder::new();
        payload.encode(&mut enc);
        Self {
            header,
            body: enc.finish(),
        }
    }

    /// Decode the body as `T`.
    pub fn payload<T: Xdr>(&self) -> Result<T, RpcError> {
        T::decode(&mut Decoder::new(self.body.clone()))
    }

    /// Serialize including the length word.
    pub fn to_bytes(&self) -> Bytes {
        let mut header = Encoder::new();
        self.header.encode(&mut header);
        let header = header.finish();

        let total = LEN_SIZE + header.len() + self.body.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32(total as u32);
        buf.put_slice(&header);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Parse a packet from the bytes following the length word.
    pub fn from_frame(frame: Bytes) -> Result<Self, RpcError> {
        let header = Header::decode(&mut Decoder::new(frame.clone()))?;
        if header.program != PROGRAM {
            return Err(RpcError::Malformed(format!(
                "unexpected program {:#x}",
                header.program
            )));
        }
        if header.version != PROTOCOL_VERSION {
            return Err(RpcError::Malformed(format!(
                "unexpected protocol version {}",
                header.version
            )));
        }
        let body = frame.slice(HEADER_SIZE..);
        Ok(Self { header, body })
    }
}

/// Read one packet from `reader`.
///
/// Returns [`RpcError::Closed`] if the stream ends before a length word.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LEN_SIZE];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(RpcError::Closed),
        Err(e) => return Err(e.into()),
    }

    let total = u32::from_be_bytes(len_buf) as usize;
    if !(LEN_SIZE + HEADER_SIZE..=MAX_PACKET).contains(&total) {
        return Err(RpcError::Malformed(format!("invalid packet length {}", total)));
    }

    let mut frame = vec![0u8; total - LEN_SIZE];
    reader.read_exact(&mut frame).await?;
    Packet::from_frame(Bytes::from(frame))
}

/// Write one packet to `writer` and flush it.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&packet.to_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// `remote_error`
///
/// Only the leading fields are kept; the trailing object references are
/// written as null and skipped on decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// `virErrorNumber`
    pub code: i32,
    /// `virErrorDomain`
    pub domain: i32,
    /// Error message.
    pub message: Option<String>,
    /// `virErrorLevel`
    pub level: i32,
}

impl Xdr for RemoteError {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_i32(self.code);
        enc.put_i32(self.domain);
        enc.put_opt_string(self.message.as_deref());
        enc.put_i32(self.level);
        enc.put_bool(false); // dom
        enc.put_opt_string(None); // str1
        enc.put_opt_string(None); // str2
        enc.put_opt_string(None); // str3
        enc.put_i32(0); // int1
        enc.put_i32(0); // int2
        enc.put_bool(false); // net
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(Self {
            code: dec.get_i32()?,
            domain: dec.get_i32()?,
            message: dec.get_opt_string()?,
            level: dec.get_i32()?,
        })
    }
}

impl From<RemoteError> for RpcError {
    fn from(e: RemoteError) -> Self {
        RpcError::Remote {
            code: e.code,
            domain: e.domain,
            message: e.message.unwrap_or_default(),
        }
    }
}

/// `remote_connect_open_args`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOpenArgs {
    /// Connection URI, `None` for the daemon default.
    pub name: Option<String>,
    /// `virConnectFlags`
    pub flags: u32,
}

impl Xdr for ConnectOpenArgs {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_opt_string(self.name.as_deref());
        enc.put_u32(self.flags);
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(Self {
            name: dec.get_opt_string()?,
            flags: dec.get_u32()?,
        })
    }
}

/// `remote_connect_get_lib_version_ret`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibVersion(pub u64);

impl LibVersion {
    /// Render as `major.minor.release`.
    pub fn to_dotted(self) -> String {
        let v = self.0;
        format!("{}.{}.{}", v / 1_000_000, (v / 1000) % 1000, v % 1000)
    }
}

impl Xdr for LibVersion {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u64(self.0);
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(Self(dec.get_u64()?))
    }
}

/// `remote_network_lookup_by_name_args`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLookupByNameArgs {
    /// Network name.
    pub name: String,
}

impl Xdr for NetworkLookupByNameArgs {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_string(&self.name);
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(Self {
            name: dec.get_string()?,
        })
    }
}

/// `remote_nonnull_network`, also the lookup reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNetwork {
    /// Network name.
    pub name: String,
    /// Network UUID.
    pub uuid: [u8; 16],
}

impl Xdr for RemoteNetwork {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_string(&self.name);
        enc.put_fixed_opaque(&self.uuid);
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        let name = dec.get_string()?;
        let raw = dec.get_fixed_opaque(16)?;
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&raw);
        Ok(Self { name, uuid })
    }
}

/// `remote_network_get_dhcp_leases_args`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkGetDhcpLeasesArgs {
    /// Network to query.
    pub net: RemoteNetwork,
    /// Restrict to one MAC address.
    pub mac: Option<String>,
    /// Non-zero to receive the lease list, zero for the count only.
    pub need_results: i32,
    /// Reserved, always zero.
    pub flags: u32,
}

impl Xdr for NetworkGetDhcpLeasesArgs {
    fn encode(&self, enc: &mut Encoder) {
        self.net.encode(enc);
        enc.put_opt_string(self.mac.as_deref());
        enc.put_i32(self.need_results);
        enc.put_u32(self.flags);
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(Self {
            net: RemoteNetwork::decode(dec)?,
            mac: dec.get_opt_string()?,
            need_results: dec.get_i32()?,
            flags: dec.get_u32()?,
        })
    }
}

/// `remote_network_dhcp_lease`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpLease {
    /// Bridge interface.
    pub iface: String,
    /// Expiry as seconds since the epoch.
    pub expiry_time: i64,
    /// `virIPAddrType`: 0 for IPv4, 1 for IPv6.
    pub kind: i32,
    /// Client MAC address.
    pub mac: Option<String>,
    /// IAID (DHCPv6 only).
    pub iaid: Option<String>,
    /// Leased address.
    pub ipaddr: String,
    /// Prefix length.
    pub prefix: u32,
    /// Client-reported hostname.
    pub hostname: Option<String>,
    /// Client identifier.
    pub clientid: Option<String>,
}

impl Xdr for DhcpLease {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_string(&self.iface);
        enc.put_i64(self.expiry_time);
        enc.put_i32(self.kind);
        enc.put_opt_string(self.mac.as_deref());
        enc.put_opt_string(self.iaid.as_deref());
        enc.put_string(&self.ipaddr);
        enc.put_u32(self.prefix);
        enc.put_opt_string(self.hostname.as_deref());
        enc.put_opt_string(self.clientid.as_deref());
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(Self {
            iface: dec.get_string()?,
            expiry_time: dec.get_i64()?,
            kind: dec.get_i32()?,
            mac: dec.get_opt_string()?,
            iaid: dec.get_opt_string()?,
            ipaddr: dec.get_string()?,
            prefix: dec.get_u32()?,
            hostname: dec.get_opt_string()?,
            clientid: dec.get_opt_string()?,
        })
    }
}

/// `remote_network_get_dhcp_leases_ret`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkGetDhcpLeasesRet {
    /// Current leases.
    pub leases: Vec<DhcpLease>,
    /// Number of leases reported by the daemon.
    pub ret: u32,
}

impl Xdr for NetworkGetDhcpLeasesRet {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_array(&self.leases);
        enc.put_u32(self.ret);
    }

    fn decode(dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(Self {
            leases: dec.get_array(ARRAY_MAX)?,
            ret: dec.get_u32()?,
        })
    }
}
