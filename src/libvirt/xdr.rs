//! XDR (RFC 4506) primitives used by the libvirt remote protocol.
//!
//! Every item is aligned to 4 bytes. Strings and variable opaque data carry
//! a `u32` length prefix and are zero-padded; optional values are encoded as
//! a `u32` presence flag followed by the value.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::RpcError;

/// Upper bound for a single string (`REMOTE_STRING_MAX`).
pub const STRING_MAX: usize = 4 * 1024 * 1024;

/// Upper bound for the number of leases in one reply
/// (`REMOTE_NETWORK_DHCP_LEASES_MAX`).
pub const ARRAY_MAX: usize = 65536;

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Types that have an XDR wire representation.
pub trait Xdr: Sized {
    /// Append the XDR encoding of `self`.
    fn encode(&self, enc: &mut Encoder);

    /// Read a value from the decoder.
    fn decode(dec: &mut Decoder) -> Result<Self, RpcError>;
}

impl Xdr for () {
    fn encode(&self, _enc: &mut Encoder) {}

    fn decode(_dec: &mut Decoder) -> Result<Self, RpcError> {
        Ok(())
    }
}

/// Growable XDR output buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// Empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// `unsigned int`
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    /// `int`
    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    /// `unsigned hyper`
    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    /// `hyper`
    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    /// `bool`, also the presence flag of optional data.
    pub fn put_bool(&mut self, v: bool) {
        self.put_u32(v as u32);
    }

    /// Variable-length opaque data: length, bytes, padding.
    pub fn put_opaque(&mut self, data: &[u8]) {
        self.put_u32(data.len() as u32);
        self.put_fixed_opaque(data);
    }

    /// Fixed-length opaque data: bytes and padding, no length.
    pub fn put_fixed_opaque(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
        self.buf.put_bytes(0, padding(data.len()));
    }

    /// `string`
    pub fn put_string(&mut self, s: &str) {
        self.put_opaque(s.as_bytes());
    }

    /// `remote_string`: presence flag, then the string.
    pub fn put_opt_string(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.put_bool(true);
                self.put_string(s);
            }
            None => self.put_bool(false),
        }
    }

    /// Variable-length array: count, then each item.
    pub fn put_array<T: Xdr>(&mut self, items: &[T]) {
        self.put_u32(items.len() as u32);
        for item in items {
            item.encode(self);
        }
    }

    /// Freeze into the encoded bytes.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over an XDR input buffer.
#[derive(Debug)]
pub struct Decoder {
    buf: Bytes,
}

impl Decoder {
    /// Decode from `buf`.
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize, what: &str) -> Result<(), RpcError> {
        if self.buf.remaining() < n {
            return Err(RpcError::Malformed(format!(
                "truncated {}: need {} bytes, have {}",
                what,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    /// `unsigned int`
    pub fn get_u32(&mut self) -> Result<u32, RpcError> {
        self.need(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    /// `int`
    pub fn get_i32(&mut self) -> Result<i32, RpcError> {
        self.need(4, "i32")?;
        Ok(self.buf.get_i32())
    }

    /// `unsigned hyper`
    pub fn get_u64(&mut self) -> Result<u64, RpcError> {
        self.need(8, "hyper")?;
        Ok(self.buf.get_u64())
    }

    /// `hyper`
    pub fn get_i64(&mut self) -> Result<i64, RpcError> {
        self.need(8, "hyper")?;
        Ok(self.buf.get_i64())
    }

    /// `bool`; anything but 0 or 1 is rejected.
    pub fn get_bool(&mut self) -> Result<bool, RpcError> {
        match self.get_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(RpcError::Malformed(format!("invalid bool {}", other))),
        }
    }

    /// Fixed-length opaque data of `len` bytes.
    pub fn get_fixed_opaque(&mut self, len: usize) -> Result<Bytes, RpcError> {
        let padded = len + padding(len);
        self.need(padded, "opaque")?;
        let data = self.buf.split_to(len);
        self.buf.advance(padding(len));
        Ok(data)
    }

    /// Variable-length opaque data of at most `max` bytes.
    pub fn get_opaque(&mut self, max: usize) -> Result<Bytes, RpcError> {
        let len = self.get_u32()? as usize;
        if len > max {
            return Err(RpcError::Malformed(format!(
                "opaque length {} exceeds limit {}",
                len, max
            )));
        }
        self.get_fixed_opaque(len)
    }

    /// `string`, which must be UTF-8.
    pub fn get_string(&mut self) -> Result<String, RpcError> {
        let data = self.get_opaque(STRING_MAX)?;
        String::from_utf8(data.to_vec())
            .map_err(|e| RpcError::Malformed(format!("invalid UTF-8 in string: {}", e)))
    }

    /// `remote_string`
    pub fn get_opt_string(&mut self) -> Result<Option<String>, RpcError> {
        if self.get_bool()? {
            Ok(Some(self.get_string()?))
        } else {
            Ok(None)
        }
    }

    /// Variable-length array of at most `max` items.
    pub fn get_array<T: Xdr>(&mut self, max: usize) -> Result<Vec<T>, RpcError> {
        let len = self.get_u32()? as usize;
        if len > max {
            return Err(RpcError::Malformed(format!(
                "array length {} exceeds limit {}",
                len, max
            )));
        }
        (0..len).map(|_| T::decode(self)).collect()
    }

    /// Bytes left to decode.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}
