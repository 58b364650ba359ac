//! Little-endian payload cursor and writer

use bytes::{BufMut, BytesMut};

use crate::xml_utils::extract_null_terminated;
use crate::{ListenerError, Result};

/// Read a little-endian `u32` at `offset` with bounds checking.
pub fn read_u32_at(data: &[u8], offset: usize, context: &str) -> Result<u32> {
    match data.get(offset..offset + 4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(ListenerError::parse(
            context,
            format!(
                "Insufficient data for u32 at offset {} (need 4 bytes, have {})",
                offset,
                data.len().saturating_sub(offset)
            ),
        )),
    }
}

/// Length rounded up to the 4-byte word boundary used for padded strings.
pub const fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Sequential reader over a packet payload.
///
/// Every read is bounds checked; running past the end of the payload is a
/// parse error naming the packet being decoded.
pub struct PayloadReader<'a> {
    data: &'a [u8],
    offset: usize,
    context: &'static str,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8], context: &'static str) -> Self {
        Self { data, offset: 0, context }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = read_u32_at(self.data, self.offset, self.context)?;
        self.offset += 4;
        Ok(value)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ListenerError::parse(
                self.context,
                format!(
                    "Insufficient data for {} bytes at offset {} (have {})",
                    len,
                    self.offset,
                    self.remaining()
                ),
            ));
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Read a string of `len` bytes padded to the next word boundary.
    pub fn read_padded_string(&mut self, len: usize) -> Result<String> {
        let padded = self.read_bytes(padded_len(len))?;
        Ok(extract_null_terminated(&padded[..len]))
    }

    /// Ensure `count` items of at least `item_size` bytes each can still be read.
    ///
    /// Guards allocations driven by counts taken from the wire.
    pub fn require_items(&self, count: usize, item_size: usize, what: &str) -> Result<()> {
        let needed = count.saturating_mul(item_size);
        if needed > self.remaining() {
            return Err(ListenerError::parse(
                self.context,
                format!(
                    "{} count {} needs {} bytes but only {} remain",
                    what,
                    count,
                    needed,
                    self.remaining()
                ),
            ));
        }
        Ok(())
    }
}

/// Little-endian payload builder.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_f64_le(value);
        self
    }

    /// Append `bytes` zero-padded to the next word boundary.
    pub fn padded(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self.buf.put_bytes(0, padded_len(bytes.len()) - bytes.len());
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }
}
