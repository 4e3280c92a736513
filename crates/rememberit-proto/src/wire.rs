//! Protocol-buffer wire format.
//!
//! Only what the AnkiWeb messages use: varints (int32, int64, uint32,
//! uint64, bool) and length-delimited fields (string, bytes, embedded
//! messages). Fixed-width fields are read so they can be skipped.

use crate::error::{ProtoError, ProtoResult};

pub(crate) const WIRE_VARINT: u8 = 0;
pub(crate) const WIRE_FIXED64: u8 = 1;
pub(crate) const WIRE_LEN: u8 = 2;
pub(crate) const WIRE_FIXED32: u8 = 5;

/// Maximum encoded length of a 64-bit varint.
const MAX_VARINT_LEN: usize = 10;

/// Builds one message by appending fields in call order.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume this writer and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn put_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buffer.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    fn put_tag(&mut self, field: u32, wire_type: u8) {
        self.put_varint((u64::from(field) << 3) | u64::from(wire_type));
    }

    /// uint64 / uint32 field.
    pub fn uint64(&mut self, field: u32, value: u64) -> &mut Self {
        self.put_tag(field, WIRE_VARINT);
        self.put_varint(value);
        self
    }

    /// int64 field (two's complement, negative values take ten bytes).
    pub fn int64(&mut self, field: u32, value: i64) -> &mut Self {
        self.uint64(field, value as u64)
    }

    /// int32 field; negative values are sign-extended to 64 bits.
    pub fn int32(&mut self, field: u32, value: i32) -> &mut Self {
        self.int64(field, i64::from(value))
    }

    pub fn bool(&mut self, field: u32, value: bool) -> &mut Self {
        self.uint64(field, u64::from(value))
    }

    /// Length-delimited bytes field.
    pub fn bytes(&mut self, field: u32, value: &[u8]) -> &mut Self {
        self.put_tag(field, WIRE_LEN);
        self.put_varint(value.len() as u64);
        self.buffer.extend_from_slice(value);
        self
    }

    pub fn string(&mut self, field: u32, value: &str) -> &mut Self {
        self.bytes(field, value.as_bytes())
    }

    /// Embedded message field.
    pub fn message(&mut self, field: u32, message: &WireWriter) -> &mut Self {
        self.bytes(field, message.as_bytes())
    }
}

/// A decoded field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Len(&'a [u8]),
    Fixed32(u32),
}

impl<'a> WireValue<'a> {
    fn wire_type(&self) -> u8 {
        match self {
            WireValue::Varint(_) => WIRE_VARINT,
            WireValue::Fixed64(_) => WIRE_FIXED64,
            WireValue::Len(_) => WIRE_LEN,
            WireValue::Fixed32(_) => WIRE_FIXED32,
        }
    }

    fn mismatch(&self, field: u32, expected: u8) -> ProtoError {
        ProtoError::WireTypeMismatch {
            field,
            expected,
            found: self.wire_type(),
        }
    }

    pub fn as_u64(&self, field: u32) -> ProtoResult<u64> {
        match self {
            WireValue::Varint(v) => Ok(*v),
            other => Err(other.mismatch(field, WIRE_VARINT)),
        }
    }

    /// uint32 truncates the varint like other protobuf runtimes do.
    pub fn as_u32(&self, field: u32) -> ProtoResult<u32> {
        self.as_u64(field).map(|v| v as u32)
    }

    pub fn as_i64(&self, field: u32) -> ProtoResult<i64> {
        self.as_u64(field).map(|v| v as i64)
    }

    pub fn as_i32(&self, field: u32) -> ProtoResult<i32> {
        self.as_u64(field).map(|v| v as i64 as i32)
    }

    pub fn as_bool(&self, field: u32) -> ProtoResult<bool> {
        self.as_u64(field).map(|v| v != 0)
    }

    pub fn as_bytes(&self, field: u32) -> ProtoResult<&'a [u8]> {
        match self {
            WireValue::Len(bytes) => Ok(bytes),
            other => Err(other.mismatch(field, WIRE_LEN)),
        }
    }

    pub fn as_str(&self, field: u32) -> ProtoResult<&'a str> {
        let bytes = self.as_bytes(field)?;
        std::str::from_utf8(bytes).map_err(|_| ProtoError::InvalidUtf8 { field })
    }
}

/// Iterates over the fields of one encoded message.
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    fn read_byte(&mut self) -> ProtoResult<u8> {
        if self.pos >= self.data.len() {
            return Err(ProtoError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> ProtoResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(ProtoError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(ProtoError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_varint(&mut self) -> ProtoResult<u64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_byte()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtoError::VarintOverflow)
    }

    /// Read the next field, or `None` at the end of the message.
    pub fn next_field(&mut self) -> ProtoResult<Option<(u32, WireValue<'a>)>> {
        if self.is_empty() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let field = (key >> 3) as u32;
        let wire_type = (key & 0x7) as u8;
        let value = match wire_type {
            WIRE_VARINT => WireValue::Varint(self.read_varint()?),
            WIRE_FIXED64 => {
                let b = self.read_bytes(8)?;
                WireValue::Fixed64(u64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }
            WIRE_LEN => {
                let len = self.read_varint()?;
                let len = usize::try_from(len).map_err(|_| ProtoError::UnexpectedEof)?;
                WireValue::Len(self.read_bytes(len)?)
            }
            WIRE_FIXED32 => {
                let b = self.read_bytes(4)?;
                WireValue::Fixed32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            other => {
                return Err(ProtoError::UnsupportedWireType {
                    field,
                    wire_type: other,
                })
            }
        };
        Ok(Some((field, value)))
    }
}
