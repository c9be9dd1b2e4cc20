//! Length-prefixed big-endian encoding shared by transactions and blocks.
//!
//! Every variable-length field carries an explicit prefix that the [`Reader`] checks
//! against the remaining input before allocating, so a hostile count can never make the
//! decoder over-allocate or read past the end.

use super::ids::{Id, ID_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unexpected end of input reading {field}: needed {needed} bytes, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("{field} length {len} exceeds limit {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{field} count {count} out of range {min}..={max}")]
    CountOutOfRange {
        field: &'static str,
        count: usize,
        min: usize,
        max: usize,
    },
    #[error("unknown {field} tag {tag}")]
    UnknownTag { field: &'static str, tag: u8 },
    #[error("unsupported block version {0}")]
    UnsupportedVersion(u8),
    #[error("{0} trailing bytes after decoding")]
    TrailingBytes(usize),
    #[error("declared block hash {declared} does not match computed {computed}")]
    HashMismatch { declared: Id, computed: Id },
}

pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub(crate) fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub(crate) fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    pub(crate) fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    pub(crate) fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64(value);
        self
    }

    pub(crate) fn i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64(value);
        self
    }

    pub(crate) fn bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    pub(crate) fn id(&mut self, value: &Id) -> &mut Self {
        self.buf.put_slice(value.as_bytes());
        self
    }

    pub(crate) fn raw(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Writes a `u16` length prefix followed by the payload. Callers enforce the limit
    /// before encoding, so the cast never truncates for validated values.
    pub(crate) fn short_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_u16(value.len() as u16);
        self.buf.put_slice(value);
        self
    }

    pub(crate) fn long_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_u32(value.len() as u32);
        self.buf.put_slice(value);
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

pub(crate) struct Reader<'a> {
    input: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.input.remaining()
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<(), CodecError> {
        let remaining = self.input.remaining();
        if remaining < needed {
            return Err(CodecError::Truncated {
                field,
                needed,
                remaining,
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        self.ensure(field, 1)?;
        Ok(self.input.get_u8())
    }

    pub(crate) fn u16(&mut self, field: &'static str) -> Result<u16, CodecError> {
        self.ensure(field, 2)?;
        Ok(self.input.get_u16())
    }

    pub(crate) fn u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        self.ensure(field, 4)?;
        Ok(self.input.get_u32())
    }

    pub(crate) fn u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        self.ensure(field, 8)?;
        Ok(self.input.get_u64())
    }

    pub(crate) fn i64(&mut self, field: &'static str) -> Result<i64, CodecError> {
        self.ensure(field, 8)?;
        Ok(self.input.get_i64())
    }

    pub(crate) fn id(&mut self, field: &'static str) -> Result<Id, CodecError> {
        self.ensure(field, ID_LEN)?;
        let mut bytes = [0u8; ID_LEN];
        self.input.copy_to_slice(&mut bytes);
        Ok(Id::from_bytes(bytes))
    }

    pub(crate) fn raw(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(field, len)?;
        let (head, tail) = self.input.split_at(len);
        self.input = tail;
        Ok(head)
    }

    pub(crate) fn short_bytes(
        &mut self,
        field: &'static str,
        max: usize,
    ) -> Result<&'a [u8], CodecError> {
        let len = usize::from(self.u16(field)?);
        if len > max {
            return Err(CodecError::TooLong { field, len, max });
        }
        self.raw(field, len)
    }

    pub(crate) fn long_bytes(
        &mut self,
        field: &'static str,
        max: usize,
    ) -> Result<&'a [u8], CodecError> {
        let len = self.u32(field)? as usize;
        if len > max {
            return Err(CodecError::TooLong { field, len, max });
        }
        self.raw(field, len)
    }

    pub(crate) fn finish(self) -> Result<(), CodecError> {
        match self.input.remaining() {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes(extra)),
        }
    }
}
