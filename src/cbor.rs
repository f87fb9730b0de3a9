//! CBOR Primitives
//!
//! The envelope wire format is a nine-element CBOR array with definite
//! lengths only. This module provides exactly the primitives that format
//! needs: unsigned and negative integers, text strings, byte strings, and
//! array headers. Encoding always emits the shortest-form argument; the
//! decoder accepts any definite-length argument width but rejects
//! indefinite lengths.
//!
//! The codec operates on plain byte buffers rather than a serde model
//! because authentication covers a byte-exact prefix of the message: the
//! caller needs to know exactly which bytes were produced and where the
//! MAC-covered region ends.

use thiserror::Error;

// Major types (high 3 bits of the initial byte).
const MAJOR_UINT: u8 = 0;
const MAJOR_NEGINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;

// Additional-information values for multi-byte arguments.
const ARG_U8: u8 = 24;
const ARG_U16: u8 = 25;
const ARG_U32: u8 = 26;
const ARG_U64: u8 = 27;

/// Errors produced while reading CBOR items.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CborError {
    #[error("input truncated")]
    Truncated,

    #[error("expected major type {expected}, found {found}")]
    TypeMismatch { expected: u8, found: u8 },

    #[error("indefinite or reserved length encoding")]
    UnsupportedLength,

    #[error("length {len} exceeds limit {limit}")]
    LengthLimit { len: u64, limit: usize },

    #[error("integer out of range for target type")]
    IntRange,

    #[error("text is not valid utf-8")]
    InvalidUtf8,
}

// ============================================================================
// Encoding
// ============================================================================

/// Append a major-type head with the shortest-form argument.
fn write_head(buf: &mut Vec<u8>, major: u8, arg: u64) {
    let shifted = major << 5;
    if arg < 24 {
        buf.push(shifted | arg as u8);
    } else if arg <= u8::MAX as u64 {
        buf.push(shifted | ARG_U8);
        buf.push(arg as u8);
    } else if arg <= u16::MAX as u64 {
        buf.push(shifted | ARG_U16);
        buf.extend_from_slice(&(arg as u16).to_be_bytes());
    } else if arg <= u32::MAX as u64 {
        buf.push(shifted | ARG_U32);
        buf.extend_from_slice(&(arg as u32).to_be_bytes());
    } else {
        buf.push(shifted | ARG_U64);
        buf.extend_from_slice(&arg.to_be_bytes());
    }
}

/// Append an unsigned integer.
pub fn write_uint(buf: &mut Vec<u8>, value: u64) {
    write_head(buf, MAJOR_UINT, value);
}

/// Append a signed integer (major type 0 or 1 as appropriate).
pub fn write_int(buf: &mut Vec<u8>, value: i64) {
    if value >= 0 {
        write_head(buf, MAJOR_UINT, value as u64);
    } else {
        // Major type 1 encodes -1 - n.
        write_head(buf, MAJOR_NEGINT, !(value as u64));
    }
}

/// Append a definite-length text string.
pub fn write_text(buf: &mut Vec<u8>, text: &str) {
    write_head(buf, MAJOR_TEXT, text.len() as u64);
    buf.extend_from_slice(text.as_bytes());
}

/// Append a definite-length byte string.
pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_head(buf, MAJOR_BYTES, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Append a definite-length array header.
pub fn write_array(buf: &mut Vec<u8>, len: u64) {
    write_head(buf, MAJOR_ARRAY, len);
}

// ============================================================================
// Decoding
// ============================================================================

/// A cursor over CBOR input.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over the full input.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset from the start of the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CborError> {
        if self.remaining() < n {
            return Err(CborError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a head, returning (major, argument).
    fn read_head(&mut self) -> Result<(u8, u64), CborError> {
        let initial = self.take(1)?[0];
        let major = initial >> 5;
        let info = initial & 0x1F;
        let arg = match info {
            0..=23 => info as u64,
            ARG_U8 => self.take(1)?[0] as u64,
            ARG_U16 => {
                let b = self.take(2)?;
                u16::from_be_bytes([b[0], b[1]]) as u64
            }
            ARG_U32 => {
                let b = self.take(4)?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64
            }
            ARG_U64 => {
                let b = self.take(8)?;
                u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
            _ => return Err(CborError::UnsupportedLength),
        };
        Ok((major, arg))
    }

    fn expect_head(&mut self, expected: u8) -> Result<u64, CborError> {
        let (major, arg) = self.read_head()?;
        if major != expected {
            return Err(CborError::TypeMismatch {
                expected,
                found: major,
            });
        }
        Ok(arg)
    }

    /// Read an unsigned integer.
    pub fn read_uint(&mut self) -> Result<u64, CborError> {
        self.expect_head(MAJOR_UINT)
    }

    /// Read a signed integer (major type 0 or 1).
    pub fn read_int(&mut self) -> Result<i64, CborError> {
        let (major, arg) = self.read_head()?;
        match major {
            MAJOR_UINT => i64::try_from(arg).map_err(|_| CborError::IntRange),
            MAJOR_NEGINT => {
                if arg > i64::MAX as u64 {
                    return Err(CborError::IntRange);
                }
                Ok(-1 - arg as i64)
            }
            found => Err(CborError::TypeMismatch {
                expected: MAJOR_UINT,
                found,
            }),
        }
    }

    /// Read a text string of at most `limit` bytes.
    pub fn read_text(&mut self, limit: usize) -> Result<String, CborError> {
        let len = self.expect_head(MAJOR_TEXT)?;
        if len > limit as u64 {
            return Err(CborError::LengthLimit { len, limit });
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CborError::InvalidUtf8)
    }

    /// Read a byte string of exactly `expected` bytes.
    pub fn read_exact_bytes<const N: usize>(&mut self) -> Result<[u8; N], CborError> {
        let len = self.expect_head(MAJOR_BYTES)?;
        if len != N as u64 {
            return Err(CborError::LengthLimit { len, limit: N });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read an array header, returning the element count.
    pub fn read_array(&mut self) -> Result<u64, CborError> {
        self.expect_head(MAJOR_ARRAY)
    }
}
