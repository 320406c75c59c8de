//! # Varint Codec
//!
//! Base-128 unsigned varints, zigzag signed varints, and fixed-precision floats.
//!
//! ## Wire Format
//! ```text
//! varint:    7 value bits per byte, little-endian groups, MSB set = more bytes follow
//! zigzag:    (n << 1) ^ (n >> 63), then varint
//! fixed:     truncate(f * 2^precision) as a signed integer, then zigzag varint
//! ```
//!
//! A negative precision means a scale of 1 (whole units).
//!
//! Truncation toward zero is part of the wire contract: a value of `1.99` at precision 0
//! encodes as `1`, never `2`.

use crate::error::{ArchiveError, Result};
use bytes::BufMut;

/// Longest encoding of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Write `value` as a base-128 varint
#[inline]
pub fn write_varint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Read a varint from the start of `data`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;

    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        let bits = u64::from(byte & 0x7F);

        // The tenth byte may only carry the final bit of a u64
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(ArchiveError::MalformedVarint(i));
        }

        value |= bits << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    if data.len() >= MAX_VARINT_LEN {
        Err(ArchiveError::MalformedVarint(MAX_VARINT_LEN - 1))
    } else {
        Err(ArchiveError::BufferExhausted {
            offset: data.len(),
            needed: 1,
            available: 0,
        })
    }
}

/// Number of bytes `value` occupies as a varint
#[inline]
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Map a signed integer onto an unsigned one so small magnitudes stay small
#[inline]
pub const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`]
#[inline]
pub const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Write `value` as a zigzag varint
#[inline]
pub fn write_zigzag<B: BufMut>(buf: &mut B, value: i64) {
    write_varint(buf, zigzag_encode(value));
}

/// Read a zigzag varint from the start of `data`
pub fn read_zigzag(data: &[u8]) -> Result<(i64, usize)> {
    let (raw, len) = read_varint(data)?;
    Ok((zigzag_decode(raw), len))
}

/// Scale factor applied for a given precision
#[inline]
pub fn fixed_scale(precision: i32) -> f32 {
    if precision < 0 {
        1.0
    } else {
        (1u64 << precision.min(62)) as f32
    }
}

/// Convert a float to its fixed-precision integer form (truncating toward zero)
#[inline]
pub fn encode_fixed_float(value: f32, precision: i32) -> i64 {
    (value * fixed_scale(precision)) as i64
}

/// Convert a fixed-precision integer back into a float
#[inline]
pub fn decode_fixed_float(value: i64, precision: i32) -> f32 {
    value as f32 / fixed_scale(precision)
}
