#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Wire-level vectors for the varint, zigzag and fixed-point primitives

use replica_archive::core::varint::{
    decode_fixed_float, encode_fixed_float, read_varint, read_zigzag, varint_len, write_varint,
    write_zigzag, zigzag_decode, zigzag_encode, MAX_VARINT_LEN,
};
use replica_archive::error::ArchiveError;

fn encode(value: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, value);
    buf
}

// ============================================================================
// VARINT VECTORS
// ============================================================================

#[test]
fn test_single_byte_values() {
    assert_eq!(encode(0), vec![0x00]);
    assert_eq!(encode(1), vec![0x01]);
    assert_eq!(encode(127), vec![0x7F]);
}

#[test]
fn test_multi_byte_values() {
    assert_eq!(encode(128), vec![0x80, 0x01]);
    assert_eq!(encode(300), vec![0xAC, 0x02]);
    assert_eq!(encode(16_384), vec![0x80, 0x80, 0x01]);
}

#[test]
fn test_u64_max_uses_ten_bytes() {
    let bytes = encode(u64::MAX);
    assert_eq!(bytes.len(), MAX_VARINT_LEN);
    assert_eq!(bytes[9], 0x01);
    assert_eq!(read_varint(&bytes).unwrap(), (u64::MAX, 10));
}

#[test]
fn test_lengths_match_encoding() {
    for value in [0u64, 1, 127, 128, 300, 1 << 21, 1 << 35, u64::MAX >> 1, u64::MAX] {
        assert_eq!(varint_len(value), encode(value).len(), "value {value}");
    }
}

#[test]
fn test_read_reports_consumed_length() {
    let mut bytes = encode(300);
    bytes.extend_from_slice(&[0xFF, 0xFF]);
    assert_eq!(read_varint(&bytes).unwrap(), (300, 2));
}

// ============================================================================
// MALFORMED INPUT
// ============================================================================

#[test]
fn test_eleven_byte_varint_rejected() {
    let bytes = [0x80u8; 11];
    assert!(matches!(read_varint(&bytes), Err(ArchiveError::MalformedVarint(_))));
}

#[test]
fn test_tenth_byte_overflow_rejected() {
    let mut bytes = vec![0xFFu8; 9];
    bytes.push(0x02);
    assert!(matches!(read_varint(&bytes), Err(ArchiveError::MalformedVarint(9))));
}

#[test]
fn test_truncated_varint() {
    assert!(matches!(
        read_varint(&[0x80, 0x80]),
        Err(ArchiveError::BufferExhausted { .. })
    ));
    assert!(read_varint(&[]).is_err());
}

// ============================================================================
// ZIGZAG
// ============================================================================

#[test]
fn test_zigzag_mapping() {
    assert_eq!(zigzag_encode(0), 0);
    assert_eq!(zigzag_encode(-1), 1);
    assert_eq!(zigzag_encode(1), 2);
    assert_eq!(zigzag_encode(-2), 3);
    assert_eq!(zigzag_encode(i64::MAX), u64::MAX - 1);
    assert_eq!(zigzag_encode(i64::MIN), u64::MAX);
    assert_eq!(zigzag_decode(u64::MAX), i64::MIN);
}

#[test]
fn test_zigzag_stream() {
    let mut buf = Vec::new();
    write_zigzag(&mut buf, -150);
    assert_eq!(buf, vec![0xAB, 0x02]);
    assert_eq!(read_zigzag(&buf).unwrap(), (-150, 2));
}

// ============================================================================
// FIXED POINT
// ============================================================================

#[test]
fn test_fixed_float_truncates_toward_zero() {
    assert_eq!(encode_fixed_float(1.99, 0), 1);
    assert_eq!(encode_fixed_float(-1.99, 0), -1);
    assert_eq!(encode_fixed_float(0.3, 3), 2);
    assert_eq!(encode_fixed_float(-0.3, 3), -2);
}

#[test]
fn test_fixed_float_precision_scale() {
    assert_eq!(encode_fixed_float(1.5, 6), 96);
    assert_eq!(decode_fixed_float(96, 6), 1.5);
    assert_eq!(decode_fixed_float(-20, 3), -2.5);
}
