//! # Serializer
//!
//! One `transfer` routine per field shape, shared by packing and unpacking.
//!
//! ## Shapes
//! | Shape | Wire form |
//! |-------|-----------|
//! | `bool` | bit-packed, up to 5 per byte |
//! | `u8` | raw byte |
//! | `u16` / `u32` / `u64` | varint |
//! | `i32` / `i64` | zigzag varint |
//! | `f32` | IEEE bits as varint |
//! | `String` | varint byte length + UTF-8 |
//! | `Vector3` | three `f32` |
//! | fixed float / vector / orientation | `truncate(f * 2^precision)` zigzag varints |
//! | list | varint count + elements |
//! | nested object | inlined fields, size-framed in persistent archives |
//!
//! Record types call these in their declared field order and AND the results together
//! without short-circuiting, so every field is visited even after a failure.
//!
//! ## Example
//! ```rust
//! use replica_archive::core::archive::{Archive, SerializeContext, VisibilityPolicy};
//! use replica_archive::core::serializer::{transfer, Serializable};
//!
//! #[derive(Default)]
//! struct Waypoint {
//!     id: u32,
//!     name: String,
//!     active: bool,
//! }
//!
//! impl Serializable for Waypoint {
//!     fn serialize(&mut self, archive: &mut Archive) -> bool {
//!         let mut success = true;
//!         success &= transfer(archive, &mut self.id);
//!         success &= transfer(archive, &mut self.name);
//!         success &= transfer(archive, &mut self.active);
//!         success
//!     }
//! }
//!
//! let mut out = Waypoint { id: 7, name: "gate".into(), active: true };
//! let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::NONE);
//! assert!(out.serialize(&mut archive));
//!
//! let mut back = Waypoint::default();
//! let mut archive = Archive::unpacking(SerializeContext::Replication, archive.to_bytes()).unwrap();
//! assert!(back.serialize(&mut archive));
//! assert_eq!(back.name, "gate");
//! ```

use crate::core::archive::Archive;
use crate::core::varint::{decode_fixed_float, encode_fixed_float, zigzag_decode, zigzag_encode};
use crate::core::vector::{Orientation, Vector3};
use crate::error::ArchiveError;

/// A value shape the archive knows how to move in both directions
pub trait Transfer {
    fn transfer(archive: &mut Archive, value: &mut Self) -> bool;
}

/// A composite type that walks its own fields against an archive
pub trait Serializable {
    fn serialize(&mut self, archive: &mut Archive) -> bool;
}

/// Transfer a single value
#[inline]
pub fn transfer<T: Transfer + ?Sized>(archive: &mut Archive, value: &mut T) -> bool {
    T::transfer(archive, value)
}

fn read_u64(archive: &mut Archive) -> Option<u64> {
    let mut raw = 0u64;
    archive.read_varint(&mut raw).then_some(raw)
}

impl Transfer for bool {
    fn transfer(archive: &mut Archive, value: &mut bool) -> bool {
        archive.transfer_bool(value)
    }
}

impl Transfer for u8 {
    fn transfer(archive: &mut Archive, value: &mut u8) -> bool {
        if archive.is_packing() {
            archive.write_byte(*value)
        } else {
            archive.read_byte(value)
        }
    }
}

impl Transfer for u16 {
    fn transfer(archive: &mut Archive, value: &mut u16) -> bool {
        if archive.is_packing() {
            return archive.write_varint(u64::from(*value));
        }
        match read_u64(archive) {
            Some(raw) => {
                *value = raw as u16;
                true
            }
            None => false,
        }
    }
}

impl Transfer for u32 {
    fn transfer(archive: &mut Archive, value: &mut u32) -> bool {
        if archive.is_packing() {
            return archive.write_varint(u64::from(*value));
        }
        // 32-bit reads accept a 64-bit varint and keep the low bits
        match read_u64(archive) {
            Some(raw) => {
                *value = raw as u32;
                true
            }
            None => false,
        }
    }
}

impl Transfer for u64 {
    fn transfer(archive: &mut Archive, value: &mut u64) -> bool {
        if archive.is_packing() {
            archive.write_varint(*value)
        } else {
            archive.read_varint(value)
        }
    }
}

impl Transfer for i32 {
    fn transfer(archive: &mut Archive, value: &mut i32) -> bool {
        if archive.is_packing() {
            return archive.write_varint(zigzag_encode(i64::from(*value)));
        }
        match read_u64(archive) {
            Some(raw) => {
                *value = zigzag_decode(u64::from(raw as u32)) as i32;
                true
            }
            None => false,
        }
    }
}

impl Transfer for i64 {
    fn transfer(archive: &mut Archive, value: &mut i64) -> bool {
        if archive.is_packing() {
            return archive.write_varint(zigzag_encode(*value));
        }
        match read_u64(archive) {
            Some(raw) => {
                *value = zigzag_decode(raw);
                true
            }
            None => false,
        }
    }
}

impl Transfer for f32 {
    fn transfer(archive: &mut Archive, value: &mut f32) -> bool {
        let mut bits = value.to_bits();
        let success = u32::transfer(archive, &mut bits);
        if archive.is_unpacking() && success {
            *value = f32::from_bits(bits);
        }
        success
    }
}

impl Transfer for String {
    fn transfer(archive: &mut Archive, value: &mut String) -> bool {
        if archive.is_packing() {
            let len = match u32::try_from(value.len()) {
                Ok(len) => len,
                Err(_) => {
                    return archive.fail(ArchiveError::LengthLimit {
                        len: value.len() as u64,
                        max: u64::from(u32::MAX),
                    })
                }
            };
            let mut success = archive.write_varint(u64::from(len));
            success &= archive.write_bytes(value.as_bytes());
            return success;
        }

        let mut len = 0u32;
        if !u32::transfer(archive, &mut len) {
            return false;
        }

        let max = archive.limits().max_string_len;
        if len > max {
            return archive.fail(ArchiveError::LengthLimit {
                len: u64::from(len),
                max: u64::from(max),
            });
        }

        let start = archive.offset();
        let Some(bytes) = archive.read_bytes(len as usize) else {
            return false;
        };
        match std::str::from_utf8(&bytes) {
            Ok(text) => {
                value.clear();
                value.push_str(text);
                true
            }
            Err(_) => archive.fail(ArchiveError::InvalidString(start)),
        }
    }
}

impl Transfer for Vector3 {
    fn transfer(archive: &mut Archive, value: &mut Vector3) -> bool {
        let mut x = value.x.to_bits();
        let mut y = value.y.to_bits();
        let mut z = value.z.to_bits();

        let mut success = true;
        success &= u32::transfer(archive, &mut x);
        success &= u32::transfer(archive, &mut y);
        success &= u32::transfer(archive, &mut z);

        if archive.is_unpacking() && success {
            *value = Vector3::new(f32::from_bits(x), f32::from_bits(y), f32::from_bits(z));
        }
        success
    }
}

fn transfer_fixed_component(archive: &mut Archive, value: &mut f32, precision: i32) -> bool {
    if archive.is_packing() {
        return archive.write_varint(zigzag_encode(encode_fixed_float(*value, precision)));
    }
    match read_u64(archive) {
        Some(raw) => {
            *value = decode_fixed_float(zigzag_decode(raw), precision);
            true
        }
        None => false,
    }
}

/// Transfer one float at a fixed precision (`truncate(f * 2^precision)`)
pub fn transfer_float_fixed(archive: &mut Archive, value: &mut f32, precision: i32) -> bool {
    transfer_fixed_component(archive, value, precision)
}

/// Transfer a vector as three fixed-precision floats
pub fn transfer_vector_fixed(archive: &mut Archive, value: &mut Vector3, precision: i32) -> bool {
    let mut decoded = *value;

    let mut success = true;
    success &= transfer_fixed_component(archive, &mut decoded.x, precision);
    success &= transfer_fixed_component(archive, &mut decoded.y, precision);
    success &= transfer_fixed_component(archive, &mut decoded.z, precision);

    if archive.is_unpacking() && success {
        *value = decoded;
    }
    success
}

/// Transfer an orientation as one (yaw only) or three fixed-precision floats.
///
/// A yaw-only read leaves pitch and roll untouched.
pub fn transfer_orientation_fixed(
    archive: &mut Archive,
    value: &mut Orientation,
    yaw_only: bool,
    precision: i32,
) -> bool {
    let mut decoded = *value;

    let mut success = transfer_fixed_component(archive, &mut decoded.yaw, precision);
    if !yaw_only {
        success &= transfer_fixed_component(archive, &mut decoded.pitch, precision);
        success &= transfer_fixed_component(archive, &mut decoded.roll, precision);
    }

    if archive.is_unpacking() && success {
        *value = decoded;
    }
    success
}

fn transfer_list_count(archive: &mut Archive, len: usize, count: &mut u32) -> bool {
    if archive.is_packing() {
        *count = match u32::try_from(len) {
            Ok(count) => count,
            Err(_) => {
                return archive.fail(ArchiveError::LengthLimit {
                    len: len as u64,
                    max: u64::from(u32::MAX),
                })
            }
        };
        return u32::transfer(archive, count);
    }

    if !u32::transfer(archive, count) {
        return false;
    }
    let max = archive.limits().max_list_len;
    if *count > max {
        return archive.fail(ArchiveError::LengthLimit {
            len: u64::from(*count),
            max: u64::from(max),
        });
    }
    true
}

/// Transfer a homogeneous list: varint count, then each element in order
pub fn transfer_list<T: Transfer + Default>(archive: &mut Archive, values: &mut Vec<T>) -> bool {
    let mut count = 0u32;
    if !transfer_list_count(archive, values.len(), &mut count) {
        return false;
    }

    let mut success = true;
    if archive.is_packing() {
        for value in values.iter_mut() {
            success &= T::transfer(archive, value);
        }
    } else {
        values.clear();
        values.reserve(count as usize);
        for _ in 0..count {
            let mut value = T::default();
            success &= T::transfer(archive, &mut value);
            values.push(value);
        }
    }
    success
}

/// Transfer a nested object against the same archive.
///
/// Persistent archives wrap the object in a 4-byte size frame.
pub fn transfer_object<T: Serializable + ?Sized>(archive: &mut Archive, object: &mut T) -> bool {
    let (frame, mut success) = archive.begin_object();
    success &= object.serialize(archive);
    success &= archive.end_object(frame, false);
    success
}

/// Transfer a list of nested objects
pub fn transfer_object_list<T: Serializable + Default>(
    archive: &mut Archive,
    objects: &mut Vec<T>,
) -> bool {
    let mut count = 0u32;
    if !transfer_list_count(archive, objects.len(), &mut count) {
        return false;
    }

    let mut success = true;
    if archive.is_packing() {
        for object in objects.iter_mut() {
            success &= transfer_object(archive, object);
        }
    } else {
        objects.clear();
        objects.reserve(count as usize);
        for _ in 0..count {
            let mut object = T::default();
            success &= transfer_object(archive, &mut object);
            objects.push(object);
        }
    }
    success
}

/// Skip a size-framed nested object while unpacking
pub fn skip_object(archive: &mut Archive) -> bool {
    archive.skip_object()
}
