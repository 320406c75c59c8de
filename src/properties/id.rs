//! # Property Identity
//!
//! A [`PropertyId`] packs a kind discriminant and up to four parameters into 64 bits.
//!
//! ```text
//! 63            53 52                                                   0
//! [ kind: 11 bits ][ params: 53 bits, packed downward from bit 53       ]
//! ```
//!
//! The kind doubles as the index into the metadata table, so
//! [`PropertyId::index`] is a single shift.
//!
//! ## Wire Forms
//! - Archives: the id is byte-swapped, then varint encoded. The kind lands in the two
//!   low bytes, so ids without params never take more than three varint bytes.
//! - Change messages: all 64 bits are reversed.

use crate::core::archive::Archive;
use crate::core::serializer::Transfer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bits reserved for the kind discriminant
pub const KIND_BITS: u32 = 11;
/// Bits available to params
pub const PARAM_BITS: u32 = 64 - KIND_BITS;
/// Highest kind discriminant that fits in an id
pub const MAX_KIND: u16 = (1 << KIND_BITS) - 1;
/// Mask selecting the param bits of a raw id
pub const PARAM_MASK: u64 = (1 << PARAM_BITS) - 1;
/// Maximum number of params a kind may declare
pub const MAX_PARAM_COUNT: usize = 4;

/// Dense property kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PropertyEnum(pub u16);

impl PropertyEnum {
    pub const RANK: PropertyEnum = PropertyEnum(0);
    pub const ITEM_RARITY: PropertyEnum = PropertyEnum(1);
    pub const FLAGGED: PropertyEnum = PropertyEnum(2);
    pub const HEALTH: PropertyEnum = PropertyEnum(3);
    pub const HEALTH_MAX: PropertyEnum = PropertyEnum(4);
    pub const MOVEMENT_SPEED: PropertyEnum = PropertyEnum(5);
    pub const POWER_RANK: PropertyEnum = PropertyEnum(6);
    pub const DAMAGE_BONUS_VS: PropertyEnum = PropertyEnum(7);
    pub const EXPERIENCE: PropertyEnum = PropertyEnum(8);
    pub const TRANSFER_TOKEN: PropertyEnum = PropertyEnum(9);
    pub const AI_AGGRO_COUNT: PropertyEnum = PropertyEnum(10);

    /// Number of built-in kinds
    pub const BUILTIN_COUNT: usize = 11;

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PropertyEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind plus packed params
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PropertyId(u64);

impl PropertyId {
    /// Id for `kind` with every param zero
    #[inline]
    pub const fn new(kind: PropertyEnum) -> Self {
        Self(((kind.0 & MAX_KIND) as u64) << PARAM_BITS)
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn kind(self) -> PropertyEnum {
        PropertyEnum((self.0 >> PARAM_BITS) as u16)
    }

    /// Metadata table index, derived arithmetically
    #[inline]
    pub const fn index(self) -> usize {
        (self.0 >> PARAM_BITS) as usize
    }

    /// Packed param bits
    #[inline]
    pub const fn params_raw(self) -> u64 {
        self.0 & PARAM_MASK
    }

    pub const fn has_params(self) -> bool {
        self.params_raw() != 0
    }

    /// Byte-swapped form used inside archives
    #[inline]
    pub const fn to_wire(self) -> u64 {
        self.0.swap_bytes()
    }

    #[inline]
    pub const fn from_wire(wire: u64) -> Self {
        Self(wire.swap_bytes())
    }

    /// Bit-reversed form used by change messages
    #[inline]
    pub const fn to_change_id(self) -> u64 {
        self.0.reverse_bits()
    }

    #[inline]
    pub const fn from_change_id(change_id: u64) -> Self {
        Self(change_id.reverse_bits())
    }
}

impl From<PropertyEnum> for PropertyId {
    fn from(kind: PropertyEnum) -> Self {
        PropertyId::new(kind)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_params() {
            write!(f, "{}[{:#x}]", self.kind(), self.params_raw())
        } else {
            write!(f, "{}", self.kind())
        }
    }
}

impl Transfer for PropertyId {
    fn transfer(archive: &mut Archive, value: &mut PropertyId) -> bool {
        let mut wire = value.to_wire();
        let success = u64::transfer(archive, &mut wire);
        if archive.is_unpacking() && success {
            *value = PropertyId::from_wire(wire);
        }
        success
    }
}
