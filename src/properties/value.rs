//! # Property Values
//!
//! The closed set of typed values a property can hold, and their wire transforms.
//!
//! | Variant | In memory | Wire bits |
//! |---------|-----------|-----------|
//! | `Boolean` | `bool` | low bit |
//! | `Integer` | `i64` | zigzag |
//! | `EnumReference` | stable [`ContentRef`] | content table enum index |
//! | `Raw` | `u64` | passthrough |
//!
//! Enum references are translated through an injected [`ContentResolver`]; the wire
//! index is never treated as the content identifier itself.

use crate::core::archive::Archive;
use crate::core::serializer::Transfer;
use crate::core::varint::{zigzag_decode, zigzag_encode};
use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Declared value type of a property kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyDataType {
    Boolean,
    Integer,
    EnumReference,
    Raw,
}

impl PropertyDataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            PropertyDataType::Boolean => "boolean",
            PropertyDataType::Integer => "integer",
            PropertyDataType::EnumReference => "enum reference",
            PropertyDataType::Raw => "raw",
        }
    }
}

impl fmt::Display for PropertyDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a piece of game content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ContentRef(pub u64);

impl ContentRef {
    pub const INVALID: ContentRef = ContentRef(0);

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Read-only translation between content references and their wire enum indices.
///
/// Index 0 always stands for [`ContentRef::INVALID`].
pub trait ContentResolver: Send + Sync {
    fn enum_index(&self, content: ContentRef) -> Option<u32>;

    fn content_ref(&self, index: u32) -> Option<ContentRef>;

    /// Human readable name, if known
    fn name(&self, content: ContentRef) -> Option<&str>;
}

/// In-memory [`ContentResolver`] built once at startup
#[derive(Debug, Clone)]
pub struct ContentTable {
    refs: Vec<ContentRef>,
    names: Vec<String>,
    indices: HashMap<ContentRef, u32>,
}

impl ContentTable {
    pub fn new() -> Self {
        let mut indices = HashMap::new();
        indices.insert(ContentRef::INVALID, 0);
        Self {
            refs: vec![ContentRef::INVALID],
            names: vec![String::from("<invalid>")],
            indices,
        }
    }

    /// Register a content reference and return its enum index
    pub fn register(&mut self, content: ContentRef, name: impl Into<String>) -> Result<u32> {
        if self.indices.contains_key(&content) {
            return Err(ArchiveError::DuplicateContent(content.0));
        }
        let index = u32::try_from(self.refs.len())
            .map_err(|_| ArchiveError::Registry("Content table is full"))?;
        self.refs.push(content);
        self.names.push(name.into());
        self.indices.insert(content, index);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Only the reserved invalid entry is present
    pub fn is_empty(&self) -> bool {
        self.refs.len() <= 1
    }
}

impl Default for ContentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentResolver for ContentTable {
    fn enum_index(&self, content: ContentRef) -> Option<u32> {
        self.indices.get(&content).copied()
    }

    fn content_ref(&self, index: u32) -> Option<ContentRef> {
        self.refs.get(index as usize).copied()
    }

    fn name(&self, content: ContentRef) -> Option<&str> {
        self.indices
            .get(&content)
            .and_then(|&index| self.names.get(index as usize))
            .map(String::as_str)
    }
}

/// Transfer a content reference as its enum index.
///
/// Unknown references pack as 0; unknown indices unpack as [`ContentRef::INVALID`].
pub fn transfer_content_ref(
    archive: &mut Archive,
    value: &mut ContentRef,
    content: &dyn ContentResolver,
) -> bool {
    let mut index = if archive.is_packing() {
        content.enum_index(*value).unwrap_or(0)
    } else {
        0
    };
    let success = u32::transfer(archive, &mut index);
    if archive.is_unpacking() && success {
        *value = content.content_ref(index).unwrap_or(ContentRef::INVALID);
    }
    success
}

/// A typed property value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    EnumReference(ContentRef),
    Raw(u64),
}

impl PropertyValue {
    /// Zero value of a data type
    pub const fn zero(data_type: PropertyDataType) -> Self {
        match data_type {
            PropertyDataType::Boolean => PropertyValue::Boolean(false),
            PropertyDataType::Integer => PropertyValue::Integer(0),
            PropertyDataType::EnumReference => PropertyValue::EnumReference(ContentRef::INVALID),
            PropertyDataType::Raw => PropertyValue::Raw(0),
        }
    }

    pub const fn data_type(&self) -> PropertyDataType {
        match self {
            PropertyValue::Boolean(_) => PropertyDataType::Boolean,
            PropertyValue::Integer(_) => PropertyDataType::Integer,
            PropertyValue::EnumReference(_) => PropertyDataType::EnumReference,
            PropertyValue::Raw(_) => PropertyDataType::Raw,
        }
    }

    /// Untyped 64-bit payload, as stored in memory and in migration archives
    pub const fn raw(&self) -> u64 {
        match *self {
            PropertyValue::Boolean(value) => value as u64,
            PropertyValue::Integer(value) => value as u64,
            PropertyValue::EnumReference(content) => content.0,
            PropertyValue::Raw(bits) => bits,
        }
    }

    /// Rebuild a value from its untyped payload
    pub const fn from_raw(raw: u64, data_type: PropertyDataType) -> Self {
        match data_type {
            PropertyDataType::Boolean => PropertyValue::Boolean(raw != 0),
            PropertyDataType::Integer => PropertyValue::Integer(raw as i64),
            PropertyDataType::EnumReference => PropertyValue::EnumReference(ContentRef(raw)),
            PropertyDataType::Raw => PropertyValue::Raw(raw),
        }
    }

    /// Bits written into replication and database archives
    pub fn to_wire_bits(&self, content: &dyn ContentResolver) -> u64 {
        match *self {
            PropertyValue::Boolean(value) => u64::from(value),
            PropertyValue::Integer(value) => zigzag_encode(value),
            PropertyValue::EnumReference(reference) => {
                u64::from(content.enum_index(reference).unwrap_or(0))
            }
            PropertyValue::Raw(bits) => bits,
        }
    }

    /// Inverse of [`PropertyValue::to_wire_bits`]
    pub fn from_wire_bits(
        bits: u64,
        data_type: PropertyDataType,
        content: &dyn ContentResolver,
    ) -> Self {
        match data_type {
            PropertyDataType::Boolean => PropertyValue::Boolean(bits & 1 != 0),
            PropertyDataType::Integer => PropertyValue::Integer(zigzag_decode(bits)),
            PropertyDataType::EnumReference => {
                let reference = u32::try_from(bits)
                    .ok()
                    .and_then(|index| content.content_ref(index))
                    .unwrap_or(ContentRef::INVALID);
                PropertyValue::EnumReference(reference)
            }
            PropertyDataType::Raw => PropertyValue::Raw(bits),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            PropertyValue::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            PropertyValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_content_ref(&self) -> Option<ContentRef> {
        match *self {
            PropertyValue::EnumReference(content) => Some(content),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<u64> {
        match *self {
            PropertyValue::Raw(bits) => Some(bits),
            _ => None,
        }
    }

    /// Raw payload read as an `f32`
    pub fn as_f32(&self) -> Option<f32> {
        self.as_raw().map(|bits| f32::from_bits(bits as u32))
    }

    /// Render the decoded value, naming content references through `content`
    pub fn display<'a>(&'a self, content: &'a dyn ContentResolver) -> ValueDisplay<'a> {
        ValueDisplay {
            value: self,
            content: Some(content),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Integer(i64::from(value))
    }
}

impl From<ContentRef> for PropertyValue {
    fn from(value: ContentRef) -> Self {
        PropertyValue::EnumReference(value)
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        PropertyValue::Raw(u64::from(value.to_bits()))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display = ValueDisplay {
            value: self,
            content: None,
        };
        fmt::Display::fmt(&display, f)
    }
}

/// Display adaptor returned by [`PropertyValue::display`]
pub struct ValueDisplay<'a> {
    value: &'a PropertyValue,
    content: Option<&'a dyn ContentResolver>,
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.value {
            PropertyValue::Boolean(value) => write!(f, "{value}"),
            PropertyValue::Integer(value) => write!(f, "{value}"),
            PropertyValue::EnumReference(reference) => {
                match self.content.and_then(|content| content.name(reference)) {
                    Some(name) => f.write_str(name),
                    None => write!(f, "{reference}"),
                }
            }
            PropertyValue::Raw(bits) => write!(f, "{bits:#x}"),
        }
    }
}
