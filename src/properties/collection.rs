//! # Property Collection
//!
//! Map from [`PropertyId`] to [`PropertyValue`] owned by one entity.
//!
//! Only non-default values are stored: setting a property to its kind's default removes
//! the entry, and reading an absent property yields the default. Entries keep their
//! insertion order so packing is deterministic.
//!
//! ## Archive Layout
//! ```text
//! [count: u32 LE, patched after packing]
//! [id: byte-swapped varint][value] x count
//! ```
//!
//! | Context | Entries written | Value form |
//! |---------|-----------------|------------|
//! | Replication | kind policy intersects the archive mask | wire bits |
//! | Database | database policy is not `None` | wire bits |
//! | Migration | persisted or replicate-for-transfer kinds | raw payload, zigzag |

use crate::core::archive::{Archive, SerializeContext, UNENCODED_U32_LEN};
use crate::core::serializer::{transfer, Serializable};
use crate::error::{ArchiveError, Result};
use crate::properties::id::{PropertyEnum, PropertyId};
use crate::properties::info::{DatabasePolicy, PropertyInfo, PropertyRegistry};
use crate::properties::value::{ContentRef, PropertyValue};
use crate::utils::metrics::global_metrics;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Smallest encoded size of one entry (id varint + value varint)
const MIN_ENTRY_LEN: u64 = 2;

/// Typed property storage for one entity
#[derive(Clone)]
pub struct PropertyCollection {
    registry: Arc<PropertyRegistry>,
    entries: Vec<(PropertyId, PropertyValue)>,
    index: HashMap<PropertyId, usize>,
}

impl PropertyCollection {
    pub fn new(registry: Arc<PropertyRegistry>) -> Self {
        Self {
            registry,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    /// Number of stored (non-default) entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, PropertyValue)> + '_ {
        self.entries.iter().copied()
    }

    fn info(&self, id: PropertyId) -> Result<&PropertyInfo> {
        self.registry
            .infos()
            .info(id)
            .ok_or(ArchiveError::UnregisteredKind(id.kind().0))
    }

    /// Stored value or the kind's default
    pub fn get(&self, id: impl Into<PropertyId>) -> Result<PropertyValue> {
        let id = id.into();
        let info = self.info(id)?;
        Ok(self.base_value(id).unwrap_or_else(|| info.default_value()))
    }

    fn get_typed<T>(
        &self,
        id: PropertyId,
        expected: &'static str,
        extract: impl Fn(&PropertyValue) -> Option<T>,
    ) -> Result<T> {
        let value = self.get(id)?;
        extract(&value).ok_or(ArchiveError::TypeMismatch {
            kind: id.kind().0,
            expected,
            actual: value.data_type().as_str(),
        })
    }

    pub fn get_bool(&self, id: impl Into<PropertyId>) -> Result<bool> {
        self.get_typed(id.into(), "boolean", PropertyValue::as_bool)
    }

    pub fn get_integer(&self, id: impl Into<PropertyId>) -> Result<i64> {
        self.get_typed(id.into(), "integer", PropertyValue::as_integer)
    }

    pub fn get_content_ref(&self, id: impl Into<PropertyId>) -> Result<ContentRef> {
        self.get_typed(id.into(), "enum reference", PropertyValue::as_content_ref)
    }

    pub fn get_f32(&self, id: impl Into<PropertyId>) -> Result<f32> {
        self.get_typed(id.into(), "raw", PropertyValue::as_f32)
    }

    /// Stored value without the default fallback
    pub fn base_value(&self, id: impl Into<PropertyId>) -> Option<PropertyValue> {
        self.index
            .get(&id.into())
            .map(|&position| self.entries[position].1)
    }

    pub fn contains(&self, id: impl Into<PropertyId>) -> bool {
        self.index.contains_key(&id.into())
    }

    /// Any entry of `kind`, whatever its params
    pub fn has_kind(&self, kind: PropertyEnum) -> bool {
        self.entries.iter().any(|(id, _)| id.kind() == kind)
    }

    /// Set a value, checking it against the kind's declared type.
    ///
    /// Returns whether the stored state changed.
    pub fn set(&mut self, id: impl Into<PropertyId>, value: impl Into<PropertyValue>) -> Result<bool> {
        let id = id.into();
        let value = value.into();
        let info = self.info(id)?;
        if value.data_type() != info.data_type() {
            return Err(ArchiveError::TypeMismatch {
                kind: id.kind().0,
                expected: info.data_type().as_str(),
                actual: value.data_type().as_str(),
            });
        }
        let default = info.default_value();
        Ok(self.store(id, value, default))
    }

    /// Store without type checks; a default value removes the entry
    pub(crate) fn store(&mut self, id: PropertyId, value: PropertyValue, default: PropertyValue) -> bool {
        if value.raw() == default.raw() {
            return self.remove_entry(id);
        }

        match self.index.get(&id) {
            Some(&position) => {
                let slot = &mut self.entries[position].1;
                if slot.raw() == value.raw() {
                    return false;
                }
                *slot = value;
            }
            None => {
                self.index.insert(id, self.entries.len());
                self.entries.push((id, value));
            }
        }
        true
    }

    fn remove_entry(&mut self, id: PropertyId) -> bool {
        let Some(position) = self.index.remove(&id) else {
            return false;
        };
        self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        true
    }

    pub fn remove(&mut self, id: impl Into<PropertyId>) -> bool {
        self.remove_entry(id.into())
    }

    /// Ids of every stored entry of `kind`
    pub fn ids_in_range(&self, kind: PropertyEnum) -> Vec<PropertyId> {
        self.entries
            .iter()
            .filter(|(id, _)| id.kind() == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Remove every entry of `kind` regardless of params
    pub fn remove_property_range(&mut self, kind: PropertyEnum) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| id.kind() != kind);
        if self.entries.len() == before {
            return false;
        }
        self.rebuild_index();
        true
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (position, (id, _)) in self.entries.iter().enumerate() {
            self.index.insert(*id, position);
        }
    }

    pub fn num_properties_in_range(&self, kind: PropertyEnum) -> usize {
        self.entries.iter().filter(|(id, _)| id.kind() == kind).count()
    }

    /// Copy every entry of `kind` from `source`; returns how many changed
    pub fn copy_property_range(&mut self, source: &PropertyCollection, kind: PropertyEnum) -> Result<usize> {
        let mut changed = 0;
        for (id, value) in source.iter().filter(|(id, _)| id.kind() == kind) {
            if self.set(id, value)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Add `delta` to an integer property; returns the new value
    pub fn adjust_integer(&mut self, id: impl Into<PropertyId>, delta: i64) -> Result<i64> {
        let id = id.into();
        let current = self.get_integer(id)?;
        if delta == 0 {
            return Ok(current);
        }
        let updated = current.wrapping_add(delta);
        self.set(id, updated)?;
        Ok(updated)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Detached copy of the stored entries
    pub fn snapshot(&self) -> Vec<(PropertyId, PropertyValue)> {
        self.entries.clone()
    }

    /// `(raw id, raw value)` of entries that move with the entity but are never stored
    pub fn properties_for_migration(&self) -> Vec<(u64, u64)> {
        self.entries
            .iter()
            .filter(|(id, _)| {
                self.registry.infos().info(*id).is_some_and(|info| {
                    info.database_policy() == DatabasePolicy::None && info.replicates_for_transfer()
                })
            })
            .map(|(id, value)| (id.raw(), value.raw()))
            .collect()
    }

    fn include_for_packing(
        &self,
        archive: &Archive,
        info: &PropertyInfo,
        id: PropertyId,
        value: PropertyValue,
        defaults: Option<&PropertyCollection>,
    ) -> bool {
        match archive.context() {
            SerializeContext::Database => info.is_persisted(),
            SerializeContext::Migration => info.is_persisted() || info.replicates_for_transfer(),
            SerializeContext::Replication => {
                if !info.replication_policy().intersects(archive.policy()) {
                    return false;
                }
                !defaults
                    .and_then(|defaults| defaults.base_value(id))
                    .is_some_and(|base| base.raw() == value.raw())
            }
        }
    }

    /// Transfer the collection, skipping entries equal to `defaults` in replication
    pub fn serialize_with_default(
        &mut self,
        archive: &mut Archive,
        defaults: Option<&PropertyCollection>,
    ) -> bool {
        if archive.is_packing() {
            self.pack(archive, defaults)
        } else {
            self.unpack(archive)
        }
    }

    fn pack(&self, archive: &mut Archive, defaults: Option<&PropertyCollection>) -> bool {
        let count_offset = archive.offset();
        let mut success = archive.write_unencoded_u32(0);

        let content = self.registry.content();
        let mut written = 0u32;
        for &(id, value) in &self.entries {
            let Some(info) = self.registry.infos().info(id) else {
                success &= archive.fail(ArchiveError::UnregisteredKind(id.kind().0));
                continue;
            };
            if !self.include_for_packing(archive, info, id, value, defaults) {
                continue;
            }

            let mut wire_id = id;
            success &= transfer(archive, &mut wire_id);
            if archive.is_migration() {
                let mut raw = value.raw() as i64;
                success &= transfer(archive, &mut raw);
            } else {
                let mut bits = value.to_wire_bits(content);
                success &= transfer(archive, &mut bits);
            }
            written += 1;
        }

        success &= archive.patch_unencoded_u32(count_offset, written);
        success
    }

    fn unpack(&mut self, archive: &mut Archive) -> bool {
        let mut count = 0u32;
        if !archive.read_unencoded_u32(&mut count) {
            return false;
        }

        let max = archive.limits().max_property_count;
        if count > max {
            return archive.fail(ArchiveError::LengthLimit {
                len: u64::from(count),
                max: u64::from(max),
            });
        }
        let remaining = archive.remaining() as u64;
        if u64::from(count) * MIN_ENTRY_LEN > remaining {
            return archive.fail(ArchiveError::LengthLimit {
                len: u64::from(count) * MIN_ENTRY_LEN,
                max: remaining,
            });
        }

        let registry = Arc::clone(&self.registry);
        let mut success = true;
        let mut first_unknown: Option<u16> = None;

        for _ in 0..count {
            let mut id = PropertyId::default();
            success &= transfer(archive, &mut id);

            let info = registry.infos().info(id);
            let value = if archive.is_migration() {
                let mut raw = 0i64;
                success &= transfer(archive, &mut raw);
                info.map(|info| PropertyValue::from_raw(raw as u64, info.data_type()))
            } else {
                let mut bits = 0u64;
                success &= transfer(archive, &mut bits);
                info.map(|info| PropertyValue::from_wire_bits(bits, info.data_type(), registry.content()))
            };

            if !success {
                break;
            }

            match (info, value) {
                (Some(info), Some(value)) => {
                    self.store(id, value, info.default_value());
                }
                _ => {
                    warn!(kind = id.kind().0, offset = archive.offset(), "Dropped property of unregistered kind");
                    global_metrics().property_dropped();
                    first_unknown.get_or_insert(id.kind().0);
                }
            }
        }

        if let Some(kind) = first_unknown {
            success &= archive.fail(ArchiveError::UnregisteredKind(kind));
        }

        debug!(count, context = %archive.context(), "Unpacked property collection");
        success
    }

    /// Bytes the count prefix occupies
    pub const fn count_prefix_len() -> usize {
        UNENCODED_U32_LEN
    }
}

impl Serializable for PropertyCollection {
    fn serialize(&mut self, archive: &mut Archive) -> bool {
        self.serialize_with_default(archive, None)
    }
}

impl PartialEq for PropertyCollection {
    /// Same entries, ignoring insertion order
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(id, value)| other.base_value(*id).is_some_and(|v| v.raw() == value.raw()))
    }
}

impl fmt::Display for PropertyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = self.registry.content();
        f.write_str("[")?;
        for (position, (id, value)) in self.entries.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            match self.registry.infos().info(*id) {
                Some(info) => write!(f, "{}: {}", info.format_id(*id), value.display(content))?,
                None => write!(f, "{id}: {value}")?,
            }
        }
        f.write_str("]")
    }
}

impl fmt::Debug for PropertyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCollection")
            .field("entries", &self.entries)
            .finish()
    }
}
