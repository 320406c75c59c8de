//! # Replicated Property Collection
//!
//! A [`PropertyCollection`] with a replication id shared with its remote mirrors.
//!
//! Replication archives carry the id in front of the entries. While the collection is
//! bound, every change is journaled; [`ReplicatedPropertyCollection::take_messages`]
//! turns the journal into set/remove messages for interested mirrors, which apply them
//! with [`ReplicatedPropertyCollection::apply`].
//!
//! Change messages carry the property id with all 64 bits reversed, unlike archives,
//! which reverse bytes.

use crate::core::archive::{Archive, VisibilityPolicy};
use crate::core::serializer::{transfer, Serializable};
use crate::error::{constants, ArchiveError, Result};
use crate::properties::collection::PropertyCollection;
use crate::properties::id::{PropertyEnum, PropertyId};
use crate::properties::info::PropertyRegistry;
use crate::properties::value::PropertyValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Reserved id of an unbound collection
pub const INVALID_REPLICATION_ID: u64 = 0;

/// Hands out replication ids, never reusing one
#[derive(Debug)]
pub struct ReplicationIdAllocator {
    next: AtomicU64,
}

impl ReplicationIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(INVALID_REPLICATION_ID + 1),
        }
    }

    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Next id that would be handed out
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for ReplicationIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// One journaled mutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyChange {
    Set { id: PropertyId, value: PropertyValue },
    Remove { id: PropertyId },
}

/// New value for one property of a mirrored collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetPropertyMessage {
    pub replication_id: u64,
    /// Bit-reversed property id
    pub property_id: u64,
    pub value_bits: u64,
}

/// Removal of one property from a mirrored collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemovePropertyMessage {
    pub replication_id: u64,
    /// Bit-reversed property id
    pub property_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationMessage {
    Set(SetPropertyMessage),
    Remove(RemovePropertyMessage),
}

impl ReplicationMessage {
    pub fn replication_id(&self) -> u64 {
        match self {
            ReplicationMessage::Set(message) => message.replication_id,
            ReplicationMessage::Remove(message) => message.replication_id,
        }
    }

    pub fn property_id(&self) -> PropertyId {
        match self {
            ReplicationMessage::Set(message) => PropertyId::from_change_id(message.property_id),
            ReplicationMessage::Remove(message) => PropertyId::from_change_id(message.property_id),
        }
    }
}

/// Property collection mirrored to remote clients
pub struct ReplicatedPropertyCollection {
    inner: PropertyCollection,
    replication_id: u64,
    allocator: Option<Arc<ReplicationIdAllocator>>,
    interest: VisibilityPolicy,
    journal: Vec<PropertyChange>,
}

impl ReplicatedPropertyCollection {
    pub fn new(registry: Arc<PropertyRegistry>) -> Self {
        Self {
            inner: PropertyCollection::new(registry),
            replication_id: INVALID_REPLICATION_ID,
            allocator: None,
            interest: VisibilityPolicy::NONE,
            journal: Vec::new(),
        }
    }

    pub fn replication_id(&self) -> u64 {
        self.replication_id
    }

    pub fn is_bound(&self) -> bool {
        self.replication_id != INVALID_REPLICATION_ID && self.allocator.is_some()
    }

    pub fn interest(&self) -> VisibilityPolicy {
        self.interest
    }

    /// Assign a replication id and start journaling changes on `interest`.
    ///
    /// Binding again to the same allocator keeps the current id.
    pub fn bind(
        &mut self,
        allocator: &Arc<ReplicationIdAllocator>,
        interest: VisibilityPolicy,
    ) -> Result<u64> {
        if let Some(current) = &self.allocator {
            if Arc::ptr_eq(current, allocator) {
                return Ok(self.replication_id);
            }
            warn!(replication_id = self.replication_id, "Collection is already bound");
            return Err(ArchiveError::AlreadyBound(self.replication_id));
        }

        self.replication_id = allocator.allocate();
        self.allocator = Some(Arc::clone(allocator));
        self.interest = interest;
        debug!(replication_id = self.replication_id, interest = interest.bits(), "Bound replicated collection");
        Ok(self.replication_id)
    }

    /// Adopt an id assigned elsewhere, as a mirror does. Does not journal.
    pub fn set_replication_id(&mut self, replication_id: u64) -> Result<()> {
        if replication_id == INVALID_REPLICATION_ID {
            return Err(ArchiveError::Registry(constants::ERR_INVALID_REPLICATION_ID));
        }
        if self.is_bound() {
            return Err(ArchiveError::AlreadyBound(self.replication_id));
        }
        self.replication_id = replication_id;
        Ok(())
    }

    pub fn unbind(&mut self) {
        if self.is_bound() {
            debug!(replication_id = self.replication_id, "Unbound replicated collection");
        }
        self.allocator = None;
        self.interest = VisibilityPolicy::NONE;
        self.replication_id = INVALID_REPLICATION_ID;
        self.journal.clear();
    }

    /// Bound and replicated on at least one channel of the bound interest
    fn journals(&self, id: PropertyId) -> bool {
        self.is_bound()
            && self
                .inner
                .registry()
                .infos()
                .info(id)
                .is_some_and(|info| info.replication_policy().intersects(self.interest))
    }

    fn record_set(&mut self, id: PropertyId, value: PropertyValue) {
        if !self.journals(id) {
            return;
        }
        trace!(replication_id = self.replication_id, property = %id, "Journaled property change");
        self.journal.push(PropertyChange::Set { id, value });
    }

    fn record_remove(&mut self, id: PropertyId) {
        if !self.journals(id) {
            return;
        }
        self.journal.push(PropertyChange::Remove { id });
    }

    /// Set a value; journals the change when bound
    pub fn set(&mut self, id: impl Into<PropertyId>, value: impl Into<PropertyValue>) -> Result<bool> {
        let id = id.into();
        let value = value.into();
        let changed = self.inner.set(id, value)?;
        if changed {
            self.record_set(id, value);
        }
        Ok(changed)
    }

    pub fn remove(&mut self, id: impl Into<PropertyId>) -> bool {
        let id = id.into();
        let removed = self.inner.remove(id);
        if removed {
            self.record_remove(id);
        }
        removed
    }

    pub fn remove_property_range(&mut self, kind: PropertyEnum) -> bool {
        let ids = self.inner.ids_in_range(kind);
        let mut removed = false;
        for id in ids {
            removed |= self.remove(id);
        }
        removed
    }

    pub fn adjust_integer(&mut self, id: impl Into<PropertyId>, delta: i64) -> Result<i64> {
        let id = id.into();
        let updated = self.inner.get_integer(id)?.wrapping_add(delta);
        if delta != 0 {
            self.set(id, updated)?;
        }
        Ok(updated)
    }

    pub fn clear(&mut self) {
        let ids: Vec<PropertyId> = self.inner.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.remove(id);
        }
    }

    /// Take the journaled changes
    pub fn drain_changes(&mut self) -> Vec<PropertyChange> {
        std::mem::take(&mut self.journal)
    }

    fn set_message(&self, id: PropertyId, value: PropertyValue) -> ReplicationMessage {
        ReplicationMessage::Set(SetPropertyMessage {
            replication_id: self.replication_id,
            property_id: id.to_change_id(),
            value_bits: value.to_wire_bits(self.inner.registry().content()),
        })
    }

    /// Drain the journal as outbound messages
    pub fn take_messages(&mut self) -> Vec<ReplicationMessage> {
        let changes = self.drain_changes();
        changes
            .into_iter()
            .map(|change| match change {
                PropertyChange::Set { id, value } => self.set_message(id, value),
                PropertyChange::Remove { id } => ReplicationMessage::Remove(RemovePropertyMessage {
                    replication_id: self.replication_id,
                    property_id: id.to_change_id(),
                }),
            })
            .collect()
    }

    /// Set messages for entries a mirror starts seeing when its interest grows from
    /// `previous` to `new`. Mirrors drop entries on their own when interest shrinks.
    pub fn messages_for_interest(
        &self,
        new: VisibilityPolicy,
        previous: VisibilityPolicy,
    ) -> Vec<ReplicationMessage> {
        let added = new.difference(previous);
        if added.is_none() {
            return Vec::new();
        }

        self.inner
            .iter()
            .filter(|(id, _)| {
                self.inner.registry().infos().info(*id).is_some_and(|info| {
                    let policy = info.replication_policy();
                    policy.intersects(added) && !policy.intersects(previous)
                })
            })
            .map(|(id, value)| self.set_message(id, value))
            .collect()
    }

    /// Apply a message produced by the source collection to this mirror
    pub fn apply(&mut self, message: &ReplicationMessage) -> Result<bool> {
        if message.replication_id() != self.replication_id {
            return Err(ArchiveError::ReplicationMismatch {
                expected: self.replication_id,
                actual: message.replication_id(),
            });
        }

        let id = message.property_id();
        match message {
            ReplicationMessage::Set(set) => {
                let registry = Arc::clone(self.inner.registry());
                let info = registry
                    .infos()
                    .info(id)
                    .ok_or(ArchiveError::UnregisteredKind(id.kind().0))?;
                let value =
                    PropertyValue::from_wire_bits(set.value_bits, info.data_type(), registry.content());
                self.set(id, value)
            }
            ReplicationMessage::Remove(_) => Ok(self.remove(id)),
        }
    }

    /// Transfer, skipping entries equal to `defaults` in replication.
    ///
    /// A bound collection keeps its id: unpacking a different one fails the archive
    /// and leaves the properties untouched.
    pub fn serialize_with_default(
        &mut self,
        archive: &mut Archive,
        defaults: Option<&PropertyCollection>,
    ) -> bool {
        let mut success = true;
        if archive.is_replication() {
            let mut replication_id = self.replication_id;
            success &= transfer(archive, &mut replication_id);
            if archive.is_unpacking() && success {
                if self.is_bound() && replication_id != self.replication_id {
                    return archive.fail(ArchiveError::ReplicationMismatch {
                        expected: self.replication_id,
                        actual: replication_id,
                    });
                }
                self.replication_id = replication_id;
            }
        }
        success &= self.inner.serialize_with_default(archive, defaults);
        success
    }

    pub fn as_collection(&self) -> &PropertyCollection {
        &self.inner
    }
}

impl Deref for ReplicatedPropertyCollection {
    type Target = PropertyCollection;

    fn deref(&self) -> &PropertyCollection {
        &self.inner
    }
}

impl Serializable for ReplicatedPropertyCollection {
    fn serialize(&mut self, archive: &mut Archive) -> bool {
        self.serialize_with_default(archive, None)
    }
}

impl fmt::Display for ReplicatedPropertyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replication_id: {} {}", self.replication_id, self.inner)
    }
}

impl fmt::Debug for ReplicatedPropertyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedPropertyCollection")
            .field("replication_id", &self.replication_id)
            .field("interest", &self.interest)
            .field("pending", &self.journal.len())
            .field("inner", &self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::SerializeContext;
    use crate::properties::info::PropertyInfoTable;
    use crate::properties::value::ContentTable;

    fn registry() -> Arc<PropertyRegistry> {
        Arc::new(PropertyRegistry::new(
            PropertyInfoTable::builtin().unwrap(),
            Arc::new(ContentTable::new()),
        ))
    }

    #[test]
    fn test_bind_assigns_once() {
        let allocator = Arc::new(ReplicationIdAllocator::new());
        let mut props = ReplicatedPropertyCollection::new(registry());
        assert!(!props.is_bound());

        let id = props.bind(&allocator, VisibilityPolicy::ALL).unwrap();
        assert_eq!(id, 1);
        assert_eq!(props.bind(&allocator, VisibilityPolicy::ALL).unwrap(), 1);

        let other = Arc::new(ReplicationIdAllocator::new());
        assert!(matches!(
            props.bind(&other, VisibilityPolicy::ALL),
            Err(ArchiveError::AlreadyBound(1))
        ));

        props.unbind();
        assert_eq!(props.replication_id(), INVALID_REPLICATION_ID);
        assert_eq!(props.bind(&allocator, VisibilityPolicy::ALL).unwrap(), 2);
    }

    #[test]
    fn test_unbound_changes_are_not_journaled() {
        let mut props = ReplicatedPropertyCollection::new(registry());
        props.set(PropertyEnum::RANK, 2i64).unwrap();
        assert!(props.drain_changes().is_empty());
    }

    #[test]
    fn test_journal_filters_by_interest() {
        let allocator = Arc::new(ReplicationIdAllocator::new());
        let mut props = ReplicatedPropertyCollection::new(registry());
        props.bind(&allocator, VisibilityPolicy::PROXIMITY).unwrap();

        props.set(PropertyEnum::RANK, 2i64).unwrap();
        props.set(PropertyEnum::HEALTH, 9i64).unwrap();
        props.set(PropertyEnum::EXPERIENCE, 50i64).unwrap();
        props.set(PropertyEnum::AI_AGGRO_COUNT, 4i64).unwrap();
        assert!(props.remove(PropertyEnum::HEALTH));
        assert!(props.remove(PropertyEnum::EXPERIENCE));
        assert!(props.remove(PropertyEnum::AI_AGGRO_COUNT));

        let changes = props.drain_changes();
        assert_eq!(
            changes,
            vec![
                PropertyChange::Set {
                    id: PropertyEnum::RANK.into(),
                    value: PropertyValue::Integer(2)
                },
                PropertyChange::Set {
                    id: PropertyEnum::HEALTH.into(),
                    value: PropertyValue::Integer(9)
                },
                PropertyChange::Remove {
                    id: PropertyEnum::HEALTH.into()
                },
            ]
        );
    }

    #[test]
    fn test_messages_apply_to_mirror() {
        let allocator = Arc::new(ReplicationIdAllocator::new());
        let registry = registry();
        let mut source = ReplicatedPropertyCollection::new(Arc::clone(&registry));
        let repid = source.bind(&allocator, VisibilityPolicy::ALL).unwrap();

        let mut mirror = ReplicatedPropertyCollection::new(registry);
        mirror.set_replication_id(repid).unwrap();

        source.set(PropertyEnum::HEALTH, -12i64).unwrap();
        source.set(PropertyEnum::FLAGGED, true).unwrap();
        source.remove(PropertyEnum::FLAGGED);

        let messages = source.take_messages();
        assert_eq!(messages.len(), 3);
        match messages[0] {
            ReplicationMessage::Set(set) => {
                assert_eq!(set.property_id, PropertyId::new(PropertyEnum::HEALTH).to_change_id());
                assert_eq!(set.value_bits, 23);
            }
            ReplicationMessage::Remove(_) => panic!("expected a set message"),
        }

        for message in &messages {
            mirror.apply(message).unwrap();
        }
        assert_eq!(mirror.get_integer(PropertyEnum::HEALTH).unwrap(), -12);
        assert!(!mirror.contains(PropertyEnum::FLAGGED));

        let foreign = ReplicationMessage::Remove(RemovePropertyMessage {
            replication_id: repid + 1,
            property_id: 0,
        });
        assert!(matches!(
            mirror.apply(&foreign),
            Err(ArchiveError::ReplicationMismatch { .. })
        ));
    }

    #[test]
    fn test_messages_for_widened_interest() {
        let mut props = ReplicatedPropertyCollection::new(registry());
        props.set(PropertyEnum::RANK, 1i64).unwrap();
        props.set(PropertyEnum::EXPERIENCE, 10i64).unwrap();
        props.set(PropertyEnum::HEALTH, 5i64).unwrap();

        let messages = props.messages_for_interest(
            VisibilityPolicy::PROXIMITY | VisibilityPolicy::OWNER,
            VisibilityPolicy::PROXIMITY,
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].property_id().kind(), PropertyEnum::EXPERIENCE);

        assert!(props
            .messages_for_interest(VisibilityPolicy::PROXIMITY, VisibilityPolicy::ALL)
            .is_empty());
    }

    #[test]
    fn test_replication_id_only_in_replication_archives() {
        let allocator = Arc::new(ReplicationIdAllocator::new());
        let mut props = ReplicatedPropertyCollection::new(registry());
        props.bind(&allocator, VisibilityPolicy::ALL).unwrap();

        let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::ALL);
        assert!(props.serialize(&mut archive));
        assert_eq!(&archive.as_slice()[1..], &[0x01, 0, 0, 0, 0]);

        let mut archive = Archive::packing(SerializeContext::Database, VisibilityPolicy::NONE);
        assert!(props.serialize(&mut archive));
        assert_eq!(&archive.as_slice()[1..], &[0, 0, 0, 0]);
    }
    #[test]
    fn test_unpack_keeps_bound_id() {
        let allocator = Arc::new(ReplicationIdAllocator::new());
        let mut first = ReplicatedPropertyCollection::new(registry());
        first.bind(&allocator, VisibilityPolicy::ALL).unwrap();
        first.set(PropertyEnum::RANK, 4i64).unwrap();
        let mut second = ReplicatedPropertyCollection::new(registry());
        second.bind(&allocator, VisibilityPolicy::ALL).unwrap();
        second.set(PropertyEnum::RANK, 9i64).unwrap();

        let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::ALL);
        assert!(second.serialize(&mut archive));
        let mut reader = Archive::unpacking(SerializeContext::Replication, archive.to_bytes()).unwrap();
        assert!(!first.serialize(&mut reader));
        assert!(matches!(
            reader.error(),
            Some(ArchiveError::ReplicationMismatch { expected: 1, actual: 2 })
        ));
        assert_eq!(first.replication_id(), 1);
        assert!(first.is_bound());
        assert_eq!(first.get_integer(PropertyEnum::RANK).unwrap(), 4);

        // same id is accepted
        let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::ALL);
        assert!(first.serialize(&mut archive));
        let mut reader = Archive::unpacking(SerializeContext::Replication, archive.to_bytes()).unwrap();
        assert!(first.serialize(&mut reader));
        assert_eq!(first.replication_id(), 1);
    }
}

