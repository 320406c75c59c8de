//! # Enter Game World Archive
//!
//! Record sent when an entity enters a client's view.
//!
//! ## Wire Layout
//! ```text
//! [entity id: u64]
//! [flags: u32]            bits 0..12 locomotion message flags, bits 12.. extra flags
//! [prototype: enum index] if HAS_ENTITY_PROTOTYPE_ID
//! [position: 3 x fixed(3)]
//! [orientation: fixed(6)] yaw only, or yaw/pitch/roll with HAS_FULL_ORIENTATION
//! [locomotion state]      unless NO_LOCOMOTION_STATE
//! [avatar world instance id: u32] if HAS_AVATAR_WORLD_INSTANCE_ID
//! [attached entities: list of u64] if HAS_ATTACHED_ENTITIES
//! ```

use crate::core::archive::Archive;
use crate::core::serializer::{
    transfer, transfer_list, transfer_orientation_fixed, transfer_vector_fixed, Serializable,
};
use crate::core::vector::{Orientation, Vector3};
use crate::properties::value::{transfer_content_ref, ContentRef, ContentResolver};
use crate::records::locomotion::{LocomotionMessageFlags, LocomotionState, LOCOMOTION_FLAG_COUNT};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use tracing::trace;

pub const POSITION_PRECISION: i32 = 3;
pub const ORIENTATION_PRECISION: i32 = 6;

/// Flags stored above the locomotion bits of the combined flag word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EnterGameWorldFlags(pub u32);

impl EnterGameWorldFlags {
    pub const NONE: Self = Self(0);
    pub const HAS_AVATAR_WORLD_INSTANCE_ID: Self = Self(1 << 0);
    pub const IS_NEW_ON_SERVER: Self = Self(1 << 1);
    pub const IS_CLIENT_ENTITY_HIDDEN: Self = Self(1 << 2);
    pub const HAS_ATTACHED_ENTITIES: Self = Self(1 << 3);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EnterGameWorldFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Combine both flag sets into the wire word
pub fn combine_flags(locomotion: LocomotionMessageFlags, extra: EnterGameWorldFlags) -> u32 {
    (locomotion.bits() & LocomotionMessageFlags::MASK) | (extra.bits() << LOCOMOTION_FLAG_COUNT)
}

/// Split a wire word into its locomotion and extra flags
pub fn split_flags(flags: u32) -> (LocomotionMessageFlags, EnterGameWorldFlags) {
    (
        LocomotionMessageFlags(flags & LocomotionMessageFlags::MASK),
        EnterGameWorldFlags(flags >> LOCOMOTION_FLAG_COUNT),
    )
}

pub struct EnterGameWorldArchive {
    content: Arc<dyn ContentResolver>,
    pub entity_id: u64,
    pub locomotion_flags: LocomotionMessageFlags,
    pub extra_flags: EnterGameWorldFlags,
    pub prototype: ContentRef,
    pub position: Vector3,
    pub orientation: Orientation,
    pub locomotion: LocomotionState,
    pub avatar_world_instance_id: u32,
    pub attached_entities: Vec<u64>,
}

impl EnterGameWorldArchive {
    /// Empty record; unpack into it or fill the fields and call
    /// [`EnterGameWorldArchive::update_flags`]
    pub fn new(content: Arc<dyn ContentResolver>) -> Self {
        Self {
            content,
            entity_id: 0,
            locomotion_flags: LocomotionMessageFlags::NONE,
            extra_flags: EnterGameWorldFlags::NONE,
            prototype: ContentRef::INVALID,
            position: Vector3::ZERO,
            orientation: Orientation::ZERO,
            locomotion: LocomotionState::default(),
            avatar_world_instance_id: 0,
            attached_entities: Vec::new(),
        }
    }

    pub fn content(&self) -> &dyn ContentResolver {
        self.content.as_ref()
    }

    /// Recompute the presence bits from the current field values.
    ///
    /// `IS_NEW_ON_SERVER` and `IS_CLIENT_ENTITY_HIDDEN` are left as set by the caller.
    pub fn update_flags(&mut self) {
        let mut flags = self.locomotion.field_flags(None);
        if self.prototype.is_valid() {
            flags |= LocomotionMessageFlags::HAS_ENTITY_PROTOTYPE_ID;
        }
        if self.orientation.pitch != 0.0 || self.orientation.roll != 0.0 {
            flags |= LocomotionMessageFlags::HAS_FULL_ORIENTATION;
        }
        if self.locomotion == LocomotionState::default() {
            flags |= LocomotionMessageFlags::NO_LOCOMOTION_STATE;
        }
        self.locomotion_flags = flags;

        let keep = EnterGameWorldFlags::IS_NEW_ON_SERVER.bits()
            | EnterGameWorldFlags::IS_CLIENT_ENTITY_HIDDEN.bits();
        let mut extra = EnterGameWorldFlags(self.extra_flags.bits() & keep);
        if self.avatar_world_instance_id != 0 {
            extra = extra | EnterGameWorldFlags::HAS_AVATAR_WORLD_INSTANCE_ID;
        }
        if !self.attached_entities.is_empty() {
            extra = extra | EnterGameWorldFlags::HAS_ATTACHED_ENTITIES;
        }
        self.extra_flags = extra;
    }

    pub fn flags(&self) -> u32 {
        combine_flags(self.locomotion_flags, self.extra_flags)
    }
}

impl Serializable for EnterGameWorldArchive {
    fn serialize(&mut self, archive: &mut Archive) -> bool {
        let mut success = transfer(archive, &mut self.entity_id);

        let mut flags = self.flags();
        success &= transfer(archive, &mut flags);
        if archive.is_unpacking() {
            (self.locomotion_flags, self.extra_flags) = split_flags(flags);
        }

        let loco = self.locomotion_flags;
        let extra = self.extra_flags;

        if loco.contains(LocomotionMessageFlags::HAS_ENTITY_PROTOTYPE_ID) {
            success &= transfer_content_ref(archive, &mut self.prototype, self.content.as_ref());
        }

        success &= transfer_vector_fixed(archive, &mut self.position, POSITION_PRECISION);

        let yaw_only = !loco.contains(LocomotionMessageFlags::HAS_FULL_ORIENTATION);
        success &=
            transfer_orientation_fixed(archive, &mut self.orientation, yaw_only, ORIENTATION_PRECISION);

        if !loco.contains(LocomotionMessageFlags::NO_LOCOMOTION_STATE) {
            success &= self.locomotion.transfer(archive, loco);
        }

        if extra.contains(EnterGameWorldFlags::HAS_AVATAR_WORLD_INSTANCE_ID) {
            success &= transfer(archive, &mut self.avatar_world_instance_id);
        }

        if extra.contains(EnterGameWorldFlags::HAS_ATTACHED_ENTITIES) {
            success &= transfer_list(archive, &mut self.attached_entities);
        }

        if archive.is_unpacking() {
            trace!(entity_id = self.entity_id, flags, success, "Unpacked enter game world record");
        }
        success
    }
}

impl fmt::Display for EnterGameWorldArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entity_id: {}", self.entity_id)?;
        writeln!(f, "flags: {:#x}", self.flags())?;
        let prototype = self.content.name(self.prototype).unwrap_or("<unknown>");
        writeln!(f, "prototype: {prototype}")?;
        writeln!(f, "position: {}", self.position)?;
        writeln!(f, "orientation: {}", self.orientation)?;
        if !self.locomotion_flags.contains(LocomotionMessageFlags::NO_LOCOMOTION_STATE) {
            write!(f, "{}", self.locomotion)?;
        }
        writeln!(f, "avatar_world_instance_id: {}", self.avatar_world_instance_id)?;
        writeln!(f, "attached_entities: {:?}", self.attached_entities)
    }
}

impl fmt::Debug for EnterGameWorldArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnterGameWorldArchive")
            .field("entity_id", &self.entity_id)
            .field("locomotion_flags", &self.locomotion_flags)
            .field("extra_flags", &self.extra_flags)
            .field("prototype", &self.prototype)
            .field("position", &self.position)
            .field("orientation", &self.orientation)
            .field("locomotion", &self.locomotion)
            .field("avatar_world_instance_id", &self.avatar_world_instance_id)
            .field("attached_entities", &self.attached_entities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::{SerializeContext, VisibilityPolicy};
    use crate::properties::value::ContentTable;

    fn content() -> Arc<dyn ContentResolver> {
        let mut table = ContentTable::new();
        table.register(ContentRef(0xBEEF), "Entity/Hero").unwrap();
        Arc::new(table)
    }

    #[test]
    fn test_flag_word_layout() {
        let word = combine_flags(
            LocomotionMessageFlags::HAS_HEIGHT,
            EnterGameWorldFlags::HAS_ATTACHED_ENTITIES,
        );
        assert_eq!(word, 0x100 | (8 << 12));
        let (loco, extra) = split_flags(word);
        assert_eq!(loco, LocomotionMessageFlags::HAS_HEIGHT);
        assert_eq!(extra, EnterGameWorldFlags::HAS_ATTACHED_ENTITIES);
    }

    #[test]
    fn test_minimal_record() {
        let mut record = EnterGameWorldArchive::new(content());
        record.entity_id = 7;
        record.position = Vector3::new(1.0, 2.0, 3.0);
        record.update_flags();
        assert_eq!(record.locomotion_flags, LocomotionMessageFlags::NO_LOCOMOTION_STATE);

        let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::PROXIMITY);
        assert!(record.serialize(&mut archive));
        // id, flags, position (8, 16, 24 zigzagged), yaw
        assert_eq!(&archive.as_slice()[1..], &[0x07, 0x02, 0x10, 0x20, 0x30, 0x00]);
    }

    #[test]
    fn test_full_record_roundtrip() {
        let mut record = EnterGameWorldArchive::new(content());
        record.entity_id = 1234;
        record.prototype = ContentRef(0xBEEF);
        record.position = Vector3::new(100.5, -20.25, 8.0);
        record.orientation = Orientation::new(1.5, 0.25, -0.5);
        record.locomotion.height = 12;
        record.locomotion.base_move_speed = 450.0;
        record.avatar_world_instance_id = 3;
        record.attached_entities = vec![55, 56];
        record.extra_flags = EnterGameWorldFlags::IS_NEW_ON_SERVER;
        record.update_flags();

        let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::PROXIMITY);
        assert!(record.serialize(&mut archive));

        let mut reader = Archive::unpacking(SerializeContext::Replication, archive.to_bytes()).unwrap();
        let mut out = EnterGameWorldArchive::new(content());
        assert!(out.serialize(&mut reader));
        assert_eq!(reader.remaining(), 0);

        assert_eq!(out.entity_id, 1234);
        assert_eq!(out.prototype, ContentRef(0xBEEF));
        assert_eq!(out.position, record.position);
        assert_eq!(out.orientation, record.orientation);
        assert_eq!(out.locomotion, record.locomotion);
        assert_eq!(out.avatar_world_instance_id, 3);
        assert_eq!(out.attached_entities, vec![55, 56]);
        assert!(out.extra_flags.contains(EnterGameWorldFlags::IS_NEW_ON_SERVER));
        assert_eq!(out.flags(), record.flags());
    }
}
