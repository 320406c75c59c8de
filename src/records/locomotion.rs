//! # Locomotion State
//!
//! Movement state embedded in entity records. Every field is optional and gated by a
//! bit of the 12-bit [`LocomotionMessageFlags`] word carried by the owning record; the
//! state itself never transfers the word.
//!
//! ## Field Order
//! | Bit | Flag | Field | Shape |
//! |-----|------|-------|-------|
//! | 3 | `HAS_LOCOMOTION_FLAGS` | `locomotion_flags` | u64 varint |
//! | 4 | `HAS_METHOD` | `method` | u32 varint |
//! | 7 | `HAS_MOVE_SPEED` | `base_move_speed` | fixed float, precision 0 |
//! | 8 | `HAS_HEIGHT` | `height` | u32 varint |
//! | 9 | `HAS_FOLLOW_ENTITY_ID` | `follow_entity_id` | u64 varint |
//! | 10 | `HAS_FOLLOW_ENTITY_RANGE` | `follow_entity_range_start`, `_end` | two fixed floats, precision 0 |
//! | 5 | `UPDATE_PATH_NODES` | goal index, node count, nodes | u32, u32, [`NaviPathNode`]s |
//!
//! Path node vertices are sent as fixed-precision (3 bits) offsets from the previous
//! vertex, starting at the origin, followed by a signed side/radius integer.

use crate::core::archive::Archive;
use crate::core::serializer::{transfer, transfer_float_fixed, transfer_vector_fixed};
use crate::core::vector::Vector3;
use crate::error::ArchiveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Precision of path node vertex offsets
pub const PATH_NODE_PRECISION: i32 = 3;

/// Precision of the base move speed
pub const MOVE_SPEED_PRECISION: i32 = 0;

/// Precision of both follow entity range bounds
pub const FOLLOW_RANGE_PRECISION: i32 = 0;

/// Number of bits the locomotion flag word occupies in combined flag words
pub const LOCOMOTION_FLAG_COUNT: u32 = 12;

/// Which locomotion fields a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocomotionMessageFlags(pub u32);

impl LocomotionMessageFlags {
    pub const NONE: Self = Self(0);
    pub const HAS_FULL_ORIENTATION: Self = Self(1 << 0);
    pub const NO_LOCOMOTION_STATE: Self = Self(1 << 1);
    pub const RELATIVE_TO_PREVIOUS_STATE: Self = Self(1 << 2);
    pub const HAS_LOCOMOTION_FLAGS: Self = Self(1 << 3);
    pub const HAS_METHOD: Self = Self(1 << 4);
    pub const UPDATE_PATH_NODES: Self = Self(1 << 5);
    pub const LOCOMOTION_FINISHED: Self = Self(1 << 6);
    pub const HAS_MOVE_SPEED: Self = Self(1 << 7);
    pub const HAS_HEIGHT: Self = Self(1 << 8);
    pub const HAS_FOLLOW_ENTITY_ID: Self = Self(1 << 9);
    pub const HAS_FOLLOW_ENTITY_RANGE: Self = Self(1 << 10);
    pub const HAS_ENTITY_PROTOTYPE_ID: Self = Self(1 << 11);

    /// Every defined bit
    pub const MASK: u32 = (1 << LOCOMOTION_FLAG_COUNT) - 1;

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for LocomotionMessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LocomotionMessageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Bit to field table, in transfer order
pub const LOCOMOTION_FIELDS: [(LocomotionMessageFlags, &str); 7] = [
    (LocomotionMessageFlags::HAS_LOCOMOTION_FLAGS, "locomotion_flags"),
    (LocomotionMessageFlags::HAS_METHOD, "method"),
    (LocomotionMessageFlags::HAS_MOVE_SPEED, "base_move_speed"),
    (LocomotionMessageFlags::HAS_HEIGHT, "height"),
    (LocomotionMessageFlags::HAS_FOLLOW_ENTITY_ID, "follow_entity_id"),
    (LocomotionMessageFlags::HAS_FOLLOW_ENTITY_RANGE, "follow_entity_range"),
    (LocomotionMessageFlags::UPDATE_PATH_NODES, "path_nodes"),
];

/// Movement behaviour bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocomotionFlags(pub u64);

impl LocomotionFlags {
    pub const NONE: Self = Self(0);
    pub const IS_LOCOMOTING: Self = Self(1 << 0);
    pub const IS_WALKING: Self = Self(1 << 1);
    pub const IS_LOOKING: Self = Self(1 << 2);
    pub const SKIP_CURRENT_SPEED_RATE: Self = Self(1 << 3);
    pub const NO_ENTITY_COLLIDE: Self = Self(1 << 4);
    pub const IS_MOVEMENT_POWER: Self = Self(1 << 5);
    pub const DISABLE_ORIENTATION: Self = Self(1 << 6);
    pub const IS_DRIVING_MOVEMENT_MODE: Self = Self(1 << 7);
    pub const MOVE_FORWARD: Self = Self(1 << 8);
    pub const MOVE_TO: Self = Self(1 << 9);
    pub const IS_SYNC_MOVING: Self = Self(1 << 10);
    pub const IGNORES_WORLD_COLLISION: Self = Self(1 << 11);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LocomotionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Movement method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocomotorMethod(pub u32);

impl LocomotorMethod {
    pub const DEFAULT: Self = Self(0);
    pub const GROUND: Self = Self(1);
    pub const AIRBORNE: Self = Self(2);
    pub const TELEPORT_DASH: Self = Self(3);
    pub const UNDERGROUND: Self = Self(4);
    pub const MISSILE: Self = Self(5);
    pub const MISSILE_SEEKING: Self = Self(6);
    pub const HIGH_FLYING: Self = Self(7);
}

/// Side of a path vertex the path wraps around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NaviSide {
    Left,
    Right,
    #[default]
    Point,
}

/// One vertex of a navigation path
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NaviPathNode {
    pub vertex: Vector3,
    pub side: NaviSide,
    /// Sent as an integer
    pub radius: f32,
}

impl NaviPathNode {
    pub fn new(vertex: Vector3, side: NaviSide, radius: f32) -> Self {
        Self {
            vertex,
            side,
            radius,
        }
    }

    fn side_radius(&self) -> i32 {
        let radius = self.radius.abs() as i32;
        match self.side {
            NaviSide::Left => -radius,
            NaviSide::Right => radius,
            NaviSide::Point => 0,
        }
    }

    fn set_side_radius(&mut self, side_radius: i32) {
        let (side, radius) = match side_radius {
            r if r < 0 => (NaviSide::Left, r.unsigned_abs()),
            r if r > 0 => (NaviSide::Right, r.unsigned_abs()),
            _ => (NaviSide::Point, 0),
        };
        self.side = side;
        self.radius = radius as f32;
    }

    /// Transfer relative to `previous_vertex`
    pub fn transfer(&mut self, archive: &mut Archive, previous_vertex: Vector3) -> bool {
        let mut offset = self.vertex - previous_vertex;
        let mut success = transfer_vector_fixed(archive, &mut offset, PATH_NODE_PRECISION);

        let mut side_radius = self.side_radius();
        success &= transfer(archive, &mut side_radius);

        if archive.is_unpacking() {
            self.vertex = previous_vertex + offset;
            self.set_side_radius(side_radius);
        }
        success
    }
}

impl fmt::Display for NaviPathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vertex={}, side={:?}, radius={}", self.vertex, self.side, self.radius)
    }
}

/// Movement state of an entity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocomotionState {
    pub locomotion_flags: LocomotionFlags,
    pub method: LocomotorMethod,
    pub base_move_speed: f32,
    pub height: u32,
    pub follow_entity_id: u64,
    pub follow_entity_range_start: f32,
    pub follow_entity_range_end: f32,
    pub path_goal_node_index: u32,
    pub path_nodes: Vec<NaviPathNode>,
}

impl LocomotionState {
    pub fn with_move_speed(base_move_speed: f32) -> Self {
        Self {
            base_move_speed,
            ..Default::default()
        }
    }

    /// Transfer the fields selected by `flags`
    pub fn transfer(&mut self, archive: &mut Archive, flags: LocomotionMessageFlags) -> bool {
        let mut success = true;

        if flags.contains(LocomotionMessageFlags::HAS_LOCOMOTION_FLAGS) {
            success &= transfer(archive, &mut self.locomotion_flags.0);
        }

        if flags.contains(LocomotionMessageFlags::HAS_METHOD) {
            success &= transfer(archive, &mut self.method.0);
        }

        if flags.contains(LocomotionMessageFlags::HAS_MOVE_SPEED) {
            success &= transfer_float_fixed(archive, &mut self.base_move_speed, MOVE_SPEED_PRECISION);
        }

        if flags.contains(LocomotionMessageFlags::HAS_HEIGHT) {
            success &= transfer(archive, &mut self.height);
        }

        if flags.contains(LocomotionMessageFlags::HAS_FOLLOW_ENTITY_ID) {
            success &= transfer(archive, &mut self.follow_entity_id);
        }

        if flags.contains(LocomotionMessageFlags::HAS_FOLLOW_ENTITY_RANGE) {
            success &= transfer_float_fixed(
                archive,
                &mut self.follow_entity_range_start,
                FOLLOW_RANGE_PRECISION,
            );
            success &=
                transfer_float_fixed(archive, &mut self.follow_entity_range_end, FOLLOW_RANGE_PRECISION);
        }

        if flags.contains(LocomotionMessageFlags::UPDATE_PATH_NODES) {
            success &= self.transfer_path_nodes(archive);
        } else if archive.is_unpacking() {
            self.path_nodes.clear();
        }

        success
    }

    fn transfer_path_nodes(&mut self, archive: &mut Archive) -> bool {
        let mut success = transfer(archive, &mut self.path_goal_node_index);

        let mut count = match u32::try_from(self.path_nodes.len()) {
            Ok(count) => count,
            Err(_) => {
                return archive.fail(ArchiveError::LengthLimit {
                    len: self.path_nodes.len() as u64,
                    max: u64::from(u32::MAX),
                })
            }
        };
        success &= transfer(archive, &mut count);
        if !success {
            return false;
        }

        let mut previous_vertex = Vector3::ZERO;
        if archive.is_packing() {
            for node in self.path_nodes.iter_mut() {
                success &= node.transfer(archive, previous_vertex);
                previous_vertex = node.vertex;
            }
            return success;
        }

        let max = archive.limits().max_list_len;
        if count > max {
            return archive.fail(ArchiveError::LengthLimit {
                len: u64::from(count),
                max: u64::from(max),
            });
        }

        self.path_nodes.clear();
        self.path_nodes.reserve(count as usize);
        for _ in 0..count {
            let mut node = NaviPathNode::default();
            success &= node.transfer(archive, previous_vertex);
            if !success {
                break;
            }
            previous_vertex = node.vertex;
            self.path_nodes.push(node);
        }
        success
    }

    /// Flags selecting the fields that differ from `previous`, or from a default
    /// state when there is none
    pub fn field_flags(&self, previous: Option<&LocomotionState>) -> LocomotionMessageFlags {
        let default = LocomotionState::default();
        let base = previous.unwrap_or(&default);

        let mut flags = LocomotionMessageFlags::NONE;
        if previous.is_some() {
            flags |= LocomotionMessageFlags::RELATIVE_TO_PREVIOUS_STATE;
        }
        if self.locomotion_flags != base.locomotion_flags {
            flags |= LocomotionMessageFlags::HAS_LOCOMOTION_FLAGS;
        }
        if self.method != base.method {
            flags |= LocomotionMessageFlags::HAS_METHOD;
        }
        if self.base_move_speed != base.base_move_speed {
            flags |= LocomotionMessageFlags::HAS_MOVE_SPEED;
        }
        if self.height != base.height {
            flags |= LocomotionMessageFlags::HAS_HEIGHT;
        }
        if self.follow_entity_id != base.follow_entity_id {
            flags |= LocomotionMessageFlags::HAS_FOLLOW_ENTITY_ID;
        }
        if self.follow_entity_range_start != base.follow_entity_range_start
            || self.follow_entity_range_end != base.follow_entity_range_end
        {
            flags |= LocomotionMessageFlags::HAS_FOLLOW_ENTITY_RANGE;
        }
        if self.path_goal_node_index != base.path_goal_node_index || self.path_nodes != base.path_nodes {
            flags |= LocomotionMessageFlags::UPDATE_PATH_NODES;
        }
        flags
    }
}

impl fmt::Display for LocomotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "locomotion_flags: {:#x}", self.locomotion_flags.0)?;
        writeln!(f, "method: {}", self.method.0)?;
        writeln!(f, "base_move_speed: {}", self.base_move_speed)?;
        writeln!(f, "height: {}", self.height)?;
        writeln!(f, "follow_entity_id: {}", self.follow_entity_id)?;
        writeln!(
            f,
            "follow_entity_range: {}..{}",
            self.follow_entity_range_start, self.follow_entity_range_end
        )?;
        writeln!(f, "path_goal_node_index: {}", self.path_goal_node_index)?;
        for (i, node) in self.path_nodes.iter().enumerate() {
            writeln!(f, "path_nodes[{i}]: {node}")?;
        }
        Ok(())
    }
}
