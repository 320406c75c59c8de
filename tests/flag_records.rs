#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Flag-gated records: absent bits cost nothing, present bits follow a fixed order

use replica_archive::core::archive::{Archive, SerializeContext, VisibilityPolicy};
use replica_archive::core::serializer::Serializable;
use replica_archive::core::vector::{Orientation, Vector3};
use replica_archive::properties::{ContentRef, ContentResolver, ContentTable};
use replica_archive::records::enter_world::{combine_flags, split_flags};
use replica_archive::records::locomotion::LOCOMOTION_FIELDS;
use replica_archive::records::{
    EnterGameWorldArchive, EnterGameWorldFlags, LocomotionFlags, LocomotionMessageFlags,
    LocomotionState, LocomotorMethod, NaviPathNode, NaviSide,
};
use std::sync::Arc;

const HERO: ContentRef = ContentRef(0x4A11);

fn content() -> Arc<dyn ContentResolver> {
    let mut table = ContentTable::new();
    table.register(HERO, "Entity/Hero").unwrap();
    Arc::new(table)
}

fn packing() -> Archive {
    Archive::packing(SerializeContext::Replication, VisibilityPolicy::PROXIMITY)
}

fn reopen(archive: &Archive) -> Archive {
    Archive::unpacking(SerializeContext::Replication, archive.to_bytes()).unwrap()
}

fn all_locomotion_fields() -> LocomotionMessageFlags {
    LOCOMOTION_FIELDS
        .iter()
        .fold(LocomotionMessageFlags::NONE, |acc, (flag, _)| acc | *flag)
}

// ============================================================================
// LOCOMOTION STATE
// ============================================================================

#[test]
fn test_locomotion_field_order() {
    let mut state = LocomotionState {
        locomotion_flags: LocomotionFlags::IS_WALKING,
        method: LocomotorMethod::GROUND,
        base_move_speed: 3.9,
        height: 5,
        follow_entity_id: 6,
        follow_entity_range_start: 0.0,
        follow_entity_range_end: 0.0,
        path_goal_node_index: 7,
        path_nodes: Vec::new(),
    };

    let mut archive = packing();
    assert!(state.transfer(&mut archive, all_locomotion_fields()));
    assert_eq!(
        &archive.as_slice()[1..],
        &[
            0x02, // locomotion flags
            0x01, // method
            0x06, // move speed, truncated to 3 and zigzagged
            0x05, // height
            0x06, // follow entity
            0x00, 0x00, // follow range
            0x07, 0x00, // goal index, node count
        ]
    );
}

#[test]
fn test_follow_range_is_fixed_precision() {
    let mut state = LocomotionState {
        follow_entity_range_start: 1.5,
        follow_entity_range_end: 12.25,
        ..Default::default()
    };

    let mut archive = packing();
    assert!(state.transfer(&mut archive, LocomotionMessageFlags::HAS_FOLLOW_ENTITY_RANGE));
    // whole units only: 1 and 12, zigzagged
    assert_eq!(&archive.as_slice()[1..], &[0x02, 0x18]);

    let mut reader = reopen(&archive);
    let mut decoded = LocomotionState::default();
    assert!(decoded.transfer(&mut reader, LocomotionMessageFlags::HAS_FOLLOW_ENTITY_RANGE));
    assert_eq!(decoded.follow_entity_range_start, 1.0);
    assert_eq!(decoded.follow_entity_range_end, 12.0);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn test_locomotion_subset_roundtrip() {
    let flags = LocomotionMessageFlags::HAS_METHOD | LocomotionMessageFlags::HAS_FOLLOW_ENTITY_ID;
    let mut state = LocomotionState {
        method: LocomotorMethod::HIGH_FLYING,
        follow_entity_id: 1 << 40,
        height: 99,
        ..Default::default()
    };

    let mut archive = packing();
    assert!(state.transfer(&mut archive, flags));

    let mut reader = reopen(&archive);
    let mut decoded = LocomotionState::default();
    assert!(decoded.transfer(&mut reader, flags));
    assert_eq!(decoded.method, LocomotorMethod::HIGH_FLYING);
    assert_eq!(decoded.follow_entity_id, 1 << 40);
    assert_eq!(decoded.height, 0);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn test_path_nodes_accumulate_offsets() {
    let nodes = vec![
        NaviPathNode::new(Vector3::new(100.0, 50.0, 0.0), NaviSide::Point, 0.0),
        NaviPathNode::new(Vector3::new(90.5, 60.0, 0.0), NaviSide::Left, 40.0),
        NaviPathNode::new(Vector3::new(-10.0, 60.0, 2.0), NaviSide::Right, 12.0),
    ];
    let mut state = LocomotionState {
        path_goal_node_index: 2,
        path_nodes: nodes.clone(),
        ..Default::default()
    };

    let mut archive = packing();
    assert!(state.transfer(&mut archive, LocomotionMessageFlags::UPDATE_PATH_NODES));

    let mut reader = reopen(&archive);
    let mut decoded = LocomotionState::default();
    assert!(decoded.transfer(&mut reader, LocomotionMessageFlags::UPDATE_PATH_NODES));
    assert_eq!(decoded.path_goal_node_index, 2);
    assert_eq!(decoded.path_nodes, nodes);
}

#[test]
fn test_path_node_count_limit() {
    let mut archive = packing();
    assert!(archive.write_varint(0));
    assert!(archive.write_varint(u64::from(u32::MAX)));

    let mut reader = reopen(&archive);
    let mut decoded = LocomotionState::default();
    assert!(!decoded.transfer(&mut reader, LocomotionMessageFlags::UPDATE_PATH_NODES));
    assert!(decoded.path_nodes.is_empty());
}

// ============================================================================
// ENTER GAME WORLD
// ============================================================================

#[test]
fn test_all_clear_consumes_no_optional_bytes() {
    let mut record = EnterGameWorldArchive::new(content());
    record.entity_id = 300;
    record.locomotion_flags = LocomotionMessageFlags::NO_LOCOMOTION_STATE;
    // set but gated off
    record.prototype = HERO;
    record.avatar_world_instance_id = 9;
    record.attached_entities = vec![1, 2];

    let mut archive = packing();
    assert!(record.serialize(&mut archive));
    // id, flags, position, yaw
    assert_eq!(&archive.as_slice()[1..], &[0xAC, 0x02, 0x02, 0x00, 0x00, 0x00, 0x00]);

    let mut reader = reopen(&archive);
    let mut decoded = EnterGameWorldArchive::new(content());
    assert!(decoded.serialize(&mut reader));
    assert_eq!(decoded.prototype, ContentRef::INVALID);
    assert_eq!(decoded.avatar_world_instance_id, 0);
    assert!(decoded.attached_entities.is_empty());
}

#[test]
fn test_all_set_consumes_every_field() {
    let mut record = EnterGameWorldArchive::new(content());
    record.entity_id = 42;
    record.prototype = HERO;
    record.position = Vector3::new(128.125, -64.5, 12.0);
    record.orientation = Orientation::new(3.0, -0.5, 0.125);
    record.locomotion = LocomotionState {
        locomotion_flags: LocomotionFlags::IS_LOCOMOTING | LocomotionFlags::MOVE_FORWARD,
        method: LocomotorMethod::AIRBORNE,
        base_move_speed: 700.0,
        height: 30,
        follow_entity_id: 77,
        follow_entity_range_start: 2.0,
        follow_entity_range_end: 18.0,
        path_goal_node_index: 1,
        path_nodes: vec![
            NaviPathNode::new(Vector3::new(128.0, -64.5, 12.0), NaviSide::Point, 0.0),
            NaviPathNode::new(Vector3::new(200.0, -10.0, 12.0), NaviSide::Right, 25.0),
        ],
    };
    record.avatar_world_instance_id = 6;
    record.attached_entities = vec![1000, 1001, 1002];
    record.extra_flags = EnterGameWorldFlags::IS_CLIENT_ENTITY_HIDDEN;
    record.update_flags();

    let loco = record.locomotion_flags;
    assert!(loco.contains(LocomotionMessageFlags::HAS_ENTITY_PROTOTYPE_ID));
    assert!(loco.contains(LocomotionMessageFlags::HAS_FULL_ORIENTATION));
    assert!(loco.contains(all_locomotion_fields()));
    assert!(!loco.contains(LocomotionMessageFlags::NO_LOCOMOTION_STATE));

    let mut archive = packing();
    assert!(record.serialize(&mut archive));

    let mut reader = reopen(&archive);
    let mut decoded = EnterGameWorldArchive::new(content());
    assert!(decoded.serialize(&mut reader));
    assert_eq!(reader.remaining(), 0);

    assert_eq!(decoded.entity_id, 42);
    assert_eq!(decoded.prototype, HERO);
    assert_eq!(decoded.position, record.position);
    assert_eq!(decoded.orientation, record.orientation);
    assert_eq!(decoded.locomotion, record.locomotion);
    assert_eq!(decoded.avatar_world_instance_id, 6);
    assert_eq!(decoded.attached_entities, vec![1000, 1001, 1002]);
    assert!(decoded.extra_flags.contains(EnterGameWorldFlags::IS_CLIENT_ENTITY_HIDDEN));
    assert!(decoded.to_string().contains("prototype: Entity/Hero"));
}

#[test]
fn test_yaw_only_orientation_keeps_pitch_and_roll_off_the_wire() {
    let mut record = EnterGameWorldArchive::new(content());
    record.orientation = Orientation::from_yaw(1.0);
    record.update_flags();
    assert!(!record
        .locomotion_flags
        .contains(LocomotionMessageFlags::HAS_FULL_ORIENTATION));

    let mut archive = packing();
    assert!(record.serialize(&mut archive));
    // id, flags, position, yaw = 64 zigzagged
    assert_eq!(&archive.as_slice()[1..], &[0x00, 0x02, 0x00, 0x00, 0x00, 0x80, 0x01]);
}

#[test]
fn test_flag_word_split() {
    let word = combine_flags(
        LocomotionMessageFlags::HAS_FULL_ORIENTATION | LocomotionMessageFlags::HAS_ENTITY_PROTOTYPE_ID,
        EnterGameWorldFlags::HAS_AVATAR_WORLD_INSTANCE_ID | EnterGameWorldFlags::IS_NEW_ON_SERVER,
    );
    assert_eq!(word, 0x801 | (0x3 << 12));

    let (loco, extra) = split_flags(word);
    assert!(loco.contains(LocomotionMessageFlags::HAS_ENTITY_PROTOTYPE_ID));
    assert!(extra.contains(EnterGameWorldFlags::IS_NEW_ON_SERVER));
    assert!(!extra.contains(EnterGameWorldFlags::HAS_ATTACHED_ENTITIES));
}

#[test]
fn test_truncated_record_fails() {
    let mut record = EnterGameWorldArchive::new(content());
    record.entity_id = 5;
    record.attached_entities = vec![1, 2, 3];
    record.update_flags();

    let mut archive = packing();
    assert!(record.serialize(&mut archive));
    let bytes = archive.to_vec();

    let mut reader =
        Archive::unpacking(SerializeContext::Replication, bytes[..bytes.len() - 1].to_vec()).unwrap();
    let mut decoded = EnterGameWorldArchive::new(content());
    assert!(!decoded.serialize(&mut reader));
}
