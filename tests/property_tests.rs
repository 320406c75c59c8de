//! Property-based tests using proptest
//!
//! These tests check codec invariants across randomly generated inputs: lossless
//! round trips, bounded encodings, and no panics on hostile bytes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use replica_archive::core::archive::{Archive, SerializeContext, VisibilityPolicy};
use replica_archive::core::serializer::{transfer, transfer_float_fixed, Serializable};
use replica_archive::core::varint::{
    read_varint, varint_len, write_varint, zigzag_decode, zigzag_encode, MAX_VARINT_LEN,
};
use replica_archive::properties::id::{PropertyEnum, PropertyId, MAX_KIND, PARAM_MASK};
use replica_archive::properties::{
    ContentTable, PropertyCollection, PropertyInfoTable, PropertyRegistry,
};
use replica_archive::records::{LocomotionMessageFlags, LocomotionState};
use std::sync::Arc;

fn registry() -> Arc<PropertyRegistry> {
    Arc::new(PropertyRegistry::new(
        PropertyInfoTable::builtin().expect("builtin table"),
        Arc::new(ContentTable::new()),
    ))
}

fn reopen(archive: &Archive) -> Archive {
    Archive::unpacking(archive.context(), archive.to_bytes()).expect("header")
}

// Property: every u64 survives a varint round trip within ten bytes
proptest! {
    #[test]
    fn prop_varint_roundtrip(value in any::<u64>()) {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);

        prop_assert!(buf.len() <= MAX_VARINT_LEN);
        prop_assert_eq!(buf.len(), varint_len(value));
        prop_assert_eq!(read_varint(&buf).expect("valid varint"), (value, buf.len()));
    }
}

// Property: zigzag is a bijection and keeps small magnitudes small
proptest! {
    #[test]
    fn prop_zigzag_roundtrip(value in any::<i64>()) {
        prop_assert_eq!(zigzag_decode(zigzag_encode(value)), value);
    }

    #[test]
    fn prop_zigzag_small_magnitudes(value in -64i64..64) {
        prop_assert!(zigzag_encode(value) < 128);
    }
}

// Property: property ids keep kind and params through both wire forms
proptest! {
    #[test]
    fn prop_property_id_wire_forms(kind in 0u16..=MAX_KIND, params in any::<u64>()) {
        let id = PropertyId::from_raw(PropertyId::new(PropertyEnum(kind)).raw() | (params & PARAM_MASK));

        prop_assert_eq!(PropertyId::from_wire(id.to_wire()), id);
        prop_assert_eq!(PropertyId::from_change_id(id.to_change_id()), id);

        let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::NONE);
        let mut out = id;
        prop_assert!(transfer(&mut archive, &mut out));

        let mut reader = reopen(&archive);
        let mut decoded = PropertyId::default();
        prop_assert!(transfer(&mut reader, &mut decoded));
        prop_assert_eq!(decoded, id);
        prop_assert_eq!(decoded.kind(), PropertyEnum(kind));
    }
}

// Property: any bool sequence survives packing into shared bytes
proptest! {
    #[test]
    fn prop_bool_sequences(values in prop::collection::vec(any::<bool>(), 0..64)) {
        let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::NONE);
        for value in &values {
            let mut value = *value;
            prop_assert!(transfer(&mut archive, &mut value));
        }
        prop_assert_eq!(archive.as_slice().len(), 1 + values.len().div_ceil(5));

        let mut reader = reopen(&archive);
        for expected in &values {
            let mut value = !expected;
            prop_assert!(transfer(&mut reader, &mut value));
            prop_assert_eq!(value, *expected);
        }
        prop_assert_eq!(reader.remaining(), 0);
    }
}

// Property: fixed floats decode within one quantum of the input
proptest! {
    #[test]
    fn prop_fixed_float_error_bound(value in -100_000.0f32..100_000.0, precision in 0i32..=6) {
        let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::NONE);
        let mut out = value;
        prop_assert!(transfer_float_fixed(&mut archive, &mut out, precision));

        let mut reader = reopen(&archive);
        let mut decoded = 0.0f32;
        prop_assert!(transfer_float_fixed(&mut reader, &mut decoded, precision));

        let quantum = 1.0 / (1u32 << precision) as f32;
        prop_assert!((decoded - value).abs() <= quantum + value.abs() * f32::EPSILON * 2.0);
        prop_assert!(decoded.abs() <= value.abs());
    }
}

// Property: persisted integer properties survive a database round trip
proptest! {
    #[test]
    fn prop_collection_database_roundtrip(
        rank in any::<i64>(),
        health in any::<i64>(),
        experience in any::<i64>(),
        flagged in any::<bool>(),
    ) {
        let registry = registry();
        let mut props = PropertyCollection::new(Arc::clone(&registry));
        props.set(PropertyEnum::RANK, rank).unwrap();
        props.set(PropertyEnum::HEALTH, health).unwrap();
        props.set(PropertyEnum::EXPERIENCE, experience).unwrap();
        props.set(PropertyEnum::FLAGGED, flagged).unwrap();

        let mut archive = Archive::packing(SerializeContext::Database, VisibilityPolicy::NONE);
        prop_assert!(props.serialize(&mut archive));

        let mut reader = reopen(&archive);
        let mut decoded = PropertyCollection::new(registry);
        prop_assert!(decoded.serialize(&mut reader));

        prop_assert_eq!(decoded.get_integer(PropertyEnum::RANK).unwrap(), rank);
        prop_assert_eq!(decoded.get_integer(PropertyEnum::HEALTH).unwrap(), health);
        prop_assert_eq!(decoded.get_integer(PropertyEnum::EXPERIENCE).unwrap(), experience);
        // Flagged is replicated, never stored
        prop_assert!(!decoded.contains(PropertyEnum::FLAGGED));
    }
}

// Property: hostile bytes never panic the collection or record decoders
proptest! {
    #[test]
    fn prop_garbage_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        for context in [SerializeContext::Replication, SerializeContext::Database, SerializeContext::Migration] {
            if let Ok(mut reader) = Archive::unpacking(context, data.clone()) {
                let mut props = PropertyCollection::new(registry());
                let _ = props.serialize(&mut reader);
            }
        }

        if let Ok(mut reader) = Archive::unpacking(SerializeContext::Replication, data.clone()) {
            let mut state = LocomotionState::default();
            let _ = state.transfer(&mut reader, LocomotionMessageFlags(LocomotionMessageFlags::MASK));
        }
    }
}
