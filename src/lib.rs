//! # Replica Archive
//!
//! Wire-compatible binary serialization for replicated game state.
//!
//! ## Layers
//! - **core**: varint/zigzag/fixed-point codec, the dual-mode [`Archive`] and the
//!   [`Transfer`] routines every record is written with
//! - **properties**: typed property ids and values, the kind registry, and
//!   [`PropertyCollection`] / [`ReplicatedPropertyCollection`]
//! - **records**: flag-gated entity records such as [`EnterGameWorldArchive`]
//! - **utils**: buffer pool, logging setup and metrics
//!
//! ## Example
//! ```rust
//! use replica_archive::core::archive::{Archive, SerializeContext, VisibilityPolicy};
//! use replica_archive::core::serializer::transfer;
//!
//! let mut archive = Archive::packing(SerializeContext::Replication, VisibilityPolicy::PROXIMITY);
//! let mut rank = 300u32;
//! assert!(transfer(&mut archive, &mut rank));
//!
//! let mut reader = Archive::unpacking(SerializeContext::Replication, archive.to_bytes()).unwrap();
//! let mut decoded = 0u32;
//! assert!(transfer(&mut reader, &mut decoded));
//! assert_eq!(decoded, 300);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod properties;
pub mod records;
pub mod utils;

pub use crate::config::CodecConfig;
pub use crate::core::archive::{
    pack_to_bytes, pack_to_vec, unpack_into, unpack_into_with_limits, Archive, ArchiveLimits,
    ArchiveVersion, SerializeContext, VisibilityPolicy,
};
pub use crate::core::serializer::{Serializable, Transfer};
pub use crate::error::{ArchiveError, Result};
pub use crate::properties::{
    ContentRef, ContentResolver, ContentTable, PropertyCollection, PropertyEnum, PropertyId,
    PropertyInfoTable, PropertyRegistry, PropertyValue, ReplicatedPropertyCollection,
};
pub use crate::records::{EnterGameWorldArchive, LocomotionMessageFlags, LocomotionState};
