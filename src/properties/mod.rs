//! # Properties
//!
//! Typed, identified entity state and its replication.
//!
//! ## Components
//! - **id**: 64-bit [`PropertyId`] packing a kind and its params
//! - **value**: [`PropertyValue`] variants and the content resolver seam
//! - **info**: per-kind metadata table and the shared [`PropertyRegistry`]
//! - **collection**: [`PropertyCollection`] storage and archive transfer
//! - **replicated**: [`ReplicatedPropertyCollection`] with binding and change messages

pub mod collection;
pub mod id;
pub mod info;
pub mod replicated;
pub mod value;

pub use collection::PropertyCollection;
pub use id::{PropertyEnum, PropertyId};
pub use info::{
    AggregationMethod, DatabasePolicy, ParamType, PropertyInfo, PropertyInfoTable, PropertyRegistry,
};
pub use replicated::{
    PropertyChange, RemovePropertyMessage, ReplicatedPropertyCollection, ReplicationIdAllocator,
    ReplicationMessage, SetPropertyMessage,
};
pub use value::{ContentRef, ContentResolver, ContentTable, PropertyDataType, PropertyValue};
