//! # Core Codec Components
//!
//! The varint codec, the dual-mode [`archive::Archive`] cursor and the per-shape
//! transfer routines built on top of it.
//!
//! ## Wire Format
//! ```text
//! [header: varint] [fields in declared order ...]
//! ```
//!
//! Fields carry no tags. Packing and unpacking walk the same `transfer` calls, so the
//! reader must know the shape statically; optional fields are gated by flag words that
//! each record type transfers first.

pub mod archive;
pub mod serializer;
pub mod varint;
pub mod vector;
