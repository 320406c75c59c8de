//! # Records
//!
//! Flag-gated entity records. Each record carries a flag word in front of its optional
//! fields and only transfers the fields whose bits are set, in a fixed order.

pub mod enter_world;
pub mod locomotion;

pub use enter_world::{EnterGameWorldArchive, EnterGameWorldFlags};
pub use locomotion::{
    LocomotionFlags, LocomotionMessageFlags, LocomotionState, LocomotorMethod, NaviPathNode, NaviSide,
};
