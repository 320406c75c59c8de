//! # Error Types
//!
//! Error handling for the archive codec and the property layer.
//!
//! Two failure channels exist side by side:
//!
//! - **Soft failures**: every `transfer_*` call returns `bool`. An archive records the
//!   first [`ArchiveError`] it hits and every later read on that archive fails fast.
//!   Callers AND the booleans together and keep visiting fields in declared order.
//! - **Hard failures**: registration of property metadata, content tables and
//!   configuration return [`Result`]. These surface at startup, never per call.
//!
//! The top-level helpers in [`crate::core::archive`] turn a failed transfer chain into
//! [`ArchiveError::TransferFailed`] so the caller can abort a persistence write or skip
//! an inbound replication update.
//!
//! ## Example Usage
//! ```rust
//! use replica_archive::error::{ArchiveError, Result};
//! use tracing::{error, info};
//!
//! fn check_limit(len: usize) -> Result<usize> {
//!     if len > 16 {
//!         return Err(ArchiveError::LengthLimit { len: len as u64, max: 16 });
//!     }
//!     Ok(len)
//! }
//!
//! match check_limit(32) {
//!     Ok(len) => info!(len, "within limit"),
//!     Err(e) => error!(error = %e, "rejected"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Static error messages, borrowed to keep hot error paths allocation free.
pub mod constants {
    /// Archive errors
    pub const ERR_BOOL_BUFFER_FULL: &str = "Bool bit buffer is full";
    pub const ERR_BOOL_BUFFER_CORRUPT: &str = "Bool bit buffer has an invalid count";
    pub const ERR_BOOL_BUFFER_MISSING: &str = "Failed getting last bit encoded";
    pub const ERR_SKIP_WHILE_PACKING: &str = "Skipping is not supported while packing";
    pub const ERR_READ_WHILE_PACKING: &str = "Cannot read from a packing archive";
    pub const ERR_WRITE_WHILE_UNPACKING: &str = "Cannot write to an unpacking archive";

    /// Registry errors
    pub const ERR_EMPTY_PROPERTY_NAME: &str = "Property name cannot be empty";
    pub const ERR_REGISTRY_GAP: &str = "Property kinds must be registered densely from 0";

    /// Replication errors
    pub const ERR_INVALID_REPLICATION_ID: &str = "Replication id 0 is reserved as invalid";
}

/// Primary error type for archive and property operations
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Buffer exhausted at offset {offset}: needed {needed} byte(s), {available} available")]
    BufferExhausted {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Malformed varint at offset {0}")]
    MalformedVarint(usize),

    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidString(usize),

    #[error("Bool encoding error: {0}")]
    BoolEncoding(&'static str),

    #[error("Nested object size mismatch: expected {expected} bytes, consumed {actual}")]
    SizeMismatch { expected: u32, actual: usize },

    #[error("Length {len} exceeds limit {max}")]
    LengthLimit { len: u64, max: u64 },

    #[error("Invalid archive header")]
    InvalidHeader,

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Unregistered property kind: {0}")]
    UnregisteredKind(u16),

    #[error("Property kind {0} is registered more than once")]
    DuplicateKind(u16),

    #[error("Property kind {kind} out of range (maximum {max})")]
    KindOutOfRange { kind: u64, max: u64 },

    #[error("Property param {index} overflow: {value} > {max}")]
    ParamOverflow { index: usize, value: u32, max: u32 },

    #[error("Property params for kind {0} do not fit in the param bits")]
    ParamBitOverflow(u16),

    #[error("Property kind {kind} expects {expected} param(s), got {actual}")]
    ParamCount {
        kind: u16,
        expected: usize,
        actual: usize,
    },

    #[error("Property type mismatch for kind {kind}: expected {expected}, got {actual}")]
    TypeMismatch {
        kind: u16,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Content reference {0:#x} is registered more than once")]
    DuplicateContent(u64),

    #[error("Registry error: {0}")]
    Registry(&'static str),

    #[error("Collection is already bound with replication id {0}")]
    AlreadyBound(u64),

    #[error("Message for replication id {actual} sent to collection {expected}")]
    ReplicationMismatch { expected: u64, actual: u64 },

    #[error("Transfer failed in {context} archive: {reason}")]
    TransferFailed {
        context: &'static str,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Clone for ArchiveError {
    fn clone(&self) -> Self {
        match self {
            ArchiveError::Io(e) => ArchiveError::Io(io::Error::new(e.kind(), e.to_string())),
            ArchiveError::BufferExhausted {
                offset,
                needed,
                available,
            } => ArchiveError::BufferExhausted {
                offset: *offset,
                needed: *needed,
                available: *available,
            },
            ArchiveError::MalformedVarint(o) => ArchiveError::MalformedVarint(*o),
            ArchiveError::InvalidString(o) => ArchiveError::InvalidString(*o),
            ArchiveError::BoolEncoding(m) => ArchiveError::BoolEncoding(*m),
            ArchiveError::SizeMismatch { expected, actual } => ArchiveError::SizeMismatch {
                expected: *expected,
                actual: *actual,
            },
            ArchiveError::LengthLimit { len, max } => ArchiveError::LengthLimit {
                len: *len,
                max: *max,
            },
            ArchiveError::InvalidHeader => ArchiveError::InvalidHeader,
            ArchiveError::Unsupported(m) => ArchiveError::Unsupported(*m),
            ArchiveError::UnregisteredKind(k) => ArchiveError::UnregisteredKind(*k),
            ArchiveError::DuplicateKind(k) => ArchiveError::DuplicateKind(*k),
            ArchiveError::KindOutOfRange { kind, max } => ArchiveError::KindOutOfRange {
                kind: *kind,
                max: *max,
            },
            ArchiveError::ParamOverflow { index, value, max } => ArchiveError::ParamOverflow {
                index: *index,
                value: *value,
                max: *max,
            },
            ArchiveError::ParamBitOverflow(k) => ArchiveError::ParamBitOverflow(*k),
            ArchiveError::ParamCount {
                kind,
                expected,
                actual,
            } => ArchiveError::ParamCount {
                kind: *kind,
                expected: *expected,
                actual: *actual,
            },
            ArchiveError::TypeMismatch {
                kind,
                expected,
                actual,
            } => ArchiveError::TypeMismatch {
                kind: *kind,
                expected: *expected,
                actual: *actual,
            },
            ArchiveError::DuplicateContent(c) => ArchiveError::DuplicateContent(*c),
            ArchiveError::Registry(m) => ArchiveError::Registry(*m),
            ArchiveError::AlreadyBound(id) => ArchiveError::AlreadyBound(*id),
            ArchiveError::ReplicationMismatch { expected, actual } => {
                ArchiveError::ReplicationMismatch {
                    expected: *expected,
                    actual: *actual,
                }
            }
            ArchiveError::TransferFailed { context, reason } => ArchiveError::TransferFailed {
                context: *context,
                reason: reason.clone(),
            },
            ArchiveError::ConfigError(m) => ArchiveError::ConfigError(m.clone()),
        }
    }
}

/// Type alias for Results using ArchiveError
pub type Result<T> = std::result::Result<T, ArchiveError>;
