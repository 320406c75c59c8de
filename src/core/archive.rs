//! # Archive
//!
//! A byte-buffer cursor fixed at construction to one [`ArchiveMode`] and one
//! [`SerializeContext`]. Every `Transfer` routine receives the same archive in both
//! directions and branches on [`Archive::is_packing`] internally, so a record type has a
//! single field order shared by its packer and its unpacker.
//!
//! ## Header
//! ```text
//! Replication:          [policy mask: varint]
//! Database / Migration: [layout version: varint]
//! ```
//!
//! ## Failure Model
//! Primitive operations return `bool`. The first failure is recorded on the archive and
//! logged once; every later read on a failed unpacking archive returns `false` without
//! moving the cursor. Callers AND results together and keep visiting their remaining
//! fields. [`pack_to_bytes`], [`pack_to_vec`] and [`unpack_into`] convert a failed chain
//! into [`ArchiveError::TransferFailed`].
//!
//! ## Buffers
//! Packing archives draw their output buffer from a [`BufferPool`]; the buffer goes back
//! to the pool when the archive is dropped, including on failure paths. Unpacking
//! archives hold a [`Bytes`] handle and slice strings out of it without copying.

use crate::core::serializer::Serializable;
use crate::core::varint;
use crate::error::{constants, ArchiveError, Result};
use crate::utils::buffer_pool::{BufferPool, PooledBuffer};
use crate::utils::metrics::{global_metrics, Timer};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use tracing::{debug, error, warn};

/// Size of an unencoded count or size frame
pub const UNENCODED_U32_LEN: usize = 4;

/// Number of bools that fit in one packed byte
const MAX_BOOLS_PER_BYTE: u8 = 5;

static PACKING_POOL: OnceCell<BufferPool> = OnceCell::new();

/// Install the process-wide packing buffer pool.
///
/// Returns `false` if a pool was already installed (explicitly or by first use).
pub fn init_packing_pool(pool: BufferPool) -> bool {
    PACKING_POOL.set(pool).is_ok()
}

/// Pool used by [`Archive::packing`] and friends
pub fn packing_pool() -> &'static BufferPool {
    PACKING_POOL.get_or_init(BufferPool::default)
}

/// Direction of an archive, fixed for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    Packing,
    Unpacking,
}

/// Consumer an archive is produced for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SerializeContext {
    /// Server to server hand-off
    Migration = 1,
    /// Persistent storage
    Database = 2,
    /// Live network replication
    Replication = 3,
}

impl SerializeContext {
    pub const fn as_str(self) -> &'static str {
        match self {
            SerializeContext::Migration => "migration",
            SerializeContext::Database => "database",
            SerializeContext::Replication => "replication",
        }
    }
}

impl fmt::Display for SerializeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout version written into persistent archive headers.
///
/// Every change to a persisted record layout adds a version here and moves
/// [`ArchiveVersion::CURRENT`] forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArchiveVersion(pub u32);

impl ArchiveVersion {
    pub const INVALID: ArchiveVersion = ArchiveVersion(0);
    pub const INITIAL: ArchiveVersion = ArchiveVersion(1);
    /// Nested objects gain a 4-byte size frame from this version on
    pub const ADDED_MISSIONS: ArchiveVersion = ArchiveVersion(2);
    pub const ADDED_VENDOR_PURCHASE_DATA: ArchiveVersion = ArchiveVersion(3);
    pub const IMPLEMENTED_CONDITION_PERSISTENCE: ArchiveVersion = ArchiveVersion(4);
    pub const IMPLEMENTED_LOGIN_REWARDS: ArchiveVersion = ArchiveVersion(5);
    pub const IMPLEMENTED_MAP_DISCOVERY_DATA_PERSISTENCE: ArchiveVersion = ArchiveVersion(6);
    pub const ADDED_REGION_PROTO_REF_TO_MAP_DISCOVERY_DATA: ArchiveVersion = ArchiveVersion(7);

    pub const CURRENT: ArchiveVersion = Self::ADDED_REGION_PROTO_REF_TO_MAP_DISCOVERY_DATA;

    pub const fn is_valid(self) -> bool {
        self.0 >= Self::INITIAL.0 && self.0 <= Self::CURRENT.0
    }
}

impl Default for ArchiveVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ArchiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Interest channels a replication archive is built for.
///
/// Each property kind declares the channels it replicates on; a replication archive only
/// carries kinds whose channels intersect its mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VisibilityPolicy(pub u64);

impl VisibilityPolicy {
    pub const NONE: VisibilityPolicy = VisibilityPolicy(0);
    pub const PROXIMITY: VisibilityPolicy = VisibilityPolicy(1 << 0);
    pub const PARTY: VisibilityPolicy = VisibilityPolicy(1 << 1);
    pub const OWNER: VisibilityPolicy = VisibilityPolicy(1 << 2);
    pub const TRADER: VisibilityPolicy = VisibilityPolicy(1 << 3);
    pub const DISCOVERY: VisibilityPolicy = VisibilityPolicy(1 << 4);
    pub const ALL: VisibilityPolicy = VisibilityPolicy(0x1F);

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn intersects(self, other: VisibilityPolicy) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: VisibilityPolicy) -> bool {
        self.0 & other.0 == other.0
    }

    /// Channels in `self` that are not in `other`
    pub const fn difference(self, other: VisibilityPolicy) -> VisibilityPolicy {
        VisibilityPolicy(self.0 & !other.0)
    }
}

impl BitOr for VisibilityPolicy {
    type Output = VisibilityPolicy;

    fn bitor(self, rhs: VisibilityPolicy) -> VisibilityPolicy {
        VisibilityPolicy(self.0 | rhs.0)
    }
}

impl BitOrAssign for VisibilityPolicy {
    fn bitor_assign(&mut self, rhs: VisibilityPolicy) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for VisibilityPolicy {
    type Output = VisibilityPolicy;

    fn bitand(self, rhs: VisibilityPolicy) -> VisibilityPolicy {
        VisibilityPolicy(self.0 & rhs.0)
    }
}

/// Decode limits applied to lengths read from untrusted input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_string_len: u32,
    pub max_list_len: u32,
    pub max_property_count: u32,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_string_len: 64 * 1024,
            max_list_len: 64 * 1024,
            max_property_count: 16 * 1024,
        }
    }
}

/// Position of a nested object's size frame, returned by [`Archive::begin_object`]
#[derive(Debug, Clone, Copy)]
pub struct ObjectFrame {
    start: usize,
    size: u32,
    framed: bool,
}

enum Stream {
    Output(PooledBuffer),
    Input { data: Bytes, position: usize },
}

/// Fixed-mode, fixed-context serialization cursor
pub struct Archive {
    stream: Stream,
    context: SerializeContext,
    version: ArchiveVersion,
    policy: VisibilityPolicy,
    limits: ArchiveLimits,
    last_bool_offset: Option<usize>,
    bool_buffer: u8,
    bools_read: u8,
    error: Option<ArchiveError>,
}

impl Archive {
    /// Packing archive at the current layout version, backed by the shared pool
    pub fn packing(context: SerializeContext, policy: VisibilityPolicy) -> Self {
        Self::packing_in(
            packing_pool(),
            context,
            policy,
            ArchiveVersion::CURRENT,
            ArchiveLimits::default(),
        )
    }

    /// Packing archive that writes an explicit layout version into its header
    pub fn packing_with_version(context: SerializeContext, version: ArchiveVersion) -> Self {
        Self::packing_in(
            packing_pool(),
            context,
            VisibilityPolicy::NONE,
            version,
            ArchiveLimits::default(),
        )
    }

    /// Fully specified packing archive
    pub fn packing_in(
        pool: &BufferPool,
        context: SerializeContext,
        policy: VisibilityPolicy,
        version: ArchiveVersion,
        limits: ArchiveLimits,
    ) -> Self {
        let mut archive = Self {
            stream: Stream::Output(pool.acquire()),
            context,
            version,
            policy,
            limits,
            last_bool_offset: None,
            bool_buffer: 0,
            bools_read: 0,
            error: None,
        };
        archive.write_header();
        archive
    }

    /// Unpacking archive over `data` with default limits
    pub fn unpacking(context: SerializeContext, data: impl Into<Bytes>) -> Result<Self> {
        Self::unpacking_with_limits(context, data, ArchiveLimits::default())
    }

    /// Unpacking archive over `data`.
    ///
    /// Fails if the header cannot be read or names an unknown layout version.
    pub fn unpacking_with_limits(
        context: SerializeContext,
        data: impl Into<Bytes>,
        limits: ArchiveLimits,
    ) -> Result<Self> {
        let mut archive = Self {
            stream: Stream::Input {
                data: data.into(),
                position: 0,
            },
            context,
            version: ArchiveVersion::INVALID,
            policy: VisibilityPolicy::NONE,
            limits,
            last_bool_offset: None,
            bool_buffer: 0,
            bools_read: 0,
            error: None,
        };

        if !archive.read_header() {
            return Err(archive.error.take().unwrap_or(ArchiveError::InvalidHeader));
        }

        Ok(archive)
    }

    fn write_header(&mut self) {
        match self.context {
            SerializeContext::Replication => {
                self.write_varint(self.policy.bits());
            }
            SerializeContext::Database | SerializeContext::Migration => {
                self.write_varint(u64::from(self.version.0));
            }
        }
    }

    fn read_header(&mut self) -> bool {
        let mut raw = 0u64;
        if !self.read_varint(&mut raw) {
            return false;
        }

        match self.context {
            SerializeContext::Replication => {
                self.policy = VisibilityPolicy(raw);
                true
            }
            SerializeContext::Database | SerializeContext::Migration => {
                let version = u32::try_from(raw).map(ArchiveVersion).ok();
                match version {
                    Some(version) if version.is_valid() => {
                        self.version = version;
                        true
                    }
                    _ => {
                        debug!(raw_version = raw, "Rejected archive layout version");
                        self.fail(ArchiveError::InvalidHeader)
                    }
                }
            }
        }
    }

    pub fn mode(&self) -> ArchiveMode {
        match self.stream {
            Stream::Output(_) => ArchiveMode::Packing,
            Stream::Input { .. } => ArchiveMode::Unpacking,
        }
    }

    #[inline]
    pub fn is_packing(&self) -> bool {
        matches!(self.stream, Stream::Output(_))
    }

    #[inline]
    pub fn is_unpacking(&self) -> bool {
        !self.is_packing()
    }

    pub fn context(&self) -> SerializeContext {
        self.context
    }

    pub fn is_replication(&self) -> bool {
        self.context == SerializeContext::Replication
    }

    pub fn is_database(&self) -> bool {
        self.context == SerializeContext::Database
    }

    pub fn is_migration(&self) -> bool {
        self.context == SerializeContext::Migration
    }

    /// Database archives are the only ones written to storage
    pub fn is_persistent(&self) -> bool {
        self.is_database()
    }

    /// Layout version. Replication archives always report the current version.
    pub fn version(&self) -> ArchiveVersion {
        if self.is_replication() {
            ArchiveVersion::CURRENT
        } else {
            self.version
        }
    }

    /// Visibility mask written into (or read from) a replication header
    pub fn policy(&self) -> VisibilityPolicy {
        self.policy
    }

    pub fn limits(&self) -> &ArchiveLimits {
        &self.limits
    }

    /// Current cursor position in bytes
    pub fn offset(&self) -> usize {
        match &self.stream {
            Stream::Output(buf) => buf.len(),
            Stream::Input { position, .. } => *position,
        }
    }

    /// Unread bytes left in an unpacking archive (0 when packing)
    pub fn remaining(&self) -> usize {
        match &self.stream {
            Stream::Output(_) => 0,
            Stream::Input { data, position } => data.len().saturating_sub(*position),
        }
    }

    /// First error recorded on this archive
    pub fn error(&self) -> Option<&ArchiveError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Record a soft failure and return `false`
    pub fn fail(&mut self, err: ArchiveError) -> bool {
        if self.error.is_none() {
            error!(
                offset = self.offset(),
                context = %self.context,
                error = %err,
                "Archive error"
            );
            global_metrics().transfer_failure();
            self.error = Some(err);
        } else {
            debug!(offset = self.offset(), error = %err, "Archive error after first failure");
        }
        false
    }

    /// Copy of the bytes produced (packing) or consumed from (unpacking) this archive,
    /// for handoff to the transport layer
    pub fn to_bytes(&self) -> Bytes {
        match &self.stream {
            Stream::Output(buf) => Bytes::copy_from_slice(buf),
            Stream::Input { data, .. } => data.clone(),
        }
    }

    /// Owned copy of the archive bytes, for handoff to the persistence layer
    pub fn to_vec(&self) -> Vec<u8> {
        match &self.stream {
            Stream::Output(buf) => buf.to_vec(),
            Stream::Input { data, .. } => data.to_vec(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.stream {
            Stream::Output(buf) => buf.as_slice(),
            Stream::Input { data, .. } => &data[..],
        }
    }

    fn unread(&self) -> &[u8] {
        match &self.stream {
            Stream::Output(_) => &[],
            Stream::Input { data, position } => data.get(*position..).unwrap_or(&[]),
        }
    }

    fn advance(&mut self, len: usize) {
        if let Stream::Input { position, .. } = &mut self.stream {
            *position += len;
        }
    }

    fn exhausted(&self, needed: usize) -> ArchiveError {
        ArchiveError::BufferExhausted {
            offset: self.offset(),
            needed,
            available: self.remaining(),
        }
    }

    fn wrong_direction(&mut self) -> bool {
        if self.is_packing() {
            self.fail(ArchiveError::Unsupported(constants::ERR_READ_WHILE_PACKING))
        } else {
            self.fail(ArchiveError::Unsupported(constants::ERR_WRITE_WHILE_UNPACKING))
        }
    }

    // Raw stream I/O

    pub fn write_byte(&mut self, value: u8) -> bool {
        if let Stream::Output(buf) = &mut self.stream {
            buf.push(value);
            return true;
        }
        self.wrong_direction()
    }

    pub fn read_byte(&mut self, value: &mut u8) -> bool {
        if self.has_error() {
            return false;
        }
        if self.is_packing() {
            return self.wrong_direction();
        }

        match self.unread().first().copied() {
            Some(byte) => {
                self.advance(1);
                *value = byte;
                true
            }
            None => {
                let err = self.exhausted(1);
                self.fail(err)
            }
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        if let Stream::Output(buf) = &mut self.stream {
            buf.extend_from_slice(bytes);
            return true;
        }
        self.wrong_direction()
    }

    /// Read `len` bytes as a zero-copy slice of the input
    pub fn read_bytes(&mut self, len: usize) -> Option<Bytes> {
        if self.has_error() {
            return None;
        }
        if self.is_packing() {
            self.wrong_direction();
            return None;
        }
        if self.remaining() < len {
            let err = self.exhausted(len);
            self.fail(err);
            return None;
        }

        let slice = match &self.stream {
            Stream::Input { data, position } => data.slice(*position..*position + len),
            Stream::Output(_) => return None,
        };
        self.advance(len);
        Some(slice)
    }

    pub fn write_varint(&mut self, value: u64) -> bool {
        if let Stream::Output(buf) = &mut self.stream {
            varint::write_varint(&mut **buf, value);
            return true;
        }
        self.wrong_direction()
    }

    pub fn read_varint(&mut self, value: &mut u64) -> bool {
        if self.has_error() {
            return false;
        }
        if self.is_packing() {
            return self.wrong_direction();
        }

        match varint::read_varint(self.unread()) {
            Ok((decoded, len)) => {
                self.advance(len);
                *value = decoded;
                true
            }
            Err(ArchiveError::MalformedVarint(at)) => {
                let offset = self.offset() + at;
                self.fail(ArchiveError::MalformedVarint(offset))
            }
            Err(_) => {
                let err = self.exhausted(1);
                self.fail(err)
            }
        }
    }

    /// Write a little-endian `u32` without varint encoding
    pub fn write_unencoded_u32(&mut self, value: u32) -> bool {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Overwrite 4 bytes at `offset` with `value` (little-endian)
    pub fn patch_unencoded_u32(&mut self, offset: usize, value: u32) -> bool {
        if let Stream::Output(buf) = &mut self.stream {
            if let Some(slot) = buf.get_mut(offset..offset + UNENCODED_U32_LEN) {
                slot.copy_from_slice(&value.to_le_bytes());
                return true;
            }
            let err = ArchiveError::BufferExhausted {
                offset,
                needed: UNENCODED_U32_LEN,
                available: buf.len().saturating_sub(offset),
            };
            return self.fail(err);
        }
        self.wrong_direction()
    }

    pub fn read_unencoded_u32(&mut self, value: &mut u32) -> bool {
        match self.read_bytes(UNENCODED_U32_LEN) {
            Some(bytes) => {
                let mut raw = [0u8; UNENCODED_U32_LEN];
                raw.copy_from_slice(&bytes);
                *value = u32::from_le_bytes(raw);
                true
            }
            None => false,
        }
    }

    /// Bools share bytes: low 3 bits hold the count, bits 7..3 hold the values in order.
    ///
    /// ```text
    /// 0x81  true
    /// 0x42  false, true
    /// 0xA3  true, false, true
    /// 0xFD  true x5
    /// ```
    pub fn transfer_bool(&mut self, value: &mut bool) -> bool {
        if self.is_packing() {
            self.pack_bool(*value)
        } else {
            self.unpack_bool(value)
        }
    }

    fn pack_bool(&mut self, value: bool) -> bool {
        let Stream::Output(buf) = &mut self.stream else {
            return false;
        };

        let existing = self.last_bool_offset.and_then(|offset| buf.get(offset).copied());
        if self.last_bool_offset.is_some() && existing.is_none() {
            return self.fail(ArchiveError::BoolEncoding(
                constants::ERR_BOOL_BUFFER_MISSING,
            ));
        }

        let mut bits = existing.unwrap_or(0);
        let count = bits & 0x07;
        if count >= MAX_BOOLS_PER_BYTE {
            return self.fail(ArchiveError::BoolEncoding(constants::ERR_BOOL_BUFFER_FULL));
        }

        bits |= u8::from(value) << (7 - count);
        bits = (bits & 0xF8) | (count + 1);

        match self.last_bool_offset {
            Some(offset) => {
                buf[offset] = bits;
                if count + 1 >= MAX_BOOLS_PER_BYTE {
                    self.last_bool_offset = None;
                }
            }
            None => {
                self.last_bool_offset = Some(buf.len());
                buf.push(bits);
            }
        }

        true
    }

    fn unpack_bool(&mut self, value: &mut bool) -> bool {
        if self.has_error() {
            return false;
        }

        if self.bool_buffer == 0 {
            let mut byte = 0u8;
            if !self.read_byte(&mut byte) {
                return false;
            }
            self.bool_buffer = byte;
        }

        let remaining = self.bool_buffer & 0x07;
        if remaining == 0 || remaining > MAX_BOOLS_PER_BYTE || self.bools_read >= MAX_BOOLS_PER_BYTE {
            self.bool_buffer = 0;
            self.bools_read = 0;
            return self.fail(ArchiveError::BoolEncoding(
                constants::ERR_BOOL_BUFFER_CORRUPT,
            ));
        }

        *value = self.bool_buffer & (1 << (7 - self.bools_read)) != 0;

        let remaining = remaining - 1;
        self.bool_buffer = (self.bool_buffer & 0xF8) | remaining;
        self.bools_read += 1;

        if remaining == 0 {
            self.bool_buffer = 0;
            self.bools_read = 0;
        }

        true
    }

    // Nested object size framing

    /// Nested objects carry a size frame only in persistent archives from
    /// [`ArchiveVersion::ADDED_MISSIONS`] on
    pub fn frames_objects(&self) -> bool {
        self.is_persistent() && self.version >= ArchiveVersion::ADDED_MISSIONS
    }

    /// Open a nested object. Packing reserves the size field; unpacking reads it.
    pub fn begin_object(&mut self) -> (ObjectFrame, bool) {
        let mut frame = ObjectFrame {
            start: self.offset(),
            size: 0,
            framed: self.frames_objects(),
        };

        if !frame.framed {
            return (frame, true);
        }

        let success = if self.is_packing() {
            self.write_unencoded_u32(0)
        } else {
            let mut size = 0u32;
            let ok = self.read_unencoded_u32(&mut size);
            frame.size = size;
            ok
        };

        (frame, success)
    }

    /// Close a nested object opened by [`Archive::begin_object`].
    ///
    /// Packing patches the size (which includes the 4-byte field). Unpacking checks that
    /// exactly that many bytes were consumed, or jumps to the end of the object when
    /// `skip` is set.
    pub fn end_object(&mut self, frame: ObjectFrame, skip: bool) -> bool {
        if !frame.framed {
            return true;
        }

        if self.is_packing() {
            if skip {
                warn!("Attempted to skip a nested object while packing");
                return self.fail(ArchiveError::Unsupported(constants::ERR_SKIP_WHILE_PACKING));
            }
            let size = self.offset().saturating_sub(frame.start);
            let size = match u32::try_from(size) {
                Ok(size) => size,
                Err(_) => {
                    return self.fail(ArchiveError::LengthLimit {
                        len: size as u64,
                        max: u64::from(u32::MAX),
                    })
                }
            };
            return self.patch_unencoded_u32(frame.start, size);
        }

        if self.has_error() {
            return false;
        }

        let end = frame.start + frame.size as usize;
        let current = self.offset();
        if current == end {
            return true;
        }

        if !skip || current > end {
            return self.fail(ArchiveError::SizeMismatch {
                expected: frame.size,
                actual: current - frame.start,
            });
        }

        let gap = end - current;
        if self.remaining() < gap {
            let err = self.exhausted(gap);
            return self.fail(err);
        }
        self.advance(gap);
        true
    }

    /// Skip the framed object at the cursor without decoding it
    pub fn skip_object(&mut self) -> bool {
        if self.is_packing() {
            return self.fail(ArchiveError::Unsupported(constants::ERR_SKIP_WHILE_PACKING));
        }
        let (frame, mut success) = self.begin_object();
        success &= self.end_object(frame, true);
        success
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("mode", &self.mode())
            .field("context", &self.context)
            .field("version", &self.version)
            .field("policy", &self.policy)
            .field("offset", &self.offset())
            .field("error", &self.error)
            .finish()
    }
}

fn transfer_failed(archive: &mut Archive) -> ArchiveError {
    let reason = archive
        .error
        .take()
        .map(|e| e.to_string())
        .unwrap_or_else(|| String::from("transfer returned false"));
    ArchiveError::TransferFailed {
        context: archive.context.as_str(),
        reason,
    }
}

/// Pack `value` into a fresh archive and return its bytes for the transport layer
pub fn pack_to_bytes<T: Serializable + ?Sized>(
    value: &mut T,
    context: SerializeContext,
    policy: VisibilityPolicy,
) -> Result<Bytes> {
    let _timer = Timer::start("pack");
    let mut archive = Archive::packing(context, policy);
    if !value.serialize(&mut archive) {
        warn!(context = %context, "Packing failed, discarding archive");
        return Err(transfer_failed(&mut archive));
    }
    global_metrics().archive_packed(archive.offset() as u64);
    Ok(archive.to_bytes())
}

/// Pack `value` into a fresh archive and return an owned blob for the persistence layer
pub fn pack_to_vec<T: Serializable + ?Sized>(
    value: &mut T,
    context: SerializeContext,
    policy: VisibilityPolicy,
) -> Result<Vec<u8>> {
    let _timer = Timer::start("pack");
    let mut archive = Archive::packing(context, policy);
    if !value.serialize(&mut archive) {
        warn!(context = %context, "Packing failed, discarding archive");
        return Err(transfer_failed(&mut archive));
    }
    global_metrics().archive_packed(archive.offset() as u64);
    Ok(archive.to_vec())
}

/// Unpack `data` into `value` under the default limits.
///
/// On failure `value` may be partially updated; callers discard it or skip the update.
pub fn unpack_into<T: Serializable + ?Sized>(
    value: &mut T,
    context: SerializeContext,
    data: impl Into<Bytes>,
) -> Result<()> {
    unpack_into_with_limits(value, context, data, ArchiveLimits::default())
}

/// Unpack `data` into `value`, rejecting strings, lists and property counts above `limits`
pub fn unpack_into_with_limits<T: Serializable + ?Sized>(
    value: &mut T,
    context: SerializeContext,
    data: impl Into<Bytes>,
    limits: ArchiveLimits,
) -> Result<()> {
    let _timer = Timer::start("unpack");
    let mut archive = Archive::unpacking_with_limits(context, data, limits)?;
    if !value.serialize(&mut archive) {
        warn!(
            context = %context,
            offset = archive.offset(),
            "Unpacking failed, skipping update"
        );
        return Err(transfer_failed(&mut archive));
    }
    if archive.remaining() > 0 {
        debug!(
            trailing = archive.remaining(),
            context = %context,
            "Archive has trailing bytes after unpacking"
        );
    }
    global_metrics().archive_unpacked(archive.offset() as u64);
    Ok(())
}
