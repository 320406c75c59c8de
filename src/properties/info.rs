//! # Property Metadata
//!
//! [`PropertyInfo`] describes one property kind: value type, default, params and the
//! policies that decide which archives carry it. [`PropertyInfoTable`] holds one entry
//! per kind, indexed directly by the kind discriminant, and is built once at startup.
//!
//! Registration errors (duplicate or missing kinds, params that do not fit in the id,
//! defaults of the wrong type) are returned from the builders. A table that builds
//! successfully covers every kind densely from 0.

use crate::core::archive::VisibilityPolicy;
use crate::error::{constants, ArchiveError, Result};
use crate::properties::id::{
    PropertyEnum, PropertyId, MAX_KIND, MAX_PARAM_COUNT, PARAM_BITS,
};
use crate::properties::value::{ContentResolver, PropertyDataType, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// How values of a kind combine across layered collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationMethod {
    #[default]
    None,
    Min,
    Max,
    Sum,
    Mul,
    Set,
}

/// Whether and where a kind is written to storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DatabasePolicy {
    #[default]
    None,
    Frequent,
    PlayerLargeBlob,
}

/// Interpretation of a param slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Integer,
    /// Content table enum index
    ContentRef,
}

/// A declared param slot with its derived bit placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamInfo {
    pub param_type: ParamType,
    pub max_value: u32,
    bit_count: u32,
    offset: u32,
}

impl ParamInfo {
    pub fn bit_count(&self) -> u32 {
        self.bit_count
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bit_count) - 1
    }
}

/// Metadata for one property kind
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    kind: PropertyEnum,
    name: String,
    data_type: PropertyDataType,
    aggregation: AggregationMethod,
    default_value: PropertyValue,
    params: Vec<ParamInfo>,
    replication: VisibilityPolicy,
    database: DatabasePolicy,
    replicate_for_transfer: bool,
}

impl PropertyInfo {
    pub fn builder(
        kind: PropertyEnum,
        name: impl Into<String>,
        data_type: PropertyDataType,
    ) -> PropertyInfoBuilder {
        PropertyInfoBuilder {
            kind,
            name: name.into(),
            data_type,
            aggregation: AggregationMethod::None,
            default_value: None,
            params: Vec::new(),
            replication: VisibilityPolicy::NONE,
            database: DatabasePolicy::None,
            replicate_for_transfer: false,
        }
    }

    pub fn kind(&self) -> PropertyEnum {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> PropertyDataType {
        self.data_type
    }

    pub fn aggregation(&self) -> AggregationMethod {
        self.aggregation
    }

    pub fn default_value(&self) -> PropertyValue {
        self.default_value
    }

    pub fn params(&self) -> &[ParamInfo] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Channels this kind replicates on
    pub fn replication_policy(&self) -> VisibilityPolicy {
        self.replication
    }

    pub fn database_policy(&self) -> DatabasePolicy {
        self.database
    }

    pub fn is_persisted(&self) -> bool {
        self.database != DatabasePolicy::None
    }

    pub fn replicates_for_transfer(&self) -> bool {
        self.replicate_for_transfer
    }

    /// Id for this kind with the given param values
    pub fn encode_params(&self, values: &[u32]) -> Result<PropertyId> {
        if values.len() != self.params.len() {
            return Err(ArchiveError::ParamCount {
                kind: self.kind.0,
                expected: self.params.len(),
                actual: values.len(),
            });
        }

        let mut raw = PropertyId::new(self.kind).raw();
        for (index, (param, &value)) in self.params.iter().zip(values).enumerate() {
            if value > param.max_value {
                return Err(ArchiveError::ParamOverflow {
                    index,
                    value,
                    max: param.max_value,
                });
            }
            raw |= u64::from(value) << param.offset;
        }

        Ok(PropertyId::from_raw(raw))
    }

    /// Param values packed into `id`
    pub fn decode_params(&self, id: PropertyId) -> [u32; MAX_PARAM_COUNT] {
        let mut values = [0u32; MAX_PARAM_COUNT];
        let packed = id.params_raw();
        for (slot, param) in values.iter_mut().zip(&self.params) {
            *slot = ((packed >> param.offset) & param.mask()) as u32;
        }
        values
    }

    /// `name` or `name[p0, p1]`
    pub fn format_id(&self, id: PropertyId) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }
        let values = self.decode_params(id);
        let rendered: Vec<String> = values[..self.params.len()]
            .iter()
            .map(u32::to_string)
            .collect();
        format!("{}[{}]", self.name, rendered.join(", "))
    }
}

/// Builder for [`PropertyInfo`]
#[derive(Debug, Clone)]
pub struct PropertyInfoBuilder {
    kind: PropertyEnum,
    name: String,
    data_type: PropertyDataType,
    aggregation: AggregationMethod,
    default_value: Option<PropertyValue>,
    params: Vec<(ParamType, u32)>,
    replication: VisibilityPolicy,
    database: DatabasePolicy,
    replicate_for_transfer: bool,
}

impl PropertyInfoBuilder {
    pub fn aggregation(mut self, method: AggregationMethod) -> Self {
        self.aggregation = method;
        self
    }

    pub fn default_value(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn param(mut self, param_type: ParamType, max_value: u32) -> Self {
        self.params.push((param_type, max_value));
        self
    }

    pub fn replicate(mut self, policy: VisibilityPolicy) -> Self {
        self.replication = policy;
        self
    }

    pub fn database(mut self, policy: DatabasePolicy) -> Self {
        self.database = policy;
        self
    }

    pub fn replicate_for_transfer(mut self, enabled: bool) -> Self {
        self.replicate_for_transfer = enabled;
        self
    }

    pub fn build(self) -> Result<PropertyInfo> {
        if self.name.is_empty() {
            return Err(ArchiveError::Registry(constants::ERR_EMPTY_PROPERTY_NAME));
        }
        if self.kind.0 > MAX_KIND {
            return Err(ArchiveError::KindOutOfRange {
                kind: u64::from(self.kind.0),
                max: u64::from(MAX_KIND),
            });
        }
        if self.params.len() > MAX_PARAM_COUNT {
            return Err(ArchiveError::ParamCount {
                kind: self.kind.0,
                expected: MAX_PARAM_COUNT,
                actual: self.params.len(),
            });
        }

        let default_value = self
            .default_value
            .unwrap_or_else(|| PropertyValue::zero(self.data_type));
        if default_value.data_type() != self.data_type {
            return Err(ArchiveError::TypeMismatch {
                kind: self.kind.0,
                expected: self.data_type.as_str(),
                actual: default_value.data_type().as_str(),
            });
        }

        // Params fill the id from the top of the param bits downward
        let mut offset = PARAM_BITS as i64;
        let mut params = Vec::with_capacity(self.params.len());
        for (param_type, max_value) in self.params {
            let bit_count = u32::BITS - max_value.leading_zeros();
            offset -= i64::from(bit_count);
            if offset < 0 {
                return Err(ArchiveError::ParamBitOverflow(self.kind.0));
            }
            params.push(ParamInfo {
                param_type,
                max_value,
                bit_count,
                offset: offset as u32,
            });
        }

        Ok(PropertyInfo {
            kind: self.kind,
            name: self.name,
            data_type: self.data_type,
            aggregation: self.aggregation,
            default_value,
            params,
            replication: self.replication,
            database: self.database,
            replicate_for_transfer: self.replicate_for_transfer,
        })
    }
}

/// Dense metadata table indexed by kind
#[derive(Debug, Clone)]
pub struct PropertyInfoTable {
    infos: Vec<PropertyInfo>,
}

impl PropertyInfoTable {
    pub fn builder() -> PropertyInfoTableBuilder {
        PropertyInfoTableBuilder {
            infos: BTreeMap::new(),
        }
    }

    /// Table holding the built-in kinds
    pub fn builtin() -> Result<Self> {
        let proximity = VisibilityPolicy::PROXIMITY;
        let owner = VisibilityPolicy::OWNER;

        Self::builder()
            .register(
                PropertyInfo::builder(PropertyEnum::RANK, "Rank", PropertyDataType::Integer)
                    .replicate(proximity | VisibilityPolicy::PARTY)
                    .database(DatabasePolicy::Frequent)
                    .build()?,
            )?
            .register(
                PropertyInfo::builder(
                    PropertyEnum::ITEM_RARITY,
                    "ItemRarity",
                    PropertyDataType::EnumReference,
                )
                .replicate(proximity | VisibilityPolicy::TRADER)
                .database(DatabasePolicy::Frequent)
                .build()?,
            )?
            .register(
                PropertyInfo::builder(PropertyEnum::FLAGGED, "Flagged", PropertyDataType::Boolean)
                    .replicate(proximity)
                    .build()?,
            )?
            .register(
                PropertyInfo::builder(PropertyEnum::HEALTH, "Health", PropertyDataType::Integer)
                    .aggregation(AggregationMethod::Set)
                    .replicate(proximity)
                    .database(DatabasePolicy::Frequent)
                    .build()?,
            )?
            .register(
                PropertyInfo::builder(
                    PropertyEnum::HEALTH_MAX,
                    "HealthMax",
                    PropertyDataType::Integer,
                )
                .aggregation(AggregationMethod::Sum)
                .default_value(100i64)
                .replicate(proximity)
                .build()?,
            )?
            .register(
                PropertyInfo::builder(
                    PropertyEnum::MOVEMENT_SPEED,
                    "MovementSpeed",
                    PropertyDataType::Raw,
                )
                .aggregation(AggregationMethod::Mul)
                .default_value(1.0f32)
                .replicate(proximity)
                .build()?,
            )?
            .register(
                PropertyInfo::builder(PropertyEnum::POWER_RANK, "PowerRank", PropertyDataType::Integer)
                    .aggregation(AggregationMethod::Max)
                    .param(ParamType::ContentRef, 0xFFFF)
                    .replicate(owner)
                    .database(DatabasePolicy::PlayerLargeBlob)
                    .build()?,
            )?
            .register(
                PropertyInfo::builder(
                    PropertyEnum::DAMAGE_BONUS_VS,
                    "DamageBonusVs",
                    PropertyDataType::Integer,
                )
                .aggregation(AggregationMethod::Sum)
                .param(ParamType::Integer, 7)
                .param(ParamType::ContentRef, 0x3FF)
                .replicate(owner)
                .build()?,
            )?
            .register(
                PropertyInfo::builder(
                    PropertyEnum::EXPERIENCE,
                    "Experience",
                    PropertyDataType::Integer,
                )
                .replicate(owner)
                .database(DatabasePolicy::Frequent)
                .build()?,
            )?
            .register(
                PropertyInfo::builder(
                    PropertyEnum::TRANSFER_TOKEN,
                    "TransferToken",
                    PropertyDataType::Integer,
                )
                .replicate_for_transfer(true)
                .build()?,
            )?
            .register(
                PropertyInfo::builder(
                    PropertyEnum::AI_AGGRO_COUNT,
                    "AiAggroCount",
                    PropertyDataType::Integer,
                )
                .aggregation(AggregationMethod::Min)
                .build()?,
            )?
            .build()
    }

    /// O(1) lookup by kind
    #[inline]
    pub fn lookup(&self, kind: PropertyEnum) -> Option<&PropertyInfo> {
        self.infos.get(kind.index())
    }

    /// O(1) lookup by id
    #[inline]
    pub fn info(&self, id: PropertyId) -> Option<&PropertyInfo> {
        self.infos.get(id.index())
    }

    /// Lookup that treats a miss as an unregistered kind
    pub fn require(&self, kind: PropertyEnum) -> Result<&PropertyInfo> {
        self.lookup(kind)
            .ok_or(ArchiveError::UnregisteredKind(kind.0))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&PropertyInfo> {
        self.infos.iter().find(|info| info.name == name)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyInfo> {
        self.infos.iter()
    }
}

/// Builder for [`PropertyInfoTable`]
#[derive(Debug, Default)]
pub struct PropertyInfoTableBuilder {
    infos: BTreeMap<u16, PropertyInfo>,
}

impl PropertyInfoTableBuilder {
    pub fn register(mut self, info: PropertyInfo) -> Result<Self> {
        let kind = info.kind.0;
        if self.infos.contains_key(&kind) {
            return Err(ArchiveError::DuplicateKind(kind));
        }
        debug!(kind, name = %info.name, data_type = %info.data_type, "Registered property kind");
        self.infos.insert(kind, info);
        Ok(self)
    }

    pub fn build(self) -> Result<PropertyInfoTable> {
        // BTreeMap iterates in key order; any gap shows up as a key/position mismatch
        for (position, &kind) in self.infos.keys().enumerate() {
            if usize::from(kind) != position {
                return Err(ArchiveError::Registry(constants::ERR_REGISTRY_GAP));
            }
        }

        let infos: Vec<PropertyInfo> = self.infos.into_values().collect();
        info!(kinds = infos.len(), "Property info table built");
        Ok(PropertyInfoTable { infos })
    }
}

/// Metadata plus content resolver shared by every collection of a process
pub struct PropertyRegistry {
    infos: PropertyInfoTable,
    content: Arc<dyn ContentResolver>,
}

impl PropertyRegistry {
    pub fn new(infos: PropertyInfoTable, content: Arc<dyn ContentResolver>) -> Self {
        Self { infos, content }
    }

    pub fn infos(&self) -> &PropertyInfoTable {
        &self.infos
    }

    pub fn content(&self) -> &dyn ContentResolver {
        self.content.as_ref()
    }

    pub fn content_arc(&self) -> Arc<dyn ContentResolver> {
        Arc::clone(&self.content)
    }

    /// Id for `kind` with the given params
    pub fn id(&self, kind: PropertyEnum, params: &[u32]) -> Result<PropertyId> {
        self.infos.require(kind)?.encode_params(params)
    }
}

impl std::fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("kinds", &self.infos.len())
            .finish()
    }
}
