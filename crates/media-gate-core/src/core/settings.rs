// crates/media-gate-core/src/core/settings.rs
// ============================================================================
// Module: Media Gate Settings
// Description: Typed runtime settings, seed schema, and evaluation snapshots.
// Purpose: Decode durable key/value settings into one immutable snapshot per check.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Runtime settings (thresholds, toggles, quotas) live in the durable
//! settings store as `(key, value, type)` rows. Each admission evaluation
//! loads them once into a [`GovernanceSettings`] snapshot and never re-reads
//! mid-check. When the store is unreachable the snapshot is built from
//! [`GovernanceSettings::conservative_fallback`], which favors denial (guest
//! uploads off, kill switch engaged, free-tier quotas for everyone) and is
//! marked `degraded`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::quota::AccountTier;
use crate::core::quota::HeavyTool;
use crate::core::units::MIB;

// ============================================================================
// SECTION: Setting Keys
// ============================================================================

/// Canonical setting keys.
pub mod keys {
    /// Global maintenance flag.
    pub const MAINTENANCE_MODE: &str = "maintenance_mode";
    /// Global kill switch (one-way latch until an admin clears it).
    pub const KILL_SWITCH_ACTIVE: &str = "kill_switch_active";
    /// Aggregate bytes stored platform-wide.
    pub const GLOBAL_STORAGE_USED: &str = "global_storage_used";
    /// Projected global usage above which uploads trip the kill switch.
    pub const STORAGE_EMERGENCY_THRESHOLD: &str = "storage_emergency_threshold";
    /// Nominal platform storage capacity used for health percentages.
    pub const STORAGE_GLOBAL_CAP: &str = "storage_global_cap";
    /// Free-tier per-user storage limit.
    pub const STORAGE_LIMIT_FREE: &str = "storage_limit_free";
    /// Premium-tier per-user storage limit.
    pub const STORAGE_LIMIT_PREMIUM: &str = "storage_limit_premium";
    /// Free-tier daily OCR limit.
    pub const DAILY_OCR_LIMIT_FREE: &str = "daily_ocr_limit_free";
    /// Premium-tier daily OCR limit.
    pub const DAILY_OCR_LIMIT_PREMIUM: &str = "daily_ocr_limit_premium";
    /// Free-tier daily background-removal limit.
    pub const DAILY_REMOVEBG_LIMIT_FREE: &str = "daily_removebg_limit_free";
    /// Premium-tier daily background-removal limit.
    pub const DAILY_REMOVEBG_LIMIT_PREMIUM: &str = "daily_removebg_limit_premium";
    /// Worker process concurrency ceiling.
    pub const MAX_CONCURRENT_PROCESSES: &str = "max_concurrent_processes";
    /// One-minute load average ceiling for heavy tools.
    pub const CPU_LOAD_THRESHOLD: &str = "cpu_load_threshold";
    /// Lifetime of registered temp files.
    pub const TEMP_FILE_LIFETIME_HOURS: &str = "temp_file_lifetime_hours";
    /// OCR tool toggle.
    pub const TOOL_OCR_ENABLED: &str = "tool_ocr_enabled";
    /// Background-removal tool toggle.
    pub const TOOL_REMOVEBG_ENABLED: &str = "tool_removebg_enabled";
    /// Hourly upload threshold per client.
    pub const ABUSE_UPLOADS_PER_HOUR: &str = "abuse_threshold_uploads_per_hour";
    /// Daily upload threshold per client.
    pub const ABUSE_UPLOADS_PER_DAY: &str = "abuse_threshold_uploads_per_day";
    /// Automatic block duration.
    pub const ABUSE_BLOCK_DURATION_HOURS: &str = "abuse_block_duration_hours";
    /// Automatic block toggle.
    pub const ABUSE_AUTO_BLOCK_ENABLED: &str = "abuse_auto_block_enabled";
    /// Guest upload toggle.
    pub const ABUSE_GUEST_UPLOAD_ENABLED: &str = "abuse_guest_upload_enabled";
    /// Guest upload size ceiling in MiB.
    pub const ABUSE_MAX_FILE_SIZE_GUEST_MB: &str = "abuse_max_file_size_guest_mb";
}

// ============================================================================
// SECTION: Setting Values
// ============================================================================

/// Declared setting type controlling encode/decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    /// Signed integer.
    Int,
    /// Boolean stored as `0`/`1`.
    Bool,
    /// Arbitrary JSON document.
    Json,
    /// Free-form string.
    String,
}

impl SettingType {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Json => "json",
            Self::String => "string",
        }
    }

    /// Parses a storage label.
    ///
    /// # Errors
    ///
    /// Returns [`SettingDecodeError`] for unknown labels.
    pub fn parse(label: &str) -> Result<Self, SettingDecodeError> {
        match label {
            "int" => Ok(Self::Int),
            "bool" => Ok(Self::Bool),
            "json" => Ok(Self::Json),
            "string" => Ok(Self::String),
            other => Err(SettingDecodeError(format!("unknown setting type: {other}"))),
        }
    }
}

/// Typed setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// JSON value.
    Json(Value),
    /// String value.
    String(String),
}

impl SettingValue {
    /// Returns the declared type of this value.
    #[must_use]
    pub const fn setting_type(&self) -> SettingType {
        match self {
            Self::Int(_) => SettingType::Int,
            Self::Bool(_) => SettingType::Bool,
            Self::Json(_) => SettingType::Json,
            Self::String(_) => SettingType::String,
        }
    }

    /// Encodes the value into its storage text form.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Int(value) => value.to_string(),
            Self::Bool(value) => if *value { "1" } else { "0" }.to_string(),
            Self::Json(value) => value.to_string(),
            Self::String(value) => value.clone(),
        }
    }

    /// Decodes a storage text form according to `setting_type`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingDecodeError`] when the text does not match the type.
    pub fn decode(setting_type: SettingType, raw: &str) -> Result<Self, SettingDecodeError> {
        match setting_type {
            SettingType::Int => raw
                .trim()
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|err| SettingDecodeError(format!("invalid int {raw:?}: {err}"))),
            SettingType::Bool => parse_bool(raw)
                .map(Self::Bool)
                .ok_or_else(|| SettingDecodeError(format!("invalid bool {raw:?}"))),
            SettingType::Json => serde_json::from_str(raw)
                .map(Self::Json)
                .map_err(|err| SettingDecodeError(format!("invalid json: {err}"))),
            SettingType::String => Ok(Self::String(raw.to_string())),
        }
    }

    /// Parses an admin-supplied literal, inferring the type.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Int(value);
        }
        match trimmed {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && let Ok(value) = serde_json::from_str(trimmed)
        {
            return Self::Json(value);
        }
        Self::String(raw.to_string())
    }

    /// Interprets the value as an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Bool(value) => Some(i64::from(*value)),
            Self::String(value) => value.trim().parse().ok(),
            Self::Json(value) => value.as_i64(),
        }
    }

    /// Interprets the value as a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Int(value) => Some(*value != 0),
            Self::String(value) => parse_bool(value),
            Self::Json(value) => value.as_bool(),
        }
    }

    /// Interprets the value as a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::String(value) => value.trim().parse().ok(),
            Self::Json(value) => value.as_f64(),
            Self::Bool(_) => None,
        }
    }
}

/// Setting decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("setting decode error: {0}")]
pub struct SettingDecodeError(pub String);

/// One durable setting row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingRecord {
    /// Unique setting key.
    pub key: String,
    /// Typed value.
    pub value: SettingValue,
}

impl SettingRecord {
    /// Creates a setting record.
    #[must_use]
    pub fn new(key: impl Into<String>, value: SettingValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Parses the boolean spellings accepted in storage.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Immutable settings snapshot used for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernanceSettings {
    /// Global maintenance flag.
    pub maintenance_mode: bool,
    /// Global kill switch.
    pub kill_switch_active: bool,
    /// Aggregate bytes stored platform-wide.
    pub global_storage_used: u64,
    /// Emergency ceiling for projected global storage.
    pub storage_emergency_threshold: u64,
    /// Nominal platform capacity for health reporting.
    pub storage_global_cap: u64,
    /// Free-tier per-user storage limit.
    pub storage_limit_free: u64,
    /// Premium-tier per-user storage limit.
    pub storage_limit_premium: u64,
    /// Free-tier daily OCR limit.
    pub daily_ocr_limit_free: u32,
    /// Premium-tier daily OCR limit.
    pub daily_ocr_limit_premium: u32,
    /// Free-tier daily background-removal limit.
    pub daily_removebg_limit_free: u32,
    /// Premium-tier daily background-removal limit.
    pub daily_removebg_limit_premium: u32,
    /// Worker process concurrency ceiling.
    pub max_concurrent_processes: u32,
    /// One-minute load average ceiling.
    pub cpu_load_threshold: f64,
    /// Temp-file lifetime in hours.
    pub temp_file_lifetime_hours: u32,
    /// OCR tool toggle.
    pub tool_ocr_enabled: bool,
    /// Background-removal tool toggle.
    pub tool_removebg_enabled: bool,
    /// Hourly upload threshold per client.
    pub abuse_uploads_per_hour: u32,
    /// Daily upload threshold per client.
    pub abuse_uploads_per_day: u32,
    /// Automatic block duration in hours (0 = permanent).
    pub abuse_block_duration_hours: u32,
    /// Automatic block toggle.
    pub abuse_auto_block_enabled: bool,
    /// Guest upload toggle.
    pub abuse_guest_upload_enabled: bool,
    /// Guest upload size ceiling in MiB.
    pub abuse_max_file_size_guest_mb: u32,
    /// True when built from the conservative fallback because the store failed.
    pub degraded: bool,
    /// Raw rows, including keys without a typed field.
    #[serde(skip)]
    pub(crate) raw: BTreeMap<String, SettingValue>,
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

impl GovernanceSettings {
    /// Deployment defaults, matching the seed rows.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            maintenance_mode: false,
            kill_switch_active: false,
            global_storage_used: 0,
            storage_emergency_threshold: 257_698_037_760,
            storage_global_cap: 268_435_456_000,
            storage_limit_free: 262_144_000,
            storage_limit_premium: 5_368_709_120,
            daily_ocr_limit_free: 5,
            daily_ocr_limit_premium: 50,
            daily_removebg_limit_free: 3,
            daily_removebg_limit_premium: 30,
            max_concurrent_processes: 2,
            cpu_load_threshold: 3.0,
            temp_file_lifetime_hours: 6,
            tool_ocr_enabled: true,
            tool_removebg_enabled: true,
            abuse_uploads_per_hour: 50,
            abuse_uploads_per_day: 200,
            abuse_block_duration_hours: 24,
            abuse_auto_block_enabled: true,
            abuse_guest_upload_enabled: true,
            abuse_max_file_size_guest_mb: 5,
            degraded: false,
            raw: BTreeMap::new(),
        }
    }

    /// Snapshot used when the settings store cannot be read.
    #[must_use]
    pub fn conservative_fallback() -> Self {
        let defaults = Self::defaults();
        Self {
            storage_limit_premium: defaults.storage_limit_free,
            daily_ocr_limit_premium: defaults.daily_ocr_limit_free,
            daily_removebg_limit_premium: defaults.daily_removebg_limit_free,
            max_concurrent_processes: 1,
            cpu_load_threshold: 2.0,
            abuse_guest_upload_enabled: false,
            kill_switch_active: true,
            degraded: true,
            ..defaults
        }
    }

    /// Builds a snapshot from stored rows; missing keys keep their defaults.
    #[must_use]
    pub fn from_records(records: &[SettingRecord]) -> Self {
        let mut settings = Self::defaults();
        for record in records {
            settings.apply(&record.key, &record.value);
            settings.raw.insert(record.key.clone(), record.value.clone());
        }
        settings
    }

    /// Returns a raw stored value, or `default` when the key is absent.
    #[must_use]
    pub fn get_or(&self, key: &str, default: SettingValue) -> SettingValue {
        self.raw.get(key).cloned().unwrap_or(default)
    }

    /// Returns the daily limit for `tool` at `tier`.
    #[must_use]
    pub const fn daily_limit(&self, tool: HeavyTool, tier: AccountTier) -> u32 {
        match (tool, tier) {
            (HeavyTool::Ocr, AccountTier::Free) => self.daily_ocr_limit_free,
            (HeavyTool::Ocr, AccountTier::Premium) => self.daily_ocr_limit_premium,
            (HeavyTool::RemoveBg, AccountTier::Free) => self.daily_removebg_limit_free,
            (HeavyTool::RemoveBg, AccountTier::Premium) => self.daily_removebg_limit_premium,
        }
    }

    /// Returns the tier default storage limit.
    #[must_use]
    pub const fn tier_storage_limit(&self, tier: AccountTier) -> u64 {
        match tier {
            AccountTier::Free => self.storage_limit_free,
            AccountTier::Premium => self.storage_limit_premium,
        }
    }

    /// Returns whether `tool` is enabled.
    #[must_use]
    pub const fn tool_enabled(&self, tool: HeavyTool) -> bool {
        match tool {
            HeavyTool::Ocr => self.tool_ocr_enabled,
            HeavyTool::RemoveBg => self.tool_removebg_enabled,
        }
    }

    /// Guest upload ceiling in bytes.
    #[must_use]
    pub const fn guest_max_upload_bytes(&self) -> u64 {
        (self.abuse_max_file_size_guest_mb as u64).saturating_mul(MIB)
    }

    /// Applies one stored row onto the typed fields.
    fn apply(&mut self, key: &str, value: &SettingValue) {
        match key {
            keys::MAINTENANCE_MODE => set_bool(&mut self.maintenance_mode, value),
            keys::KILL_SWITCH_ACTIVE => set_bool(&mut self.kill_switch_active, value),
            keys::GLOBAL_STORAGE_USED => set_u64(&mut self.global_storage_used, value),
            keys::STORAGE_EMERGENCY_THRESHOLD => {
                set_u64(&mut self.storage_emergency_threshold, value);
            }
            keys::STORAGE_GLOBAL_CAP => set_u64(&mut self.storage_global_cap, value),
            keys::STORAGE_LIMIT_FREE => set_u64(&mut self.storage_limit_free, value),
            keys::STORAGE_LIMIT_PREMIUM => set_u64(&mut self.storage_limit_premium, value),
            keys::DAILY_OCR_LIMIT_FREE => set_u32(&mut self.daily_ocr_limit_free, value),
            keys::DAILY_OCR_LIMIT_PREMIUM => set_u32(&mut self.daily_ocr_limit_premium, value),
            keys::DAILY_REMOVEBG_LIMIT_FREE => set_u32(&mut self.daily_removebg_limit_free, value),
            keys::DAILY_REMOVEBG_LIMIT_PREMIUM => {
                set_u32(&mut self.daily_removebg_limit_premium, value);
            }
            keys::MAX_CONCURRENT_PROCESSES => set_u32(&mut self.max_concurrent_processes, value),
            keys::CPU_LOAD_THRESHOLD => {
                if let Some(parsed) = value.as_f64().filter(|v| v.is_finite() && *v >= 0.0) {
                    self.cpu_load_threshold = parsed;
                }
            }
            keys::TEMP_FILE_LIFETIME_HOURS => set_u32(&mut self.temp_file_lifetime_hours, value),
            keys::TOOL_OCR_ENABLED => set_bool(&mut self.tool_ocr_enabled, value),
            keys::TOOL_REMOVEBG_ENABLED => set_bool(&mut self.tool_removebg_enabled, value),
            keys::ABUSE_UPLOADS_PER_HOUR => set_u32(&mut self.abuse_uploads_per_hour, value),
            keys::ABUSE_UPLOADS_PER_DAY => set_u32(&mut self.abuse_uploads_per_day, value),
            keys::ABUSE_BLOCK_DURATION_HOURS => {
                set_u32(&mut self.abuse_block_duration_hours, value);
            }
            keys::ABUSE_AUTO_BLOCK_ENABLED => set_bool(&mut self.abuse_auto_block_enabled, value),
            keys::ABUSE_GUEST_UPLOAD_ENABLED => {
                set_bool(&mut self.abuse_guest_upload_enabled, value);
            }
            keys::ABUSE_MAX_FILE_SIZE_GUEST_MB => {
                set_u32(&mut self.abuse_max_file_size_guest_mb, value);
            }
            _ => {}
        }
    }
}

/// Overwrites `slot` when `value` reads as a boolean.
fn set_bool(slot: &mut bool, value: &SettingValue) {
    if let Some(parsed) = value.as_bool() {
        *slot = parsed;
    }
}

/// Overwrites `slot` when `value` reads as an integer; negatives clamp to zero.
fn set_u64(slot: &mut u64, value: &SettingValue) {
    if let Some(parsed) = value.as_i64() {
        *slot = u64::try_from(parsed).unwrap_or(0);
    }
}

/// Overwrites `slot` when `value` reads as an integer; out-of-range values clamp.
fn set_u32(slot: &mut u32, value: &SettingValue) {
    if let Some(parsed) = value.as_i64() {
        *slot = u32::try_from(parsed.max(0)).unwrap_or(u32::MAX);
    }
}

// ============================================================================
// SECTION: Seed
// ============================================================================

/// Rows written at deploy time; existing rows are never overwritten by a seed.
#[must_use]
pub fn seed_records() -> Vec<SettingRecord> {
    let d = GovernanceSettings::defaults();
    vec![
        SettingRecord::new(keys::MAINTENANCE_MODE, SettingValue::Bool(d.maintenance_mode)),
        SettingRecord::new(keys::KILL_SWITCH_ACTIVE, SettingValue::Bool(d.kill_switch_active)),
        SettingRecord::new(keys::GLOBAL_STORAGE_USED, SettingValue::Int(0)),
        SettingRecord::new(
            keys::STORAGE_EMERGENCY_THRESHOLD,
            SettingValue::Int(int(d.storage_emergency_threshold)),
        ),
        SettingRecord::new(keys::STORAGE_GLOBAL_CAP, SettingValue::Int(int(d.storage_global_cap))),
        SettingRecord::new(keys::STORAGE_LIMIT_FREE, SettingValue::Int(int(d.storage_limit_free))),
        SettingRecord::new(
            keys::STORAGE_LIMIT_PREMIUM,
            SettingValue::Int(int(d.storage_limit_premium)),
        ),
        SettingRecord::new(
            keys::DAILY_OCR_LIMIT_FREE,
            SettingValue::Int(i64::from(d.daily_ocr_limit_free)),
        ),
        SettingRecord::new(
            keys::DAILY_OCR_LIMIT_PREMIUM,
            SettingValue::Int(i64::from(d.daily_ocr_limit_premium)),
        ),
        SettingRecord::new(
            keys::DAILY_REMOVEBG_LIMIT_FREE,
            SettingValue::Int(i64::from(d.daily_removebg_limit_free)),
        ),
        SettingRecord::new(
            keys::DAILY_REMOVEBG_LIMIT_PREMIUM,
            SettingValue::Int(i64::from(d.daily_removebg_limit_premium)),
        ),
        SettingRecord::new(
            keys::MAX_CONCURRENT_PROCESSES,
            SettingValue::Int(i64::from(d.max_concurrent_processes)),
        ),
        SettingRecord::new(keys::CPU_LOAD_THRESHOLD, SettingValue::String("3.0".to_string())),
        SettingRecord::new(
            keys::TEMP_FILE_LIFETIME_HOURS,
            SettingValue::Int(i64::from(d.temp_file_lifetime_hours)),
        ),
        SettingRecord::new(keys::TOOL_OCR_ENABLED, SettingValue::Bool(true)),
        SettingRecord::new(keys::TOOL_REMOVEBG_ENABLED, SettingValue::Bool(true)),
        SettingRecord::new(
            keys::ABUSE_UPLOADS_PER_HOUR,
            SettingValue::Int(i64::from(d.abuse_uploads_per_hour)),
        ),
        SettingRecord::new(
            keys::ABUSE_UPLOADS_PER_DAY,
            SettingValue::Int(i64::from(d.abuse_uploads_per_day)),
        ),
        SettingRecord::new(
            keys::ABUSE_BLOCK_DURATION_HOURS,
            SettingValue::Int(i64::from(d.abuse_block_duration_hours)),
        ),
        SettingRecord::new(keys::ABUSE_AUTO_BLOCK_ENABLED, SettingValue::Bool(true)),
        SettingRecord::new(keys::ABUSE_GUEST_UPLOAD_ENABLED, SettingValue::Bool(true)),
        SettingRecord::new(
            keys::ABUSE_MAX_FILE_SIZE_GUEST_MB,
            SettingValue::Int(i64::from(d.abuse_max_file_size_guest_mb)),
        ),
    ]
}

/// Converts a byte quantity into a storable integer.
fn int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
