// crates/media-gate-config/src/lib.rs
// ============================================================================
// Module: Media Gate Config
// Description: TOML configuration model, loading, and validation.
// Purpose: Resolve deployment wiring for the media-gate binary fail-closed.
// Dependencies: media-gate-core, media-gate-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`MediaGateConfig`] carries deployment wiring only: where the `SQLite`
//! store lives, rate-window sizing, the temp root, scheduler cadence, host
//! probe targets, and the audit sink. Runtime thresholds and toggles live in
//! the settings store instead and are never read from this file.
//!
//! Resolution order for [`MediaGateConfig::load`]:
//! 1. the explicit path, if given;
//! 2. the `MEDIA_GATE_CONFIG` environment variable;
//! 3. `media-gate.toml` in the working directory.
//!
//! An explicit or environment path must exist. A missing working-directory
//! file yields [`MediaGateConfig::default`]. Inputs are untrusted: files are
//! size-limited, must be UTF-8, and reject unknown fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use media_gate_core::FileAuditSink;
use media_gate_core::GovernanceAuditSink;
use media_gate_core::NoopAuditSink;
use media_gate_core::RateLimitPolicy;
use media_gate_core::StderrAuditSink;
use media_gate_store_sqlite::SqliteStoreConfig;
use media_gate_store_sqlite::SqliteStoreMode;
use media_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "MEDIA_GATE_CONFIG";
/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_NAME: &str = "media-gate.toml";
/// Maximum config file size in bytes.
pub const MAX_CONFIG_FILE_BYTES: u64 = 1024 * 1024;
/// Maximum total config path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single config path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum rate-limit salt length.
const MAX_SALT_LENGTH: usize = 256;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Config loading and validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file is not valid TOML for this model.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config values violate a constraint.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MediaGateConfig {
    /// Durable store location and tuning.
    #[serde(default)]
    pub store: StoreConfig,
    /// Fixed-window rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Temp-file root.
    #[serde(default)]
    pub temp_files: TempFilesConfig,
    /// Background maintenance cadence.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Host probe targets.
    #[serde(default)]
    pub probes: ProbeConfig,
    /// Audit sink selection.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// `SQLite` database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Store config for the `SQLite` backend.
    #[must_use]
    pub fn sqlite_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests per window for guests.
    #[serde(default = "default_guest_limit")]
    pub guest_limit: u32,
    /// Requests per window for signed-in accounts.
    #[serde(default = "default_user_limit")]
    pub user_limit: u32,
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Idle time after which a window is swept.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    /// Salt mixed into guest address hashes.
    #[serde(default = "default_salt")]
    pub salt: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let policy = RateLimitPolicy::default();
        Self {
            guest_limit: policy.guest_limit,
            user_limit: policy.user_limit,
            window_secs: policy.window_secs,
            idle_ttl_secs: policy.idle_ttl_secs,
            salt: policy.salt,
        }
    }
}

impl RateLimitConfig {
    /// Rate-limit policy for the runtime.
    #[must_use]
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            guest_limit: self.guest_limit,
            user_limit: self.user_limit,
            window_secs: self.window_secs,
            idle_ttl_secs: self.idle_ttl_secs,
            salt: self.salt.clone(),
        }
    }
}

/// `[temp_files]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TempFilesConfig {
    /// Directory holding per-result subdirectories.
    #[serde(default = "default_temp_root")]
    pub root: PathBuf,
}

impl Default for TempFilesConfig {
    fn default() -> Self {
        Self {
            root: default_temp_root(),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Seconds between full maintenance passes.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
    /// Seconds between rate-window sweeps.
    #[serde(default = "default_rate_sweep_interval_secs")]
    pub rate_sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            maintenance_interval_secs: default_maintenance_interval_secs(),
            rate_sweep_interval_secs: default_rate_sweep_interval_secs(),
        }
    }
}

/// `[probes]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    /// Process name counted as a heavy-compute worker.
    #[serde(default = "default_worker_process")]
    pub worker_process: String,
    /// Path whose filesystem is reported as storage.
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            worker_process: default_worker_process(),
            disk_path: default_disk_path(),
        }
    }
}

/// Audit sink kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `audit.path`.
    File,
    /// Discard events.
    None,
}

/// `[audit]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file for the `file` sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Builds the configured sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file sink cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn GovernanceAuditSink>, ConfigError> {
        match self.sink {
            AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
            AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
            AuditSinkKind::File => {
                let path = self.path.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("audit.path required for file sink".to_string())
                })?;
                let sink = FileAuditSink::new(path)
                    .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
                Ok(Arc::new(sink))
            }
        }
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default database file.
fn default_store_path() -> PathBuf {
    PathBuf::from("media-gate.sqlite")
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Default guest limit.
fn default_guest_limit() -> u32 {
    RateLimitPolicy::default().guest_limit
}

/// Default account limit.
fn default_user_limit() -> u32 {
    RateLimitPolicy::default().user_limit
}

/// Default window length.
fn default_window_secs() -> u64 {
    RateLimitPolicy::default().window_secs
}

/// Default idle TTL.
fn default_idle_ttl_secs() -> u64 {
    RateLimitPolicy::default().idle_ttl_secs
}

/// Default guest salt.
fn default_salt() -> String {
    RateLimitPolicy::default().salt
}

/// Default temp root under the OS temp directory.
fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("media-gate")
}

/// Default maintenance cadence (hourly).
const fn default_maintenance_interval_secs() -> u64 {
    3_600
}

/// Default sweep cadence (every minute).
const fn default_rate_sweep_interval_secs() -> u64 {
    60
}

/// Default worker process name.
fn default_worker_process() -> String {
    "python".to_string()
}

/// Default storage mount.
fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl MediaGateConfig {
    /// Resolves, reads, parses, and validates the config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, oversized, not
    /// UTF-8, malformed, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let (resolved, required) = match (path, env_path) {
            (Some(path), _) => (path.to_path_buf(), true),
            (None, Some(env_path)) => (env_path, true),
            (None, None) => (PathBuf::from(DEFAULT_CONFIG_NAME), false),
        };
        validate_config_path(&resolved)?;
        if !required && !resolved.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let text = read_config_text(&resolved)?;
        Self::from_toml(&text)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is malformed or invalid.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.path.as_os_str().is_empty() {
            return Err(invalid("store.path must be non-empty"));
        }
        let rate = &self.rate_limit;
        if rate.guest_limit == 0 || rate.user_limit == 0 {
            return Err(invalid("rate_limit limits must be greater than zero"));
        }
        if rate.window_secs == 0 {
            return Err(invalid("rate_limit.window_secs must be greater than zero"));
        }
        if rate.idle_ttl_secs < rate.window_secs {
            return Err(invalid("rate_limit.idle_ttl_secs must be at least window_secs"));
        }
        if rate.salt.trim().is_empty() || rate.salt.len() > MAX_SALT_LENGTH {
            return Err(invalid("rate_limit.salt must be 1..=256 bytes"));
        }
        if self.temp_files.root.as_os_str().is_empty() {
            return Err(invalid("temp_files.root must be non-empty"));
        }
        if self.scheduler.maintenance_interval_secs == 0
            || self.scheduler.rate_sweep_interval_secs == 0
        {
            return Err(invalid("scheduler intervals must be greater than zero"));
        }
        if self.probes.worker_process.trim().is_empty() {
            return Err(invalid("probes.worker_process must be non-empty"));
        }
        if self.audit.sink == AuditSinkKind::File && self.audit.path.is_none() {
            return Err(invalid("audit.path required for file sink"));
        }
        Ok(())
    }
}

/// Builds an [`ConfigError::Invalid`].
fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

/// Rejects paths beyond the length limits.
fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(invalid("config path exceeds max length"));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(invalid("config path component too long"));
    }
    Ok(())
}

/// Reads the config file with size and encoding checks.
fn read_config_text(path: &Path) -> Result<String, ConfigError> {
    let metadata =
        fs::metadata(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    if metadata.len() > MAX_CONFIG_FILE_BYTES {
        return Err(invalid("config file exceeds size limit"));
    }
    let bytes =
        fs::read(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    String::from_utf8(bytes).map_err(|_| invalid("config file must be utf-8"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn empty_document_takes_every_default() {
        let config = MediaGateConfig::from_toml("").unwrap();
        assert_eq!(config, MediaGateConfig::default());
        assert_eq!(config.rate_limit.policy(), RateLimitPolicy::default());
        assert_eq!(config.store.sqlite_config().busy_timeout_ms, 5_000);
    }

    #[test]
    fn path_limits_are_enforced() {
        let long = "a".repeat(300);
        assert_eq!(
            validate_config_path(Path::new(&long)),
            Err(invalid("config path component too long"))
        );
    }
}
