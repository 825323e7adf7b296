// crates/media-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Governance Store
// Description: Durable settings, quotas, block list, ledgers, and windows.
// Purpose: Persist governance state with atomic conditional SQL updates.
// Dependencies: media-gate-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements every governance store trait over one `SQLite`
//! database. Each counter mutation is a single statement:
//!
//! - storage counters use `MAX(0, value + delta)` upserts,
//! - the rate-window hit is an upsert whose `WHERE` clause refuses the update
//!   once the window is full,
//! - the daily reset is an `UPDATE ... WHERE marker <> today`.
//!
//! Timestamps are stored as unix epoch milliseconds. Database contents are
//! untrusted: unknown labels and out-of-range numbers surface as
//! [`SqliteStoreError::Invalid`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use media_gate_core::AbuseIncident;
use media_gate_core::AbuseKind;
use media_gate_core::AccountQuota;
use media_gate_core::AccountTier;
use media_gate_core::BlockedBy;
use media_gate_core::BlockedEntry;
use media_gate_core::CalendarDate;
use media_gate_core::ClientId;
use media_gate_core::Clock;
use media_gate_core::FileId;
use media_gate_core::HeavyTool;
use media_gate_core::IncidentFilter;
use media_gate_core::RateEntry;
use media_gate_core::RateHit;
use media_gate_core::RateKey;
use media_gate_core::RateWindow;
use media_gate_core::SettingRecord;
use media_gate_core::SettingType;
use media_gate_core::SettingValue;
use media_gate_core::Severity;
use media_gate_core::StoreError;
use media_gate_core::SystemClock;
use media_gate_core::TempFileHandle;
use media_gate_core::Timestamp;
use media_gate_core::ToolKind;
use media_gate_core::UploadRecord;
use media_gate_core::UsageRecord;
use media_gate_core::UsageStatus;
use media_gate_core::UserId;
use media_gate_core::interfaces::AbuseLog;
use media_gate_core::interfaces::BlockList;
use media_gate_core::interfaces::QuotaLedger;
use media_gate_core::interfaces::RateWindowStore;
use media_gate_core::interfaces::SettingsStore;
use media_gate_core::interfaces::TempFileStore;
use media_gate_core::interfaces::UploadLedger;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::types::Type;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` governance store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Config for `path` with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database is locked by another writer past the busy timeout.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Referenced row does not exist.
    #[error("sqlite store row not found: {0}")]
    NotFound(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Busy(message) => Self::Unavailable(message),
            SqliteStoreError::VersionMismatch(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        let message = error.to_string();
        match error {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::Busy(message)
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::Invalid(message),
            _ => Self::Db(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed governance store.
///
/// # Invariants
/// - Connection access is serialized through a mutex; cross-process writers
///   are serialized by `SQLite` itself.
#[derive(Clone)]
pub struct SqliteGovernanceStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteGovernanceStore {
    /// Opens (and if needed creates) the store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn ping(&self) -> Result<(), SqliteStoreError> {
        self.with_connection(|connection| {
            connection.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }

    /// Runs `operation` against the locked connection.
    fn with_connection<T>(
        &self,
        operation: impl FnOnce(&mut Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))?;
        operation(&mut guard)
    }

    /// [`Self::with_connection`] with the error mapped for trait methods.
    fn run<T>(
        &self,
        operation: impl FnOnce(&mut Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, StoreError> {
        self.with_connection(operation).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

impl SettingsStore for SqliteGovernanceStore {
    fn load_settings(&self) -> Result<Vec<SettingRecord>, StoreError> {
        self.run(|connection| {
            let mut statement = connection
                .prepare("SELECT key, setting_type, value FROM settings ORDER BY key")?;
            let rows = statement
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<(String, String, String)>, _>>()?;
            rows.into_iter()
                .map(|(key, setting_type, raw)| {
                    Ok(SettingRecord::new(key, decode_setting(&setting_type, &raw)?))
                })
                .collect()
        })
    }

    fn get_setting(&self, key: &str) -> Result<Option<SettingValue>, StoreError> {
        self.run(|connection| {
            let row: Option<(String, String)> = connection
                .query_row(
                    "SELECT setting_type, value FROM settings WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(setting_type, raw)| decode_setting(&setting_type, &raw)).transpose()
        })
    }

    fn put_setting(&self, record: &SettingRecord) -> Result<(), StoreError> {
        self.run(|connection| {
            connection.execute(
                "INSERT INTO settings (key, value, setting_type, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     setting_type = excluded.setting_type,
                     updated_at = excluded.updated_at",
                params![
                    record.key,
                    record.value.encode(),
                    record.value.setting_type().as_str(),
                    wall_millis()
                ],
            )?;
            Ok(())
        })
    }

    fn seed_settings(&self, records: &[SettingRecord]) -> Result<u64, StoreError> {
        self.run(|connection| {
            let tx = connection.transaction()?;
            let mut inserted = 0_u64;
            {
                let mut statement = tx.prepare(
                    "INSERT OR IGNORE INTO settings (key, value, setting_type, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                let now = wall_millis();
                for record in records {
                    let changed = statement.execute(params![
                        record.key,
                        record.value.encode(),
                        record.value.setting_type().as_str(),
                        now
                    ])?;
                    inserted += count_u64(changed);
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    fn add_to_counter(&self, key: &str, delta: i64) -> Result<u64, StoreError> {
        self.run(|connection| {
            let value = connection.query_row(
                "INSERT INTO settings (key, value, setting_type, updated_at)
                 VALUES (?1, CAST(MAX(0, ?2) AS TEXT), 'int', ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = CAST(MAX(0, CAST(settings.value AS INTEGER) + ?2) AS TEXT),
                     setting_type = 'int',
                     updated_at = ?3
                 RETURNING CAST(value AS INTEGER)",
                params![key, delta, wall_millis()],
                |row| row.get::<_, i64>(0),
            )?;
            Ok(to_u64(value))
        })
    }
}

// ============================================================================
// SECTION: Quota Ledger
// ============================================================================

/// Column list shared by account queries.
const ACCOUNT_COLUMNS: &str = "user_id, tier, storage_used, storage_limit, daily_ocr_count, \
                               daily_removebg_count, daily_reset_marker";

impl QuotaLedger for SqliteGovernanceStore {
    fn account(&self, user_id: UserId) -> Result<Option<AccountQuota>, StoreError> {
        self.run(|connection| select_account(connection, user_id))
    }

    fn upsert_account(&self, quota: &AccountQuota) -> Result<(), StoreError> {
        self.run(|connection| {
            connection.execute(
                "INSERT INTO accounts (user_id, tier, storage_used, storage_limit, \
                 daily_ocr_count, daily_removebg_count, daily_reset_marker)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id) DO UPDATE SET
                     tier = excluded.tier,
                     storage_used = excluded.storage_used,
                     storage_limit = excluded.storage_limit,
                     daily_ocr_count = excluded.daily_ocr_count,
                     daily_removebg_count = excluded.daily_removebg_count,
                     daily_reset_marker = excluded.daily_reset_marker",
                params![
                    user_key(quota.user_id),
                    quota.tier.as_str(),
                    to_i64(quota.storage_used),
                    to_i64(quota.storage_limit),
                    quota.daily_ocr_count,
                    quota.daily_removebg_count,
                    quota.daily_reset_marker.map(CalendarDate::to_iso_string)
                ],
            )?;
            Ok(())
        })
    }

    fn ensure_account(&self, quota: &AccountQuota) -> Result<bool, StoreError> {
        self.run(|connection| {
            let inserted = connection.execute(
                "INSERT INTO accounts (user_id, tier, storage_used, storage_limit, \
                 daily_ocr_count, daily_removebg_count, daily_reset_marker)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id) DO NOTHING",
                params![
                    user_key(quota.user_id),
                    quota.tier.as_str(),
                    to_i64(quota.storage_used),
                    to_i64(quota.storage_limit),
                    quota.daily_ocr_count,
                    quota.daily_removebg_count,
                    quota.daily_reset_marker.map(CalendarDate::to_iso_string)
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    fn reconcile_daily(
        &self,
        user_id: UserId,
        today: CalendarDate,
    ) -> Result<Option<AccountQuota>, StoreError> {
        self.run(|connection| {
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            reset_stale_daily(&tx, user_id, today)?;
            let account = select_account(&tx, user_id)?;
            tx.commit()?;
            Ok(account)
        })
    }

    fn increment_daily(
        &self,
        user_id: UserId,
        tool: HeavyTool,
        today: CalendarDate,
    ) -> Result<u32, StoreError> {
        let sql = match tool {
            HeavyTool::Ocr => {
                "UPDATE accounts SET daily_ocr_count = daily_ocr_count + 1 WHERE user_id = ?1 \
                 RETURNING daily_ocr_count"
            }
            HeavyTool::RemoveBg => {
                "UPDATE accounts SET daily_removebg_count = daily_removebg_count + 1 WHERE \
                 user_id = ?1 RETURNING daily_removebg_count"
            }
        };
        self.run(|connection| {
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            reset_stale_daily(&tx, user_id, today)?;
            let count: Option<i64> =
                tx.query_row(sql, params![user_key(user_id)], |row| row.get(0)).optional()?;
            let count =
                count.ok_or_else(|| SqliteStoreError::NotFound(format!("account {user_id}")))?;
            tx.commit()?;
            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        })
    }

    fn adjust_storage(&self, user_id: UserId, delta: i64) -> Result<u64, StoreError> {
        self.run(|connection| {
            let value: Option<i64> = connection
                .query_row(
                    "UPDATE accounts SET storage_used = MAX(0, storage_used + ?2) WHERE user_id \
                     = ?1 RETURNING storage_used",
                    params![user_key(user_id), delta],
                    |row| row.get(0),
                )
                .optional()?;
            value
                .map(to_u64)
                .ok_or_else(|| SqliteStoreError::NotFound(format!("account {user_id}")))
        })
    }

    fn append_usage(&self, record: &UsageRecord) -> Result<(), StoreError> {
        self.run(|connection| {
            connection.execute(
                "INSERT INTO usage_logs (user_id, tool, file_size, processing_time_ms, status, \
                 client, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.user_id.map(user_key),
                    record.tool.as_str(),
                    to_i64(record.file_size),
                    to_i64(record.processing_time_ms),
                    record.status.as_str(),
                    record.client.as_ref().map(ClientId::as_str),
                    record.created_at.as_unix_millis()
                ],
            )?;
            Ok(())
        })
    }

    fn usage_records(
        &self,
        user_id: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        self.run(|connection| {
            let mut statement = connection.prepare(
                "SELECT user_id, tool, file_size, processing_time_ms, status, client, created_at
                 FROM usage_logs WHERE (?1 IS NULL OR user_id = ?1)
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let rows = statement
                .query_map(params![user_id.map(user_key), limit_i64(limit)], usage_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Zeroes the daily counters when the marker is not `today`.
fn reset_stale_daily(
    connection: &Connection,
    user_id: UserId,
    today: CalendarDate,
) -> Result<(), SqliteStoreError> {
    connection.execute(
        "UPDATE accounts SET daily_ocr_count = 0, daily_removebg_count = 0, daily_reset_marker = \
         ?2 WHERE user_id = ?1 AND (daily_reset_marker IS NULL OR daily_reset_marker <> ?2)",
        params![user_key(user_id), today.to_iso_string()],
    )?;
    Ok(())
}

/// Loads one account row.
fn select_account(
    connection: &Connection,
    user_id: UserId,
) -> Result<Option<AccountQuota>, SqliteStoreError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1");
    Ok(connection.query_row(&sql, params![user_key(user_id)], account_from_row).optional()?)
}

// ============================================================================
// SECTION: Block List and Abuse Log
// ============================================================================

impl BlockList for SqliteGovernanceStore {
    fn block(&self, entry: &BlockedEntry) -> Result<(), StoreError> {
        self.run(|connection| {
            connection.execute(
                "INSERT INTO blocked_ips (identifier, reason, blocked_by, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(identifier) DO UPDATE SET
                     reason = excluded.reason,
                     blocked_by = excluded.blocked_by,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at",
                params![
                    entry.identifier.as_str(),
                    entry.reason,
                    entry.blocked_by.as_str(),
                    entry.created_at.as_unix_millis(),
                    entry.expires_at.map(Timestamp::as_unix_millis)
                ],
            )?;
            Ok(())
        })
    }

    fn unblock(&self, identifier: &ClientId) -> Result<bool, StoreError> {
        self.run(|connection| {
            let removed = connection.execute(
                "DELETE FROM blocked_ips WHERE identifier = ?1",
                params![identifier.as_str()],
            )?;
            Ok(removed > 0)
        })
    }

    fn active_block(
        &self,
        identifier: &ClientId,
        now: Timestamp,
    ) -> Result<Option<BlockedEntry>, StoreError> {
        self.run(|connection| {
            Ok(connection
                .query_row(
                    "SELECT identifier, reason, blocked_by, created_at, expires_at FROM \
                     blocked_ips WHERE identifier = ?1 AND (expires_at IS NULL OR expires_at > \
                     ?2)",
                    params![identifier.as_str(), now.as_unix_millis()],
                    block_from_row,
                )
                .optional()?)
        })
    }

    fn purge_expired_blocks(&self, now: Timestamp) -> Result<u64, StoreError> {
        self.run(|connection| {
            let removed = connection.execute(
                "DELETE FROM blocked_ips WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now.as_unix_millis()],
            )?;
            Ok(count_u64(removed))
        })
    }

    fn list_blocked(&self, limit: usize) -> Result<Vec<BlockedEntry>, StoreError> {
        self.run(|connection| {
            let mut statement = connection.prepare(
                "SELECT identifier, reason, blocked_by, created_at, expires_at FROM blocked_ips
                 ORDER BY created_at DESC, identifier LIMIT ?1",
            )?;
            let rows = statement
                .query_map(params![limit_i64(limit)], block_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn count_active_blocks(&self, now: Timestamp) -> Result<u64, StoreError> {
        self.run(|connection| {
            let count: i64 = connection.query_row(
                "SELECT COUNT(1) FROM blocked_ips WHERE expires_at IS NULL OR expires_at > ?1",
                params![now.as_unix_millis()],
                |row| row.get(0),
            )?;
            Ok(to_u64(count))
        })
    }
}

impl AbuseLog for SqliteGovernanceStore {
    fn append_incident(&self, incident: &AbuseIncident) -> Result<(), StoreError> {
        self.run(|connection| {
            connection.execute(
                "INSERT INTO abuse_logs (identifier, kind, severity, user_id, details, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    incident.identifier.as_str(),
                    incident.kind.as_str(),
                    incident.severity.as_str(),
                    incident.user_id.map(user_key),
                    incident.details,
                    incident.created_at.as_unix_millis()
                ],
            )?;
            Ok(())
        })
    }

    fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<AbuseIncident>, StoreError> {
        self.run(|connection| {
            let mut statement = connection.prepare(
                "SELECT identifier, kind, severity, user_id, details, created_at FROM abuse_logs
                 WHERE (?1 IS NULL OR kind = ?1) AND (?2 IS NULL OR identifier = ?2)
                 ORDER BY created_at DESC, id DESC LIMIT ?3",
            )?;
            let rows = statement
                .query_map(
                    params![
                        filter.kind.map(AbuseKind::as_str),
                        filter.identifier.as_ref().map(ClientId::as_str),
                        limit_i64(filter.limit)
                    ],
                    incident_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn incidents_since(&self, since: Timestamp) -> Result<Vec<AbuseIncident>, StoreError> {
        self.run(|connection| {
            let mut statement = connection.prepare(
                "SELECT identifier, kind, severity, user_id, details, created_at FROM abuse_logs
                 WHERE created_at >= ?1 ORDER BY created_at, id",
            )?;
            let rows = statement
                .query_map(params![since.as_unix_millis()], incident_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// ============================================================================
// SECTION: Upload Ledger
// ============================================================================

impl UploadLedger for SqliteGovernanceStore {
    fn record_upload(&self, record: &UploadRecord) -> Result<(), StoreError> {
        self.run(|connection| {
            connection.execute(
                "INSERT INTO upload_activity (client, user_id, size, created_at) VALUES (?1, ?2, \
                 ?3, ?4)",
                params![
                    record.client.as_str(),
                    record.user_id.map(user_key),
                    to_i64(record.size),
                    record.created_at.as_unix_millis()
                ],
            )?;
            Ok(())
        })
    }

    fn count_uploads_since(&self, client: &ClientId, since: Timestamp) -> Result<u64, StoreError> {
        self.run(|connection| {
            let count: i64 = connection.query_row(
                "SELECT COUNT(1) FROM upload_activity WHERE client = ?1 AND created_at >= ?2",
                params![client.as_str(), since.as_unix_millis()],
                |row| row.get(0),
            )?;
            Ok(to_u64(count))
        })
    }

    fn uploads_since(&self, since: Timestamp) -> Result<Vec<UploadRecord>, StoreError> {
        self.run(|connection| {
            let mut statement = connection.prepare(
                "SELECT client, user_id, size, created_at FROM upload_activity
                 WHERE created_at >= ?1 ORDER BY created_at, id",
            )?;
            let rows = statement
                .query_map(params![since.as_unix_millis()], |row| {
                    Ok(UploadRecord {
                        client: ClientId::new(row.get::<_, String>(0)?),
                        user_id: optional_user(row, 1)?,
                        size: to_u64(row.get(2)?),
                        created_at: Timestamp::from_unix_millis(row.get(3)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn purge_uploads_before(&self, before: Timestamp) -> Result<u64, StoreError> {
        self.run(|connection| {
            let removed = connection.execute(
                "DELETE FROM upload_activity WHERE created_at < ?1",
                params![before.as_unix_millis()],
            )?;
            Ok(count_u64(removed))
        })
    }
}

// ============================================================================
// SECTION: Rate Windows
// ============================================================================

impl RateWindowStore for SqliteGovernanceStore {
    fn hit(
        &self,
        key: &RateKey,
        limit: u32,
        window_secs: u64,
        now: Timestamp,
    ) -> Result<RateHit, StoreError> {
        let window_ms = to_i64(window_secs).saturating_mul(1_000);
        self.run(|connection| {
            let admitted = if limit == 0 {
                None
            } else {
                connection
                    .query_row(
                        "INSERT INTO rate_limits (key, window_start, request_count, updated_at)
                         VALUES (?1, ?2, 1, ?2)
                         ON CONFLICT(key) DO UPDATE SET
                             window_start = CASE WHEN ?2 - rate_limits.window_start >= ?3
                                 THEN ?2 ELSE rate_limits.window_start END,
                             request_count = CASE WHEN ?2 - rate_limits.window_start >= ?3
                                 THEN 1 ELSE rate_limits.request_count + 1 END,
                             updated_at = ?2
                         WHERE ?2 - rate_limits.window_start >= ?3
                             OR rate_limits.request_count < ?4
                         RETURNING window_start, request_count, updated_at",
                        params![key.as_str(), now.as_unix_millis(), window_ms, limit],
                        window_from_row,
                    )
                    .optional()?
            };
            if let Some(window) = admitted {
                return Ok(RateHit {
                    allowed: true,
                    window,
                });
            }
            let window = select_window(connection, key)?.unwrap_or(RateWindow {
                window_start: now,
                request_count: 0,
                updated_at: now,
            });
            Ok(RateHit {
                allowed: false,
                window,
            })
        })
    }

    fn window(&self, key: &RateKey) -> Result<Option<RateWindow>, StoreError> {
        self.run(|connection| select_window(connection, key))
    }

    fn sweep_idle_windows(&self, idle_before: Timestamp) -> Result<u64, StoreError> {
        self.run(|connection| {
            let removed = connection.execute(
                "DELETE FROM rate_limits WHERE updated_at < ?1",
                params![idle_before.as_unix_millis()],
            )?;
            Ok(count_u64(removed))
        })
    }

    fn rate_entries(&self, limit: usize) -> Result<Vec<RateEntry>, StoreError> {
        self.run(|connection| {
            let mut statement = connection.prepare(
                "SELECT key, window_start, request_count, updated_at FROM rate_limits
                 ORDER BY request_count DESC, key LIMIT ?1",
            )?;
            let rows = statement
                .query_map(params![limit_i64(limit)], |row| {
                    Ok(RateEntry {
                        key: RateKey::from_stored(row.get::<_, String>(0)?),
                        window: RateWindow {
                            window_start: Timestamp::from_unix_millis(row.get(1)?),
                            request_count: row.get(2)?,
                            updated_at: Timestamp::from_unix_millis(row.get(3)?),
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Loads one rate window.
fn select_window(
    connection: &Connection,
    key: &RateKey,
) -> Result<Option<RateWindow>, SqliteStoreError> {
    Ok(connection
        .query_row(
            "SELECT window_start, request_count, updated_at FROM rate_limits WHERE key = ?1",
            params![key.as_str()],
            window_from_row,
        )
        .optional()?)
}

// ============================================================================
// SECTION: Temp Files
// ============================================================================

/// Column list shared by temp-file queries.
const TEMP_FILE_COLUMNS: &str =
    "file_id, owner, path, size, tool, file_name, mime, created_at, expires_at";

impl TempFileStore for SqliteGovernanceStore {
    fn insert_temp_file(&self, handle: &TempFileHandle) -> Result<(), StoreError> {
        self.run(|connection| {
            connection.execute(
                "INSERT INTO temp_files (file_id, owner, path, size, tool, file_name, mime, \
                 created_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    handle.file_id.as_str(),
                    handle.owner.map(user_key),
                    handle.path.to_string_lossy(),
                    to_i64(handle.size),
                    handle.tool,
                    handle.file_name,
                    handle.mime,
                    handle.created_at.as_unix_millis(),
                    handle.expires_at.as_unix_millis()
                ],
            )?;
            Ok(())
        })
    }

    fn temp_file(&self, file_id: &FileId) -> Result<Option<TempFileHandle>, StoreError> {
        self.run(|connection| {
            let sql = format!("SELECT {TEMP_FILE_COLUMNS} FROM temp_files WHERE file_id = ?1");
            Ok(connection
                .query_row(&sql, params![file_id.as_str()], temp_file_from_row)
                .optional()?)
        })
    }

    fn expired_temp_files(&self, now: Timestamp) -> Result<Vec<TempFileHandle>, StoreError> {
        self.run(|connection| {
            let sql = format!(
                "SELECT {TEMP_FILE_COLUMNS} FROM temp_files WHERE expires_at <= ?1 ORDER BY \
                 expires_at"
            );
            let mut statement = connection.prepare(&sql)?;
            let rows = statement
                .query_map(params![now.as_unix_millis()], temp_file_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn live_temp_files(
        &self,
        owner: Option<UserId>,
        now: Timestamp,
    ) -> Result<Vec<TempFileHandle>, StoreError> {
        self.run(|connection| {
            let sql = format!(
                "SELECT {TEMP_FILE_COLUMNS} FROM temp_files WHERE expires_at > ?1 AND (?2 IS \
                 NULL OR owner = ?2) ORDER BY created_at DESC"
            );
            let mut statement = connection.prepare(&sql)?;
            let rows = statement
                .query_map(
                    params![now.as_unix_millis(), owner.map(user_key)],
                    temp_file_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn remove_temp_file(&self, file_id: &FileId) -> Result<bool, StoreError> {
        self.run(|connection| {
            let removed = connection
                .execute("DELETE FROM temp_files WHERE file_id = ?1", params![file_id.as_str()])?;
            Ok(removed > 0)
        })
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Builds a conversion error for column `index`.
fn invalid_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

/// Reads an optional account id column.
fn optional_user(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<UserId>> {
    Ok(row.get::<_, Option<i64>>(index)?.map(|id| UserId::new(to_u64(id))))
}

/// Maps an `accounts` row.
fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountQuota> {
    let marker = row
        .get::<_, Option<String>>(6)?
        .map(|raw| CalendarDate::parse_iso(&raw).map_err(|err| invalid_column(6, err.to_string())))
        .transpose()?;
    Ok(AccountQuota {
        user_id: UserId::new(to_u64(row.get(0)?)),
        tier: AccountTier::parse_or_free(&row.get::<_, String>(1)?),
        storage_used: to_u64(row.get(2)?),
        storage_limit: to_u64(row.get(3)?),
        daily_ocr_count: row.get(4)?,
        daily_removebg_count: row.get(5)?,
        daily_reset_marker: marker,
    })
}

/// Maps a `usage_logs` row.
fn usage_from_row(row: &Row<'_>) -> rusqlite::Result<UsageRecord> {
    let tool_label: String = row.get(1)?;
    let tool = ToolKind::parse(&tool_label)
        .ok_or_else(|| invalid_column(1, format!("unknown tool: {tool_label}")))?;
    Ok(UsageRecord {
        user_id: optional_user(row, 0)?,
        tool,
        file_size: to_u64(row.get(2)?),
        processing_time_ms: to_u64(row.get(3)?),
        status: UsageStatus::parse(&row.get::<_, String>(4)?),
        client: row.get::<_, Option<String>>(5)?.map(ClientId::new),
        created_at: Timestamp::from_unix_millis(row.get(6)?),
    })
}

/// Maps a `blocked_ips` row.
fn block_from_row(row: &Row<'_>) -> rusqlite::Result<BlockedEntry> {
    Ok(BlockedEntry {
        identifier: ClientId::new(row.get::<_, String>(0)?),
        reason: row.get(1)?,
        blocked_by: BlockedBy::parse(&row.get::<_, String>(2)?),
        created_at: Timestamp::from_unix_millis(row.get(3)?),
        expires_at: row.get::<_, Option<i64>>(4)?.map(Timestamp::from_unix_millis),
    })
}

/// Maps an `abuse_logs` row.
fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<AbuseIncident> {
    let kind_label: String = row.get(1)?;
    let kind = AbuseKind::parse(&kind_label)
        .ok_or_else(|| invalid_column(1, format!("unknown abuse kind: {kind_label}")))?;
    let severity_label: String = row.get(2)?;
    let severity = Severity::parse(&severity_label)
        .ok_or_else(|| invalid_column(2, format!("unknown severity: {severity_label}")))?;
    Ok(AbuseIncident {
        identifier: ClientId::new(row.get::<_, String>(0)?),
        kind,
        severity,
        user_id: optional_user(row, 3)?,
        details: row.get(4)?,
        created_at: Timestamp::from_unix_millis(row.get(5)?),
    })
}

/// Maps a rate window projection (`window_start, request_count, updated_at`).
fn window_from_row(row: &Row<'_>) -> rusqlite::Result<RateWindow> {
    Ok(RateWindow {
        window_start: Timestamp::from_unix_millis(row.get(0)?),
        request_count: row.get(1)?,
        updated_at: Timestamp::from_unix_millis(row.get(2)?),
    })
}

/// Maps a `temp_files` row.
fn temp_file_from_row(row: &Row<'_>) -> rusqlite::Result<TempFileHandle> {
    Ok(TempFileHandle {
        file_id: FileId::new(row.get::<_, String>(0)?),
        owner: optional_user(row, 1)?,
        path: PathBuf::from(row.get::<_, String>(2)?),
        size: to_u64(row.get(3)?),
        tool: row.get(4)?,
        file_name: row.get(5)?,
        mime: row.get(6)?,
        created_at: Timestamp::from_unix_millis(row.get(7)?),
        expires_at: Timestamp::from_unix_millis(row.get(8)?),
    })
}

/// Decodes a stored setting.
fn decode_setting(setting_type: &str, raw: &str) -> Result<SettingValue, SqliteStoreError> {
    SettingType::parse(setting_type)
        .and_then(|setting_type| SettingValue::decode(setting_type, raw))
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

// ============================================================================
// SECTION: Numeric Conversions
// ============================================================================

/// Stored account id.
fn user_key(user_id: UserId) -> i64 {
    to_i64(user_id.get())
}

/// Clamps an unsigned amount into an `INTEGER` column.
fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Reads an `INTEGER` column as an unsigned amount, flooring at zero.
fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Converts a `LIMIT` argument.
fn limit_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Converts an affected-row count.
fn count_u64(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// Current wall-clock time for `updated_at` bookkeeping columns.
fn wall_millis() -> i64 {
    SystemClock.now().as_unix_millis()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies the journal, sync, and busy-timeout pragmas.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    setting_type TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS accounts (
                    user_id INTEGER PRIMARY KEY,
                    tier TEXT NOT NULL,
                    storage_used INTEGER NOT NULL DEFAULT 0 CHECK (storage_used >= 0),
                    storage_limit INTEGER NOT NULL,
                    daily_ocr_count INTEGER NOT NULL DEFAULT 0,
                    daily_removebg_count INTEGER NOT NULL DEFAULT 0,
                    daily_reset_marker TEXT
                );
                CREATE TABLE IF NOT EXISTS usage_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER,
                    tool TEXT NOT NULL,
                    file_size INTEGER NOT NULL,
                    processing_time_ms INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    client TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_usage_logs_user
                    ON usage_logs (user_id, created_at);
                CREATE TABLE IF NOT EXISTS blocked_ips (
                    identifier TEXT PRIMARY KEY,
                    reason TEXT NOT NULL,
                    blocked_by TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_blocked_ips_expires
                    ON blocked_ips (expires_at);
                CREATE TABLE IF NOT EXISTS abuse_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    identifier TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    user_id INTEGER,
                    details TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_abuse_logs_created
                    ON abuse_logs (created_at);
                CREATE TABLE IF NOT EXISTS upload_activity (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    client TEXT NOT NULL,
                    user_id INTEGER,
                    size INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_upload_activity_client
                    ON upload_activity (client, created_at);
                CREATE INDEX IF NOT EXISTS idx_upload_activity_created
                    ON upload_activity (created_at);
                CREATE TABLE IF NOT EXISTS rate_limits (
                    key TEXT PRIMARY KEY,
                    window_start INTEGER NOT NULL,
                    request_count INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_rate_limits_updated
                    ON rate_limits (updated_at);
                CREATE TABLE IF NOT EXISTS temp_files (
                    file_id TEXT PRIMARY KEY,
                    owner INTEGER,
                    path TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    tool TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    mime TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_temp_files_expires
                    ON temp_files (expires_at);",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use rusqlite::types::ValueRef;

    use super::*;

    /// Renders a stored SQL value as text.
    fn describe_value(value: ValueRef<'_>) -> String {
        match value {
            ValueRef::Null => "null".to_string(),
            ValueRef::Integer(value) => value.to_string(),
            ValueRef::Real(value) => value.to_string(),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                String::from_utf8_lossy(bytes).into()
            }
        }
    }

    #[test]
    fn busy_errors_map_to_unavailable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let store_error = StoreError::from(SqliteStoreError::from(busy));
        assert!(matches!(store_error, StoreError::Unavailable(_)));
    }

    #[test]
    fn counter_upsert_stores_text_integers() {
        let mut connection = Connection::open_in_memory().unwrap();
        initialize_schema(&mut connection).unwrap();
        let value: i64 = connection
            .query_row(
                "INSERT INTO settings (key, value, setting_type, updated_at)
                 VALUES ('c', CAST(MAX(0, -5) AS TEXT), 'int', 0)
                 RETURNING CAST(value AS INTEGER)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, 0);
        let stored = connection
            .query_row("SELECT value FROM settings WHERE key = 'c'", [], |row| {
                Ok(describe_value(row.get_ref(0)?))
            })
            .unwrap();
        assert_eq!(stored, "0");
        assert_eq!(decode_setting("int", &stored).unwrap(), SettingValue::Int(0));
    }

    #[test]
    fn rejects_directory_paths() {
        let dir = std::env::temp_dir();
        assert!(matches!(validate_store_path(&dir), Err(SqliteStoreError::Invalid(_))));
        assert!(validate_store_path(Path::new("")).is_err());
    }
}
