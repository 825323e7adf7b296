// crates/media-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Media Gate Interfaces
// Description: Backend-agnostic store and probe contracts for governance state.
// Purpose: Define the durable surfaces consumed by the admission runtime.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Every piece of cross-request state lives behind one of these traits:
//! settings, the quota ledger, the block list, the abuse log, the upload
//! ledger, rate windows, and temp-file handles. Implementations must make
//! each counter mutation a single atomic operation: the rate-window hit is an
//! increment-only-if-under-limit, the daily reset is a conditional write, and
//! storage deltas are floor-clamped at zero. A read-then-write in application
//! code is a defect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AbuseIncident;
use crate::core::AccountQuota;
use crate::core::BlockedEntry;
use crate::core::CalendarDate;
use crate::core::ClientId;
use crate::core::FileId;
use crate::core::HeavyTool;
use crate::core::IncidentFilter;
use crate::core::RateEntry;
use crate::core::RateHit;
use crate::core::RateKey;
use crate::core::RateWindow;
use crate::core::SettingRecord;
use crate::core::SettingValue;
use crate::core::TempFileHandle;
use crate::core::Timestamp;
use crate::core::UploadRecord;
use crate::core::UsageRecord;
use crate::core::UserId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Governance store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("governance store io error: {0}")]
    Io(String),
    /// Store reported an error.
    #[error("governance store error: {0}")]
    Store(String),
    /// Stored data is invalid.
    #[error("governance store invalid data: {0}")]
    Invalid(String),
    /// Store cannot be reached.
    #[error("governance store unavailable: {0}")]
    Unavailable(String),
    /// Referenced record does not exist.
    #[error("governance store record not found: {0}")]
    NotFound(String),
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Durable typed key/value settings.
pub trait SettingsStore: Send + Sync {
    /// Loads every setting row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn load_settings(&self) -> Result<Vec<SettingRecord>, StoreError>;

    /// Loads one setting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn get_setting(&self, key: &str) -> Result<Option<SettingValue>, StoreError>;

    /// Inserts or replaces one setting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_setting(&self, record: &SettingRecord) -> Result<(), StoreError>;

    /// Inserts rows whose keys are absent; existing rows are left untouched.
    /// Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn seed_settings(&self, records: &[SettingRecord]) -> Result<u64, StoreError>;

    /// Atomically adds `delta` to an integer setting, clamping at zero, and
    /// returns the new value. A missing key starts from zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn add_to_counter(&self, key: &str, delta: i64) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Quota Ledger
// ============================================================================

/// Per-account storage and daily tool counters.
pub trait QuotaLedger: Send + Sync {
    /// Loads an account quota as stored (daily counters may be stale).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn account(&self, user_id: UserId) -> Result<Option<AccountQuota>, StoreError>;

    /// Inserts or replaces an account quota.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_account(&self, quota: &AccountQuota) -> Result<(), StoreError>;

    /// Inserts `quota` only when no account exists for its user. Returns true
    /// when a row was created; an existing account is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn ensure_account(&self, quota: &AccountQuota) -> Result<bool, StoreError>;

    /// Zeroes the daily counters and advances the marker to `today` in one
    /// conditional write when the marker is stale, then returns the account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn reconcile_daily(
        &self,
        user_id: UserId,
        today: CalendarDate,
    ) -> Result<Option<AccountQuota>, StoreError>;

    /// Atomically applies the daily reset (if stale) and increments the
    /// counter for `tool`. Returns the new count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the account does not exist.
    fn increment_daily(
        &self,
        user_id: UserId,
        tool: HeavyTool,
        today: CalendarDate,
    ) -> Result<u32, StoreError>;

    /// Atomically adds `delta` to the account's stored bytes, clamping at
    /// zero. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the account does not exist.
    fn adjust_storage(&self, user_id: UserId, delta: i64) -> Result<u64, StoreError>;

    /// Appends a usage record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append_usage(&self, record: &UsageRecord) -> Result<(), StoreError>;

    /// Lists usage records newest first, optionally for one account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn usage_records(
        &self,
        user_id: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<UsageRecord>, StoreError>;
}

// ============================================================================
// SECTION: Block List and Abuse Log
// ============================================================================

/// Durable set of blocked client identifiers.
pub trait BlockList: Send + Sync {
    /// Inserts a block, or replaces the existing entry for the same
    /// identifier. A re-block restarts `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn block(&self, entry: &BlockedEntry) -> Result<(), StoreError>;

    /// Removes a block. Returns true when an entry existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn unblock(&self, identifier: &ClientId) -> Result<bool, StoreError>;

    /// Returns the entry for `identifier` only when it is in force at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn active_block(
        &self,
        identifier: &ClientId,
        now: Timestamp,
    ) -> Result<Option<BlockedEntry>, StoreError>;

    /// Deletes entries whose expiry is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn purge_expired_blocks(&self, now: Timestamp) -> Result<u64, StoreError>;

    /// Lists entries newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn list_blocked(&self, limit: usize) -> Result<Vec<BlockedEntry>, StoreError>;

    /// Counts entries in force at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn count_active_blocks(&self, now: Timestamp) -> Result<u64, StoreError>;
}

/// Append-only abuse incident ledger.
pub trait AbuseLog: Send + Sync {
    /// Appends an incident.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append_incident(&self, incident: &AbuseIncident) -> Result<(), StoreError>;

    /// Lists incidents newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<AbuseIncident>, StoreError>;

    /// Returns incidents recorded at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn incidents_since(&self, since: Timestamp) -> Result<Vec<AbuseIncident>, StoreError>;
}

// ============================================================================
// SECTION: Upload Ledger
// ============================================================================

/// Recorded upload activity.
pub trait UploadLedger: Send + Sync {
    /// Appends an upload record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn record_upload(&self, record: &UploadRecord) -> Result<(), StoreError>;

    /// Counts uploads from `client` at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn count_uploads_since(&self, client: &ClientId, since: Timestamp) -> Result<u64, StoreError>;

    /// Returns every upload at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn uploads_since(&self, since: Timestamp) -> Result<Vec<UploadRecord>, StoreError>;

    /// Deletes uploads recorded before `before`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn purge_uploads_before(&self, before: Timestamp) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Rate Windows
// ============================================================================

/// Per-identifier fixed-window counters.
pub trait RateWindowStore: Send + Sync {
    /// Atomically applies [`RateWindow::try_hit`] for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn hit(
        &self,
        key: &RateKey,
        limit: u32,
        window_secs: u64,
        now: Timestamp,
    ) -> Result<RateHit, StoreError>;

    /// Loads the stored window without modifying it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn window(&self, key: &RateKey) -> Result<Option<RateWindow>, StoreError>;

    /// Deletes windows not touched since `idle_before`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn sweep_idle_windows(&self, idle_before: Timestamp) -> Result<u64, StoreError>;

    /// Lists windows ordered by request count, highest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn rate_entries(&self, limit: usize) -> Result<Vec<RateEntry>, StoreError>;
}

// ============================================================================
// SECTION: Temp Files
// ============================================================================

/// Registry of temp-file handles.
pub trait TempFileStore: Send + Sync {
    /// Persists a handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_temp_file(&self, handle: &TempFileHandle) -> Result<(), StoreError>;

    /// Loads one handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn temp_file(&self, file_id: &FileId) -> Result<Option<TempFileHandle>, StoreError>;

    /// Returns handles expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn expired_temp_files(&self, now: Timestamp) -> Result<Vec<TempFileHandle>, StoreError>;

    /// Returns handles still live at `now`, optionally for one owner.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn live_temp_files(
        &self,
        owner: Option<UserId>,
        now: Timestamp,
    ) -> Result<Vec<TempFileHandle>, StoreError>;

    /// Deletes a handle. Returns true when it existed, so concurrent reapers
    /// release each handle's bytes once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn remove_temp_file(&self, file_id: &FileId) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Store Bundle
// ============================================================================

/// Every governance store capability in one backend.
pub trait GovernanceStore:
    SettingsStore
    + QuotaLedger
    + BlockList
    + AbuseLog
    + UploadLedger
    + RateWindowStore
    + TempFileStore
{
}

impl<T> GovernanceStore for T where
    T: SettingsStore
        + QuotaLedger
        + BlockList
        + AbuseLog
        + UploadLedger
        + RateWindowStore
        + TempFileStore
{
}

/// Shared handles to each store capability.
///
/// Components take the bundle and use only the capabilities they need, which
/// lets tests substitute a single failing capability.
#[derive(Clone)]
pub struct GovernanceStores {
    /// Settings store.
    pub settings: Arc<dyn SettingsStore>,
    /// Quota ledger.
    pub quotas: Arc<dyn QuotaLedger>,
    /// Block list.
    pub blocks: Arc<dyn BlockList>,
    /// Abuse log.
    pub incidents: Arc<dyn AbuseLog>,
    /// Upload ledger.
    pub uploads: Arc<dyn UploadLedger>,
    /// Rate windows.
    pub rate_windows: Arc<dyn RateWindowStore>,
    /// Temp-file registry.
    pub temp_files: Arc<dyn TempFileStore>,
}

impl GovernanceStores {
    /// Uses one backend for every capability.
    #[must_use]
    pub fn from_shared<S: GovernanceStore + 'static>(store: Arc<S>) -> Self {
        Self {
            settings: store.clone(),
            quotas: store.clone(),
            blocks: store.clone(),
            incidents: store.clone(),
            uploads: store.clone(),
            rate_windows: store.clone(),
            temp_files: store,
        }
    }
}

// ============================================================================
// SECTION: System Probe
// ============================================================================

/// Host metric probe failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Metric source could not be read.
    #[error("probe unavailable: {0}")]
    Unavailable(String),
    /// Metric source returned unparseable data.
    #[error("probe parse error: {0}")]
    Parse(String),
}

/// Load averages over 1, 5, and 15 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadAverage {
    /// One-minute average.
    pub one: f64,
    /// Five-minute average.
    pub five: f64,
    /// Fifteen-minute average.
    pub fifteen: f64,
}

/// Host memory figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total memory.
    pub total: u64,
    /// Memory available for new work.
    pub available: u64,
}

/// Filesystem figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Filesystem size.
    pub total: u64,
    /// Bytes in use.
    pub used: u64,
    /// Bytes free.
    pub free: u64,
}

/// Read-only host metrics source.
pub trait SystemProbe: Send + Sync {
    /// Current load averages.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the metric cannot be read.
    fn load_average(&self) -> Result<LoadAverage, ProbeError>;

    /// Current memory figures.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the metric cannot be read.
    fn memory(&self) -> Result<MemoryInfo, ProbeError>;

    /// Current disk figures for the storage mount.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the metric cannot be read.
    fn disk(&self) -> Result<DiskInfo, ProbeError>;

    /// Count of running heavy-compute worker processes.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the metric cannot be read.
    fn worker_processes(&self) -> Result<u32, ProbeError>;
}
