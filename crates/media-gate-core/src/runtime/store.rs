// crates/media-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Media Gate In-Memory Store
// Description: Single-process implementation of every governance store.
// Purpose: Provide a deterministic backend for tests and local runs.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryGovernanceStore`] keeps all governance state behind one mutex,
//! so every trait method is trivially atomic. It is not durable and is not
//! shared across processes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

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
use crate::interfaces::AbuseLog;
use crate::interfaces::BlockList;
use crate::interfaces::QuotaLedger;
use crate::interfaces::RateWindowStore;
use crate::interfaces::SettingsStore;
use crate::interfaces::StoreError;
use crate::interfaces::TempFileStore;
use crate::interfaces::UploadLedger;

// ============================================================================
// SECTION: State
// ============================================================================

/// Every table the store holds.
#[derive(Debug, Default)]
struct GovernanceState {
    /// Settings keyed by name.
    settings: BTreeMap<String, SettingValue>,
    /// Account quotas.
    accounts: BTreeMap<UserId, AccountQuota>,
    /// Usage records in append order.
    usage: Vec<UsageRecord>,
    /// Block entries keyed by identifier.
    blocks: BTreeMap<ClientId, BlockedEntry>,
    /// Incidents in append order.
    incidents: Vec<AbuseIncident>,
    /// Upload activity in append order.
    uploads: Vec<UploadRecord>,
    /// Rate windows keyed by rate key.
    windows: BTreeMap<RateKey, RateWindow>,
    /// Temp-file handles keyed by file id.
    temp_files: BTreeMap<FileId, TempFileHandle>,
}

/// In-memory governance store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGovernanceStore {
    /// Shared state protected by a mutex.
    state: Arc<Mutex<GovernanceState>>,
}

impl InMemoryGovernanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state.
    fn lock(&self) -> Result<MutexGuard<'_, GovernanceState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("governance store mutex poisoned".to_string()))
    }
}

/// Applies a signed delta to an unsigned amount, clamping at zero.
fn apply_delta(current: u64, delta: i64) -> u64 {
    if delta >= 0 {
        current.saturating_add(delta.unsigned_abs())
    } else {
        current.saturating_sub(delta.unsigned_abs())
    }
}

/// Newest-first, truncated to `limit`.
fn newest_first<T>(items: impl DoubleEndedIterator<Item = T>, limit: usize) -> Vec<T> {
    items.rev().take(limit).collect()
}

// ============================================================================
// SECTION: Settings
// ============================================================================

impl SettingsStore for InMemoryGovernanceStore {
    fn load_settings(&self) -> Result<Vec<SettingRecord>, StoreError> {
        Ok(self
            .lock()?
            .settings
            .iter()
            .map(|(key, value)| SettingRecord::new(key, value.clone()))
            .collect())
    }

    fn get_setting(&self, key: &str) -> Result<Option<SettingValue>, StoreError> {
        Ok(self.lock()?.settings.get(key).cloned())
    }

    fn put_setting(&self, record: &SettingRecord) -> Result<(), StoreError> {
        self.lock()?.settings.insert(record.key.clone(), record.value.clone());
        Ok(())
    }

    fn seed_settings(&self, records: &[SettingRecord]) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let mut inserted = 0;
        for record in records {
            if !state.settings.contains_key(&record.key) {
                state.settings.insert(record.key.clone(), record.value.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn add_to_counter(&self, key: &str, delta: i64) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let current = match state.settings.get(key) {
            None => 0,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| StoreError::Invalid(format!("setting {key} is not an integer")))?,
        };
        let next = apply_delta(u64::try_from(current).unwrap_or(0), delta);
        state
            .settings
            .insert(key.to_string(), SettingValue::Int(i64::try_from(next).unwrap_or(i64::MAX)));
        Ok(next)
    }
}

// ============================================================================
// SECTION: Quota Ledger
// ============================================================================

impl QuotaLedger for InMemoryGovernanceStore {
    fn account(&self, user_id: UserId) -> Result<Option<AccountQuota>, StoreError> {
        Ok(self.lock()?.accounts.get(&user_id).cloned())
    }

    fn upsert_account(&self, quota: &AccountQuota) -> Result<(), StoreError> {
        self.lock()?.accounts.insert(quota.user_id, quota.clone());
        Ok(())
    }

    fn ensure_account(&self, quota: &AccountQuota) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        if state.accounts.contains_key(&quota.user_id) {
            return Ok(false);
        }
        state.accounts.insert(quota.user_id, quota.clone());
        Ok(true)
    }

    fn reconcile_daily(
        &self,
        user_id: UserId,
        today: CalendarDate,
    ) -> Result<Option<AccountQuota>, StoreError> {
        let mut state = self.lock()?;
        let Some(account) = state.accounts.get_mut(&user_id) else {
            return Ok(None);
        };
        *account = account.reconciled(today);
        Ok(Some(account.clone()))
    }

    fn increment_daily(
        &self,
        user_id: UserId,
        tool: HeavyTool,
        today: CalendarDate,
    ) -> Result<u32, StoreError> {
        let mut state = self.lock()?;
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("account {user_id}")))?;
        *account = account.reconciled(today);
        let counter = match tool {
            HeavyTool::Ocr => &mut account.daily_ocr_count,
            HeavyTool::RemoveBg => &mut account.daily_removebg_count,
        };
        *counter = counter.saturating_add(1);
        Ok(*counter)
    }

    fn adjust_storage(&self, user_id: UserId, delta: i64) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("account {user_id}")))?;
        account.storage_used = apply_delta(account.storage_used, delta);
        Ok(account.storage_used)
    }

    fn append_usage(&self, record: &UsageRecord) -> Result<(), StoreError> {
        self.lock()?.usage.push(record.clone());
        Ok(())
    }

    fn usage_records(
        &self,
        user_id: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        let state = self.lock()?;
        let matching = state
            .usage
            .iter()
            .filter(|record| user_id.is_none_or(|user_id| record.user_id == Some(user_id)))
            .cloned()
            .collect::<Vec<_>>();
        Ok(newest_first(matching.into_iter(), limit))
    }
}

// ============================================================================
// SECTION: Block List and Abuse Log
// ============================================================================

impl BlockList for InMemoryGovernanceStore {
    fn block(&self, entry: &BlockedEntry) -> Result<(), StoreError> {
        self.lock()?.blocks.insert(entry.identifier.clone(), entry.clone());
        Ok(())
    }

    fn unblock(&self, identifier: &ClientId) -> Result<bool, StoreError> {
        Ok(self.lock()?.blocks.remove(identifier).is_some())
    }

    fn active_block(
        &self,
        identifier: &ClientId,
        now: Timestamp,
    ) -> Result<Option<BlockedEntry>, StoreError> {
        Ok(self.lock()?.blocks.get(identifier).filter(|entry| entry.is_active(now)).cloned())
    }

    fn purge_expired_blocks(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let before = state.blocks.len();
        state.blocks.retain(|_, entry| entry.is_active(now));
        Ok((before - state.blocks.len()) as u64)
    }

    fn list_blocked(&self, limit: usize) -> Result<Vec<BlockedEntry>, StoreError> {
        let state = self.lock()?;
        let mut entries: Vec<BlockedEntry> = state.blocks.values().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    fn count_active_blocks(&self, now: Timestamp) -> Result<u64, StoreError> {
        Ok(self.lock()?.blocks.values().filter(|entry| entry.is_active(now)).count() as u64)
    }
}

impl AbuseLog for InMemoryGovernanceStore {
    fn append_incident(&self, incident: &AbuseIncident) -> Result<(), StoreError> {
        self.lock()?.incidents.push(incident.clone());
        Ok(())
    }

    fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<AbuseIncident>, StoreError> {
        let state = self.lock()?;
        let matching = state
            .incidents
            .iter()
            .filter(|incident| filter.matches(incident))
            .cloned()
            .collect::<Vec<_>>();
        Ok(newest_first(matching.into_iter(), filter.limit))
    }

    fn incidents_since(&self, since: Timestamp) -> Result<Vec<AbuseIncident>, StoreError> {
        Ok(self
            .lock()?
            .incidents
            .iter()
            .filter(|incident| incident.created_at >= since)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Upload Ledger
// ============================================================================

impl UploadLedger for InMemoryGovernanceStore {
    fn record_upload(&self, record: &UploadRecord) -> Result<(), StoreError> {
        self.lock()?.uploads.push(record.clone());
        Ok(())
    }

    fn count_uploads_since(&self, client: &ClientId, since: Timestamp) -> Result<u64, StoreError> {
        Ok(self
            .lock()?
            .uploads
            .iter()
            .filter(|record| record.client == *client && record.created_at >= since)
            .count() as u64)
    }

    fn uploads_since(&self, since: Timestamp) -> Result<Vec<UploadRecord>, StoreError> {
        Ok(self
            .lock()?
            .uploads
            .iter()
            .filter(|record| record.created_at >= since)
            .cloned()
            .collect())
    }

    fn purge_uploads_before(&self, before: Timestamp) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let count = state.uploads.len();
        state.uploads.retain(|record| record.created_at >= before);
        Ok((count - state.uploads.len()) as u64)
    }
}

// ============================================================================
// SECTION: Rate Windows
// ============================================================================

impl RateWindowStore for InMemoryGovernanceStore {
    fn hit(
        &self,
        key: &RateKey,
        limit: u32,
        window_secs: u64,
        now: Timestamp,
    ) -> Result<RateHit, StoreError> {
        let mut state = self.lock()?;
        let current = state.windows.get(key).copied();
        if let Some(next) = RateWindow::try_hit(current, now, limit, window_secs) {
            state.windows.insert(key.clone(), next);
            return Ok(RateHit {
                allowed: true,
                window: next,
            });
        }
        let window = current.unwrap_or(RateWindow {
            window_start: now,
            request_count: 0,
            updated_at: now,
        });
        Ok(RateHit {
            allowed: false,
            window,
        })
    }

    fn window(&self, key: &RateKey) -> Result<Option<RateWindow>, StoreError> {
        Ok(self.lock()?.windows.get(key).copied())
    }

    fn sweep_idle_windows(&self, idle_before: Timestamp) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let count = state.windows.len();
        state.windows.retain(|_, window| window.updated_at >= idle_before);
        Ok((count - state.windows.len()) as u64)
    }

    fn rate_entries(&self, limit: usize) -> Result<Vec<RateEntry>, StoreError> {
        let state = self.lock()?;
        let mut entries: Vec<RateEntry> = state
            .windows
            .iter()
            .map(|(key, window)| RateEntry {
                key: key.clone(),
                window: *window,
            })
            .collect();
        entries.sort_by(|a, b| b.window.request_count.cmp(&a.window.request_count));
        entries.truncate(limit);
        Ok(entries)
    }
}

// ============================================================================
// SECTION: Temp Files
// ============================================================================

impl TempFileStore for InMemoryGovernanceStore {
    fn insert_temp_file(&self, handle: &TempFileHandle) -> Result<(), StoreError> {
        self.lock()?.temp_files.insert(handle.file_id.clone(), handle.clone());
        Ok(())
    }

    fn temp_file(&self, file_id: &FileId) -> Result<Option<TempFileHandle>, StoreError> {
        Ok(self.lock()?.temp_files.get(file_id).cloned())
    }

    fn expired_temp_files(&self, now: Timestamp) -> Result<Vec<TempFileHandle>, StoreError> {
        Ok(self
            .lock()?
            .temp_files
            .values()
            .filter(|handle| handle.is_expired(now))
            .cloned()
            .collect())
    }

    fn live_temp_files(
        &self,
        owner: Option<UserId>,
        now: Timestamp,
    ) -> Result<Vec<TempFileHandle>, StoreError> {
        Ok(self
            .lock()?
            .temp_files
            .values()
            .filter(|handle| !handle.is_expired(now))
            .filter(|handle| owner.is_none_or(|owner| handle.owner == Some(owner)))
            .cloned()
            .collect())
    }

    fn remove_temp_file(&self, file_id: &FileId) -> Result<bool, StoreError> {
        Ok(self.lock()?.temp_files.remove(file_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;
    use crate::core::AccountTier;

    #[test]
    fn counters_floor_at_zero() {
        let store = InMemoryGovernanceStore::new();
        assert_eq!(store.add_to_counter("global_storage_used", 100).unwrap(), 100);
        assert_eq!(store.add_to_counter("global_storage_used", -250).unwrap(), 0);
        assert_eq!(store.get_setting("global_storage_used").unwrap(), Some(SettingValue::Int(0)));
    }

    #[test]
    fn daily_increment_resets_stale_marker() {
        let store = InMemoryGovernanceStore::new();
        let user = UserId::new(7);
        let mut quota = AccountQuota::new(user, AccountTier::Free, 1_000);
        quota.daily_ocr_count = 4;
        quota.daily_reset_marker = Some(CalendarDate::parse_iso("2024-01-01").unwrap());
        store.upsert_account(&quota).unwrap();
        let today = CalendarDate::parse_iso("2024-01-02").unwrap();
        assert_eq!(store.increment_daily(user, HeavyTool::Ocr, today).unwrap(), 1);
        assert_eq!(store.increment_daily(user, HeavyTool::Ocr, today).unwrap(), 2);
        assert!(matches!(
            store.increment_daily(UserId::new(8), HeavyTool::Ocr, today),
            Err(StoreError::NotFound(_))
        ));
    }
}
