// crates/media-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Shared Test Fixtures
// Description: Harness, recording audit sink, fixed probe, failing store.
// Purpose: Give integration tests deterministic collaborators.
// ============================================================================

//! Shared fixtures for media-gate-core integration tests.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Each test binary uses a different subset of the fixtures."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use media_gate_core::AbuseIncident;
use media_gate_core::AccountQuota;
use media_gate_core::AccountTier;
use media_gate_core::BlockedEntry;
use media_gate_core::CalendarDate;
use media_gate_core::ClientId;
use media_gate_core::Clock;
use media_gate_core::DiskInfo;
use media_gate_core::FileId;
use media_gate_core::GovernanceAuditEvent;
use media_gate_core::GovernanceAuditSink;
use media_gate_core::GovernanceContext;
use media_gate_core::GovernanceStores;
use media_gate_core::HeavyTool;
use media_gate_core::InMemoryGovernanceStore;
use media_gate_core::IncidentFilter;
use media_gate_core::LoadAverage;
use media_gate_core::ManualClock;
use media_gate_core::MemoryInfo;
use media_gate_core::ProbeError;
use media_gate_core::RateEntry;
use media_gate_core::RateHit;
use media_gate_core::RateKey;
use media_gate_core::RateWindow;
use media_gate_core::SettingRecord;
use media_gate_core::SettingValue;
use media_gate_core::SettingsStore;
use media_gate_core::StoreError;
use media_gate_core::SystemProbe;
use media_gate_core::TempFileHandle;
use media_gate_core::Timestamp;
use media_gate_core::UploadRecord;
use media_gate_core::UsageRecord;
use media_gate_core::UserId;
use media_gate_core::interfaces::AbuseLog;
use media_gate_core::interfaces::BlockList;
use media_gate_core::interfaces::QuotaLedger;
use media_gate_core::interfaces::RateWindowStore;
use media_gate_core::interfaces::TempFileStore;
use media_gate_core::interfaces::UploadLedger;
use media_gate_core::seed_records;

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// Audit sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<GovernanceAuditEvent>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<GovernanceAuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.event).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|event| event.event == name).count()
    }
}

impl GovernanceAuditSink for RecordingAuditSink {
    fn record(&self, event: &GovernanceAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Probe returning values set by the test.
#[derive(Debug, Default)]
pub struct FixedProbe {
    load_bits: AtomicU64,
    workers: AtomicU32,
    fail: AtomicBool,
}

impl FixedProbe {
    pub fn set_load(&self, load: f64) {
        self.load_bits.store(load.to_bits(), Ordering::SeqCst);
    }

    pub fn set_workers(&self, workers: u32) {
        self.workers.store(workers, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ProbeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProbeError::Unavailable("probe offline".to_string()));
        }
        Ok(())
    }
}

impl SystemProbe for FixedProbe {
    fn load_average(&self) -> Result<LoadAverage, ProbeError> {
        self.check()?;
        let one = f64::from_bits(self.load_bits.load(Ordering::SeqCst));
        Ok(LoadAverage {
            one,
            five: one,
            fifteen: one,
        })
    }

    fn memory(&self) -> Result<MemoryInfo, ProbeError> {
        self.check()?;
        Ok(MemoryInfo {
            total: 8 << 30,
            available: 6 << 30,
        })
    }

    fn disk(&self) -> Result<DiskInfo, ProbeError> {
        self.check()?;
        Ok(DiskInfo {
            total: 100 << 30,
            used: 25 << 30,
            free: 75 << 30,
        })
    }

    fn worker_processes(&self) -> Result<u32, ProbeError> {
        self.check()?;
        Ok(self.workers.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Failing Store
// ============================================================================

/// Store whose every operation reports the backend as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStore;

fn down<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("store offline".to_string()))
}

impl SettingsStore for UnavailableStore {
    fn load_settings(&self) -> Result<Vec<SettingRecord>, StoreError> {
        down()
    }

    fn get_setting(&self, _key: &str) -> Result<Option<SettingValue>, StoreError> {
        down()
    }

    fn put_setting(&self, _record: &SettingRecord) -> Result<(), StoreError> {
        down()
    }

    fn seed_settings(&self, _records: &[SettingRecord]) -> Result<u64, StoreError> {
        down()
    }

    fn add_to_counter(&self, _key: &str, _delta: i64) -> Result<u64, StoreError> {
        down()
    }
}

/// Settings capability backed by a shared store that can be taken offline.
pub struct SwitchableSettings {
    inner: Arc<InMemoryGovernanceStore>,
    offline: AtomicBool,
}

impl SwitchableSettings {
    /// Toggles the outage.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) { down() } else { Ok(()) }
    }
}

impl SettingsStore for SwitchableSettings {
    fn load_settings(&self) -> Result<Vec<SettingRecord>, StoreError> {
        self.check()?;
        self.inner.load_settings()
    }

    fn get_setting(&self, key: &str) -> Result<Option<SettingValue>, StoreError> {
        self.check()?;
        self.inner.get_setting(key)
    }

    fn put_setting(&self, record: &SettingRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put_setting(record)
    }

    fn seed_settings(&self, records: &[SettingRecord]) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.seed_settings(records)
    }

    fn add_to_counter(&self, key: &str, delta: i64) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.add_to_counter(key, delta)
    }
}

impl QuotaLedger for UnavailableStore {
    fn account(&self, _user_id: UserId) -> Result<Option<AccountQuota>, StoreError> {
        down()
    }

    fn upsert_account(&self, _quota: &AccountQuota) -> Result<(), StoreError> {
        down()
    }

    fn ensure_account(&self, _quota: &AccountQuota) -> Result<bool, StoreError> {
        down()
    }

    fn reconcile_daily(
        &self,
        _user_id: UserId,
        _today: CalendarDate,
    ) -> Result<Option<AccountQuota>, StoreError> {
        down()
    }

    fn increment_daily(
        &self,
        _user_id: UserId,
        _tool: HeavyTool,
        _today: CalendarDate,
    ) -> Result<u32, StoreError> {
        down()
    }

    fn adjust_storage(&self, _user_id: UserId, _delta: i64) -> Result<u64, StoreError> {
        down()
    }

    fn append_usage(&self, _record: &UsageRecord) -> Result<(), StoreError> {
        down()
    }

    fn usage_records(
        &self,
        _user_id: Option<UserId>,
        _limit: usize,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        down()
    }
}

impl BlockList for UnavailableStore {
    fn block(&self, _entry: &BlockedEntry) -> Result<(), StoreError> {
        down()
    }

    fn unblock(&self, _identifier: &ClientId) -> Result<bool, StoreError> {
        down()
    }

    fn active_block(
        &self,
        _identifier: &ClientId,
        _now: Timestamp,
    ) -> Result<Option<BlockedEntry>, StoreError> {
        down()
    }

    fn purge_expired_blocks(&self, _now: Timestamp) -> Result<u64, StoreError> {
        down()
    }

    fn list_blocked(&self, _limit: usize) -> Result<Vec<BlockedEntry>, StoreError> {
        down()
    }

    fn count_active_blocks(&self, _now: Timestamp) -> Result<u64, StoreError> {
        down()
    }
}

impl AbuseLog for UnavailableStore {
    fn append_incident(&self, _incident: &AbuseIncident) -> Result<(), StoreError> {
        down()
    }

    fn list_incidents(&self, _filter: &IncidentFilter) -> Result<Vec<AbuseIncident>, StoreError> {
        down()
    }

    fn incidents_since(&self, _since: Timestamp) -> Result<Vec<AbuseIncident>, StoreError> {
        down()
    }
}

impl UploadLedger for UnavailableStore {
    fn record_upload(&self, _record: &UploadRecord) -> Result<(), StoreError> {
        down()
    }

    fn count_uploads_since(
        &self,
        _client: &ClientId,
        _since: Timestamp,
    ) -> Result<u64, StoreError> {
        down()
    }

    fn uploads_since(&self, _since: Timestamp) -> Result<Vec<UploadRecord>, StoreError> {
        down()
    }

    fn purge_uploads_before(&self, _before: Timestamp) -> Result<u64, StoreError> {
        down()
    }
}

impl RateWindowStore for UnavailableStore {
    fn hit(
        &self,
        _key: &RateKey,
        _limit: u32,
        _window_secs: u64,
        _now: Timestamp,
    ) -> Result<RateHit, StoreError> {
        down()
    }

    fn window(&self, _key: &RateKey) -> Result<Option<RateWindow>, StoreError> {
        down()
    }

    fn sweep_idle_windows(&self, _idle_before: Timestamp) -> Result<u64, StoreError> {
        down()
    }

    fn rate_entries(&self, _limit: usize) -> Result<Vec<RateEntry>, StoreError> {
        down()
    }
}

impl TempFileStore for UnavailableStore {
    fn insert_temp_file(&self, _handle: &TempFileHandle) -> Result<(), StoreError> {
        down()
    }

    fn temp_file(&self, _file_id: &FileId) -> Result<Option<TempFileHandle>, StoreError> {
        down()
    }

    fn expired_temp_files(&self, _now: Timestamp) -> Result<Vec<TempFileHandle>, StoreError> {
        down()
    }

    fn live_temp_files(
        &self,
        _owner: Option<UserId>,
        _now: Timestamp,
    ) -> Result<Vec<TempFileHandle>, StoreError> {
        down()
    }

    fn remove_temp_file(&self, _file_id: &FileId) -> Result<bool, StoreError> {
        down()
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// 2025-10-19T12:00:00Z.
pub const START: Timestamp = Timestamp::from_unix_seconds(1_760_875_200);

/// In-memory store, manual clock, recording sink, and fixed probe.
pub struct Harness {
    pub store: Arc<InMemoryGovernanceStore>,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<RecordingAuditSink>,
    pub probe: Arc<FixedProbe>,
    pub ctx: GovernanceContext,
}

impl Harness {
    /// Seeded harness starting at [`START`].
    pub fn new() -> Self {
        let store = Arc::new(InMemoryGovernanceStore::new());
        store.seed_settings(&seed_records()).unwrap();
        Self::with_stores(store.clone(), GovernanceStores::from_shared(store))
    }

    /// Harness whose context uses `stores` while `store` stays inspectable.
    pub fn with_stores(store: Arc<InMemoryGovernanceStore>, stores: GovernanceStores) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let audit = Arc::new(RecordingAuditSink::default());
        let probe = Arc::new(FixedProbe::default());
        probe.set_load(0.5);
        let ctx =
            GovernanceContext::new(stores).with_clock(clock.clone()).with_audit(audit.clone());
        Self {
            store,
            clock,
            audit,
            probe,
            ctx,
        }
    }

    /// Harness whose settings capability is offline.
    pub fn with_settings_offline() -> Self {
        let store = Arc::new(InMemoryGovernanceStore::new());
        let mut stores = GovernanceStores::from_shared(store.clone());
        stores.settings = Arc::new(UnavailableStore);
        Self::with_stores(store, stores)
    }

    /// Seeded harness whose settings capability can be taken offline.
    pub fn with_switchable_settings() -> (Self, Arc<SwitchableSettings>) {
        let store = Arc::new(InMemoryGovernanceStore::new());
        store.seed_settings(&seed_records()).unwrap();
        let settings = Arc::new(SwitchableSettings {
            inner: store.clone(),
            offline: AtomicBool::new(false),
        });
        let mut stores = GovernanceStores::from_shared(store.clone());
        stores.settings = settings.clone();
        (Self::with_stores(store, stores), settings)
    }

    /// Writes a setting directly.
    pub fn set(&self, key: &str, value: SettingValue) {
        self.store.put_setting(&SettingRecord::new(key, value)).unwrap();
    }

    /// Creates an account.
    pub fn account(&self, id: u64, tier: AccountTier, storage_limit: u64) -> UserId {
        let user_id = UserId::new(id);
        self.store.upsert_account(&AccountQuota::new(user_id, tier, storage_limit)).unwrap();
        user_id
    }

    /// Appends `count` uploads from `client` at the current time.
    pub fn uploads(&self, client: &str, user_id: Option<UserId>, count: u64, size: u64) {
        let now = self.clock.now();
        for _ in 0 .. count {
            self.store
                .record_upload(&UploadRecord {
                    client: ClientId::new(client),
                    user_id,
                    size,
                    created_at: now,
                })
                .unwrap();
        }
    }
}
