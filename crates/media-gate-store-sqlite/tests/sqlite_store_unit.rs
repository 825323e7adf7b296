// crates/media-gate-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Governance Store Unit Tests
// Description: Targeted tests for the SQLite governance store.
// Purpose: Validate path safety, schema versioning, atomic counters, window
//          limits under concurrency, and persistence across reopen.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Path safety checks (directory/empty/overlong rejection)
//! - Schema version validation
//! - Counters floor at zero and seeding never overwrites
//! - Daily counters reset exactly once per calendar day, also across connections
//! - Rate windows admit at most `limit` hits across threads
//! - Block upserts, expiry, and ledger retention

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use media_gate_core::AbuseGuard;
use media_gate_core::AbuseIncident;
use media_gate_core::AbuseKind;
use media_gate_core::AbuseWatchdog;
use media_gate_core::AccountQuota;
use media_gate_core::AccountTier;
use media_gate_core::BlockedBy;
use media_gate_core::BlockedEntry;
use media_gate_core::CalendarDate;
use media_gate_core::ClientId;
use media_gate_core::FileId;
use media_gate_core::GovernanceContext;
use media_gate_core::GovernanceStores;
use media_gate_core::HeavyTool;
use media_gate_core::IncidentFilter;
use media_gate_core::ManualClock;
use media_gate_core::RateKey;
use media_gate_core::SettingRecord;
use media_gate_core::SettingValue;
use media_gate_core::Severity;
use media_gate_core::StoreError;
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
use media_gate_store_sqlite::SqliteGovernanceStore;
use media_gate_store_sqlite::SqliteStoreConfig;
use media_gate_store_sqlite::SqliteStoreError;
use media_gate_store_sqlite::SqliteStoreMode;
use media_gate_store_sqlite::SqliteSyncMode;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// 2026-03-10T12:00:00Z.
const NOON: i64 = 1_773_144_000_000;

fn config_for_path(path: PathBuf) -> SqliteStoreConfig {
    SqliteStoreConfig {
        path,
        busy_timeout_ms: 1_000,
        journal_mode: SqliteStoreMode::Wal,
        sync_mode: SqliteSyncMode::Full,
    }
}

fn store_for(path: &Path) -> SqliteGovernanceStore {
    SqliteGovernanceStore::new(config_for_path(path.to_path_buf())).expect("store init")
}

fn temp_store() -> (TempDir, SqliteGovernanceStore) {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("governance.sqlite"));
    (temp, store)
}

fn at(seconds: i64) -> Timestamp {
    Timestamp::from_unix_millis(NOON).plus_seconds(seconds)
}

fn account(user: u64) -> AccountQuota {
    AccountQuota {
        user_id: UserId::new(user),
        tier: AccountTier::Free,
        storage_used: 0,
        storage_limit: 1_000,
        daily_ocr_count: 0,
        daily_removebg_count: 0,
        daily_reset_marker: None,
    }
}

fn date(raw: &str) -> CalendarDate {
    CalendarDate::parse_iso(raw).unwrap()
}

// ============================================================================
// SECTION: Path Validation and Schema
// ============================================================================

#[test]
fn sqlite_store_rejects_directory_path() {
    let temp = TempDir::new().unwrap();
    let Err(err) = SqliteGovernanceStore::new(config_for_path(temp.path().to_path_buf())) else {
        panic!("expected invalid directory path to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_rejects_empty_and_overlong_paths() {
    let Err(err) = SqliteGovernanceStore::new(config_for_path(PathBuf::new())) else {
        panic!("expected empty path to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));

    let temp = TempDir::new().unwrap();
    let long = temp.path().join("a".repeat(300));
    let Err(err) = SqliteGovernanceStore::new(config_for_path(long)) else {
        panic!("expected overlong component to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_creates_parent_directories() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("dir").join("governance.sqlite");
    let store = store_for(&path);
    store.ping().unwrap();
    assert!(path.exists());
}

#[test]
fn sqlite_store_rejects_unknown_schema_version() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("governance.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE store_meta (version INTEGER NOT NULL);").unwrap();
    conn.execute("INSERT INTO store_meta (version) VALUES (?1)", params![999_i64]).unwrap();
    drop(conn);

    let Err(err) = SqliteGovernanceStore::new(config_for_path(path)) else {
        panic!("expected schema mismatch to fail");
    };
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
    assert!(matches!(StoreError::from(err), StoreError::Invalid(_)));
}

#[test]
fn sqlite_store_sets_delete_mode() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("governance.sqlite");
    let config = SqliteStoreConfig {
        journal_mode: SqliteStoreMode::Delete,
        ..config_for_path(path.clone())
    };
    let _store = SqliteGovernanceStore::new(config).unwrap();

    let conn = Connection::open(&path).unwrap();
    let mode: String = conn.query_row("PRAGMA journal_mode", params![], |row| row.get(0)).unwrap();
    assert_eq!(mode.to_lowercase(), "delete");
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("governance.sqlite");
    {
        let store = store_for(&path);
        let record = SettingRecord::new("maintenance_mode", SettingValue::Bool(true));
        store.put_setting(&record).unwrap();
        store.upsert_account(&account(1)).unwrap();
    }
    let store = store_for(&path);
    assert_eq!(store.get_setting("maintenance_mode").unwrap(), Some(SettingValue::Bool(true)));
    assert_eq!(store.account(UserId::new(1)).unwrap(), Some(account(1)));
}

// ============================================================================
// SECTION: Settings
// ============================================================================

#[test]
fn settings_round_trip_typed_values() {
    let (_temp, store) = temp_store();
    let json = SettingValue::Json(serde_json::json!({"hosts": ["a", "b"]}));
    store.put_setting(&SettingRecord::new("allowlist", json.clone())).unwrap();
    store.put_setting(&SettingRecord::new("motd", SettingValue::String("hi".into()))).unwrap();
    store.put_setting(&SettingRecord::new("motd", SettingValue::String("bye".into()))).unwrap();

    let records = store.load_settings().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], SettingRecord::new("allowlist", json));
    assert_eq!(store.get_setting("motd").unwrap(), Some(SettingValue::String("bye".into())));
    assert_eq!(store.get_setting("missing").unwrap(), None);
}

#[test]
fn seeding_inserts_missing_keys_only() {
    let (_temp, store) = temp_store();
    store.put_setting(&SettingRecord::new("a", SettingValue::Int(9))).unwrap();
    let seeds = [
        SettingRecord::new("a", SettingValue::Int(1)),
        SettingRecord::new("b", SettingValue::Int(2)),
    ];
    assert_eq!(store.seed_settings(&seeds).unwrap(), 1);
    assert_eq!(store.seed_settings(&seeds).unwrap(), 0);
    assert_eq!(store.get_setting("a").unwrap(), Some(SettingValue::Int(9)));
}

#[test]
fn counters_are_created_on_demand_and_floor_at_zero() {
    let (_temp, store) = temp_store();
    assert_eq!(store.add_to_counter("global_storage_used", 500).unwrap(), 500);
    assert_eq!(store.add_to_counter("global_storage_used", -200).unwrap(), 300);
    assert_eq!(store.add_to_counter("global_storage_used", -1_000).unwrap(), 0);
    assert_eq!(store.get_setting("global_storage_used").unwrap(), Some(SettingValue::Int(0)));
    assert_eq!(store.add_to_counter("fresh", -5).unwrap(), 0);
}

#[test]
fn malformed_setting_rows_surface_as_invalid() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("governance.sqlite");
    let store = store_for(&path);
    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO settings (key, value, setting_type, updated_at)
         VALUES ('x', 'nope', 'int', 0)",
        params![],
    )
    .unwrap();
    assert!(matches!(store.get_setting("x"), Err(StoreError::Invalid(_))));
}

#[test]
fn concurrent_counter_updates_are_not_lost() {
    let (_temp, store) = temp_store();
    let store = Arc::new(store);
    let mut handles = Vec::new();
    for _ in 0 .. 4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for _ in 0 .. 25 {
                store.add_to_counter("global_storage_used", 10).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.add_to_counter("global_storage_used", 0).unwrap(), 1_000);
}

// ============================================================================
// SECTION: Quota Ledger
// ============================================================================

#[test]
fn daily_counters_reset_once_per_day() {
    let (_temp, store) = temp_store();
    store.upsert_account(&account(3)).unwrap();
    let user = UserId::new(3);
    let day_one = date("2026-03-10");

    assert_eq!(store.increment_daily(user, HeavyTool::Ocr, day_one).unwrap(), 1);
    assert_eq!(store.increment_daily(user, HeavyTool::Ocr, day_one).unwrap(), 2);
    assert_eq!(store.increment_daily(user, HeavyTool::RemoveBg, day_one).unwrap(), 1);

    let reconciled = store.reconcile_daily(user, day_one).unwrap().unwrap();
    assert_eq!((reconciled.daily_ocr_count, reconciled.daily_removebg_count), (2, 1));

    let day_two = date("2026-03-11");
    let rolled = store.reconcile_daily(user, day_two).unwrap().unwrap();
    assert_eq!((rolled.daily_ocr_count, rolled.daily_removebg_count), (0, 0));
    assert_eq!(rolled.daily_reset_marker, Some(day_two));
    assert_eq!(store.increment_daily(user, HeavyTool::Ocr, day_two).unwrap(), 1);
}

#[test]
fn concurrent_rollover_resets_stale_counters_once() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("governance.sqlite");
    let seed = store_for(&path);
    let user = UserId::new(8);
    let mut stale = account(8);
    stale.daily_ocr_count = 7;
    stale.daily_removebg_count = 2;
    stale.daily_reset_marker = Some(date("2026-03-10"));
    seed.upsert_account(&stale).unwrap();

    let today = date("2026-03-11");
    let start = Arc::new(Barrier::new(4));
    let mut handles = Vec::new();
    for worker in 0 .. 4 {
        let store = store_for(&path);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for round in 0 .. 5 {
                if (worker + round) % 2 == 0 {
                    let quota = store.reconcile_daily(user, today).unwrap().unwrap();
                    assert_eq!(quota.daily_reset_marker, Some(today));
                    assert_eq!(quota.daily_removebg_count, 0);
                }
                store.increment_daily(user, HeavyTool::Ocr, today).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let quota = seed.reconcile_daily(user, today).unwrap().unwrap();
    assert_eq!(quota.daily_ocr_count, 20);
    assert_eq!(quota.daily_removebg_count, 0);
    assert_eq!(quota.daily_reset_marker, Some(today));
}

#[test]
fn missing_accounts_report_not_found() {
    let (_temp, store) = temp_store();
    let user = UserId::new(404);
    assert!(store.reconcile_daily(user, date("2026-03-10")).unwrap().is_none());
    assert!(matches!(
        store.increment_daily(user, HeavyTool::Ocr, date("2026-03-10")),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(store.adjust_storage(user, 5), Err(StoreError::NotFound(_))));
}

#[test]
fn storage_adjustments_floor_at_zero() {
    let (_temp, store) = temp_store();
    store.upsert_account(&account(5)).unwrap();
    let user = UserId::new(5);
    assert_eq!(store.adjust_storage(user, 700).unwrap(), 700);
    assert_eq!(store.adjust_storage(user, -900).unwrap(), 0);
}

#[test]
fn usage_records_are_listed_newest_first() {
    let (_temp, store) = temp_store();
    for (offset, tool) in [(0, ToolKind::Compress), (10, ToolKind::Ocr)] {
        store
            .append_usage(&UsageRecord {
                user_id: Some(UserId::new(1)),
                tool,
                file_size: 100,
                processing_time_ms: 40,
                status: UsageStatus::Success,
                client: Some(ClientId::new("10.0.0.1")),
                created_at: at(offset),
            })
            .unwrap();
    }
    store
        .append_usage(&UsageRecord {
            user_id: None,
            tool: ToolKind::Resize,
            file_size: 1,
            processing_time_ms: 1,
            status: UsageStatus::Failed,
            client: None,
            created_at: at(20),
        })
        .unwrap();

    let mine = store.usage_records(Some(UserId::new(1)), 10).unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].tool, ToolKind::Ocr);
    assert_eq!(store.usage_records(None, 1).unwrap()[0].status, UsageStatus::Failed);
}

// ============================================================================
// SECTION: Block List, Incidents, Uploads
// ============================================================================

#[test]
fn block_upsert_refreshes_created_at_and_expiry_is_read_time() {
    let (_temp, store) = temp_store();
    let client = ClientId::new("203.0.113.9");
    let entry = BlockedEntry {
        identifier: client.clone(),
        reason: "first".to_string(),
        blocked_by: BlockedBy::Auto,
        created_at: at(0),
        expires_at: Some(at(3_600)),
    };
    store.block(&entry).unwrap();
    store
        .block(&BlockedEntry {
            reason: "second".to_string(),
            created_at: at(60),
            ..entry.clone()
        })
        .unwrap();

    let active = store.active_block(&client, at(100)).unwrap().unwrap();
    assert_eq!(active.reason, "second");
    assert_eq!(active.created_at, at(60));
    assert!(store.active_block(&client, at(3_600)).unwrap().is_none());
    assert_eq!(store.count_active_blocks(at(3_600)).unwrap(), 0);
    assert_eq!(store.list_blocked(10).unwrap().len(), 1);
    assert_eq!(store.purge_expired_blocks(at(3_600)).unwrap(), 1);
    assert!(!store.unblock(&client).unwrap());
}

#[test]
fn incidents_filter_by_kind_and_identifier() {
    let (_temp, store) = temp_store();
    let noisy = ClientId::new("10.1.1.1");
    for (offset, kind) in [(0, AbuseKind::UploadSpam), (5, AbuseKind::ApiAbuse)] {
        store
            .append_incident(&AbuseIncident {
                identifier: noisy.clone(),
                kind,
                severity: Severity::High,
                user_id: None,
                details: format!("at {offset}"),
                created_at: at(offset),
            })
            .unwrap();
    }
    let filter = IncidentFilter {
        kind: Some(AbuseKind::UploadSpam),
        identifier: Some(noisy),
        limit: 10,
    };
    let spam = store.list_incidents(&filter).unwrap();
    assert_eq!(spam.len(), 1);
    assert_eq!(spam[0].details, "at 0");
    assert_eq!(store.incidents_since(at(1)).unwrap().len(), 1);
}

#[test]
fn upload_ledger_counts_and_purges_by_time() {
    let (_temp, store) = temp_store();
    let client = ClientId::new("198.51.100.1");
    for offset in [0, 10, 20] {
        store
            .record_upload(&UploadRecord {
                client: client.clone(),
                user_id: None,
                size: 10,
                created_at: at(offset),
            })
            .unwrap();
    }
    assert_eq!(store.count_uploads_since(&client, at(10)).unwrap(), 2);
    assert_eq!(store.uploads_since(at(0)).unwrap().len(), 3);
    assert_eq!(store.purge_uploads_before(at(20)).unwrap(), 2);
    assert_eq!(store.count_uploads_since(&client, at(0)).unwrap(), 1);
}

// ============================================================================
// SECTION: Rate Windows
// ============================================================================

#[test]
fn rate_window_denies_at_limit_and_rolls_over() {
    let (_temp, store) = temp_store();
    let key = RateKey::for_user(UserId::new(1));
    for expected in 1 ..= 3 {
        let hit = store.hit(&key, 3, 60, at(0)).unwrap();
        assert!(hit.allowed);
        assert_eq!(hit.window.request_count, expected);
    }
    let denied = store.hit(&key, 3, 60, at(30)).unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.window.request_count, 3);

    let rolled = store.hit(&key, 3, 60, at(60)).unwrap();
    assert!(rolled.allowed);
    assert_eq!(rolled.window.request_count, 1);
    assert_eq!(rolled.window.window_start, at(60));

    assert!(!store.hit(&RateKey::from_stored("zero"), 0, 60, at(0)).unwrap().allowed);
    assert!(store.window(&RateKey::from_stored("zero")).unwrap().is_none());
}

#[test]
fn rate_windows_hold_across_threads_and_connections() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("governance.sqlite");
    let key = RateKey::from_stored("guest:shared");
    let mut handles = Vec::new();
    for _ in 0 .. 4 {
        let store = store_for(&path);
        let key = key.clone();
        handles.push(thread::spawn(move || {
            (0 .. 10).filter(|_| store.hit(&key, 15, 60, at(0)).unwrap().allowed).count()
        }));
    }
    let admitted: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();
    assert_eq!(admitted, 15);
}

#[test]
fn idle_windows_are_swept_and_entries_sorted_by_count() {
    let (_temp, store) = temp_store();
    let busy = RateKey::from_stored("busy");
    let idle = RateKey::from_stored("idle");
    store.hit(&idle, 10, 60, at(0)).unwrap();
    for _ in 0 .. 3 {
        store.hit(&busy, 10, 60, at(600)).unwrap();
    }
    let entries = store.rate_entries(10).unwrap();
    assert_eq!(entries[0].key, busy);
    assert_eq!(store.sweep_idle_windows(at(300)).unwrap(), 1);
    assert_eq!(store.rate_entries(10).unwrap().len(), 1);
}

// ============================================================================
// SECTION: Temp Files
// ============================================================================

#[test]
fn temp_files_split_into_live_and_expired() {
    let (temp, store) = temp_store();
    let handle = |id: &str, owner: u64, expires: i64| TempFileHandle {
        file_id: FileId::new(id),
        owner: Some(UserId::new(owner)),
        path: temp.path().join(id).join("out.png"),
        size: 12,
        tool: "compress".to_string(),
        file_name: "out.png".to_string(),
        mime: "image/png".to_string(),
        created_at: at(expires - 3_600),
        expires_at: at(expires),
    };
    store.insert_temp_file(&handle("a", 1, 60)).unwrap();
    store.insert_temp_file(&handle("b", 1, 7_200)).unwrap();
    store.insert_temp_file(&handle("c", 2, 7_200)).unwrap();

    assert_eq!(store.temp_file(&FileId::new("a")).unwrap(), Some(handle("a", 1, 60)));
    assert_eq!(store.expired_temp_files(at(60)).unwrap().len(), 1);
    assert_eq!(store.live_temp_files(Some(UserId::new(1)), at(60)).unwrap().len(), 1);
    assert_eq!(store.live_temp_files(None, at(0)).unwrap().len(), 3);
    assert!(store.remove_temp_file(&FileId::new("a")).unwrap());
    assert!(!store.remove_temp_file(&FileId::new("a")).unwrap());
}

// ============================================================================
// SECTION: Runtime Integration
// ============================================================================

#[test]
fn watchdog_blocks_through_the_sqlite_store() {
    let (_temp, store) = temp_store();
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(at(0)));
    let ctx = GovernanceContext::new(GovernanceStores::from_shared(Arc::clone(&store)))
        .with_clock(clock);
    let client = ClientId::new("203.0.113.77");
    for _ in 0 .. 205 {
        store
            .record_upload(&UploadRecord {
                client: client.clone(),
                user_id: Some(UserId::new(1)),
                size: 1_000,
                created_at: at(-60),
            })
            .unwrap();
    }

    let report = AbuseWatchdog::new(ctx.clone()).run().unwrap();
    assert_eq!(report.blocked, 1);
    assert!(AbuseGuard::new(ctx).is_blocked(&client));
    let blocks = store.list_blocked(1).unwrap();
    assert_eq!(blocks[0].blocked_by, BlockedBy::Auto);
}
