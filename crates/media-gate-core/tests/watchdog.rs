// crates/media-gate-core/tests/watchdog.rs
// ============================================================================
// Module: Abuse Watchdog Tests
// Description: Trailing-window scans, escalation levels, and skip rules.
// ============================================================================
//! ## Overview
//! Validates that daily-threshold offenders are blocked, near-threshold and
//! bandwidth offenders are only warned, and that repeated runs are stable.

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

mod common;

use std::sync::Arc;

use common::Harness;
use common::UnavailableStore;
use media_gate_core::AbuseGuard;
use media_gate_core::AbuseKind;
use media_gate_core::AbuseWatchdog;
use media_gate_core::BlockedBy;
use media_gate_core::ClientId;
use media_gate_core::GovernanceStores;
use media_gate_core::InMemoryGovernanceStore;
use media_gate_core::IncidentFilter;
use media_gate_core::SettingValue;
use media_gate_core::Severity;
use media_gate_core::UserId;
use media_gate_core::runtime::WatchdogAction;
use media_gate_core::settings::keys;
use media_gate_core::units::MIB;

#[test]
fn daily_threshold_offender_is_blocked() {
    let harness = Harness::new();
    harness.uploads("203.0.113.50", Some(UserId::new(7)), 205, 1_000);
    let report = AbuseWatchdog::new(harness.ctx.clone()).run().unwrap();

    assert_eq!((report.scanned, report.blocked, report.warnings), (1, 1, 0));
    let entry = &report.suspicious[0];
    assert_eq!(entry.action, WatchdogAction::Blocked);
    assert_eq!(entry.level, Severity::Critical);
    assert_eq!(entry.suspicion, 3);
    assert_eq!(entry.reasons, ["Daily uploads (205) exceeded threshold (200)"]);

    let guard = AbuseGuard::new(harness.ctx.clone());
    let client = ClientId::new("203.0.113.50");
    assert!(guard.is_blocked(&client));
    let blocks = guard.list_blocked(5).unwrap();
    assert_eq!(blocks[0].blocked_by, BlockedBy::Auto);
    assert!(blocks[0].reason.starts_with("Watchdog: Daily uploads (205)"));
    assert_eq!(harness.audit.count("watchdog_completed"), 1);
}

#[test]
fn approaching_threshold_is_warned_not_blocked() {
    let harness = Harness::new();
    harness.uploads("203.0.113.51", Some(UserId::new(8)), 150, 1_000);
    let report = AbuseWatchdog::new(harness.ctx.clone()).run().unwrap();

    assert_eq!((report.blocked, report.warnings), (0, 1));
    assert_eq!(report.suspicious[0].action, WatchdogAction::Logged);
    assert_eq!(report.suspicious[0].level, Severity::High);

    let guard = AbuseGuard::new(harness.ctx.clone());
    assert!(!guard.is_blocked(&ClientId::new("203.0.113.51")));
    let incidents = guard
        .incidents(&IncidentFilter {
            kind: Some(AbuseKind::UploadSpam),
            identifier: None,
            limit: 10,
        })
        .unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].details, "Daily uploads (150) approaching threshold");
}

#[test]
fn guest_and_bandwidth_signals_stack_as_reasons_only() {
    let harness = Harness::new();
    harness.uploads("198.51.100.60", None, 40, 15 * MIB);
    let report = AbuseWatchdog::new(harness.ctx.clone()).run().unwrap();

    let entry = &report.suspicious[0];
    assert_eq!(entry.suspicion, 2);
    assert_eq!(entry.level, Severity::High);
    assert_eq!(
        entry.reasons,
        ["High bandwidth usage (600.0MB in 24h)", "Guest with high activity (40 uploads)"]
    );
}

#[test]
fn disabled_auto_block_downgrades_to_warning() {
    let harness = Harness::new();
    harness.set(keys::ABUSE_AUTO_BLOCK_ENABLED, SettingValue::Bool(false));
    harness.uploads("203.0.113.52", None, 250, 1_000);
    let report = AbuseWatchdog::new(harness.ctx.clone()).run().unwrap();

    assert_eq!((report.blocked, report.warnings), (0, 1));
    assert_eq!(report.suspicious[0].level, Severity::High);
    assert!(!AbuseGuard::new(harness.ctx.clone()).is_blocked(&ClientId::new("203.0.113.52")));
}

#[test]
fn blocked_and_unknown_identifiers_are_skipped() {
    let harness = Harness::new();
    harness.uploads("203.0.113.53", None, 300, 1_000);
    harness.uploads("unknown", None, 300, 1_000);

    let watchdog = AbuseWatchdog::new(harness.ctx.clone());
    let first = watchdog.run().unwrap();
    assert_eq!((first.scanned, first.blocked), (2, 1));

    let second = watchdog.run().unwrap();
    assert_eq!((second.blocked, second.warnings), (0, 0));
    assert!(second.suspicious.is_empty());
}

#[test]
fn old_uploads_fall_out_of_the_window_and_expired_blocks_are_cleaned() {
    let harness = Harness::new();
    let guard = AbuseGuard::new(harness.ctx.clone());
    guard.block(&ClientId::new("192.0.2.70"), "old", Some(1), BlockedBy::Admin).unwrap();
    harness.uploads("203.0.113.54", None, 300, 1_000);
    harness.clock.advance_seconds(25 * 3_600);

    let report = AbuseWatchdog::new(harness.ctx.clone()).run().unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.cleaned_expired, 1);
}

#[test]
fn failed_block_write_is_reported_and_warned() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let mut stores = GovernanceStores::from_shared(store.clone());
    stores.blocks = Arc::new(UnavailableStore);
    let harness = Harness::with_stores(store, stores);
    harness.uploads("203.0.113.55", Some(UserId::new(1)), 220, 1_000);

    let report = AbuseWatchdog::new(harness.ctx.clone()).run().unwrap();
    assert_eq!((report.blocked, report.warnings), (0, 1));
    assert_eq!(report.suspicious[0].level, Severity::High);
    // Purge failure plus the failed block write.
    assert_eq!(report.errors.len(), 2);
}

#[test]
fn unreadable_upload_ledger_fails_the_run() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let mut stores = GovernanceStores::from_shared(store.clone());
    stores.uploads = Arc::new(UnavailableStore);
    let harness = Harness::with_stores(store, stores);
    assert!(AbuseWatchdog::new(harness.ctx.clone()).run().is_err());
}
