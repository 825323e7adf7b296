// crates/media-gate-core/tests/abuse_guard.rs
// ============================================================================
// Module: Upload Guard and Block List Tests
// Description: Request-path upload checks and block-list administration.
// ============================================================================
//! ## Overview
//! Validates guest rules, hourly spam escalation to auto-blocks, block
//! expiry at read time, upsert semantics, and incident statistics.

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
use media_gate_core::BlockedBy;
use media_gate_core::ClientId;
use media_gate_core::GovernanceStores;
use media_gate_core::InMemoryGovernanceStore;
use media_gate_core::IncidentFilter;
use media_gate_core::ReasonCode;
use media_gate_core::SettingValue;
use media_gate_core::Severity;
use media_gate_core::UserId;
use media_gate_core::interfaces::BlockList;
use media_gate_core::settings::keys;
use media_gate_core::units::MIB;

// ============================================================================
// SECTION: Upload Checks
// ============================================================================

#[test]
fn oversized_guest_upload_cites_the_limit() {
    let harness = Harness::new();
    let guard = AbuseGuard::new(harness.ctx.clone());
    let verdict = guard.check_upload(&ClientId::new("203.0.113.1"), None, 10 * MIB);
    assert_eq!(verdict.code, ReasonCode::GuestSizeLimit);
    assert!(verdict.message.contains("up to 5 MB"), "{}", verdict.message);
    assert_eq!(verdict.extra["limit_mb"], 5);
    let member = guard.check_upload(&ClientId::new("203.0.113.1"), Some(UserId::new(1)), 10 * MIB);
    assert!(member.allowed);
}

#[test]
fn guests_can_be_switched_off() {
    let harness = Harness::new();
    harness.set(keys::ABUSE_GUEST_UPLOAD_ENABLED, SettingValue::Bool(false));
    let guard = AbuseGuard::new(harness.ctx.clone());
    let verdict = guard.check_upload(&ClientId::new("203.0.113.2"), None, 1);
    assert_eq!(verdict.code, ReasonCode::GuestDisabled);
}

#[test]
fn hourly_spam_logs_and_daily_spam_auto_blocks() {
    let harness = Harness::new();
    let guard = AbuseGuard::new(harness.ctx.clone());
    let client = ClientId::new("198.51.100.20");

    harness.clock.advance_seconds(-20 * 3_600);
    harness.uploads(client.as_str(), None, 150, 1_000);
    harness.clock.advance_seconds(20 * 3_600);
    harness.uploads(client.as_str(), None, 50, 1_000);

    let verdict = guard.check_upload(&client, None, 1_000);
    assert_eq!(verdict.code, ReasonCode::RateLimit);
    assert_eq!(verdict.retry_after(), Some(3_600));
    assert!(guard.is_blocked(&client));

    let incidents = guard
        .incidents(&IncidentFilter {
            kind: Some(AbuseKind::UploadSpam),
            identifier: Some(client.clone()),
            limit: 10,
        })
        .unwrap();
    let severities: Vec<Severity> = incidents.iter().map(|incident| incident.severity).collect();
    assert_eq!(severities, [Severity::High, Severity::Medium]);
    assert_eq!(harness.audit.count("block_applied"), 1);

    assert_eq!(guard.check_upload(&client, None, 1).code, ReasonCode::IpBlocked);
}

#[test]
fn hourly_spam_without_daily_excess_does_not_block() {
    let harness = Harness::new();
    let guard = AbuseGuard::new(harness.ctx.clone());
    let client = ClientId::new("198.51.100.21");
    harness.uploads(client.as_str(), None, 50, 1_000);

    assert_eq!(guard.check_upload(&client, None, 1_000).code, ReasonCode::RateLimit);
    assert!(!guard.is_blocked(&client));
}

// ============================================================================
// SECTION: Block List
// ============================================================================

#[test]
fn expired_blocks_read_as_unblocked_before_the_sweep() {
    let harness = Harness::new();
    let guard = AbuseGuard::new(harness.ctx.clone());
    let client = ClientId::new("192.0.2.30");
    guard.block(&client, "manual", Some(1), BlockedBy::Admin).unwrap();
    assert!(guard.is_blocked(&client));

    harness.clock.advance_seconds(3_600);
    assert!(!guard.is_blocked(&client));
    assert_eq!(guard.list_blocked(10).unwrap().len(), 1);
    assert_eq!(guard.purge_expired().unwrap(), 1);
    assert!(guard.list_blocked(10).unwrap().is_empty());
}

#[test]
fn zero_hours_is_permanent_and_reblocking_updates_in_place() {
    let harness = Harness::new();
    let guard = AbuseGuard::new(harness.ctx.clone());
    let client = ClientId::new("192.0.2.31");
    let first = guard.block(&client, "first", Some(2), BlockedBy::Auto).unwrap();
    harness.clock.advance_seconds(60);
    let second = guard.block(&client, "second", Some(0), BlockedBy::Admin).unwrap();
    assert!(second.expires_at.is_none());

    let stored = harness.store.active_block(&client, harness.ctx.now()).unwrap().unwrap();
    assert_eq!(stored.reason, "second");
    assert_eq!(stored.blocked_by, BlockedBy::Admin);
    assert_eq!(stored.created_at, second.created_at);
    assert_eq!(stored.created_at, first.created_at.plus_seconds(60));
    assert_eq!(guard.list_blocked(10).unwrap().len(), 1);

    harness.clock.advance_seconds(365 * 86_400);
    assert!(guard.is_blocked(&client));
    assert!(guard.unblock(&client).unwrap());
    assert!(!guard.unblock(&client).unwrap());
}

#[test]
fn default_block_duration_comes_from_settings() {
    let harness = Harness::new();
    harness.set(keys::ABUSE_BLOCK_DURATION_HOURS, SettingValue::Int(3));
    let guard = AbuseGuard::new(harness.ctx.clone());
    let entry = guard.block(&ClientId::new("192.0.2.32"), "x", None, BlockedBy::Admin).unwrap();
    assert_eq!(entry.expires_at, Some(harness.ctx.now().plus_seconds(3 * 3_600)));
}

#[test]
fn abuse_stats_summarize_the_trailing_week() {
    let harness = Harness::new();
    let guard = AbuseGuard::new(harness.ctx.clone());
    let noisy = ClientId::new("10.9.9.9");
    let quiet = ClientId::new("10.8.8.8");

    harness.clock.advance_seconds(-3 * 86_400);
    assert!(guard.log_incident(&quiet, AbuseKind::ApiAbuse, Severity::Low, None, "old"));
    harness.clock.advance_seconds(3 * 86_400);
    for _ in 0 .. 3 {
        assert!(guard.log_incident(&noisy, AbuseKind::UploadSpam, Severity::High, None, "x"));
    }
    guard.block(&noisy, "spam", Some(24), BlockedBy::Admin).unwrap();

    let stats = guard.abuse_stats().unwrap();
    assert_eq!(stats.blocked_active, 1);
    assert_eq!(stats.incidents_today, 3);
    assert_eq!(stats.incidents_week, 4);
    assert_eq!(stats.by_severity["high"], 3);
    assert_eq!(stats.top_offenders[0].identifier, noisy);
    assert_eq!(stats.top_offenders[0].count, 3);
}

#[test]
fn abuse_log_failure_is_best_effort() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let mut stores = GovernanceStores::from_shared(store.clone());
    stores.incidents = Arc::new(UnavailableStore);
    stores.blocks = Arc::new(UnavailableStore);
    let harness = Harness::with_stores(store, stores);
    let guard = AbuseGuard::new(harness.ctx.clone());
    let client = ClientId::new("10.2.2.2");

    assert!(!guard.log_incident(&client, AbuseKind::BruteForce, Severity::Low, None, "x"));
    assert_eq!(harness.audit.count("abuse_log_failed"), 1);
    // Unreadable block list reads as not blocked.
    assert!(guard.check_upload(&client, Some(UserId::new(1)), 1).allowed);
}
