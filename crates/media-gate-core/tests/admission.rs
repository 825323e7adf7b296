// crates/media-gate-core/tests/admission.rs
// ============================================================================
// Module: Admission Pipeline Tests
// Description: Rate limiter, upload guard, and gatekeeper composed in order.
// ============================================================================
//! ## Overview
//! Validates stage order, that allow verdicts carry throttling metadata, and
//! that completed uploads feed the activity ledger and both storage counters.

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
use media_gate_core::AccountTier;
use media_gate_core::Admission;
use media_gate_core::BlockedBy;
use media_gate_core::ClientId;
use media_gate_core::GovernanceStores;
use media_gate_core::HeavyTool;
use media_gate_core::InMemoryGovernanceStore;
use media_gate_core::RateLimitPolicy;
use media_gate_core::ReasonCode;
use media_gate_core::RequestOrigin;
use media_gate_core::SettingValue;
use media_gate_core::SettingsStore;
use media_gate_core::Timestamp;
use media_gate_core::interfaces::QuotaLedger;
use media_gate_core::interfaces::UploadLedger;
use media_gate_core::settings::keys;
use media_gate_core::units::MIB;

fn admission(harness: &Harness) -> Admission {
    Admission::new(&harness.ctx, RateLimitPolicy::default(), harness.probe.clone())
}

#[test]
fn allowed_upload_carries_rate_metadata() {
    let harness = Harness::new();
    let verdict = admission(&harness).admit_upload(&RequestOrigin::guest("203.0.113.7"), MIB);
    assert!(verdict.allowed);
    assert_eq!(verdict.extra["rate"]["limit"], 10);
    assert_eq!(verdict.extra["rate"]["remaining"], 9);
}

#[test]
fn throttle_runs_before_the_guard() {
    let harness = Harness::new();
    let admission = admission(&harness);
    let origin = RequestOrigin::guest("203.0.113.8");
    for _ in 0 .. 10 {
        assert!(admission.admit_upload(&origin, 1).allowed);
    }
    // An oversized guest upload is throttled before the size rule is seen.
    let verdict = admission.admit_upload(&origin, 50 * MIB);
    assert_eq!(verdict.code, ReasonCode::RateLimit);
    assert!(verdict.retry_after().is_some());
}

#[test]
fn guard_runs_before_the_gatekeeper() {
    let harness = Harness::new();
    harness.set(keys::MAINTENANCE_MODE, SettingValue::Bool(true));
    let admission = admission(&harness);
    let verdict = admission.admit_upload(&RequestOrigin::guest("203.0.113.9"), 10 * MIB);
    assert_eq!(verdict.code, ReasonCode::GuestSizeLimit);
    let small = admission.admit_upload(&RequestOrigin::guest("203.0.113.9"), 1);
    assert_eq!(small.code, ReasonCode::MaintenanceMode);
    assert!(small.extra.get("rate").is_none());
}

#[test]
fn heavy_tool_admission_skips_upload_rules() {
    let harness = Harness::new();
    harness.set(keys::ABUSE_GUEST_UPLOAD_ENABLED, SettingValue::Bool(false));
    let admission = admission(&harness);
    let origin = RequestOrigin::guest("198.51.100.9");
    let verdict = admission.admit_heavy_tool(&origin, HeavyTool::Ocr);
    assert!(verdict.allowed);
    assert_eq!(verdict.extra["guest"], true);
    assert_eq!(verdict.extra["rate"]["remaining"], 9);
}

#[test]
fn blocked_client_cannot_run_heavy_tools() {
    let harness = Harness::new();
    let admission = admission(&harness);
    let client = ClientId::new("203.0.113.66");
    admission.guard().block(&client, "Repeated abuse", Some(1), BlockedBy::Admin).unwrap();

    let user = harness.account(12, AccountTier::Premium, 1 << 30);
    let origins = [RequestOrigin::guest("203.0.113.66"), RequestOrigin::user("203.0.113.66", user)];
    for origin in origins {
        let verdict = admission.admit_heavy_tool(&origin, HeavyTool::RemoveBg);
        assert_eq!(verdict.code, ReasonCode::IpBlocked);
    }
    assert_eq!(harness.audit.count("admission_denied"), 2);
    let quota = harness.store.account(user).unwrap().unwrap();
    assert_eq!(quota.daily_removebg_count, 0);

    let other = admission.admit_heavy_tool(&RequestOrigin::guest("203.0.113.67"), HeavyTool::Ocr);
    assert!(other.allowed);
}

#[test]
fn completed_upload_updates_ledger_and_counters() {
    let harness = Harness::new();
    let user = harness.account(9, AccountTier::Free, 1 << 30);
    let admission = admission(&harness);
    let origin = RequestOrigin::user("192.0.2.9", user);

    assert!(admission.complete_upload(&origin, 3 * MIB));
    assert!(admission.complete_upload(&RequestOrigin::guest("192.0.2.10"), MIB));

    let client = ClientId::new("192.0.2.9");
    let since = Timestamp::from_unix_seconds(0);
    assert_eq!(harness.store.count_uploads_since(&client, since).unwrap(), 1);
    assert_eq!(harness.store.account(user).unwrap().unwrap().storage_used, 3 * MIB);
    let used = harness.store.get_setting(keys::GLOBAL_STORAGE_USED).unwrap();
    assert_eq!(used, Some(SettingValue::Int(i64::try_from(4 * MIB).unwrap())));
}

#[test]
fn completed_upload_reports_ledger_failure() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let mut stores = GovernanceStores::from_shared(store.clone());
    stores.uploads = Arc::new(UnavailableStore);
    let harness = Harness::with_stores(store, stores);

    assert!(!admission(&harness).complete_upload(&RequestOrigin::guest("10.0.0.9"), 10));
    assert_eq!(harness.audit.count("store_failure"), 1);
    let used = harness.store.get_setting(keys::GLOBAL_STORAGE_USED).unwrap();
    assert_eq!(used, Some(SettingValue::Int(10)));
}
