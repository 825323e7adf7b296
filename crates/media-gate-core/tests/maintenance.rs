// crates/media-gate-core/tests/maintenance.rs
// ============================================================================
// Module: Maintenance Runner Tests
// Description: One-shot housekeeping pass over every job.
// ============================================================================
//! ## Overview
//! Validates that a pass reaps temp files, sweeps idle windows, purges the
//! upload ledger past retention, runs the watchdog, and isolates failures.

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
use media_gate_core::GovernanceStores;
use media_gate_core::InMemoryGovernanceStore;
use media_gate_core::MaintenanceRunner;
use media_gate_core::RateLimitPolicy;
use media_gate_core::RateLimiter;
use media_gate_core::RateSubject;
use media_gate_core::TaskOutcome;
use media_gate_core::TempFileReaper;
use media_gate_core::TempFileSpec;
use media_gate_core::UserId;
use media_gate_core::interfaces::UploadLedger;
use tempfile::TempDir;

#[test]
fn one_pass_runs_every_job() {
    let harness = Harness::new();
    let dir = TempDir::new().unwrap();
    let reaper = TempFileReaper::new(harness.ctx.clone(), dir.path());
    let spec = TempFileSpec::new(None, "compress", "a.jpg", "image/jpeg").expires_in(60);
    reaper.save_result(b"abc", spec).unwrap();

    let limiter = RateLimiter::new(harness.ctx.clone(), RateLimitPolicy::default());
    assert!(limiter.allow(&RateSubject::User(UserId::new(1))));
    harness.uploads("203.0.113.80", None, 210, 1);

    harness.clock.advance_seconds(8 * 86_400);
    harness.uploads("203.0.113.81", Some(UserId::new(2)), 205, 1);

    let runner = MaintenanceRunner::new(&harness.ctx, RateLimitPolicy::default(), dir.path());
    let report = runner.run_once();

    assert!(report.is_clean());
    assert!(matches!(
        report.temp_cleanup,
        TaskOutcome::Completed { ref result } if result.deleted_count == 1
    ));
    assert_eq!(report.rate_window_sweep, TaskOutcome::Completed {
        result: 1
    });
    assert_eq!(report.upload_purge, TaskOutcome::Completed {
        result: 210
    });
    let TaskOutcome::Completed {
        result: watchdog,
    } = &report.watchdog
    else {
        panic!("watchdog failed: {:?}", report.watchdog);
    };
    assert_eq!((watchdog.scanned, watchdog.blocked), (1, 1));
    let retained = harness.store.uploads_since(harness.ctx.now().minus_seconds(30 * 86_400));
    assert_eq!(retained.unwrap().len(), 205);
}

#[test]
fn failing_job_does_not_stop_the_pass() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let mut stores = GovernanceStores::from_shared(store.clone());
    stores.uploads = Arc::new(UnavailableStore);
    let harness = Harness::with_stores(store, stores);
    let dir = TempDir::new().unwrap();

    let report =
        MaintenanceRunner::new(&harness.ctx, RateLimitPolicy::default(), dir.path()).run_once();
    assert!(!report.is_clean());
    assert!(report.temp_cleanup.is_completed());
    assert!(report.rate_window_sweep.is_completed());
    assert!(!report.upload_purge.is_completed());
    assert!(!report.watchdog.is_completed());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["upload_purge"]["status"], "failed");
    assert_eq!(json["temp_cleanup"]["status"], "completed");
}
