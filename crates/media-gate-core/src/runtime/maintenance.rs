// crates/media-gate-core/src/runtime/maintenance.rs
// ============================================================================
// Module: Maintenance Runner
// Description: One pass over every out-of-band housekeeping job.
// Purpose: Run reaper, rate sweep, ledger purge, and watchdog independently.
// Dependencies: crate::{core, interfaces, runtime}, serde
// ============================================================================

//! ## Overview
//! [`MaintenanceRunner::run_once`] runs each job in turn and captures its
//! outcome. A failing job never prevents the later ones from running.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Serialize;

use crate::core::CleanupReport;
use crate::core::Timestamp;
use crate::core::time::SECONDS_PER_DAY;
use crate::interfaces::StoreError;
use crate::runtime::context::GovernanceContext;
use crate::runtime::rate_limiter::RateLimitPolicy;
use crate::runtime::rate_limiter::RateLimiter;
use crate::runtime::reaper::TempFileReaper;
use crate::runtime::watchdog::AbuseWatchdog;
use crate::runtime::watchdog::WatchdogReport;

/// Days of upload activity kept for the watchdog and guest checks.
pub const UPLOAD_RETENTION_DAYS: i64 = 7;

// ============================================================================
// SECTION: Report
// ============================================================================

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome<T> {
    /// Job finished.
    Completed {
        /// Job result.
        result: T,
    },
    /// Job failed; later jobs still ran.
    Failed {
        /// Error text.
        error: String,
    },
}

impl<T> TaskOutcome<T> {
    /// Wraps a job result.
    fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(result) => Self::Completed {
                result,
            },
            Err(err) => Self::Failed {
                error: err.to_string(),
            },
        }
    }

    /// True when the job finished.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Result of one maintenance pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Pass start.
    pub timestamp: Timestamp,
    /// Wall time of the pass in milliseconds.
    pub duration_ms: i64,
    /// Temp-file reaper.
    pub temp_cleanup: TaskOutcome<CleanupReport>,
    /// Idle rate-window sweep (windows removed).
    pub rate_window_sweep: TaskOutcome<u64>,
    /// Upload ledger retention purge (records removed).
    pub upload_purge: TaskOutcome<u64>,
    /// Abuse watchdog.
    pub watchdog: TaskOutcome<WatchdogReport>,
}

impl MaintenanceReport {
    /// True when every job finished.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.temp_cleanup.is_completed()
            && self.rate_window_sweep.is_completed()
            && self.upload_purge.is_completed()
            && self.watchdog.is_completed()
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Housekeeping driver for the scheduler and the one-shot CLI command.
#[derive(Clone)]
pub struct MaintenanceRunner {
    /// Shared collaborators.
    ctx: GovernanceContext,
    /// Temp-file reaper.
    reaper: TempFileReaper,
    /// Rate limiter owning the window sweep.
    rate_limiter: RateLimiter,
    /// Abuse watchdog.
    watchdog: AbuseWatchdog,
}

impl MaintenanceRunner {
    /// Builds a runner.
    #[must_use]
    pub fn new(
        ctx: &GovernanceContext,
        policy: RateLimitPolicy,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            reaper: TempFileReaper::new(ctx.clone(), temp_root),
            rate_limiter: RateLimiter::new(ctx.clone(), policy),
            watchdog: AbuseWatchdog::new(ctx.clone()),
        }
    }

    /// Runs only the idle rate-window sweep.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    pub fn sweep_rate_windows(&self) -> Result<u64, StoreError> {
        self.rate_limiter.sweep_idle()
    }

    /// Runs every job once.
    #[must_use]
    pub fn run_once(&self) -> MaintenanceReport {
        let started = self.ctx.now();
        let temp_cleanup = TaskOutcome::Completed {
            result: self.reaper.cleanup_expired(),
        };
        let rate_window_sweep = TaskOutcome::from_result(self.sweep_rate_windows());
        let cutoff = self.ctx.now().minus_seconds(UPLOAD_RETENTION_DAYS * SECONDS_PER_DAY);
        let upload_purge =
            TaskOutcome::from_result(self.ctx.stores.uploads.purge_uploads_before(cutoff));
        let watchdog = TaskOutcome::from_result(self.watchdog.run());
        MaintenanceReport {
            timestamp: started,
            duration_ms: self.ctx.now().millis_since(started),
            temp_cleanup,
            rate_window_sweep,
            upload_purge,
            watchdog,
        }
    }
}
