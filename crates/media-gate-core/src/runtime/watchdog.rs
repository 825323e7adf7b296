// crates/media-gate-core/src/runtime/watchdog.rs
// ============================================================================
// Module: Abuse Watchdog
// Description: Periodic trailing-window abuse scan with rule-based escalation.
// Purpose: Detect abusive upload patterns and escalate to blocks or warnings.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The watchdog purges expired blocks, aggregates the last 24 hours of
//! uploads per client identifier, and scores each identifier with an ordered
//! list of independent [`SuspicionRule`]s. The final level is the maximum of
//! the triggered rules, never their sum. Level 3 with auto-block enabled
//! blocks the identifier and appends a critical incident; any level of at
//! least 1 otherwise appends a medium or high warning.
//!
//! Each identifier is a self-contained unit of work, so an interrupted run
//! can simply be re-triggered. Already-blocked identifiers are skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::audit::GovernanceAuditEvent;
use crate::core::AbuseKind;
use crate::core::BlockedBy;
use crate::core::ClientId;
use crate::core::GovernanceSettings;
use crate::core::Severity;
use crate::core::Timestamp;
use crate::core::UploadActivity;
use crate::core::aggregate_uploads;
use crate::core::time::SECONDS_PER_DAY;
use crate::core::units::MIB;
use crate::interfaces::StoreError;
use crate::runtime::abuse_guard::AbuseGuard;
use crate::runtime::context::GovernanceContext;

// ============================================================================
// SECTION: Thresholds and Rules
// ============================================================================

/// Cumulative in-window bytes above which an identifier is suspicious.
pub const BANDWIDTH_THRESHOLD_BYTES: u64 = 500 * MIB;
/// Guest-only upload count above which an identifier is suspicious.
pub const GUEST_ACTIVITY_THRESHOLD: u64 = 30;
/// Suspicion level that triggers an automatic block.
pub const BLOCK_LEVEL: u8 = 3;

/// Thresholds the rules evaluate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogThresholds {
    /// Hourly upload threshold (0 disables the high-activity rule).
    pub hourly: u64,
    /// Daily upload threshold (0 disables the daily rules).
    pub daily: u64,
    /// Bandwidth ceiling in bytes.
    pub bandwidth_bytes: u64,
    /// Guest-only activity ceiling.
    pub guest_uploads: u64,
}

impl WatchdogThresholds {
    /// Reads thresholds from a settings snapshot.
    #[must_use]
    pub fn from_settings(settings: &GovernanceSettings) -> Self {
        Self {
            hourly: u64::from(settings.abuse_uploads_per_hour),
            daily: u64::from(settings.abuse_uploads_per_day),
            bandwidth_bytes: BANDWIDTH_THRESHOLD_BYTES,
            guest_uploads: GUEST_ACTIVITY_THRESHOLD,
        }
    }

    /// True when `count` is at least 75% of the daily threshold.
    const fn near_daily(&self, count: u64) -> bool {
        count.saturating_mul(4) >= self.daily.saturating_mul(3)
    }
}

/// One independent suspicion signal.
#[derive(Debug, Clone, Copy)]
pub struct SuspicionRule {
    /// Stable rule name.
    pub name: &'static str,
    /// Level contributed when the rule fires.
    pub level: u8,
    /// Returns the reason text when the rule fires.
    pub evaluate: fn(&UploadActivity, &WatchdogThresholds) -> Option<String>,
}

/// Ordered rule set. Count bands are disjoint so each identifier carries at
/// most one count-based reason.
pub const RULES: [SuspicionRule; 5] = [
    SuspicionRule {
        name: "daily_threshold",
        level: 3,
        evaluate: daily_threshold,
    },
    SuspicionRule {
        name: "approaching_daily",
        level: 2,
        evaluate: approaching_daily,
    },
    SuspicionRule {
        name: "high_activity",
        level: 1,
        evaluate: high_activity,
    },
    SuspicionRule {
        name: "bandwidth",
        level: 2,
        evaluate: bandwidth,
    },
    SuspicionRule {
        name: "guest_activity",
        level: 1,
        evaluate: guest_activity,
    },
];

/// Count reached the daily threshold.
fn daily_threshold(stats: &UploadActivity, t: &WatchdogThresholds) -> Option<String> {
    (t.daily > 0 && stats.count >= t.daily).then(|| {
        format!("Daily uploads ({}) exceeded threshold ({})", stats.count, t.daily)
    })
}

/// Count in [75% of daily, daily).
fn approaching_daily(stats: &UploadActivity, t: &WatchdogThresholds) -> Option<String> {
    (t.daily > 0 && stats.count < t.daily && t.near_daily(stats.count))
        .then(|| format!("Daily uploads ({}) approaching threshold", stats.count))
}

/// Count in [hourly, 75% of daily).
fn high_activity(stats: &UploadActivity, t: &WatchdogThresholds) -> Option<String> {
    let below_near = t.daily == 0 || !t.near_daily(stats.count);
    (t.hourly > 0 && stats.count >= t.hourly && below_near)
        .then(|| format!("High upload activity ({} in 24h)", stats.count))
}

/// Cumulative bytes above the bandwidth ceiling.
fn bandwidth(stats: &UploadActivity, t: &WatchdogThresholds) -> Option<String> {
    (stats.bytes > t.bandwidth_bytes).then(|| {
        let tenths = stats.bytes.saturating_mul(10).saturating_add(MIB / 2) / MIB;
        format!("High bandwidth usage ({}.{}MB in 24h)", tenths / 10, tenths % 10)
    })
}

/// Guest-only identifier above the guest activity ceiling.
fn guest_activity(stats: &UploadActivity, t: &WatchdogThresholds) -> Option<String> {
    (stats.is_guest && stats.count > t.guest_uploads)
        .then(|| format!("Guest with high activity ({} uploads)", stats.count))
}

/// Scores one identifier: maximum triggered level plus every triggered reason.
#[must_use]
pub fn score(stats: &UploadActivity, thresholds: &WatchdogThresholds) -> (u8, Vec<String>) {
    RULES.iter().fold((0, Vec::new()), |(level, mut reasons), rule| {
        match (rule.evaluate)(stats, thresholds) {
            Some(reason) => {
                reasons.push(reason);
                (level.max(rule.level), reasons)
            }
            None => (level, reasons),
        }
    })
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Action taken for a suspicious identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogAction {
    /// Block entry written.
    Blocked,
    /// Warning incident appended.
    Logged,
}

/// Evidence for one suspicious identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousIdentifier {
    /// Client identifier.
    pub identifier: ClientId,
    /// Incident severity recorded.
    pub level: Severity,
    /// Numeric suspicion level (maximum of triggered rules).
    pub suspicion: u8,
    /// Action taken.
    pub action: WatchdogAction,
    /// Trailing-window aggregate.
    pub stats: UploadActivity,
    /// Triggered rule reasons, in rule order.
    pub reasons: Vec<String>,
}

/// Result of one watchdog run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogReport {
    /// Run time.
    pub timestamp: Timestamp,
    /// Identifiers aggregated.
    pub scanned: u64,
    /// Identifiers blocked in this run.
    pub blocked: u64,
    /// Identifiers warned in this run.
    pub warnings: u64,
    /// Expired block entries removed.
    pub cleaned_expired: u64,
    /// Per-identifier evidence for every action taken.
    pub suspicious: Vec<SuspiciousIdentifier>,
    /// Non-fatal errors.
    pub errors: Vec<String>,
}

// ============================================================================
// SECTION: Watchdog
// ============================================================================

/// Out-of-band abuse scanner.
#[derive(Clone)]
pub struct AbuseWatchdog {
    /// Shared collaborators.
    ctx: GovernanceContext,
    /// Block list and incident facade.
    guard: AbuseGuard,
}

impl AbuseWatchdog {
    /// Creates a watchdog.
    #[must_use]
    pub fn new(ctx: GovernanceContext) -> Self {
        let guard = AbuseGuard::new(ctx.clone());
        Self {
            ctx,
            guard,
        }
    }

    /// Runs one scan.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when upload activity cannot be read. Block
    /// purge and per-identifier write failures are recorded in the report.
    pub fn run(&self) -> Result<WatchdogReport, StoreError> {
        let now = self.ctx.now();
        let settings = self.ctx.settings_snapshot();
        let mut report = WatchdogReport {
            timestamp: now,
            scanned: 0,
            blocked: 0,
            warnings: 0,
            cleaned_expired: 0,
            suspicious: Vec::new(),
            errors: Vec::new(),
        };

        match self.guard.purge_expired() {
            Ok(count) => report.cleaned_expired = count,
            Err(err) => report.errors.push(format!("purge expired blocks: {err}")),
        }

        let uploads = self.ctx.stores.uploads.uploads_since(now.minus_seconds(SECONDS_PER_DAY))?;
        let groups = aggregate_uploads(&uploads);
        report.scanned = groups.len() as u64;

        let thresholds = WatchdogThresholds::from_settings(&settings);
        for (identifier, stats) in groups {
            if identifier.is_unknown() || self.guard.is_blocked(&identifier) {
                continue;
            }
            let (level, reasons) = score(&stats, &thresholds);
            if level == 0 {
                continue;
            }
            let details = reasons.join("; ");
            let mut action = WatchdogAction::Logged;
            let mut severity = if level >= 2 { Severity::High } else { Severity::Medium };

            if level >= BLOCK_LEVEL && settings.abuse_auto_block_enabled {
                match self.guard.block_for(
                    &identifier,
                    &format!("Watchdog: {details}"),
                    settings.abuse_block_duration_hours,
                    BlockedBy::Auto,
                ) {
                    Ok(_) => {
                        action = WatchdogAction::Blocked;
                        severity = Severity::Critical;
                    }
                    Err(err) => report.errors.push(format!("block {identifier}: {err}")),
                }
            }

            self.guard.log_incident(&identifier, AbuseKind::UploadSpam, severity, None, details);
            match action {
                WatchdogAction::Blocked => report.blocked += 1,
                WatchdogAction::Logged => report.warnings += 1,
            }
            report.suspicious.push(SuspiciousIdentifier {
                identifier,
                level: severity,
                suspicion: level,
                action,
                stats,
                reasons,
            });
        }

        self.ctx.emit(
            &GovernanceAuditEvent::new("watchdog_completed", now)
                .with("scanned", report.scanned)
                .with("blocked", report.blocked)
                .with("warnings", report.warnings)
                .with("cleaned_expired", report.cleaned_expired)
                .with("errors", report.errors.len()),
        );
        Ok(report)
    }
}
