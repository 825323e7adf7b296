// crates/media-gate-core/src/runtime/abuse_guard.rs
// ============================================================================
// Module: Abuse Guard
// Description: Block list, incident log, and request-path upload abuse checks.
// Purpose: Enforce application-level deny-lists and per-address upload limits.
// Dependencies: crate::{audit, core, interfaces, runtime::context}
// ============================================================================

//! ## Overview
//! The abuse guard owns the block list and abuse log surfaces and runs the
//! per-upload checks that precede the gatekeeper: block list, guest toggle,
//! guest size ceiling, then the hourly per-address upload threshold.
//!
//! Incident appends are best-effort: a failed append is reported through the
//! audit sink and never changes the verdict of the triggering request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::audit::GovernanceAuditEvent;
use crate::core::AbuseIncident;
use crate::core::AbuseKind;
use crate::core::AbuseStats;
use crate::core::BlockedBy;
use crate::core::BlockedEntry;
use crate::core::ClientId;
use crate::core::GovernanceSettings;
use crate::core::IncidentFilter;
use crate::core::OffenderSummary;
use crate::core::ReasonCode;
use crate::core::Severity;
use crate::core::TOP_OFFENDER_LIMIT;
use crate::core::Timestamp;
use crate::core::UploadRecord;
use crate::core::UserId;
use crate::core::Verdict;
use crate::core::block_expiry;
use crate::core::time::SECONDS_PER_DAY;
use crate::core::time::SECONDS_PER_HOUR;
use crate::interfaces::StoreError;
use crate::runtime::context::GovernanceContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Retry hint attached to hourly upload denials.
pub const UPLOAD_RETRY_AFTER_SECS: u64 = 3_600;
/// Trailing window for incident statistics.
const STATS_WINDOW_DAYS: i64 = 7;
/// User-facing message for requests from a blocked client.
const MSG_BLOCKED: &str =
    "Your IP has been temporarily blocked due to abuse. Please try again later.";

// ============================================================================
// SECTION: Abuse Guard
// ============================================================================

/// Block list and abuse log facade plus upload abuse checks.
#[derive(Clone)]
pub struct AbuseGuard {
    /// Shared collaborators.
    ctx: GovernanceContext,
}

impl AbuseGuard {
    /// Creates an abuse guard.
    #[must_use]
    pub const fn new(ctx: GovernanceContext) -> Self {
        Self {
            ctx,
        }
    }

    /// Returns true when `identifier` has a block in force now.
    ///
    /// An unreadable block list reads as not blocked and is audited.
    #[must_use]
    pub fn is_blocked(&self, identifier: &ClientId) -> bool {
        match self.ctx.stores.blocks.active_block(identifier, self.ctx.now()) {
            Ok(entry) => entry.is_some(),
            Err(err) => {
                self.ctx.store_failure("is_blocked", &err);
                false
            }
        }
    }

    /// Blocks `identifier`. `duration_hours` of `None` uses the configured
    /// block duration; zero means permanent. Re-blocking updates the entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the block list write fails.
    pub fn block(
        &self,
        identifier: &ClientId,
        reason: &str,
        duration_hours: Option<u32>,
        blocked_by: BlockedBy,
    ) -> Result<BlockedEntry, StoreError> {
        let hours = match duration_hours {
            Some(hours) => hours,
            None => self.ctx.settings_snapshot().abuse_block_duration_hours,
        };
        self.block_for(identifier, reason, hours, blocked_by)
    }

    /// Removes a block. Returns true when an entry existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the block list write fails.
    pub fn unblock(&self, identifier: &ClientId) -> Result<bool, StoreError> {
        self.ctx.stores.blocks.unblock(identifier)
    }

    /// Lists block entries newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the block list cannot be read.
    pub fn list_blocked(&self, limit: usize) -> Result<Vec<BlockedEntry>, StoreError> {
        self.ctx.stores.blocks.list_blocked(limit)
    }

    /// Physically removes expired entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    pub fn purge_expired(&self) -> Result<u64, StoreError> {
        self.ctx.stores.blocks.purge_expired_blocks(self.ctx.now())
    }

    /// Appends an incident, best-effort. Returns false when the append failed.
    pub fn log_incident(
        &self,
        identifier: &ClientId,
        kind: AbuseKind,
        severity: Severity,
        user_id: Option<UserId>,
        details: impl Into<String>,
    ) -> bool {
        let now = self.ctx.now();
        let incident = AbuseIncident {
            identifier: identifier.clone(),
            kind,
            severity,
            user_id,
            details: details.into(),
            created_at: now,
        };
        match self.ctx.stores.incidents.append_incident(&incident) {
            Ok(()) => true,
            Err(err) => {
                self.ctx.emit(&GovernanceAuditEvent::abuse_log_failed(
                    now,
                    identifier,
                    &err.to_string(),
                ));
                false
            }
        }
    }

    /// Lists incidents newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the abuse log cannot be read.
    pub fn incidents(&self, filter: &IncidentFilter) -> Result<Vec<AbuseIncident>, StoreError> {
        self.ctx.stores.incidents.list_incidents(filter)
    }

    /// Aggregates block and incident statistics.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the block list or abuse log cannot be read.
    pub fn abuse_stats(&self) -> Result<AbuseStats, StoreError> {
        let now = self.ctx.now();
        let blocked_active = self.ctx.stores.blocks.count_active_blocks(now)?;
        let week = self
            .ctx
            .stores
            .incidents
            .incidents_since(now.minus_seconds(STATS_WINDOW_DAYS * SECONDS_PER_DAY))?;
        Ok(summarize_incidents(blocked_active, &week, now.utc_date().start()))
    }

    /// Request-path upload checks, evaluated before the gatekeeper.
    #[must_use]
    pub fn check_upload(
        &self,
        client: &ClientId,
        user_id: Option<UserId>,
        file_size: u64,
    ) -> Verdict {
        let settings = self.ctx.settings_snapshot();
        let verdict = self.evaluate_upload(&settings, client, user_id, file_size);
        if verdict.is_denied() {
            self.ctx.emit(&GovernanceAuditEvent::admission_denied(
                self.ctx.now(),
                "check_upload",
                &verdict,
                user_id,
                Some(client),
            ));
        }
        verdict
    }

    /// Denies any request from a blocked client with `ip_blocked`.
    #[must_use]
    pub fn check_blocked(&self, client: &ClientId, user_id: Option<UserId>) -> Verdict {
        if !self.is_blocked(client) {
            return Verdict::allow();
        }
        let verdict = Verdict::deny(ReasonCode::IpBlocked, MSG_BLOCKED);
        self.ctx.emit(&GovernanceAuditEvent::admission_denied(
            self.ctx.now(),
            "check_blocked",
            &verdict,
            user_id,
            Some(client),
        ));
        verdict
    }

    /// Appends an upload to the activity ledger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the ledger write fails.
    pub fn record_upload(
        &self,
        client: &ClientId,
        user_id: Option<UserId>,
        size: u64,
    ) -> Result<(), StoreError> {
        self.ctx.stores.uploads.record_upload(&UploadRecord {
            client: client.clone(),
            user_id,
            size,
            created_at: self.ctx.now(),
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Writes a block of `hours` and audits it.
    pub(crate) fn block_for(
        &self,
        identifier: &ClientId,
        reason: &str,
        hours: u32,
        blocked_by: BlockedBy,
    ) -> Result<BlockedEntry, StoreError> {
        let now = self.ctx.now();
        let entry = BlockedEntry {
            identifier: identifier.clone(),
            reason: reason.to_string(),
            blocked_by,
            created_at: now,
            expires_at: block_expiry(now, hours),
        };
        self.ctx.stores.blocks.block(&entry)?;
        self.ctx.emit(&GovernanceAuditEvent::block_applied(now, &entry));
        Ok(entry)
    }

    /// Upload check chain.
    fn evaluate_upload(
        &self,
        settings: &GovernanceSettings,
        client: &ClientId,
        user_id: Option<UserId>,
        file_size: u64,
    ) -> Verdict {
        if self.is_blocked(client) {
            return Verdict::deny(ReasonCode::IpBlocked, MSG_BLOCKED);
        }
        if user_id.is_none() {
            if !settings.abuse_guest_upload_enabled {
                return Verdict::deny(
                    ReasonCode::GuestDisabled,
                    "Guest uploads are currently disabled. Please login to upload.",
                );
            }
            if file_size > settings.guest_max_upload_bytes() {
                let max_mb = settings.abuse_max_file_size_guest_mb;
                return Verdict::deny(
                    ReasonCode::GuestSizeLimit,
                    format!(
                        "Guests can only upload files up to {max_mb} MB. Please login for larger \
                         uploads."
                    ),
                )
                .with("limit", settings.guest_max_upload_bytes())
                .with("limit_mb", max_mb);
            }
        }

        let now = self.ctx.now();
        let hourly = self.uploads_since(client, now.minus_seconds(SECONDS_PER_HOUR));
        let hourly_limit = u64::from(settings.abuse_uploads_per_hour);
        if hourly < hourly_limit {
            return Verdict::allow();
        }

        self.log_incident(
            client,
            AbuseKind::UploadSpam,
            Severity::Medium,
            user_id,
            format!("Exceeded hourly upload limit: {hourly}/{hourly_limit}"),
        );
        if settings.abuse_auto_block_enabled {
            let daily = self.uploads_since(client, now.minus_seconds(SECONDS_PER_DAY));
            let daily_limit = u64::from(settings.abuse_uploads_per_day);
            if daily >= daily_limit {
                let blocked = self.block_for(
                    client,
                    "Automatic block: Exceeded daily upload limit",
                    settings.abuse_block_duration_hours,
                    BlockedBy::Auto,
                );
                if let Err(err) = blocked {
                    self.ctx.store_failure("auto_block", &err);
                }
                self.log_incident(
                    client,
                    AbuseKind::UploadSpam,
                    Severity::High,
                    user_id,
                    format!("Auto-blocked: Exceeded daily limit {daily}/{daily_limit}"),
                );
            }
        }
        Verdict::deny(
            ReasonCode::RateLimit,
            "Upload limit reached. Please wait before uploading more images.",
        )
        .with("retry_after", UPLOAD_RETRY_AFTER_SECS)
        .with("used", hourly)
        .with("limit", hourly_limit)
    }

    /// Counts uploads from `client` since `since`; failures read as zero.
    fn uploads_since(&self, client: &ClientId, since: Timestamp) -> u64 {
        self.ctx.stores.uploads.count_uploads_since(client, since).unwrap_or_else(|err| {
            self.ctx.store_failure("count_uploads", &err);
            0
        })
    }
}

/// Builds [`AbuseStats`] from trailing-week incidents.
fn summarize_incidents(
    blocked_active: u64,
    week: &[AbuseIncident],
    today_start: Timestamp,
) -> AbuseStats {
    let mut by_severity: BTreeMap<String, u64> = BTreeMap::new();
    let mut offenders: BTreeMap<&ClientId, (u64, Timestamp)> = BTreeMap::new();
    let mut incidents_today = 0;
    for incident in week {
        *by_severity.entry(incident.severity.as_str().to_string()).or_default() += 1;
        let slot = offenders.entry(&incident.identifier).or_insert((0, incident.created_at));
        slot.0 += 1;
        slot.1 = slot.1.max(incident.created_at);
        if incident.created_at >= today_start {
            incidents_today += 1;
        }
    }
    let mut top_offenders: Vec<OffenderSummary> = offenders
        .into_iter()
        .map(|(identifier, (count, last_incident))| OffenderSummary {
            identifier: identifier.clone(),
            count,
            last_incident,
        })
        .collect();
    top_offenders
        .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.identifier.cmp(&b.identifier)));
    top_offenders.truncate(TOP_OFFENDER_LIMIT);
    AbuseStats {
        blocked_active,
        incidents_today,
        incidents_week: week.len() as u64,
        by_severity,
        top_offenders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident(id: &str, severity: Severity, at: i64) -> AbuseIncident {
        AbuseIncident {
            identifier: ClientId::new(id),
            kind: AbuseKind::UploadSpam,
            severity,
            user_id: None,
            details: String::new(),
            created_at: Timestamp::from_unix_seconds(at),
        }
    }

    #[test]
    fn summary_ranks_offenders_and_splits_today() {
        let week = [
            incident("a", Severity::Medium, 10),
            incident("b", Severity::High, 20),
            incident("b", Severity::Critical, 100),
        ];
        let stats = summarize_incidents(2, &week, Timestamp::from_unix_seconds(50));
        assert_eq!(stats.blocked_active, 2);
        assert_eq!(stats.incidents_week, 3);
        assert_eq!(stats.incidents_today, 1);
        assert_eq!(stats.by_severity.get("high"), Some(&1));
        assert_eq!(stats.top_offenders[0].identifier.as_str(), "b");
        assert_eq!(stats.top_offenders[0].last_incident, Timestamp::from_unix_seconds(100));
    }
}
