// crates/media-gate-core/src/core/abuse.rs
// ============================================================================
// Module: Media Gate Abuse Records
// Description: Block list entries, abuse incidents, and upload activity records.
// Purpose: Model the durable evidence and enforcement state used by abuse control.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Block entries are keyed by client identifier with an optional expiry;
//! expiry is always checked at read time so an expired row that has not been
//! swept yet never blocks. Abuse incidents are append-only evidence. Upload
//! records feed the watchdog's trailing-window aggregation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Block List
// ============================================================================

/// Provenance of a block entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedBy {
    /// Manual operator action.
    Admin,
    /// Watchdog or upload guard escalation.
    Auto,
}

impl BlockedBy {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Auto => "auto",
        }
    }

    /// Parses a label; anything other than `admin` reads as [`BlockedBy::Auto`].
    #[must_use]
    pub fn parse(label: &str) -> Self {
        if label == "admin" { Self::Admin } else { Self::Auto }
    }
}

/// Block list entry.
///
/// # Invariants
/// - At most one entry per identifier; re-blocking updates the entry.
/// - `expires_at == None` means permanent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedEntry {
    /// Blocked client identifier.
    pub identifier: ClientId,
    /// Operator-facing reason.
    pub reason: String,
    /// Provenance.
    pub blocked_by: BlockedBy,
    /// Time the entry was first created.
    pub created_at: Timestamp,
    /// Expiry, if any.
    pub expires_at: Option<Timestamp>,
}

impl BlockedEntry {
    /// Returns true when the entry is in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// Computes the expiry for a block of `duration_hours` starting at `now`.
/// Zero hours means permanent.
#[must_use]
pub fn block_expiry(now: Timestamp, duration_hours: u32) -> Option<Timestamp> {
    (duration_hours > 0)
        .then(|| now.plus_seconds(i64::from(duration_hours) * crate::core::time::SECONDS_PER_HOUR))
}

// ============================================================================
// SECTION: Abuse Incidents
// ============================================================================

/// Abuse category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseKind {
    /// Upload flooding.
    UploadSpam,
    /// API misuse.
    ApiAbuse,
    /// Credential guessing.
    BruteForce,
    /// Disallowed content.
    SuspiciousContent,
    /// Excessive transfer volume.
    BandwidthAbuse,
}

impl AbuseKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UploadSpam => "upload_spam",
            Self::ApiAbuse => "api_abuse",
            Self::BruteForce => "brute_force",
            Self::SuspiciousContent => "suspicious_content",
            Self::BandwidthAbuse => "bandwidth_abuse",
        }
    }

    /// Parses a stable label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "upload_spam" => Some(Self::UploadSpam),
            "api_abuse" => Some(Self::ApiAbuse),
            "brute_force" => Some(Self::BruteForce),
            "suspicious_content" => Some(Self::SuspiciousContent),
            "bandwidth_abuse" => Some(Self::BandwidthAbuse),
            _ => None,
        }
    }
}

/// Incident severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Warning.
    Medium,
    /// Serious.
    High,
    /// Enforcement action taken.
    Critical,
}

impl Severity {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parses a stable label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Appended abuse incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseIncident {
    /// Offending client identifier.
    pub identifier: ClientId,
    /// Category.
    pub kind: AbuseKind,
    /// Severity.
    pub severity: Severity,
    /// Attributed account, if any.
    pub user_id: Option<UserId>,
    /// Human-readable evidence.
    pub details: String,
    /// Record time.
    pub created_at: Timestamp,
}

/// Incident listing filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IncidentFilter {
    /// Restrict to one category.
    pub kind: Option<AbuseKind>,
    /// Restrict to one identifier.
    pub identifier: Option<ClientId>,
    /// Maximum rows, newest first.
    pub limit: usize,
}

impl IncidentFilter {
    /// Returns true when `incident` passes the kind and identifier filters.
    #[must_use]
    pub fn matches(&self, incident: &AbuseIncident) -> bool {
        self.kind.is_none_or(|kind| kind == incident.kind)
            && self.identifier.as_ref().is_none_or(|id| *id == incident.identifier)
    }
}

/// Offender summary row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffenderSummary {
    /// Client identifier.
    pub identifier: ClientId,
    /// Incidents in the trailing week.
    pub count: u64,
    /// Most recent incident time.
    pub last_incident: Timestamp,
}

/// Aggregate abuse statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AbuseStats {
    /// Block entries in force.
    pub blocked_active: u64,
    /// Incidents since UTC midnight.
    pub incidents_today: u64,
    /// Incidents in the trailing seven days.
    pub incidents_week: u64,
    /// Trailing-week incidents per severity label.
    pub by_severity: BTreeMap<String, u64>,
    /// Up to ten identifiers with the most trailing-week incidents.
    pub top_offenders: Vec<OffenderSummary>,
}

/// Number of offenders reported by [`AbuseStats`].
pub const TOP_OFFENDER_LIMIT: usize = 10;

// ============================================================================
// SECTION: Upload Activity
// ============================================================================

/// One recorded upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Uploading client.
    pub client: ClientId,
    /// Authenticated account, if any.
    pub user_id: Option<UserId>,
    /// Upload size in bytes.
    pub size: u64,
    /// Upload time.
    pub created_at: Timestamp,
}

/// Per-identifier aggregate over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadActivity {
    /// Upload count.
    pub count: u64,
    /// Cumulative bytes.
    pub bytes: u64,
    /// False once any upload in the group is attributed to an account.
    pub is_guest: bool,
    /// Distinct accounts seen for this identifier.
    pub user_ids: BTreeSet<UserId>,
}

impl Default for UploadActivity {
    fn default() -> Self {
        Self {
            count: 0,
            bytes: 0,
            is_guest: true,
            user_ids: BTreeSet::new(),
        }
    }
}

impl UploadActivity {
    /// Folds one upload into the aggregate.
    pub fn absorb(&mut self, record: &UploadRecord) {
        self.count = self.count.saturating_add(1);
        self.bytes = self.bytes.saturating_add(record.size);
        if let Some(user_id) = record.user_id {
            self.is_guest = false;
            self.user_ids.insert(user_id);
        }
    }
}

/// Groups upload records by client identifier.
#[must_use]
pub fn aggregate_uploads<'a>(
    records: impl IntoIterator<Item = &'a UploadRecord>,
) -> BTreeMap<ClientId, UploadActivity> {
    let mut groups: BTreeMap<ClientId, UploadActivity> = BTreeMap::new();
    for record in records {
        groups.entry(record.client.clone()).or_default().absorb(record);
    }
    groups
}
