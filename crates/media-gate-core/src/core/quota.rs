// crates/media-gate-core/src/core/quota.rs
// ============================================================================
// Module: Media Gate Quota Model
// Description: Account tiers, tool kinds, per-account quotas, and usage records.
// Purpose: Describe the per-user ledger consulted by admission checks.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`AccountQuota`] is the slice of the account entity that admission
//! control reads: storage usage, the account-level storage ceiling, and the
//! daily heavy-tool counters with their UTC reset marker. Daily counters are
//! only meaningful when the marker equals today; [`AccountQuota::reconciled`]
//! shows the view a reader must act on when it does not.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::UserId;
use crate::core::time::CalendarDate;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Tiers and Tools
// ============================================================================

/// Account plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountTier {
    /// Free plan.
    Free,
    /// Paid plan.
    Premium,
}

impl AccountTier {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }

    /// Parses a label; unknown labels fall back to [`AccountTier::Free`].
    #[must_use]
    pub fn parse_or_free(label: &str) -> Self {
        if label.eq_ignore_ascii_case("premium") { Self::Premium } else { Self::Free }
    }
}

/// CPU-bound tool gated by concurrency and daily quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeavyTool {
    /// Optical character recognition.
    Ocr,
    /// Background removal.
    #[serde(rename = "removebg", alias = "rembg")]
    RemoveBg,
}

impl HeavyTool {
    /// All heavy tools.
    pub const ALL: [Self; 2] = [Self::Ocr, Self::RemoveBg];

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::RemoveBg => "removebg",
        }
    }

    /// Parses a label, accepting the `rembg` alias.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "ocr" => Some(Self::Ocr),
            "removebg" | "rembg" => Some(Self::RemoveBg),
            _ => None,
        }
    }
}

impl fmt::Display for HeavyTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any tool that produces usage records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Optical character recognition.
    Ocr,
    /// Background removal.
    #[serde(rename = "removebg", alias = "rembg")]
    RemoveBg,
    /// Lossy/lossless compression.
    Compress,
    /// Resize.
    Resize,
    /// Crop.
    Crop,
    /// Format conversion.
    Convert,
}

impl ToolKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::RemoveBg => "removebg",
            Self::Compress => "compress",
            Self::Resize => "resize",
            Self::Crop => "crop",
            Self::Convert => "convert",
        }
    }

    /// Parses a label, accepting the `rembg` alias.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        if let Some(heavy) = HeavyTool::parse(label) {
            return Some(heavy.into());
        }
        match label.trim().to_ascii_lowercase().as_str() {
            "compress" => Some(Self::Compress),
            "resize" => Some(Self::Resize),
            "crop" => Some(Self::Crop),
            "convert" => Some(Self::Convert),
            _ => None,
        }
    }

    /// Returns the heavy tool this kind maps to, if any.
    #[must_use]
    pub const fn heavy(self) -> Option<HeavyTool> {
        match self {
            Self::Ocr => Some(HeavyTool::Ocr),
            Self::RemoveBg => Some(HeavyTool::RemoveBg),
            Self::Compress | Self::Resize | Self::Crop | Self::Convert => None,
        }
    }
}

impl From<HeavyTool> for ToolKind {
    fn from(tool: HeavyTool) -> Self {
        match tool {
            HeavyTool::Ocr => Self::Ocr,
            HeavyTool::RemoveBg => Self::RemoveBg,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Account Quota
// ============================================================================

/// Per-account quota state.
///
/// # Invariants
/// - `storage_used` never goes below zero; deltas are floor-clamped.
/// - Daily counters are valid only while `daily_reset_marker` is today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountQuota {
    /// Account identifier.
    pub user_id: UserId,
    /// Plan tier.
    pub tier: AccountTier,
    /// Bytes currently stored by the account.
    pub storage_used: u64,
    /// Account-level storage ceiling.
    pub storage_limit: u64,
    /// OCR invocations on `daily_reset_marker`.
    pub daily_ocr_count: u32,
    /// Background-removal invocations on `daily_reset_marker`.
    pub daily_removebg_count: u32,
    /// UTC date the daily counters belong to.
    pub daily_reset_marker: Option<CalendarDate>,
}

impl AccountQuota {
    /// Creates a fresh account with zeroed usage.
    #[must_use]
    pub const fn new(user_id: UserId, tier: AccountTier, storage_limit: u64) -> Self {
        Self {
            user_id,
            tier,
            storage_used: 0,
            storage_limit,
            daily_ocr_count: 0,
            daily_removebg_count: 0,
            daily_reset_marker: None,
        }
    }

    /// Returns the stored daily counter for `tool`.
    #[must_use]
    pub const fn daily_count(&self, tool: HeavyTool) -> u32 {
        match tool {
            HeavyTool::Ocr => self.daily_ocr_count,
            HeavyTool::RemoveBg => self.daily_removebg_count,
        }
    }

    /// Returns true when the counters belong to a date other than `today`.
    #[must_use]
    pub fn is_stale(&self, today: CalendarDate) -> bool {
        self.daily_reset_marker != Some(today)
    }

    /// Returns the quota as it reads after a daily reset check for `today`.
    #[must_use]
    pub fn reconciled(&self, today: CalendarDate) -> Self {
        if !self.is_stale(today) {
            return self.clone();
        }
        Self {
            daily_ocr_count: 0,
            daily_removebg_count: 0,
            daily_reset_marker: Some(today),
            ..self.clone()
        }
    }
}

// ============================================================================
// SECTION: Usage Records
// ============================================================================

/// Outcome of a completed tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    /// The tool produced a result.
    Success,
    /// The tool ran but failed.
    Failed,
}

impl UsageStatus {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parses a label; unknown labels read as [`UsageStatus::Failed`].
    #[must_use]
    pub fn parse(label: &str) -> Self {
        if label == "success" { Self::Success } else { Self::Failed }
    }
}

/// One appended tool usage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Account that ran the tool, if authenticated.
    pub user_id: Option<UserId>,
    /// Tool that ran.
    pub tool: ToolKind,
    /// Input size in bytes.
    pub file_size: u64,
    /// Wall time spent in the tool.
    pub processing_time_ms: u64,
    /// Outcome.
    pub status: UsageStatus,
    /// Client address, if known.
    pub client: Option<ClientId>,
    /// Record time.
    pub created_at: Timestamp,
}

/// Per-tool usage summary for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsage {
    /// Tool.
    pub tool: HeavyTool,
    /// Invocations today.
    pub used: u32,
    /// Daily limit for the account tier.
    pub limit: u32,
    /// Invocations left today.
    pub remaining: u32,
}

/// Account usage summary for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    /// Account identifier.
    pub user_id: UserId,
    /// Plan tier.
    pub tier: AccountTier,
    /// Bytes stored.
    pub storage_used: u64,
    /// Effective storage ceiling.
    pub storage_limit: u64,
    /// Percentage of the ceiling in use, rounded to one decimal.
    pub storage_percent: f64,
    /// Heavy-tool usage for today.
    pub tools: Vec<ToolUsage>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn reconcile_zeroes_stale_counters_only() {
        let today = CalendarDate::parse_iso("2026-03-02").unwrap();
        let yesterday = CalendarDate::parse_iso("2026-03-01").unwrap();
        let mut quota = AccountQuota::new(UserId::new(7), AccountTier::Free, 100);
        quota.daily_ocr_count = 4;
        quota.daily_reset_marker = Some(yesterday);

        let fresh = quota.reconciled(today);
        assert_eq!(fresh.daily_ocr_count, 0);
        assert_eq!(fresh.daily_reset_marker, Some(today));

        let again = fresh.reconciled(today);
        assert_eq!(again, fresh);
    }

    #[test]
    fn tool_labels_accept_legacy_alias() {
        assert_eq!(HeavyTool::parse("rembg"), Some(HeavyTool::RemoveBg));
        assert_eq!(ToolKind::parse("RemoveBG"), Some(ToolKind::RemoveBg));
        assert_eq!(ToolKind::parse("crop").and_then(ToolKind::heavy), None);
        assert_eq!(ToolKind::parse("blur"), None);
    }
}
