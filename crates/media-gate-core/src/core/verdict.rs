// crates/media-gate-core/src/core/verdict.rs
// ============================================================================
// Module: Media Gate Verdicts
// Description: Admission verdicts and stable machine-readable reason codes.
// Purpose: Give every admission check one uniform, serializable result shape.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every admission check returns a [`Verdict`]. Deny verdicts carry exactly
//! one [`ReasonCode`], a human-readable message, and optional numeric context
//! in `extra` (`used`, `limit`, `cpu_load`, `threshold`, `retry_after`, ...).
//! Reason codes are a closed set so callers can branch on them safely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Reason Codes
// ============================================================================

/// Stable admission outcome codes.
///
/// # Invariants
/// - Variants and their wire labels are stable for programmatic handling.
/// - [`ReasonCode::Ok`] is the only code carried by allow verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Admission granted.
    Ok,
    /// Global maintenance flag (or a disabled tool).
    MaintenanceMode,
    /// Global kill switch latched.
    KillSwitchActive,
    /// Projected global storage exceeds the emergency ceiling.
    StorageFull,
    /// Projected per-user storage exceeds the account quota.
    UserQuotaExceeded,
    /// Host load average above the configured threshold.
    ServerBusy,
    /// Worker process concurrency ceiling reached.
    TooManyProcesses,
    /// Per-tool daily quota exhausted.
    DailyLimitExceeded,
    /// Client identifier is on the block list.
    IpBlocked,
    /// Guest uploads are disabled.
    GuestDisabled,
    /// Guest upload exceeds the guest size limit.
    GuestSizeLimit,
    /// Request rate exceeded.
    RateLimit,
}

impl ReasonCode {
    /// Every code carried by deny verdicts.
    pub const DENY_CODES: [Self; 11] = [
        Self::MaintenanceMode,
        Self::KillSwitchActive,
        Self::StorageFull,
        Self::UserQuotaExceeded,
        Self::ServerBusy,
        Self::TooManyProcesses,
        Self::DailyLimitExceeded,
        Self::IpBlocked,
        Self::GuestDisabled,
        Self::GuestSizeLimit,
        Self::RateLimit,
    ];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::MaintenanceMode => "maintenance_mode",
            Self::KillSwitchActive => "kill_switch_active",
            Self::StorageFull => "storage_full",
            Self::UserQuotaExceeded => "user_quota_exceeded",
            Self::ServerBusy => "server_busy",
            Self::TooManyProcesses => "too_many_processes",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
            Self::IpBlocked => "ip_blocked",
            Self::GuestDisabled => "guest_disabled",
            Self::GuestSizeLimit => "guest_size_limit",
            Self::RateLimit => "rate_limit",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        std::iter::once(Self::Ok).chain(Self::DENY_CODES).find(|code| code.as_str() == label)
    }

    /// Suggested HTTP status for a response carrying this code.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::RateLimit | Self::DailyLimitExceeded => 429,
            Self::MaintenanceMode
            | Self::KillSwitchActive
            | Self::ServerBusy
            | Self::TooManyProcesses => 503,
            Self::StorageFull | Self::UserQuotaExceeded => 507,
            Self::IpBlocked | Self::GuestDisabled => 403,
            Self::GuestSizeLimit => 413,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Admission decision returned by every check.
///
/// # Invariants
/// - `allowed == (code == ReasonCode::Ok)`.
/// - Constructed only through [`Verdict::allow`] and [`Verdict::deny`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Machine-readable outcome code.
    pub code: ReasonCode,
    /// Human-readable, actionable message (empty on allow).
    pub message: String,
    /// Numeric or descriptive context for the caller.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl Verdict {
    /// Builds an allow verdict.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            code: ReasonCode::Ok,
            message: String::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Builds a deny verdict. Passing [`ReasonCode::Ok`] is coerced to
    /// [`ReasonCode::MaintenanceMode`] so a deny never carries the allow code.
    #[must_use]
    pub fn deny(code: ReasonCode, message: impl Into<String>) -> Self {
        let code = if code == ReasonCode::Ok { ReasonCode::MaintenanceMode } else { code };
        Self {
            allowed: false,
            code,
            message: message.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Returns true when the verdict is a denial.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Returns the `retry_after` hint in seconds when present.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        self.extra.get("retry_after").and_then(Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_round_trips_through_its_label() {
        for code in std::iter::once(ReasonCode::Ok).chain(ReasonCode::DENY_CODES) {
            assert_eq!(ReasonCode::parse(code.as_str()), Some(code));
            let json = serde_json::to_string(&code).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
        assert_eq!(ReasonCode::parse("mystery"), None);
    }

    #[test]
    fn deny_never_carries_ok() {
        let verdict = Verdict::deny(ReasonCode::Ok, "x");
        assert!(!verdict.allowed);
        assert_ne!(verdict.code, ReasonCode::Ok);
    }

    #[test]
    fn retry_after_reads_extra() {
        let verdict = Verdict::deny(ReasonCode::RateLimit, "slow down").with("retry_after", 42_u64);
        assert_eq!(verdict.retry_after(), Some(42));
        assert_eq!(verdict.code.http_status(), 429);
    }
}
