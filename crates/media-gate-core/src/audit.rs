// crates/media-gate-core/src/audit.rs
// ============================================================================
// Module: Governance Audit Logging
// Description: Structured audit events for admission and abuse control.
// Purpose: Emit JSON-line operator logs without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every deny verdict, degraded settings read, kill-switch trip, automatic
//! block, best-effort write failure, and scheduled job completion is emitted
//! as one JSON line through a [`GovernanceAuditSink`]. Sinks swallow their own
//! failures: audit logging never changes an admission outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

use crate::core::BlockedEntry;
use crate::core::ClientId;
use crate::core::ReasonCode;
use crate::core::Timestamp;
use crate::core::UserId;
use crate::core::Verdict;

// ============================================================================
// SECTION: Event Payload
// ============================================================================

/// Governance audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Operation that produced the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<&'static str>,
    /// Client identifier when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Account when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Verdict code for admission events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ReasonCode>,
    /// Human-readable message or error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Event-specific fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, Value>,
}

impl GovernanceAuditEvent {
    /// Creates a bare event.
    #[must_use]
    pub const fn new(event: &'static str, at: Timestamp) -> Self {
        Self {
            event,
            timestamp_ms: at.as_unix_millis(),
            operation: None,
            identifier: None,
            user_id: None,
            code: None,
            message: None,
            detail: BTreeMap::new(),
        }
    }

    /// Admission check returned a deny verdict.
    #[must_use]
    pub fn admission_denied(
        at: Timestamp,
        operation: &'static str,
        verdict: &Verdict,
        user_id: Option<UserId>,
        identifier: Option<&ClientId>,
    ) -> Self {
        Self {
            operation: Some(operation),
            identifier: identifier.map(ToString::to_string),
            user_id,
            code: Some(verdict.code),
            message: Some(verdict.message.clone()),
            detail: verdict.extra.clone(),
            ..Self::new("admission_denied", at)
        }
    }

    /// Settings store was unreadable; the conservative fallback was used.
    #[must_use]
    pub fn settings_fallback(at: Timestamp, error: &str) -> Self {
        Self {
            message: Some(error.to_string()),
            ..Self::new("settings_fallback", at)
        }
    }

    /// Projected storage crossed the emergency ceiling and latched the kill switch.
    #[must_use]
    pub fn kill_switch_tripped(at: Timestamp, projected: u64, threshold: u64) -> Self {
        Self::new("kill_switch_tripped", at)
            .with("projected_bytes", projected)
            .with("threshold_bytes", threshold)
    }

    /// Best-effort incident append failed.
    #[must_use]
    pub fn abuse_log_failed(at: Timestamp, identifier: &ClientId, error: &str) -> Self {
        Self {
            identifier: Some(identifier.to_string()),
            message: Some(error.to_string()),
            ..Self::new("abuse_log_failed", at)
        }
    }

    /// A block entry was written.
    #[must_use]
    pub fn block_applied(at: Timestamp, entry: &BlockedEntry) -> Self {
        let expires = entry.expires_at.map_or(Value::Null, |ts| Value::from(ts.as_unix_millis()));
        Self {
            identifier: Some(entry.identifier.to_string()),
            message: Some(entry.reason.clone()),
            ..Self::new("block_applied", at)
        }
        .with("blocked_by", entry.blocked_by.as_str())
        .with("expires_at_ms", expires)
    }

    /// A store operation failed and was recovered locally.
    #[must_use]
    pub fn store_failure(at: Timestamp, operation: &'static str, error: &str) -> Self {
        Self {
            operation: Some(operation),
            message: Some(error.to_string()),
            ..Self::new("store_failure", at)
        }
    }

    /// A host probe failed and was treated as zero.
    #[must_use]
    pub fn probe_failure(at: Timestamp, metric: &'static str, error: &str) -> Self {
        Self {
            operation: Some(metric),
            message: Some(error.to_string()),
            ..Self::new("probe_failure", at)
        }
    }

    /// Adds an event-specific field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for governance events.
pub trait GovernanceAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &GovernanceAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl GovernanceAuditSink for StderrAuditSink {
    fn record(&self, event: &GovernanceAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl GovernanceAuditSink for FileAuditSink {
    fn record(&self, event: &GovernanceAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl GovernanceAuditSink for NoopAuditSink {
    fn record(&self, _event: &GovernanceAuditEvent) {}
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::io::Read;

    use super::*;

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path).unwrap();
        let at = Timestamp::from_unix_seconds(10);
        sink.record(&GovernanceAuditEvent::settings_fallback(at, "db locked"));
        sink.record(&GovernanceAuditEvent::kill_switch_tripped(at, 11, 10));

        let mut contents = String::new();
        std::fs::File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        let lines: Vec<Value> =
            contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "settings_fallback");
        assert_eq!(lines[0]["timestamp_ms"], 10_000);
        assert_eq!(lines[1]["detail"]["threshold_bytes"], 10);
        assert!(lines[1].get("code").is_none());
    }
}
