// crates/media-gate-core/src/core/temp_files.rs
// ============================================================================
// Module: Media Gate Temp-File Handles
// Description: Registered ephemeral artifacts and reaper reports.
// Purpose: Track derived files whose bytes count against global storage.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`TempFileHandle`] exists for every derived artifact a tool persists for
//! later retrieval. Its bytes are part of the global storage counter until
//! the reaper deletes the file and the handle together.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FileId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Handles
// ============================================================================

/// Registered temp file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempFileHandle {
    /// Retrieval token.
    pub file_id: FileId,
    /// Owning account, if any.
    pub owner: Option<UserId>,
    /// Absolute path of the backing file.
    pub path: PathBuf,
    /// Bytes on disk.
    pub size: u64,
    /// Producing tool label.
    pub tool: String,
    /// Original file name shown to the user.
    pub file_name: String,
    /// MIME type.
    pub mime: String,
    /// Registration time.
    pub created_at: Timestamp,
    /// Expiry.
    pub expires_at: Timestamp,
}

impl TempFileHandle {
    /// Returns true when the handle has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// Whole seconds until expiry (zero once expired).
    #[must_use]
    pub fn seconds_remaining(&self, now: Timestamp) -> u64 {
        u64::try_from(self.expires_at.as_unix_seconds() - now.as_unix_seconds()).unwrap_or(0)
    }
}

/// Live handle with its remaining lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTempFile {
    /// The handle.
    pub handle: TempFileHandle,
    /// Seconds until the reaper may delete it.
    pub seconds_remaining: u64,
}

/// Result of one reaper pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Handles removed.
    pub deleted_count: u64,
    /// Bytes released from the global counter.
    pub freed_bytes: u64,
    /// Orphaned directories removed by the filesystem sweep.
    pub orphan_dirs_removed: u64,
    /// Non-fatal errors encountered.
    pub errors: Vec<String>,
}
