// crates/media-gate-core/src/runtime/reaper.rs
// ============================================================================
// Module: Temp-File Reaper
// Description: Registration and expiry-driven deletion of derived artifacts.
// Purpose: Keep temp files and the global storage counter in step.
// Dependencies: crate::{audit, core, interfaces, runtime::context}, thiserror
// ============================================================================

//! ## Overview
//! Registration persists a [`TempFileHandle`] with an absolute expiry and
//! adds its bytes to the global storage counter. Cleanup deletes the backing
//! file of every expired handle ("already gone" counts as success), removes
//! the handle, and releases the bytes once per handle. Handle removal is
//! gated on the store reporting the handle existed, so two concurrent
//! reapers never release the same bytes twice.
//!
//! A second sweep walks the temp root and removes directories older than the
//! configured lifetime that no live handle points into. It catches artifacts
//! written by a process that crashed before registering them. Those bytes
//! were never counted, so the sweep does not touch the counter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use thiserror::Error;

use crate::audit::GovernanceAuditEvent;
use crate::core::ActiveTempFile;
use crate::core::CleanupReport;
use crate::core::FileId;
use crate::core::TempFileHandle;
use crate::core::Timestamp;
use crate::core::UserId;
use crate::core::identifiers::random_hex;
use crate::core::settings::keys;
use crate::core::time::SECONDS_PER_HOUR;
use crate::interfaces::StoreError;
use crate::runtime::context::GovernanceContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Random bytes in a result directory name.
const RESULT_DIR_BYTES: usize = 8;
/// Stem used when the supplied file name has no usable stem.
const DEFAULT_STEM: &str = "result";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while persisting a derived artifact.
#[derive(Debug, Error)]
pub enum TempFileError {
    /// Filesystem error.
    #[error("temp file io error: {0}")]
    Io(String),
    /// Handle registration failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<io::Error> for TempFileError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// ============================================================================
// SECTION: Registration Request
// ============================================================================

/// Metadata for a file being registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempFileSpec {
    /// Owning account, if any.
    pub owner: Option<UserId>,
    /// Producing tool label.
    pub tool: String,
    /// Name shown to the user.
    pub file_name: String,
    /// MIME type.
    pub mime: String,
    /// Lifetime override in seconds; defaults to the configured lifetime.
    pub expires_in: Option<u64>,
}

impl TempFileSpec {
    /// Creates a spec with the configured lifetime.
    #[must_use]
    pub fn new(
        owner: Option<UserId>,
        tool: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            tool: tool.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            expires_in: None,
        }
    }

    /// Overrides the lifetime.
    #[must_use]
    pub const fn expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }
}

// ============================================================================
// SECTION: Reaper
// ============================================================================

/// Temp-file registry and reaper rooted at one directory.
#[derive(Clone)]
pub struct TempFileReaper {
    /// Shared collaborators.
    ctx: GovernanceContext,
    /// Directory holding one random subdirectory per saved result.
    root: PathBuf,
}

impl TempFileReaper {
    /// Creates a reaper for `root`.
    #[must_use]
    pub fn new(ctx: GovernanceContext, root: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            root: root.into(),
        }
    }

    /// Temp root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers an existing file and counts its bytes toward global storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the handle cannot be persisted.
    pub fn register(
        &self,
        path: &Path,
        size: u64,
        spec: TempFileSpec,
    ) -> Result<TempFileHandle, StoreError> {
        let now = self.ctx.now();
        let lifetime = match spec.expires_in {
            Some(seconds) => i64::try_from(seconds).unwrap_or(i64::MAX),
            None => {
                let hours = self.ctx.settings_snapshot().temp_file_lifetime_hours;
                i64::from(hours) * SECONDS_PER_HOUR
            }
        };
        let handle = TempFileHandle {
            file_id: FileId::generate(),
            owner: spec.owner,
            path: path.to_path_buf(),
            size,
            tool: spec.tool,
            file_name: spec.file_name,
            mime: spec.mime,
            created_at: now,
            expires_at: now.plus_seconds(lifetime),
        };
        self.ctx.stores.temp_files.insert_temp_file(&handle)?;
        let delta = i64::try_from(size).unwrap_or(i64::MAX);
        let counter = self.ctx.stores.settings.add_to_counter(keys::GLOBAL_STORAGE_USED, delta);
        if let Err(err) = counter {
            self.ctx.store_failure("temp_file_register_counter", &err);
        }
        Ok(handle)
    }

    /// Writes `bytes` into a fresh result directory and registers it.
    ///
    /// The extension follows the MIME type. The file is removed again when
    /// registration fails.
    ///
    /// # Errors
    ///
    /// Returns [`TempFileError`] when the write or the registration fails.
    pub fn save_result(
        &self,
        bytes: &[u8],
        spec: TempFileSpec,
    ) -> Result<TempFileHandle, TempFileError> {
        let dir = self.root.join(random_hex(RESULT_DIR_BYTES));
        fs::create_dir_all(&dir)?;
        let name = format!("{}.{}", file_stem(&spec.file_name), extension_for_mime(&spec.mime));
        let path = dir.join(name);
        fs::write(&path, bytes)?;
        let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        match self.register(&path, size, spec) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                let _ = fs::remove_file(&path);
                let _ = fs::remove_dir(&dir);
                Err(err.into())
            }
        }
    }

    /// Resolves a live handle by its retrieval token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the registry cannot be read.
    pub fn resolve(&self, file_id: &FileId) -> Result<Option<TempFileHandle>, StoreError> {
        let now = self.ctx.now();
        Ok(self.ctx.stores.temp_files.temp_file(file_id)?.filter(|handle| !handle.is_expired(now)))
    }

    /// Lists a user's live handles with their remaining lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the registry cannot be read.
    pub fn active_for_user(&self, user_id: UserId) -> Result<Vec<ActiveTempFile>, StoreError> {
        let now = self.ctx.now();
        let mut handles = self.ctx.stores.temp_files.live_temp_files(Some(user_id), now)?;
        handles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(handles
            .into_iter()
            .map(|handle| ActiveTempFile {
                seconds_remaining: handle.seconds_remaining(now),
                handle,
            })
            .collect())
    }

    /// Deletes expired artifacts and sweeps orphaned directories.
    #[must_use]
    pub fn cleanup_expired(&self) -> CleanupReport {
        let now = self.ctx.now();
        let mut report = CleanupReport::default();

        match self.ctx.stores.temp_files.expired_temp_files(now) {
            Ok(expired) => {
                for handle in expired {
                    self.reap(&handle, &mut report);
                }
            }
            Err(err) => report.errors.push(format!("list expired temp files: {err}")),
        }

        if report.freed_bytes > 0 {
            let delta = -i64::try_from(report.freed_bytes).unwrap_or(i64::MAX);
            if let Err(err) =
                self.ctx.stores.settings.add_to_counter(keys::GLOBAL_STORAGE_USED, delta)
            {
                self.ctx.store_failure("temp_file_release_counter", &err);
                report.errors.push(format!("release storage counter: {err}"));
            }
        }

        self.sweep_orphans(now, &mut report);

        self.ctx.emit(
            &GovernanceAuditEvent::new("temp_cleanup_completed", now)
                .with("deleted_count", report.deleted_count)
                .with("freed_bytes", report.freed_bytes)
                .with("orphan_dirs_removed", report.orphan_dirs_removed)
                .with("errors", report.errors.len()),
        );
        report
    }

    /// Deletes one expired artifact and its handle.
    fn reap(&self, handle: &TempFileHandle, report: &mut CleanupReport) {
        match fs::remove_file(&handle.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                report.errors.push(format!("remove {}: {err}", handle.path.display()));
                return;
            }
        }
        if let Some(parent) = handle.path.parent()
            && parent.starts_with(&self.root)
            && parent != self.root
        {
            let _ = fs::remove_dir(parent);
        }
        match self.ctx.stores.temp_files.remove_temp_file(&handle.file_id) {
            Ok(true) => {
                report.deleted_count += 1;
                report.freed_bytes = report.freed_bytes.saturating_add(handle.size);
            }
            Ok(false) => {}
            Err(err) => report.errors.push(format!("remove handle {}: {err}", handle.file_id)),
        }
    }

    /// Removes stale directories under the root that no live handle uses.
    fn sweep_orphans(&self, now: Timestamp, report: &mut CleanupReport) {
        let live: BTreeSet<PathBuf> = match self.ctx.stores.temp_files.live_temp_files(None, now) {
            Ok(handles) => {
                handles.iter().filter_map(|h| h.path.parent().map(Path::to_path_buf)).collect()
            }
            Err(err) => {
                report.errors.push(format!("list live temp files: {err}"));
                return;
            }
        };
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                report.errors.push(format!("read {}: {err}", self.root.display()));
                return;
            }
        };
        let hours = self.ctx.settings_snapshot().temp_file_lifetime_hours;
        let cutoff = now.minus_seconds(i64::from(hours) * SECONDS_PER_HOUR);
        for entry in entries.flatten() {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_dir() || live.contains(&path) {
                continue;
            }
            let Some(modified) = entry.metadata().ok().and_then(|meta| meta.modified().ok()) else {
                continue;
            };
            if system_time_to_timestamp(modified) >= cutoff {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => report.orphan_dirs_removed += 1,
                Err(err) => report.errors.push(format!("remove {}: {err}", path.display())),
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// File extension for a result MIME type.
#[must_use]
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Final path component stem of `file_name`, restricted to safe characters.
fn file_stem(file_name: &str) -> String {
    let stem: String = Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let stem = stem.trim_matches('.');
    if stem.is_empty() { DEFAULT_STEM.to_string() } else { stem.to_string() }
}

/// Converts a filesystem time to a [`Timestamp`].
fn system_time_to_timestamp(time: SystemTime) -> Timestamp {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
    Timestamp::from_unix_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_follows_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("application/pdf"), "bin");
    }

    #[test]
    fn stem_drops_directories_and_unsafe_characters() {
        assert_eq!(file_stem("photo.final.png"), "photo.final");
        assert_eq!(file_stem("../../etc/passwd"), "passwd");
        assert_eq!(file_stem("my scan (1).jpg"), "myscan1");
        assert_eq!(file_stem(""), DEFAULT_STEM);
        assert_eq!(file_stem("...."), DEFAULT_STEM);
    }
}
