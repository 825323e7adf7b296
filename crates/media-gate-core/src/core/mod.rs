// crates/media-gate-core/src/core/mod.rs
// ============================================================================
// Module: Media Gate Core Types
// Description: Canonical governance records, settings, and verdicts.
// Purpose: Provide stable, serializable types shared by every store and runtime.
// Dependencies: rand, serde, sha2, time
// ============================================================================

//! ## Overview
//! Core types describe settings snapshots, quota and abuse records, rate
//! windows, temp-file handles, and admission verdicts. They are the single
//! source of truth for the `SQLite` store, the CLI, and any request handler
//! embedding the runtime.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod abuse;
pub mod identifiers;
pub mod quota;
pub mod rate;
pub mod settings;
pub mod temp_files;
pub mod time;
pub mod units;
pub mod verdict;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use abuse::AbuseIncident;
pub use abuse::AbuseKind;
pub use abuse::AbuseStats;
pub use abuse::BlockedBy;
pub use abuse::BlockedEntry;
pub use abuse::IncidentFilter;
pub use abuse::OffenderSummary;
pub use abuse::Severity;
pub use abuse::TOP_OFFENDER_LIMIT;
pub use abuse::UploadActivity;
pub use abuse::UploadRecord;
pub use abuse::aggregate_uploads;
pub use abuse::block_expiry;
pub use identifiers::ClientId;
pub use identifiers::FileId;
pub use identifiers::RateKey;
pub use identifiers::UserId;
pub use quota::AccountQuota;
pub use quota::AccountTier;
pub use quota::HeavyTool;
pub use quota::ToolKind;
pub use quota::ToolUsage;
pub use quota::UsageRecord;
pub use quota::UsageStatus;
pub use quota::UserStats;
pub use rate::RateEntry;
pub use rate::RateHit;
pub use rate::RateStatus;
pub use rate::RateWindow;
pub use settings::GovernanceSettings;
pub use settings::SettingDecodeError;
pub use settings::SettingRecord;
pub use settings::SettingType;
pub use settings::SettingValue;
pub use settings::seed_records;
pub use temp_files::ActiveTempFile;
pub use temp_files::CleanupReport;
pub use temp_files::TempFileHandle;
pub use time::CalendarDate;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::Timestamp;
pub use units::format_bytes;
pub use verdict::ReasonCode;
pub use verdict::Verdict;
