// crates/media-gate-core/src/lib.rs
// ============================================================================
// Module: Media Gate Core Library
// Description: Public API surface for the media-gate governance core.
// Purpose: Expose domain types, store interfaces, and runtime components.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Media gate is the admission-control and abuse-prevention layer in front of
//! a media-processing service. It decides whether each upload or heavy-tool
//! run may proceed, throttles floods, detects abusive upload patterns, and
//! reclaims expired derived artifacts. It is backend-agnostic: all shared
//! state is reached through the traits in [`interfaces`].
//!
//! Security posture: client addresses and request sizes are untrusted; every
//! denial returns exactly one stable [`ReasonCode`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use audit::FileAuditSink;
pub use audit::GovernanceAuditEvent;
pub use audit::GovernanceAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use interfaces::AbuseLog;
pub use interfaces::BlockList;
pub use interfaces::DiskInfo;
pub use interfaces::GovernanceStore;
pub use interfaces::GovernanceStores;
pub use interfaces::LoadAverage;
pub use interfaces::MemoryInfo;
pub use interfaces::ProbeError;
pub use interfaces::QuotaLedger;
pub use interfaces::RateWindowStore;
pub use interfaces::SettingsStore;
pub use interfaces::StoreError;
pub use interfaces::SystemProbe;
pub use interfaces::TempFileStore;
pub use interfaces::UploadLedger;
pub use runtime::AbuseGuard;
pub use runtime::AbuseWatchdog;
pub use runtime::Admission;
pub use runtime::GovernanceContext;
pub use runtime::Gatekeeper;
pub use runtime::HostSystemProbe;
pub use runtime::InMemoryGovernanceStore;
pub use runtime::MaintenanceReport;
pub use runtime::MaintenanceRunner;
pub use runtime::RateLimitPolicy;
pub use runtime::RateLimiter;
pub use runtime::RateSubject;
pub use runtime::RequestOrigin;
pub use runtime::ServerHealth;
pub use runtime::TaskOutcome;
pub use runtime::TempFileError;
pub use runtime::TempFileReaper;
pub use runtime::TempFileSpec;
pub use runtime::ToolInvocation;
pub use runtime::WatchdogReport;
