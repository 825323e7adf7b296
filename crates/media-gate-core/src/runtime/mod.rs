// crates/media-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Media Gate Runtime
// Description: Admission checks, abuse control, and housekeeping jobs.
// Purpose: Evaluate every inbound action and run the out-of-band jobs.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! Request-path components (rate limiter, upload guard, gatekeeper, and the
//! admission pipeline composing them) are synchronous and stateless apart
//! from the stores they share through [`GovernanceContext`]. The watchdog,
//! reaper, and maintenance runner run out-of-band against the same stores.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod abuse_guard;
pub mod admission;
pub mod context;
pub mod gatekeeper;
pub mod maintenance;
pub mod probe;
pub mod rate_limiter;
pub mod reaper;
pub mod store;
pub mod watchdog;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use abuse_guard::AbuseGuard;
pub use abuse_guard::UPLOAD_RETRY_AFTER_SECS;
pub use admission::Admission;
pub use admission::RequestOrigin;
pub use context::GovernanceContext;
pub use gatekeeper::CpuStatus;
pub use gatekeeper::Gatekeeper;
pub use gatekeeper::ServerHealth;
pub use gatekeeper::ToolInvocation;
pub use maintenance::MaintenanceReport;
pub use maintenance::MaintenanceRunner;
pub use maintenance::TaskOutcome;
pub use probe::HostSystemProbe;
pub use rate_limiter::RateLimitPolicy;
pub use rate_limiter::RateLimiter;
pub use rate_limiter::RateSubject;
pub use rate_limiter::resolve_client_ip;
pub use reaper::TempFileError;
pub use reaper::TempFileReaper;
pub use reaper::TempFileSpec;
pub use store::InMemoryGovernanceStore;
pub use watchdog::AbuseWatchdog;
pub use watchdog::SuspiciousIdentifier;
pub use watchdog::WatchdogAction;
pub use watchdog::WatchdogReport;
pub use watchdog::WatchdogThresholds;
