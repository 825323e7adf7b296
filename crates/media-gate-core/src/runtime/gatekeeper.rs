// crates/media-gate-core/src/runtime/gatekeeper.rs
// ============================================================================
// Module: Gatekeeper
// Description: Resource and quota admission checks for uploads and heavy tools.
// Purpose: Decide whether an action may proceed given current resource state.
// Dependencies: crate::{audit, core, interfaces, runtime::context}
// ============================================================================

//! ## Overview
//! The gatekeeper evaluates an ordered predicate chain and short-circuits on
//! the first failure, returning exactly one [`ReasonCode`] per denial.
//! Settings are loaded once per evaluation. Store or probe failures never
//! surface as errors: settings fall back to the conservative snapshot,
//! probes read as zero, and a failed account read is evaluated as an empty
//! free-tier account. Every fallback emits an audit event.
//!
//! Security posture: the emergency storage ceiling latches the kill switch.
//! Nothing in this module clears it; only an operator `set_setting` does.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::audit::GovernanceAuditEvent;
use crate::core::AccountQuota;
use crate::core::AccountTier;
use crate::core::CalendarDate;
use crate::core::ClientId;
use crate::core::GovernanceSettings;
use crate::core::HeavyTool;
use crate::core::ReasonCode;
use crate::core::SettingRecord;
use crate::core::SettingValue;
use crate::core::Timestamp;
use crate::core::ToolKind;
use crate::core::ToolUsage;
use crate::core::UsageRecord;
use crate::core::UsageStatus;
use crate::core::UserId;
use crate::core::UserStats;
use crate::core::Verdict;
use crate::core::format_bytes;
use crate::core::settings::keys;
use crate::interfaces::DiskInfo;
use crate::interfaces::LoadAverage;
use crate::interfaces::MemoryInfo;
use crate::interfaces::ProbeError;
use crate::interfaces::StoreError;
use crate::interfaces::SystemProbe;
use crate::runtime::context::GovernanceContext;

// ============================================================================
// SECTION: Messages
// ============================================================================

/// Message for the maintenance flag.
const MSG_MAINTENANCE: &str = "System is under maintenance. Please try again later.";
/// Message for a disabled tool.
const MSG_TOOL_DISABLED: &str = "This tool is currently disabled for maintenance.";
/// Message for the kill switch.
const MSG_KILL_SWITCH: &str = "Uploads are temporarily disabled due to storage limits.";
/// Message for the emergency ceiling.
const MSG_STORAGE_FULL: &str = "Server storage is full. Uploads are temporarily disabled.";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Completed tool invocation reported back by a processing handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool that ran.
    pub tool: ToolKind,
    /// Account, if authenticated.
    pub user_id: Option<UserId>,
    /// Input size in bytes.
    pub file_size: u64,
    /// Wall time spent in the tool.
    pub processing_time_ms: u64,
    /// Outcome.
    pub status: UsageStatus,
    /// Client address, if known.
    pub client: Option<ClientId>,
}

/// Coarse CPU health label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuStatus {
    /// One-minute load below 2.0.
    Healthy,
    /// One-minute load below 3.0.
    Warning,
    /// One-minute load at or above 3.0.
    Critical,
}

impl CpuStatus {
    /// Classifies a one-minute load average.
    #[must_use]
    pub fn classify(load_1m: f64) -> Self {
        if load_1m < 2.0 {
            Self::Healthy
        } else if load_1m < 3.0 {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

/// Read-only server health snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerHealth {
    /// Snapshot time.
    pub timestamp: Timestamp,
    /// Load averages.
    pub load: LoadAverage,
    /// Configured heavy-tool load ceiling.
    pub cpu_load_threshold: f64,
    /// Coarse CPU label.
    pub cpu_status: CpuStatus,
    /// Memory figures.
    pub memory: MemoryInfo,
    /// Percentage of memory in use.
    pub memory_percent: f64,
    /// Disk figures.
    pub disk: DiskInfo,
    /// Percentage of disk in use.
    pub disk_percent: f64,
    /// Running heavy-compute workers.
    pub worker_processes: u32,
    /// Worker concurrency ceiling.
    pub max_concurrent_processes: u32,
    /// Aggregate bytes stored platform-wide.
    pub global_storage_used: u64,
    /// Human form of `global_storage_used`.
    pub global_storage_used_human: String,
    /// Nominal platform capacity.
    pub storage_global_cap: u64,
    /// Percentage of capacity in use.
    pub storage_percent: f64,
    /// Maintenance flag.
    pub maintenance_mode: bool,
    /// Kill switch.
    pub kill_switch_active: bool,
    /// True when settings came from the conservative fallback.
    pub settings_degraded: bool,
}

// ============================================================================
// SECTION: Gatekeeper
// ============================================================================

/// Admission controller for storage- and CPU-bound actions.
#[derive(Clone)]
pub struct Gatekeeper {
    /// Shared collaborators.
    ctx: GovernanceContext,
    /// Host metrics source.
    probe: Arc<dyn SystemProbe>,
}

impl Gatekeeper {
    /// Creates a gatekeeper.
    #[must_use]
    pub fn new(ctx: GovernanceContext, probe: Arc<dyn SystemProbe>) -> Self {
        Self {
            ctx,
            probe,
        }
    }

    /// Evaluates an upload of `file_size` bytes.
    #[must_use]
    pub fn can_upload(&self, file_size: u64, user_id: Option<UserId>) -> Verdict {
        let settings = self.ctx.settings_snapshot();
        let verdict = self.evaluate_upload(&settings, file_size, user_id);
        self.audited("can_upload", verdict, user_id)
    }

    /// Evaluates a heavy-tool invocation.
    #[must_use]
    pub fn can_run_heavy_tool(&self, tool: HeavyTool, user_id: Option<UserId>) -> Verdict {
        let settings = self.ctx.settings_snapshot();
        let verdict = self.evaluate_heavy_tool(&settings, tool, user_id);
        self.audited("can_run_heavy_tool", verdict, user_id)
    }

    /// Records a completed tool invocation.
    ///
    /// Successful heavy-tool runs by an account increment that account's
    /// daily counter (reset first when stale); every invocation appends a
    /// usage record. Call exactly once per completed invocation. Returns
    /// false when any write failed.
    #[must_use]
    pub fn record_tool_usage(&self, invocation: &ToolInvocation) -> bool {
        let now = self.ctx.now();
        let mut ok = true;
        if let (Some(user_id), Some(heavy), UsageStatus::Success) =
            (invocation.user_id, invocation.tool.heavy(), invocation.status)
            && let Err(err) = self.with_account(user_id, || {
                self.ctx.stores.quotas.increment_daily(user_id, heavy, now.utc_date())
            })
        {
            self.ctx.store_failure("increment_daily", &err);
            ok = false;
        }
        let record = UsageRecord {
            user_id: invocation.user_id,
            tool: invocation.tool,
            file_size: invocation.file_size,
            processing_time_ms: invocation.processing_time_ms,
            status: invocation.status,
            client: invocation.client.clone(),
            created_at: now,
        };
        if let Err(err) = self.ctx.stores.quotas.append_usage(&record) {
            self.ctx.store_failure("append_usage", &err);
            ok = false;
        }
        ok
    }

    /// Aggregates host and storage health. Read-only.
    #[must_use]
    pub fn server_health(&self) -> ServerHealth {
        let settings = self.ctx.settings_snapshot();
        let load = self.probe_or_default("load_average", self.probe.load_average());
        let memory = self.probe_or_default("memory", self.probe.memory());
        let disk = self.probe_or_default("disk", self.probe.disk());
        let worker_processes =
            self.probe_or_default("worker_processes", self.probe.worker_processes());
        ServerHealth {
            timestamp: self.ctx.now(),
            load,
            cpu_load_threshold: settings.cpu_load_threshold,
            cpu_status: CpuStatus::classify(load.one),
            memory,
            memory_percent: percent(memory.total.saturating_sub(memory.available), memory.total, 1),
            disk,
            disk_percent: percent(disk.used, disk.total, 1),
            worker_processes,
            max_concurrent_processes: settings.max_concurrent_processes,
            global_storage_used: settings.global_storage_used,
            global_storage_used_human: format_bytes(settings.global_storage_used),
            storage_global_cap: settings.storage_global_cap,
            storage_percent: percent(settings.global_storage_used, settings.storage_global_cap, 2),
            maintenance_mode: settings.maintenance_mode,
            kill_switch_active: settings.kill_switch_active,
            settings_degraded: settings.degraded,
        }
    }

    /// Summarizes an account's storage and daily tool usage, applying the
    /// daily reset first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the quota ledger cannot be read.
    pub fn user_stats(&self, user_id: UserId) -> Result<Option<UserStats>, StoreError> {
        let settings = self.ctx.settings_snapshot();
        let today = self.ctx.now().utc_date();
        let Some(quota) = self.ctx.stores.quotas.reconcile_daily(user_id, today)? else {
            return Ok(None);
        };
        let quota = quota.reconciled(today);
        let storage_limit = effective_storage_limit(&settings, &quota);
        let tools = HeavyTool::ALL
            .iter()
            .map(|tool| {
                let used = quota.daily_count(*tool);
                let limit = settings.daily_limit(*tool, quota.tier);
                ToolUsage {
                    tool: *tool,
                    used,
                    limit,
                    remaining: limit.saturating_sub(used),
                }
            })
            .collect();
        Ok(Some(UserStats {
            user_id,
            tier: quota.tier,
            storage_used: quota.storage_used,
            storage_limit,
            storage_percent: percent(quota.storage_used, storage_limit, 1),
            tools,
        }))
    }

    /// Applies a delta to the global storage counter (floored at zero).
    #[must_use]
    pub fn update_global_storage(&self, delta: i64) -> bool {
        match self.ctx.stores.settings.add_to_counter(keys::GLOBAL_STORAGE_USED, delta) {
            Ok(_) => true,
            Err(err) => {
                self.ctx.store_failure("update_global_storage", &err);
                false
            }
        }
    }

    /// Applies a delta to an account's stored bytes (floored at zero).
    #[must_use]
    pub fn update_user_storage(&self, user_id: UserId, delta: i64) -> bool {
        match self.with_account(user_id, || self.ctx.stores.quotas.adjust_storage(user_id, delta)) {
            Ok(_) => true,
            Err(err) => {
                self.ctx.store_failure("update_user_storage", &err);
                false
            }
        }
    }

    /// Writes a runtime setting. Returns false when the write fails.
    #[must_use]
    pub fn set_setting(&self, key: &str, value: SettingValue) -> bool {
        match self.ctx.stores.settings.put_setting(&SettingRecord::new(key, value)) {
            Ok(()) => true,
            Err(err) => {
                self.ctx.store_failure("set_setting", &err);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Predicate chains
    // ------------------------------------------------------------------------

    /// Upload chain: maintenance, kill switch, emergency ceiling, user quota.
    fn evaluate_upload(
        &self,
        settings: &GovernanceSettings,
        file_size: u64,
        user_id: Option<UserId>,
    ) -> Verdict {
        if settings.maintenance_mode {
            return Verdict::deny(ReasonCode::MaintenanceMode, MSG_MAINTENANCE);
        }
        if settings.kill_switch_active {
            return Verdict::deny(ReasonCode::KillSwitchActive, MSG_KILL_SWITCH);
        }
        let projected = settings.global_storage_used.saturating_add(file_size);
        if projected > settings.storage_emergency_threshold {
            self.trip_kill_switch(projected, settings.storage_emergency_threshold);
            return Verdict::deny(ReasonCode::StorageFull, MSG_STORAGE_FULL)
                .with("used", settings.global_storage_used)
                .with("limit", settings.storage_emergency_threshold);
        }
        if let Some(user_id) = user_id {
            let quota = self.load_account(user_id, None);
            let limit = effective_storage_limit(settings, &quota);
            if quota.storage_used.saturating_add(file_size) > limit {
                return Verdict::deny(
                    ReasonCode::UserQuotaExceeded,
                    format!(
                        "Storage quota exceeded. You have {} of {} used.",
                        format_bytes(quota.storage_used),
                        format_bytes(limit)
                    ),
                )
                .with("used", quota.storage_used)
                .with("limit", limit);
            }
        }
        Verdict::allow()
    }

    /// Heavy-tool chain: maintenance, tool toggle, load, concurrency, daily quota.
    fn evaluate_heavy_tool(
        &self,
        settings: &GovernanceSettings,
        tool: HeavyTool,
        user_id: Option<UserId>,
    ) -> Verdict {
        if settings.maintenance_mode {
            return Verdict::deny(ReasonCode::MaintenanceMode, MSG_MAINTENANCE);
        }
        if !settings.tool_enabled(tool) {
            return Verdict::deny(ReasonCode::MaintenanceMode, MSG_TOOL_DISABLED)
                .with("tool", tool.as_str());
        }
        let load = self.probe_or_default("load_average", self.probe.load_average()).one;
        if load > settings.cpu_load_threshold {
            return Verdict::deny(
                ReasonCode::ServerBusy,
                format!("Server is busy (load: {load:.1}). Please try again in a few moments."),
            )
            .with("cpu_load", load)
            .with("threshold", settings.cpu_load_threshold);
        }
        let running = self.probe_or_default("worker_processes", self.probe.worker_processes());
        if running >= settings.max_concurrent_processes {
            return Verdict::deny(
                ReasonCode::TooManyProcesses,
                format!(
                    "Too many processes running ({running}/{}). Please wait...",
                    settings.max_concurrent_processes
                ),
            )
            .with("running", running)
            .with("max", settings.max_concurrent_processes);
        }
        let Some(user_id) = user_id else {
            return Verdict::allow().with("tool", tool.as_str()).with("guest", true);
        };
        let today = self.ctx.now().utc_date();
        let quota = self.load_account(user_id, Some(today));
        let used = quota.reconciled(today).daily_count(tool);
        let limit = settings.daily_limit(tool, quota.tier);
        if used >= limit {
            return Verdict::deny(
                ReasonCode::DailyLimitExceeded,
                format!(
                    "Daily {} limit reached ({used}/{limit}). Resets at midnight UTC.",
                    tool.as_str().to_ascii_uppercase()
                ),
            )
            .with("used", used)
            .with("limit", limit)
            .with("tool", tool.as_str());
        }
        Verdict::allow()
            .with("used", used)
            .with("limit", limit)
            .with("remaining", limit - used)
            .with("tool", tool.as_str())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Loads an account, reconciling the daily reset when `today` is given.
    /// A missing account or a failed read is evaluated as an empty free-tier
    /// account.
    fn load_account(&self, user_id: UserId, today: Option<CalendarDate>) -> AccountQuota {
        let result = match today {
            Some(today) => self.ctx.stores.quotas.reconcile_daily(user_id, today),
            None => self.ctx.stores.quotas.account(user_id),
        };
        match result {
            Ok(Some(quota)) => quota,
            Ok(None) => AccountQuota::new(user_id, AccountTier::Free, u64::MAX),
            Err(err) => {
                self.ctx.store_failure("load_account", &err);
                AccountQuota::new(user_id, AccountTier::Free, u64::MAX)
            }
        }
    }

    /// Runs a per-account write, provisioning a free-tier account and
    /// retrying once when the account does not exist yet.
    fn with_account<T>(
        &self,
        user_id: UserId,
        write: impl Fn() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match write() {
            Err(StoreError::NotFound(_)) => {
                let limit = self.ctx.settings_snapshot().tier_storage_limit(AccountTier::Free);
                let account = AccountQuota::new(user_id, AccountTier::Free, limit);
                if self.ctx.stores.quotas.ensure_account(&account)? {
                    self.ctx.emit(
                        &GovernanceAuditEvent::new("account_provisioned", self.ctx.now())
                            .with("user_id", user_id.get()),
                    );
                }
                write()
            }
            other => other,
        }
    }

    /// Latches the kill switch after the emergency ceiling is crossed.
    fn trip_kill_switch(&self, projected: u64, threshold: u64) {
        let record = SettingRecord::new(keys::KILL_SWITCH_ACTIVE, SettingValue::Bool(true));
        if let Err(err) = self.ctx.stores.settings.put_setting(&record) {
            self.ctx.store_failure("trip_kill_switch", &err);
        }
        let event = GovernanceAuditEvent::kill_switch_tripped(self.ctx.now(), projected, threshold);
        self.ctx.emit(&event);
    }

    /// Unwraps a probe reading, auditing failures and substituting the default.
    fn probe_or_default<T: Default>(
        &self,
        metric: &'static str,
        reading: Result<T, ProbeError>,
    ) -> T {
        reading.unwrap_or_else(|err| {
            self.ctx.emit(&GovernanceAuditEvent::probe_failure(
                self.ctx.now(),
                metric,
                &err.to_string(),
            ));
            T::default()
        })
    }

    /// Emits `admission_denied` for denials and passes the verdict through.
    fn audited(
        &self,
        operation: &'static str,
        verdict: Verdict,
        user_id: Option<UserId>,
    ) -> Verdict {
        if verdict.is_denied() {
            self.ctx.emit(&GovernanceAuditEvent::admission_denied(
                self.ctx.now(),
                operation,
                &verdict,
                user_id,
                None,
            ));
        }
        verdict
    }
}

/// The tighter of the account ceiling and the tier default.
fn effective_storage_limit(settings: &GovernanceSettings, quota: &AccountQuota) -> u64 {
    quota.storage_limit.min(settings.tier_storage_limit(quota.tier))
}

/// `part / whole` as a percentage rounded to `decimals` places; zero when `whole` is zero.
fn percent(part: u64, whole: u64, decimals: i32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let scale = 10_f64.powi(decimals);
    ((part as f64 / whole as f64) * 100.0 * scale).round() / scale
}
