// crates/media-gate-core/src/runtime/admission.rs
// ============================================================================
// Module: Admission Pipeline
// Description: Request-path composition of rate limiting and admission checks.
// Purpose: Give request handlers one call per action with one verdict back.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Every user-facing action passes the rate limiter first, then the upload
//! guard (uploads only), then the gatekeeper. The first denial wins. Allow
//! verdicts carry the rate-limit metadata under `rate` so callers can emit
//! throttling headers without a second lookup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;

use crate::core::ClientId;
use crate::core::HeavyTool;
use crate::core::UserId;
use crate::core::Verdict;
use crate::interfaces::SystemProbe;
use crate::runtime::abuse_guard::AbuseGuard;
use crate::runtime::context::GovernanceContext;
use crate::runtime::gatekeeper::Gatekeeper;
use crate::runtime::rate_limiter::RateLimitPolicy;
use crate::runtime::rate_limiter::RateLimiter;
use crate::runtime::rate_limiter::RateSubject;

// ============================================================================
// SECTION: Origin
// ============================================================================

/// Who is asking: the resolved client address plus an optional account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    /// Resolved client address.
    pub client: ClientId,
    /// Authenticated account, if any.
    pub user_id: Option<UserId>,
}

impl RequestOrigin {
    /// Unauthenticated origin.
    #[must_use]
    pub fn guest(client: impl Into<ClientId>) -> Self {
        Self {
            client: client.into(),
            user_id: None,
        }
    }

    /// Authenticated origin.
    #[must_use]
    pub fn user(client: impl Into<ClientId>, user_id: UserId) -> Self {
        Self {
            client: client.into(),
            user_id: Some(user_id),
        }
    }

    /// Rate-limit subject for this origin.
    #[must_use]
    pub fn subject(&self) -> RateSubject {
        RateSubject::from_origin(self.user_id, &self.client)
    }
}

// ============================================================================
// SECTION: Admission
// ============================================================================

/// Request-path admission facade.
#[derive(Clone)]
pub struct Admission {
    /// Shared collaborators.
    ctx: GovernanceContext,
    /// Flood control.
    rate_limiter: RateLimiter,
    /// Block list and guest rules.
    guard: AbuseGuard,
    /// Resource and quota checks.
    gatekeeper: Gatekeeper,
}

impl Admission {
    /// Builds the pipeline over one context.
    #[must_use]
    pub fn new(
        ctx: &GovernanceContext,
        policy: RateLimitPolicy,
        probe: Arc<dyn SystemProbe>,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            rate_limiter: RateLimiter::new(ctx.clone(), policy),
            guard: AbuseGuard::new(ctx.clone()),
            gatekeeper: Gatekeeper::new(ctx.clone(), probe),
        }
    }

    /// Rate limiter stage.
    #[must_use]
    pub const fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Upload guard stage.
    #[must_use]
    pub const fn guard(&self) -> &AbuseGuard {
        &self.guard
    }

    /// Gatekeeper stage.
    #[must_use]
    pub const fn gatekeeper(&self) -> &Gatekeeper {
        &self.gatekeeper
    }

    /// Admits an upload of `file_size` bytes.
    #[must_use]
    pub fn admit_upload(&self, origin: &RequestOrigin, file_size: u64) -> Verdict {
        let throttle = self.rate_limiter.enforce(&origin.subject());
        if throttle.is_denied() {
            return throttle;
        }
        let guarded = self.guard.check_upload(&origin.client, origin.user_id, file_size);
        if guarded.is_denied() {
            return guarded;
        }
        merge_rate_metadata(self.gatekeeper.can_upload(file_size, origin.user_id), &throttle)
    }

    /// Admits one heavy-tool run.
    #[must_use]
    pub fn admit_heavy_tool(&self, origin: &RequestOrigin, tool: HeavyTool) -> Verdict {
        let throttle = self.rate_limiter.enforce(&origin.subject());
        if throttle.is_denied() {
            return throttle;
        }
        let blocked = self.guard.check_blocked(&origin.client, origin.user_id);
        if blocked.is_denied() {
            return blocked;
        }
        merge_rate_metadata(self.gatekeeper.can_run_heavy_tool(tool, origin.user_id), &throttle)
    }

    /// Records a persisted upload: activity ledger, global counter, and the
    /// account's storage. Returns false when any write failed.
    pub fn complete_upload(&self, origin: &RequestOrigin, size: u64) -> bool {
        let logged = match self.guard.record_upload(&origin.client, origin.user_id, size) {
            Ok(()) => true,
            Err(err) => {
                self.ctx.store_failure("record_upload", &err);
                false
            }
        };
        let delta = i64::try_from(size).unwrap_or(i64::MAX);
        let global = self.gatekeeper.update_global_storage(delta);
        let account = origin.user_id.is_none_or(|user_id| {
            self.gatekeeper.update_user_storage(user_id, delta)
        });
        logged && global && account
    }
}

/// Nests throttle metadata under `rate` on an allow verdict.
fn merge_rate_metadata(verdict: Verdict, throttle: &Verdict) -> Verdict {
    if verdict.is_denied() {
        return verdict;
    }
    let rate: Map<String, Value> = ["limit", "remaining", "reset_in"]
        .into_iter()
        .filter_map(|key| throttle.extra.get(key).map(|value| (key.to_string(), value.clone())))
        .collect();
    verdict.with("rate", Value::Object(rate))
}
