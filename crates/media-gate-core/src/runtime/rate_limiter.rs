// crates/media-gate-core/src/runtime/rate_limiter.rs
// ============================================================================
// Module: Rate Limiter
// Description: Fixed-window per-identifier request throttling.
// Purpose: Reject floods before any resource or quota evaluation runs.
// Dependencies: crate::{core, interfaces, runtime::context}
// ============================================================================

//! ## Overview
//! Each request maps to a [`RateKey`]: `user:<id>` for accounts, a salted
//! hash of the client address for guests. Admission is a single atomic
//! store hit that increments only while the window count is under the tier
//! limit, so concurrent requests for one key can never overshoot.
//!
//! Fixed windows admit up to twice the limit in a burst that straddles a
//! window boundary; that is accepted.
//!
//! When the window store fails the request is admitted and a
//! `store_failure` event is emitted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::ClientId;
use crate::core::RateEntry;
use crate::core::RateKey;
use crate::core::RateStatus;
use crate::core::ReasonCode;
use crate::core::UserId;
use crate::core::Verdict;
use crate::interfaces::StoreError;
use crate::runtime::context::GovernanceContext;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Rate-limit tiers and window configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests per window for guests.
    pub guest_limit: u32,
    /// Requests per window for authenticated accounts.
    pub user_limit: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Idle time after which a window record is swept.
    pub idle_ttl_secs: u64,
    /// Salt mixed into guest address hashes.
    pub salt: String,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            guest_limit: 10,
            user_limit: 50,
            window_secs: 60,
            idle_ttl_secs: 300,
            salt: "media-gate".to_string(),
        }
    }
}

/// Caller identity for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateSubject {
    /// Authenticated account.
    User(UserId),
    /// Unauthenticated client.
    Guest(ClientId),
}

impl RateSubject {
    /// Builds the subject from an optional account and the client address.
    #[must_use]
    pub fn from_origin(user_id: Option<UserId>, client: &ClientId) -> Self {
        user_id.map_or_else(|| Self::Guest(client.clone()), Self::User)
    }
}

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

/// Fixed-window rate limiter backed by a [`crate::interfaces::RateWindowStore`].
#[derive(Clone)]
pub struct RateLimiter {
    /// Shared collaborators.
    ctx: GovernanceContext,
    /// Tier configuration.
    policy: RateLimitPolicy,
}

impl RateLimiter {
    /// Creates a rate limiter.
    #[must_use]
    pub const fn new(ctx: GovernanceContext, policy: RateLimitPolicy) -> Self {
        Self {
            ctx,
            policy,
        }
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Returns the storage key for `subject`.
    #[must_use]
    pub fn key_for(&self, subject: &RateSubject) -> RateKey {
        match subject {
            RateSubject::User(user_id) => RateKey::for_user(*user_id),
            RateSubject::Guest(client) => RateKey::for_guest(client, &self.policy.salt),
        }
    }

    /// Returns the per-window limit for `subject`.
    #[must_use]
    pub const fn limit_for(&self, subject: &RateSubject) -> u32 {
        match subject {
            RateSubject::User(_) => self.policy.user_limit,
            RateSubject::Guest(_) => self.policy.guest_limit,
        }
    }

    /// Counts one request and returns whether it is admitted.
    #[must_use]
    pub fn allow(&self, subject: &RateSubject) -> bool {
        self.check(subject).0
    }

    /// Reads the current status without counting a request.
    #[must_use]
    pub fn remaining(&self, subject: &RateSubject) -> RateStatus {
        let limit = self.limit_for(subject);
        let now = self.ctx.now();
        let window = match self.ctx.stores.rate_windows.window(&self.key_for(subject)) {
            Ok(window) => window,
            Err(err) => {
                self.ctx.store_failure("rate_limit_peek", &err);
                None
            }
        };
        window.map_or(
            RateStatus {
                limit,
                remaining: limit,
                reset_in: self.policy.window_secs,
            },
            |window| RateStatus {
                limit,
                remaining: limit
                    .saturating_sub(window.effective_count(now, self.policy.window_secs)),
                reset_in: window.reset_in(now, self.policy.window_secs),
            },
        )
    }

    /// Counts one request and returns a verdict carrying throttling metadata.
    ///
    /// Allow verdicts carry `limit`, `remaining`, and `reset_in`; deny
    /// verdicts use [`ReasonCode::RateLimit`] and add `retry_after`.
    #[must_use]
    pub fn enforce(&self, subject: &RateSubject) -> Verdict {
        let (allowed, status) = self.check(subject);
        if allowed {
            return with_status(Verdict::allow(), status);
        }
        with_status(
            Verdict::deny(ReasonCode::RateLimit, "Too many requests. Please try again later."),
            status,
        )
        .with("retry_after", status.reset_in)
    }

    /// Standard throttling headers for `status`.
    #[must_use]
    pub fn headers(&self, status: RateStatus, denied: bool) -> Vec<(&'static str, String)> {
        let reset_at = self
            .ctx
            .now()
            .plus_seconds(i64::try_from(status.reset_in).unwrap_or(i64::MAX))
            .as_unix_seconds();
        let mut headers = vec![
            ("X-RateLimit-Limit", status.limit.to_string()),
            (
                "X-RateLimit-Remaining",
                if denied { 0 } else { status.remaining }.to_string(),
            ),
            ("X-RateLimit-Reset", reset_at.to_string()),
        ];
        if denied {
            headers.push(("Retry-After", status.reset_in.to_string()));
        }
        headers
    }

    /// Removes windows idle longer than the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    pub fn sweep_idle(&self) -> Result<u64, StoreError> {
        let cutoff = self
            .ctx
            .now()
            .minus_seconds(i64::try_from(self.policy.idle_ttl_secs).unwrap_or(i64::MAX));
        self.ctx.stores.rate_windows.sweep_idle_windows(cutoff)
    }

    /// Lists live windows ordered by request count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the listing fails.
    pub fn entries(&self, limit: usize) -> Result<Vec<RateEntry>, StoreError> {
        self.ctx.stores.rate_windows.rate_entries(limit)
    }

    /// Performs the atomic hit and derives the resulting status.
    fn check(&self, subject: &RateSubject) -> (bool, RateStatus) {
        let limit = self.limit_for(subject);
        let window_secs = self.policy.window_secs;
        let now = self.ctx.now();
        match self.ctx.stores.rate_windows.hit(&self.key_for(subject), limit, window_secs, now) {
            Ok(hit) => (
                hit.allowed,
                RateStatus {
                    limit,
                    remaining: limit.saturating_sub(hit.window.effective_count(now, window_secs)),
                    reset_in: hit.window.reset_in(now, window_secs),
                },
            ),
            Err(err) => {
                self.ctx.store_failure("rate_limit_hit", &err);
                (
                    true,
                    RateStatus {
                        limit,
                        remaining: limit,
                        reset_in: window_secs,
                    },
                )
            }
        }
    }
}

/// Attaches rate-limit metadata to a verdict.
fn with_status(verdict: Verdict, status: RateStatus) -> Verdict {
    verdict
        .with("limit", status.limit)
        .with("remaining", status.remaining)
        .with("reset_in", status.reset_in)
}

// ============================================================================
// SECTION: Client Address Resolution
// ============================================================================

/// Resolves the client address from proxy headers, falling back to `peer`.
///
/// Precedence: `CF-Connecting-IP`, the first `X-Forwarded-For` entry,
/// `X-Real-IP`, then the socket peer. Header names match case-insensitively.
#[must_use]
pub fn resolve_client_ip<'a>(
    headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    peer: Option<&str>,
) -> ClientId {
    let mut cf = None;
    let mut forwarded = None;
    let mut real = None;
    for (name, value) in headers {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if name.eq_ignore_ascii_case("cf-connecting-ip") {
            cf.get_or_insert(value);
        } else if name.eq_ignore_ascii_case("x-forwarded-for") {
            if let Some(first) = value.split(',').map(str::trim).find(|part| !part.is_empty()) {
                forwarded.get_or_insert(first);
            }
        } else if name.eq_ignore_ascii_case("x-real-ip") {
            real.get_or_insert(value);
        }
    }
    cf.or(forwarded)
        .or(real)
        .or_else(|| peer.map(str::trim).filter(|peer| !peer.is_empty()))
        .map_or_else(|| ClientId::new(ClientId::UNKNOWN), ClientId::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_headers_take_precedence_in_order() {
        let headers = [
            ("X-Real-IP", "10.0.0.3"),
            ("X-Forwarded-For", "198.51.100.7, 10.0.0.1"),
            ("cf-connecting-ip", "203.0.113.5"),
        ];
        assert_eq!(resolve_client_ip(headers, Some("127.0.0.1")).as_str(), "203.0.113.5");
        assert_eq!(resolve_client_ip(headers[.. 2].iter().copied(), None).as_str(), "198.51.100.7");
        assert_eq!(resolve_client_ip(headers[.. 1].iter().copied(), None).as_str(), "10.0.0.3");
        let none: [(&str, &str); 0] = [];
        assert_eq!(resolve_client_ip(none, Some("192.0.2.1")).as_str(), "192.0.2.1");
        assert!(resolve_client_ip(none, None).is_unknown());
    }
}
