// crates/media-gate-core/src/core/rate.rs
// ============================================================================
// Module: Media Gate Rate Windows
// Description: Fixed-window counters and rate-limit decisions.
// Purpose: Share the window arithmetic between stores and the rate limiter.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`RateWindow`] counts requests since `window_start`. Once
//! `now - window_start >= window` the counter is stale and the next hit
//! starts a fresh window at `now`. [`RateWindow::try_hit`] is the pure form
//! of the conditional update every store must apply atomically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RateKey;
use crate::core::time::MILLIS_PER_SECOND;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Window
// ============================================================================

/// Per-identifier fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Start of the current window.
    pub window_start: Timestamp,
    /// Requests admitted in the current window.
    pub request_count: u32,
    /// Last time the record was touched.
    pub updated_at: Timestamp,
}

impl RateWindow {
    /// Returns true when the window has elapsed at `now`.
    #[must_use]
    pub const fn is_expired(&self, now: Timestamp, window_secs: u64) -> bool {
        now.millis_since(self.window_start) >= window_millis(window_secs)
    }

    /// Requests counted at `now`, treating an elapsed window as empty.
    #[must_use]
    pub const fn effective_count(&self, now: Timestamp, window_secs: u64) -> u32 {
        if self.is_expired(now, window_secs) { 0 } else { self.request_count }
    }

    /// Seconds until the window resets, measured from `now`.
    #[must_use]
    pub fn reset_in(&self, now: Timestamp, window_secs: u64) -> u64 {
        if self.is_expired(now, window_secs) {
            return window_secs;
        }
        let remaining_ms = window_millis(window_secs) - now.millis_since(self.window_start);
        // Round up so a client never retries before the window rolls.
        u64::try_from((remaining_ms + MILLIS_PER_SECOND - 1) / MILLIS_PER_SECOND).unwrap_or(0)
    }

    /// Applies one hit at `now`. Returns the updated window when admitted, or
    /// `None` when the limit is already reached inside the current window.
    #[must_use]
    pub const fn try_hit(
        current: Option<Self>,
        now: Timestamp,
        limit: u32,
        window_secs: u64,
    ) -> Option<Self> {
        if limit == 0 {
            return None;
        }
        let fresh = Self {
            window_start: now,
            request_count: 1,
            updated_at: now,
        };
        match current {
            None => Some(fresh),
            Some(window) if window.is_expired(now, window_secs) => Some(fresh),
            Some(window) if window.request_count >= limit => None,
            Some(window) => Some(Self {
                window_start: window.window_start,
                request_count: window.request_count + 1,
                updated_at: now,
            }),
        }
    }
}

/// Converts a window length to milliseconds.
const fn window_millis(window_secs: u64) -> i64 {
    let secs = if window_secs > i64::MAX as u64 { i64::MAX } else { window_secs as i64 };
    secs.saturating_mul(MILLIS_PER_SECOND)
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Outcome of an atomic rate-window hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateHit {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// Window state after the hit (unchanged on deny).
    pub window: RateWindow,
}

/// Rate-limit status for throttling headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStatus {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Seconds until the window resets.
    pub reset_in: u64,
}

/// Live window listing row for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    /// Window key.
    pub key: RateKey,
    /// Window state.
    pub window: RateWindow,
}
