// crates/media-gate-core/src/runtime/context.rs
// ============================================================================
// Module: Governance Context
// Description: Shared stores, clock, and audit sink for runtime components.
// Purpose: Inject every collaborator explicitly instead of using globals.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! A [`GovernanceContext`] is cloned into each runtime component. Settings
//! are read through [`GovernanceContext::settings_snapshot`], which returns
//! the conservative fallback (and emits `settings_fallback`) when the store
//! cannot be read, so callers always receive a usable snapshot. The fallback
//! keeps the kill-switch state of the last successful read, and treats the
//! switch as engaged when no read has succeeded yet.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::audit::GovernanceAuditEvent;
use crate::audit::GovernanceAuditSink;
use crate::audit::NoopAuditSink;
use crate::core::Clock;
use crate::core::GovernanceSettings;
use crate::core::SystemClock;
use crate::core::Timestamp;
use crate::interfaces::GovernanceStores;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Collaborators shared by every runtime component.
#[derive(Clone)]
pub struct GovernanceContext {
    /// Durable stores.
    pub stores: GovernanceStores,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Audit sink.
    pub audit: Arc<dyn GovernanceAuditSink>,
    /// Kill-switch state from the last successful settings read. Engaged
    /// until a read succeeds.
    last_kill_switch: Arc<AtomicBool>,
}

impl GovernanceContext {
    /// Creates a context with the wall clock and a no-op audit sink.
    #[must_use]
    pub fn new(stores: GovernanceStores) -> Self {
        Self {
            stores,
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
            last_kill_switch: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn GovernanceAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Loads one settings snapshot, falling back conservatively on failure.
    #[must_use]
    pub fn settings_snapshot(&self) -> GovernanceSettings {
        match self.stores.settings.load_settings() {
            Ok(records) => {
                let settings = GovernanceSettings::from_records(&records);
                self.last_kill_switch.store(settings.kill_switch_active, Ordering::Relaxed);
                settings
            }
            Err(err) => {
                self.audit
                    .record(&GovernanceAuditEvent::settings_fallback(self.now(), &err.to_string()));
                GovernanceSettings {
                    kill_switch_active: self.last_kill_switch.load(Ordering::Relaxed),
                    ..GovernanceSettings::conservative_fallback()
                }
            }
        }
    }

    /// Emits an audit event.
    pub fn emit(&self, event: &GovernanceAuditEvent) {
        self.audit.record(event);
    }

    /// Emits a `store_failure` event.
    pub fn store_failure(&self, operation: &'static str, error: &impl std::fmt::Display) {
        self.emit(&GovernanceAuditEvent::store_failure(self.now(), operation, &error.to_string()));
    }
}
