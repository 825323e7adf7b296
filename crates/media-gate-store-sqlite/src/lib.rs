// crates/media-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Media Gate SQLite Store
// Description: Durable governance stores backed by SQLite.
// Purpose: Provide the production backend for every store interface.
// Dependencies: media-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! [`SqliteGovernanceStore`] implements every `media-gate-core` store trait
//! over one `SQLite` database. Counter mutations are single conditional
//! statements so concurrent processes sharing the file stay consistent.

pub mod store;

pub use store::SqliteGovernanceStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
