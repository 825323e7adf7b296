// crates/media-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Media Gate Identifiers
// Description: Opaque identifiers for accounts, clients, rate windows, and files.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: rand, serde, sha2
// ============================================================================

//! ## Overview
//! Identifiers are thin wrappers that serialize transparently. The rate-limit
//! identifier is derived: authenticated callers map to `user:<id>` while
//! guests map to a salted, truncated SHA-256 of their address so raw IPs never
//! appear in rate-window storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;

use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of hex characters kept from the salted client hash.
const CLIENT_HASH_HEX_LEN: usize = 16;
/// Random bytes used for temp-file identifiers.
const FILE_ID_BYTES: usize = 16;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Authenticated account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Creates a new user identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Client network identifier (an IP address string) used by the block list,
/// abuse log, and upload activity ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Placeholder recorded when no client address could be resolved.
    pub const UNKNOWN: &'static str = "unknown";

    /// Creates a new client identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identifier is the unresolved placeholder.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0.is_empty() || self.0 == Self::UNKNOWN
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Rate-window key: `user:<id>` or `ip:<salted hash>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateKey(String);

impl RateKey {
    /// Builds the key for an authenticated account.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self(format!("user:{user_id}"))
    }

    /// Builds the key for a guest by hashing the client address with `salt`.
    #[must_use]
    pub fn for_guest(client: &ClientId, salt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(client.as_str().as_bytes());
        hasher.update(salt.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(CLIENT_HASH_HEX_LEN);
        for byte in digest.iter().take(CLIENT_HASH_HEX_LEN / 2) {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(format!("ip:{hex}"))
    }

    /// Rehydrates a key read back from storage.
    #[must_use]
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the key belongs to an authenticated account.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.0.starts_with("user:")
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque temp-file token handed to clients for retrieval.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Generates a fresh random 128-bit identifier rendered as hex.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_hex(FILE_ID_BYTES))
    }

    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns `byte_len` random bytes rendered as lowercase hex.
#[must_use]
pub fn random_hex(byte_len: usize) -> String {
    let mut bytes = vec![0_u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(byte_len * 2);
    for byte in &bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_keys_hide_raw_addresses() {
        let client = ClientId::new("203.0.113.9");
        let key = RateKey::for_guest(&client, "salt-a");
        assert!(key.as_str().starts_with("ip:"));
        assert_eq!(key.as_str().len(), 3 + CLIENT_HASH_HEX_LEN);
        assert!(!key.as_str().contains("203.0.113.9"));
        assert!(!key.is_user());
    }

    #[test]
    fn guest_keys_depend_on_salt() {
        let client = ClientId::new("203.0.113.9");
        assert_ne!(RateKey::for_guest(&client, "a"), RateKey::for_guest(&client, "b"));
        assert_eq!(RateKey::for_guest(&client, "a"), RateKey::for_guest(&client, "a"));
    }

    #[test]
    fn file_ids_are_32_hex_chars() {
        let id = FileId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
