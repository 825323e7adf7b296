// crates/media-gate-core/src/core/units.rs
// ============================================================================
// Module: Media Gate Units
// Description: Byte-size constants and human-readable formatting.
// Purpose: Render quota messages in human units.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Binary (1024-based) units, formatted with at most two decimals and no
//! trailing zeros: `250 MB`, `1.5 GB`, `0 B`.

/// Bytes per KiB.
pub const KIB: u64 = 1_024;
/// Bytes per MiB.
pub const MIB: u64 = KIB * 1_024;
/// Bytes per GiB.
pub const GIB: u64 = MIB * 1_024;

/// Unit labels in ascending order.
const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats `bytes` as a human-readable size.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1_024.0 && unit < UNITS.len() - 1 {
        value /= 1_024.0;
        unit += 1;
    }
    let rendered = format!("{value:.2}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
