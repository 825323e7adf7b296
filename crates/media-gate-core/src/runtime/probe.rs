// crates/media-gate-core/src/runtime/probe.rs
// ============================================================================
// Module: Host System Probe
// Description: Linux host metrics for server-health and admission checks.
// Purpose: Read load, memory, disk, and worker counts without extra crates.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`HostSystemProbe`] reads `/proc/loadavg` and `/proc/meminfo`, runs
//! `df -Pk` against the storage mount, and counts worker processes with
//! `pgrep -c`. Parsing lives in free functions so it can be exercised on
//! captured output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::core::units::KIB;
use crate::interfaces::DiskInfo;
use crate::interfaces::LoadAverage;
use crate::interfaces::MemoryInfo;
use crate::interfaces::ProbeError;
use crate::interfaces::SystemProbe;

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Probe backed by `/proc` and standard process utilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSystemProbe {
    /// Process name counted as a heavy-compute worker.
    worker_process: String,
    /// Path whose filesystem is reported as storage.
    disk_path: PathBuf,
}

impl HostSystemProbe {
    /// Creates a probe.
    #[must_use]
    pub fn new(worker_process: impl Into<String>, disk_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_process: worker_process.into(),
            disk_path: disk_path.into(),
        }
    }
}

impl SystemProbe for HostSystemProbe {
    fn load_average(&self) -> Result<LoadAverage, ProbeError> {
        parse_loadavg(&read_proc("/proc/loadavg")?)
    }

    fn memory(&self) -> Result<MemoryInfo, ProbeError> {
        parse_meminfo(&read_proc("/proc/meminfo")?)
    }

    fn disk(&self) -> Result<DiskInfo, ProbeError> {
        let output = Command::new("df")
            .arg("-Pk")
            .arg(&self.disk_path)
            .output()
            .map_err(|err| ProbeError::Unavailable(format!("df: {err}")))?;
        if !output.status.success() {
            return Err(ProbeError::Unavailable(format!("df exited with {}", output.status)));
        }
        parse_df(&String::from_utf8_lossy(&output.stdout))
    }

    fn worker_processes(&self) -> Result<u32, ProbeError> {
        let output = Command::new("pgrep")
            .arg("-c")
            .arg(&self.worker_process)
            .output()
            .map_err(|err| ProbeError::Unavailable(format!("pgrep: {err}")))?;
        // pgrep exits 1 when nothing matched.
        match output.status.code() {
            Some(0 | 1) => {}
            _ => {
                return Err(ProbeError::Unavailable(format!("pgrep exited with {}", output.status)));
            }
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse().map_err(|_| ProbeError::Parse(format!("pgrep count: {trimmed}")))
    }
}

/// Reads a proc file.
fn read_proc(path: &str) -> Result<String, ProbeError> {
    fs::read_to_string(path).map_err(|err| ProbeError::Unavailable(format!("{path}: {err}")))
}

// ============================================================================
// SECTION: Parsers
// ============================================================================

/// Parses `/proc/loadavg`.
///
/// # Errors
///
/// Returns [`ProbeError::Parse`] when fewer than three averages are present.
pub fn parse_loadavg(text: &str) -> Result<LoadAverage, ProbeError> {
    let mut fields = text.split_whitespace().map(str::parse::<f64>);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(Ok(one)), Some(Ok(five)), Some(Ok(fifteen))) => Ok(LoadAverage {
            one,
            five,
            fifteen,
        }),
        _ => Err(ProbeError::Parse(format!("loadavg: {}", text.trim()))),
    }
}

/// Parses `/proc/meminfo` (`MemTotal` and `MemAvailable`, in KiB).
///
/// # Errors
///
/// Returns [`ProbeError::Parse`] when either field is missing.
pub fn parse_meminfo(text: &str) -> Result<MemoryInfo, ProbeError> {
    let field = |name: &str| {
        text.lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
            .and_then(|rest| rest.split_whitespace().next()?.parse::<u64>().ok())
            .map(|kib| kib.saturating_mul(KIB))
            .ok_or_else(|| ProbeError::Parse(format!("meminfo missing {name}")))
    };
    Ok(MemoryInfo {
        total: field("MemTotal")?,
        available: field("MemAvailable")?,
    })
}

/// Parses POSIX `df -Pk` output for a single filesystem.
///
/// # Errors
///
/// Returns [`ProbeError::Parse`] when the data row is missing or malformed.
pub fn parse_df(text: &str) -> Result<DiskInfo, ProbeError> {
    let row = text.lines().nth(1).ok_or_else(|| ProbeError::Parse("df: no data row".into()))?;
    let numbers: Vec<u64> =
        row.split_whitespace().skip(1).take(3).filter_map(|field| field.parse().ok()).collect();
    match numbers.as_slice() {
        [total, used, free] => Ok(DiskInfo {
            total: total.saturating_mul(KIB),
            used: used.saturating_mul(KIB),
            free: free.saturating_mul(KIB),
        }),
        _ => Err(ProbeError::Parse(format!("df: {row}"))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn parses_loadavg() {
        let load = parse_loadavg("0.52 1.25 2.00 3/512 9999\n").unwrap();
        assert!((load.one - 0.52).abs() < f64::EPSILON);
        assert!((load.fifteen - 2.0).abs() < f64::EPSILON);
        assert!(parse_loadavg("garbage").is_err());
    }

    #[test]
    fn parses_meminfo_in_bytes() {
        let text = "MemTotal:       16384 kB\nMemFree:  100 kB\nMemAvailable:    8192 kB\n";
        let memory = parse_meminfo(text).unwrap();
        assert_eq!(memory.total, 16_384 * KIB);
        assert_eq!(memory.available, 8_192 * KIB);
        assert!(parse_meminfo("MemTotal: 1 kB\n").is_err());
    }

    #[test]
    fn parses_df_row() {
        let text = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                    /dev/sda1 1000 400 600 40% /\n";
        let disk = parse_df(text).unwrap();
        assert_eq!(disk.total, 1_000 * KIB);
        assert_eq!(disk.used, 400 * KIB);
        assert_eq!(disk.free, 600 * KIB);
    }
}
