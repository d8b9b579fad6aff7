//! Memory resource control via cgroups v2.
//!
//! Manages `memory.max` and `memory.low`, and reads the usage files.

use std::path::Path;

use vessel_common::error::Result;

use super::stats::{MemoryData, MemoryStats, parse_flat_keyed, parse_limit, parse_value};
use super::{read_file, read_optional, write_file};

const CONTROLLER: &str = "memory";

/// Sets the hard memory limit for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> Result<()> {
    write_file(cgroup_path, "memory.max", &bytes.to_string(), CONTROLLER)
}

/// Sets the amount of memory protected from reclaim.
///
/// # Errors
///
/// Returns an error if writing to `memory.low` fails.
pub fn set_memory_low(cgroup_path: &Path, bytes: u64) -> Result<()> {
    write_file(cgroup_path, "memory.low", &bytes.to_string(), CONTROLLER)
}

/// Reads memory usage.
///
/// `memory.current`, `memory.max` and `memory.stat` are required.
/// `memory.peak` and `memory.events` only exist on newer kernels.
///
/// # Errors
///
/// Returns an error if a required file is missing or malformed.
pub fn stats(cgroup_path: &Path) -> Result<MemoryStats> {
    let usage = parse_value(
        &read_file(cgroup_path, "memory.current", CONTROLLER)?,
        "memory.current",
        CONTROLLER,
    )?;
    let limit = parse_limit(
        &read_file(cgroup_path, "memory.max", CONTROLLER)?,
        "memory.max",
        CONTROLLER,
    )?;
    let max_usage = read_optional(cgroup_path, "memory.peak", CONTROLLER)?
        .map(|raw| parse_value(&raw, "memory.peak", CONTROLLER))
        .transpose()?
        .unwrap_or(0);
    let failcnt = read_optional(cgroup_path, "memory.events", CONTROLLER)?
        .map(|raw| parse_flat_keyed(&raw, "memory.events", CONTROLLER))
        .transpose()?
        .and_then(|events| events.get("max").copied())
        .unwrap_or(0);
    let stats = parse_flat_keyed(
        &read_file(cgroup_path, "memory.stat", CONTROLLER)?,
        "memory.stat",
        CONTROLLER,
    )?;

    Ok(MemoryStats {
        usage: MemoryData {
            usage,
            max_usage,
            failcnt,
            limit,
        },
        cache: stats.get("file").copied().unwrap_or(0),
        stats,
    })
}
