//! Task count control via cgroups v2.

use std::path::Path;

use vessel_common::error::Result;

use super::stats::{PidsStats, parse_limit, parse_value};
use super::{read_file, write_file};

const CONTROLLER: &str = "pids";

/// Caps the number of tasks in a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `pids.max` fails.
pub fn set_pids_max(cgroup_path: &Path, max: u64) -> Result<()> {
    write_file(cgroup_path, "pids.max", &max.to_string(), CONTROLLER)
}

/// Reads `pids.current` and `pids.max`.
///
/// # Errors
///
/// Returns an error if either file is missing or malformed.
pub fn stats(cgroup_path: &Path) -> Result<PidsStats> {
    Ok(PidsStats {
        current: parse_value(
            &read_file(cgroup_path, "pids.current", CONTROLLER)?,
            "pids.current",
            CONTROLLER,
        )?,
        limit: parse_limit(
            &read_file(cgroup_path, "pids.max", CONTROLLER)?,
            "pids.max",
            CONTROLLER,
        )?,
    })
}

/// Parses a `cgroup.procs` membership list.
pub(crate) fn parse_procs(content: &str, file: &str) -> Result<Vec<u32>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse().map_err(|_| {
                vessel_common::error::VesselError::cgroup(
                    "cgroup",
                    format!("{file}: invalid pid {line:?}"),
                )
            })
        })
        .collect()
}
