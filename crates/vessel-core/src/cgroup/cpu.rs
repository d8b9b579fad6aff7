//! CPU resource control via cgroups v2.
//!
//! Manages `cpu.weight` and `cpu.max`, and reads `cpu.stat`.

use std::path::Path;

use vessel_common::constants::{CPU_SHARES_MAX, CPU_WEIGHT_MAX};
use vessel_common::error::Result;

use super::stats::{CpuStats, CpuUsage, ThrottlingData, parse_flat_keyed};
use super::{read_file, write_file};

const CONTROLLER: &str = "cpu";

/// Default CFS period when only a quota is configured.
const DEFAULT_PERIOD_US: u64 = 100_000;

/// Converts cgroup v1 CPU shares (2..=262144) to a v2 weight (1..=10000).
///
/// Zero means "unset" and maps to zero.
#[must_use]
pub const fn shares_to_weight(shares: u64) -> u64 {
    if shares == 0 {
        return 0;
    }
    let shares = if shares < 2 {
        2
    } else if shares > CPU_SHARES_MAX {
        CPU_SHARES_MAX
    } else {
        shares
    };
    1 + ((shares - 2) * (CPU_WEIGHT_MAX - 1)) / (CPU_SHARES_MAX - 2)
}

/// Sets the CPU weight for a cgroup.
///
/// Weight is a value between 1 and 10000 that controls the relative
/// share of CPU time this cgroup receives under contention.
///
/// # Errors
///
/// Returns an error if writing to `cpu.weight` fails.
pub fn set_cpu_weight(cgroup_path: &Path, weight: u64) -> Result<()> {
    write_file(cgroup_path, "cpu.weight", &weight.to_string(), CONTROLLER)?;
    tracing::debug!(weight, "CPU weight set");
    Ok(())
}

/// Sets the CPU bandwidth limit (max microseconds per period).
///
/// A missing quota writes `max`, lifting the limit while keeping the period.
///
/// # Errors
///
/// Returns an error if writing to `cpu.max` fails.
pub fn set_cpu_max(cgroup_path: &Path, quota_us: Option<u64>, period_us: Option<u64>) -> Result<()> {
    let period_us = period_us.unwrap_or(DEFAULT_PERIOD_US);
    let value = quota_us.map_or_else(
        || format!("max {period_us}"),
        |quota| format!("{quota} {period_us}"),
    );
    write_file(cgroup_path, "cpu.max", &value, CONTROLLER)?;
    tracing::debug!(?quota_us, period_us, "CPU max quota set");
    Ok(())
}

/// Reads `cpu.stat`.
///
/// # Errors
///
/// Returns an error if `cpu.stat` is missing or malformed.
pub fn stats(cgroup_path: &Path) -> Result<CpuStats> {
    let raw = read_file(cgroup_path, "cpu.stat", CONTROLLER)?;
    let map = parse_flat_keyed(&raw, "cpu.stat", CONTROLLER)?;
    let usec = |key: &str| map.get(key).copied().unwrap_or(0).saturating_mul(1_000);
    Ok(CpuStats {
        usage: CpuUsage {
            total_ns: usec("usage_usec"),
            user_ns: usec("user_usec"),
            system_ns: usec("system_usec"),
        },
        throttling: ThrottlingData {
            periods: map.get("nr_periods").copied().unwrap_or(0),
            throttled_periods: map.get("nr_throttled").copied().unwrap_or(0),
            throttled_time_ns: usec("throttled_usec"),
        },
    })
}
