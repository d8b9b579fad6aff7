//! Resource usage statistics read from a cgroup scope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vessel_common::error::{Result, VesselError};

/// Usage counters of one memory pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryData {
    /// Current usage in bytes.
    pub usage: u64,
    /// Peak usage in bytes, 0 if the kernel does not report it.
    pub max_usage: u64,
    /// Number of times the limit was hit.
    pub failcnt: u64,
    /// Configured limit in bytes, `None` when unlimited.
    pub limit: Option<u64>,
}

/// Memory controller statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Total memory usage.
    pub usage: MemoryData,
    /// Page cache in bytes (`file` in `memory.stat`).
    pub cache: u64,
    /// Raw `memory.stat` counters.
    pub stats: BTreeMap<String, u64>,
}

/// CPU time consumed, in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuUsage {
    /// Total CPU time.
    pub total_ns: u64,
    /// Time spent in user mode.
    pub user_ns: u64,
    /// Time spent in kernel mode.
    pub system_ns: u64,
}

/// CFS bandwidth throttling counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlingData {
    /// Enforcement periods elapsed.
    pub periods: u64,
    /// Periods in which the scope was throttled.
    pub throttled_periods: u64,
    /// Total throttled time in nanoseconds.
    pub throttled_time_ns: u64,
}

/// CPU controller statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuStats {
    /// Consumed CPU time.
    pub usage: CpuUsage,
    /// Throttling counters.
    pub throttling: ThrottlingData,
}

/// Pids controller statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidsStats {
    /// Number of tasks in the scope.
    pub current: u64,
    /// Task limit, `None` when unlimited.
    pub limit: Option<u64>,
}

/// Point-in-time statistics of a cgroup scope.
///
/// Controllers that are not enabled report their `Default` value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgroupStats {
    /// Memory controller.
    pub memory: MemoryStats,
    /// CPU controller.
    pub cpu: CpuStats,
    /// Pids controller.
    pub pids: PidsStats,
}

/// Parses a single-value interface file. `max` means unlimited.
pub(crate) fn parse_limit(content: &str, file: &str, controller: &str) -> Result<Option<u64>> {
    let value = content.trim();
    if value == "max" {
        return Ok(None);
    }
    parse_value(value, file, controller).map(Some)
}

/// Parses a single integer value.
pub(crate) fn parse_value(content: &str, file: &str, controller: &str) -> Result<u64> {
    content
        .trim()
        .parse()
        .map_err(|_| VesselError::cgroup(controller, format!("{file}: invalid value {content:?}")))
}

/// Parses a flat-keyed file (`key value` per line).
pub(crate) fn parse_flat_keyed(
    content: &str,
    file: &str,
    controller: &str,
) -> Result<BTreeMap<String, u64>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => {
                    Ok((key.to_string(), parse_value(value, file, controller)?))
                }
                _ => Err(VesselError::cgroup(
                    controller,
                    format!("{file}: malformed line {line:?}"),
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_is_unlimited() {
        assert_eq!(parse_limit("max\n", "memory.max", "memory").unwrap(), None);
        assert_eq!(
            parse_limit("1048576\n", "memory.max", "memory").unwrap(),
            Some(1_048_576)
        );
    }

    #[test]
    fn flat_keyed_parses_counters() {
        let map = parse_flat_keyed(
            "usage_usec 1500\nuser_usec 1000\nsystem_usec 500\n",
            "cpu.stat",
            "cpu",
        )
        .unwrap();
        assert_eq!(map["usage_usec"], 1500);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn malformed_flat_keyed_names_controller() {
        let err = parse_flat_keyed("usage_usec\n", "cpu.stat", "cpu").unwrap_err();
        assert!(matches!(err, VesselError::Cgroup { ref controller, .. } if controller == "cpu"));
    }
}
