//! Resource usage reported by [`crate::container::Container::stats`].
//!
//! The envelope wraps the cgroup statistics so further sources can be added
//! without changing the method's signature.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vessel_common::types::ContainerId;
use vessel_core::cgroup::CgroupStats;

/// Snapshot of a container's resource usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Container this snapshot belongs to.
    pub container_id: ContainerId,
    /// When the underlying files were read.
    pub collected_at: DateTime<Utc>,
    /// Statistics of the container's cgroup.
    pub cgroup: CgroupStats,
}

impl Stats {
    /// Wraps freshly read cgroup statistics.
    #[must_use]
    pub fn new(container_id: ContainerId, cgroup: CgroupStats) -> Self {
        Self {
            container_id,
            collected_at: Utc::now(),
            cgroup,
        }
    }

    /// Memory usage in bytes.
    #[must_use]
    pub const fn memory_usage_bytes(&self) -> u64 {
        self.cgroup.memory.usage.usage
    }

    /// CPU time consumed, in nanoseconds.
    #[must_use]
    pub const fn cpu_usage_ns(&self) -> u64 {
        self.cgroup.cpu.usage.total_ns
    }
}
