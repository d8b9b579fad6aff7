//! Cgroup resource management.
//!
//! [`CgroupManager`] is the capability set the runtime consumes. Backends
//! for a particular controller technology implement it. The workspace
//! ships [`Cgroup2Manager`] for the cgroups v2 unified hierarchy at
//! `/sys/fs/cgroup`; tests and other hosts plug in their own.

pub mod cpu;
pub mod freezer;
pub mod fs;
pub mod io;
pub mod memory;
pub mod pids;
pub mod stats;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use vessel_common::error::{Result, VesselError};
use vessel_common::types::{FreezerState, ResourceLimits};

pub use fs::Cgroup2Manager;
pub use stats::CgroupStats;

/// Resource controller backend for one container scope.
///
/// A manager is owned by exactly one container for its whole lifetime.
pub trait CgroupManager: Send + Sync {
    /// Attaches `pid` to every configured controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller hierarchy is unavailable.
    fn apply(&self, pid: u32) -> Result<()>;

    /// Writes resource limits. Re-applying the same limits has no effect.
    ///
    /// # Errors
    ///
    /// Returns an error naming the controller whose write failed.
    fn set(&self, limits: &ResourceLimits) -> Result<()>;

    /// Removes this scope. Removing an absent scope succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope exists but cannot be removed.
    fn destroy(&self) -> Result<()>;

    /// PIDs registered directly in this scope, without duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if the membership list cannot be read.
    fn pids(&self) -> Result<Vec<u32>>;

    /// PIDs in this scope and every nested scope. Always a superset of
    /// [`CgroupManager::pids`].
    ///
    /// # Errors
    ///
    /// Returns an error if any membership list cannot be read.
    fn all_pids(&self) -> Result<Vec<u32>>;

    /// Reads fresh usage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unreadable controller; partial
    /// statistics are never returned.
    fn stats(&self) -> Result<CgroupStats>;

    /// Controller name to filesystem path.
    fn paths(&self) -> BTreeMap<String, PathBuf>;

    /// Freezes or thaws every process in the scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the freezer cannot be written or does not reach
    /// the requested state in time.
    fn freeze(&self, state: FreezerState) -> Result<()>;
}

/// Controllers a v2 scope can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Controller {
    /// `cpu.*`
    Cpu,
    /// `memory.*`
    Memory,
    /// `pids.*`
    Pids,
    /// `io.*`
    Io,
}

impl Controller {
    /// Controllers enabled by default.
    pub const DEFAULT: [Self; 4] = [Self::Cpu, Self::Memory, Self::Pids, Self::Io];

    /// Kernel name of the controller.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Pids => "pids",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Writes `value` to an interface file of `controller`.
pub(crate) fn write_file(dir: &Path, file: &str, value: &str, controller: &str) -> Result<()> {
    let path = dir.join(file);
    std::fs::write(&path, value).map_err(|e| {
        VesselError::cgroup(controller, format!("writing {}: {e}", path.display()))
    })?;
    tracing::debug!(path = %path.display(), value, "cgroup file written");
    Ok(())
}

/// Reads an interface file of `controller`.
pub(crate) fn read_file(dir: &Path, file: &str, controller: &str) -> Result<String> {
    let path = dir.join(file);
    std::fs::read_to_string(&path)
        .map_err(|e| VesselError::cgroup(controller, format!("reading {}: {e}", path.display())))
}

/// Reads an interface file that older kernels may lack.
pub(crate) fn read_optional(dir: &Path, file: &str, controller: &str) -> Result<Option<String>> {
    let path = dir.join(file);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VesselError::cgroup(
            controller,
            format!("reading {}: {e}", path.display()),
        )),
    }
}
