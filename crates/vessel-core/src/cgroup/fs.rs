//! [`CgroupManager`] backed by the cgroups v2 unified hierarchy.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vessel_common::config::RuntimeConfig;
use vessel_common::error::{Result, VesselError};
use vessel_common::types::{ContainerId, FreezerState, ResourceLimits};

use super::stats::CgroupStats;
use super::{CgroupManager, Controller, cpu, freezer, io as io_ctl, memory, pids, write_file};

/// Handle to a container's scope, `<root>/<parent>/<container_id>`.
///
/// The directory is created on the first [`CgroupManager::apply`].
#[derive(Debug, Clone)]
pub struct Cgroup2Manager {
    root: PathBuf,
    path: PathBuf,
    controllers: Vec<Controller>,
    freeze_retries: u32,
    poll_interval: Duration,
}

impl Cgroup2Manager {
    /// Creates a handle for `container_id` under `root/parent`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, parent: &str, container_id: &ContainerId) -> Self {
        let root = root.into();
        let path = root.join(parent).join(container_id.as_str());
        Self {
            root,
            path,
            controllers: Controller::DEFAULT.to_vec(),
            freeze_retries: vessel_common::constants::DEFAULT_FREEZE_RETRIES,
            poll_interval: Duration::from_millis(vessel_common::constants::DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Creates a handle using the roots and timings of `config`.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig, container_id: &ContainerId) -> Self {
        Self {
            freeze_retries: config.freeze_retries,
            poll_interval: config.poll_interval(),
            ..Self::new(&config.cgroup_root, &config.cgroup_parent, container_id)
        }
    }

    /// Restricts the controllers this scope manages.
    #[must_use]
    pub fn with_controllers(mut self, controllers: &[Controller]) -> Self {
        self.controllers = controllers.to_vec();
        self
    }

    /// Path to this container's cgroup directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn has(&self, controller: Controller) -> bool {
        self.controllers.contains(&controller)
    }

    /// Delegates the managed controllers from the root down to our parent.
    ///
    /// Failures are logged, not returned: the hierarchy may already be
    /// delegated by the host, in which case the write is refused.
    fn enable_controllers(&self) {
        let value = self
            .controllers
            .iter()
            .map(|c| format!("+{}", c.name()))
            .collect::<Vec<_>>()
            .join(" ");
        let Some(parent) = self.path.parent() else { return };
        for dir in parent.ancestors().take_while(|d| d.starts_with(&self.root)) {
            if let Err(e) = write_file(dir, "cgroup.subtree_control", &value, "cgroup") {
                tracing::warn!(dir = %dir.display(), error = %e, "could not enable controllers");
            }
        }
    }

    /// Every directory of the scope, deepest first.
    fn scope_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut stack = vec![self.path.clone()];
        while let Some(dir) = stack.pop() {
            let entries = std::fs::read_dir(&dir).map_err(|e| {
                VesselError::cgroup("cgroup", format!("listing {}: {e}", dir.display()))
            })?;
            for entry in entries {
                let entry = entry.map_err(|e| {
                    VesselError::cgroup("cgroup", format!("listing {}: {e}", dir.display()))
                })?;
                if entry.file_type().is_ok_and(|t| t.is_dir()) {
                    stack.push(entry.path());
                }
            }
            dirs.push(dir);
        }
        dirs.reverse();
        Ok(dirs)
    }

    fn read_procs(dir: &Path) -> Result<Vec<u32>> {
        let raw = super::read_file(dir, "cgroup.procs", "cgroup")?;
        pids::parse_procs(&raw, &dir.join("cgroup.procs").display().to_string())
    }
}

/// cgroupfs directories vanish with `rmdir(2)` even though their interface
/// files are listed; on a plain filesystem the files have to go first.
fn remove_scope_dir(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir(dir) {
        Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => std::fs::remove_dir_all(dir),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl CgroupManager for Cgroup2Manager {
    fn apply(&self, pid: u32) -> Result<()> {
        std::fs::create_dir_all(&self.path).map_err(|e| {
            VesselError::cgroup("cgroup", format!("creating {}: {e}", self.path.display()))
        })?;
        self.enable_controllers();
        write_file(&self.path, "cgroup.procs", &pid.to_string(), "cgroup")?;
        tracing::info!(path = %self.path.display(), pid, "process added to cgroup");
        Ok(())
    }

    fn set(&self, limits: &ResourceLimits) -> Result<()> {
        if self.has(Controller::Memory) {
            if let Some(bytes) = limits.memory_bytes {
                memory::set_memory_max(&self.path, bytes)?;
            }
            if let Some(bytes) = limits.memory_reservation_bytes {
                memory::set_memory_low(&self.path, bytes)?;
            }
        }
        if self.has(Controller::Cpu) {
            match limits.cpu_shares.map(cpu::shares_to_weight) {
                None | Some(0) => {}
                Some(weight) => cpu::set_cpu_weight(&self.path, weight)?,
            }
            if limits.cpu_quota_us.is_some() || limits.cpu_period_us.is_some() {
                cpu::set_cpu_max(&self.path, limits.cpu_quota_us, limits.cpu_period_us)?;
            }
        }
        if self.has(Controller::Pids) {
            if let Some(max) = limits.pids_limit {
                pids::set_pids_max(&self.path, max)?;
            }
        }
        if self.has(Controller::Io) {
            if let Some(weight) = limits.io_weight {
                io_ctl::set_io_weight(&self.path, weight)?;
            }
        }
        tracing::debug!(path = %self.path.display(), "resource limits applied");
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        for dir in self.scope_dirs()? {
            remove_scope_dir(&dir).map_err(|e| {
                VesselError::cgroup("cgroup", format!("removing {}: {e}", dir.display()))
            })?;
        }
        tracing::info!(path = %self.path.display(), "cgroup destroyed");
        Ok(())
    }

    fn pids(&self) -> Result<Vec<u32>> {
        let mut pids = Self::read_procs(&self.path)?;
        pids.sort_unstable();
        pids.dedup();
        Ok(pids)
    }

    fn all_pids(&self) -> Result<Vec<u32>> {
        let mut all = BTreeSet::new();
        for dir in self.scope_dirs()? {
            all.extend(Self::read_procs(&dir)?);
        }
        Ok(all.into_iter().collect())
    }

    fn stats(&self) -> Result<CgroupStats> {
        let mut stats = CgroupStats::default();
        if self.has(Controller::Memory) {
            stats.memory = memory::stats(&self.path)?;
        }
        if self.has(Controller::Cpu) {
            stats.cpu = cpu::stats(&self.path)?;
        }
        if self.has(Controller::Pids) {
            stats.pids = pids::stats(&self.path)?;
        }
        Ok(stats)
    }

    fn paths(&self) -> BTreeMap<String, PathBuf> {
        self.controllers
            .iter()
            .map(|c| c.name())
            .chain(["freezer"])
            .map(|name| (name.to_string(), self.path.clone()))
            .collect()
    }

    fn freeze(&self, state: FreezerState) -> Result<()> {
        freezer::set_state(&self.path, state, self.freeze_retries, self.poll_interval)?;
        tracing::info!(path = %self.path.display(), %state, "cgroup freezer updated");
        Ok(())
    }
}
