//! In-memory cgroup and process doubles shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use nix::sys::signal::Signal;
use tempfile::TempDir;
use vessel_common::config::RuntimeConfig;
use vessel_common::error::{Result, VesselError};
use vessel_common::types::{ContainerId, FreezerState, ResourceLimits};
use vessel_core::cgroup::{CgroupManager, CgroupStats};
use vessel_core::namespace::NamespaceSet;
use vessel_runtime::container::{Container, ContainerConfig};
use vessel_runtime::process::{ExitState, InitProcess, ProcessLauncher, ProcessSpec};

pub const INIT_PID: u32 = 4321;
pub const START_TIME: &str = "010";

// ── Cgroup ───────────────────────────────────────────────────────────

/// What the container asked of its cgroup.
#[derive(Debug, Default)]
pub struct CgroupRecord {
    pub applied: Vec<u32>,
    pub limits: Option<ResourceLimits>,
    pub nested: Vec<u32>,
    pub freezes: Vec<FreezerState>,
    pub destroy_calls: usize,
    pub fail_apply: bool,
    pub fail_freeze: bool,
    pub memory_usage: u64,
}

/// Cheaply cloneable handle; the test keeps one clone, the container the other.
#[derive(Debug, Clone, Default)]
pub struct FakeCgroup(pub Arc<Mutex<CgroupRecord>>);

impl FakeCgroup {
    pub fn record(&self) -> std::sync::MutexGuard<'_, CgroupRecord> {
        self.0.lock().unwrap()
    }
}

impl CgroupManager for FakeCgroup {
    fn apply(&self, pid: u32) -> Result<()> {
        let mut record = self.record();
        if record.fail_apply {
            return Err(VesselError::cgroup("pids", "cgroup.procs is read-only"));
        }
        record.applied.push(pid);
        Ok(())
    }

    fn set(&self, limits: &ResourceLimits) -> Result<()> {
        self.record().limits = Some(limits.clone());
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.record().destroy_calls += 1;
        Ok(())
    }

    fn pids(&self) -> Result<Vec<u32>> {
        Ok(self.record().applied.clone())
    }

    fn all_pids(&self) -> Result<Vec<u32>> {
        let record = self.record();
        let mut pids: Vec<u32> = record.applied.iter().chain(&record.nested).copied().collect();
        pids.sort_unstable();
        pids.dedup();
        Ok(pids)
    }

    fn stats(&self) -> Result<CgroupStats> {
        let mut stats = CgroupStats::default();
        stats.memory.usage.usage = self.record().memory_usage;
        Ok(stats)
    }

    fn paths(&self) -> BTreeMap<String, PathBuf> {
        BTreeMap::from([(
            "memory".to_string(),
            PathBuf::from("/sys/fs/cgroup/memory/myid"),
        )])
    }

    fn freeze(&self, state: FreezerState) -> Result<()> {
        let mut record = self.record();
        if record.fail_freeze {
            return Err(VesselError::cgroup("freezer", "cgroup.freeze not writable"));
        }
        record.freezes.push(state);
        Ok(())
    }
}

// ── Process ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ProcessRecord {
    signals: Vec<Signal>,
    ignored: Vec<Signal>,
    exit: Option<ExitState>,
}

/// An init process that dies from any signal it does not ignore, except
/// `SIGUSR1`/`SIGUSR2`.
#[derive(Debug, Clone, Default)]
pub struct FakeProcess(Arc<(Mutex<ProcessRecord>, Condvar)>);

impl FakeProcess {
    fn record(&self) -> std::sync::MutexGuard<'_, ProcessRecord> {
        self.0.0.lock().unwrap()
    }

    /// Signals delivered so far.
    pub fn signals(&self) -> Vec<Signal> {
        self.record().signals.clone()
    }

    /// Makes the process survive `signal`.
    pub fn ignore(&self, signal: Signal) {
        self.record().ignored.push(signal);
    }

    /// Lets the process exit on its own.
    pub fn exit_with(&self, code: i32) {
        self.finish(ExitState::Exited(code));
    }

    fn finish(&self, exit: ExitState) {
        let mut record = self.record();
        if record.exit.is_none() {
            record.exit = Some(exit);
        }
        self.0.1.notify_all();
    }
}

impl InitProcess for FakeProcess {
    fn pid(&self) -> u32 {
        INIT_PID
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        let fatal = {
            let mut record = self.record();
            if record.exit.is_some() {
                return Err(VesselError::ProcessNotFound { pid: INIT_PID });
            }
            record.signals.push(signal);
            !record.ignored.contains(&signal)
                && !matches!(signal, Signal::SIGUSR1 | Signal::SIGUSR2)
        };
        if fatal {
            self.finish(ExitState::Signaled(signal));
        }
        Ok(())
    }

    fn try_reap(&self) -> Result<Option<ExitState>> {
        Ok(self.record().exit)
    }

    fn wait_exited(&self) -> Result<()> {
        let (lock, exited) = &*self.0;
        let _guard = exited
            .wait_while(lock.lock().unwrap(), |record| record.exit.is_none())
            .unwrap();
        Ok(())
    }
}

/// Hands out one [`FakeProcess`] and stages its procfs entry.
#[derive(Debug)]
pub struct FakeLauncher {
    process: FakeProcess,
    proc_root: PathBuf,
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &ProcessSpec, _namespaces: &NamespaceSet) -> Result<Box<dyn InitProcess>> {
        if spec.args.is_empty() {
            return Err(VesselError::Config {
                message: "empty command".into(),
            });
        }
        stage_stat(&self.proc_root, INIT_PID, START_TIME);
        Ok(Box::new(self.process.clone()))
    }
}

/// Writes a `stat` line for `pid` with the given start time.
pub fn stage_stat(proc_root: &Path, pid: u32, start_time: &str) {
    let dir = proc_root.join(pid.to_string());
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("stat"),
        format!("{pid} (init) S 1 {pid} {pid} 0 -1 4194560 0 0 0 0 0 0 0 0 20 0 1 0 {start_time} 0 0"),
    )
    .unwrap();
}

/// Points fds 0-2 of `pid` at `targets`.
pub fn stage_descriptors(proc_root: &Path, pid: u32, targets: [&str; 3]) {
    let dir = proc_root.join(pid.to_string()).join("fd");
    std::fs::create_dir_all(&dir).unwrap();
    for (fd, target) in targets.iter().enumerate() {
        std::os::unix::fs::symlink(target, dir.join(fd.to_string())).unwrap();
    }
}

// ── Fixture ──────────────────────────────────────────────────────────

pub struct Fixture {
    pub proc_root: TempDir,
    pub cgroup: FakeCgroup,
    pub process: FakeProcess,
    pub container: Container,
}

impl Fixture {
    pub fn new(config: ContainerConfig) -> Self {
        let proc_root = tempfile::tempdir().unwrap();
        let cgroup = FakeCgroup::default();
        let process = FakeProcess::default();
        let launcher = FakeLauncher {
            process: process.clone(),
            proc_root: proc_root.path().to_path_buf(),
        };
        let runtime = RuntimeConfig {
            proc_root: proc_root.path().to_path_buf(),
            poll_interval_ms: 1,
            kill_timeout_ms: 500,
            ..RuntimeConfig::default()
        };
        let container = Container::new(
            ContainerId::new("myid"),
            config,
            Box::new(cgroup.clone()),
            Box::new(launcher),
        )
        .with_runtime_config(runtime);
        Self {
            proc_root,
            cgroup,
            process,
            container,
        }
    }

    /// A fixture whose container is already `Running`.
    pub fn started() -> Self {
        let fixture = Self::new(ContainerConfig::default());
        fixture.container.start(&spec()).unwrap();
        fixture
    }
}

pub fn spec() -> ProcessSpec {
    ProcessSpec::new(["/sbin/init"])
}
