//! Core container struct and lifecycle operations.
//!
//! Every method takes `&self`. The lifecycle state and the init supervisor
//! share one mutex; freezer and kernel waits run with it released, while
//! reaping and signalling the init process always happen under it. The
//! kernel cannot recycle the PID of an unreaped child, so a verified signal
//! sent under the lock cannot reach a stranger.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use vessel_common::config::RuntimeConfig;
use vessel_common::error::{Result, TransitionError, VesselError};
use vessel_common::types::{ContainerId, ContainerStatus, FreezerState, ResourceLimits};
use vessel_core::cgroup::CgroupManager;
use vessel_core::namespace::NamespaceSet;
use vessel_core::proc::ProcFs;

use crate::lifecycle::{Operation, allowed_operations, transition};
use crate::process::{ExitState, InitSupervisor, ProcessLauncher, ProcessSpec, signal_pid};
use crate::snapshot::{SnapshotBuilder, StateSnapshot};
use crate::stats::Stats;

/// Static configuration of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Namespaces the init process is placed in.
    pub namespaces: NamespaceSet,
    /// Limits written to the cgroup at start.
    pub limits: ResourceLimits,
}

#[derive(Debug)]
struct Inner {
    status: ContainerStatus,
    init: Option<InitSupervisor>,
    exit: Option<ExitState>,
}

impl Inner {
    /// Reaps the init process if it has exited and records the exit.
    fn observe_exit(&mut self) -> Result<()> {
        let Some(init) = self.init.as_mut() else {
            return Ok(());
        };
        if let Some(exit) = init.try_reap()? {
            self.exit = Some(exit);
            if self.status != ContainerStatus::Destroyed {
                self.status = transition(self.status, Operation::Exited)?;
            }
        }
        Ok(())
    }

    fn require_init(&self) -> Result<&InitSupervisor> {
        self.init.as_ref().ok_or_else(|| {
            TransitionError::NotRunning {
                state: self.status,
            }
            .into()
        })
    }
}

/// A single container: one init process, one cgroup scope.
pub struct Container {
    id: ContainerId,
    config: ContainerConfig,
    runtime: RuntimeConfig,
    procfs: ProcFs,
    cgroup: Box<dyn CgroupManager>,
    launcher: Box<dyn ProcessLauncher>,
    created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("created_at", &self.created_at)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Creates a container in the `Created` state.
    ///
    /// `cgroup` is owned by the container until [`Container::destroy`].
    #[must_use]
    pub fn new(
        id: ContainerId,
        config: ContainerConfig,
        cgroup: Box<dyn CgroupManager>,
        launcher: Box<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            id,
            config,
            runtime: RuntimeConfig::default(),
            procfs: ProcFs::default(),
            cgroup,
            launcher,
            created_at: Utc::now(),
            inner: Mutex::new(Inner {
                status: ContainerStatus::Created,
                init: None,
                exit: None,
            }),
        }
    }

    /// Creates a container backed by the cgroup v2 hierarchy and a
    /// `fork`/`exec` launcher, using the roots and timings of `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if `runtime` fails validation.
    #[cfg(target_os = "linux")]
    pub fn create(id: ContainerId, config: ContainerConfig, runtime: RuntimeConfig) -> Result<Self> {
        runtime.validate()?;
        let cgroup = vessel_core::cgroup::Cgroup2Manager::from_config(&runtime, &id);
        Ok(Self::new(id, config, Box::new(cgroup), Box::new(crate::launcher::CommandLauncher))
            .with_runtime_config(runtime))
    }

    /// Replaces the runtime configuration.
    #[must_use]
    pub fn with_runtime_config(mut self, runtime: RuntimeConfig) -> Self {
        self.procfs = ProcFs::new(runtime.proc_root.clone());
        self.runtime = runtime;
        self
    }

    /// Container identifier.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Static configuration.
    #[must_use]
    pub const fn config(&self) -> &ContainerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state, after checking whether the init process
    /// has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the init process cannot be waited on.
    pub fn status(&self) -> Result<ContainerStatus> {
        let mut inner = self.lock();
        inner.observe_exit()?;
        Ok(inner.status)
    }

    /// Operations legal in the current state.
    ///
    /// # Errors
    ///
    /// Same as [`Container::status`].
    pub fn allowed_operations(&self) -> Result<Vec<Operation>> {
        Ok(allowed_operations(self.status()?))
    }

    /// Launches the init process and places it in the cgroup.
    ///
    /// If the cgroup rejects the process or its limits, the process is
    /// killed and reaped and the container stays `Created`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` (or `Destroyed`) outside `Created`, the
    /// launcher's error, or the cgroup error.
    pub fn start(&self, spec: &ProcessSpec) -> Result<()> {
        let mut inner = self.lock();
        let next = transition(inner.status, Operation::Start)?;

        let mut init = InitSupervisor::launch(
            self.launcher.as_ref(),
            spec,
            &self.config.namespaces,
            self.procfs.clone(),
        )?;
        let pid = init.pid();

        if let Err(e) = self
            .cgroup
            .apply(pid)
            .and_then(|()| self.cgroup.set(&self.config.limits))
        {
            tracing::error!(id = %self.id, pid, error = %e, "cgroup setup failed, killing init process");
            if let Err(kill_err) = init.kill(self.runtime.kill_timeout(), self.runtime.poll_interval()) {
                tracing::warn!(id = %self.id, pid, error = %kill_err, "init process not reaped");
            }
            return Err(e);
        }

        inner.init = Some(init);
        inner.status = next;
        tracing::info!(id = %self.id, pid, "container started");
        Ok(())
    }

    /// Delivers `signal` to the init process.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` outside `Running`/`Pausing`/`Paused`, and
    /// [`VesselError::ProcessNotFound`] if the PID no longer names the init
    /// process. Nothing is delivered in either case.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        let mut inner = self.lock();
        inner.observe_exit()?;
        let _ = transition(inner.status, Operation::Signal)?;
        inner.require_init()?.signal(signal)
    }

    /// Signals every process in the cgroup tree.
    ///
    /// The init process goes through identity verification; processes that
    /// vanish in the meantime are skipped.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` outside the running states, an error listing
    /// the cgroup, or the first signal failure other than "gone".
    pub fn kill_all(&self, signal: Signal) -> Result<()> {
        let mut inner = self.lock();
        inner.observe_exit()?;
        let _ = transition(inner.status, Operation::Signal)?;
        let init = inner.require_init()?;

        let mut delivered = 0_usize;
        for pid in self.cgroup.all_pids()? {
            let result = if pid == init.pid() {
                init.signal(signal)
            } else {
                signal_pid(pid, signal)
            };
            match result {
                Ok(()) => delivered += 1,
                Err(e) if e.is_process_gone() => {
                    tracing::debug!(id = %self.id, pid, "process gone before signal");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(id = %self.id, %signal, delivered, "signal sent to all processes");
        Ok(())
    }

    /// Freezes every process in the container.
    ///
    /// The container is `Pausing` while the freezer works, and returns to
    /// `Running` if the freeze fails.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyPaused` from `Pausing`/`Paused`, `NotRunning` from
    /// other states, or the freezer error.
    pub fn pause(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.observe_exit()?;
            inner.status = transition(inner.status, Operation::Pause)?;
        }

        let frozen = self.cgroup.freeze(FreezerState::Frozen);

        let mut inner = self.lock();
        match frozen {
            Ok(()) => {
                inner.status = transition(inner.status, Operation::FreezeCompleted)?;
                tracing::info!(id = %self.id, "container paused");
                Ok(())
            }
            Err(e) => {
                if let Ok(next) = transition(inner.status, Operation::FreezeFailed) {
                    inner.status = next;
                }
                tracing::warn!(id = %self.id, error = %e, "freeze failed");
                Err(e)
            }
        }
    }

    /// Thaws a paused container.
    ///
    /// # Errors
    ///
    /// Returns `NotPaused` from `Running`/`Pausing`, `NotRunning` from
    /// other states, or the freezer error.
    pub fn resume(&self) -> Result<()> {
        {
            let inner = self.lock();
            let _ = transition(inner.status, Operation::Resume)?;
        }

        self.cgroup.freeze(FreezerState::Thawed)?;

        let mut inner = self.lock();
        inner.status = transition(inner.status, Operation::Resume)?;
        tracing::info!(id = %self.id, "container resumed");
        Ok(())
    }

    /// Blocks until the init process exits and returns how it ended.
    ///
    /// The kernel wait runs without the lock and leaves the process
    /// unreaped; reaping happens under the lock.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` if no init process was started, or the wait
    /// error.
    pub fn wait(&self) -> Result<ExitState> {
        loop {
            let process = {
                let mut inner = self.lock();
                inner.observe_exit()?;
                if let Some(exit) = inner.exit {
                    return Ok(exit);
                }
                inner.require_init()?.process()
            };

            let waited = process.wait_exited();

            let mut inner = self.lock();
            inner.observe_exit()?;
            if let Some(exit) = inner.exit {
                return Ok(exit);
            }
            waited?;
        }
    }

    /// Like [`Container::wait`] with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::Timeout`] if the process is still running
    /// after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<ExitState> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut inner = self.lock();
                inner.observe_exit()?;
                if let Some(exit) = inner.exit {
                    return Ok(exit);
                }
                let _ = inner.require_init()?;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(VesselError::Timeout {
                    operation: "wait for init process",
                    timeout,
                });
            }
            std::thread::sleep(self.runtime.poll_interval().min(deadline - now));
        }
    }

    /// Stops the container gracefully.
    ///
    /// Sends `SIGTERM`, thaws a paused container so it can react, and
    /// waits up to `grace`. A process still alive then gets `SIGKILL` and
    /// the configured kill timeout.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` if nothing runs, or [`VesselError::Timeout`] if
    /// the process survives `SIGKILL` past the kill timeout.
    pub fn stop(&self, grace: Duration) -> Result<ExitState> {
        let paused = {
            let mut inner = self.lock();
            inner.observe_exit()?;
            if let (ContainerStatus::Stopped, Some(exit)) = (inner.status, inner.exit) {
                return Ok(exit);
            }
            let _ = transition(inner.status, Operation::Signal)?;
            match inner.require_init()?.signal(Signal::SIGTERM) {
                Ok(()) => {}
                Err(e) if e.is_process_gone() => {
                    tracing::debug!(id = %self.id, "init process gone before SIGTERM");
                }
                Err(e) => return Err(e),
            }
            inner.status == ContainerStatus::Paused
        };
        if paused {
            self.resume()?;
        }

        match self.wait_timeout(grace) {
            Err(VesselError::Timeout { .. }) => {}
            other => return other,
        }

        tracing::warn!(id = %self.id, ?grace, "grace period expired, sending SIGKILL");
        {
            let inner = self.lock();
            if let Some(init) = inner.init.as_ref() {
                match init.signal(Signal::SIGKILL) {
                    Ok(()) => {}
                    Err(e) if e.is_process_gone() => {}
                    Err(e) => return Err(e),
                }
            }
        }
        self.wait_timeout(self.runtime.kill_timeout())
    }

    /// [`Container::stop`] with the configured grace period.
    ///
    /// # Errors
    ///
    /// Same as [`Container::stop`].
    pub fn terminate(&self) -> Result<ExitState> {
        self.stop(self.runtime.stop_timeout())
    }

    /// Kills every process, removes the cgroup and moves to `Destroyed`.
    ///
    /// Destroying a destroyed container does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::Timeout`] if the init process is not reaped
    /// after `SIGKILL`, or the cgroup removal error. The state is left
    /// unchanged so the call can be retried.
    pub fn destroy(&self) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.status == ContainerStatus::Destroyed {
            tracing::debug!(id = %self.id, "already destroyed");
            return Ok(());
        }
        let frozen = matches!(inner.status, ContainerStatus::Pausing | ContainerStatus::Paused);

        let init_pid = inner.init.as_ref().map(InitSupervisor::pid);
        if let Some(init) = inner.init.as_ref().filter(|_| inner.exit.is_none()) {
            match init.signal(Signal::SIGKILL) {
                Ok(()) => {}
                Err(e) if e.is_process_gone() => {}
                Err(e) => tracing::warn!(id = %self.id, error = %e, "cannot kill init process"),
            }
        }
        match self.cgroup.all_pids() {
            Ok(pids) => {
                for pid in pids.into_iter().filter(|pid| Some(*pid) != init_pid) {
                    match signal_pid(pid, Signal::SIGKILL) {
                        Ok(()) => {}
                        Err(e) if e.is_process_gone() => {}
                        Err(e) => tracing::warn!(id = %self.id, pid, error = %e, "cannot kill process"),
                    }
                }
            }
            Err(e) => tracing::debug!(id = %self.id, error = %e, "cgroup processes not listed"),
        }
        if frozen {
            if let Err(e) = self.cgroup.freeze(FreezerState::Thawed) {
                tracing::warn!(id = %self.id, error = %e, "thaw before destroy failed");
            }
        }

        if let Some(init) = inner.init.as_mut() {
            let exit = init.reap_within(self.runtime.kill_timeout(), self.runtime.poll_interval())?;
            inner.exit = Some(exit);
        }
        self.cgroup.destroy()?;

        inner.init = None;
        inner.status = transition(inner.status, Operation::Destroy)?;
        tracing::info!(id = %self.id, exit = ?inner.exit, "container destroyed");
        Ok(())
    }

    /// Targets of the init process' stdio descriptors.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` if no init process was started.
    pub fn external_descriptors(&self) -> Result<Vec<String>> {
        Ok(self.lock().require_init()?.external_descriptors().to_vec())
    }

    /// Replaces the recorded stdio descriptor targets, as reported by
    /// [`Container::state`].
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` if no init process was started.
    pub fn set_external_descriptors(&self, descriptors: Vec<String>) -> Result<()> {
        let mut inner = self.lock();
        let status = inner.status;
        inner
            .init
            .as_mut()
            .ok_or(TransitionError::NotRunning { state: status })?
            .set_external_descriptors(descriptors);
        Ok(())
    }

    /// PIDs directly in the container's cgroup.
    ///
    /// # Errors
    ///
    /// Returns the cgroup error.
    pub fn processes(&self) -> Result<Vec<u32>> {
        self.cgroup.pids()
    }

    /// PIDs in the container's cgroup and every nested cgroup.
    ///
    /// # Errors
    ///
    /// Returns the cgroup error.
    pub fn all_processes(&self) -> Result<Vec<u32>> {
        self.cgroup.all_pids()
    }

    /// Fresh resource usage.
    ///
    /// # Errors
    ///
    /// Returns the error of the first unreadable controller.
    pub fn stats(&self) -> Result<Stats> {
        Ok(Stats::new(self.id.clone(), self.cgroup.stats()?))
    }

    /// Point-in-time view of the container.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` if no init process was started.
    pub fn state(&self) -> Result<StateSnapshot> {
        let mut inner = self.lock();
        inner.observe_exit()?;
        let init = inner.init.as_ref();
        SnapshotBuilder::new(&self.id, inner.status, self.created_at)
            .identity(init.map(InitSupervisor::identity))
            .cgroup_paths(self.cgroup.paths())
            .namespaces(&self.config.namespaces)
            .external_descriptors(
                init.map(|init| init.external_descriptors().to_vec())
                    .unwrap_or_default(),
            )
            .build()
    }

    /// Writes [`Container::state`] to `dir`.
    ///
    /// # Errors
    ///
    /// Returns the snapshot error or the write error.
    pub fn save_state(&self, dir: &Path) -> Result<PathBuf> {
        crate::state::save(dir, &self.state()?)
    }
}
