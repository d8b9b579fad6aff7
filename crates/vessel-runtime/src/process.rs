//! Init process supervision.
//!
//! A [`ProcessLauncher`] turns a [`ProcessSpec`] into a running
//! [`InitProcess`]. The [`InitSupervisor`] wraps that process together with
//! the [`ProcessIdentity`] captured right after launch, and routes every
//! signal through an identity check so a recycled PID is never signalled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use vessel_common::error::{Result, VesselError};
use vessel_core::namespace::NamespaceSet;
use vessel_core::proc::{ProcFs, ProcessIdentity};

/// What to execute as the container's init process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program and arguments. The first element is resolved through `PATH`.
    pub args: Vec<String>,
    /// Environment variables added to the process.
    pub env: Vec<(String, String)>,
    /// Start from an empty environment instead of inheriting ours.
    pub clear_env: bool,
    /// Working directory.
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    /// A spec running `args` with the inherited environment.
    #[must_use]
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// How the init process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Returned from `main` or called `exit` with this code.
    Exited(i32),
    /// Killed by a signal.
    Signaled(Signal),
}

impl ExitState {
    /// Exit code, if the process exited normally.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(_) => None,
        }
    }

    /// Whether the process exited with code 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// A launched process the runtime is the parent of.
pub trait InitProcess: Send + Sync {
    /// Host PID of the process.
    fn pid(&self) -> u32;

    /// Delivers `signal` without any identity check.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::ProcessNotFound`] if the process is gone.
    fn signal(&self, signal: Signal) -> Result<()>;

    /// Reaps the process if it has exited, without blocking.
    ///
    /// Once this returned `Some`, the PID may be reused by the kernel and
    /// the supervisor never calls it again.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be waited on.
    fn try_reap(&self) -> Result<Option<ExitState>>;

    /// Blocks until the process has exited, leaving it unreaped.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be waited on.
    fn wait_exited(&self) -> Result<()>;
}

/// Strategy that spawns init processes.
pub trait ProcessLauncher: Send + Sync {
    /// Starts `spec` inside `namespaces`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or a namespace
    /// cannot be entered.
    fn launch(&self, spec: &ProcessSpec, namespaces: &NamespaceSet) -> Result<Box<dyn InitProcess>>;
}

/// Converts a host PID into the type `nix` expects.
///
/// # Errors
///
/// Returns [`VesselError::InvalidState`] for 0 and values beyond `i32`.
pub fn nix_pid(pid: u32) -> Result<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(VesselError::InvalidState {
            message: format!("pid {pid} is not a valid process id"),
        }),
    }
}

/// Sends `signal` to `pid` with `kill(2)`.
///
/// # Errors
///
/// Returns [`VesselError::ProcessNotFound`] on `ESRCH` and
/// [`VesselError::Syscall`] for any other failure.
pub fn signal_pid(pid: u32, signal: Signal) -> Result<()> {
    match nix::sys::signal::kill(nix_pid(pid)?, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(VesselError::ProcessNotFound { pid }),
        Err(e) => Err(VesselError::Syscall {
            call: "kill",
            source: e.into(),
        }),
    }
}

/// Owner of the container's init process.
pub struct InitSupervisor {
    process: Arc<dyn InitProcess>,
    identity: ProcessIdentity,
    procfs: ProcFs,
    exit: Option<ExitState>,
    external_descriptors: Vec<String>,
}

impl std::fmt::Debug for InitSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitSupervisor")
            .field("identity", &self.identity)
            .field("exit", &self.exit)
            .field("external_descriptors", &self.external_descriptors)
            .finish_non_exhaustive()
    }
}

impl InitSupervisor {
    /// Launches `spec` and takes ownership of the resulting process.
    ///
    /// # Errors
    ///
    /// Returns the launcher's error, or the identity capture error after
    /// killing the process that could not be identified.
    pub fn launch(
        launcher: &dyn ProcessLauncher,
        spec: &ProcessSpec,
        namespaces: &NamespaceSet,
        procfs: ProcFs,
    ) -> Result<Self> {
        let process = launcher.launch(spec, namespaces)?;
        Self::new(process, procfs)
    }

    /// Supervises an already running process.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity of the process cannot be captured.
    /// The process is killed and reaped in that case.
    pub fn new(process: Box<dyn InitProcess>, procfs: ProcFs) -> Result<Self> {
        let pid = process.pid();
        let identity = match ProcessIdentity::capture(&procfs, pid) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!(pid, error = %e, "cannot identify init process, killing it");
                if let Err(kill_err) = process.signal(Signal::SIGKILL) {
                    tracing::warn!(pid, error = %kill_err, "kill after failed identification");
                } else if let Err(wait_err) = process.wait_exited().and_then(|()| process.try_reap()) {
                    tracing::warn!(pid, error = %wait_err, "reap after failed identification");
                }
                return Err(e);
            }
        };
        let external_descriptors = capture_descriptors(&procfs, pid);
        Ok(Self {
            process: Arc::from(process),
            identity,
            procfs,
            exit: None,
            external_descriptors,
        })
    }

    /// Host PID of the init process.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.identity.pid()
    }

    /// Identity captured at launch.
    #[must_use]
    pub const fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    /// How the process ended, once it has been reaped.
    #[must_use]
    pub const fn exit_state(&self) -> Option<ExitState> {
        self.exit
    }

    /// Shared handle for waiting without holding the supervisor.
    pub(crate) fn process(&self) -> Arc<dyn InitProcess> {
        Arc::clone(&self.process)
    }

    /// Delivers `signal` after checking the PID still names our process.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::ProcessNotFound`] if the process was reaped,
    /// vanished, or its PID now carries a different start time. Nothing is
    /// delivered in that case.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        if self.exit.is_some() {
            return Err(VesselError::ProcessNotFound { pid: self.pid() });
        }
        self.identity.verify(&self.procfs)?;
        self.process.signal(signal)?;
        tracing::debug!(pid = self.pid(), %signal, "signal delivered to init process");
        Ok(())
    }

    /// Reaps the process if it has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be waited on.
    pub fn try_reap(&mut self) -> Result<Option<ExitState>> {
        if self.exit.is_none() {
            self.exit = self.process.try_reap()?;
            if let Some(exit) = self.exit {
                tracing::info!(pid = self.pid(), ?exit, "init process exited");
            }
        }
        Ok(self.exit)
    }

    /// Polls [`InitSupervisor::try_reap`] until the process is reaped.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::Timeout`] once `timeout` has elapsed.
    pub fn reap_within(&mut self, timeout: Duration, poll: Duration) -> Result<ExitState> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(exit) = self.try_reap()? {
                return Ok(exit);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(VesselError::Timeout {
                    operation: "reap init process",
                    timeout,
                });
            }
            std::thread::sleep(poll.min(deadline - now));
        }
    }

    /// Sends `SIGKILL` and reaps the process.
    ///
    /// A process that is already gone counts as killed.
    ///
    /// # Errors
    ///
    /// Returns a signal error other than "gone", or
    /// [`VesselError::Timeout`] if the process is not reaped in time.
    pub fn kill(&mut self, timeout: Duration, poll: Duration) -> Result<ExitState> {
        match self.signal(Signal::SIGKILL) {
            Ok(()) => {}
            Err(e) if e.is_process_gone() => {}
            Err(e) => return Err(e),
        }
        self.reap_within(timeout, poll)
    }

    /// Whether the process is still running.
    ///
    /// # Errors
    ///
    /// Returns an error if procfs cannot be read.
    pub fn is_alive(&self) -> Result<bool> {
        if self.exit.is_some() {
            return Ok(false);
        }
        self.identity.is_running(&self.procfs)
    }

    /// Targets of the init process' stdio descriptors at launch.
    #[must_use]
    pub fn external_descriptors(&self) -> &[String] {
        &self.external_descriptors
    }

    /// Replaces the recorded stdio descriptor targets.
    pub fn set_external_descriptors(&mut self, descriptors: Vec<String>) {
        self.external_descriptors = descriptors;
    }
}

/// Records where fds 0-2 of `pid` point. Unreadable links are skipped.
fn capture_descriptors(procfs: &ProcFs, pid: u32) -> Vec<String> {
    (0..3)
        .filter_map(|fd| match procfs.fd_target(pid, fd) {
            Ok(target) => Some(target.display().to_string()),
            Err(e) => {
                tracing::debug!(pid, fd, error = %e, "stdio descriptor not recorded");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeProcess {
        signals: Mutex<Vec<Signal>>,
        exit: Mutex<Option<ExitState>>,
    }

    impl InitProcess for Arc<FakeProcess> {
        fn pid(&self) -> u32 {
            300
        }

        fn signal(&self, signal: Signal) -> Result<()> {
            self.signals.lock().unwrap().push(signal);
            if signal == Signal::SIGKILL {
                *self.exit.lock().unwrap() = Some(ExitState::Signaled(signal));
            }
            Ok(())
        }

        fn try_reap(&self) -> Result<Option<ExitState>> {
            Ok(*self.exit.lock().unwrap())
        }

        fn wait_exited(&self) -> Result<()> {
            Ok(())
        }
    }

    fn stage(root: &Path, start_time: &str) {
        let dir = root.join("300");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("stat"),
            format!("300 (init) S 1 300 300 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 {start_time} 0 0"),
        )
        .unwrap();
    }

    #[test]
    fn signal_is_delivered_while_identity_holds() {
        let dir = tempfile::tempdir().unwrap();
        stage(dir.path(), "77");
        let fake = Arc::new(FakeProcess::default());
        let sup = InitSupervisor::new(Box::new(Arc::clone(&fake)), ProcFs::new(dir.path())).unwrap();

        sup.signal(Signal::SIGUSR1).unwrap();
        assert_eq!(*fake.signals.lock().unwrap(), vec![Signal::SIGUSR1]);
        assert_eq!(sup.identity().start_time().as_str(), "77");
    }

    #[test]
    fn drifted_identity_blocks_signal() {
        let dir = tempfile::tempdir().unwrap();
        stage(dir.path(), "77");
        let fake = Arc::new(FakeProcess::default());
        let sup = InitSupervisor::new(Box::new(Arc::clone(&fake)), ProcFs::new(dir.path())).unwrap();

        stage(dir.path(), "78");
        let err = sup.signal(Signal::SIGTERM).unwrap_err();
        assert!(matches!(err, VesselError::ProcessNotFound { pid: 300 }));
        assert!(fake.signals.lock().unwrap().is_empty());
    }

    #[test]
    fn unidentifiable_process_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeProcess::default());
        let err = InitSupervisor::new(Box::new(Arc::clone(&fake)), ProcFs::new(dir.path())).unwrap_err();
        assert!(err.is_process_gone());
        assert_eq!(*fake.signals.lock().unwrap(), vec![Signal::SIGKILL]);
    }

    #[test]
    fn kill_reaps_and_caches_exit() {
        let dir = tempfile::tempdir().unwrap();
        stage(dir.path(), "77");
        let fake = Arc::new(FakeProcess::default());
        let mut sup =
            InitSupervisor::new(Box::new(Arc::clone(&fake)), ProcFs::new(dir.path())).unwrap();

        let exit = sup
            .kill(Duration::from_millis(50), Duration::from_millis(1))
            .unwrap();
        assert_eq!(exit, ExitState::Signaled(Signal::SIGKILL));
        assert_eq!(sup.exit_state(), Some(exit));
        assert!(!sup.is_alive().unwrap());
        assert!(sup.signal(Signal::SIGTERM).unwrap_err().is_process_gone());
    }

    #[test]
    fn reap_times_out_for_running_process() {
        let dir = tempfile::tempdir().unwrap();
        stage(dir.path(), "77");
        let fake = Arc::new(FakeProcess::default());
        let mut sup = InitSupervisor::new(Box::new(fake), ProcFs::new(dir.path())).unwrap();

        let err = sup
            .reap_within(Duration::from_millis(5), Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, VesselError::Timeout { .. }));
    }

    #[test]
    fn descriptors_can_be_replaced() {
        let dir = tempfile::tempdir().unwrap();
        stage(dir.path(), "77");
        let mut sup =
            InitSupervisor::new(Box::new(Arc::new(FakeProcess::default())), ProcFs::new(dir.path()))
                .unwrap();
        assert!(sup.external_descriptors().is_empty());
        sup.set_external_descriptors(vec!["/dev/null".into(), "pipe:[1]".into()]);
        assert_eq!(sup.external_descriptors(), ["/dev/null", "pipe:[1]"]);
    }

    #[test]
    fn nix_pid_rejects_zero() {
        assert!(nix_pid(0).is_err());
        assert_eq!(nix_pid(12).unwrap(), Pid::from_raw(12));
    }

    #[test]
    fn exit_state_helpers() {
        assert!(ExitState::Exited(0).success());
        assert_eq!(ExitState::Exited(3).code(), Some(3));
        assert_eq!(ExitState::Signaled(Signal::SIGKILL).code(), None);
    }
}
