//! [`ProcessLauncher`] built on `std::process::Command`.
//!
//! Namespaces are entered from a `pre_exec` hook in the forked child. The
//! launched process is tracked by PID only: `std` never reaps a dropped
//! `Child`, so reaping stays with [`ChildProcess`] and the supervisor.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{Id, WaitPidFlag, WaitStatus, waitid, waitpid};
use vessel_common::error::{Result, VesselError};
use vessel_core::namespace::NamespaceSet;
use vessel_core::namespace::enter::PreparedNamespaces;

use crate::process::{ExitState, InitProcess, ProcessLauncher, ProcessSpec, nix_pid, signal_pid};

/// Spawns the init process as a direct child of the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, spec: &ProcessSpec, namespaces: &NamespaceSet) -> Result<Box<dyn InitProcess>> {
        let (program, args) = spec.args.split_first().ok_or_else(|| VesselError::Config {
            message: "process spec has an empty command".into(),
        })?;

        let mut command = Command::new(program);
        let _ = command.args(args);
        if spec.clear_env {
            let _ = command.env_clear();
        }
        let _ = command.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(cwd) = &spec.cwd {
            let _ = command.current_dir(cwd);
        }

        let prepared = PreparedNamespaces::prepare(namespaces)?;
        if !prepared.is_noop() {
            // SAFETY: the hook runs in the forked child before exec. It only
            // issues setns(2)/unshare(2) on descriptors opened by the parent
            // and does not allocate.
            let _ = unsafe { command.pre_exec(move || prepared.enter().map_err(io::Error::from)) };
        }

        let pid = command
            .spawn()
            .map_err(|e| VesselError::Io {
                path: program.into(),
                source: e,
            })?
            .id();
        tracing::info!(pid, program = %program, namespaces = namespaces.len(), "init process spawned");
        Ok(Box::new(ChildProcess { pid }))
    }
}

/// A child process waited on by PID.
#[derive(Debug)]
pub struct ChildProcess {
    pid: u32,
}

impl ChildProcess {
    /// Adopts a child of the current process.
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self { pid }
    }
}

impl InitProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        signal_pid(self.pid, signal)
    }

    fn try_reap(&self) -> Result<Option<ExitState>> {
        match waitpid(nix_pid(self.pid)?, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Ok(Some(ExitState::Exited(code))),
            Ok(WaitStatus::Signaled(_, signal, _)) => Ok(Some(ExitState::Signaled(signal))),
            Ok(_) | Err(Errno::EINTR) => Ok(None),
            Err(e) => Err(VesselError::Syscall {
                call: "waitpid",
                source: e.into(),
            }),
        }
    }

    fn wait_exited(&self) -> Result<()> {
        let pid = nix_pid(self.pid)?;
        loop {
            match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => {}
                Err(e) => {
                    return Err(VesselError::Syscall {
                        call: "waitid",
                        source: e.into(),
                    });
                }
            }
        }
    }
}
