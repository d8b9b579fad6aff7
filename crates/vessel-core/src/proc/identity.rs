//! PID + start-time process identity.
//!
//! The kernel recycles PIDs, so a bare PID says nothing about *which*
//! process it names. A [`ProcessIdentity`] pairs the PID with the start time
//! the kernel recorded for it. Before acting on the process the caller
//! re-reads the start time and refuses to act if it changed.
//!
//! The read and the subsequent action are two steps, so a window remains in
//! which the process can exit and its PID be handed out again. The window
//! is one small file read wide. Callers that are the process' parent close
//! it entirely by not reaping the child between verification and action.

use std::fmt;

use serde::{Deserialize, Serialize};
use vessel_common::error::{Result, VesselError};

use super::ProcFs;
use super::stat::Stat;

/// Opaque start-time fingerprint (`starttime` field of `stat`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StartTime(String);

impl StartTime {
    /// Wraps a fingerprint value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the fingerprint text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A process pinned by PID and start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessIdentity {
    pid: u32,
    start_time: StartTime,
}

impl ProcessIdentity {
    /// Builds an identity from known values.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::InvalidState`] for PID 0.
    pub fn new(pid: u32, start_time: StartTime) -> Result<Self> {
        if pid == 0 {
            return Err(VesselError::InvalidState {
                message: "process identity requires a positive pid".into(),
            });
        }
        Ok(Self { pid, start_time })
    }

    /// Records the identity of the process currently holding `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::ProcessNotFound`] if no such process exists
    /// and [`VesselError::Parse`] if its `stat` line is malformed.
    pub fn capture(procfs: &ProcFs, pid: u32) -> Result<Self> {
        let stat = procfs.stat(pid)?;
        tracing::debug!(pid, start_time = %stat.start_time, comm = %stat.comm, "captured process identity");
        Self::new(pid, StartTime(stat.start_time))
    }

    /// The process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// The start-time fingerprint.
    #[must_use]
    pub const fn start_time(&self) -> &StartTime {
        &self.start_time
    }

    /// Re-reads `stat` for the PID and checks it still names this process.
    ///
    /// Returns the fresh `stat` so callers can inspect the run state
    /// without a second read.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::ProcessNotFound`] if the PID no longer
    /// resolves or now carries a different start time.
    pub fn current(&self, procfs: &ProcFs) -> Result<Stat> {
        let stat = procfs.stat(self.pid)?;
        if stat.start_time != self.start_time.as_str() {
            tracing::warn!(
                pid = self.pid,
                expected = %self.start_time,
                found = %stat.start_time,
                "pid has been reused by another process"
            );
            return Err(VesselError::ProcessNotFound { pid: self.pid });
        }
        Ok(stat)
    }

    /// Checks that the PID still names this process.
    ///
    /// # Errors
    ///
    /// Same as [`ProcessIdentity::current`].
    pub fn verify(&self, procfs: &ProcFs) -> Result<()> {
        self.current(procfs).map(|_| ())
    }

    /// Whether this exact process exists and has not exited.
    ///
    /// A zombie still matches the identity but counts as not running.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::Parse`] or [`VesselError::Io`] for reads that
    /// fail for reasons other than the process being gone.
    pub fn is_running(&self, procfs: &ProcFs) -> Result<bool> {
        match self.current(procfs) {
            Ok(stat) => Ok(stat.state.is_alive()),
            Err(VesselError::ProcessNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pid, self.start_time)
    }
}
