//! Access to kernel process metadata under procfs.
//!
//! All reads go through [`ProcFs`], whose root defaults to `/proc` but can
//! point at any directory laid out the same way. Tests use that to stage
//! fake `stat` files.

pub mod identity;
pub mod stat;

use std::io;
use std::path::{Path, PathBuf};

use vessel_common::error::{Result, VesselError};

pub use identity::{ProcessIdentity, StartTime};
pub use stat::{ProcState, Stat};

/// Handle to a procfs mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(vessel_common::constants::PROC_ROOT)
    }
}

impl ProcFs {
    /// Creates a handle rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the mount point this handle reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the `stat` file for `pid`.
    #[must_use]
    pub fn stat_path(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string()).join("stat")
    }

    /// Reads the raw `stat` line for `pid`.
    ///
    /// Invalid UTF-8 in the process name is replaced, see
    /// [`stat::decode_line`].
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::ProcessNotFound`] if the PID does not resolve
    /// to a process, or [`VesselError::Io`] for any other read failure.
    pub fn read_stat(&self, pid: u32) -> Result<String> {
        let path = self.stat_path(pid);
        let raw = std::fs::read(&path).map_err(|e| map_read_error(pid, path, e))?;
        Ok(stat::decode_line(&raw))
    }

    /// Reads and parses the `stat` line for `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::ProcessNotFound`] for a vanished process and
    /// [`VesselError::Parse`] for a malformed or truncated line.
    pub fn stat(&self, pid: u32) -> Result<Stat> {
        stat::parse_stat(&self.read_stat(pid)?)
    }

    /// Resolves the target of file descriptor `fd` of `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::ProcessNotFound`] if the process is gone, or
    /// [`VesselError::Io`] if the link cannot be read.
    pub fn fd_target(&self, pid: u32, fd: u32) -> Result<PathBuf> {
        let path = self.root.join(pid.to_string()).join("fd").join(fd.to_string());
        std::fs::read_link(&path).map_err(|e| map_read_error(pid, path, e))
    }
}

/// Missing entries and `ESRCH` both mean the process went away mid-read.
fn map_read_error(pid: u32, path: PathBuf, source: io::Error) -> VesselError {
    if source.kind() == io::ErrorKind::NotFound
        || source.raw_os_error() == Some(nix::errno::Errno::ESRCH as i32)
    {
        VesselError::ProcessNotFound { pid }
    } else {
        VesselError::Io { path, source }
    }
}
