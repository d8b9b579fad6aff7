//! Unified error types for the Vessel workspace.
//!
//! Every fallible operation in the workspace returns [`VesselError`]. The
//! variants form the taxonomy callers branch on: lifecycle misuse, identity
//! drift, malformed kernel metadata, cgroup backend failures, and timeouts.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ContainerStatus;

/// Reason an operation is not legal in the container's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// `start` on a container that already left `Created`.
    #[error("container already started (state: {state})")]
    AlreadyStarted {
        /// State the container was in.
        state: ContainerStatus,
    },

    /// The operation needs a live init process.
    #[error("container is not running (state: {state})")]
    NotRunning {
        /// State the container was in.
        state: ContainerStatus,
    },

    /// `pause` on a container that is paused or being paused.
    #[error("container is already paused (state: {state})")]
    AlreadyPaused {
        /// State the container was in.
        state: ContainerStatus,
    },

    /// `resume` on a container that is not paused.
    #[error("container is not paused (state: {state})")]
    NotPaused {
        /// State the container was in.
        state: ContainerStatus,
    },

    /// A freeze completed while no pause was in flight.
    #[error("no pause in progress (state: {state})")]
    NotPausing {
        /// State the container was in.
        state: ContainerStatus,
    },

    /// The container has been destroyed.
    #[error("container has been destroyed")]
    Destroyed,
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum VesselError {
    /// The operation is not legal in the container's lifecycle state.
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    /// The tracked process is gone or its PID now belongs to another process.
    #[error("process {pid} not found or no longer the tracked process")]
    ProcessNotFound {
        /// PID that failed verification.
        pid: u32,
    },

    /// Kernel process metadata could not be parsed.
    #[error("parse error: {message}")]
    Parse {
        /// Description of the malformed input.
        message: String,
    },

    /// A cgroup controller operation failed.
    #[error("cgroup {controller} controller: {message}")]
    Cgroup {
        /// Controller that failed (`memory`, `cpu`, `pids`, ...).
        controller: String,
        /// Description of the failure.
        message: String,
    },

    /// A bounded wait exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// Internal bookkeeping is inconsistent with the requested view.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the inconsistency.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A system call failed.
    #[error("{call} failed: {source}")]
    Syscall {
        /// Name of the failing call.
        call: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl VesselError {
    /// Builds a [`VesselError::Cgroup`] for the named controller.
    pub fn cgroup(controller: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cgroup {
            controller: controller.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for "the process is already gone" conditions.
    #[must_use]
    pub const fn is_process_gone(&self) -> bool {
        matches!(self, Self::ProcessNotFound { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, VesselError>;
