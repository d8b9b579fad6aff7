//! Global configuration model for the Vessel runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, VesselError};

/// Root configuration for the Vessel runtime.
///
/// Every field has a default, so a partial JSON document (or none at all)
/// yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Mount point of procfs.
    pub proc_root: PathBuf,
    /// Mount point of the cgroup v2 unified hierarchy.
    pub cgroup_root: PathBuf,
    /// Parent cgroup, relative to `cgroup_root`, for container scopes.
    pub cgroup_parent: String,
    /// Grace period after `SIGTERM` before escalating to `SIGKILL`.
    pub stop_timeout_ms: u64,
    /// Deadline for the init process to die after `SIGKILL`.
    pub kill_timeout_ms: u64,
    /// Sleep between non-blocking exit checks.
    pub poll_interval_ms: u64,
    /// Number of `cgroup.events` polls before a freeze times out.
    pub freeze_retries: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(constants::PROC_ROOT),
            cgroup_root: PathBuf::from(constants::CGROUP_V2_PATH),
            cgroup_parent: constants::DEFAULT_CGROUP_PARENT.to_string(),
            stop_timeout_ms: constants::DEFAULT_STOP_TIMEOUT_MS,
            kill_timeout_ms: constants::DEFAULT_KILL_TIMEOUT_MS,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            freeze_retries: constants::DEFAULT_FREEZE_RETRIES,
        }
    }
}

impl RuntimeConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// holds values rejected by [`RuntimeConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| VesselError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the timing values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::Config`] for a zero poll interval or zero
    /// freeze retries, both of which would turn bounded waits into spins.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(VesselError::Config {
                message: "poll_interval_ms must be greater than zero".into(),
            });
        }
        if self.freeze_retries == 0 {
            return Err(VesselError::Config {
                message: "freeze_retries must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Grace period for a graceful stop.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Deadline after `SIGKILL`.
    #[must_use]
    pub const fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    /// Sleep between exit polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
