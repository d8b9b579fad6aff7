//! The cgroups v2 freezer (`cgroup.freeze` / `cgroup.events`).

use std::path::Path;
use std::time::Duration;

use vessel_common::error::{Result, VesselError};
use vessel_common::types::FreezerState;

use super::stats::parse_flat_keyed;
use super::{read_file, read_optional, write_file};

const CONTROLLER: &str = "freezer";

/// Requests `state` and waits until the kernel reports it.
///
/// Freezing is asynchronous: the request lands in `cgroup.freeze`, and
/// `cgroup.events` flips its `frozen` key once every task has stopped.
/// Without `cgroup.events` the request is taken as applied.
///
/// # Errors
///
/// Returns a freezer error if a file cannot be accessed and
/// [`VesselError::Timeout`] if the state is not reached within `retries`
/// polls.
pub fn set_state(cgroup_path: &Path, state: FreezerState, retries: u32, interval: Duration) -> Result<()> {
    let want = match state {
        FreezerState::Frozen => 1,
        FreezerState::Thawed => 0,
    };
    write_file(cgroup_path, "cgroup.freeze", &want.to_string(), CONTROLLER)?;

    for _ in 0..retries {
        let Some(raw) = read_optional(cgroup_path, "cgroup.events", CONTROLLER)? else {
            return Ok(());
        };
        let events = parse_flat_keyed(&raw, "cgroup.events", CONTROLLER)?;
        if events.get("frozen").copied().unwrap_or(0) == want {
            tracing::debug!(path = %cgroup_path.display(), %state, "freezer state reached");
            return Ok(());
        }
        std::thread::sleep(interval);
    }
    Err(VesselError::Timeout {
        operation: "cgroup freeze",
        timeout: interval * retries,
    })
}

/// Reads the requested freezer state.
///
/// # Errors
///
/// Returns a freezer error if `cgroup.freeze` is missing or malformed.
pub fn state(cgroup_path: &Path) -> Result<FreezerState> {
    match read_file(cgroup_path, "cgroup.freeze", CONTROLLER)?.trim() {
        "0" => Ok(FreezerState::Thawed),
        "1" => Ok(FreezerState::Frozen),
        other => Err(VesselError::cgroup(
            CONTROLLER,
            format!("cgroup.freeze: invalid value {other:?}"),
        )),
    }
}
