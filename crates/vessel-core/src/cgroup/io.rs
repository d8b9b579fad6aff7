//! I/O resource control via cgroups v2.
//!
//! Manages `io.weight` for proportional block device scheduling.

use std::path::Path;

use vessel_common::error::{Result, VesselError};

use super::write_file;

/// Sets the default I/O weight for a cgroup.
///
/// # Errors
///
/// Returns an error if the weight is outside 1..=10000 or writing to
/// `io.weight` fails.
pub fn set_io_weight(cgroup_path: &Path, weight: u16) -> Result<()> {
    if !(1..=10_000).contains(&weight) {
        return Err(VesselError::cgroup(
            "io",
            format!("io weight {weight} outside 1..=10000"),
        ));
    }
    write_file(cgroup_path, "io.weight", &format!("default {weight}"), "io")
}
