//! Persistent state management.
//!
//! Writes a container's [`StateSnapshot`] to `<dir>/state.json` so tools
//! that did not create the container can inspect it.

use std::path::{Path, PathBuf};

use vessel_common::constants::STATE_FILENAME;
use vessel_common::error::{Result, VesselError};

use crate::snapshot::StateSnapshot;

/// Path of the state file inside `dir`.
#[must_use]
pub fn state_path(dir: &Path) -> PathBuf {
    dir.join(STATE_FILENAME)
}

/// Persists `snapshot` atomically.
///
/// The JSON is written to a temporary file in `dir` and renamed over the
/// state file, so readers see either the old or the new state.
///
/// # Errors
///
/// Returns an error if `dir` cannot be created or the file cannot be
/// written or renamed.
pub fn save(dir: &Path, snapshot: &StateSnapshot) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| VesselError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = dir.join(format!(".{STATE_FILENAME}.tmp"));
    std::fs::write(&tmp, json).map_err(|e| VesselError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    let path = state_path(dir);
    std::fs::rename(&tmp, &path).map_err(|e| VesselError::Io {
        path: path.clone(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), id = %snapshot.id, "state saved");
    Ok(path)
}

/// Loads the snapshot stored in `dir`.
///
/// Returns `None` if no state has been saved yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load(dir: &Path) -> Result<Option<StateSnapshot>> {
    let path = state_path(dir);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(VesselError::Io { path, source: e }),
    };
    Ok(Some(serde_json::from_slice(&raw)?))
}
