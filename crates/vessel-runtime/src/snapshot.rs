//! Point-in-time view of a container.
//!
//! A [`StateSnapshot`] is a plain value. It is already stale when returned:
//! the init process may exit and the cgroup may change the instant after
//! the reads that produced it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vessel_common::error::{Result, TransitionError};
use vessel_common::types::{ContainerId, ContainerStatus};
use vessel_core::namespace::{NamespaceSet, NamespaceType};
use vessel_core::proc::{ProcessIdentity, StartTime};

/// Externally visible state of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Container identifier.
    pub id: ContainerId,
    /// Lifecycle state at the time of the snapshot.
    pub status: ContainerStatus,
    /// When the container object was created.
    pub created_at: DateTime<Utc>,
    /// Host PID of the init process.
    pub init_process_pid: u32,
    /// Start-time fingerprint of the init process.
    pub init_process_start_time: StartTime,
    /// Controller name to cgroup path.
    pub cgroup_paths: BTreeMap<String, PathBuf>,
    /// Namespace type to namespace reference path.
    pub namespace_paths: BTreeMap<NamespaceType, PathBuf>,
    /// Targets of the init process' stdio descriptors.
    #[serde(default)]
    pub external_descriptors: Vec<String>,
}

/// Assembles a [`StateSnapshot`] from the container's parts.
#[derive(Debug)]
pub struct SnapshotBuilder<'a> {
    id: &'a ContainerId,
    status: ContainerStatus,
    created_at: DateTime<Utc>,
    identity: Option<&'a ProcessIdentity>,
    cgroup_paths: BTreeMap<String, PathBuf>,
    namespaces: Option<&'a NamespaceSet>,
    external_descriptors: Vec<String>,
}

impl<'a> SnapshotBuilder<'a> {
    /// Starts a snapshot of container `id` in `status`.
    #[must_use]
    pub const fn new(id: &'a ContainerId, status: ContainerStatus, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status,
            created_at,
            identity: None,
            cgroup_paths: BTreeMap::new(),
            namespaces: None,
            external_descriptors: Vec::new(),
        }
    }

    /// Sets the identity of the init process, if one was registered.
    #[must_use]
    pub const fn identity(mut self, identity: Option<&'a ProcessIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the cgroup paths reported by the manager.
    #[must_use]
    pub fn cgroup_paths(mut self, paths: BTreeMap<String, PathBuf>) -> Self {
        self.cgroup_paths = paths;
        self
    }

    /// Sets the configured namespaces.
    #[must_use]
    pub const fn namespaces(mut self, namespaces: &'a NamespaceSet) -> Self {
        self.namespaces = Some(namespaces);
        self
    }

    /// Sets the recorded stdio descriptor targets.
    #[must_use]
    pub fn external_descriptors(mut self, descriptors: Vec<String>) -> Self {
        self.external_descriptors = descriptors;
        self
    }

    /// Builds the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` if no init process was registered, and
    /// `InvalidState` if a namespace path cannot be derived.
    pub fn build(self) -> Result<StateSnapshot> {
        let identity = self
            .identity
            .ok_or(TransitionError::NotRunning { state: self.status })?;
        let namespace_paths = match self.namespaces {
            Some(namespaces) => namespaces.paths_for(identity.pid())?,
            None => BTreeMap::new(),
        };
        Ok(StateSnapshot {
            id: self.id.clone(),
            status: self.status,
            created_at: self.created_at,
            init_process_pid: identity.pid(),
            init_process_start_time: identity.start_time().clone(),
            cgroup_paths: self.cgroup_paths,
            namespace_paths,
            external_descriptors: self.external_descriptors,
        })
    }
}
