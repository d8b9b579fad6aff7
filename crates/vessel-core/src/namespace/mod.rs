//! Linux namespace configuration for container isolation.
//!
//! A container owns at most one namespace of each type. Each entry is
//! either created fresh for the init process or joined through an
//! existing reference path (for example a network namespace prepared by
//! another tool). Once the init process runs, every namespace it lives in
//! is reachable under `/proc/<pid>/ns/<name>`.

#[cfg(target_os = "linux")]
pub mod enter;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vessel_common::error::{Result, VesselError};

/// Kind of namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceType {
    /// Process ID space.
    Pid,
    /// Mount table.
    Mount,
    /// Network stack.
    Network,
    /// Hostname and domain name.
    Uts,
    /// System V IPC and POSIX message queues.
    Ipc,
    /// User and group ID mappings.
    User,
}

impl NamespaceType {
    /// Every namespace type, user first so it is joined before the others.
    pub const ALL: [Self; 6] = [
        Self::User,
        Self::Pid,
        Self::Mount,
        Self::Network,
        Self::Uts,
        Self::Ipc,
    ];

    /// File name of this namespace under `/proc/<pid>/ns/`.
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Pid => "pid",
            Self::Mount => "mnt",
            Self::Network => "net",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::User => "user",
        }
    }

    /// The `clone(2)` flag that creates or selects this namespace.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub const fn clone_flag(self) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;

        match self {
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::User => CloneFlags::CLONE_NEWUSER,
        }
    }
}

impl fmt::Display for NamespaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pid => "pid",
            Self::Mount => "mount",
            Self::Network => "network",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// One namespace of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace type.
    #[serde(rename = "type")]
    pub kind: NamespaceType,
    /// Existing namespace to join. `None` creates a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Namespace {
    /// A namespace created fresh for the init process.
    #[must_use]
    pub const fn new(kind: NamespaceType) -> Self {
        Self { kind, path: None }
    }

    /// A namespace joined through an existing reference path.
    #[must_use]
    pub fn joining(kind: NamespaceType, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
        }
    }

    /// Path of this namespace for the process `pid`.
    ///
    /// A joined namespace reports its external path verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::InvalidState`] if the namespace has to be
    /// derived and `pid` is 0.
    pub fn path_for(&self, pid: u32) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => ns_path(pid, self.kind),
        }
    }
}

/// Canonical `/proc/<pid>/ns/<name>` reference for a namespace of `pid`.
///
/// # Errors
///
/// Returns [`VesselError::InvalidState`] for PID 0, which never names a
/// user-space process.
pub fn ns_path(pid: u32, kind: NamespaceType) -> Result<PathBuf> {
    if pid == 0 {
        return Err(VesselError::InvalidState {
            message: format!("cannot derive {kind} namespace path without an init pid"),
        });
    }
    Ok(PathBuf::from(format!("/proc/{pid}/ns/{}", kind.proc_name())))
}

/// The namespaces of one container, at most one per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NamespaceSet {
    entries: Vec<Namespace>,
}

impl NamespaceSet {
    /// Builds a set, rejecting duplicate types.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::Config`] if two entries share a type.
    pub fn new(entries: Vec<Namespace>) -> Result<Self> {
        for (i, ns) in entries.iter().enumerate() {
            if entries[..i].iter().any(|other| other.kind == ns.kind) {
                return Err(VesselError::Config {
                    message: format!("namespace {} configured more than once", ns.kind),
                });
            }
        }
        Ok(Self { entries })
    }

    /// A set that creates every namespace type.
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            entries: NamespaceType::ALL.into_iter().map(Namespace::new).collect(),
        }
    }

    /// Iterates the configured namespaces in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Namespace> {
        self.entries.iter()
    }

    /// Looks up the entry of a given type.
    #[must_use]
    pub fn get(&self, kind: NamespaceType) -> Option<&Namespace> {
        self.entries.iter().find(|ns| ns.kind == kind)
    }

    /// Whether a namespace of this type is configured.
    #[must_use]
    pub fn contains(&self, kind: NamespaceType) -> bool {
        self.get(kind).is_some()
    }

    /// Number of configured namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no namespace is configured (the process shares the host's).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves every configured namespace to its path for `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::InvalidState`] if a path has to be derived
    /// and `pid` is 0.
    pub fn paths_for(&self, pid: u32) -> Result<BTreeMap<NamespaceType, PathBuf>> {
        self.entries
            .iter()
            .map(|ns| Ok((ns.kind, ns.path_for(pid)?)))
            .collect()
    }
}

impl<'de> Deserialize<'de> for NamespaceSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries = Vec::<Namespace>::deserialize(deserializer)?;
        Self::new(entries).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_names_follow_kernel_layout() {
        let names: Vec<_> = [
            NamespaceType::Mount,
            NamespaceType::Pid,
            NamespaceType::Network,
            NamespaceType::Uts,
            NamespaceType::Ipc,
            NamespaceType::User,
        ]
        .iter()
        .map(|t| t.proc_name())
        .collect();
        assert_eq!(names, ["mnt", "pid", "net", "uts", "ipc", "user"]);
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let err = NamespaceSet::new(vec![
            Namespace::new(NamespaceType::Network),
            Namespace::joining(NamespaceType::Network, "/run/netns/a"),
        ])
        .unwrap_err();
        assert!(matches!(err, VesselError::Config { .. }));
    }

    #[test]
    fn joined_path_is_verbatim_and_others_derived() {
        let set = NamespaceSet::new(vec![
            Namespace::new(NamespaceType::Mount),
            Namespace::joining(NamespaceType::Network, "/networks/fd"),
        ])
        .unwrap();
        let paths = set.paths_for(42).unwrap();
        assert_eq!(paths[&NamespaceType::Network], PathBuf::from("/networks/fd"));
        assert_eq!(paths[&NamespaceType::Mount], PathBuf::from("/proc/42/ns/mnt"));
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn derived_path_without_pid_is_invalid_state() {
        let err = ns_path(0, NamespaceType::Uts).unwrap_err();
        assert!(matches!(err, VesselError::InvalidState { .. }));
        // a joined namespace needs no pid
        let joined = Namespace::joining(NamespaceType::Uts, "/run/uts");
        assert_eq!(joined.path_for(0).unwrap(), PathBuf::from("/run/uts"));
    }

    #[test]
    fn isolated_set_covers_every_type() {
        let set = NamespaceSet::isolated();
        assert_eq!(set.len(), 6);
        assert!(NamespaceType::ALL.iter().all(|t| set.contains(*t)));
    }

    #[test]
    fn deserialize_validates_uniqueness() {
        let ok: NamespaceSet =
            serde_json::from_str(r#"[{"type":"pid"},{"type":"network","path":"/networks/fd"}]"#)
                .unwrap();
        assert_eq!(
            ok.get(NamespaceType::Network).unwrap().path,
            Some(PathBuf::from("/networks/fd"))
        );
        assert!(serde_json::from_str::<NamespaceSet>(r#"[{"type":"pid"},{"type":"pid"}]"#).is_err());
    }
}
