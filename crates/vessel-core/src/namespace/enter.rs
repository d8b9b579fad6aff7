//! Entering namespaces from a freshly forked child.
//!
//! Join paths are opened in the parent, before `fork(2)`, so the child only
//! issues `setns(2)` and `unshare(2)` on descriptors it already holds.
//!
//! `unshare(CLONE_NEWPID)` only moves the *children* of the caller into the
//! new PID namespace. A launcher that needs its init process to be PID 1
//! must fork once more after [`PreparedNamespaces::enter`].

use std::fs::File;
use std::os::fd::{AsFd, OwnedFd};

use nix::sched::{CloneFlags, setns, unshare};
use vessel_common::error::{Result, VesselError};

use super::{NamespaceSet, NamespaceType};

/// Namespaces resolved in the parent, ready to be entered by the child.
#[derive(Debug)]
pub struct PreparedNamespaces {
    joins: Vec<(NamespaceType, OwnedFd)>,
    create: CloneFlags,
}

impl PreparedNamespaces {
    /// Opens every join path and collects the flags of namespaces to create.
    ///
    /// # Errors
    ///
    /// Returns [`VesselError::Io`] if a join path cannot be opened.
    pub fn prepare(set: &NamespaceSet) -> Result<Self> {
        let mut joins = Vec::new();
        let mut create = CloneFlags::empty();
        // user namespace first: it governs permission to join the others
        for kind in NamespaceType::ALL {
            let Some(ns) = set.get(kind) else { continue };
            match &ns.path {
                Some(path) => {
                    let file = File::open(path).map_err(|e| VesselError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    joins.push((kind, OwnedFd::from(file)));
                }
                None => create |= kind.clone_flag(),
            }
        }
        tracing::debug!(joins = joins.len(), create = ?create, "namespaces prepared");
        Ok(Self { joins, create })
    }

    /// Flags of the namespaces that will be created.
    #[must_use]
    pub const fn create_flags(&self) -> CloneFlags {
        self.create
    }

    /// Whether entering would change nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.joins.is_empty() && self.create.is_empty()
    }

    /// Joins the prepared namespaces, then unshares the ones to create.
    ///
    /// Intended to run in the child between `fork(2)` and `execve(2)`; it
    /// neither allocates nor logs.
    ///
    /// # Errors
    ///
    /// Returns the `errno` of the first failing `setns(2)` or `unshare(2)`.
    pub fn enter(&self) -> nix::Result<()> {
        for (kind, fd) in &self.joins {
            setns(fd.as_fd(), kind.clone_flag())?;
        }
        if !self.create.is_empty() {
            unshare(self.create)?;
        }
        Ok(())
    }
}
