//! # vessel-core
//!
//! Low-level Linux primitives for the Vessel runtime.
//!
//! This crate provides safe abstractions over:
//! - **procfs**: robust `/proc/<pid>/stat` parsing and PID + start-time
//!   process identity, so a recycled PID is never mistaken for the
//!   process it replaced.
//! - **Cgroups**: the [`cgroup::CgroupManager`] capability trait and a
//!   cgroups v2 backend for CPU, memory, pids, I/O, and the freezer.
//! - **Namespaces**: namespace sets, `/proc/<pid>/ns/*` path derivation,
//!   and `setns(2)`/`unshare(2)` entry for newly spawned processes.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod namespace;
pub mod proc;
