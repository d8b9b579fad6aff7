//! Container lifecycle management for the Vessel runtime.
//!
//! [`container::Container`] is the entry point. It drives the lifecycle
//! state machine in [`lifecycle`], supervises the init process through
//! [`process::InitSupervisor`], and aggregates cgroup data into
//! [`stats::Stats`] and [`snapshot::StateSnapshot`] values.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
#[cfg(target_os = "linux")]
pub mod launcher;
pub mod lifecycle;
pub mod process;
pub mod snapshot;
pub mod state;
pub mod stats;
