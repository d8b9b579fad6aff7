//! The container lifecycle as a pure transition function.
//!
//! ```text
//! Created ──start──▶ Running ──pause──▶ Pausing ──frozen──▶ Paused
//!                       ▲                                     │
//!                       └───────────────resume────────────────┘
//!
//! Created | Running | Pausing | Paused ──exit──▶ Stopped
//! any state ──destroy──▶ Destroyed
//! ```

use vessel_common::error::TransitionError;
use vessel_common::types::ContainerStatus;

/// Something that may change the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Launch the init process.
    Start,
    /// Deliver a signal to the init process. Never changes state.
    Signal,
    /// Request a freeze.
    Pause,
    /// The freezer reported all tasks frozen.
    FreezeCompleted,
    /// The freeze request failed.
    FreezeFailed,
    /// Thaw a paused container.
    Resume,
    /// The init process was observed to have exited.
    Exited,
    /// Tear everything down.
    Destroy,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Self; 8] = [
        Self::Start,
        Self::Signal,
        Self::Pause,
        Self::FreezeCompleted,
        Self::FreezeFailed,
        Self::Resume,
        Self::Exited,
        Self::Destroy,
    ];
}

/// Computes the state after applying `op` in `current`.
///
/// # Errors
///
/// Returns the state-specific [`TransitionError`] when `op` is not legal
/// in `current`.
pub const fn transition(
    current: ContainerStatus,
    op: Operation,
) -> Result<ContainerStatus, TransitionError> {
    use ContainerStatus as S;
    use Operation as Op;

    match (current, op) {
        (_, Op::Destroy) => Ok(S::Destroyed),
        (S::Destroyed, _) => Err(TransitionError::Destroyed),

        (S::Created, Op::Start) => Ok(S::Running),
        (state, Op::Start) => Err(TransitionError::AlreadyStarted { state }),

        (state @ (S::Running | S::Pausing | S::Paused), Op::Signal) => Ok(state),
        (state, Op::Signal) => Err(TransitionError::NotRunning { state }),

        (S::Running, Op::Pause) => Ok(S::Pausing),
        (state @ (S::Pausing | S::Paused), Op::Pause) => {
            Err(TransitionError::AlreadyPaused { state })
        }
        (state, Op::Pause) => Err(TransitionError::NotRunning { state }),

        (S::Pausing, Op::FreezeCompleted) => Ok(S::Paused),
        (S::Pausing, Op::FreezeFailed) => Ok(S::Running),
        (state, Op::FreezeCompleted | Op::FreezeFailed) => {
            Err(TransitionError::NotPausing { state })
        }

        (S::Paused, Op::Resume) => Ok(S::Running),
        (state @ (S::Running | S::Pausing), Op::Resume) => {
            Err(TransitionError::NotPaused { state })
        }
        (state, Op::Resume) => Err(TransitionError::NotRunning { state }),

        (_, Op::Exited) => Ok(S::Stopped),
    }
}

/// Operations legal in `state`.
#[must_use]
pub fn allowed_operations(state: ContainerStatus) -> Vec<Operation> {
    Operation::ALL
        .into_iter()
        .filter(|op| transition(state, *op).is_ok())
        .collect()
}
