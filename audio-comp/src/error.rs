//! Error taxonomy shared by every component.

use thiserror::Error;

use crate::component::{ComponentState, Trigger};

/// Errors returned by component operations.
///
/// Running out of input or output space during `copy` is not an error; see
/// [`CopyStatus::NoProgress`](crate::component::CopyStatus::NoProgress).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Out-of-range count, malformed or oversized blob, bad format.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An allocation sized from configuration data failed.
    #[error("allocation of {bytes} bytes failed")]
    ResourceExhausted { bytes: usize },

    /// Configuration replacement attempted while the component is not READY.
    #[error("component busy")]
    Busy,

    /// No processing function exists for the requested combination.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// The trigger is not legal from the current state.
    #[error("trigger {trigger:?} not allowed in state {state:?}")]
    InvalidState {
        state: ComponentState,
        trigger: Trigger,
    },
}

/// Result type for component operations.
pub type Result<T> = core::result::Result<T, Error>;
