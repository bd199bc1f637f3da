//! Ring buffers linking components and the per-period copy budget.

pub mod copy_limits;
pub mod ring;

pub use copy_limits::{frames_processable, CopyLimits};
pub use ring::AudioBuffer;
