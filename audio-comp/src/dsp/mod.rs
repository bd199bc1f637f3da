//! Fixed-point DSP primitives shared by the processing engines.

pub mod helpers;
pub mod intrinsics;
