//! Fixed-point Q-format conversion helpers.
//!
//! Processing runs on Q1.31 words; these helpers move samples between the
//! container formats and that internal domain.

use super::intrinsics::{sat_int16, sat_int24};
use crate::format::FrameFormat;

/// Shift `x` from Q`src_q` to Q`dst_q` with round-half-up.
///
/// Requires `src_q > dst_q`.
#[inline(always)]
pub fn q_shift_rnd(x: i64, src_q: u32, dst_q: u32) -> i64 {
    ((x >> (src_q - dst_q - 1)) + 1) >> 1
}

/// Widen a container sample of `fmt` to Q1.31.
#[inline(always)]
pub fn to_q31(fmt: FrameFormat, sample: i32) -> i32 {
    match fmt {
        FrameFormat::S16Le => sample << 16,
        FrameFormat::S24In32Le => sample << 8,
        FrameFormat::S32Le => sample,
    }
}

/// Narrow a Q1.31 value to a container sample of `fmt`, rounding and saturating.
#[inline(always)]
pub fn from_q31(fmt: FrameFormat, x: i32) -> i32 {
    match fmt {
        FrameFormat::S16Le => sat_int16(q_shift_rnd(x as i64, 31, 15)) as i32,
        FrameFormat::S24In32Le => sat_int24(q_shift_rnd(x as i64, 31, 23)),
        FrameFormat::S32Le => x,
    }
}
