//! ARM DSP saturation wrappers with pure-Rust fallbacks.
//!
//! On `thumbv7em` targets (Cortex-M4/M7 with DSP extension) the 16-bit
//! saturation compiles to a single `SSAT`. On other targets (host
//! tests, cores without DSP) equivalent pure-Rust code is used.

/// Signed saturate with arithmetic right shift.
///
/// Computes `saturate(val >> RSHIFT, -(2^(BITS-1))..2^(BITS-1)-1)`.
///
/// Maps to ARM `SSAT`. `BITS` and `RSHIFT` must be compile-time constants
/// because the instruction takes immediate operands.
#[inline(always)]
pub fn signed_saturate_rshift<const BITS: u32, const RSHIFT: u32>(val: i32) -> i32 {
    #[cfg(all(target_arch = "arm", target_feature = "dsp"))]
    {
        let out: i32;
        unsafe {
            core::arch::asm!(
                "ssat {out}, #{bits}, {val}, asr #{rshift}",
                out = out(reg) out,
                val = in(reg) val,
                bits = const BITS,
                rshift = const RSHIFT,
            );
        }
        out
    }
    #[cfg(not(all(target_arch = "arm", target_feature = "dsp")))]
    {
        let shifted = val >> RSHIFT;
        let max = (1i32 << (BITS - 1)) - 1;
        let min = -(1i32 << (BITS - 1));
        shifted.clamp(min, max)
    }
}

/// Saturate an `i32` to `i16` range. Maps to ARM `SSAT #16`.
#[inline(always)]
pub fn saturate16(val: i32) -> i16 {
    signed_saturate_rshift::<16, 0>(val) as i16
}

/// Saturate a 64-bit accumulator to `i16` range.
#[inline(always)]
pub fn sat_int16(val: i64) -> i16 {
    val.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Saturate a 64-bit accumulator to the signed 24-bit range.
#[inline(always)]
pub fn sat_int24(val: i64) -> i32 {
    val.clamp(-(1i64 << 23), (1i64 << 23) - 1) as i32
}

/// Saturate a 64-bit accumulator to `i32` range.
#[inline(always)]
pub fn sat_int32(val: i64) -> i32 {
    val.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
