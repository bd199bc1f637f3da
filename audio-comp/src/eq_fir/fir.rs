//! 32x16 FIR core: Q1.31 samples, Q1.15 taps, 64-bit accumulation.

use crate::buffer::AudioBuffer;
use crate::dsp::helpers::{from_q31, q_shift_rnd, to_q31};
use crate::dsp::intrinsics::sat_int32;
use crate::format::FrameFormat;

use super::config::FirState;

/// Per-channel filter: where its taps and delay line live.
///
/// A zero `length` channel is bypassed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirChannel {
    pub length: usize,
    pub out_shift: u32,
    /// Word offset of the first tap in the coefficient table.
    pub coef: usize,
    /// Offset of the delay line in the arena.
    pub delay: usize,
    /// Write index inside the delay line.
    pub rwi: usize,
}

impl FirChannel {
    pub fn is_bypass(&self) -> bool {
        self.length == 0
    }

    #[inline]
    fn prev(&self, i: usize) -> usize {
        if i == 0 {
            self.length - 1
        } else {
            i - 1
        }
    }

    #[inline]
    fn next(&self, i: usize) -> usize {
        if i + 1 == self.length {
            0
        } else {
            i + 1
        }
    }

    #[inline]
    fn output(&self, acc: i64) -> i32 {
        sat_int32(q_shift_rnd(acc, 46 + self.out_shift, 31))
    }
}

/// Filter one Q1.31 sample.
#[inline]
pub fn fir_32x16(fir: &mut FirChannel, coefs: &[i16], delay: &mut [i32], x: i32) -> i32 {
    if fir.is_bypass() {
        return x;
    }
    let taps = &coefs[fir.coef..fir.coef + fir.length];
    let line = &mut delay[fir.delay..fir.delay + fir.length];

    line[fir.rwi] = x;
    let mut r = fir.rwi;
    let mut acc: i64 = 0;
    for &c in taps {
        acc += c as i64 * line[r] as i64;
        r = fir.prev(r);
    }
    fir.rwi = fir.next(fir.rwi);
    fir.output(acc)
}

/// Filter two consecutive Q1.31 samples in one pass over the taps.
///
/// Bit-identical to two [`fir_32x16`] calls.
#[inline]
pub fn fir_32x16_2x(
    fir: &mut FirChannel,
    coefs: &[i16],
    delay: &mut [i32],
    x0: i32,
    x1: i32,
) -> (i32, i32) {
    if fir.is_bypass() {
        return (x0, x1);
    }
    let len = fir.length;
    let taps = &coefs[fir.coef..fir.coef + len];
    let p0 = fir.rwi;
    let p1 = fir.next(p0);
    let line = &mut delay[fir.delay..fir.delay + len];

    // x1 overwrites the sample y0 still needs for its last tap
    let oldest = line[p1];
    line[p0] = x0;
    line[p1] = x1;

    let mut acc0: i64 = 0;
    let mut acc1: i64 = 0;
    let mut r = p1;
    for k in 0..len {
        let s = line[r] as i64;
        acc1 += taps[k] as i64 * s;
        if k > 0 {
            acc0 += taps[k - 1] as i64 * s;
        }
        r = fir.prev(r);
    }
    acc0 += taps[len - 1] as i64 * oldest as i64;

    fir.rwi = fir.next(p1);
    (fir.output(acc0), fir.output(acc1))
}

/// Processing function selected at `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirFunc {
    /// 16-bit copy, no blob.
    Passthrough16,
    /// 32-bit container copy, no blob.
    Passthrough32,
    /// Configured filtering of the given format.
    Filter(FrameFormat),
}

impl FirFunc {
    /// Configured function for `fmt`.
    pub fn configured(fmt: FrameFormat) -> Self {
        log::debug!("set_fir_func(): {:?}", fmt);
        FirFunc::Filter(fmt)
    }

    /// Pass-through function for `fmt`.
    pub fn passthrough(fmt: FrameFormat) -> Self {
        log::debug!("set_pass_func(): {:?}", fmt);
        match fmt {
            FrameFormat::S16Le => FirFunc::Passthrough16,
            FrameFormat::S24In32Le | FrameFormat::S32Le => FirFunc::Passthrough32,
        }
    }

    /// General path, any frame count.
    pub fn run(
        self,
        state: Option<&mut FirState>,
        source: &AudioBuffer,
        sink: &mut AudioBuffer,
        frames: usize,
        nch: usize,
    ) {
        match (self, state) {
            (FirFunc::Filter(fmt), Some(st)) => {
                for f in 0..frames {
                    for ch in 0..nch {
                        let i = f * nch + ch;
                        let x = to_q31(fmt, source.read_sample(i));
                        let y = st.filter(ch, x);
                        sink.write_sample(i, from_q31(fmt, y));
                    }
                }
            }
            (FirFunc::Passthrough16, _) | (FirFunc::Filter(FrameFormat::S16Le), None) => {
                passthrough_s16(source, sink, frames * nch)
            }
            _ => passthrough_s32(source, sink, frames * nch),
        }
    }

    /// Even-count path: two frames per pass. `frames` must be even.
    pub fn run_even(
        self,
        state: Option<&mut FirState>,
        source: &AudioBuffer,
        sink: &mut AudioBuffer,
        frames: usize,
        nch: usize,
    ) {
        match (self, state) {
            (FirFunc::Filter(fmt), Some(st)) => {
                for f in (0..frames).step_by(2) {
                    for ch in 0..nch {
                        let i0 = f * nch + ch;
                        let i1 = i0 + nch;
                        let x0 = to_q31(fmt, source.read_sample(i0));
                        let x1 = to_q31(fmt, source.read_sample(i1));
                        let (y0, y1) = st.filter_2x(ch, x0, x1);
                        sink.write_sample(i0, from_q31(fmt, y0));
                        sink.write_sample(i1, from_q31(fmt, y1));
                    }
                }
            }
            _ => self.run(None, source, sink, frames, nch),
        }
    }
}

fn passthrough_s16(source: &AudioBuffer, sink: &mut AudioBuffer, samples: usize) {
    for i in 0..samples {
        sink.write_frag_s16(i, source.read_frag_s16(i));
    }
}

fn passthrough_s32(source: &AudioBuffer, sink: &mut AudioBuffer, samples: usize) {
    for i in 0..samples {
        sink.write_frag_s32(i, source.read_frag_s32(i));
    }
}
