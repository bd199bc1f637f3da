//! Polyphase FIR stage: coefficient design and block processing.
//!
//! A stage interpolates by `L` and decimates by `M` in blocks of `M` input
//! and `L` output frames. Samples are Q1.31, coefficients Q2.30.
//!
//! The FIR delay line is a ring of whole frames. Its write index starts at
//! the last frame slot, so the first frame written fills that slot and the
//! second one wraps to slot 0; a frame is never split across the boundary.

use alloc::vec::Vec;

use crate::buffer::AudioBuffer;
use crate::dsp::helpers::{from_q31, q_shift_rnd, to_q31};
use crate::dsp::intrinsics::sat_int32;
use crate::error::{Error, Result};
use crate::format::FrameFormat;

use super::table::StageDesc;

/// Q2.30 one.
const COEF_ONE: f64 = (1u64 << 30) as f64;

/// Fraction of the narrower Nyquist band the prototype passes.
const PASSBAND: f64 = 0.9;

/// Design the polyphase coefficients of `desc`, phase-major:
/// `coefs[phase * subfilter_length + tap]`.
///
/// The prototype is a Blackman-windowed sinc scaled so every phase has
/// roughly unity gain.
pub fn design_coefs(desc: &StageDesc) -> Result<Vec<i32>> {
    let l = desc.num_of_subfilters;
    let k = desc.subfilter_length;
    let n = desc.filter_length;

    let mut coefs = Vec::new();
    coefs
        .try_reserve_exact(n)
        .map_err(|_| Error::ResourceExhausted { bytes: n * 4 })?;

    if n == 1 {
        coefs.push(1 << 30);
        return Ok(coefs);
    }

    let widest = desc.blk_in.max(desc.blk_out) as f64;
    // two-sided cutoff, relative to the interpolated rate
    let fc = PASSBAND / widest;
    let mid = (n - 1) as f64 / 2.0;
    let span = (n - 1) as f64;
    let proto = |i: usize| -> f64 {
        let t = i as f64 - mid;
        let x = core::f64::consts::PI * fc * t;
        let sinc = if libm::fabs(x) < 1e-12 { 1.0 } else { libm::sin(x) / x };
        let w = 2.0 * core::f64::consts::PI * i as f64 / span;
        let blackman = 0.42 - 0.5 * libm::cos(w) + 0.08 * libm::cos(2.0 * w);
        fc * sinc * blackman
    };

    let sum: f64 = (0..n).map(proto).sum();
    let scale = l as f64 / sum * COEF_ONE;
    for phase in 0..l {
        for tap in 0..k {
            let c = libm::round(proto(tap * l + phase) * scale);
            coefs.push(c.clamp(i32::MIN as f64, i32::MAX as f64) as i32);
        }
    }
    Ok(coefs)
}

/// Sequential reader feeding a stage.
pub trait StageInput {
    fn next(&mut self) -> i32;
}

/// Sequential writer a stage drains into.
pub trait StageOutput {
    fn put(&mut self, val: i32);
}

/// Reads samples from a link, starting at its read position.
pub struct BufferReader<'a> {
    buf: &'a AudioBuffer,
    fmt: FrameFormat,
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buf: &'a AudioBuffer) -> Self {
        BufferReader {
            fmt: buf.frame_fmt(),
            buf,
            pos: 0,
        }
    }
}

impl StageInput for BufferReader<'_> {
    #[inline]
    fn next(&mut self) -> i32 {
        let x = to_q31(self.fmt, self.buf.read_sample(self.pos));
        self.pos += 1;
        x
    }
}

/// Writes samples to a link, starting at its write position.
pub struct BufferWriter<'a> {
    buf: &'a mut AudioBuffer,
    fmt: FrameFormat,
    pos: usize,
}

impl<'a> BufferWriter<'a> {
    pub fn new(buf: &'a mut AudioBuffer) -> Self {
        BufferWriter {
            fmt: buf.frame_fmt(),
            buf,
            pos: 0,
        }
    }
}

impl StageOutput for BufferWriter<'_> {
    #[inline]
    fn put(&mut self, val: i32) {
        self.buf.write_sample(self.pos, from_q31(self.fmt, val));
        self.pos += 1;
    }
}

/// Reads Q1.31 samples from a ring slice.
pub struct RingReader<'a> {
    data: &'a [i32],
    pub pos: usize,
}

impl<'a> RingReader<'a> {
    pub fn new(data: &'a [i32], pos: usize) -> Self {
        RingReader { data, pos }
    }
}

impl StageInput for RingReader<'_> {
    #[inline]
    fn next(&mut self) -> i32 {
        let x = self.data[self.pos];
        self.pos += 1;
        if self.pos == self.data.len() {
            self.pos = 0;
        }
        x
    }
}

/// Writes Q1.31 samples into a ring slice.
pub struct RingWriter<'a> {
    data: &'a mut [i32],
    pub pos: usize,
}

impl<'a> RingWriter<'a> {
    pub fn new(data: &'a mut [i32], pos: usize) -> Self {
        RingWriter { data, pos }
    }
}

impl StageOutput for RingWriter<'_> {
    #[inline]
    fn put(&mut self, val: i32) {
        self.data[self.pos] = val;
        self.pos += 1;
        if self.pos == self.data.len() {
            self.pos = 0;
        }
    }
}

/// Run-time state of one stage. Delay lines live in the component arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyphaseStage {
    pub desc: StageDesc,
    coefs: Vec<i32>,
    /// Frame slot the next input frame is written to.
    fir_wp: usize,
    fir_frames: usize,
}

impl PolyphaseStage {
    /// Set up a stage whose FIR delay line holds `fir_samples` samples of
    /// `nch` channels.
    pub fn new(desc: StageDesc, fir_samples: usize, nch: usize) -> Result<Self> {
        if desc.filter_length > 1 && desc.subfilter_length & 0x3 != 0 {
            log::error!(
                "src_init_stages(): subfilter length {} not a multiple of 4",
                desc.subfilter_length
            );
            return Err(Error::InvalidArgument("subfilter length"));
        }
        let fir_frames = fir_samples / nch;
        if fir_frames == 0 {
            return Err(Error::InvalidArgument("empty FIR delay line"));
        }
        Ok(PolyphaseStage {
            coefs: design_coefs(&desc)?,
            desc,
            fir_wp: fir_frames - 1,
            fir_frames,
        })
    }

    pub fn fir_wp(&self) -> usize {
        self.fir_wp
    }

    pub fn coefs(&self) -> &[i32] {
        &self.coefs
    }

    /// Run `times` blocks: read `times * blk_in` frames from `input`, write
    /// `times * blk_out` frames to `output`.
    ///
    /// `fir` and `out` are this stage's delay lines.
    pub fn process<I: StageInput, O: StageOutput>(
        &mut self,
        fir: &mut [i32],
        out: &mut [i32],
        input: &mut I,
        output: &mut O,
        times: usize,
        nch: usize,
    ) {
        let d = &self.desc;
        let k = d.subfilter_length;
        let frames = self.fir_frames;

        for _ in 0..times {
            for _ in 0..d.blk_in {
                let base = self.fir_wp * nch;
                for s in &mut fir[base..base + nch] {
                    *s = input.next();
                }
                self.fir_wp += 1;
                if self.fir_wp == frames {
                    self.fir_wp = 0;
                }
            }
            // newest frame sits just behind the write slot
            let newest = self.fir_wp + frames - 1;

            for i in 0..d.num_of_subfilters {
                let phase = (i * d.blk_in) % d.num_of_subfilters;
                let lag = d.blk_in - 1 - (i * d.blk_in) / d.num_of_subfilters;
                let taps = &self.coefs[phase * k..phase * k + k];
                let y = &mut out[i * d.odm * nch..i * d.odm * nch + nch];
                for (ch, y) in y.iter_mut().enumerate() {
                    let mut acc: i64 = 0;
                    for (t, &c) in taps.iter().enumerate() {
                        let f = (newest - lag - t) % frames;
                        acc += c as i64 * fir[f * nch + ch] as i64;
                    }
                    *y = sat_int32(q_shift_rnd(acc, 61, 31));
                }
            }

            for i in 0..d.num_of_subfilters {
                let base = i * d.odm * nch;
                for &y in &out[base..base + nch] {
                    output.put(y);
                }
            }
        }
    }
}
