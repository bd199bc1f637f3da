//! Transposed direct-form II biquad cascade.
//!
//! Coefficients are Q2.30 with the feedback terms stored pre-negated; the
//! per-section gain is Q2.14 followed by a right shift. Sections run in
//! series groups of `biquads_in_series`, and group outputs are summed.

use crate::constants::{EQ_IIR_NBIQUAD_DF2T, IIR_DF2T_NUM_DELAYS};
use crate::dsp::helpers::q_shift_rnd;
use crate::dsp::intrinsics::sat_int32;

/// One biquad section as stored in the blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Biquad {
    pub a2: i32,
    pub a1: i32,
    pub b2: i32,
    pub b1: i32,
    pub b0: i32,
    pub shift: i32,
    pub gain: i32,
}

impl Biquad {
    /// Unity section: `b0 = 1.0`, `gain = 1.0`.
    pub const UNITY: Biquad = Biquad {
        a2: 0,
        a1: 0,
        b2: 0,
        b1: 0,
        b0: 1 << 30,
        shift: 0,
        gain: 1 << 14,
    };

    pub fn to_words(&self) -> [i32; EQ_IIR_NBIQUAD_DF2T] {
        [
            self.a2, self.a1, self.b2, self.b1, self.b0, self.shift, self.gain,
        ]
    }
}

/// Per-channel cascade: where its coefficients and delays live.
///
/// A channel with zero biquads is bypassed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IirChannel {
    pub biquads: usize,
    pub biquads_in_series: usize,
    /// Word offset of the first biquad in the coefficient table.
    pub coef: usize,
    /// Offset of the first delay in the arena.
    pub delay: usize,
}

impl IirChannel {
    pub fn is_bypass(&self) -> bool {
        self.biquads == 0
    }

    /// Delay elements this channel needs.
    pub fn delay_len(&self) -> usize {
        self.biquads * IIR_DF2T_NUM_DELAYS
    }
}

/// Filter one Q1.31 sample through the channel's cascade.
pub fn iir_df2t(iir: &IirChannel, coefs: &[i32], delay: &mut [i64], x: i32) -> i32 {
    if iir.is_bypass() {
        return x;
    }

    let coef = &coefs[iir.coef..iir.coef + iir.biquads * EQ_IIR_NBIQUAD_DF2T];
    let delay = &mut delay[iir.delay..iir.delay + iir.delay_len()];
    let mut out: i32 = 0;
    let mut c = 0;
    let mut d = 0;

    for _ in (0..iir.biquads).step_by(iir.biquads_in_series) {
        let mut input = x;
        for _ in 0..iir.biquads_in_series {
            let q = &coef[c..c + EQ_IIR_NBIQUAD_DF2T];
            let xin = input as i64;

            // a2, a1, b2, b1, b0, shift, gain
            let acc = (q[4] as i64 * xin).saturating_add(delay[d]);
            let tmp = sat_int32(q_shift_rnd(acc, 61, 31)) as i64;
            delay[d] = delay[d + 1]
                .saturating_add(q[3] as i64 * xin)
                .saturating_add(q[1] as i64 * tmp);
            delay[d + 1] = (q[2] as i64 * xin).saturating_add(q[0] as i64 * tmp);

            let acc = q[6] as i64 * tmp;
            input = sat_int32(q_shift_rnd(acc, 45 + q[5] as u32, 31));
            c += EQ_IIR_NBIQUAD_DF2T;
            d += IIR_DF2T_NUM_DELAYS;
        }
        out = sat_int32(out as i64 + input as i64);
    }
    out
}
