//! Conversion-mode table and buffer sizing.
//!
//! Every supported `(source, sink)` rate pair maps to two stage descriptors.
//! A stage with `filter_length == 1` is a pass-through, and a stage with
//! `filter_length == 0` marks a rate pair that has no coefficients.

use crate::constants::{MAX_CHANNELS, SRC_RATES};
use crate::error::{Error, Result};

const NUM_FS: usize = SRC_RATES.len();

/// Block geometry of one polyphase stage.
///
/// A stage consumes `blk_in` frames and produces `blk_out` frames per block,
/// with `num_of_subfilters` phases of `subfilter_length` taps each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDesc {
    pub blk_in: usize,
    pub blk_out: usize,
    pub num_of_subfilters: usize,
    pub subfilter_length: usize,
    pub filter_length: usize,
    /// Input delay multiplier: frames between the windows of adjacent phases.
    pub idm: usize,
    /// Output delay multiplier: frames between adjacent phase outputs.
    pub odm: usize,
}

impl StageDesc {
    /// FIR delay line length in frames.
    pub const fn fir_delay_length(&self) -> usize {
        self.subfilter_length + (self.num_of_subfilters - 1) * self.idm + self.blk_in
    }

    /// Output delay line length in frames.
    pub const fn out_delay_length(&self) -> usize {
        1 + (self.num_of_subfilters - 1) * self.odm
    }
}

const IDENTITY: StageDesc = StageDesc {
    blk_in: 1,
    blk_out: 1,
    num_of_subfilters: 1,
    subfilter_length: 1,
    filter_length: 1,
    idm: 1,
    odm: 1,
};

const DELETED: StageDesc = StageDesc {
    blk_in: 0,
    blk_out: 0,
    num_of_subfilters: 0,
    subfilter_length: 0,
    filter_length: 0,
    idm: 0,
    odm: 0,
};

const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Stage interpolating by `l` and decimating by `m`.
///
/// The prototype spans about eight periods of the narrower band edge, and
/// every subfilter is padded to a multiple of four taps.
const fn stage(l: usize, m: usize) -> StageDesc {
    let widest = if l > m { l } else { m };
    let taps = (8 * widest + l - 1) / l;
    let subfilter_length = (taps + 3) / 4 * 4;
    StageDesc {
        blk_in: m,
        blk_out: l,
        num_of_subfilters: l,
        subfilter_length,
        filter_length: l * subfilter_length,
        idm: (m + l - 1) / l,
        odm: 1,
    }
}

const fn stages_for(fs_in: usize, fs_out: usize) -> (StageDesc, StageDesc) {
    if fs_in == fs_out {
        return (IDENTITY, IDENTITY);
    }
    match (fs_in, fs_out) {
        (44100, 48000) => (stage(8, 7), stage(20, 21)),
        (48000, 44100) => (stage(7, 8), stage(21, 20)),
        (44100, _) | (_, 44100) => (DELETED, DELETED),
        (8000, 48000) => (stage(2, 1), stage(3, 1)),
        (48000, 8000) => (stage(1, 2), stage(1, 3)),
        _ => {
            let g = gcd(fs_in, fs_out);
            (stage(fs_out / g, fs_in / g), IDENTITY)
        }
    }
}

const fn build_table() -> [[(StageDesc, StageDesc); NUM_FS]; NUM_FS] {
    let mut table = [[(DELETED, DELETED); NUM_FS]; NUM_FS];
    let mut o = 0;
    while o < NUM_FS {
        let mut i = 0;
        while i < NUM_FS {
            table[o][i] = stages_for(SRC_RATES[i] as usize, SRC_RATES[o] as usize);
            i += 1;
        }
        o += 1;
    }
    table
}

/// Stage pairs indexed `[sink rate][source rate]`.
static SRC_TABLE: [[(StageDesc, StageDesc); NUM_FS]; NUM_FS] = build_table();

/// How a rate pair is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcMode {
    /// Equal rates: bulk copy.
    Copy,
    /// Second stage degenerate: one polyphase stage.
    SingleStage,
    /// Two cascaded stages through the staging buffer.
    TwoStage,
}

fn find_fs(fs: u32) -> Option<usize> {
    SRC_RATES.iter().position(|&r| r == fs)
}

/// Buffer sizes, in samples, for one rate pair and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcParam {
    pub nch: usize,
    pub idx_in: usize,
    pub idx_out: usize,
    pub fir_s1: usize,
    pub out_s1: usize,
    pub fir_s2: usize,
    pub out_s2: usize,
    /// Inter-stage staging ring.
    pub sbuf_length: usize,
    /// Everything the stages need, staging ring included.
    pub total: usize,
}

impl SrcParam {
    /// Size the delay lines for converting `fs_in` to `fs_out`.
    ///
    /// `source_frames` is the source period; the staging ring holds two
    /// periods' worth of stage-1 output.
    pub fn new(fs_in: u32, fs_out: u32, nch: usize, source_frames: usize) -> Result<Self> {
        if nch == 0 || nch > MAX_CHANNELS {
            log::error!("src_buffer_lengths(): nch = {} out of range", nch);
            return Err(Error::InvalidArgument("channel count out of range"));
        }
        let (idx_in, idx_out) = match (find_fs(fs_in), find_fs(fs_out)) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                log::error!(
                    "src_buffer_lengths(): rates not supported, fs_in: {}, fs_out: {}",
                    fs_in,
                    fs_out
                );
                return Err(Error::Unsupported("sample rate"));
            }
        };

        let (stage1, stage2) = &SRC_TABLE[idx_out][idx_in];
        if stage1.filter_length < 1 {
            log::error!(
                "src_buffer_lengths(): no coefficients for fs_in: {}, fs_out: {}",
                fs_in,
                fs_out
            );
            return Err(Error::Unsupported("rate pair"));
        }

        let fir_s1 = nch * stage1.fir_delay_length();
        let out_s1 = nch * stage1.out_delay_length();
        let (fir_s2, out_s2, sbuf_length) = if stage2.filter_length == 1 {
            (0, 0, 0)
        } else {
            // stage 1 repeats just past one period; keep room for two, and
            // never less than one block of each stage
            let r1 = source_frames / stage1.blk_in + 1;
            let sbuf_frames = (2 * stage1.blk_out * r1).max(stage1.blk_out + stage2.blk_in);
            (
                nch * stage2.fir_delay_length(),
                nch * stage2.out_delay_length(),
                nch * sbuf_frames,
            )
        };

        Ok(SrcParam {
            nch,
            idx_in,
            idx_out,
            fir_s1,
            out_s1,
            fir_s2,
            out_s2,
            sbuf_length,
            total: sbuf_length + fir_s1 + out_s1 + fir_s2 + out_s2,
        })
    }

    pub fn stage1(&self) -> &'static StageDesc {
        &SRC_TABLE[self.idx_out][self.idx_in].0
    }

    pub fn stage2(&self) -> &'static StageDesc {
        &SRC_TABLE[self.idx_out][self.idx_in].1
    }

    pub fn mode(&self) -> SrcMode {
        if self.idx_in == self.idx_out {
            SrcMode::Copy
        } else if self.stage2().filter_length == 1 {
            SrcMode::SingleStage
        } else {
            SrcMode::TwoStage
        }
    }
}
