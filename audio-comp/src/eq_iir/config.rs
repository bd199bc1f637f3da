//! IIR coefficient blob parsing and delay arena setup.
//!
//! Data area, in `i32` words:
//!
//! ```text
//! assign[channels_in_config]
//! { num_sections, num_sections_in_series, biquad[num_sections] } × number_of_responses
//! ```

use alloc::vec::Vec;
use core::ops::Range;

use crate::blob::{self, BlobHeader};
use crate::constants::{
    EQ_IIR_MAX_RESPONSES, EQ_IIR_NBIQUAD_DF2T, EQ_IIR_NHEADER_DF2T, IIR_DF2T_BIQUADS_MAX,
};
use crate::error::{Error, Result};

use super::iir::{iir_df2t, Biquad, IirChannel};

/// One IIR response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IirResponse {
    pub biquads_in_series: u32,
    pub biquads: Vec<Biquad>,
}

impl IirResponse {
    /// A single series cascade of `biquads`.
    pub fn cascade(biquads: Vec<Biquad>) -> Self {
        IirResponse {
            biquads_in_series: biquads.len() as u32,
            biquads,
        }
    }
}

/// Encode an IIR blob from channel assignments and responses.
pub fn encode_blob(assign: &[i32], responses: &[IirResponse]) -> Vec<u8> {
    let mut data = Vec::new();
    for &a in assign {
        data.extend_from_slice(&a.to_le_bytes());
    }
    for r in responses {
        data.extend_from_slice(&(r.biquads.len() as u32).to_le_bytes());
        data.extend_from_slice(&r.biquads_in_series.to_le_bytes());
        for w in r.biquads.iter().flat_map(|b| b.to_words()) {
            data.extend_from_slice(&w.to_le_bytes());
        }
    }
    blob::assemble(assign.len() as u32, responses.len() as u32, &data)
}

/// Configured cascades for every channel, with their shared delay arena.
#[derive(Debug)]
pub struct IirState {
    words: Vec<i32>,
    channels: Vec<IirChannel>,
    delay: Vec<i64>,
}

impl IirState {
    pub fn setup(config: &[u8], nch: usize) -> Result<Self> {
        let hdr = BlobHeader::parse(config)?;
        log::debug!(
            "eq_iir_setup(): channels_in_config = {}, number_of_responses = {}",
            hdr.channels_in_config,
            hdr.number_of_responses
        );
        hdr.validate(nch, EQ_IIR_MAX_RESPONSES)?;

        let words = blob::words_i32(hdr.data(config));
        let cic = hdr.channels_in_config as usize;
        let responses = hdr.number_of_responses as usize;
        if words.len() < cic {
            log::error!("eq_iir_setup(): assign table exceeds blob");
            return Err(Error::InvalidArgument("assign table exceeds blob"));
        }

        let mut lookup = [0usize; EQ_IIR_MAX_RESPONSES];
        let mut j = cic;
        for slot in lookup.iter_mut().take(responses) {
            if j + EQ_IIR_NHEADER_DF2T > words.len() {
                log::error!("eq_iir_setup(): response header at {} exceeds blob", j);
                return Err(Error::InvalidArgument("response record exceeds blob"));
            }
            log::debug!("eq_iir_setup(): index of response start position = {}", j);
            *slot = j;
            let sections = words[j].max(0) as usize;
            j = j
                .saturating_add(EQ_IIR_NBIQUAD_DF2T.saturating_mul(sections))
                .saturating_add(EQ_IIR_NHEADER_DF2T);
            if j > words.len() {
                log::error!("eq_iir_setup(): response biquads exceed blob");
                return Err(Error::InvalidArgument("response record exceeds blob"));
            }
        }

        let mut channels = Vec::with_capacity(nch);
        let mut size_sum = 0usize;
        for ch in 0..nch {
            let resp = if ch < cic { words[ch] } else { words[0] };
            if resp < 0 {
                channels.push(IirChannel::default());
                continue;
            }
            let resp = resp as usize;
            if resp >= responses {
                log::error!("eq_iir_setup(): ch {} assigned to missing response {}", ch, resp);
                return Err(Error::InvalidArgument("response index out of range"));
            }
            let iir = init_coef(&words, lookup[resp])?;
            size_sum += iir.delay_len();
            channels.push(iir);
            log::debug!("eq_iir_setup(): ch = {} initialized to response = {}", ch, resp);
        }

        if size_sum == 0 {
            return Ok(IirState {
                words,
                channels,
                delay: Vec::new(),
            });
        }

        let mut delay = Vec::new();
        delay.try_reserve_exact(size_sum).map_err(|_| {
            log::error!("eq_iir_setup(): alloc failed, size = {}", size_sum * 8);
            Error::ResourceExhausted { bytes: size_sum * 8 }
        })?;
        delay.resize(size_sum, 0);

        let mut offset = 0;
        for iir in channels.iter_mut().filter(|c| !c.is_bypass()) {
            iir.delay = offset;
            offset += iir.delay_len();
        }

        Ok(IirState {
            words,
            channels,
            delay,
        })
    }

    #[inline]
    pub fn filter(&mut self, ch: usize, x: i32) -> i32 {
        iir_df2t(&self.channels[ch], &self.words, &mut self.delay, x)
    }

    pub fn delay_len(&self) -> usize {
        self.delay.len()
    }

    pub fn delay(&self) -> &[i64] {
        &self.delay
    }

    pub fn channel(&self, ch: usize) -> &IirChannel {
        &self.channels[ch]
    }

    pub fn delay_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.channels
            .iter()
            .filter(|c| !c.is_bypass())
            .map(|c| c.delay..c.delay + c.delay_len())
    }
}

fn init_coef(words: &[i32], start: usize) -> Result<IirChannel> {
    let sections = words[start];
    let in_series = words[start + 1];
    if sections <= 0 || sections as usize > IIR_DF2T_BIQUADS_MAX {
        log::error!("iir_init_coef_df2t(): invalid num_sections {}", sections);
        return Err(Error::InvalidArgument("invalid number of biquads"));
    }
    if in_series <= 0 || in_series > sections || sections % in_series != 0 {
        log::error!(
            "iir_init_coef_df2t(): {} sections in series of {}",
            sections,
            in_series
        );
        return Err(Error::InvalidArgument("invalid biquads in series"));
    }
    let coef = start + EQ_IIR_NHEADER_DF2T;
    for s in 0..sections as usize {
        let shift = words[coef + s * EQ_IIR_NBIQUAD_DF2T + 5];
        if !(0..32).contains(&shift) {
            log::error!("iir_init_coef_df2t(): invalid shift {} in section {}", shift, s);
            return Err(Error::InvalidArgument("invalid biquad shift"));
        }
    }
    Ok(IirChannel {
        biquads: sections as usize,
        biquads_in_series: in_series as usize,
        coef,
        delay: 0,
    })
}
