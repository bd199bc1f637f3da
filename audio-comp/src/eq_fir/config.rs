//! FIR coefficient blob parsing and delay-line arena setup.
//!
//! Data area, in `i16` words:
//!
//! ```text
//! assign[channels_in_config]
//! { length, out_shift, coef[length] } × number_of_responses
//! ```
//!
//! A negative assignment bypasses the channel. Channels past
//! `channels_in_config` use `assign[0]`.

use alloc::vec::Vec;
use core::ops::Range;

use crate::blob::{self, BlobHeader};
use crate::constants::{EQ_FIR_COEF_NHEADER, EQ_FIR_MAX_LENGTH, EQ_FIR_MAX_RESPONSES};
use crate::error::{Error, Result};

use super::fir::{fir_32x16, fir_32x16_2x, FirChannel};

/// One FIR response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirResponse {
    pub out_shift: i16,
    pub taps: Vec<i16>,
}

/// Encode a FIR blob from channel assignments and responses.
pub fn encode_blob(assign: &[i16], responses: &[FirResponse]) -> Vec<u8> {
    let mut data = Vec::new();
    for &a in assign {
        data.extend_from_slice(&a.to_le_bytes());
    }
    for r in responses {
        data.extend_from_slice(&(r.taps.len() as i16).to_le_bytes());
        data.extend_from_slice(&r.out_shift.to_le_bytes());
        for &c in &r.taps {
            data.extend_from_slice(&c.to_le_bytes());
        }
    }
    blob::assemble(assign.len() as u32, responses.len() as u32, &data)
}

/// Configured filters for every channel, with their shared delay arena.
#[derive(Debug)]
pub struct FirState {
    /// Decoded data area; taps are read from here.
    words: Vec<i16>,
    channels: Vec<FirChannel>,
    delay: Vec<i32>,
}

impl FirState {
    /// Parse `config` and build filters for `nch` channels.
    pub fn setup(config: &[u8], nch: usize) -> Result<Self> {
        let hdr = BlobHeader::parse(config)?;
        log::debug!(
            "eq_fir_setup(): channels_in_config = {}, number_of_responses = {}",
            hdr.channels_in_config,
            hdr.number_of_responses
        );
        hdr.validate(nch, EQ_FIR_MAX_RESPONSES)?;

        let words = blob::words_i16(hdr.data(config));
        let cic = hdr.channels_in_config as usize;
        let responses = hdr.number_of_responses as usize;
        if words.len() < cic {
            log::error!("eq_fir_setup(): assign table exceeds blob");
            return Err(Error::InvalidArgument("assign table exceeds blob"));
        }

        // Start of every response record.
        let mut lookup = [0usize; EQ_FIR_MAX_RESPONSES];
        let mut j = cic;
        for slot in lookup.iter_mut().take(responses) {
            if j + EQ_FIR_COEF_NHEADER > words.len() {
                log::error!("eq_fir_setup(): response header at {} exceeds blob", j);
                return Err(Error::InvalidArgument("response record exceeds blob"));
            }
            log::debug!("eq_fir_setup(): index of response start position = {}", j);
            *slot = j;
            let length = words[j].max(0) as usize;
            j += EQ_FIR_COEF_NHEADER + length;
            if j > words.len() {
                log::error!("eq_fir_setup(): response taps exceed blob");
                return Err(Error::InvalidArgument("response record exceeds blob"));
            }
        }

        // First pass: coefficients and delay sizes.
        let mut channels = Vec::with_capacity(nch);
        let mut size_sum = 0usize;
        for ch in 0..nch {
            let resp = if ch < cic { words[ch] } else { words[0] };
            if resp < 0 {
                channels.push(FirChannel::default());
                continue;
            }
            let resp = resp as usize;
            if resp >= responses {
                log::error!("eq_fir_setup(): ch {} assigned to missing response {}", ch, resp);
                return Err(Error::InvalidArgument("response index out of range"));
            }
            let fir = init_coef(&words, lookup[resp])?;
            size_sum += fir.length;
            channels.push(fir);
            log::debug!("eq_fir_setup(): ch = {} initialized to response = {}", ch, resp);
        }

        if size_sum == 0 {
            return Ok(FirState {
                words,
                channels,
                delay: Vec::new(),
            });
        }

        let mut delay = Vec::new();
        delay.try_reserve_exact(size_sum).map_err(|_| {
            log::error!("eq_fir_setup(): alloc failed, size = {}", size_sum * 4);
            Error::ResourceExhausted { bytes: size_sum * 4 }
        })?;
        delay.resize(size_sum, 0);

        // Second pass: partition the arena.
        let mut offset = 0;
        for fir in channels.iter_mut().filter(|f| !f.is_bypass()) {
            fir.delay = offset;
            offset += fir.length;
        }

        Ok(FirState {
            words,
            channels,
            delay,
        })
    }

    pub fn filter(&mut self, ch: usize, x: i32) -> i32 {
        fir_32x16(&mut self.channels[ch], &self.words, &mut self.delay, x)
    }

    pub fn filter_2x(&mut self, ch: usize, x0: i32, x1: i32) -> (i32, i32) {
        fir_32x16_2x(&mut self.channels[ch], &self.words, &mut self.delay, x0, x1)
    }

    /// Delay arena length in samples.
    pub fn delay_len(&self) -> usize {
        self.delay.len()
    }

    pub fn delay(&self) -> &[i32] {
        &self.delay
    }

    pub fn channel(&self, ch: usize) -> &FirChannel {
        &self.channels[ch]
    }

    /// Arena range of every non-bypassed channel, in channel order.
    pub fn delay_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.channels
            .iter()
            .filter(|f| !f.is_bypass())
            .map(|f| f.delay..f.delay + f.length)
    }
}

fn init_coef(words: &[i16], start: usize) -> Result<FirChannel> {
    let length = words[start];
    let out_shift = words[start + 1];
    if length <= 0 || length as usize > EQ_FIR_MAX_LENGTH || length % 4 != 0 {
        log::error!("fir_init_coef(): invalid length {}", length);
        return Err(Error::InvalidArgument("invalid FIR length"));
    }
    if !(0..32).contains(&out_shift) {
        log::error!("fir_init_coef(): invalid out_shift {}", out_shift);
        return Err(Error::InvalidArgument("invalid FIR output shift"));
    }
    Ok(FirChannel {
        length: length as usize,
        out_shift: out_shift as u32,
        coef: start + EQ_FIR_COEF_NHEADER,
        delay: 0,
        rwi: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_CHANNELS;
    use alloc::vec;

    fn response(taps: usize) -> FirResponse {
        let mut t = vec![0i16; taps];
        t[0] = i16::MAX;
        FirResponse { out_shift: 0, taps: t }
    }

    #[test]
    fn arena_is_sum_of_channels() {
        let blob = encode_blob(&[0, 1, -1], &[response(8), response(16)]);
        let st = FirState::setup(&blob, 3).unwrap();
        assert_eq!(st.delay_len(), 24);
        assert!(st.channel(2).is_bypass());
        let ranges: Vec<_> = st.delay_ranges().collect();
        assert_eq!(ranges, vec![0..8, 8..24]);
    }

    #[test]
    fn every_bypass_pattern() {
        let responses = [response(4), response(8)];
        for nch in 1..=MAX_CHANNELS {
            for mask in 0u32..(1 << nch) {
                let assign: Vec<i16> = (0..nch)
                    .map(|c| if mask & (1 << c) != 0 { -1 } else { (c % 2) as i16 })
                    .collect();
                let blob = encode_blob(&assign, &responses);
                let st = FirState::setup(&blob, nch).unwrap();

                let expected: usize = (0..nch)
                    .filter(|c| mask & (1 << c) == 0)
                    .map(|c| if c % 2 == 0 { 4 } else { 8 })
                    .sum();
                assert_eq!(st.delay_len(), expected, "nch {} mask {:b}", nch, mask);

                let mut next = 0;
                for r in st.delay_ranges() {
                    assert_eq!(r.start, next, "partitions must be contiguous");
                    next = r.end;
                }
                assert_eq!(next, expected);
            }
        }
    }

    #[test]
    fn all_bypass_allocates_nothing() {
        let blob = encode_blob(&[-1, -1], &[response(4)]);
        let st = FirState::setup(&blob, 2).unwrap();
        assert_eq!(st.delay_len(), 0);
    }

    #[test]
    fn extra_channels_follow_first_assignment() {
        let blob = encode_blob(&[0], &[response(12)]);
        let st = FirState::setup(&blob, 4).unwrap();
        assert_eq!(st.delay_len(), 48);
    }

    #[test]
    fn rejects_bad_counts_and_indices() {
        let blob = encode_blob(&[2], &[response(4)]);
        assert!(matches!(
            FirState::setup(&blob, 1),
            Err(Error::InvalidArgument(_))
        ));

        let blob = encode_blob(&[0], &[response(4)]);
        assert!(FirState::setup(&blob, 0).is_err());
        assert!(FirState::setup(&blob, MAX_CHANNELS + 1).is_err());

        let blob = encode_blob(&[], &[response(4)]);
        assert!(FirState::setup(&blob, 1).is_err());

        let many: Vec<FirResponse> = (0..EQ_FIR_MAX_RESPONSES + 1).map(|_| response(4)).collect();
        let blob = encode_blob(&[0], &many);
        assert!(FirState::setup(&blob, 1).is_err());
    }

    #[test]
    fn rejects_bad_lengths() {
        for taps in [6, EQ_FIR_MAX_LENGTH + 4] {
            let blob = encode_blob(&[0], &[response(taps)]);
            assert!(FirState::setup(&blob, 1).is_err(), "taps {}", taps);
        }
        let mut shifted = response(4);
        shifted.out_shift = -1;
        assert!(FirState::setup(&encode_blob(&[0], &[shifted]), 1).is_err());
    }

    #[test]
    fn truncated_record_rejected() {
        let mut blob = encode_blob(&[0], &[response(8)]);
        blob.truncate(blob.len() - 4);
        let size = blob.len() as u32;
        blob[0..4].copy_from_slice(&size.to_le_bytes());
        assert!(FirState::setup(&blob, 1).is_err());
    }
}
