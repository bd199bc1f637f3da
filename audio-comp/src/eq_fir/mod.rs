//! FIR equalizer component.
//!
//! Holds a coefficient blob (from the descriptor or `SET_DATA`) and, after
//! `prepare`, one FIR filter per channel with all delay lines in a single
//! arena. Without a blob the component copies audio unchanged.
//!
//! `copy` runs one leftover frame through the general path when the period
//! has an odd frame count, then the rest through the two-frame path.

pub mod config;
pub mod fir;

use alloc::boxed::Box;
use alloc::vec::Vec;

pub use config::{encode_blob, FirResponse, FirState};
pub use fir::{FirChannel, FirFunc};

use crate::blob::BlobHeader;
use crate::buffer::{AudioBuffer, CopyLimits};
use crate::component::cache::sync_regions;
use crate::component::ctrl::max_payload;
use crate::component::{
    set_sink_buffer, single_source, trigger_common, CacheCmd, CacheOps, CacheRegion, CompDev,
    Component, ComponentCmd, ComponentConfig, ComponentDescriptor, ComponentState, ComponentType,
    CopyStatus, CtrlData, CtrlType, Propagation, StateChange, Trigger,
};
use crate::constants::{ABI_VERSION, EQ_BLOB_HEADER_BYTES, EQ_FIR_MAX_SIZE, EQ_IDX_SWITCH};
use crate::error::{Error, Result};
use crate::format::{FrameFormat, StreamDirection, StreamParams};

/// Private data of the FIR EQ.
#[derive(Debug)]
struct FirData {
    /// Coefficient blob; empty when not configured.
    config: Vec<u8>,
    state: Option<FirState>,
    func: FirFunc,
    source_format: FrameFormat,
    sink_format: FrameFormat,
}

/// FIR equalizer.
pub struct EqFir {
    dev: CompDev,
    cd: Box<FirData>,
}

impl EqFir {
    pub fn new(desc: &ComponentDescriptor) -> Result<Self> {
        log::debug!("eq_fir_new()");
        desc.validate(ComponentType::EqFir)?;
        let blob = match &desc.config {
            ComponentConfig::EqFir { blob } => blob,
            _ => return Err(Error::InvalidArgument("descriptor type mismatch")),
        };
        if blob.len() > EQ_FIR_MAX_SIZE {
            log::error!(
                "eq_fir_new(): coefficients blob size = {} > EQ_FIR_MAX_SIZE",
                blob.len()
            );
            return Err(Error::InvalidArgument("coefficient blob too large"));
        }

        let mut config = Vec::new();
        config
            .try_reserve_exact(blob.len())
            .map_err(|_| Error::ResourceExhausted { bytes: blob.len() })?;
        config.extend_from_slice(blob);

        Ok(EqFir {
            dev: CompDev::new(desc),
            cd: Box::new(FirData {
                config,
                state: None,
                func: FirFunc::Passthrough32,
                source_format: FrameFormat::S32Le,
                sink_format: FrameFormat::S32Le,
            }),
        })
    }

    /// Stored coefficient blob, empty if none.
    pub fn config(&self) -> &[u8] {
        &self.cd.config
    }

    /// Filter state built by the last successful `prepare`.
    pub fn state(&self) -> Option<&FirState> {
        self.cd.state.as_ref()
    }

    pub fn func(&self) -> FirFunc {
        self.cd.func
    }

    fn setup_processing(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<()> {
        let source = single_source(sources)?;
        let cd = &mut *self.cd;

        cd.source_format = source.frame_fmt();
        cd.sink_format = sink.frame_fmt();
        if cd.source_format != cd.sink_format
            || source.channels() != self.dev.params.channels
            || sink.channels() != self.dev.params.channels
        {
            log::error!(
                "eq_fir_prepare(): link mismatch, source {:?}/{} sink {:?}/{} nch {}",
                cd.source_format,
                source.channels(),
                cd.sink_format,
                sink.channels(),
                self.dev.params.channels
            );
            return Err(Error::InvalidArgument("source and sink formats differ"));
        }

        self.dev.params.frame_fmt = match self.dev.params.direction {
            StreamDirection::Playback => cd.source_format,
            StreamDirection::Capture => cd.sink_format,
        };

        set_sink_buffer(&self.dev, sink, self.dev.frames * sink.frame_bytes())?;

        cd.state = None;
        if cd.config.is_empty() {
            cd.func = FirFunc::passthrough(self.dev.params.frame_fmt);
        } else {
            cd.state = Some(FirState::setup(&cd.config, self.dev.params.channels)?);
            cd.func = FirFunc::configured(self.dev.params.frame_fmt);
        }
        Ok(())
    }

    fn cmd_get_data(&mut self, cdata: &mut CtrlData, max_size: usize) -> Result<()> {
        if cdata.ctrl != CtrlType::Binary {
            log::error!("fir_cmd_get_data(): invalid ctrl {:?}", cdata.ctrl);
            return Err(Error::InvalidArgument("unsupported control type"));
        }
        log::debug!("fir_cmd_get_data(): binary");
        let config = &self.cd.config;
        if config.is_empty() {
            log::error!("fir_cmd_get_data(): no configuration");
            return Err(Error::InvalidArgument("no configuration stored"));
        }
        let max = max_payload(max_size);
        if max == 0 {
            return Err(Error::InvalidArgument("max_size below message headers"));
        }

        let bs = config.len();
        let (offset, chunk) = if bs > max {
            let offset = cdata.msg_index as usize * max;
            if offset >= bs {
                log::error!(
                    "fir_cmd_get_data(): msg_index {} past blob size {}",
                    cdata.msg_index,
                    bs
                );
                return Err(Error::InvalidArgument("msg_index past end of blob"));
            }
            (offset, max.min(bs - offset))
        } else {
            (0, bs)
        };
        log::debug!(
            "fir_cmd_get_data(): blob size {} msg index {} max size {} offset {}",
            bs,
            cdata.msg_index,
            max,
            offset
        );

        cdata.num_elems = chunk as u32;
        cdata.elems_remaining = (bs - offset - chunk) as u32;
        cdata.data.abi_version = ABI_VERSION;
        cdata.data.size = chunk as u32;
        cdata.data.bytes.clear();
        cdata.data.bytes.extend_from_slice(&config[offset..offset + chunk]);
        Ok(())
    }

    fn cmd_set_data(&mut self, cdata: &CtrlData) -> Result<()> {
        match cdata.ctrl {
            CtrlType::Enum => {
                log::debug!("fir_cmd_set_data(): enum");
                if cdata.index != EQ_IDX_SWITCH {
                    log::error!("fir_cmd_set_data(): invalid index = {}", cdata.index);
                    return Err(Error::InvalidArgument("invalid enum control index"));
                }
                for (ch, resp) in cdata.pairs()? {
                    log::debug!("fir_cmd_set_data(): switch ch = {}, response = {}", ch, resp);
                    self.switch_store(ch, resp)?;
                }
                Ok(())
            }
            CtrlType::Binary => self.store_chunk(cdata),
            CtrlType::Value => {
                log::error!("fir_cmd_set_data(): invalid ctrl {:?}", cdata.ctrl);
                Err(Error::InvalidArgument("unsupported control type"))
            }
        }
    }

    /// Record a new response for `ch`; filters pick it up at next `prepare`.
    fn switch_store(&mut self, ch: u32, response: i32) -> Result<()> {
        let config = &mut self.cd.config;
        let hdr = match BlobHeader::parse(config) {
            Ok(h) => h,
            Err(_) => {
                log::error!("eq_fir_switch_store(): no configuration");
                return Err(Error::InvalidArgument("no configuration stored"));
            }
        };
        if ch >= hdr.channels_in_config {
            log::error!("eq_fir_switch_store(): ch {} out of range", ch);
            return Err(Error::InvalidArgument("channel beyond channels_in_config"));
        }
        let Ok(response) = i16::try_from(response) else {
            log::error!("eq_fir_switch_store(): response {} out of range", response);
            return Err(Error::InvalidArgument("response index out of range"));
        };
        let off = EQ_BLOB_HEADER_BYTES + ch as usize * 2;
        if off + 2 > hdr.size as usize {
            return Err(Error::InvalidArgument("assign table exceeds blob"));
        }
        config[off..off + 2].copy_from_slice(&response.to_le_bytes());
        Ok(())
    }

    fn store_chunk(&mut self, cdata: &CtrlData) -> Result<()> {
        log::debug!("fir_cmd_set_data(): binary");
        if self.dev.state != ComponentState::Ready {
            log::error!("fir_cmd_set_data(): driver is busy");
            return Err(Error::Busy);
        }

        let num_elems = cdata.num_elems as usize;
        let total = num_elems + cdata.elems_remaining as usize;
        log::debug!(
            "fir_cmd_set_data(): blob size: {} msg_index {}",
            total,
            cdata.msg_index
        );
        if total > EQ_FIR_MAX_SIZE {
            log::error!("fir_cmd_set_data(): blob size {} > EQ_FIR_MAX_SIZE", total);
            return Err(Error::InvalidArgument("coefficient blob too large"));
        }
        if cdata.data.bytes.len() < num_elems {
            return Err(Error::InvalidArgument("chunk shorter than num_elems"));
        }

        let offset = if cdata.msg_index == 0 {
            // release the old blob before allocating the new one
            self.cd.config = Vec::new();
            let mut fresh = Vec::new();
            fresh
                .try_reserve_exact(total)
                .map_err(|_| Error::ResourceExhausted { bytes: total })?;
            fresh.resize(total, 0);
            self.cd.config = fresh;
            0
        } else {
            let stored = self.cd.config.len();
            match stored.checked_sub(cdata.elems_remaining as usize + num_elems) {
                Some(off) => off,
                None => {
                    log::error!(
                        "fir_cmd_set_data(): chunk of {} with {} remaining exceeds stored {}",
                        num_elems,
                        cdata.elems_remaining,
                        stored
                    );
                    return Err(Error::InvalidArgument("chunk outside stored blob"));
                }
            }
        };

        self.cd.config[offset..offset + num_elems].copy_from_slice(&cdata.data.bytes[..num_elems]);
        Ok(())
    }
}

impl Component for EqFir {
    fn dev(&self) -> &CompDev {
        &self.dev
    }

    fn dev_mut(&mut self) -> &mut CompDev {
        &mut self.dev
    }

    fn params(&mut self, params: &mut StreamParams) -> Result<()> {
        log::debug!("eq_fir_params()");
        params.validate()?;
        self.dev.params = *params;
        self.dev.frames = params.period_frames;
        Ok(())
    }

    fn prepare(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<Propagation> {
        log::debug!("eq_fir_prepare()");
        if self.dev.set_state(Trigger::Prepare)? == StateChange::AlreadySet {
            return Ok(Propagation::Stop);
        }
        if let Err(e) = self.setup_processing(sources, sink) {
            log::error!("eq_fir_prepare(): setup failed: {}", e);
            self.cd.state = None;
            self.dev.set_state(Trigger::Reset)?;
            return Err(e);
        }
        Ok(Propagation::Downstream)
    }

    fn trigger(
        &mut self,
        trigger: Trigger,
        _sources: &[&AudioBuffer],
        _sink: &AudioBuffer,
    ) -> Result<Propagation> {
        trigger_common(&mut self.dev, trigger)
    }

    fn copy(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<CopyStatus> {
        log::trace!("eq_fir_copy()");
        let source = single_source(sources)?;
        let cl = CopyLimits::new(source, sink);
        if cl.is_empty() {
            return Ok(CopyStatus::NoProgress);
        }

        let nch = self.dev.params.channels;
        let cd = &mut *self.cd;
        let mut frames = cl.frames;

        if frames & 1 == 1 {
            cd.func.run(cd.state.as_mut(), source, sink, 1, nch);
            source.consume(cl.source_frame_bytes)?;
            sink.produce(cl.sink_frame_bytes)?;
            frames -= 1;
        }

        if frames > 1 {
            cd.func.run_even(cd.state.as_mut(), source, sink, frames, nch);
            source.consume(frames * cl.source_frame_bytes)?;
            sink.produce(frames * cl.sink_frame_bytes)?;
        }

        Ok(CopyStatus::Processed {
            consumed: cl.frames,
            produced: cl.frames,
        })
    }

    fn reset(&mut self, _sources: &[&AudioBuffer]) -> Result<Propagation> {
        log::debug!("eq_fir_reset()");
        self.cd.state = None;
        self.cd.func = FirFunc::Passthrough32;
        self.dev.set_state(Trigger::Reset)?;
        Ok(Propagation::Downstream)
    }

    fn cmd(&mut self, cmd: ComponentCmd, cdata: &mut CtrlData, max_size: usize) -> Result<()> {
        log::debug!("eq_fir_cmd(): {:?}", cmd);
        match cmd {
            ComponentCmd::SetData => self.cmd_set_data(cdata),
            ComponentCmd::GetData => self.cmd_get_data(cdata, max_size),
            ComponentCmd::SetValue | ComponentCmd::GetValue => Ok(()),
        }
    }

    fn cache(&self, cmd: CacheCmd, ops: &mut dyn CacheOps) {
        log::debug!("eq_fir_cache(): {:?}", cmd);
        let delay = self.cd.state.as_ref().map(|s| s.delay()).unwrap_or(&[]);
        let regions = [
            CacheRegion::of_slice(&self.cd.config),
            CacheRegion::of_slice(delay),
            CacheRegion::of::<FirData>(&self.cd),
            CacheRegion::of(self),
        ];
        sync_regions(cmd, &regions, ops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::cache::testing::RecordingCache;
    use crate::constants::{ABI_HEADER_BYTES, CTRL_DATA_HEADER_BYTES};
    use alloc::vec;

    const NCH: usize = 2;

    fn blob() -> Vec<u8> {
        // response 0: 0.5 gain, response 1: identity
        let mut half = vec![0i16; 4];
        half[0] = 16384;
        let mut unity = vec![0i16; 8];
        unity[0] = i16::MAX;
        encode_blob(
            &[0, 1],
            &[
                FirResponse { out_shift: 0, taps: half },
                FirResponse { out_shift: 0, taps: unity },
            ],
        )
    }

    fn links(fmt: FrameFormat) -> (AudioBuffer, AudioBuffer) {
        let bytes = fmt.frame_bytes(NCH) * 16;
        (
            AudioBuffer::new(bytes, fmt, NCH).unwrap(),
            AudioBuffer::new(bytes, fmt, NCH).unwrap(),
        )
    }

    fn prepared(blob: &[u8], fmt: FrameFormat) -> (EqFir, AudioBuffer, AudioBuffer) {
        let mut eq = EqFir::new(&ComponentDescriptor::eq_fir(1, blob)).unwrap();
        let mut params = StreamParams::new(48000, NCH, fmt);
        params.period_frames = 8;
        eq.params(&mut params).unwrap();
        let (mut source, mut sink) = links(fmt);
        assert_eq!(
            eq.prepare(&mut [&mut source], &mut sink).unwrap(),
            Propagation::Downstream
        );
        (eq, source, sink)
    }

    #[test]
    fn new_rejects_oversized_blob() {
        let big = vec![0u8; EQ_FIR_MAX_SIZE + 1];
        assert!(matches!(
            EqFir::new(&ComponentDescriptor::eq_fir(1, &big)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn new_without_blob_passes_through() {
        let (mut eq, mut source, mut sink) = prepared(&[], FrameFormat::S16Le);
        assert_eq!(eq.func(), FirFunc::Passthrough16);
        assert!(eq.state().is_none());
        source.push_samples(&[5, -5, 7, -7, 9, -9]).unwrap();
        let status = eq.copy(&mut [&mut source], &mut sink).unwrap();
        assert_eq!(status, CopyStatus::Processed { consumed: 3, produced: 3 });
        let mut out = vec![];
        sink.pop_frames(3, &mut out).unwrap();
        assert_eq!(out, vec![5, -5, 7, -7, 9, -9]);
    }

    #[test]
    fn prepare_sizes_sink_and_filters() {
        let (mut eq, mut source, mut sink) = prepared(&blob(), FrameFormat::S16Le);
        assert_eq!(sink.size(), 8 * 4 * 2);
        assert_eq!(eq.func(), FirFunc::Filter(FrameFormat::S16Le));
        assert_eq!(eq.state().unwrap().delay_len(), 12);

        // odd frame count: one general frame, then two even frames
        source.push_samples(&[1000, 1000, 2000, 2000, -4000, -4000]).unwrap();
        eq.copy(&mut [&mut source], &mut sink).unwrap();
        assert_eq!(source.avail(), 0);
        let mut out = vec![];
        sink.pop_frames(3, &mut out).unwrap();
        // ch0 halves, ch1 passes at Q15 unity (one LSB short of 1.0)
        assert_eq!(out[0], 500);
        assert_eq!(out[2], 1000);
        assert_eq!(out[4], -2000);
        assert!((out[1] - 1000).abs() <= 1);
        assert!((out[5] + 4000).abs() <= 1);
    }

    #[test]
    fn prepare_twice_stops_propagation() {
        let (mut eq, mut source, mut sink) = prepared(&blob(), FrameFormat::S32Le);
        assert_eq!(
            eq.prepare(&mut [&mut source], &mut sink).unwrap(),
            Propagation::Stop
        );
    }

    #[test]
    fn failed_setup_forces_reset() {
        let bad = encode_blob(
            &[3],
            &[FirResponse {
                out_shift: 0,
                taps: vec![0; 4],
            }],
        );
        let mut eq = EqFir::new(&ComponentDescriptor::eq_fir(1, &bad)).unwrap();
        let mut params = StreamParams::new(48000, NCH, FrameFormat::S32Le);
        eq.params(&mut params).unwrap();
        let (mut source, mut sink) = links(FrameFormat::S32Le);
        assert!(eq.prepare(&mut [&mut source], &mut sink).is_err());
        assert_eq!(eq.dev().state, ComponentState::Ready);
        assert!(eq.state().is_none());
    }

    #[test]
    fn empty_source_is_no_progress() {
        let (mut eq, mut source, mut sink) = prepared(&blob(), FrameFormat::S32Le);
        let before = (source.read_pos(), sink.write_pos());
        assert_eq!(
            eq.copy(&mut [&mut source], &mut sink).unwrap(),
            CopyStatus::NoProgress
        );
        assert_eq!(before, (source.read_pos(), sink.write_pos()));
    }

    #[test]
    fn reset_releases_state() {
        let (mut eq, _source, _sink) = prepared(&blob(), FrameFormat::S24In32Le);
        eq.reset(&[]).unwrap();
        assert!(eq.state().is_none());
        assert_eq!(eq.func(), FirFunc::Passthrough32);
        assert_eq!(eq.dev().state, ComponentState::Ready);
    }

    #[test]
    fn chunked_set_then_paged_get_round_trips() {
        let mut taps = vec![0i16; 96];
        for (i, t) in taps.iter_mut().enumerate() {
            *t = (i as i16) * 31 - 1000;
        }
        let original = encode_blob(
            &[0, -1],
            &[
                FirResponse { out_shift: 1, taps: taps.clone() },
                FirResponse { out_shift: 2, taps },
            ],
        );
        // 70 payload bytes per message
        let max_size = CTRL_DATA_HEADER_BYTES + ABI_HEADER_BYTES + 70;
        let chunk = 70;

        let mut eq = EqFir::new(&ComponentDescriptor::eq_fir(1, &[])).unwrap();
        let total = original.len();
        for (i, piece) in original.chunks(chunk).enumerate() {
            let sent = i * chunk;
            let remaining = (total - sent - piece.len()) as u32;
            let mut cdata = CtrlData::binary(i as u32, piece, remaining);
            eq.cmd(ComponentCmd::SetData, &mut cdata, max_size).unwrap();
        }
        assert_eq!(eq.config(), &original[..]);

        let mut read = Vec::new();
        for msg in 0.. {
            let mut cdata = CtrlData::binary_request(msg);
            eq.cmd(ComponentCmd::GetData, &mut cdata, max_size).unwrap();
            assert_eq!(cdata.data.size, cdata.num_elems);
            read.extend_from_slice(&cdata.data.bytes);
            if cdata.elems_remaining == 0 {
                break;
            }
        }
        assert_eq!(read, original);

        // one page past the end
        let pages = (total + chunk - 1) / chunk;
        let mut cdata = CtrlData::binary_request(pages as u32);
        assert!(eq.cmd(ComponentCmd::GetData, &mut cdata, max_size).is_err());
    }

    #[test]
    fn set_data_rejects_oversized_total() {
        let mut eq = EqFir::new(&ComponentDescriptor::eq_fir(1, &[])).unwrap();
        let mut cdata = CtrlData::binary(0, &[0u8; 16], (EQ_FIR_MAX_SIZE - 8) as u32);
        assert!(matches!(
            eq.cmd(ComponentCmd::SetData, &mut cdata, 4096),
            Err(Error::InvalidArgument(_))
        ));
        // later chunk that does not fit the stored blob
        let mut first = CtrlData::binary(0, &[0u8; 16], 16);
        eq.cmd(ComponentCmd::SetData, &mut first, 4096).unwrap();
        let mut stray = CtrlData::binary(1, &[0u8; 16], 30);
        assert!(eq.cmd(ComponentCmd::SetData, &mut stray, 4096).is_err());
    }

    #[test]
    fn set_data_busy_unless_ready() {
        let (mut eq, _source, _sink) = prepared(&blob(), FrameFormat::S32Le);
        let mut cdata = CtrlData::binary(0, &blob(), 0);
        assert_eq!(
            eq.cmd(ComponentCmd::SetData, &mut cdata, 4096),
            Err(Error::Busy)
        );
    }

    #[test]
    fn switch_updates_assignment_only() {
        let (mut eq, mut source, mut sink) = prepared(&blob(), FrameFormat::S32Le);
        let mut cdata = CtrlData::enum_pairs(EQ_IDX_SWITCH, &[(1, -1)]);
        eq.cmd(ComponentCmd::SetData, &mut cdata, 4096).unwrap();
        // filters unchanged until the next prepare
        assert_eq!(eq.state().unwrap().delay_len(), 12);

        eq.reset(&[]).unwrap();
        eq.prepare(&mut [&mut source], &mut sink).unwrap();
        assert_eq!(eq.state().unwrap().delay_len(), 4);
        assert!(eq.state().unwrap().channel(1).is_bypass());

        let mut beyond = CtrlData::enum_pairs(EQ_IDX_SWITCH, &[(2, 0)]);
        assert!(eq.cmd(ComponentCmd::SetData, &mut beyond, 4096).is_err());
        let mut wrong_index = CtrlData::enum_pairs(1, &[(0, 0)]);
        assert!(eq.cmd(ComponentCmd::SetData, &mut wrong_index, 4096).is_err());
    }

    #[test]
    fn switch_rejects_wide_response() {
        let mut eq = EqFir::new(&ComponentDescriptor::eq_fir(1, &blob())).unwrap();
        for response in [65536, i16::MAX as i32 + 1, i16::MIN as i32 - 1] {
            let mut cdata = CtrlData::enum_pairs(EQ_IDX_SWITCH, &[(0, response)]);
            assert!(matches!(
                eq.cmd(ComponentCmd::SetData, &mut cdata, 4096),
                Err(Error::InvalidArgument(_))
            ));
            assert_eq!(eq.config(), &blob()[..]);
        }
    }

    #[test]
    fn values_are_ignored() {
        let mut eq = EqFir::new(&ComponentDescriptor::eq_fir(1, &[])).unwrap();
        let mut cdata = CtrlData::binary_request(0);
        assert!(eq.cmd(ComponentCmd::SetValue, &mut cdata, 64).is_ok());
        assert!(eq.cmd(ComponentCmd::GetValue, &mut cdata, 64).is_ok());
        // nothing stored yet
        assert!(eq.cmd(ComponentCmd::GetData, &mut cdata, 64).is_err());
    }

    #[test]
    fn cache_order() {
        let (eq, _source, _sink) = prepared(&blob(), FrameFormat::S32Le);
        let config = eq.config().as_ptr() as usize;
        let delay = eq.state().unwrap().delay().as_ptr() as usize;
        let private = &*eq.cd as *const FirData as usize;
        let header = &eq as *const EqFir as usize;

        let mut cache = RecordingCache::default();
        eq.cache(CacheCmd::WritebackInvalidate, &mut cache);
        assert_eq!(cache.addrs(), vec![config, delay, private, header]);

        let mut cache = RecordingCache::default();
        eq.cache(CacheCmd::Invalidate, &mut cache);
        assert_eq!(cache.addrs(), vec![header, private, delay, config]);
    }
}
