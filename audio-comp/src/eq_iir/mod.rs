//! IIR equalizer component.
//!
//! Cascaded biquads per channel, configured by a blob that is replaced whole
//! by a single `SET_DATA`. Unlike the FIR EQ the sink may be narrower than
//! the source; see [`IirFunc`] for the supported pairs.

pub mod config;
pub mod func;
pub mod iir;

use alloc::boxed::Box;
use alloc::vec::Vec;

pub use config::{encode_blob, IirResponse, IirState};
pub use func::IirFunc;
pub use iir::{Biquad, IirChannel};

use crate::blob::BlobHeader;
use crate::buffer::{AudioBuffer, CopyLimits};
use crate::component::cache::sync_regions;
use crate::component::ctrl::max_payload;
use crate::component::{
    set_sink_buffer, single_source, trigger_common, CacheCmd, CacheOps, CacheRegion, CompDev,
    Component, ComponentCmd, ComponentConfig, ComponentDescriptor, ComponentState, ComponentType,
    CopyStatus, CtrlData, CtrlType, Propagation, StateChange, Trigger,
};
use crate::constants::{ABI_VERSION, EQ_BLOB_HEADER_BYTES, EQ_IDX_SWITCH, EQ_IIR_MAX_SIZE};
use crate::error::{Error, Result};
use crate::format::{StreamDirection, StreamParams};

#[derive(Debug)]
struct IirData {
    config: Vec<u8>,
    state: Option<IirState>,
    func: IirFunc,
}

/// IIR equalizer.
pub struct EqIir {
    dev: CompDev,
    cd: Box<IirData>,
}

fn copy_blob(blob: &[u8]) -> Result<Vec<u8>> {
    let mut config = Vec::new();
    config
        .try_reserve_exact(blob.len())
        .map_err(|_| Error::ResourceExhausted { bytes: blob.len() })?;
    config.extend_from_slice(blob);
    Ok(config)
}

impl EqIir {
    pub fn new(desc: &ComponentDescriptor) -> Result<Self> {
        log::debug!("eq_iir_new()");
        desc.validate(ComponentType::EqIir)?;
        let blob = match &desc.config {
            ComponentConfig::EqIir { blob } => blob,
            _ => return Err(Error::InvalidArgument("descriptor type mismatch")),
        };
        if blob.len() > EQ_IIR_MAX_SIZE {
            log::error!(
                "eq_iir_new(): coefficients blob size = {} > EQ_IIR_MAX_SIZE",
                blob.len()
            );
            return Err(Error::InvalidArgument("coefficient blob too large"));
        }

        Ok(EqIir {
            dev: CompDev::new(desc),
            cd: Box::new(IirData {
                config: copy_blob(blob)?,
                state: None,
                func: IirFunc::Copy32,
            }),
        })
    }

    pub fn config(&self) -> &[u8] {
        &self.cd.config
    }

    pub fn state(&self) -> Option<&IirState> {
        self.cd.state.as_ref()
    }

    pub fn func(&self) -> IirFunc {
        self.cd.func
    }

    fn setup_processing(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<()> {
        let source = single_source(sources)?;
        let nch = self.dev.params.channels;
        if source.channels() != nch || sink.channels() != nch {
            log::error!(
                "eq_iir_prepare(): channel mismatch, source {} sink {} nch {}",
                source.channels(),
                sink.channels(),
                nch
            );
            return Err(Error::InvalidArgument("link channel count mismatch"));
        }

        let source_format = source.frame_fmt();
        let sink_format = sink.frame_fmt();
        self.dev.params.frame_fmt = match self.dev.params.direction {
            StreamDirection::Playback => source_format,
            StreamDirection::Capture => sink_format,
        };

        set_sink_buffer(&self.dev, sink, self.dev.frames * sink.frame_bytes())?;

        let cd = &mut *self.cd;
        cd.state = None;
        let func = if cd.config.is_empty() {
            IirFunc::passthrough(source_format, sink_format)
        } else {
            IirFunc::configured(source_format, sink_format)
        };
        cd.func = match func {
            Some(f) => f,
            None => {
                log::error!(
                    "eq_iir_prepare(): no function for source {:?} sink {:?}",
                    source_format,
                    sink_format
                );
                return Err(Error::Unsupported("sample format pair"));
            }
        };
        if !cd.config.is_empty() {
            cd.state = Some(IirState::setup(&cd.config, nch)?);
        }
        Ok(())
    }

    fn cmd_get_data(&mut self, cdata: &mut CtrlData, max_size: usize) -> Result<()> {
        if cdata.ctrl != CtrlType::Binary {
            log::error!("iir_cmd_get_data(): invalid ctrl {:?}", cdata.ctrl);
            return Err(Error::InvalidArgument("unsupported control type"));
        }
        log::debug!("iir_cmd_get_data(): binary");
        let config = &self.cd.config;
        let bs = config.len();
        if bs == 0 || bs > EQ_IIR_MAX_SIZE || bs > max_payload(max_size) {
            log::error!("iir_cmd_get_data(): blob size {} does not fit", bs);
            return Err(Error::InvalidArgument("no configuration or blob too large"));
        }

        cdata.num_elems = bs as u32;
        cdata.elems_remaining = 0;
        cdata.data.abi_version = ABI_VERSION;
        cdata.data.size = bs as u32;
        cdata.data.bytes.clear();
        cdata.data.bytes.extend_from_slice(config);
        Ok(())
    }

    fn cmd_set_data(&mut self, cdata: &CtrlData) -> Result<()> {
        match cdata.ctrl {
            CtrlType::Enum => {
                log::debug!("iir_cmd_set_data(): enum");
                if cdata.index != EQ_IDX_SWITCH {
                    log::error!("iir_cmd_set_data(): invalid index = {}", cdata.index);
                    return Err(Error::InvalidArgument("invalid enum control index"));
                }
                for (ch, resp) in cdata.pairs()? {
                    log::debug!("iir_cmd_set_data(): switch ch = {}, response = {}", ch, resp);
                    self.switch_store(ch, resp)?;
                }
                Ok(())
            }
            CtrlType::Binary => self.replace_blob(cdata),
            CtrlType::Value => {
                log::error!("iir_cmd_set_data(): invalid ctrl {:?}", cdata.ctrl);
                Err(Error::InvalidArgument("unsupported control type"))
            }
        }
    }

    fn switch_store(&mut self, ch: u32, response: i32) -> Result<()> {
        let config = &mut self.cd.config;
        let hdr = match BlobHeader::parse(config) {
            Ok(h) => h,
            Err(_) => {
                log::error!("eq_iir_switch_store(): no configuration");
                return Err(Error::InvalidArgument("no configuration stored"));
            }
        };
        if ch >= hdr.channels_in_config {
            log::error!("eq_iir_switch_store(): ch {} out of range", ch);
            return Err(Error::InvalidArgument("channel beyond channels_in_config"));
        }
        let off = EQ_BLOB_HEADER_BYTES + ch as usize * 4;
        if off + 4 > hdr.size as usize {
            return Err(Error::InvalidArgument("assign table exceeds blob"));
        }
        config[off..off + 4].copy_from_slice(&response.to_le_bytes());
        Ok(())
    }

    /// Swap in a complete blob; the old one stays if anything fails.
    fn replace_blob(&mut self, cdata: &CtrlData) -> Result<()> {
        log::debug!("iir_cmd_set_data(): binary");
        if self.dev.state != ComponentState::Ready {
            log::error!("iir_cmd_set_data(): driver is busy");
            return Err(Error::Busy);
        }

        let bytes = &cdata.data.bytes;
        if bytes.len() < 4 {
            return Err(Error::InvalidArgument("blob shorter than its size field"));
        }
        let bs = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bs == 0 || bs > EQ_IIR_MAX_SIZE || bs > bytes.len() {
            log::error!("iir_cmd_set_data(): invalid blob size {}", bs);
            return Err(Error::InvalidArgument("invalid blob size"));
        }

        self.cd.config = copy_blob(&bytes[..bs])?;
        Ok(())
    }
}

impl Component for EqIir {
    fn dev(&self) -> &CompDev {
        &self.dev
    }

    fn dev_mut(&mut self) -> &mut CompDev {
        &mut self.dev
    }

    fn params(&mut self, params: &mut StreamParams) -> Result<()> {
        log::debug!("eq_iir_params()");
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
        log::debug!("eq_iir_prepare()");
        if self.dev.set_state(Trigger::Prepare)? == StateChange::AlreadySet {
            return Ok(Propagation::Stop);
        }
        if let Err(e) = self.setup_processing(sources, sink) {
            log::error!("eq_iir_prepare(): setup failed: {}", e);
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
        log::trace!("eq_iir_copy()");
        let source = single_source(sources)?;
        let cl = CopyLimits::new(source, sink);
        if cl.is_empty() {
            return Ok(CopyStatus::NoProgress);
        }

        let cd = &mut *self.cd;
        cd.func
            .run(cd.state.as_mut(), source, sink, cl.frames, self.dev.params.channels);
        source.consume(cl.source_bytes)?;
        sink.produce(cl.sink_bytes)?;

        Ok(CopyStatus::Processed {
            consumed: cl.frames,
            produced: cl.frames,
        })
    }

    fn reset(&mut self, _sources: &[&AudioBuffer]) -> Result<Propagation> {
        log::debug!("eq_iir_reset()");
        self.cd.state = None;
        self.cd.func = IirFunc::Copy32;
        self.dev.set_state(Trigger::Reset)?;
        Ok(Propagation::Downstream)
    }

    fn cmd(&mut self, cmd: ComponentCmd, cdata: &mut CtrlData, max_size: usize) -> Result<()> {
        log::debug!("eq_iir_cmd(): {:?}", cmd);
        match cmd {
            ComponentCmd::SetData => self.cmd_set_data(cdata),
            ComponentCmd::GetData => self.cmd_get_data(cdata, max_size),
            ComponentCmd::SetValue | ComponentCmd::GetValue => Ok(()),
        }
    }

    fn cache(&self, cmd: CacheCmd, ops: &mut dyn CacheOps) {
        log::debug!("eq_iir_cache(): {:?}", cmd);
        let delay = self.cd.state.as_ref().map(|s| s.delay()).unwrap_or(&[]);
        let regions = [
            CacheRegion::of_slice(&self.cd.config),
            CacheRegion::of_slice(delay),
            CacheRegion::of::<IirData>(&self.cd),
            CacheRegion::of(self),
        ];
        sync_regions(cmd, &regions, ops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::cache::testing::RecordingCache;
    use crate::format::FrameFormat;
    use alloc::vec;

    const NCH: usize = 2;

    fn half() -> Biquad {
        Biquad {
            b0: 1 << 29,
            ..Biquad::UNITY
        }
    }

    fn blob() -> Vec<u8> {
        encode_blob(
            &[0, 1],
            &[
                IirResponse::cascade(vec![half()]),
                IirResponse::cascade(vec![Biquad::UNITY, Biquad::UNITY]),
            ],
        )
    }

    fn prepare_with(
        blob: &[u8],
        source_fmt: FrameFormat,
        sink_fmt: FrameFormat,
    ) -> (EqIir, AudioBuffer, AudioBuffer, Result<Propagation>) {
        let mut eq = EqIir::new(&ComponentDescriptor::eq_iir(2, blob)).unwrap();
        let mut params = StreamParams::new(48000, NCH, source_fmt);
        params.period_frames = 4;
        eq.params(&mut params).unwrap();
        let mut source = AudioBuffer::new(source_fmt.frame_bytes(NCH) * 8, source_fmt, NCH).unwrap();
        let mut sink = AudioBuffer::new(sink_fmt.frame_bytes(NCH) * 8, sink_fmt, NCH).unwrap();
        let res = eq.prepare(&mut [&mut source], &mut sink);
        (eq, source, sink, res)
    }

    #[test]
    fn filters_and_narrows() {
        let (mut eq, mut source, mut sink, res) =
            prepare_with(&blob(), FrameFormat::S32Le, FrameFormat::S16Le);
        assert_eq!(res, Ok(Propagation::Downstream));
        assert_eq!(
            eq.func(),
            IirFunc::Filter {
                source: FrameFormat::S32Le,
                sink: FrameFormat::S16Le
            }
        );
        assert_eq!(sink.size(), 4 * 4 * 2);

        source.push_samples(&[1 << 20, 1 << 20, -(1 << 24), -(1 << 24)]).unwrap();
        let status = eq.copy(&mut [&mut source], &mut sink).unwrap();
        assert_eq!(status, CopyStatus::Processed { consumed: 2, produced: 2 });
        assert_eq!(source.avail(), 0);

        let mut out = vec![];
        sink.pop_frames(2, &mut out).unwrap();
        // ch0 halves, ch1 passes; both narrowed from Q1.31 to 16 bits
        assert_eq!(out, vec![8, 16, -128, -256]);
    }

    #[test]
    fn unsupported_pair_fails_prepare() {
        for cfg in [blob(), Vec::new()] {
            let (eq, _source, _sink, res) =
                prepare_with(&cfg, FrameFormat::S16Le, FrameFormat::S32Le);
            assert!(matches!(res, Err(Error::Unsupported(_))));
            assert_eq!(eq.dev().state, ComponentState::Ready);
            assert!(eq.state().is_none());
        }
    }

    #[test]
    fn passthrough_without_blob() {
        let (mut eq, mut source, mut sink, res) =
            prepare_with(&[], FrameFormat::S24In32Le, FrameFormat::S24In32Le);
        assert!(res.is_ok());
        assert_eq!(eq.func(), IirFunc::Copy32);
        source.push_samples(&[0x7f_ffff, -0x80_0000]).unwrap();
        eq.copy(&mut [&mut source], &mut sink).unwrap();
        let mut out = vec![];
        sink.pop_frames(1, &mut out).unwrap();
        assert_eq!(out, vec![0x7f_ffff, -0x80_0000]);
    }

    #[test]
    fn new_rejects_oversized_blob() {
        let big = vec![0u8; EQ_IIR_MAX_SIZE + 1];
        assert!(matches!(
            EqIir::new(&ComponentDescriptor::eq_iir(1, &big)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn set_then_get_whole_blob() {
        let mut eq = EqIir::new(&ComponentDescriptor::eq_iir(1, &[])).unwrap();
        let original = blob();
        let mut cdata = CtrlData::binary(0, &original, 0);
        eq.cmd(ComponentCmd::SetData, &mut cdata, 4096).unwrap();
        assert_eq!(eq.config(), &original[..]);

        let mut req = CtrlData::binary_request(0);
        eq.cmd(ComponentCmd::GetData, &mut req, 4096).unwrap();
        assert_eq!(req.data.bytes, original);
        assert_eq!(req.elems_remaining, 0);

        // no pagination: a budget below the blob size is an error
        let mut req = CtrlData::binary_request(0);
        assert!(eq.cmd(ComponentCmd::GetData, &mut req, 64).is_err());
    }

    #[test]
    fn bad_blob_keeps_previous() {
        let mut eq = EqIir::new(&ComponentDescriptor::eq_iir(1, &blob())).unwrap();
        let mut bad = blob();
        let size = (bad.len() + 4) as u32;
        bad[0..4].copy_from_slice(&size.to_le_bytes());
        let mut cdata = CtrlData::binary(0, &bad, 0);
        assert!(eq.cmd(ComponentCmd::SetData, &mut cdata, 4096).is_err());
        assert_eq!(eq.config(), &blob()[..]);

        let mut zero = CtrlData::binary(0, &[0u8; 16], 0);
        assert!(eq.cmd(ComponentCmd::SetData, &mut zero, 4096).is_err());
        assert_eq!(eq.config(), &blob()[..]);
    }

    #[test]
    fn set_data_rejects_oversized_blob() {
        let mut eq = EqIir::new(&ComponentDescriptor::eq_iir(1, &blob())).unwrap();
        assert_eq!(eq.dev().state, ComponentState::Ready);
        let mut big = vec![0u8; EQ_IIR_MAX_SIZE + 4];
        big[0..4].copy_from_slice(&((EQ_IIR_MAX_SIZE + 4) as u32).to_le_bytes());
        let mut cdata = CtrlData::binary(0, &big, 0);
        assert!(matches!(
            eq.cmd(ComponentCmd::SetData, &mut cdata, 4096),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(eq.config(), &blob()[..]);
    }

    #[test]
    fn set_data_busy_unless_ready() {
        let (mut eq, _source, _sink, res) =
            prepare_with(&blob(), FrameFormat::S32Le, FrameFormat::S32Le);
        assert!(res.is_ok());
        let mut cdata = CtrlData::binary(0, &blob(), 0);
        assert_eq!(eq.cmd(ComponentCmd::SetData, &mut cdata, 4096), Err(Error::Busy));
    }

    #[test]
    fn switch_takes_effect_on_next_prepare() {
        let (mut eq, mut source, mut sink, _) =
            prepare_with(&blob(), FrameFormat::S32Le, FrameFormat::S32Le);
        assert_eq!(eq.state().unwrap().delay_len(), 6);

        let mut cdata = CtrlData::enum_pairs(EQ_IDX_SWITCH, &[(1, -1)]);
        eq.cmd(ComponentCmd::SetData, &mut cdata, 4096).unwrap();
        assert_eq!(eq.state().unwrap().delay_len(), 6);

        eq.reset(&[]).unwrap();
        eq.prepare(&mut [&mut source], &mut sink).unwrap();
        assert_eq!(eq.state().unwrap().delay_len(), 2);
        assert!(eq.state().unwrap().channel(1).is_bypass());

        let mut beyond = CtrlData::enum_pairs(EQ_IDX_SWITCH, &[(2, 0)]);
        assert!(eq.cmd(ComponentCmd::SetData, &mut beyond, 4096).is_err());
    }

    #[test]
    fn cache_order() {
        let (eq, _source, _sink, _) =
            prepare_with(&blob(), FrameFormat::S32Le, FrameFormat::S32Le);
        let config = eq.config().as_ptr() as usize;
        let delay = eq.state().unwrap().delay().as_ptr() as usize;
        let private = &*eq.cd as *const IirData as usize;
        let header = &eq as *const EqIir as usize;

        let mut cache = RecordingCache::default();
        eq.cache(CacheCmd::WritebackInvalidate, &mut cache);
        assert_eq!(cache.addrs(), vec![config, delay, private, header]);

        let mut cache = RecordingCache::default();
        eq.cache(CacheCmd::Invalidate, &mut cache);
        assert_eq!(cache.addrs(), vec![header, private, delay, config]);
    }
}
