//! Polyphase sample rate converter.
//!
//! One side's rate is fixed at creation, the other comes from the stream
//! parameters. [`SrcParam`] picks one of three modes from the rate pair:
//!
//! - equal rates: bulk copy in contiguous runs up to either ring's wrap
//! - one polyphase stage
//! - two stages joined by a staging ring that holds stage-1 output
//!
//! All delay lines and the staging ring share one arena:
//! `[staging | fir1 | out1 | fir2 | out2]`.

pub mod polyphase;
pub mod table;

use alloc::boxed::Box;
use alloc::vec::Vec;

pub use polyphase::PolyphaseStage;
pub use table::{SrcMode, SrcParam, StageDesc};

use polyphase::{BufferReader, BufferWriter, RingReader, RingWriter};

use crate::buffer::AudioBuffer;
use crate::component::cache::sync_regions;
use crate::component::{
    set_sink_buffer, single_source, trigger_common, CacheCmd, CacheOps, CacheRegion, CompDev,
    Component, ComponentCmd, ComponentConfig, ComponentDescriptor, ComponentType, CopyStatus,
    CtrlData, Propagation, StateChange, Trigger,
};
use crate::constants::{SRC_MAX_FIR_DELAY_SIZE, SRC_MAX_OUT_DELAY_SIZE};
use crate::error::{Error, Result};
use crate::format::{FrameFormat, StreamDirection, StreamParams};

/// Blocks one `copy` may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Blocks {
    stage1_times: usize,
    stage2_times: usize,
    /// Frames the run may consume.
    blk_in: usize,
    /// Frames the run may produce.
    blk_out: usize,
}

#[derive(Debug)]
struct SrcData {
    param: Option<SrcParam>,
    mode: Option<SrcMode>,
    delay_lines: Vec<i32>,
    stage1: Option<PolyphaseStage>,
    stage2: Option<PolyphaseStage>,
    source_rate: u32,
    sink_rate: u32,
    source_frames: usize,
    sink_frames: usize,
    source_format: FrameFormat,
    sink_format: FrameFormat,
    /// Staging ring positions and fill, in samples.
    sbuf_w: usize,
    sbuf_r: usize,
    sbuf_avail: usize,
}

/// Sample rate converter.
pub struct Src {
    dev: CompDev,
    /// Rates from the descriptor; `0` is taken from the stream.
    ipc_source_rate: u32,
    ipc_sink_rate: u32,
    cd: Box<SrcData>,
}

/// Split the arena into staging ring and per-stage delay lines.
fn split_delay_lines<'a>(
    lines: &'a mut [i32],
    p: &SrcParam,
) -> (&'a mut [i32], &'a mut [i32], &'a mut [i32], &'a mut [i32], &'a mut [i32]) {
    let (sbuf, rest) = lines.split_at_mut(p.sbuf_length);
    let (fir1, rest) = rest.split_at_mut(p.fir_s1);
    let (out1, rest) = rest.split_at_mut(p.out_s1);
    let (fir2, out2) = rest.split_at_mut(p.fir_s2);
    (sbuf, fir1, out1, fir2, out2)
}

/// Copy `frames` frames between links of the same format without per-sample
/// wrap checks.
fn src_copy(source: &AudioBuffer, sink: &mut AudioBuffer, frames: usize) {
    let source_size = source.size();
    let sink_size = sink.size();
    let mut r = source.read_pos();
    let mut w = sink.write_pos();
    let mut n = frames * source.frame_bytes();
    while n > 0 {
        let n_copy = n.min(source_size - r).min(sink_size - w);
        sink.bytes_mut()[w..w + n_copy].copy_from_slice(&source.bytes()[r..r + n_copy]);
        n -= n_copy;
        r += n_copy;
        w += n_copy;
        if r == source_size {
            r = 0;
        }
        if w == sink_size {
            w = 0;
        }
    }
}

impl SrcData {
    fn copy_limits(&self, p: &SrcParam, source: &AudioBuffer, sink: &AudioBuffer) -> Option<Blocks> {
        let s1 = p.stage1();
        let s2 = p.stage2();
        let frames_snk = sink.free_frames();
        let frames_src = source.avail_frames();

        let blocks = if s2.filter_length > 1 {
            let stage2_times = frames_snk.min(self.sink_frames + s2.blk_out) / s2.blk_out;
            let stage1_times = frames_src.min(self.source_frames + s1.blk_in) / s1.blk_in;
            Blocks {
                stage1_times,
                stage2_times,
                blk_in: stage1_times * s1.blk_in,
                blk_out: stage2_times * s2.blk_out,
            }
        } else {
            let by_sink = frames_snk.min(self.sink_frames + s1.blk_out) / s1.blk_out;
            let by_source = frames_src.min(self.source_frames + s1.blk_in) / s1.blk_in;
            let stage1_times = by_sink.min(by_source);
            Blocks {
                stage1_times,
                stage2_times: 0,
                blk_in: stage1_times * s1.blk_in,
                blk_out: stage1_times * s1.blk_out,
            }
        };

        if blocks.blk_in == 0 || blocks.blk_out == 0 {
            None
        } else {
            Some(blocks)
        }
    }

    /// One polyphase stage straight from source to sink.
    fn run_1s(
        &mut self,
        p: &SrcParam,
        b: Blocks,
        source: &AudioBuffer,
        sink: &mut AudioBuffer,
    ) -> (usize, usize) {
        let Some(stage1) = self.stage1.as_mut() else {
            return (0, 0);
        };
        let (_, fir1, out1, _, _) = split_delay_lines(&mut self.delay_lines, p);
        let mut input = BufferReader::new(source);
        let mut output = BufferWriter::new(sink);
        stage1.process(fir1, out1, &mut input, &mut output, b.stage1_times, p.nch);
        (b.blk_in, b.blk_out)
    }

    /// Two stages through the staging ring. Free staging space usually
    /// bounds stage 1, staged samples bound stage 2.
    fn run_2s(
        &mut self,
        p: &SrcParam,
        b: Blocks,
        source: &AudioBuffer,
        sink: &mut AudioBuffer,
    ) -> (usize, usize) {
        let (Some(stage1), Some(stage2)) = (self.stage1.as_mut(), self.stage2.as_mut()) else {
            return (0, 0);
        };
        let nch = p.nch;
        let s1 = stage1.desc;
        let s2 = stage2.desc;
        let (sbuf, fir1, out1, fir2, out2) = split_delay_lines(&mut self.delay_lines, p);
        let mut n_read = 0;
        let mut n_written = 0;

        let sbuf_free = p.sbuf_length - self.sbuf_avail;
        let mut times = b.stage1_times;
        if times * s1.blk_out * nch > sbuf_free {
            times = sbuf_free / (s1.blk_out * nch);
            log::trace!("src_2s(): s1.times = {}", times);
        }
        if times > 0 {
            let mut input = BufferReader::new(source);
            let mut output = RingWriter::new(sbuf, self.sbuf_w);
            stage1.process(fir1, out1, &mut input, &mut output, times, nch);
            self.sbuf_w = output.pos;
            self.sbuf_avail += times * s1.blk_out * nch;
            n_read = times * s1.blk_in;
        }

        let mut times = b.stage2_times;
        if times * s2.blk_in * nch > self.sbuf_avail {
            times = self.sbuf_avail / (s2.blk_in * nch);
            log::trace!("src_2s(): s2.times = {}", times);
        }
        if times > 0 {
            let mut input = RingReader::new(sbuf, self.sbuf_r);
            let mut output = BufferWriter::new(sink);
            stage2.process(fir2, out2, &mut input, &mut output, times, nch);
            self.sbuf_r = input.pos;
            self.sbuf_avail -= times * s2.blk_in * nch;
            n_written = times * s2.blk_out;
        }

        (n_read, n_written)
    }

    fn release(&mut self) {
        self.mode = None;
        self.stage1 = None;
        self.stage2 = None;
        self.delay_lines = Vec::new();
        self.sbuf_w = 0;
        self.sbuf_r = 0;
        self.sbuf_avail = 0;
    }
}

fn check_stage(desc: &StageDesc) -> Result<()> {
    if desc.fir_delay_length() > SRC_MAX_FIR_DELAY_SIZE
        || desc.out_delay_length() > SRC_MAX_OUT_DELAY_SIZE
    {
        log::error!(
            "src_init_stages(): delay sizes {} / {} over limits",
            desc.fir_delay_length(),
            desc.out_delay_length()
        );
        return Err(Error::InvalidArgument("stage delay line too long"));
    }
    Ok(())
}

impl Src {
    pub fn new(desc: &ComponentDescriptor) -> Result<Self> {
        log::debug!("src_new()");
        desc.validate(ComponentType::Src)?;
        let (source_rate, sink_rate) = match desc.config {
            ComponentConfig::Src {
                source_rate,
                sink_rate,
            } => (source_rate, sink_rate),
            _ => return Err(Error::InvalidArgument("descriptor type mismatch")),
        };
        if source_rate == 0 && sink_rate == 0 {
            log::error!("src_new(): SRC sink and source rate are not set");
            return Err(Error::InvalidArgument("no SRC rate set"));
        }

        Ok(Src {
            dev: CompDev::new(desc),
            ipc_source_rate: source_rate,
            ipc_sink_rate: sink_rate,
            cd: Box::new(SrcData {
                param: None,
                mode: None,
                delay_lines: Vec::new(),
                stage1: None,
                stage2: None,
                source_rate: 0,
                sink_rate: 0,
                source_frames: 0,
                sink_frames: 0,
                source_format: FrameFormat::S32Le,
                sink_format: FrameFormat::S32Le,
                sbuf_w: 0,
                sbuf_r: 0,
                sbuf_avail: 0,
            }),
        })
    }

    /// Conversion mode chosen at `prepare`, `None` until then.
    pub fn mode(&self) -> Option<SrcMode> {
        self.cd.mode
    }

    pub fn param(&self) -> Option<&SrcParam> {
        self.cd.param.as_ref()
    }

    pub fn rates(&self) -> (u32, u32) {
        (self.cd.source_rate, self.cd.sink_rate)
    }

    /// Source and sink frames per period.
    pub fn period_frames(&self) -> (usize, usize) {
        (self.cd.source_frames, self.cd.sink_frames)
    }

    /// Samples waiting in the staging ring.
    pub fn staged(&self) -> usize {
        self.cd.sbuf_avail
    }

    fn setup(&mut self, sources: &mut [&mut AudioBuffer], sink: &mut AudioBuffer) -> Result<()> {
        let p = match self.cd.param {
            Some(p) => p,
            None => {
                log::error!("src_prepare(): stream parameters not set");
                return Err(Error::InvalidArgument("params not negotiated"));
            }
        };
        let source = single_source(sources)?;
        let cd = &mut *self.cd;

        cd.source_format = source.frame_fmt();
        cd.sink_format = sink.frame_fmt();
        if cd.source_format != cd.sink_format
            || source.channels() != p.nch
            || sink.channels() != p.nch
        {
            log::error!(
                "src_prepare(): link mismatch, source {:?}/{} sink {:?}/{}",
                cd.source_format,
                source.channels(),
                cd.sink_format,
                sink.channels()
            );
            return Err(Error::InvalidArgument("source and sink formats differ"));
        }
        self.dev.params.frame_fmt = match self.dev.params.direction {
            StreamDirection::Playback => cd.source_format,
            StreamDirection::Capture => cd.sink_format,
        };

        let source_period_bytes = self.dev.frames * source.frame_bytes();
        let sink_period_bytes = self.dev.frames * sink.frame_bytes();
        set_sink_buffer(&self.dev, sink, sink_period_bytes)?;
        if source_period_bytes == 0 {
            log::error!("src_prepare(): source_period_bytes = 0");
            return Err(Error::InvalidArgument("source period bytes is zero"));
        }

        // one block of the last stage has to fit the sink ring
        let last = if p.mode() == SrcMode::TwoStage { p.stage2() } else { p.stage1() };
        if sink.size() < last.blk_out * sink.frame_bytes()
            || source.size() < p.stage1().blk_in * source.frame_bytes()
        {
            log::error!(
                "src_prepare(): links of {} / {} bytes cannot hold one block",
                source.size(),
                sink.size()
            );
            return Err(Error::InvalidArgument("period too short for SRC block"));
        }

        cd.release();
        if p.total == 0 {
            log::error!("src_prepare(): delay_lines_size = 0");
            return Err(Error::InvalidArgument("no delay lines"));
        }
        let mut lines = Vec::new();
        lines.try_reserve_exact(p.total).map_err(|_| {
            log::error!(
                "src_prepare(): failed to alloc delay lines, size = {}",
                p.total * 4
            );
            Error::ResourceExhausted { bytes: p.total * 4 }
        })?;
        lines.resize(p.total, 0);

        let mode = p.mode();
        check_stage(p.stage1())?;
        cd.stage1 = Some(PolyphaseStage::new(*p.stage1(), p.fir_s1, p.nch)?);
        if mode == SrcMode::TwoStage {
            check_stage(p.stage2())?;
            cd.stage2 = Some(PolyphaseStage::new(*p.stage2(), p.fir_s2, p.nch)?);
        }
        cd.delay_lines = lines;
        cd.mode = Some(mode);
        log::debug!(
            "src_prepare(): mode {:?}, {} -> {} Hz, {} samples of delay lines",
            mode,
            cd.source_rate,
            cd.sink_rate,
            p.total
        );
        Ok(())
    }
}

impl Component for Src {
    fn dev(&self) -> &CompDev {
        &self.dev
    }

    fn dev_mut(&mut self) -> &mut CompDev {
        &mut self.dev
    }

    /// Resolve both rates and size the delay lines. One rate comes from the
    /// descriptor; `params.rate` is rewritten to the other side's rate for
    /// the next component.
    fn params(&mut self, params: &mut StreamParams) -> Result<()> {
        log::debug!("src_params()");
        params.validate()?;
        self.dev.params = *params;
        self.dev.frames = params.period_frames;
        let frames = self.dev.frames as u64;
        let cd = &mut *self.cd;

        if self.ipc_source_rate == 0 {
            cd.source_rate = params.rate;
            cd.sink_rate = self.ipc_sink_rate;
            params.rate = cd.sink_rate;
            cd.source_frames = (frames * cd.source_rate as u64 / cd.sink_rate as u64) as usize;
            cd.sink_frames = frames as usize;
        } else {
            if params.rate == 0 {
                log::error!("src_params(): zero stream rate");
                return Err(Error::InvalidArgument("zero sink rate"));
            }
            cd.source_rate = self.ipc_source_rate;
            cd.sink_rate = params.rate;
            params.rate = cd.source_rate;
            cd.source_frames = frames as usize;
            cd.sink_frames = (frames * cd.sink_rate as u64 / cd.source_rate as u64) as usize;
        }
        log::debug!(
            "src_params(): source_rate = {}, sink_rate = {}, channels = {}, frames = {}",
            cd.source_rate,
            cd.sink_rate,
            params.channels,
            self.dev.frames
        );

        cd.param = None;
        let p = SrcParam::new(
            cd.source_rate,
            cd.sink_rate,
            params.channels,
            cd.source_frames,
        )?;
        cd.param = Some(p);
        Ok(())
    }

    fn prepare(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<Propagation> {
        log::debug!("src_prepare()");
        if self.dev.set_state(Trigger::Prepare)? == StateChange::AlreadySet {
            return Ok(Propagation::Stop);
        }
        if let Err(e) = self.setup(sources, sink) {
            log::error!("src_prepare(): setup failed: {}", e);
            self.cd.release();
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
        log::trace!("src_copy()");
        let source = single_source(sources)?;
        let cd = &mut *self.cd;
        let (Some(mode), Some(p)) = (cd.mode, cd.param) else {
            return Ok(CopyStatus::NoProgress);
        };
        let Some(blocks) = cd.copy_limits(&p, source, sink) else {
            log::trace!("src_copy(): no data to process");
            return Ok(CopyStatus::NoProgress);
        };

        let (consumed, produced) = match mode {
            SrcMode::Copy => {
                src_copy(source, sink, blocks.blk_in);
                (blocks.blk_in, blocks.blk_in)
            }
            SrcMode::SingleStage => cd.run_1s(&p, blocks, source, sink),
            SrcMode::TwoStage => cd.run_2s(&p, blocks, source, sink),
        };
        log::trace!(
            "src_copy(): consumed = {}, produced = {}",
            consumed,
            produced
        );

        if consumed > 0 {
            source.consume(consumed * source.frame_bytes())?;
        }
        if produced > 0 {
            sink.produce(produced * sink.frame_bytes())?;
        }
        if consumed == 0 && produced == 0 {
            return Ok(CopyStatus::NoProgress);
        }
        Ok(CopyStatus::Processed { consumed, produced })
    }

    fn reset(&mut self, _sources: &[&AudioBuffer]) -> Result<Propagation> {
        log::debug!("src_reset()");
        self.cd.release();
        self.dev.set_state(Trigger::Reset)?;
        Ok(Propagation::Downstream)
    }

    fn cmd(&mut self, cmd: ComponentCmd, _cdata: &mut CtrlData, _max_size: usize) -> Result<()> {
        log::debug!("src_cmd(): {:?}", cmd);
        match cmd {
            ComponentCmd::SetValue => {
                log::error!("src_ctrl_cmd(): no runtime controls");
                Err(Error::InvalidArgument("SRC has no runtime controls"))
            }
            _ => Ok(()),
        }
    }

    fn cache(&self, cmd: CacheCmd, ops: &mut dyn CacheOps) {
        log::debug!("src_cache(): {:?}", cmd);
        let regions = [
            CacheRegion::of_slice(&self.cd.delay_lines),
            CacheRegion::of::<SrcData>(&self.cd),
            CacheRegion::of(self),
        ];
        sync_regions(cmd, &regions, ops);
    }
}
