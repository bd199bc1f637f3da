//! N-source PCM mixer.
//!
//! Sums every source whose producer runs in the same state as the mixer into
//! one sink, widening the accumulator and saturating back to the sink width.
//! The mixer keeps running while any of its sources is still active, so a
//! stop or pause from one stream does not silence the others.

use alloc::boxed::Box;

use crate::buffer::AudioBuffer;
use crate::component::cache::sync_regions;
use crate::component::{
    set_sink_buffer, CacheCmd, CacheOps, CacheRegion, CompDev, Component, ComponentCmd,
    ComponentDescriptor, ComponentState, ComponentType, CopyStatus, CtrlData, Propagation,
    StateChange, Trigger,
};
use crate::constants::MAX_STREAMS;
use crate::dsp::intrinsics::{sat_int24, sat_int32, saturate16};
use crate::error::{Error, Result};
use crate::format::{FrameFormat, StreamParams};

#[derive(Debug)]
struct MixerData {
    /// Sink width the mix function accumulates for.
    mix_fmt: FrameFormat,
    period_bytes: usize,
}

/// Mixer component.
pub struct Mixer {
    dev: CompDev,
    md: Box<MixerData>,
}

/// Mix 16-bit sources, 32-bit accumulation.
fn mix_n_s16(sources: &[&mut AudioBuffer], sel: &[usize], sink: &mut AudioBuffer, samples: usize) {
    for frag in 0..samples {
        let val: i32 = sel
            .iter()
            .map(|&j| sources[j].read_frag_s16(frag) as i32)
            .sum();
        sink.write_frag_s16(frag, saturate16(val));
    }
}

/// Mix 24-bit samples in 32-bit containers.
fn mix_n_s24(sources: &[&mut AudioBuffer], sel: &[usize], sink: &mut AudioBuffer, samples: usize) {
    for frag in 0..samples {
        let val: i64 = sel
            .iter()
            .map(|&j| sources[j].read_frag_s32(frag) as i64)
            .sum();
        sink.write_frag_s32(frag, sat_int24(val));
    }
}

/// Mix 32-bit sources, 64-bit accumulation.
fn mix_n_s32(sources: &[&mut AudioBuffer], sel: &[usize], sink: &mut AudioBuffer, samples: usize) {
    for frag in 0..samples {
        let val: i64 = sel
            .iter()
            .map(|&j| sources[j].read_frag_s32(frag) as i64)
            .sum();
        sink.write_frag_s32(frag, sat_int32(val));
    }
}

impl Mixer {
    pub fn new(desc: &ComponentDescriptor) -> Result<Self> {
        log::debug!("mixer_new()");
        desc.validate(ComponentType::Mixer)?;
        Ok(Mixer {
            dev: CompDev::new(desc),
            md: Box::new(MixerData {
                mix_fmt: FrameFormat::S32Le,
                period_bytes: 0,
            }),
        })
    }

    /// Sample width the mixer currently sums in.
    pub fn mix_format(&self) -> FrameFormat {
        self.md.mix_fmt
    }

    fn mix(&self, sources: &[&mut AudioBuffer], sel: &[usize], sink: &mut AudioBuffer, frames: usize) {
        let samples = frames * sink.channels();
        match self.md.mix_fmt {
            FrameFormat::S16Le => mix_n_s16(sources, sel, sink, samples),
            FrameFormat::S24In32Le => mix_n_s24(sources, sel, sink, samples),
            FrameFormat::S32Le => mix_n_s32(sources, sel, sink, samples),
        }
    }
}

impl Component for Mixer {
    fn dev(&self) -> &CompDev {
        &self.dev
    }

    fn dev_mut(&mut self) -> &mut CompDev {
        &mut self.dev
    }

    fn params(&mut self, params: &mut StreamParams) -> Result<()> {
        log::debug!("mixer_params()");
        params.validate()?;
        self.dev.params = *params;
        self.dev.frames = params.period_frames;

        let period_bytes = self.dev.period_bytes();
        if period_bytes == 0 {
            log::error!("mixer_params(): period_bytes = 0");
            return Err(Error::InvalidArgument("period bytes is zero"));
        }
        self.md.period_bytes = period_bytes;
        Ok(())
    }

    /// The mixer may already be running with other sources. Only set up
    /// when inactive; ask for downstream prepare only when no source is
    /// paused or running.
    fn prepare(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<Propagation> {
        log::debug!("mixer_prepare()");
        if self.dev.state != ComponentState::Active {
            self.md.mix_fmt = sink.frame_fmt();
            if self.dev.set_state(Trigger::Prepare)? == StateChange::AlreadySet {
                return Ok(Propagation::Stop);
            }
            let period_bytes = self.md.period_bytes;
            if let Err(e) = set_sink_buffer(&self.dev, sink, period_bytes) {
                log::error!("mixer_prepare(): comp_set_sink_buffer() failed");
                self.dev.set_state(Trigger::Reset)?;
                return Err(e);
            }
        }

        let running = sources.iter().any(|s| {
            matches!(
                s.producer_state(),
                ComponentState::Paused | ComponentState::Active
            )
        });
        Ok(if running {
            Propagation::Stop
        } else {
            Propagation::Downstream
        })
    }

    fn trigger(
        &mut self,
        trigger: Trigger,
        sources: &[&AudioBuffer],
        sink: &AudioBuffer,
    ) -> Result<Propagation> {
        log::debug!("mixer_trigger(): {:?}", trigger);
        if self.dev.set_state(trigger)? == StateChange::AlreadySet {
            return Ok(Propagation::Stop);
        }

        match trigger {
            Trigger::Start | Trigger::Release => {
                if sink.consumer_state() == ComponentState::Active {
                    return Ok(Propagation::Stop);
                }
            }
            Trigger::Pause | Trigger::Stop => {
                if sources
                    .iter()
                    .any(|s| s.producer_state() == ComponentState::Active)
                {
                    self.dev.state = ComponentState::Active;
                    return Ok(Propagation::Stop);
                }
            }
            _ => {}
        }
        Ok(Propagation::Downstream)
    }

    fn copy(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<CopyStatus> {
        log::trace!("mixer_copy()");
        let mut sel = [0usize; MAX_STREAMS];
        let mut num = 0;
        for (j, source) in sources.iter().enumerate() {
            if source.producer_state() != self.dev.state {
                continue;
            }
            if num == MAX_STREAMS {
                log::warn!("mixer_copy(): more than {} sources to mix", MAX_STREAMS);
                return Ok(CopyStatus::NoProgress);
            }
            sel[num] = j;
            num += 1;
        }
        let sel = &sel[..num];
        if sel.is_empty() {
            return Ok(CopyStatus::NoProgress);
        }

        let frame_bytes = sources[sel[0]].frame_bytes();
        if sel.iter().any(|&j| sources[j].frame_bytes() != frame_bytes) {
            log::error!("mixer_copy(): sources differ in frame size");
            return Err(Error::InvalidArgument("mixed sources differ in frame size"));
        }

        let frames = sel
            .iter()
            .map(|&j| sources[j].avail_frames())
            .fold(sink.free_frames(), usize::min);
        if frames == 0 {
            return Ok(CopyStatus::NoProgress);
        }

        let source_bytes = frames * frame_bytes;
        let sink_bytes = frames * sink.frame_bytes();
        log::trace!(
            "mixer_copy(): source_bytes = {:#x}, sink_bytes = {:#x}",
            source_bytes,
            sink_bytes
        );

        self.mix(sources, sel, sink, frames);

        for &j in sel {
            sources[j].consume(source_bytes)?;
        }
        sink.produce(sink_bytes)?;

        Ok(CopyStatus::Processed {
            consumed: frames,
            produced: frames,
        })
    }

    fn reset(&mut self, sources: &[&AudioBuffer]) -> Result<Propagation> {
        log::debug!("mixer_reset()");
        if sources
            .iter()
            .any(|s| s.producer_state() > ComponentState::Ready)
        {
            // other streams still feed the mixer; leave downstream alone
            return Ok(Propagation::Stop);
        }
        self.dev.set_state(Trigger::Reset)?;
        Ok(Propagation::Downstream)
    }

    fn cmd(&mut self, cmd: ComponentCmd, _cdata: &mut CtrlData, _max_size: usize) -> Result<()> {
        log::error!("mixer_cmd(): unsupported {:?}", cmd);
        Err(Error::InvalidArgument("mixer has no controls"))
    }

    fn cache(&self, cmd: CacheCmd, ops: &mut dyn CacheOps) {
        log::debug!("mixer_cache(): {:?}", cmd);
        let regions = [
            CacheRegion::of::<MixerData>(&self.md),
            CacheRegion::of(self),
        ];
        sync_regions(cmd, &regions, ops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::cache::testing::RecordingCache;
    use alloc::vec;
    use alloc::vec::Vec;

    const NCH: usize = 2;

    fn link(fmt: FrameFormat, state: ComponentState) -> AudioBuffer {
        let mut b = AudioBuffer::new(fmt.frame_bytes(NCH) * 16, fmt, NCH).unwrap();
        b.set_producer_state(state);
        b
    }

    fn running(fmt: FrameFormat) -> (Mixer, AudioBuffer) {
        let mut mixer = Mixer::new(&ComponentDescriptor::mixer(3)).unwrap();
        let mut params = StreamParams::new(48000, NCH, fmt);
        params.period_frames = 8;
        mixer.params(&mut params).unwrap();
        let mut sink = link(fmt, ComponentState::Ready);
        let mut idle = link(fmt, ComponentState::Ready);
        mixer.prepare(&mut [&mut idle], &mut sink).unwrap();
        mixer.trigger(Trigger::Start, &[], &sink).unwrap();
        assert_eq!(mixer.dev().state, ComponentState::Active);
        (mixer, sink)
    }

    fn mix(mixer: &mut Mixer, sources: &mut [AudioBuffer], sink: &mut AudioBuffer) -> Vec<i32> {
        let mut refs: Vec<&mut AudioBuffer> = sources.iter_mut().collect();
        mixer.copy(&mut refs, sink).unwrap();
        let mut out = vec![];
        sink.pop_frames(16, &mut out).unwrap();
        out
    }

    fn filled(fmt: FrameFormat, samples: &[i32]) -> AudioBuffer {
        let mut b = link(fmt, ComponentState::Active);
        b.push_samples(samples).unwrap();
        b
    }

    #[test]
    fn mixing_is_commutative() {
        let a = [100, -200, 300, -400];
        let b = [7, 8, 9, 10];
        let c = [-1000, 1000, -1000, 1000];
        for fmt in [FrameFormat::S16Le, FrameFormat::S24In32Le, FrameFormat::S32Le] {
            let (mut mixer, mut sink) = running(fmt);
            let abc = mix(
                &mut mixer,
                &mut [filled(fmt, &a), filled(fmt, &b), filled(fmt, &c)],
                &mut sink,
            );
            let cab = mix(
                &mut mixer,
                &mut [filled(fmt, &c), filled(fmt, &a), filled(fmt, &b)],
                &mut sink,
            );
            assert_eq!(abc, cab);
            assert_eq!(abc, vec![-893, 808, -691, 610]);
        }
    }

    #[test]
    fn saturation_at_boundaries() {
        let edge = [i16::MAX as i32, i16::MIN as i32];
        let (mut mixer, mut sink) = running(FrameFormat::S16Le);
        assert_eq!(
            mix(&mut mixer, &mut [filled(FrameFormat::S16Le, &edge)], &mut sink),
            edge.to_vec()
        );
        assert_eq!(
            mix(
                &mut mixer,
                &mut [
                    filled(FrameFormat::S16Le, &edge),
                    filled(FrameFormat::S16Le, &edge)
                ],
                &mut sink
            ),
            edge.to_vec()
        );

        let edge = [i32::MAX, i32::MIN];
        let (mut mixer, mut sink) = running(FrameFormat::S32Le);
        assert_eq!(
            mix(
                &mut mixer,
                &mut [
                    filled(FrameFormat::S32Le, &edge),
                    filled(FrameFormat::S32Le, &[1, -1])
                ],
                &mut sink
            ),
            edge.to_vec()
        );

        let (mut mixer, mut sink) = running(FrameFormat::S24In32Le);
        let out = mix(
            &mut mixer,
            &mut [
                filled(FrameFormat::S24In32Le, &[0x7f_ffff, -0x80_0000]),
                filled(FrameFormat::S24In32Le, &[1, -1]),
            ],
            &mut sink,
        );
        assert_eq!(out, vec![0x7f_ffff, -0x80_0000]);
    }

    #[test]
    fn only_sources_in_mixer_state_are_mixed() {
        let fmt = FrameFormat::S16Le;
        let (mut mixer, mut sink) = running(fmt);
        let mut paused = filled(fmt, &[1000, 1000]);
        paused.set_producer_state(ComponentState::Paused);
        let mut sources = [filled(fmt, &[5, 6]), paused];
        assert_eq!(mix(&mut mixer, &mut sources, &mut sink), vec![5, 6]);
        assert_eq!(sources[1].avail_frames(), 1);

        // nothing in the mixer state
        sources[0].set_producer_state(ComponentState::Prepare);
        let mut refs: Vec<&mut AudioBuffer> = sources.iter_mut().collect();
        assert_eq!(mixer.copy(&mut refs, &mut sink).unwrap(), CopyStatus::NoProgress);
    }

    #[test]
    fn budget_is_smallest_source() {
        let fmt = FrameFormat::S32Le;
        let (mut mixer, mut sink) = running(fmt);
        let mut long = filled(fmt, &[1, 1, 2, 2, 3, 3]);
        let mut short = filled(fmt, &[10, 10]);
        let status = mixer.copy(&mut [&mut long, &mut short], &mut sink).unwrap();
        assert_eq!(status, CopyStatus::Processed { consumed: 1, produced: 1 });
        assert_eq!(long.avail_frames(), 2);
        assert_eq!(short.avail_frames(), 0);
        assert_eq!(sink.avail_frames(), 1);

        // short source drained: no frames, nothing moves
        let before = long.read_pos();
        assert_eq!(
            mixer.copy(&mut [&mut long, &mut short], &mut sink).unwrap(),
            CopyStatus::NoProgress
        );
        assert_eq!(long.read_pos(), before);
    }

    #[test]
    fn too_many_sources_is_no_progress() {
        let fmt = FrameFormat::S16Le;
        let (mut mixer, mut sink) = running(fmt);
        let mut sources: Vec<AudioBuffer> = (0..MAX_STREAMS + 1).map(|_| filled(fmt, &[1, 1])).collect();
        let mut refs: Vec<&mut AudioBuffer> = sources.iter_mut().collect();
        assert_eq!(mixer.copy(&mut refs, &mut sink).unwrap(), CopyStatus::NoProgress);
    }

    #[test]
    fn mismatched_frames_leave_links_untouched() {
        let fmt = FrameFormat::S16Le;
        let (mut mixer, mut sink) = running(fmt);
        let mut stereo = filled(fmt, &[1, 2, 3, 4]);
        let mut mono = AudioBuffer::new(fmt.frame_bytes(1) * 16, fmt, 1).unwrap();
        mono.set_producer_state(ComponentState::Active);
        mono.push_samples(&[5, 6, 7, 8]).unwrap();

        assert!(matches!(
            mixer.copy(&mut [&mut stereo, &mut mono], &mut sink),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!((stereo.read_pos(), stereo.avail_frames()), (0, 2));
        assert_eq!((mono.read_pos(), mono.avail_frames()), (0, 4));
        assert_eq!((sink.write_pos(), sink.avail()), (0, 0));
    }

    #[test]
    fn stop_absorbed_while_a_source_runs() {
        let fmt = FrameFormat::S16Le;
        let (mut mixer, sink) = running(fmt);
        let live = link(fmt, ComponentState::Active);
        let stopped = link(fmt, ComponentState::Prepare);

        assert_eq!(
            mixer.trigger(Trigger::Stop, &[&live, &stopped], &sink),
            Ok(Propagation::Stop)
        );
        assert_eq!(mixer.dev().state, ComponentState::Active);

        assert_eq!(
            mixer.trigger(Trigger::Stop, &[&stopped], &sink),
            Ok(Propagation::Downstream)
        );
        assert_eq!(mixer.dev().state, ComponentState::Prepare);
    }

    #[test]
    fn start_stops_at_running_sink() {
        let fmt = FrameFormat::S16Le;
        let mut mixer = Mixer::new(&ComponentDescriptor::mixer(3)).unwrap();
        mixer.params(&mut StreamParams::new(48000, NCH, fmt)).unwrap();
        let mut sink = link(fmt, ComponentState::Ready);
        let mut source = link(fmt, ComponentState::Prepare);
        assert_eq!(
            mixer.prepare(&mut [&mut source], &mut sink),
            Ok(Propagation::Downstream)
        );
        sink.set_consumer_state(ComponentState::Active);
        assert_eq!(
            mixer.trigger(Trigger::Start, &[&source], &sink),
            Ok(Propagation::Stop)
        );
        assert_eq!(
            mixer.trigger(Trigger::Start, &[&source], &sink),
            Ok(Propagation::Stop)
        );
    }

    #[test]
    fn prepare_with_running_source_stops_downstream() {
        let fmt = FrameFormat::S32Le;
        let (mut mixer, mut sink) = running(fmt);
        let mut live = link(fmt, ComponentState::Active);
        // already active: no re-setup, downstream is running
        assert_eq!(
            mixer.prepare(&mut [&mut live], &mut sink),
            Ok(Propagation::Stop)
        );
        assert_eq!(mixer.dev().state, ComponentState::Active);
    }

    #[test]
    fn reset_waits_for_sources() {
        let fmt = FrameFormat::S16Le;
        let (mut mixer, _sink) = running(fmt);
        let live = link(fmt, ComponentState::Paused);
        assert_eq!(mixer.reset(&[&live]), Ok(Propagation::Stop));
        assert_eq!(mixer.dev().state, ComponentState::Active);

        let idle = link(fmt, ComponentState::Ready);
        assert_eq!(mixer.reset(&[&idle]), Ok(Propagation::Downstream));
        assert_eq!(mixer.dev().state, ComponentState::Ready);
    }

    #[test]
    fn zero_period_rejected() {
        let mut mixer = Mixer::new(&ComponentDescriptor::mixer(3)).unwrap();
        let mut params = StreamParams::new(48000, NCH, FrameFormat::S16Le);
        params.period_frames = 0;
        assert!(mixer.params(&mut params).is_err());
    }

    #[test]
    fn no_controls() {
        let mut mixer = Mixer::new(&ComponentDescriptor::mixer(3)).unwrap();
        let mut cdata = CtrlData::binary_request(0);
        assert!(mixer.cmd(ComponentCmd::GetData, &mut cdata, 64).is_err());
    }

    #[test]
    fn cache_order() {
        let mixer = Mixer::new(&ComponentDescriptor::mixer(3)).unwrap();
        let private = &*mixer.md as *const MixerData as usize;
        let header = &mixer as *const Mixer as usize;
        let mut cache = RecordingCache::default();
        mixer.cache(CacheCmd::WritebackInvalidate, &mut cache);
        assert_eq!(cache.addrs(), vec![private, header]);
        let mut cache = RecordingCache::default();
        mixer.cache(CacheCmd::Invalidate, &mut cache);
        assert_eq!(cache.addrs(), vec![header, private]);
    }
}
