//! The processing contract every pipeline component implements.
//!
//! The orchestrator creates components through a [`ComponentRegistry`], owns
//! the [`AudioBuffer`] links between them, and drives each one through the
//! lifecycle:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | `new` | validate the descriptor, copy any configuration blob |
//! | [`params`](Component::params) | stream-format negotiation only |
//! | [`prepare`](Component::prepare) | engine setup, processing-function selection |
//! | [`trigger`](Component::trigger) | run-state transitions |
//! | [`copy`](Component::copy) | one period of processing |
//! | [`reset`](Component::reset) | release filter state, back to READY |
//! | [`cmd`](Component::cmd) | runtime control messages |
//! | [`cache`](Component::cache) | cache maintenance of owned memory |
//!
//! Freeing a component is dropping it.

pub mod cache;
pub mod ctrl;
pub mod descriptor;
pub mod registry;
pub mod state;

pub use cache::{CacheCmd, CacheOps, CacheRegion};
pub use ctrl::{AbiData, ComponentCmd, CtrlData, CtrlType};
pub use descriptor::{ComponentConfig, ComponentDescriptor};
pub use registry::{ComponentCtor, ComponentRegistry};
pub use state::{set_state, ComponentState, StateChange, Trigger};

use crate::buffer::AudioBuffer;
use crate::error::{Error, Result};
use crate::format::StreamParams;

/// Processing engine kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Mixer,
    EqFir,
    EqIir,
    Src,
}

/// Whether a lifecycle operation should continue to neighbouring components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Downstream,
    /// Already set, or absorbed here; do not forward.
    Stop,
}

/// Result of one `copy` period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    /// Frames taken from each source and written to the sink.
    Processed { consumed: usize, produced: usize },
    /// Nothing could be processed this period. Buffers are untouched.
    NoProgress,
}

/// State common to every component instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompDev {
    pub id: u32,
    pub pipeline_id: u32,
    pub comp_type: ComponentType,
    pub state: ComponentState,
    pub params: StreamParams,
    /// Frames per scheduling period.
    pub frames: usize,
    pub periods_sink: u32,
    pub periods_source: u32,
}

impl CompDev {
    pub fn new(desc: &ComponentDescriptor) -> Self {
        let params = StreamParams::default();
        CompDev {
            id: desc.id,
            pipeline_id: desc.pipeline_id,
            comp_type: desc.comp_type(),
            state: ComponentState::Ready,
            frames: params.period_frames,
            params,
            periods_sink: desc.periods_sink,
            periods_source: desc.periods_source,
        }
    }

    /// Apply `trigger` to this component's state.
    pub fn set_state(&mut self, trigger: Trigger) -> Result<StateChange> {
        set_state(&mut self.state, trigger)
    }

    /// Negotiated period size of this component in bytes.
    pub fn period_bytes(&self) -> usize {
        self.frames * self.params.frame_bytes()
    }
}

/// Driver operations of a pipeline component.
///
/// Buffer links are passed in explicitly; components never hold references
/// to their neighbours.
pub trait Component {
    fn dev(&self) -> &CompDev;

    fn dev_mut(&mut self) -> &mut CompDev;

    /// Negotiate stream parameters. May be called more than once before
    /// `prepare`; allocates nothing.
    fn params(&mut self, params: &mut StreamParams) -> Result<()>;

    /// Set up processing for the negotiated format.
    ///
    /// Returns [`Propagation::Stop`] if the component was already prepared.
    fn prepare(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<Propagation>;

    fn trigger(
        &mut self,
        trigger: Trigger,
        sources: &[&AudioBuffer],
        sink: &AudioBuffer,
    ) -> Result<Propagation>;

    /// Process one period.
    fn copy(
        &mut self,
        sources: &mut [&mut AudioBuffer],
        sink: &mut AudioBuffer,
    ) -> Result<CopyStatus>;

    fn reset(&mut self, sources: &[&AudioBuffer]) -> Result<Propagation>;

    fn cmd(&mut self, cmd: ComponentCmd, cdata: &mut CtrlData, max_size: usize) -> Result<()>;

    fn cache(&self, cmd: CacheCmd, ops: &mut dyn CacheOps);
}

/// The only source of a single-input component.
pub(crate) fn single_source<'a>(
    sources: &'a mut [&mut AudioBuffer],
) -> Result<&'a mut AudioBuffer> {
    let count = sources.len();
    match sources {
        [source] => Ok(&mut **source),
        _ => {
            log::error!("comp_copy(): expected one source, got {}", count);
            Err(Error::InvalidArgument("component takes exactly one source"))
        }
    }
}

/// Size the downstream ring to `periods_sink` periods of `period_bytes`.
///
/// A ring that already has that size is left as is, so a sink shared by
/// several producers is not cleared twice.
pub(crate) fn set_sink_buffer(
    dev: &CompDev,
    sink: &mut AudioBuffer,
    period_bytes: usize,
) -> Result<()> {
    let size = period_bytes * dev.periods_sink as usize;
    if size == 0 {
        log::error!("comp_set_sink_buffer(): zero period bytes, id {}", dev.id);
        return Err(Error::InvalidArgument("sink period bytes is zero"));
    }
    if sink.size() != size {
        sink.set_size(size)?;
    }
    Ok(())
}

/// Validate the trigger a single-input component received and map the
/// state change to a propagation decision.
pub(crate) fn trigger_common(dev: &mut CompDev, trigger: Trigger) -> Result<Propagation> {
    log::debug!("comp_trigger(): id {} {:?}", dev.id, trigger);
    match dev.set_state(trigger)? {
        StateChange::Changed => Ok(Propagation::Downstream),
        StateChange::AlreadySet => Ok(Propagation::Stop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FrameFormat;

    #[test]
    fn dev_starts_ready() {
        let dev = CompDev::new(&ComponentDescriptor::mixer(7));
        assert_eq!(dev.id, 7);
        assert_eq!(dev.state, ComponentState::Ready);
        assert_eq!(dev.comp_type, ComponentType::Mixer);
    }

    #[test]
    fn period_bytes_follow_params() {
        let mut dev = CompDev::new(&ComponentDescriptor::mixer(1));
        dev.params = StreamParams::new(48000, 2, FrameFormat::S16Le);
        dev.frames = 48;
        assert_eq!(dev.period_bytes(), 192);
    }

    #[test]
    fn single_source_requires_exactly_one() {
        let mut a = AudioBuffer::new(16, FrameFormat::S16Le, 1).unwrap();
        let mut b = AudioBuffer::new(16, FrameFormat::S16Le, 1).unwrap();
        assert!(single_source(&mut [&mut a]).is_ok());
        assert!(single_source(&mut [&mut a, &mut b]).is_err());
        assert!(single_source(&mut []).is_err());
    }

    #[test]
    fn trigger_common_stops_on_already_set() {
        let mut dev = CompDev::new(&ComponentDescriptor::mixer(1));
        assert_eq!(trigger_common(&mut dev, Trigger::Prepare), Ok(Propagation::Downstream));
        assert_eq!(trigger_common(&mut dev, Trigger::Prepare), Ok(Propagation::Stop));
    }
}
