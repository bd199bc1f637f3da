//! # audio-comp
//!
//! A `no_std` (with `alloc`) set of streaming PCM pipeline components: FIR
//! and IIR equalizers, an N-input mixer and a two-stage polyphase sample rate
//! converter. Components share one lifecycle contract and exchange audio
//! through interleaved ring buffers owned by the orchestrator.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Links | [`buffer`] | [`AudioBuffer`] ring and copy-limit calculation |
//! | Contract | [`component`] | [`Component`] trait, state machine, controls, cache, registry |
//! | Formats | [`format`] | frame formats and negotiated stream parameters |
//! | DSP | [`dsp`] | saturation and Q-format helpers |
//! | Config | [`blob`] | coefficient blob header and record parsing |
//! | Engines | [`eq_fir`] / [`eq_iir`] / [`mixer`] / [`src`] | processing components (feature-gated) |
//!
//! ## Quick start
//!
//! ```ignore
//! use audio_comp::component::{ComponentDescriptor, ComponentRegistry, Trigger};
//! use audio_comp::{AudioBuffer, FrameFormat, StreamParams};
//!
//! let registry = ComponentRegistry::with_builtin();
//! let mut src = registry.create(&ComponentDescriptor::src(1, 0, 48000))?;
//!
//! let mut params = StreamParams::new(16000, 2, FrameFormat::S16Le);
//! src.params(&mut params)?; // params.rate is now 48000
//!
//! let mut source = AudioBuffer::new(256, FrameFormat::S16Le, 2)?;
//! let mut sink = AudioBuffer::new(256, FrameFormat::S16Le, 2)?;
//! src.prepare(&mut [&mut source], &mut sink)?;
//! src.trigger(Trigger::Start, &[&source], &sink)?;
//!
//! // once per scheduling period:
//! src.copy(&mut [&mut source], &mut sink)?;
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `eq-fir` | yes | FIR equalizer |
//! | `eq-iir` | yes | IIR equalizer |
//! | `mixer` | yes | N-input mixer |
//! | `src` | yes | sample rate converter |
//!
//! ## Audio parameters
//!
//! - **Formats:** S16, S24 in a 32-bit container, S32 ([`FrameFormat`])
//! - **Internal precision:** Q1.31 samples, 64-bit accumulators
//! - **Channels:** up to [`constants::MAX_CHANNELS`]
//! - **SRC rates:** [`constants::SRC_RATES`]

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod blob;
pub mod buffer;
pub mod component;
pub mod constants;
pub mod dsp;
pub mod error;
pub mod format;

#[cfg(feature = "eq-fir")]
pub mod eq_fir;

#[cfg(feature = "eq-iir")]
pub mod eq_iir;

#[cfg(feature = "mixer")]
pub mod mixer;

#[cfg(feature = "src")]
pub mod src;


pub use buffer::AudioBuffer;
pub use component::{Component, ComponentDescriptor, ComponentRegistry, CopyStatus, Propagation};
pub use error::{Error, Result};
pub use format::{FrameFormat, StreamDirection, StreamParams};
