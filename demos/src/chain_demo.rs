//! Host-side pipeline: equalized 16 kHz tone, upsampled and mixed.
//!
//! ```text
//!   Sine (16 kHz stream, 440 Hz)
//!         │
//!   EQ FIR (3 dB cut on both channels)
//!         │
//!   SRC 16 kHz → 48 kHz
//!         │
//!      Mixer ←── Sine (48 kHz stream, 1 kHz)
//!         │
//!   peak meter
//! ```
//!
//! Run with `RUST_LOG=debug` to follow the lifecycle, `trace` for per-period
//! copies.

use audio_comp::component::{ComponentState, Trigger};
use audio_comp::eq_fir::{encode_blob, FirResponse};
use audio_comp::{
    AudioBuffer, ComponentDescriptor, ComponentRegistry, CopyStatus, FrameFormat, Result,
    StreamParams,
};

const NCH: usize = 2;
const PERIOD: usize = 48;
const PERIODS: usize = 50;

/// Interleaved stereo sine, continuing from `phase`.
fn tone(phase: &mut f64, freq: f64, rate: f64, frames: usize, amp: f64) -> Vec<i32> {
    let mut out = Vec::with_capacity(frames * NCH);
    for _ in 0..frames {
        let s = (amp * phase.sin()) as i32;
        out.extend_from_slice(&[s; NCH]);
        *phase += 2.0 * std::f64::consts::PI * freq / rate;
    }
    out
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let fmt = FrameFormat::S16Le;
    let mut taps = vec![0i16; 4];
    taps[0] = 23197; // -3 dB in Q1.15
    let blob = encode_blob(&[0, 0], &[FirResponse { out_shift: 0, taps }]);

    let registry = ComponentRegistry::with_builtin();
    let mut eq = registry.create(&ComponentDescriptor::eq_fir(1, &blob))?;
    let mut src = registry.create(&ComponentDescriptor::src(2, 0, 48000))?;
    let mut mixer = registry.create(&ComponentDescriptor::mixer(3))?;

    let mut params = StreamParams::new(16000, NCH, fmt);
    params.period_frames = PERIOD;
    eq.params(&mut params)?;
    src.params(&mut params)?;
    mixer.params(&mut params)?;
    log::info!("negotiated downstream rate {} Hz", params.rate);

    let link = |frames: usize| AudioBuffer::new(fmt.frame_bytes(NCH) * frames, fmt, NCH);
    let mut host_in = link(2 * PERIOD)?;
    let mut eq_out = link(1)?;
    let mut src_out = link(1)?;
    let mut direct = link(2 * PERIOD)?;
    let mut mix_out = link(1)?;

    eq.prepare(&mut [&mut host_in], &mut eq_out)?;
    src.prepare(&mut [&mut eq_out], &mut src_out)?;
    mixer.prepare(&mut [&mut src_out, &mut direct], &mut mix_out)?;

    eq.trigger(Trigger::Start, &[&host_in], &eq_out)?;
    src.trigger(Trigger::Start, &[&eq_out], &src_out)?;
    mixer.trigger(Trigger::Start, &[&src_out, &direct], &mix_out)?;
    for l in [&mut eq_out, &mut src_out, &mut direct] {
        l.set_producer_state(ComponentState::Active);
    }

    let (mut low, mut high) = (0.0, 0.0);
    let mut out = Vec::new();
    for period in 0..PERIODS {
        host_in.push_samples(&tone(&mut low, 440.0, 16000.0, PERIOD / 3, 12000.0))?;
        direct.push_samples(&tone(&mut high, 1000.0, 48000.0, PERIOD, 4000.0))?;

        eq.copy(&mut [&mut host_in], &mut eq_out)?;
        src.copy(&mut [&mut eq_out], &mut src_out)?;
        let status = mixer.copy(&mut [&mut src_out, &mut direct], &mut mix_out)?;

        out.clear();
        mix_out.pop_frames(usize::MAX, &mut out)?;
        let peak = out.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        match status {
            CopyStatus::Processed { produced, .. } => {
                log::info!("period {:2}: {} frames, peak {}", period, produced, peak)
            }
            CopyStatus::NoProgress => log::warn!("period {:2}: no progress", period),
        }
    }

    eq.trigger(Trigger::Stop, &[&host_in], &eq_out)?;
    src.trigger(Trigger::Stop, &[&eq_out], &src_out)?;
    for l in [&mut eq_out, &mut src_out, &mut direct] {
        l.set_producer_state(ComponentState::Prepare);
    }
    mixer.trigger(Trigger::Stop, &[&src_out, &direct], &mix_out)?;

    eq.reset(&[&host_in])?;
    src.reset(&[&eq_out])?;
    for l in [&mut eq_out, &mut src_out, &mut direct] {
        l.set_producer_state(ComponentState::Ready);
    }
    mixer.reset(&[&src_out, &direct])?;
    log::info!("pipeline reset");
    Ok(())
}
