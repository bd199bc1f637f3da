//! PCM stream formats and negotiated stream parameters.

use crate::error::{Error, Result};

/// Sample container layout of an interleaved PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Signed 16-bit samples.
    S16Le,
    /// Signed 24-bit samples, sign-extended in a 32-bit container.
    S24In32Le,
    /// Signed 32-bit samples.
    S32Le,
}

impl FrameFormat {
    /// Bytes occupied by one sample.
    pub const fn container_bytes(self) -> usize {
        match self {
            FrameFormat::S16Le => 2,
            FrameFormat::S24In32Le | FrameFormat::S32Le => 4,
        }
    }

    /// Significant bits per sample.
    pub const fn valid_bits(self) -> u32 {
        match self {
            FrameFormat::S16Le => 16,
            FrameFormat::S24In32Le => 24,
            FrameFormat::S32Le => 32,
        }
    }

    /// Bytes occupied by one frame of `channels` samples.
    pub const fn frame_bytes(self, channels: usize) -> usize {
        self.container_bytes() * channels
    }
}

/// Direction of the stream through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Playback,
    Capture,
}

/// Stream parameters negotiated before `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub rate: u32,
    pub channels: usize,
    pub frame_fmt: FrameFormat,
    pub direction: StreamDirection,
    /// Frames processed per scheduling period.
    pub period_frames: usize,
}

impl StreamParams {
    pub const fn new(rate: u32, channels: usize, frame_fmt: FrameFormat) -> Self {
        StreamParams {
            rate,
            channels,
            frame_fmt,
            direction: StreamDirection::Playback,
            period_frames: 48,
        }
    }

    pub const fn frame_bytes(&self) -> usize {
        self.frame_fmt.frame_bytes(self.channels)
    }

    /// Reject channel counts the components cannot hold state for.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > crate::constants::MAX_CHANNELS {
            return Err(Error::InvalidArgument("channel count out of range"));
        }
        Ok(())
    }
}

impl Default for StreamParams {
    fn default() -> Self {
        StreamParams::new(48000, 2, FrameFormat::S32Le)
    }
}
