//! Ring buffer linking one producer component to one consumer component.
//!
//! # Contract
//!
//! - Exactly ONE component writes (advances [`produce()`](AudioBuffer::produce)).
//! - Exactly ONE component reads (advances [`consume()`](AudioBuffer::consume)).
//! - The region size is always a whole number of frames, so an interleaved
//!   frame never straddles the wrap point.
//!
//! Scheduling is cooperative, so no atomics are needed: a component's `copy`
//! runs to completion before the neighbour touches the same link.

use alloc::vec::Vec;

use crate::component::ComponentState;
use crate::error::{Error, Result};
use crate::format::FrameFormat;

/// Fixed-capacity circular byte region holding interleaved PCM frames.
pub struct AudioBuffer {
    data: Vec<u8>,
    /// Read offset in bytes (only advanced by the consumer).
    r_pos: usize,
    /// Write offset in bytes (only advanced by the producer).
    w_pos: usize,
    avail: usize,
    free: usize,
    frame_fmt: FrameFormat,
    channels: usize,
    producer_state: ComponentState,
    consumer_state: ComponentState,
}

impl AudioBuffer {
    /// Allocate a zeroed ring of `size` bytes for `channels` of `frame_fmt`.
    pub fn new(size: usize, frame_fmt: FrameFormat, channels: usize) -> Result<Self> {
        let mut buffer = AudioBuffer {
            data: Vec::new(),
            r_pos: 0,
            w_pos: 0,
            avail: 0,
            free: 0,
            frame_fmt,
            channels,
            producer_state: ComponentState::Ready,
            consumer_state: ComponentState::Ready,
        };
        buffer.set_size(size)?;
        Ok(buffer)
    }

    /// Reallocate the region to `size` bytes and clear it.
    ///
    /// `size` must be a non-zero multiple of the frame size.
    pub fn set_size(&mut self, size: usize) -> Result<()> {
        let frame_bytes = self.frame_bytes();
        if size == 0 || frame_bytes == 0 || size % frame_bytes != 0 {
            log::error!(
                "buffer_set_size(): size {} not a multiple of frame bytes {}",
                size,
                frame_bytes
            );
            return Err(Error::InvalidArgument("ring size must be whole frames"));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| Error::ResourceExhausted { bytes: size })?;
        data.resize(size, 0);
        self.data = data;
        self.reset();
        Ok(())
    }

    /// Change the stream format. The size must still be whole frames.
    pub fn set_format(&mut self, frame_fmt: FrameFormat, channels: usize) -> Result<()> {
        let frame_bytes = frame_fmt.frame_bytes(channels);
        if frame_bytes == 0 || self.data.len() % frame_bytes != 0 {
            return Err(Error::InvalidArgument("ring size must be whole frames"));
        }
        self.frame_fmt = frame_fmt;
        self.channels = channels;
        self.reset();
        Ok(())
    }

    /// Clear contents and rewind both positions.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.r_pos = 0;
        self.w_pos = 0;
        self.avail = 0;
        self.free = self.data.len();
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes written but not yet consumed.
    pub fn avail(&self) -> usize {
        self.avail
    }

    /// Bytes that can be written without overrunning the reader.
    pub fn free(&self) -> usize {
        self.free
    }

    pub fn read_pos(&self) -> usize {
        self.r_pos
    }

    pub fn write_pos(&self) -> usize {
        self.w_pos
    }

    pub fn frame_fmt(&self) -> FrameFormat {
        self.frame_fmt
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_fmt.frame_bytes(self.channels)
    }

    pub fn avail_frames(&self) -> usize {
        self.avail / self.frame_bytes()
    }

    pub fn free_frames(&self) -> usize {
        self.free / self.frame_bytes()
    }

    /// Run state of the component writing into this buffer.
    pub fn producer_state(&self) -> ComponentState {
        self.producer_state
    }

    pub fn set_producer_state(&mut self, state: ComponentState) {
        self.producer_state = state;
    }

    /// Run state of the component reading from this buffer.
    pub fn consumer_state(&self) -> ComponentState {
        self.consumer_state
    }

    pub fn set_consumer_state(&mut self, state: ComponentState) {
        self.consumer_state = state;
    }

    /// Advance the write position by `bytes` after the producer filled them.
    ///
    /// Zero is a no-op. Producing more than `free` leaves the ring untouched.
    pub fn produce(&mut self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        if bytes > self.free {
            log::error!("buffer_produce(): {} bytes > free {}", bytes, self.free);
            return Err(Error::InvalidArgument("produce exceeds free space"));
        }
        self.w_pos = (self.w_pos + bytes) % self.data.len();
        self.avail += bytes;
        self.free -= bytes;
        Ok(())
    }

    /// Advance the read position by `bytes` after the consumer used them.
    ///
    /// Zero is a no-op. Consuming more than `avail` leaves the ring untouched.
    pub fn consume(&mut self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        if bytes > self.avail {
            log::error!("buffer_consume(): {} bytes > avail {}", bytes, self.avail);
            return Err(Error::InvalidArgument("consume exceeds available data"));
        }
        self.r_pos = (self.r_pos + bytes) % self.data.len();
        self.avail -= bytes;
        self.free += bytes;
        Ok(())
    }

    #[inline]
    fn frag_offset(&self, pos: usize, idx: usize) -> usize {
        (pos + idx * self.frame_fmt.container_bytes()) % self.data.len()
    }

    /// Read sample `idx` counted from the read position as 16-bit.
    #[inline]
    pub fn read_frag_s16(&self, idx: usize) -> i16 {
        let off = self.frag_offset(self.r_pos, idx);
        i16::from_le_bytes([self.data[off], self.data[off + 1]])
    }

    /// Read sample `idx` counted from the read position as 32-bit.
    #[inline]
    pub fn read_frag_s32(&self, idx: usize) -> i32 {
        let off = self.frag_offset(self.r_pos, idx);
        let b = &self.data[off..off + 4];
        i32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Write sample `idx` counted from the write position as 16-bit.
    #[inline]
    pub fn write_frag_s16(&mut self, idx: usize, val: i16) {
        let off = self.frag_offset(self.w_pos, idx);
        self.data[off..off + 2].copy_from_slice(&val.to_le_bytes());
    }

    /// Write sample `idx` counted from the write position as 32-bit.
    #[inline]
    pub fn write_frag_s32(&mut self, idx: usize, val: i32) {
        let off = self.frag_offset(self.w_pos, idx);
        self.data[off..off + 4].copy_from_slice(&val.to_le_bytes());
    }

    /// Read sample `idx` in the buffer's own container width, sign-extended.
    #[inline]
    pub fn read_sample(&self, idx: usize) -> i32 {
        match self.frame_fmt {
            FrameFormat::S16Le => self.read_frag_s16(idx) as i32,
            FrameFormat::S24In32Le | FrameFormat::S32Le => self.read_frag_s32(idx),
        }
    }

    /// Write sample `idx` in the buffer's own container width.
    #[inline]
    pub fn write_sample(&mut self, idx: usize, val: i32) {
        match self.frame_fmt {
            FrameFormat::S16Le => self.write_frag_s16(idx, val as i16),
            FrameFormat::S24In32Le | FrameFormat::S32Le => self.write_frag_s32(idx, val),
        }
    }

    /// Raw region, for bulk copies that track wrap themselves.
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Append whole frames of samples (in the buffer's width) and produce them.
    ///
    /// This is the host/DMA side of a link; it writes nothing unless every
    /// sample fits.
    pub fn push_samples(&mut self, samples: &[i32]) -> Result<()> {
        let bytes = samples.len() * self.frame_fmt.container_bytes();
        if samples.len() % self.channels != 0 || bytes > self.free {
            return Err(Error::InvalidArgument("samples do not fit as whole frames"));
        }
        for (i, &s) in samples.iter().enumerate() {
            self.write_sample(i, s);
        }
        self.produce(bytes)
    }

    /// Remove up to `max_frames` frames, appending their samples to `out`.
    ///
    /// Returns the number of frames taken.
    pub fn pop_frames(&mut self, max_frames: usize, out: &mut Vec<i32>) -> Result<usize> {
        let frames = max_frames.min(self.avail_frames());
        let n = frames * self.channels;
        out.try_reserve(n)
            .map_err(|_| Error::ResourceExhausted { bytes: n * 4 })?;
        for i in 0..n {
            out.push(self.read_sample(i));
        }
        self.consume(frames * self.frame_bytes())?;
        Ok(frames)
    }
}
