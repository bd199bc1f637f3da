//! Per-period frame budget between a source and a sink ring.

use super::AudioBuffer;

/// How much one `copy` may process without under- or overrunning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyLimits {
    pub frames: usize,
    pub source_bytes: usize,
    pub sink_bytes: usize,
    pub source_frame_bytes: usize,
    pub sink_frame_bytes: usize,
}

impl CopyLimits {
    pub fn new(source: &AudioBuffer, sink: &AudioBuffer) -> Self {
        let source_frame_bytes = source.frame_bytes();
        let sink_frame_bytes = sink.frame_bytes();
        let frames = frames_processable(
            source.avail(),
            source_frame_bytes,
            sink.free(),
            sink_frame_bytes,
        );
        CopyLimits {
            frames,
            source_bytes: frames * source_frame_bytes,
            sink_bytes: frames * sink_frame_bytes,
            source_frame_bytes,
            sink_frame_bytes,
        }
    }

    /// No whole frame fits this period.
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// `min(source_avail / source_frame_bytes, sink_free / sink_frame_bytes)`.
pub fn frames_processable(
    source_avail: usize,
    source_frame_bytes: usize,
    sink_free: usize,
    sink_frame_bytes: usize,
) -> usize {
    if source_frame_bytes == 0 || sink_frame_bytes == 0 {
        return 0;
    }
    (source_avail / source_frame_bytes).min(sink_free / sink_frame_bytes)
}
