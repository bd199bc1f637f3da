//! Processing-function selection for the IIR EQ.
//!
//! The IIR EQ may narrow the stream: a 32-bit source can feed a 16 or 24-bit
//! sink. Functions are looked up by `(source, sink)` format pair in one table
//! for configured filtering and one for pass-through.

use crate::buffer::AudioBuffer;
use crate::dsp::helpers::{from_q31, to_q31};
use crate::format::FrameFormat;

use super::config::IirState;

/// Processing function selected at `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IirFunc {
    /// Filter through the configured cascades.
    Filter {
        source: FrameFormat,
        sink: FrameFormat,
    },
    /// Copy 16-bit containers.
    Copy16,
    /// Copy 32-bit containers.
    Copy32,
    /// Narrow 32-bit samples to the sink width without filtering.
    Convert {
        source: FrameFormat,
        sink: FrameFormat,
    },
}

struct FuncMap {
    source: FrameFormat,
    sink: FrameFormat,
    func: IirFunc,
}

const fn filter(source: FrameFormat, sink: FrameFormat) -> FuncMap {
    FuncMap {
        source,
        sink,
        func: IirFunc::Filter { source, sink },
    }
}

static FM_CONFIGURED: [FuncMap; 5] = [
    filter(FrameFormat::S16Le, FrameFormat::S16Le),
    filter(FrameFormat::S24In32Le, FrameFormat::S24In32Le),
    filter(FrameFormat::S32Le, FrameFormat::S16Le),
    filter(FrameFormat::S32Le, FrameFormat::S24In32Le),
    filter(FrameFormat::S32Le, FrameFormat::S32Le),
];

static FM_PASSTHROUGH: [FuncMap; 5] = [
    FuncMap {
        source: FrameFormat::S16Le,
        sink: FrameFormat::S16Le,
        func: IirFunc::Copy16,
    },
    FuncMap {
        source: FrameFormat::S24In32Le,
        sink: FrameFormat::S24In32Le,
        func: IirFunc::Copy32,
    },
    FuncMap {
        source: FrameFormat::S32Le,
        sink: FrameFormat::S16Le,
        func: IirFunc::Convert {
            source: FrameFormat::S32Le,
            sink: FrameFormat::S16Le,
        },
    },
    FuncMap {
        source: FrameFormat::S32Le,
        sink: FrameFormat::S24In32Le,
        func: IirFunc::Convert {
            source: FrameFormat::S32Le,
            sink: FrameFormat::S24In32Le,
        },
    },
    FuncMap {
        source: FrameFormat::S32Le,
        sink: FrameFormat::S32Le,
        func: IirFunc::Copy32,
    },
];

fn find_func(map: &[FuncMap], source: FrameFormat, sink: FrameFormat) -> Option<IirFunc> {
    map.iter()
        .find(|m| m.source == source && m.sink == sink)
        .map(|m| m.func)
}

impl IirFunc {
    /// Filtering function for the pair, if supported.
    pub fn configured(source: FrameFormat, sink: FrameFormat) -> Option<Self> {
        log::debug!("eq_iir_find_func(): source {:?} sink {:?}", source, sink);
        find_func(&FM_CONFIGURED, source, sink)
    }

    /// Pass-through function for the pair, if supported.
    pub fn passthrough(source: FrameFormat, sink: FrameFormat) -> Option<Self> {
        log::debug!("eq_iir_find_passthrough_func(): source {:?} sink {:?}", source, sink);
        find_func(&FM_PASSTHROUGH, source, sink)
    }

    /// Process `frames` frames of `nch` channels, channel by channel.
    pub fn run(
        self,
        state: Option<&mut IirState>,
        source: &AudioBuffer,
        sink: &mut AudioBuffer,
        frames: usize,
        nch: usize,
    ) {
        match (self, state) {
            (IirFunc::Filter { source: sf, sink: kf }, Some(st)) => {
                for ch in 0..nch {
                    for f in 0..frames {
                        let i = f * nch + ch;
                        let x = to_q31(sf, source.read_sample(i));
                        let y = st.filter(ch, x);
                        sink.write_sample(i, from_q31(kf, y));
                    }
                }
            }
            (IirFunc::Filter { source: sf, sink: kf }, None)
            | (IirFunc::Convert { source: sf, sink: kf }, _) => {
                for i in 0..frames * nch {
                    let x = to_q31(sf, source.read_sample(i));
                    sink.write_sample(i, from_q31(kf, x));
                }
            }
            (IirFunc::Copy16, _) => {
                for i in 0..frames * nch {
                    sink.write_frag_s16(i, source.read_frag_s16(i));
                }
            }
            (IirFunc::Copy32, _) => {
                for i in 0..frames * nch {
                    sink.write_frag_s32(i, source.read_frag_s32(i));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    const ALL: [FrameFormat; 3] = [
        FrameFormat::S16Le,
        FrameFormat::S24In32Le,
        FrameFormat::S32Le,
    ];

    #[test]
    fn dispatch_tables() {
        let supported = [
            (FrameFormat::S16Le, FrameFormat::S16Le),
            (FrameFormat::S24In32Le, FrameFormat::S24In32Le),
            (FrameFormat::S32Le, FrameFormat::S16Le),
            (FrameFormat::S32Le, FrameFormat::S24In32Le),
            (FrameFormat::S32Le, FrameFormat::S32Le),
        ];
        for source in ALL {
            for sink in ALL {
                let ok = supported.contains(&(source, sink));
                assert_eq!(IirFunc::configured(source, sink).is_some(), ok);
                assert_eq!(IirFunc::passthrough(source, sink).is_some(), ok);
            }
        }
        assert_eq!(
            IirFunc::passthrough(FrameFormat::S16Le, FrameFormat::S16Le),
            Some(IirFunc::Copy16)
        );
        assert_eq!(
            IirFunc::passthrough(FrameFormat::S24In32Le, FrameFormat::S24In32Le),
            Some(IirFunc::Copy32)
        );
    }

    #[test]
    fn passthrough_narrows_with_rounding() {
        let mut source = AudioBuffer::new(32, FrameFormat::S32Le, 1).unwrap();
        let mut sink = AudioBuffer::new(16, FrameFormat::S16Le, 1).unwrap();
        source
            .push_samples(&[0x0001_8000, i32::MAX, i32::MIN, -0x0001_0000])
            .unwrap();
        let func = IirFunc::passthrough(FrameFormat::S32Le, FrameFormat::S16Le).unwrap();
        func.run(None, &source, &mut sink, 4, 1);
        sink.produce(8).unwrap();
        let mut out = Vec::new();
        sink.pop_frames(4, &mut out).unwrap();
        assert_eq!(out, vec![2, i16::MAX as i32, i16::MIN as i32, -1]);
    }
}
