/// Maximum number of interleaved channels a component processes.
pub const MAX_CHANNELS: usize = 8;

/// Maximum number of upstream streams a mixer sums in one period.
pub const MAX_STREAMS: usize = 8;

/// ABI version stamped into control payloads returned by `GET_DATA`.
pub const ABI_VERSION: u32 = 0x0301_0000;

/// Bytes of the control message header counted against the transport budget.
pub const CTRL_DATA_HEADER_BYTES: usize = 32;

/// Bytes of the ABI header (`abi_version`, `size`) preceding blob payloads.
pub const ABI_HEADER_BYTES: usize = 8;

/// Enum control index used by both equalizers for response switching.
pub const EQ_IDX_SWITCH: u32 = 0;

/// Size of the common blob header: `size`, `channels_in_config`, `number_of_responses`.
pub const EQ_BLOB_HEADER_BYTES: usize = 12;

/// Largest FIR coefficient blob accepted, in bytes.
pub const EQ_FIR_MAX_SIZE: usize = 4096;

/// Maximum number of FIR responses in one blob.
pub const EQ_FIR_MAX_RESPONSES: usize = 8;

/// Maximum FIR length in taps.
pub const EQ_FIR_MAX_LENGTH: usize = 192;

/// Words (`i16`) preceding the taps of a FIR response: `length`, `out_shift`.
pub const EQ_FIR_COEF_NHEADER: usize = 2;

/// Largest IIR coefficient blob accepted, in bytes.
pub const EQ_IIR_MAX_SIZE: usize = 1024;

/// Maximum number of IIR responses in one blob.
pub const EQ_IIR_MAX_RESPONSES: usize = 8;

/// Words (`i32`) preceding the biquads of an IIR response.
pub const EQ_IIR_NHEADER_DF2T: usize = 2;

/// Words (`i32`) per biquad: `a2, a1, b2, b1, b0, shift, gain`.
pub const EQ_IIR_NBIQUAD_DF2T: usize = 7;

/// Delay elements per transposed direct-form II biquad.
pub const IIR_DF2T_NUM_DELAYS: usize = 2;

/// Maximum number of biquads in one IIR response.
pub const IIR_DF2T_BIQUADS_MAX: usize = 11;

/// Sample rates the SRC accepts on either side, in Hz.
pub const SRC_RATES: [u32; 6] = [8000, 16000, 24000, 32000, 44100, 48000];

/// Per-channel limit of an SRC stage FIR delay line, in samples.
pub const SRC_MAX_FIR_DELAY_SIZE: usize = 1024;

/// Per-channel limit of an SRC stage output delay line, in samples.
pub const SRC_MAX_OUT_DELAY_SIZE: usize = 64;
