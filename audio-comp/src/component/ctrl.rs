//! Control message payloads carried by `cmd`.

use alloc::vec::Vec;

use crate::constants::{ABI_HEADER_BYTES, ABI_VERSION, CTRL_DATA_HEADER_BYTES};
use crate::error::{Error, Result};

/// Control command selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentCmd {
    SetData,
    GetData,
    SetValue,
    GetValue,
}

/// Kind of control the payload addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlType {
    /// Opaque configuration blob, possibly split over several messages.
    Binary,
    /// Array of `(channel: u32, value: i32)` pairs.
    Enum,
    /// Plain integer values.
    Value,
}

/// ABI-stamped payload of a control message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbiData {
    pub abi_version: u32,
    /// Bytes of `bytes` that are meaningful.
    pub size: u32,
    pub bytes: Vec<u8>,
}

/// One control message, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlData {
    pub ctrl: CtrlType,
    pub index: u32,
    /// Position of this message in a chunked transfer.
    pub msg_index: u32,
    /// Bytes (binary) or pairs (enum) carried by this message.
    pub num_elems: u32,
    /// Bytes still to follow after this message.
    pub elems_remaining: u32,
    pub data: AbiData,
}

impl CtrlData {
    /// A binary chunk carrying `chunk` at position `msg_index`.
    pub fn binary(msg_index: u32, chunk: &[u8], elems_remaining: u32) -> Self {
        CtrlData {
            ctrl: CtrlType::Binary,
            index: 0,
            msg_index,
            num_elems: chunk.len() as u32,
            elems_remaining,
            data: AbiData {
                abi_version: ABI_VERSION,
                size: chunk.len() as u32,
                bytes: chunk.to_vec(),
            },
        }
    }

    /// An empty binary request, used for `GetData`.
    pub fn binary_request(msg_index: u32) -> Self {
        CtrlData::binary(msg_index, &[], 0)
    }

    /// An enum control message with `(channel, value)` pairs.
    pub fn enum_pairs(index: u32, pairs: &[(u32, i32)]) -> Self {
        let mut bytes = Vec::with_capacity(pairs.len() * 8);
        for &(ch, val) in pairs {
            bytes.extend_from_slice(&ch.to_le_bytes());
            bytes.extend_from_slice(&val.to_le_bytes());
        }
        CtrlData {
            ctrl: CtrlType::Enum,
            index,
            msg_index: 0,
            num_elems: pairs.len() as u32,
            elems_remaining: 0,
            data: AbiData {
                abi_version: ABI_VERSION,
                size: bytes.len() as u32,
                bytes,
            },
        }
    }

    /// Decode the `(channel, value)` pairs of an enum message.
    pub fn pairs(&self) -> Result<Vec<(u32, i32)>> {
        let n = self.num_elems as usize;
        if self.data.bytes.len() < n * 8 {
            return Err(Error::InvalidArgument("enum payload shorter than num_elems"));
        }
        Ok(self.data.bytes[..n * 8]
            .chunks_exact(8)
            .map(|p| {
                (
                    u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
                    i32::from_le_bytes([p[4], p[5], p[6], p[7]]),
                )
            })
            .collect())
    }
}

/// Payload bytes one message can carry under the transport budget `max_size`.
pub const fn max_payload(max_size: usize) -> usize {
    max_size.saturating_sub(CTRL_DATA_HEADER_BYTES + ABI_HEADER_BYTES)
}
