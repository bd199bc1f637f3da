//! Equalizer coefficient blob header and little-endian word access.
//!
//! ```text
//! +------+--------------------+---------------------+--------------------+
//! | size | channels_in_config | number_of_responses | data words ...     |
//! | u32  | u32                | u32                 | assign[], records  |
//! +------+--------------------+---------------------+--------------------+
//! ```

use alloc::vec::Vec;

use crate::constants::{EQ_BLOB_HEADER_BYTES, MAX_CHANNELS};
use crate::error::{Error, Result};

/// Fixed header at the start of every EQ blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    /// Total blob bytes, header included.
    pub size: u32,
    pub channels_in_config: u32,
    pub number_of_responses: u32,
}

impl BlobHeader {
    pub fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < EQ_BLOB_HEADER_BYTES {
            log::error!("blob_header(): {} bytes is shorter than the header", blob.len());
            return Err(Error::InvalidArgument("blob shorter than header"));
        }
        let word = |i: usize| u32::from_le_bytes([blob[i], blob[i + 1], blob[i + 2], blob[i + 3]]);
        let hdr = BlobHeader {
            size: word(0),
            channels_in_config: word(4),
            number_of_responses: word(8),
        };
        let size = hdr.size as usize;
        if size < EQ_BLOB_HEADER_BYTES || size > blob.len() {
            log::error!(
                "blob_header(): declared size {} outside 12..={}",
                size,
                blob.len()
            );
            return Err(Error::InvalidArgument("blob size field out of bounds"));
        }
        Ok(hdr)
    }

    /// Check the counts shared by both equalizers.
    pub fn validate(&self, nch: usize, max_responses: usize) -> Result<()> {
        let cic = self.channels_in_config as usize;
        if nch == 0 || nch > MAX_CHANNELS || cic == 0 || cic > MAX_CHANNELS {
            log::error!(
                "eq_setup(): invalid channels, nch {} channels_in_config {}",
                nch,
                cic
            );
            return Err(Error::InvalidArgument("invalid channels_in_config"));
        }
        if self.number_of_responses as usize > max_responses {
            log::error!(
                "eq_setup(): number_of_responses {} > {}",
                self.number_of_responses,
                max_responses
            );
            return Err(Error::InvalidArgument("too many responses"));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; EQ_BLOB_HEADER_BYTES] {
        let mut out = [0u8; EQ_BLOB_HEADER_BYTES];
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.channels_in_config.to_le_bytes());
        out[8..12].copy_from_slice(&self.number_of_responses.to_le_bytes());
        out
    }

    /// The data area this header declares.
    pub fn data<'a>(&self, blob: &'a [u8]) -> &'a [u8] {
        &blob[EQ_BLOB_HEADER_BYTES..self.size as usize]
    }
}

/// Decode the data area as little-endian `i16` words.
pub fn words_i16(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|w| i16::from_le_bytes([w[0], w[1]]))
        .collect()
}

/// Decode the data area as little-endian `i32` words.
pub fn words_i32(data: &[u8]) -> Vec<i32> {
    data.chunks_exact(4)
        .map(|w| i32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect()
}

/// Assemble a blob from its header counts and encoded data area.
pub fn assemble(channels_in_config: u32, number_of_responses: u32, data: &[u8]) -> Vec<u8> {
    let hdr = BlobHeader {
        size: (EQ_BLOB_HEADER_BYTES + data.len()) as u32,
        channels_in_config,
        number_of_responses,
    };
    let mut blob = Vec::with_capacity(hdr.size as usize);
    blob.extend_from_slice(&hdr.to_bytes());
    blob.extend_from_slice(data);
    blob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let blob = assemble(2, 1, &[1, 0, 2, 0]);
        let hdr = BlobHeader::parse(&blob).unwrap();
        assert_eq!(hdr.size, 16);
        assert_eq!(hdr.channels_in_config, 2);
        assert_eq!(hdr.number_of_responses, 1);
        assert_eq!(words_i16(hdr.data(&blob)), alloc::vec![1, 2]);
    }

    #[test]
    fn size_field_is_bounds_checked() {
        let mut blob = assemble(1, 0, &[0, 0]);
        blob[0] = 40;
        assert!(BlobHeader::parse(&blob).is_err());
        assert!(BlobHeader::parse(&blob[..8]).is_err());
    }

    #[test]
    fn validate_counts() {
        let hdr = BlobHeader {
            size: 12,
            channels_in_config: 2,
            number_of_responses: 3,
        };
        assert!(hdr.validate(2, 8).is_ok());
        assert!(hdr.validate(0, 8).is_err());
        assert!(hdr.validate(MAX_CHANNELS + 1, 8).is_err());
        assert!(hdr.validate(2, 2).is_err());

        let none = BlobHeader {
            channels_in_config: 0,
            ..hdr
        };
        assert!(none.validate(2, 8).is_err());
    }

    #[test]
    fn i32_words_little_endian() {
        assert_eq!(words_i32(&[0xff, 0xff, 0xff, 0xff, 2, 0, 0, 0]), alloc::vec![-1, 2]);
    }
}
