use super::chunks::SctpChunk;
use crate::protocols::utility::{padded_to_word, BytesExt, Crc32c};
use thiserror::Error as ThisError;

/// The number of bytes in the SCTP common header
pub const COMMON_HEADER_OCTETS: usize = 12;

/// An SCTP packet: the common header followed by its chunks, RFC 9260 s3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SctpPacket {
    pub src_port: u16,
    pub dst_port: u16,
    pub verification_tag: u32,
    /// The CRC32c as read from or last written to the wire
    pub checksum: u32,
    pub chunks: Vec<SctpChunk>,
}

impl SctpPacket {
    pub fn new(src_port: u16, dst_port: u16, verification_tag: u32, chunks: Vec<SctpChunk>) -> Self {
        let mut packet = Self {
            src_port,
            dst_port,
            verification_tag,
            checksum: 0,
            chunks,
        };
        packet.checksum = packet.compute_checksum();
        packet
    }

    /// Parses a whole SCTP packet and checks its CRC32c.
    pub fn from_bytes(packet: &[u8]) -> Result<Self, ParseError> {
        const HTS: ParseError = ParseError::HeaderTooShort;
        let mut header = packet.iter().cloned();
        let src_port = header.next_u16_be().ok_or(HTS)?;
        let dst_port = header.next_u16_be().ok_or(HTS)?;
        let verification_tag = header.next_u32_be().ok_or(HTS)?;
        let expected_checksum = u32::from_le_bytes(header.next_n::<4>().ok_or(HTS)?);

        let mut crc = Crc32c::new();
        crc.add_bytes(packet[..8].iter().cloned());
        crc.add_bytes([0u8; 4]);
        crc.add_bytes(packet[COMMON_HEADER_OCTETS..].iter().cloned());
        let actual_checksum = crc.as_u32();
        if actual_checksum != expected_checksum {
            Err(ParseError::Checksum {
                actual: actual_checksum,
                expected: expected_checksum,
            })?
        }

        let mut chunks = vec![];
        let mut offset = COMMON_HEADER_OCTETS;
        while offset + 4 <= packet.len() {
            let chunk_type = packet[offset];
            let flags = packet[offset + 1];
            let length = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]) as usize;
            if length < 4 || offset + length > packet.len() {
                Err(ParseError::ChunkTooShort)?
            }
            chunks.push(SctpChunk::decode(
                chunk_type,
                flags,
                &packet[offset + 4..offset + length],
            )?);
            offset += padded_to_word(length);
        }

        Ok(Self {
            src_port,
            dst_port,
            verification_tag,
            checksum: expected_checksum,
            chunks,
        })
    }

    fn serialize_with_checksum(&self, checksum: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_HEADER_OCTETS);
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&self.verification_tag.to_be_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        for chunk in &self.chunks {
            chunk.serialize_into(&mut out);
        }
        out
    }

    /// Computes the CRC32c over the packet as it currently stands.
    pub fn compute_checksum(&self) -> u32 {
        let mut crc = Crc32c::new();
        crc.add_bytes(self.serialize_with_checksum(0));
        crc.as_u32()
    }

    /// Recomputes the checksum after header or chunk fields were rewritten.
    pub fn refresh_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.serialize_with_checksum(self.checksum)
    }

    /// The on-wire length of the packet including chunk padding.
    pub fn len(&self) -> usize {
        COMMON_HEADER_OCTETS
            + self
                .chunks
                .iter()
                .map(|chunk| padded_to_word(chunk.length() as usize))
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Too few bytes to constitute an SCTP common header")]
    HeaderTooShort,
    #[error("A chunk is shorter than its type requires or runs past the packet")]
    ChunkTooShort,
    #[error("A parameter is shorter than its type requires")]
    ParameterTooShort,
    #[error("Required parameter {0} is missing")]
    MissingParameter(u16),
    #[error("Unknown re-configuration parameter {0}")]
    UnknownReconfigParameter(u16),
    #[error(
        "The computed CRC32c {actual:#010x} did not match the header checksum {expected:#010x}"
    )]
    Checksum { actual: u32, expected: u32 },
}
