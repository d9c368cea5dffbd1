use crate::protocols::{
    ipv4::Ipv4Address,
    utility::{Checksum, Endpoint},
};
use thiserror::Error as ThisError;

const HEADER_OCTETS: usize = 8;
const PROTOCOL_NUMBER: u8 = 17;

/// The eight bytes in front of every datagram a script injects or expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpHeader {
    pub source: u16,
    pub destination: u16,
    /// Header plus payload, in bytes
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    /// The header for a datagram carrying `payload` from `from` to `to`.
    pub fn for_payload(
        from: Endpoint,
        to: Endpoint,
        payload: &[u8],
    ) -> Result<Self, BuildHeaderError> {
        let length = u16::try_from(HEADER_OCTETS + payload.len())
            .map_err(|_| BuildHeaderError::PayloadTooLong(payload.len()))?;
        let mut header = Self {
            source: from.port,
            destination: to.port,
            length,
            checksum: 0,
        };
        header.checksum = header.checksum_over(from.address, to.address, payload);
        Ok(header)
    }

    /// Reads the header at the front of `datagram`, which runs to the end of
    /// the IP payload. The addresses come from the IP header and are covered
    /// by the checksum.
    pub fn from_bytes(
        datagram: &[u8],
        source: Ipv4Address,
        destination: Ipv4Address,
    ) -> Result<Self, ParseError> {
        let word = |at: usize| match datagram.get(at..at + 2) {
            Some(&[high, low]) => Ok(u16::from_be_bytes([high, low])),
            _ => Err(ParseError::HeaderTooShort),
        };
        let header = Self {
            source: word(0)?,
            destination: word(2)?,
            length: word(4)?,
            checksum: word(6)?,
        };
        if header.length as usize != datagram.len() {
            Err(ParseError::LengthMismatch {
                header: header.length,
                actual: datagram.len(),
            })?
        }
        // Zero means the sender skipped the checksum
        if header.checksum != 0 {
            let actual = header.checksum_over(source, destination, &datagram[HEADER_OCTETS..]);
            if actual != header.checksum {
                Err(ParseError::Checksum {
                    actual,
                    expected: header.checksum,
                })?
            }
        }
        Ok(header)
    }

    pub fn payload_len(&self) -> u16 {
        self.length.saturating_sub(HEADER_OCTETS as u16)
    }

    pub fn serialize(&self) -> Vec<u8> {
        [self.source, self.destination, self.length, self.checksum]
            .iter()
            .flat_map(|word| word.to_be_bytes())
            .collect()
    }

    /// Sums the IPv4 pseudo header, this header without its checksum, and
    /// the payload.
    fn checksum_over(&self, source: Ipv4Address, destination: Ipv4Address, payload: &[u8]) -> u16 {
        let mut sum = Checksum::new();
        sum.add_u32(source.into());
        sum.add_u32(destination.into());
        sum.add_u8(0, PROTOCOL_NUMBER);
        sum.add_u16(self.length);
        sum.add_u16(self.source);
        sum.add_u16(self.destination);
        sum.add_u16(self.length);
        sum.accumulate_remainder(payload.iter().cloned());
        sum.as_u16()
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Datagram shorter than a UDP header")]
    HeaderTooShort,
    #[error("UDP length {header} disagrees with the {actual} bytes that arrived")]
    LengthMismatch { header: u16, actual: usize },
    #[error("UDP checksum {expected:#06x} should be {actual:#06x}")]
    Checksum { actual: u16, expected: u16 },
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum BuildHeaderError {
    #[error("A {0} byte payload does not fit in one UDP datagram")]
    PayloadTooLong(usize),
}
