use super::Ipv4Address;
use crate::protocols::utility::Checksum;
use std::fmt::{self, Debug, Formatter};
use thiserror::Error as ThisError;

/// The number of `u32` words in a basic IPv4 header
const BASE_WORDS: u8 = 5;
/// The number of `u8` bytes in a basic IPv4 header
pub const BASE_OCTETS: u16 = BASE_WORDS as u16 * 4;
/// This is bitwise anded with the `u16` containing flags and fragment offset to
/// extract the fragment offset part.
const FRAGMENT_OFFSET_MASK: u16 = 0x1fff;

/// An IPv4 header, as described in RFC791 p11 s3.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Header {
    /// Internet Header Length, the number of `u32` words in the IPv4 header
    pub ihl: u8,
    /// The quality of service desired
    pub type_of_service: u8,
    /// The length of the datagram in bytes
    pub total_length: u16,
    /// Assigned by the sender to aid in assembling fragments
    pub identification: u16,
    /// Where in the datagram this fragment belongs in units of 8 bytes
    pub fragment_offset: u16,
    /// Flags describing fragmentation properties
    pub flags: ControlFlags,
    /// The number of remaining hops this datagram can take before being removed
    pub time_to_live: u8,
    /// Indicates the next level protocol in the data portion of the datagram
    pub protocol: u8,
    /// The IPv4 header checksum
    pub checksum: u16,
    /// The source address
    pub source: Ipv4Address,
    /// The destination address
    pub destination: Ipv4Address,
}

impl Ipv4Header {
    /// Parses a header from a byte iterator.
    pub fn from_bytes(mut bytes: impl Iterator<Item = u8>) -> Result<Self, ParseError> {
        let mut next =
            || -> Result<u8, ParseError> { bytes.next().ok_or(ParseError::HeaderTooShort) };

        let mut checksum = Checksum::new();

        let version_and_ihl = next()?;
        let version = version_and_ihl >> 4;
        if version != 4 {
            Err(ParseError::IncorrectIpv4Version)?
        }
        let ihl = version_and_ihl & 0b1111;
        if ihl != BASE_WORDS {
            Err(ParseError::InvalidHeaderLength)?
        }
        let type_of_service = next()?;
        checksum.add_u8(version_and_ihl, type_of_service);

        let total_length = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(total_length);

        let identification = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(identification);

        let flags_and_fragment_offset_bytes = u16::from_be_bytes([next()?, next()?]);
        let fragment_offset = flags_and_fragment_offset_bytes & FRAGMENT_OFFSET_MASK;
        let control_flag_bits = (flags_and_fragment_offset_bytes >> 13) as u8;
        if control_flag_bits & 0b100 != 0 {
            Err(ParseError::UsedReservedFlag)?
        }
        checksum.add_u16(flags_and_fragment_offset_bytes);

        let time_to_live = next()?;
        let protocol = next()?;
        checksum.add_u8(time_to_live, protocol);

        let expected_checksum = u16::from_be_bytes([next()?, next()?]);

        let source_bytes = [next()?, next()?, next()?, next()?];
        checksum.add_u32(source_bytes);

        let destination_bytes = [next()?, next()?, next()?, next()?];
        checksum.add_u32(destination_bytes);

        let actual_checksum = checksum.as_u16();
        if actual_checksum != expected_checksum {
            Err(ParseError::Checksum {
                expected: expected_checksum,
                actual: actual_checksum,
            })?
        }

        Ok(Self {
            ihl,
            type_of_service,
            total_length,
            identification,
            fragment_offset,
            flags: control_flag_bits.into(),
            time_to_live,
            protocol,
            checksum: expected_checksum,
            source: source_bytes.into(),
            destination: destination_bytes.into(),
        })
    }

    /// The number of payload bytes the header announces.
    pub fn payload_length(&self) -> u16 {
        self.total_length.saturating_sub(self.ihl as u16 * 4)
    }

    /// Writes the header in network byte order.
    pub fn serialize(&self) -> Vec<u8> {
        let flags_and_fragment_offset =
            ((self.flags.as_u8() as u16) << 13) | (self.fragment_offset & FRAGMENT_OFFSET_MASK);
        let mut out = Vec::with_capacity(BASE_OCTETS as usize);
        out.push((4u8 << 4) | self.ihl);
        out.push(self.type_of_service);
        out.extend_from_slice(&self.total_length.to_be_bytes());
        out.extend_from_slice(&self.identification.to_be_bytes());
        out.extend_from_slice(&flags_and_fragment_offset.to_be_bytes());
        out.push(self.time_to_live);
        out.push(self.protocol);
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&self.source.to_bytes());
        out.extend_from_slice(&self.destination.to_bytes());
        out
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("The IPv4 header is incomplete")]
    HeaderTooShort,
    #[error("Expected version 4 in IPv4 header")]
    IncorrectIpv4Version,
    #[error("The reserved control flags bit was used")]
    UsedReservedFlag,
    #[error("Expected 5 words for IPv4 header")]
    InvalidHeaderLength,
    #[error(
        "The header checksum {expected:#06x} does not match the calculated checksum {actual:#06x}"
    )]
    Checksum { expected: u16, actual: u16 },
}

/// A builder for IPv4 headers. The fields align with those found on [`Ipv4Header`].
pub struct Ipv4HeaderBuilder {
    type_of_service: u8,
    payload_length: u16,
    identification: u16,
    fragment_offset: u16,
    flags: ControlFlags,
    time_to_live: u8,
    protocol: u8,
    source: Ipv4Address,
    destination: Ipv4Address,
}

impl Ipv4HeaderBuilder {
    /// Creates a new builder.
    pub fn new(
        source: Ipv4Address,
        destination: Ipv4Address,
        protocol: u8,
        payload_length: u16,
    ) -> Self {
        Self {
            type_of_service: 0,
            payload_length,
            identification: 0,
            fragment_offset: 0,
            flags: Default::default(),
            time_to_live: 30,
            protocol,
            source,
            destination,
        }
    }

    /// Sets the type of service
    pub fn type_of_service(mut self, type_of_service: u8) -> Self {
        self.type_of_service = type_of_service;
        self
    }

    /// Sets the identification field
    pub fn identification(mut self, identification: u16) -> Self {
        self.identification = identification;
        self
    }

    /// Sets the time to live
    pub fn time_to_live(mut self, time_to_live: u8) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    /// Sets the control flags
    pub fn flags(mut self, flags: ControlFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Creates a header with a valid checksum from the configuration provided
    pub fn build(self) -> Result<Ipv4Header, HeaderBuildError> {
        let mut checksum = Checksum::new();

        let version_and_ihl = (4u8 << 4) | BASE_WORDS;
        checksum.add_u8(version_and_ihl, self.type_of_service);

        let total_length = self
            .payload_length
            .checked_add(BASE_OCTETS)
            .ok_or(HeaderBuildError::OverlyLongPayload)?;
        checksum.add_u16(total_length);

        checksum.add_u16(self.identification);

        if self.fragment_offset > FRAGMENT_OFFSET_MASK {
            Err(HeaderBuildError::OverlyLongFragmentOffset)?
        }
        let flags_and_fragment_offset =
            ((self.flags.as_u8() as u16) << 13) | (self.fragment_offset & FRAGMENT_OFFSET_MASK);
        checksum.add_u16(flags_and_fragment_offset);

        checksum.add_u8(self.time_to_live, self.protocol);
        checksum.add_u32(self.source.into());
        checksum.add_u32(self.destination.into());

        Ok(Ipv4Header {
            ihl: BASE_WORDS,
            type_of_service: self.type_of_service,
            total_length,
            identification: self.identification,
            fragment_offset: self.fragment_offset,
            flags: self.flags,
            time_to_live: self.time_to_live,
            protocol: self.protocol,
            checksum: checksum.as_u16(),
            source: self.source,
            destination: self.destination,
        })
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum HeaderBuildError {
    #[error("The payload is longer than is allowed")]
    OverlyLongPayload,
    #[error("The fragment offset is too long to fit control flags in the header")]
    OverlyLongFragmentOffset,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlFlags(u8);

impl ControlFlags {
    /// Neither don't-fragment nor more-fragments set.
    pub const DEFAULT: Self = Self::new(true, true);

    pub const fn new(may_fragment: bool, is_last_fragment: bool) -> Self {
        Self((!is_last_fragment as u8) | ((!may_fragment as u8) << 1))
    }

    pub const fn may_fragment(&self) -> bool {
        self.0 & 0b10 == 0
    }

    pub const fn is_last_fragment(&self) -> bool {
        self.0 & 0b01 == 0
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl Debug for ControlFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlFlags")
            .field("MayFrag", &self.may_fragment())
            .field("LastFrag", &self.is_last_fragment())
            .finish()
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for ControlFlags {
    fn from(byte: u8) -> Self {
        Self(byte)
    }
}

impl From<ControlFlags> for u8 {
    fn from(flags: ControlFlags) -> Self {
        flags.0
    }
}
