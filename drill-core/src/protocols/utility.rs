//! Contains utilities for encoding and decoding protocol headers.

use super::ipv4::Ipv4Address;
use std::fmt::{self, Display};

/// A calculator for the checksum used by the UDP, TCP, and IP protocols.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(u16);

impl Checksum {
    /// Creates a new checksum calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `u16` to the checksum value.
    #[cfg(feature = "compute_checksum")]
    pub fn add_u16(&mut self, value: u16) {
        let (sum, carry) = self.0.overflowing_add(value);
        self.0 = sum + carry as u16;
    }

    #[cfg(not(feature = "compute_checksum"))]
    pub fn add_u16(&mut self, _value: u16) {}

    /// Adds `u16` formed by two `u8`s to the checksum value.
    pub fn add_u8(&mut self, a: u8, b: u8) {
        self.add_u16(u16::from_be_bytes([a, b]));
    }

    /// Adds two `u16`s to the checksum value by splitting a `u32` in half.
    pub fn add_u32(&mut self, value: [u8; 4]) {
        self.add_u8(value[0], value[1]);
        self.add_u8(value[2], value[3]);
    }

    /// Repeatedly gets the next two bytes at a `u16` from a byte iterator. If the `payload`
    /// contains an odd number of bytes, the last `u8` will be appended with the
    /// value zero.
    #[cfg(feature = "compute_checksum")]
    pub fn accumulate_remainder(&mut self, mut payload: impl Iterator<Item = u8>) {
        while let Some(a) = payload.next() {
            self.add_u8(a, payload.next().unwrap_or(0));
        }
    }

    #[cfg(not(feature = "compute_checksum"))]
    pub fn accumulate_remainder(&mut self, _payload: impl Iterator<Item = u8>) {}

    /// Computes the final checksum value.
    #[cfg(feature = "compute_checksum")]
    pub fn as_u16(&self) -> u16 {
        match self.0 {
            // Use that there are two one's complement representations of zero
            // and pick the nonzero one to differentiate from an unused
            // checksum.
            0xffff => 0xffff,
            sum => !sum,
        }
    }

    /// Computes the final checksum value.
    #[cfg(not(feature = "compute_checksum"))]
    pub fn as_u16(&self) -> u16 {
        0
    }
}

/// The CRC32c (Castagnoli) checksum carried in every SCTP common header, as
/// described in RFC 9260 appendix A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crc32c(u32);

/// Reflected form of the Castagnoli polynomial 0x1EDC6F41.
const CRC32C_POLYNOMIAL: u32 = 0x82f6_3b78;

impl Crc32c {
    pub fn new() -> Self {
        Self(0xffff_ffff)
    }

    /// Feeds bytes into the running checksum.
    #[cfg(feature = "compute_checksum")]
    pub fn add_bytes(&mut self, bytes: impl IntoIterator<Item = u8>) {
        for byte in bytes {
            self.0 ^= byte as u32;
            for _ in 0..8 {
                let mask = (self.0 & 1).wrapping_neg();
                self.0 = (self.0 >> 1) ^ (CRC32C_POLYNOMIAL & mask);
            }
        }
    }

    #[cfg(not(feature = "compute_checksum"))]
    pub fn add_bytes(&mut self, _bytes: impl IntoIterator<Item = u8>) {}

    /// Computes the final checksum value.
    #[cfg(feature = "compute_checksum")]
    pub fn as_u32(&self) -> u32 {
        !self.0
    }

    #[cfg(not(feature = "compute_checksum"))]
    pub fn as_u32(&self) -> u32 {
        0
    }

    /// The checksum as it is laid out on the wire. SCTP transmits the CRC
    /// least significant byte first.
    pub fn to_wire_bytes(&self) -> [u8; 4] {
        self.as_u32().to_le_bytes()
    }
}

impl Default for Crc32c {
    fn default() -> Self {
        Self::new()
    }
}

/// An address and port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Endpoint {
    pub address: Ipv4Address,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(address: Ipv4Address, port: u16) -> Self {
        Self { address, port }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// The two ends of the connection under test. `local` is the stack under
/// test and `remote` is the scripted peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Endpoints {
    pub local: Endpoint,
    pub remote: Endpoint,
}

impl Endpoints {
    pub const fn new(local: Endpoint, remote: Endpoint) -> Self {
        Self { local, remote }
    }

    pub const fn reverse(self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }
}

/// An extension trait for Iterator<Item = u8>. This should make it easier to parse bytes.
/// This adds methods for reading numbers from the iterator.
///
/// # Example
///
/// ```
/// # use drill_core::protocols::utility::BytesExt;
/// let arr = [0xFF, 0x01, 0x09, 0x69];
/// let mut iter = arr.iter().cloned();
/// assert_eq!(iter.next_u16_be(), Some(0xFF01));
/// assert_eq!(iter.next_u8(), Some(0x09));
/// assert_eq!(iter.next_u32_be(), None);
/// ```
pub trait BytesExt: Iterator<Item = u8> {
    /// Advances the iterator and returns the next value.
    /// Functions identically to `Iterator<Item = u8>::next`.
    fn next_u8(&mut self) -> Option<u8> {
        self.next()
    }

    /// Advances the iterator by 2 bytes.
    /// Combines these 2 bytes in big-endian order into a u16.
    /// Returns None if there were fewer than 2 bytes left in the iterator.
    fn next_u16_be(&mut self) -> Option<u16> {
        let arr = [self.next()?, self.next()?];
        Some(u16::from_be_bytes(arr))
    }

    /// Advances the iterator by 4 bytes.
    /// Combines these 4 bytes in big-endian order into a u32.
    /// Returns None if there were fewer than 4 bytes left in the iterator.
    fn next_u32_be(&mut self) -> Option<u32> {
        let arr = [self.next()?, self.next()?, self.next()?, self.next()?];
        Some(u32::from_be_bytes(arr))
    }

    /// Advances the iterator by 4 bytes.
    /// Combines these bytes in big-endian order into an [`Ipv4Address`].
    fn next_ipv4addr(&mut self) -> Option<Ipv4Address> {
        self.next_u32_be().map(Ipv4Address::from)
    }

    /// Collects the next `N` items of the iterator into an array.
    /// Returns `None` if there were fewer than `N` bytes left in the iterator.
    fn next_n<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut result = [0; N];
        for element in &mut result {
            *element = self.next()?
        }
        Some(result)
    }

    /// Collects exactly `n` bytes into a vector, or `None` if the iterator
    /// runs dry first.
    fn next_vec(&mut self, n: usize) -> Option<Vec<u8>> {
        let mut result = Vec::with_capacity(n);
        for _ in 0..n {
            result.push(self.next()?);
        }
        Some(result)
    }
}

impl<T: Iterator<Item = u8>> BytesExt for T {}

/// Rounds a length up to the next multiple of four.
pub(crate) const fn padded_to_word(length: usize) -> usize {
    (length + 3) & !3
}
