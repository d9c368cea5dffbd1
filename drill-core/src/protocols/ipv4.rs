//! The IPv4 header that wraps every scripted segment.

mod ipv4_address;
pub use ipv4_address::{AddressParseError, Ipv4Address};

mod ipv4_parsing;
pub use ipv4_parsing::{ControlFlags, HeaderBuildError, Ipv4Header, Ipv4HeaderBuilder, ParseError};

/// IANA protocol numbers for the transports the engine speaks.
pub mod protocol_number {
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const SCTP: u8 = 132;
}
