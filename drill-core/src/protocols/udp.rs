//! Headers for the [User Datagram
//! Protocol](https://www.ietf.org/rfc/rfc768.txt).

mod udp_parsing;
pub use udp_parsing::{BuildHeaderError, ParseError, UdpHeader};
