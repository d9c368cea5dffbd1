//! Wire formats for the datagrams exchanged with the stack under test.

pub mod ipv4;
pub use ipv4::{Ipv4Address, Ipv4Header};

pub mod tcp;
pub use tcp::TcpHeader;

pub mod udp;
pub use udp::UdpHeader;

pub mod sctp;
pub use sctp::SctpPacket;

pub mod utility;
pub use utility::{Endpoint, Endpoints};
