//! A complete IPv4 datagram carrying one of the supported transports.

use crate::protocols::{
    ipv4::{self, protocol_number, Ipv4Header},
    sctp::{self, SctpPacket},
    tcp::{self, TcpHeader},
    udp::{self, UdpHeader},
};
use itertools::Itertools;
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// The transports the engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Sctp,
}

impl TransportProtocol {
    pub fn number(self) -> u8 {
        match self {
            Self::Tcp => protocol_number::TCP,
            Self::Udp => protocol_number::UDP,
            Self::Sctp => protocol_number::SCTP,
        }
    }

    /// Maps an `IPPROTO_*` value to a transport.
    pub fn from_number(number: i64) -> Option<Self> {
        match u8::try_from(number).ok()? {
            protocol_number::TCP => Some(Self::Tcp),
            protocol_number::UDP => Some(Self::Udp),
            protocol_number::SCTP => Some(Self::Sctp),
            _ => None,
        }
    }
}

impl Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Sctp => write!(f, "sctp"),
        }
    }
}

/// The transport layer of a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp(TcpHeader),
    Udp(UdpHeader),
    Sctp(SctpPacket),
}

impl Transport {
    pub fn protocol(&self) -> TransportProtocol {
        match self {
            Self::Tcp(_) => TransportProtocol::Tcp,
            Self::Udp(_) => TransportProtocol::Udp,
            Self::Sctp(_) => TransportProtocol::Sctp,
        }
    }
}

/// An IPv4 datagram as injected into or observed from the stack under test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Datagram {
    pub ip: Ipv4Header,
    pub transport: Transport,
    /// TCP or UDP payload bytes. SCTP payloads live inside their chunks.
    pub payload: Vec<u8>,
}

impl Datagram {
    /// Decodes a datagram handed over by the stack under test.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let ip = Ipv4Header::from_bytes(bytes.iter().cloned())?;
        let header_len = ip.ihl as usize * 4;
        let total_len = ip.total_length as usize;
        if total_len > bytes.len() || total_len < header_len {
            Err(DecodeError::Truncated {
                announced: total_len,
                actual: bytes.len(),
            })?
        }
        let segment = &bytes[header_len..total_len];
        let (transport, payload) = match ip.protocol {
            protocol_number::TCP => {
                let tcp = TcpHeader::from_bytes(
                    segment.iter().cloned(),
                    segment.len(),
                    ip.source,
                    ip.destination,
                )?;
                let payload = segment[tcp.bytes() as usize..].to_vec();
                (Transport::Tcp(tcp), payload)
            }
            protocol_number::UDP => {
                let udp = UdpHeader::from_bytes(segment, ip.source, ip.destination)?;
                (Transport::Udp(udp), segment[8..].to_vec())
            }
            protocol_number::SCTP => (Transport::Sctp(SctpPacket::from_bytes(segment)?), vec![]),
            other => Err(DecodeError::UnsupportedProtocol(other))?,
        };
        Ok(Self {
            ip,
            transport,
            payload,
        })
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.transport.protocol()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.ip.serialize();
        match &self.transport {
            Transport::Tcp(tcp) => out.extend(tcp.serialize()),
            Transport::Udp(udp) => out.extend(udp.serialize()),
            Transport::Sctp(sctp) => out.extend(sctp.serialize()),
        }
        out.extend_from_slice(&self.payload);
        out
    }
}

impl Display for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (src_port, dst_port) = match &self.transport {
            Transport::Tcp(tcp) => (tcp.src_port, tcp.dst_port),
            Transport::Udp(udp) => (udp.source, udp.destination),
            Transport::Sctp(sctp) => (sctp.src_port, sctp.dst_port),
        };
        write!(
            f,
            "{}:{} > {}:{} {}",
            self.ip.source,
            src_port,
            self.ip.destination,
            dst_port,
            self.protocol()
        )?;
        match &self.transport {
            Transport::Tcp(tcp) => write!(
                f,
                " {} seq {} ack {} win {} len {}",
                tcp.ctl, tcp.seq, tcp.ack, tcp.wnd, tcp.payload_len
            ),
            Transport::Udp(udp) => write!(f, " ({})", udp.payload_len()),
            Transport::Sctp(sctp) => write!(
                f,
                ": tag {:#x} [{}]",
                sctp.verification_tag,
                sctp.chunks.iter().map(|chunk| chunk.name()).join(", ")
            ),
        }
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("IPv4: {0}")]
    Ipv4(#[from] ipv4::ParseError),
    #[error("TCP: {0}")]
    Tcp(#[from] tcp::ParseError),
    #[error("UDP: {0}")]
    Udp(#[from] udp::ParseError),
    #[error("SCTP: {0}")]
    Sctp(#[from] sctp::ParseError),
    #[error("IPv4 header announces {announced} bytes but only {actual} arrived")]
    Truncated { announced: usize, actual: usize },
    #[error("Transport protocol {0} is not supported")]
    UnsupportedProtocol(u8),
}
