use super::{
    parameters::{
        decode_causes, decode_parameters, decode_reconfig, encode_causes, encode_parameters,
        encode_reconfig, ErrorCause, ReconfigParameter, SctpParameter, HEARTBEAT_INFO,
    },
    ParseError,
};
use crate::{field::Field, protocols::utility::BytesExt};

pub const DATA: u8 = 0;
pub const INIT: u8 = 1;
pub const INIT_ACK: u8 = 2;
pub const SACK: u8 = 3;
pub const HEARTBEAT: u8 = 4;
pub const HEARTBEAT_ACK: u8 = 5;
pub const ABORT: u8 = 6;
pub const SHUTDOWN: u8 = 7;
pub const SHUTDOWN_ACK: u8 = 8;
pub const ERROR: u8 = 9;
pub const COOKIE_ECHO: u8 = 10;
pub const COOKIE_ACK: u8 = 11;
pub const SHUTDOWN_COMPLETE: u8 = 14;
pub const AUTH: u8 = 15;
pub const I_DATA: u8 = 64;
pub const ASCONF_ACK: u8 = 128;
pub const RE_CONFIG: u8 = 130;
pub const PAD: u8 = 132;
pub const FORWARD_TSN: u8 = 192;
pub const ASCONF: u8 = 193;
pub const I_FORWARD_TSN: u8 = 194;

/// Looks up a chunk type by the name scripts use for it.
pub fn chunk_type_by_name(name: &str) -> Option<u8> {
    Some(match name {
        "DATA" => DATA,
        "INIT" => INIT,
        "INIT_ACK" => INIT_ACK,
        "SACK" => SACK,
        "HEARTBEAT" => HEARTBEAT,
        "HEARTBEAT_ACK" => HEARTBEAT_ACK,
        "ABORT" => ABORT,
        "SHUTDOWN" => SHUTDOWN,
        "SHUTDOWN_ACK" => SHUTDOWN_ACK,
        "ERROR" => ERROR,
        "COOKIE_ECHO" => COOKIE_ECHO,
        "COOKIE_ACK" => COOKIE_ACK,
        "SHUTDOWN_COMPLETE" => SHUTDOWN_COMPLETE,
        "AUTH" => AUTH,
        "I_DATA" => I_DATA,
        "ASCONF_ACK" => ASCONF_ACK,
        "RECONFIG" | "RE_CONFIG" => RE_CONFIG,
        "PAD" => PAD,
        "FORWARD_TSN" => FORWARD_TSN,
        "ASCONF" => ASCONF,
        "I_FORWARD_TSN" => I_FORWARD_TSN,
        _ => None?,
    })
}

/// The fixed part of a DATA chunk, header included.
pub const DATA_CHUNK_HEADER_OCTETS: u16 = 16;

/// DATA chunk flag bits
pub mod data_flags {
    pub const END: u8 = 0x01;
    pub const BEGINNING: u8 = 0x02;
    pub const UNORDERED: u8 = 0x04;
    pub const IMMEDIATE: u8 = 0x08;
}

/// The T bit of ABORT and SHUTDOWN COMPLETE: the sender used the peer's
/// own tag rather than its own.
pub const FLAG_T_BIT: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataChunk {
    pub flags: Field<u8>,
    /// Chunk length without padding. Wildcarded lengths also disable the
    /// payload check.
    pub length: Field<u16>,
    pub tsn: Field<u32>,
    pub stream_id: Field<u16>,
    pub stream_seq: Field<u16>,
    pub ppid: Field<u32>,
    pub payload: Vec<u8>,
}

/// The body shared by INIT and INIT ACK.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitChunk {
    pub flags: Field<u8>,
    pub initiate_tag: Field<u32>,
    pub a_rwnd: Field<u32>,
    pub outbound_streams: Field<u16>,
    pub inbound_streams: Field<u16>,
    pub initial_tsn: Field<u32>,
    pub parameters: Vec<SctpParameter>,
}

impl InitChunk {
    pub fn state_cookie(&self) -> Option<&[u8]> {
        self.parameters.iter().find_map(|parameter| match parameter {
            SctpParameter::StateCookie(cookie) => Some(cookie.as_slice()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SackChunk {
    pub flags: Field<u8>,
    pub cum_tsn: Field<u32>,
    pub a_rwnd: Field<u32>,
    /// Gap ack blocks as start and end offsets from the cumulative TSN
    pub gaps: Field<Vec<(u16, u16)>>,
    pub dups: Field<Vec<u32>>,
}

impl SackChunk {
    fn gap_count(&self) -> usize {
        self.gaps.value().map(Vec::len).unwrap_or(0)
    }

    fn dup_count(&self) -> usize {
        self.dups.value().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeartbeatChunk {
    pub flags: Field<u8>,
    /// Body of the heartbeat information parameter, opaque to everyone but
    /// the sender
    pub info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShutdownChunk {
    pub flags: Field<u8>,
    pub cum_tsn: Field<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CookieEchoChunk {
    pub flags: Field<u8>,
    pub cookie: Field<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorChunk {
    pub flags: Field<u8>,
    pub causes: Vec<ErrorCause>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconfigChunk {
    pub flags: Field<u8>,
    pub parameters: Vec<ReconfigParameter>,
}

/// A chunk of an SCTP packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SctpChunk {
    Data(DataChunk),
    Init(InitChunk),
    InitAck(InitChunk),
    Sack(SackChunk),
    Heartbeat(HeartbeatChunk),
    HeartbeatAck(HeartbeatChunk),
    Abort { flags: Field<u8> },
    Shutdown(ShutdownChunk),
    ShutdownAck { flags: Field<u8> },
    Error(ErrorChunk),
    CookieEcho(CookieEchoChunk),
    CookieAck { flags: Field<u8> },
    ShutdownComplete { flags: Field<u8> },
    Reconfig(ReconfigChunk),
    Unknown { chunk_type: u8, flags: u8, value: Vec<u8> },
}

impl SctpChunk {
    pub fn chunk_type(&self) -> u8 {
        match self {
            Self::Data(_) => DATA,
            Self::Init(_) => INIT,
            Self::InitAck(_) => INIT_ACK,
            Self::Sack(_) => SACK,
            Self::Heartbeat(_) => HEARTBEAT,
            Self::HeartbeatAck(_) => HEARTBEAT_ACK,
            Self::Abort { .. } => ABORT,
            Self::Shutdown(_) => SHUTDOWN,
            Self::ShutdownAck { .. } => SHUTDOWN_ACK,
            Self::Error(_) => ERROR,
            Self::CookieEcho(_) => COOKIE_ECHO,
            Self::CookieAck { .. } => COOKIE_ACK,
            Self::ShutdownComplete { .. } => SHUTDOWN_COMPLETE,
            Self::Reconfig(_) => RE_CONFIG,
            Self::Unknown { chunk_type, .. } => *chunk_type,
        }
    }

    /// The name scripts use for the chunk type.
    pub fn name(&self) -> &'static str {
        chunk_name(self.chunk_type())
    }

    pub fn flags(&self) -> Field<u8> {
        match self {
            Self::Data(DataChunk { flags, .. })
            | Self::Init(InitChunk { flags, .. })
            | Self::InitAck(InitChunk { flags, .. })
            | Self::Sack(SackChunk { flags, .. })
            | Self::Heartbeat(HeartbeatChunk { flags, .. })
            | Self::HeartbeatAck(HeartbeatChunk { flags, .. })
            | Self::Abort { flags }
            | Self::Shutdown(ShutdownChunk { flags, .. })
            | Self::ShutdownAck { flags }
            | Self::Error(ErrorChunk { flags, .. })
            | Self::CookieEcho(CookieEchoChunk { flags, .. })
            | Self::CookieAck { flags }
            | Self::ShutdownComplete { flags }
            | Self::Reconfig(ReconfigChunk { flags, .. }) => flags.clone(),
            Self::Unknown { flags, .. } => Field::Value(*flags),
        }
    }

    /// The chunk body following the 4-byte chunk header, without padding.
    fn value(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Data(data) => {
                out.extend_from_slice(&data.tsn.wire_value().to_be_bytes());
                out.extend_from_slice(&data.stream_id.wire_value().to_be_bytes());
                out.extend_from_slice(&data.stream_seq.wire_value().to_be_bytes());
                out.extend_from_slice(&data.ppid.wire_value().to_be_bytes());
                out.extend_from_slice(&data.payload);
            }
            Self::Init(init) | Self::InitAck(init) => {
                out.extend_from_slice(&init.initiate_tag.wire_value().to_be_bytes());
                out.extend_from_slice(&init.a_rwnd.wire_value().to_be_bytes());
                out.extend_from_slice(&init.outbound_streams.wire_value().to_be_bytes());
                out.extend_from_slice(&init.inbound_streams.wire_value().to_be_bytes());
                out.extend_from_slice(&init.initial_tsn.wire_value().to_be_bytes());
                out.extend(encode_parameters(&init.parameters));
            }
            Self::Sack(sack) => {
                out.extend_from_slice(&sack.cum_tsn.wire_value().to_be_bytes());
                out.extend_from_slice(&sack.a_rwnd.wire_value().to_be_bytes());
                out.extend_from_slice(&(sack.gap_count() as u16).to_be_bytes());
                out.extend_from_slice(&(sack.dup_count() as u16).to_be_bytes());
                for (start, end) in sack.gaps.value().into_iter().flatten() {
                    out.extend_from_slice(&start.to_be_bytes());
                    out.extend_from_slice(&end.to_be_bytes());
                }
                for dup in sack.dups.value().into_iter().flatten() {
                    out.extend_from_slice(&dup.to_be_bytes());
                }
            }
            Self::Heartbeat(heartbeat) | Self::HeartbeatAck(heartbeat) => {
                out.extend(encode_parameters(&[SctpParameter::HeartbeatInfo(
                    heartbeat.info.clone(),
                )]));
            }
            Self::Shutdown(shutdown) => {
                out.extend_from_slice(&shutdown.cum_tsn.wire_value().to_be_bytes())
            }
            Self::Error(error) => out.extend(encode_causes(&error.causes)),
            Self::CookieEcho(echo) => out.extend(echo.cookie.wire_value()),
            Self::Reconfig(reconfig) => out.extend(encode_reconfig(&reconfig.parameters)),
            Self::Unknown { value, .. } => out.extend_from_slice(value),
            Self::Abort { .. }
            | Self::ShutdownAck { .. }
            | Self::CookieAck { .. }
            | Self::ShutdownComplete { .. } => {}
        }
        out
    }

    /// The value of the chunk length field: header plus body, no padding.
    pub fn length(&self) -> u16 {
        (4 + self.value().len()) as u16
    }

    /// Appends the chunk, padded to a word boundary.
    pub(super) fn serialize_into(&self, out: &mut Vec<u8>) {
        let value = self.value();
        out.push(self.chunk_type());
        out.push(self.flags().wire_value());
        out.extend_from_slice(&((4 + value.len()) as u16).to_be_bytes());
        out.extend(value);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    /// Decodes one chunk from its type, flags, and unpadded body.
    pub(super) fn decode(chunk_type: u8, flags: u8, value: &[u8]) -> Result<Self, ParseError> {
        const CTS: ParseError = ParseError::ChunkTooShort;
        let mut bytes = value.iter().cloned();
        let flags_field = Field::Value(flags);
        Ok(match chunk_type {
            DATA => Self::Data(DataChunk {
                flags: flags_field,
                length: Field::Value((4 + value.len()) as u16),
                tsn: bytes.next_u32_be().ok_or(CTS)?.into(),
                stream_id: bytes.next_u16_be().ok_or(CTS)?.into(),
                stream_seq: bytes.next_u16_be().ok_or(CTS)?.into(),
                ppid: bytes.next_u32_be().ok_or(CTS)?.into(),
                payload: bytes.collect(),
            }),
            INIT | INIT_ACK => {
                let init = InitChunk {
                    flags: flags_field,
                    initiate_tag: bytes.next_u32_be().ok_or(CTS)?.into(),
                    a_rwnd: bytes.next_u32_be().ok_or(CTS)?.into(),
                    outbound_streams: bytes.next_u16_be().ok_or(CTS)?.into(),
                    inbound_streams: bytes.next_u16_be().ok_or(CTS)?.into(),
                    initial_tsn: bytes.next_u32_be().ok_or(CTS)?.into(),
                    parameters: decode_parameters(&value[16..])?,
                };
                if chunk_type == INIT {
                    Self::Init(init)
                } else {
                    Self::InitAck(init)
                }
            }
            SACK => {
                let cum_tsn = bytes.next_u32_be().ok_or(CTS)?;
                let a_rwnd = bytes.next_u32_be().ok_or(CTS)?;
                let gap_count = bytes.next_u16_be().ok_or(CTS)?;
                let dup_count = bytes.next_u16_be().ok_or(CTS)?;
                let gaps = (0..gap_count)
                    .map(|_| Some((bytes.next_u16_be()?, bytes.next_u16_be()?)))
                    .collect::<Option<Vec<_>>>()
                    .ok_or(CTS)?;
                let dups = (0..dup_count)
                    .map(|_| bytes.next_u32_be())
                    .collect::<Option<Vec<_>>>()
                    .ok_or(CTS)?;
                Self::Sack(SackChunk {
                    flags: flags_field,
                    cum_tsn: cum_tsn.into(),
                    a_rwnd: a_rwnd.into(),
                    gaps: gaps.into(),
                    dups: dups.into(),
                })
            }
            HEARTBEAT | HEARTBEAT_ACK => {
                let info = decode_parameters(value)?
                    .into_iter()
                    .find_map(|parameter| match parameter {
                        SctpParameter::HeartbeatInfo(info) => Some(info),
                        _ => None,
                    })
                    .ok_or(ParseError::MissingParameter(HEARTBEAT_INFO))?;
                let heartbeat = HeartbeatChunk {
                    flags: flags_field,
                    info,
                };
                if chunk_type == HEARTBEAT {
                    Self::Heartbeat(heartbeat)
                } else {
                    Self::HeartbeatAck(heartbeat)
                }
            }
            ABORT => Self::Abort { flags: flags_field },
            SHUTDOWN => Self::Shutdown(ShutdownChunk {
                flags: flags_field,
                cum_tsn: bytes.next_u32_be().ok_or(CTS)?.into(),
            }),
            SHUTDOWN_ACK => Self::ShutdownAck { flags: flags_field },
            ERROR => Self::Error(ErrorChunk {
                flags: flags_field,
                causes: decode_causes(value)?,
            }),
            COOKIE_ECHO => Self::CookieEcho(CookieEchoChunk {
                flags: flags_field,
                cookie: Field::Value(value.to_vec()),
            }),
            COOKIE_ACK => Self::CookieAck { flags: flags_field },
            SHUTDOWN_COMPLETE => Self::ShutdownComplete { flags: flags_field },
            RE_CONFIG => Self::Reconfig(ReconfigChunk {
                flags: flags_field,
                parameters: decode_reconfig(value)?,
            }),
            chunk_type => Self::Unknown {
                chunk_type,
                flags,
                value: value.to_vec(),
            },
        })
    }
}

/// The name scripts use for a chunk type.
pub fn chunk_name(chunk_type: u8) -> &'static str {
    match chunk_type {
        DATA => "DATA",
        INIT => "INIT",
        INIT_ACK => "INIT_ACK",
        SACK => "SACK",
        HEARTBEAT => "HEARTBEAT",
        HEARTBEAT_ACK => "HEARTBEAT_ACK",
        ABORT => "ABORT",
        SHUTDOWN => "SHUTDOWN",
        SHUTDOWN_ACK => "SHUTDOWN_ACK",
        ERROR => "ERROR",
        COOKIE_ECHO => "COOKIE_ECHO",
        COOKIE_ACK => "COOKIE_ACK",
        SHUTDOWN_COMPLETE => "SHUTDOWN_COMPLETE",
        AUTH => "AUTH",
        I_DATA => "I_DATA",
        ASCONF_ACK => "ASCONF_ACK",
        RE_CONFIG => "RECONFIG",
        PAD => "PAD",
        FORWARD_TSN => "FORWARD_TSN",
        ASCONF => "ASCONF",
        I_FORWARD_TSN => "I_FORWARD_TSN",
        _ => "UNKNOWN",
    }
}
