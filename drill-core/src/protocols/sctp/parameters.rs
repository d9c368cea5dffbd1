//! Variable-length parameters, error causes, and re-configuration requests
//! carried inside SCTP chunks.

use super::ParseError;
use crate::{
    field::Field,
    protocols::utility::{padded_to_word, BytesExt},
};

pub const HEARTBEAT_INFO: u16 = 1;
pub const STATE_COOKIE: u16 = 7;
pub const SUPPORTED_EXTENSIONS: u16 = 0x8008;

pub const OUTGOING_SSN_RESET: u16 = 13;
pub const INCOMING_SSN_RESET: u16 = 14;
pub const SSN_TSN_RESET: u16 = 15;
pub const RECONFIG_RESPONSE: u16 = 16;
pub const ADD_OUTGOING_STREAMS: u16 = 17;
pub const ADD_INCOMING_STREAMS: u16 = 18;

pub const INVALID_STREAM_IDENTIFIER: u16 = 1;

/// Result code of a re-configuration response meaning the request was
/// carried out.
pub const RECONFIG_RESULT_PERFORMED: u32 = 1;

/// A type-length-value parameter of an INIT or INIT ACK chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SctpParameter {
    HeartbeatInfo(Vec<u8>),
    StateCookie(Vec<u8>),
    /// Chunk types the sender understands
    SupportedExtensions(Vec<u8>),
    Unknown { kind: u16, value: Vec<u8> },
}

impl SctpParameter {
    pub fn kind(&self) -> u16 {
        match self {
            Self::HeartbeatInfo(_) => HEARTBEAT_INFO,
            Self::StateCookie(_) => STATE_COOKIE,
            Self::SupportedExtensions(_) => SUPPORTED_EXTENSIONS,
            Self::Unknown { kind, .. } => *kind,
        }
    }

    fn value(&self) -> &[u8] {
        match self {
            Self::HeartbeatInfo(value)
            | Self::StateCookie(value)
            | Self::SupportedExtensions(value)
            | Self::Unknown { value, .. } => value,
        }
    }

    fn decode(kind: u16, value: Vec<u8>) -> Self {
        match kind {
            HEARTBEAT_INFO => Self::HeartbeatInfo(value),
            STATE_COOKIE => Self::StateCookie(value),
            SUPPORTED_EXTENSIONS => Self::SupportedExtensions(value),
            kind => Self::Unknown { kind, value },
        }
    }
}

/// An error cause of an ERROR chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCause {
    InvalidStreamIdentifier(Field<u16>),
    Unknown { code: u16, value: Vec<u8> },
}

impl ErrorCause {
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidStreamIdentifier(_) => INVALID_STREAM_IDENTIFIER,
            Self::Unknown { code, .. } => *code,
        }
    }

    fn value(&self) -> Vec<u8> {
        match self {
            Self::InvalidStreamIdentifier(stream) => {
                let mut value = stream.wire_value().to_be_bytes().to_vec();
                value.extend_from_slice(&[0, 0]);
                value
            }
            Self::Unknown { value, .. } => value.clone(),
        }
    }

    fn decode(code: u16, value: Vec<u8>) -> Result<Self, ParseError> {
        Ok(match code {
            INVALID_STREAM_IDENTIFIER => {
                let stream = value
                    .iter()
                    .cloned()
                    .next_u16_be()
                    .ok_or(ParseError::ParameterTooShort)?;
                Self::InvalidStreamIdentifier(Field::Value(stream))
            }
            code => Self::Unknown { code, value },
        })
    }
}

/// A request or response of a RE-CONFIG chunk, RFC 6525 s4.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReconfigParameter {
    OutgoingSsnReset {
        request_seq: Field<u32>,
        response_seq: Field<u32>,
        last_tsn: Field<u32>,
        streams: Vec<u16>,
    },
    IncomingSsnReset {
        request_seq: Field<u32>,
        streams: Vec<u16>,
    },
    SsnTsnReset {
        request_seq: Field<u32>,
    },
    Response {
        response_seq: Field<u32>,
        result: Field<u32>,
        /// Sender's and receiver's next TSN, present for SSN/TSN resets
        next_tsns: Option<(Field<u32>, Field<u32>)>,
    },
    AddOutgoingStreams {
        request_seq: Field<u32>,
        new_streams: Field<u16>,
    },
    AddIncomingStreams {
        request_seq: Field<u32>,
        new_streams: Field<u16>,
    },
}

impl ReconfigParameter {
    pub fn kind(&self) -> u16 {
        match self {
            Self::OutgoingSsnReset { .. } => OUTGOING_SSN_RESET,
            Self::IncomingSsnReset { .. } => INCOMING_SSN_RESET,
            Self::SsnTsnReset { .. } => SSN_TSN_RESET,
            Self::Response { .. } => RECONFIG_RESPONSE,
            Self::AddOutgoingStreams { .. } => ADD_OUTGOING_STREAMS,
            Self::AddIncomingStreams { .. } => ADD_INCOMING_STREAMS,
        }
    }

    /// The request sequence number, for every parameter that is a request.
    pub fn request_seq(&self) -> Option<&Field<u32>> {
        match self {
            Self::OutgoingSsnReset { request_seq, .. }
            | Self::IncomingSsnReset { request_seq, .. }
            | Self::SsnTsnReset { request_seq }
            | Self::AddOutgoingStreams { request_seq, .. }
            | Self::AddIncomingStreams { request_seq, .. } => Some(request_seq),
            Self::Response { .. } => None,
        }
    }

    fn value(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let put_u32 = |out: &mut Vec<u8>, field: &Field<u32>| {
            out.extend_from_slice(&field.wire_value().to_be_bytes())
        };
        match self {
            Self::OutgoingSsnReset {
                request_seq,
                response_seq,
                last_tsn,
                streams,
            } => {
                put_u32(&mut out, request_seq);
                put_u32(&mut out, response_seq);
                put_u32(&mut out, last_tsn);
                streams
                    .iter()
                    .for_each(|stream| out.extend_from_slice(&stream.to_be_bytes()));
            }
            Self::IncomingSsnReset {
                request_seq,
                streams,
            } => {
                put_u32(&mut out, request_seq);
                streams
                    .iter()
                    .for_each(|stream| out.extend_from_slice(&stream.to_be_bytes()));
            }
            Self::SsnTsnReset { request_seq } => put_u32(&mut out, request_seq),
            Self::Response {
                response_seq,
                result,
                next_tsns,
            } => {
                put_u32(&mut out, response_seq);
                put_u32(&mut out, result);
                if let Some((sender, receiver)) = next_tsns {
                    put_u32(&mut out, sender);
                    put_u32(&mut out, receiver);
                }
            }
            Self::AddOutgoingStreams {
                request_seq,
                new_streams,
            }
            | Self::AddIncomingStreams {
                request_seq,
                new_streams,
            } => {
                put_u32(&mut out, request_seq);
                out.extend_from_slice(&new_streams.wire_value().to_be_bytes());
                out.extend_from_slice(&[0, 0]);
            }
        }
        out
    }

    fn decode(kind: u16, value: Vec<u8>) -> Result<Self, ParseError> {
        const PTS: ParseError = ParseError::ParameterTooShort;
        let mut bytes = value.into_iter();
        let next_u32 = |bytes: &mut std::vec::IntoIter<u8>| bytes.next_u32_be().map(Field::Value).ok_or(PTS);
        let streams = |bytes: &mut std::vec::IntoIter<u8>| {
            let mut streams = vec![];
            while let Some(stream) = bytes.next_u16_be() {
                streams.push(stream);
            }
            streams
        };
        Ok(match kind {
            OUTGOING_SSN_RESET => Self::OutgoingSsnReset {
                request_seq: next_u32(&mut bytes)?,
                response_seq: next_u32(&mut bytes)?,
                last_tsn: next_u32(&mut bytes)?,
                streams: streams(&mut bytes),
            },
            INCOMING_SSN_RESET => Self::IncomingSsnReset {
                request_seq: next_u32(&mut bytes)?,
                streams: streams(&mut bytes),
            },
            SSN_TSN_RESET => Self::SsnTsnReset {
                request_seq: next_u32(&mut bytes)?,
            },
            RECONFIG_RESPONSE => {
                let response_seq = next_u32(&mut bytes)?;
                let result = next_u32(&mut bytes)?;
                let next_tsns = match (bytes.next_u32_be(), bytes.next_u32_be()) {
                    (Some(sender), Some(receiver)) => Some((sender.into(), receiver.into())),
                    _ => None,
                };
                Self::Response {
                    response_seq,
                    result,
                    next_tsns,
                }
            }
            ADD_OUTGOING_STREAMS | ADD_INCOMING_STREAMS => {
                let request_seq = next_u32(&mut bytes)?;
                let new_streams = Field::Value(bytes.next_u16_be().ok_or(PTS)?);
                if kind == ADD_OUTGOING_STREAMS {
                    Self::AddOutgoingStreams {
                        request_seq,
                        new_streams,
                    }
                } else {
                    Self::AddIncomingStreams {
                        request_seq,
                        new_streams,
                    }
                }
            }
            kind => Err(ParseError::UnknownReconfigParameter(kind))?,
        })
    }
}

/// Writes a sequence of TLVs. Every TLV but the last is padded to a word
/// boundary; the last one's padding belongs to the enclosing chunk.
fn encode_tlvs(tlvs: impl Iterator<Item = (u16, Vec<u8>)>) -> Vec<u8> {
    let mut out = Vec::new();
    for (kind, value) in tlvs {
        out.resize(padded_to_word(out.len()), 0);
        out.extend_from_slice(&kind.to_be_bytes());
        out.extend_from_slice(&((value.len() + 4) as u16).to_be_bytes());
        out.extend_from_slice(&value);
    }
    out
}

/// Splits a buffer into `(type, value)` TLVs.
fn decode_tlvs(bytes: &[u8]) -> Result<Vec<(u16, Vec<u8>)>, ParseError> {
    let mut tlvs = vec![];
    let mut offset = 0;
    while offset + 4 <= bytes.len() {
        let mut header = bytes[offset..].iter().cloned();
        let kind = header.next_u16_be().ok_or(ParseError::ParameterTooShort)?;
        let length = header.next_u16_be().ok_or(ParseError::ParameterTooShort)? as usize;
        if length < 4 || offset + length > bytes.len() {
            Err(ParseError::ParameterTooShort)?
        }
        tlvs.push((kind, bytes[offset + 4..offset + length].to_vec()));
        offset += padded_to_word(length);
    }
    Ok(tlvs)
}

pub(super) fn encode_parameters(parameters: &[SctpParameter]) -> Vec<u8> {
    encode_tlvs(
        parameters
            .iter()
            .map(|parameter| (parameter.kind(), parameter.value().to_vec())),
    )
}

pub(super) fn decode_parameters(bytes: &[u8]) -> Result<Vec<SctpParameter>, ParseError> {
    Ok(decode_tlvs(bytes)?
        .into_iter()
        .map(|(kind, value)| SctpParameter::decode(kind, value))
        .collect())
}

pub(super) fn encode_causes(causes: &[ErrorCause]) -> Vec<u8> {
    encode_tlvs(causes.iter().map(|cause| (cause.code(), cause.value())))
}

pub(super) fn decode_causes(bytes: &[u8]) -> Result<Vec<ErrorCause>, ParseError> {
    decode_tlvs(bytes)?
        .into_iter()
        .map(|(code, value)| ErrorCause::decode(code, value))
        .collect()
}

pub(super) fn encode_reconfig(parameters: &[ReconfigParameter]) -> Vec<u8> {
    encode_tlvs(
        parameters
            .iter()
            .map(|parameter| (parameter.kind(), parameter.value())),
    )
}

pub(super) fn decode_reconfig(bytes: &[u8]) -> Result<Vec<ReconfigParameter>, ParseError> {
    decode_tlvs(bytes)?
        .into_iter()
        .map(|(kind, value)| ReconfigParameter::decode(kind, value))
        .collect()
}
