use super::ParseError;
use crate::protocols::utility::{padded_to_word, BytesExt};
use std::fmt::{self, Display};

const KIND_END_OF_LIST: u8 = 0;
const KIND_NO_OP: u8 = 1;
const KIND_MSS: u8 = 2;
const KIND_WINDOW_SCALE: u8 = 3;
const KIND_SACK_PERMITTED: u8 = 4;
const KIND_SACK: u8 = 5;
const KIND_TIMESTAMP: u8 = 8;

/// A single TCP header option, RFC 9293 s3.2 plus the RFC 7323 and RFC 2018
/// extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TcpOption {
    EndOfList,
    NoOp,
    MaxSegmentSize(u16),
    WindowScale(u8),
    SackPermitted,
    /// Left and right edges of each selectively acknowledged block
    Sack(Vec<(u32, u32)>),
    Timestamp { val: u32, ecr: u32 },
    Unknown { kind: u8, data: Vec<u8> },
}

impl TcpOption {
    pub fn kind(&self) -> u8 {
        match self {
            Self::EndOfList => KIND_END_OF_LIST,
            Self::NoOp => KIND_NO_OP,
            Self::MaxSegmentSize(_) => KIND_MSS,
            Self::WindowScale(_) => KIND_WINDOW_SCALE,
            Self::SackPermitted => KIND_SACK_PERMITTED,
            Self::Sack(_) => KIND_SACK,
            Self::Timestamp { .. } => KIND_TIMESTAMP,
            Self::Unknown { kind, .. } => *kind,
        }
    }

    /// The number of bytes the option occupies on the wire.
    pub fn wire_length(&self) -> usize {
        match self {
            Self::EndOfList | Self::NoOp => 1,
            Self::MaxSegmentSize(_) => 4,
            Self::WindowScale(_) => 3,
            Self::SackPermitted => 2,
            Self::Sack(blocks) => 2 + 8 * blocks.len(),
            Self::Timestamp { .. } => 10,
            Self::Unknown { data, .. } => 2 + data.len(),
        }
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::EndOfList | Self::NoOp => out.push(self.kind()),
            Self::MaxSegmentSize(mss) => {
                out.extend_from_slice(&[KIND_MSS, 4]);
                out.extend_from_slice(&mss.to_be_bytes());
            }
            Self::WindowScale(shift) => out.extend_from_slice(&[KIND_WINDOW_SCALE, 3, *shift]),
            Self::SackPermitted => out.extend_from_slice(&[KIND_SACK_PERMITTED, 2]),
            Self::Sack(blocks) => {
                out.extend_from_slice(&[KIND_SACK, self.wire_length() as u8]);
                for (left, right) in blocks {
                    out.extend_from_slice(&left.to_be_bytes());
                    out.extend_from_slice(&right.to_be_bytes());
                }
            }
            Self::Timestamp { val, ecr } => {
                out.extend_from_slice(&[KIND_TIMESTAMP, 10]);
                out.extend_from_slice(&val.to_be_bytes());
                out.extend_from_slice(&ecr.to_be_bytes());
            }
            Self::Unknown { kind, data } => {
                out.extend_from_slice(&[*kind, self.wire_length() as u8]);
                out.extend_from_slice(data);
            }
        }
    }
}

impl Display for TcpOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfList => write!(f, "eol"),
            Self::NoOp => write!(f, "nop"),
            Self::MaxSegmentSize(mss) => write!(f, "mss {mss}"),
            Self::WindowScale(shift) => write!(f, "wscale {shift}"),
            Self::SackPermitted => write!(f, "sackOK"),
            Self::Sack(blocks) => {
                write!(f, "sack")?;
                for (left, right) in blocks {
                    write!(f, " {left}:{right}")?;
                }
                Ok(())
            }
            Self::Timestamp { val, ecr } => write!(f, "TS val {val} ecr {ecr}"),
            Self::Unknown { kind, data } => write!(f, "kind {kind} ({} bytes)", data.len()),
        }
    }
}

/// Serializes options and pads them with zeros to a whole number of words.
pub fn serialize_options(options: &[TcpOption]) -> Vec<u8> {
    let mut out = Vec::new();
    for option in options {
        option.serialize_into(&mut out);
    }
    out.resize(padded_to_word(out.len()), 0);
    out
}

/// Decodes the option area of a TCP header. Anything after an end-of-list
/// option is padding.
pub fn parse_options(bytes: &[u8]) -> Result<Vec<TcpOption>, ParseError> {
    let mut options = Vec::new();
    let mut iter = bytes.iter().cloned();
    while let Some(kind) = iter.next_u8() {
        let option = match kind {
            KIND_END_OF_LIST => {
                options.push(TcpOption::EndOfList);
                break;
            }
            KIND_NO_OP => TcpOption::NoOp,
            kind => {
                let length = iter.next_u8().ok_or(ParseError::OptionTooShort)? as usize;
                if length < 2 {
                    Err(ParseError::InvalidOptionLength { kind, length })?
                }
                let data = iter.next_vec(length - 2).ok_or(ParseError::OptionTooShort)?;
                let mut body = data.iter().cloned();
                let bad_length = ParseError::InvalidOptionLength { kind, length };
                match (kind, length) {
                    (KIND_MSS, 4) => TcpOption::MaxSegmentSize(body.next_u16_be().ok_or(bad_length)?),
                    (KIND_WINDOW_SCALE, 3) => TcpOption::WindowScale(body.next_u8().ok_or(bad_length)?),
                    (KIND_SACK_PERMITTED, 2) => TcpOption::SackPermitted,
                    (KIND_SACK, length) if length % 8 == 2 => {
                        let mut blocks = Vec::with_capacity(length / 8);
                        while let (Some(left), Some(right)) = (body.next_u32_be(), body.next_u32_be()) {
                            blocks.push((left, right));
                        }
                        TcpOption::Sack(blocks)
                    }
                    (KIND_TIMESTAMP, 10) => TcpOption::Timestamp {
                        val: body.next_u32_be().ok_or(bad_length)?,
                        ecr: body.next_u32_be().ok_or(bad_length)?,
                    },
                    (KIND_MSS | KIND_WINDOW_SCALE | KIND_SACK_PERMITTED | KIND_SACK | KIND_TIMESTAMP, _) => {
                        Err(bad_length)?
                    }
                    (kind, _) => TcpOption::Unknown {
                        kind,
                        data: data.clone(),
                    },
                }
            }
        };
        options.push(option);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_lengths() {
        assert_eq!(TcpOption::NoOp.wire_length(), 1);
        assert_eq!(TcpOption::EndOfList.wire_length(), 1);
        assert_eq!(TcpOption::MaxSegmentSize(1460).wire_length(), 4);
        assert_eq!(TcpOption::WindowScale(7).wire_length(), 3);
        assert_eq!(TcpOption::SackPermitted.wire_length(), 2);
        assert_eq!(TcpOption::Timestamp { val: 1, ecr: 2 }.wire_length(), 10);
        assert_eq!(TcpOption::Sack(vec![(1, 2), (3, 4)]).wire_length(), 18);
    }

    #[test]
    fn syn_options_are_padded() {
        let options = vec![
            TcpOption::MaxSegmentSize(1460),
            TcpOption::SackPermitted,
            TcpOption::NoOp,
            TcpOption::WindowScale(7),
        ];
        let bytes = serialize_options(&options);
        assert_eq!(bytes, [2, 4, 0x05, 0xb4, 4, 2, 1, 3, 3, 7, 0, 0]);
        let parsed = parse_options(&bytes).unwrap();
        assert_eq!(&parsed[..4], &options[..]);
        assert_eq!(parsed[4], TcpOption::EndOfList);
    }

    #[test]
    fn decodes_sack_and_timestamp() {
        let options = vec![
            TcpOption::NoOp,
            TcpOption::NoOp,
            TcpOption::Timestamp { val: 100, ecr: 7 },
            TcpOption::NoOp,
            TcpOption::NoOp,
            TcpOption::Sack(vec![(1000, 2000)]),
        ];
        let bytes = serialize_options(&options);
        assert_eq!(bytes.len(), 24);
        assert_eq!(parse_options(&bytes).unwrap(), options);
    }

    #[test]
    fn rejects_bad_mss_length() {
        assert_eq!(
            parse_options(&[2, 3, 0, 0]),
            Err(ParseError::InvalidOptionLength { kind: 2, length: 3 })
        );
        assert_eq!(parse_options(&[8, 10, 0]), Err(ParseError::OptionTooShort));
    }

    #[test]
    fn keeps_unknown_options() {
        let parsed = parse_options(&[30, 4, 0xab, 0xcd]).unwrap();
        assert_eq!(
            parsed,
            vec![TcpOption::Unknown {
                kind: 30,
                data: vec![0xab, 0xcd]
            }]
        );
    }
}
