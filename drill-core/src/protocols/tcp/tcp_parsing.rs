use super::tcp_options::{parse_options, serialize_options, TcpOption};
use crate::{
    field::Field,
    protocols::{ipv4::Ipv4Address, utility::Checksum},
};
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// The number of 32-bit words in a TCP header without optional header parts
const BASE_HEADER_WORDS: u8 = 5;
/// The number of bytes in a TCP header without optional header parts
const BASE_HEADER_OCTETS: u8 = BASE_HEADER_WORDS * 4;
/// The largest option area a data offset can describe
const MAX_OPTION_OCTETS: usize = 40;

/// The data for a TCP header
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct TcpHeader {
    /// The source port number
    pub src_port: u16,
    /// The destination port number
    pub dst_port: u16,
    /// The sequence number of the first data octet in this segment (except when
    /// SYN is present). If SYN is present the sequence number is the initial
    /// sequence number (ISN) and the first data octet is ISN+1.
    pub seq: u32,
    /// If the ACK control bit is set this field contains the value of the next
    /// sequence number the sender of the segment is expecting to receive.
    pub ack: u32,
    /// The number of 32-bit words in the TCP header
    pub data_offset: u8,
    /// Flags that adjust the how segments are handled
    pub ctl: Control,
    /// The number of data octets beginning with the one indicated in the
    /// acknowledgment field which the sender of this segment is willing to
    /// accept.
    pub wnd: u16,
    /// The urgent pointer. Only interpreted in segments with URG set.
    pub urg: u16,
    /// The header checksum
    pub checksum: u16,
    /// Header options. An expected segment may leave these unchecked.
    pub options: Field<Vec<TcpOption>>,
    /// Number of payload bytes that follow the header
    pub payload_len: u16,
}

impl TcpHeader {
    /// Parses a serialized TCP segment into its header fields. `packet_len`
    /// is the length of the whole segment, header and payload.
    pub fn from_bytes(
        mut packet: impl Iterator<Item = u8>,
        packet_len: usize,
        src_address: Ipv4Address,
        dst_address: Ipv4Address,
    ) -> Result<Self, ParseError> {
        let mut next =
            || -> Result<u8, ParseError> { packet.next().ok_or(ParseError::HeaderTooShort) };
        let mut checksum = Checksum::new();

        let src_port = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(src_port);

        let dst_port = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(dst_port);

        let sequence_bytes = [next()?, next()?, next()?, next()?];
        let seq = u32::from_be_bytes(sequence_bytes);
        checksum.add_u32(sequence_bytes);

        let acknowledgement_bytes = [next()?, next()?, next()?, next()?];
        let ack = u32::from_be_bytes(acknowledgement_bytes);
        checksum.add_u32(acknowledgement_bytes);

        let offset_reserved_control = [next()?, next()?];
        checksum.add_u16(u16::from_be_bytes(offset_reserved_control));
        let data_offset = offset_reserved_control[0] >> 4;
        let ctl = Control::from(offset_reserved_control[1] & 0b11_1111);

        if data_offset < BASE_HEADER_WORDS {
            Err(ParseError::InvalidDataOffset(data_offset))?
        }

        let wnd = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(wnd);

        let expected_checksum = u16::from_be_bytes([next()?, next()?]);

        let urg = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(urg);

        let option_len = (data_offset - BASE_HEADER_WORDS) as usize * 4;
        let mut option_bytes = Vec::with_capacity(option_len);
        for _ in 0..option_len {
            option_bytes.push(next()?);
        }
        checksum.accumulate_remainder(option_bytes.iter().cloned());
        let options = parse_options(&option_bytes)?;

        checksum.accumulate_remainder(&mut packet);

        let header_len = data_offset as usize * 4;
        let payload_len = packet_len
            .checked_sub(header_len)
            .ok_or(ParseError::HeaderTooShort)?
            .try_into()
            .map_err(|_| ParseError::PacketTooLong)?;

        // Pseudo header stuff
        checksum.add_u32(src_address.into());
        checksum.add_u32(dst_address.into());
        // zero, TCP protocol number
        checksum.add_u8(0, 6);
        checksum.add_u16(
            packet_len
                .try_into()
                .map_err(|_| ParseError::PacketTooLong)?,
        );

        let checksum = checksum.as_u16();
        if expected_checksum == checksum {
            Ok(TcpHeader {
                src_port,
                dst_port,
                seq,
                ack,
                data_offset,
                ctl,
                wnd,
                urg,
                checksum,
                options: Field::Value(options),
                payload_len,
            })
        } else {
            Err(ParseError::Checksum {
                actual: checksum,
                expected: expected_checksum,
            })
        }
    }

    /// Size of the header in bytes
    pub fn bytes(&self) -> u8 {
        // Safe to do because data offset is only 4 bits
        self.data_offset * 4
    }

    /// The options carried by the header, treating unchecked options as none.
    pub fn option_list(&self) -> &[TcpOption] {
        self.options.value().map(Vec::as_slice).unwrap_or_default()
    }

    /// Convert the header to its native serialized format, ready to attach to a
    /// packet and send over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes() as usize);
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.ack.to_be_bytes());
        out.push(self.data_offset << 4);
        out.push(self.ctl.into());
        out.extend_from_slice(&self.wnd.to_be_bytes());
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&self.urg.to_be_bytes());
        out.extend(serialize_options(self.option_list()));
        out
    }
}

/// An error that occurred while parsing a TCP header
#[derive(Debug, ThisError, PartialEq, Eq, Clone, Copy)]
pub enum ParseError {
    #[error("Too few bytes to constitute a TCP header")]
    HeaderTooShort,
    #[error("The packet length could not fit into a u16")]
    PacketTooLong,
    #[error(
        "The computed checksum {actual:#06x} did not match the header checksum {expected:#06x}"
    )]
    Checksum { actual: u16, expected: u16 },
    #[error("Data offset {0} is smaller than a bare header")]
    InvalidDataOffset(u8),
    #[error("A TCP option ran past the end of the header")]
    OptionTooShort,
    #[error("TCP option kind {kind} cannot have length {length}")]
    InvalidOptionLength { kind: u8, length: usize },
}

/// Used for building a serialized TCP header
#[derive(Debug)]
pub struct TcpHeaderBuilder(TcpHeader);

impl TcpHeaderBuilder {
    /// Initialize the TCP header with defaults and the given values
    pub fn new(src_port: u16, dst_port: u16, seq: u32) -> Self {
        Self(TcpHeader {
            src_port,
            dst_port,
            seq,
            wnd: 0,
            ack: 0,
            urg: 0,
            ctl: Control::default(),
            options: Field::Value(vec![]),

            // Filled in by .build()
            data_offset: 0,
            checksum: 0,
            payload_len: 0,
        })
    }

    /// Set the window size
    pub fn wnd(mut self, wnd: u16) -> Self {
        self.0.wnd = wnd;
        self
    }

    /// Set the acknowledgement number without touching the control bits
    pub fn ack_number(mut self, ack: u32) -> Self {
        self.0.ack = ack;
        self
    }

    /// Replace all control bits
    pub fn ctl(mut self, ctl: Control) -> Self {
        self.0.ctl = ctl;
        self
    }

    /// Set the header options
    pub fn options(mut self, options: Field<Vec<TcpOption>>) -> Self {
        self.0.options = options;
        self
    }

    /// Get the header with its data offset and checksum filled in
    pub fn build(
        self,
        src_address: Ipv4Address,
        dst_address: Ipv4Address,
        mut text: impl Iterator<Item = u8>,
        text_len: usize,
    ) -> Result<TcpHeader, BuildHeaderError> {
        let option_bytes = serialize_options(self.0.option_list());
        if option_bytes.len() > MAX_OPTION_OCTETS {
            Err(BuildHeaderError::OverlyLongOptions)?
        }
        let data_offset = BASE_HEADER_WORDS + (option_bytes.len() / 4) as u8;
        let header_len = data_offset as usize * 4;

        let mut checksum = Checksum::new();
        let length: u16 = (text_len + header_len)
            .try_into()
            .map_err(|_| BuildHeaderError::OverlyLongPayload)?;
        checksum.accumulate_remainder(&mut text);

        // Pseudo header
        checksum.add_u32(src_address.into());
        checksum.add_u32(dst_address.into());
        checksum.add_u8(0, 6);
        checksum.add_u16(length);

        // Header parts
        checksum.add_u16(self.0.src_port);
        checksum.add_u16(self.0.dst_port);
        checksum.add_u32(self.0.seq.to_be_bytes());
        checksum.add_u32(self.0.ack.to_be_bytes());
        checksum.add_u8(data_offset << 4, self.0.ctl.into());
        checksum.add_u16(self.0.wnd);
        checksum.add_u16(self.0.urg);
        checksum.accumulate_remainder(option_bytes.into_iter());

        let mut header = self.0;
        header.data_offset = data_offset;
        header.checksum = checksum.as_u16();
        header.payload_len = text_len as u16;
        Ok(header)
    }
}

/// An error that occurred while building a TCP header
#[derive(Debug, ThisError, PartialEq, Eq, Clone, Copy)]
pub enum BuildHeaderError {
    #[error("The TCP payload is longer than can fit into a single packet")]
    OverlyLongPayload,
    #[error("The TCP options do not fit into 40 bytes")]
    OverlyLongOptions,
}

/// The control bits of a TCP header
#[derive(Default, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Control(u8);

/// Declares each control bit with its accessors and the letter scripts
/// write it as. Listed in the order scripts spell them.
macro_rules! control_bits {
    ($($bit:literal => $get:ident, $set:ident, $letter:literal;)+) => {
        impl Control {
            $(
                pub const fn $get(self) -> bool {
                    (self.0 >> $bit) & 1 == 1
                }

                pub fn $set(&mut self, state: bool) {
                    self.0 = (self.0 & !(1 << $bit)) | ((state as u8) << $bit);
                }
            )+

            /// Reads script flag letters, `.` being ACK. Unknown letters
            /// are ignored.
            pub fn from_letters(letters: &str) -> Self {
                let mut control = Self::default();
                $(control.$set(letters.contains($letter));)+
                control
            }
        }

        impl Display for Control {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.0 & 0b11_1111 == 0 {
                    return write!(f, "-");
                }
                $(
                    if self.$get() {
                        write!(f, "{}", $letter)?;
                    }
                )+
                Ok(())
            }
        }
    };
}

control_bits! {
    0 => fin, set_fin, 'F';
    1 => syn, set_syn, 'S';
    2 => rst, set_rst, 'R';
    3 => psh, set_psh, 'P';
    5 => urg, set_urg, 'U';
    4 => ack, set_ack, '.';
}

impl From<u8> for Control {
    fn from(n: u8) -> Self {
        Self(n)
    }
}

impl From<Control> for u8 {
    fn from(control: Control) -> Self {
        control.0
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Control({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = b"Hello, world!";
    const SRC_ADDRESS: Ipv4Address = Ipv4Address::LOCALHOST;
    const DST_ADDRESS: Ipv4Address = Ipv4Address::new([192, 0, 2, 1]);
    const SRC_PORT: u16 = 0xcafe;
    const DST_PORT: u16 = 0xbabe;
    const SEQUENCE: u32 = 123456789;
    const WINDOW: u16 = 1024;
    const ACKNOWLEDGEMENT: u32 = 10;

    fn build_expected(with_options: bool) -> (etherparse::TcpHeader, Vec<u8>) {
        let expected = {
            let mut expected = etherparse::TcpHeader::new(SRC_PORT, DST_PORT, SEQUENCE, WINDOW);
            expected.acknowledgment_number = ACKNOWLEDGEMENT;
            expected.ack = true;
            expected.psh = true;
            if with_options {
                expected
                    .set_options(&[
                        etherparse::TcpOptionElement::MaximumSegmentSize(1460),
                        etherparse::TcpOptionElement::Noop,
                        etherparse::TcpOptionElement::WindowScale(7),
                    ])
                    .unwrap();
            }
            #[cfg(feature = "compute_checksum")]
            {
                let ip_header = etherparse::Ipv4Header::new(
                    PAYLOAD.len().try_into().unwrap(),
                    31,
                    etherparse::IpNumber::Tcp,
                    SRC_ADDRESS.into(),
                    DST_ADDRESS.into(),
                );
                expected.checksum = expected.calc_checksum_ipv4(&ip_header, PAYLOAD).unwrap();
            }
            expected
        };

        let serial = {
            let mut serial = vec![];
            expected.write(&mut serial).unwrap();
            serial
        };

        (expected, serial)
    }

    fn builder() -> TcpHeaderBuilder {
        TcpHeaderBuilder::new(SRC_PORT, DST_PORT, SEQUENCE)
            .wnd(WINDOW)
            .ack_number(ACKNOWLEDGEMENT)
            .ctl(Control::from_letters("P."))
    }

    #[test]
    fn parses_packet() {
        let control = Control::from_letters("P.");

        let (expected, serial) = build_expected(false);

        let len = serial.len() + PAYLOAD.len();
        let actual = TcpHeader::from_bytes(
            serial.into_iter().chain(PAYLOAD.iter().cloned()),
            len,
            SRC_ADDRESS,
            DST_ADDRESS,
        )
        .unwrap();

        assert_eq!(actual.src_port, SRC_PORT);
        assert_eq!(actual.dst_port, DST_PORT);
        assert_eq!(actual.seq, SEQUENCE);
        assert_eq!(actual.ack, ACKNOWLEDGEMENT);
        assert_eq!(actual.ctl, control);
        assert_eq!(actual.wnd, WINDOW);
        assert_eq!(actual.checksum, expected.checksum);
        assert_eq!(actual.urg, 0);
        assert_eq!(actual.payload_len, PAYLOAD.len() as u16);
        assert_eq!(actual.options, Field::Value(vec![]));
    }

    #[test]
    fn parses_packet_with_options() {
        let (_, serial) = build_expected(true);
        let len = serial.len() + PAYLOAD.len();
        let actual = TcpHeader::from_bytes(
            serial.into_iter().chain(PAYLOAD.iter().cloned()),
            len,
            SRC_ADDRESS,
            DST_ADDRESS,
        )
        .unwrap();
        assert_eq!(actual.data_offset, 7);
        assert_eq!(
            &actual.option_list()[..3],
            &[
                TcpOption::MaxSegmentSize(1460),
                TcpOption::NoOp,
                TcpOption::WindowScale(7)
            ]
        );
    }

    #[test]
    fn builds_packet() {
        let (_, expected) = build_expected(false);

        let actual = builder()
            .build(
                SRC_ADDRESS,
                DST_ADDRESS,
                PAYLOAD.iter().cloned(),
                PAYLOAD.len(),
            )
            .unwrap()
            .serialize();

        assert_eq!(expected, actual);
    }

    #[test]
    fn builds_packet_with_options() {
        let (_, expected) = build_expected(true);

        let actual = builder()
            .options(Field::Value(vec![
                TcpOption::MaxSegmentSize(1460),
                TcpOption::NoOp,
                TcpOption::WindowScale(7),
            ]))
            .build(
                SRC_ADDRESS,
                DST_ADDRESS,
                PAYLOAD.iter().cloned(),
                PAYLOAD.len(),
            )
            .unwrap()
            .serialize();

        assert_eq!(expected, actual);
    }

    #[test]
    fn control_letters() {
        let control = Control::from_letters("S.");
        assert!(control.syn());
        assert!(control.ack());
        assert!(!control.fin());
        assert_eq!(control.to_string(), "S.");
        assert_eq!(u8::from(control), 0b1_0010);

        let control = Control::from_letters("FRP");
        assert!(control.fin() && control.rst() && control.psh());
        assert!(!control.ack() && !control.urg());
        assert_eq!(control.to_string(), "FRP");
        assert_eq!(Control::default().to_string(), "-");
    }
}
