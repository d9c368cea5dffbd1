//! The in-memory form of a parsed test script.

use crate::{
    datagram::TransportProtocol,
    expression::Expression,
    field::Field,
    protocols::{
        sctp::chunks::SctpChunk,
        tcp::{Control, TcpOption},
    },
};
use itertools::Itertools;
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// Simulated time in microseconds.
pub type Micros = i64;

pub const MICROS_PER_SECOND: Micros = 1_000_000;

/// A parsed script: its option block and its events in script order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    /// `--name=value` settings, in the order they appeared
    pub options: Vec<(String, String)>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeKind {
    /// A bare number, measured from the start of the run
    Absolute,
    /// `+n`, measured from the previous event
    Relative,
    /// `*`, whenever it happens
    Any,
    /// `a~b`
    AbsoluteRange,
    /// `+a~+b`
    RelativeRange,
}

impl TimeKind {
    pub fn is_range(self) -> bool {
        matches!(self, Self::AbsoluteRange | Self::RelativeRange)
    }

    pub fn is_relative(self) -> bool {
        matches!(self, Self::Relative | Self::RelativeRange | Self::Any)
    }
}

/// When an event is expected. `end` only means something for ranges.
/// `offset` is filled in when the event is scheduled and records the
/// anchor relative times were measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpec {
    pub kind: TimeKind,
    pub time: Micros,
    pub end: Micros,
    pub offset: Micros,
}

impl TimeSpec {
    pub const fn new(kind: TimeKind, time: Micros) -> Self {
        Self {
            kind,
            time,
            end: time,
            offset: 0,
        }
    }

    pub const fn range(kind: TimeKind, time: Micros, end: Micros) -> Self {
        Self {
            kind,
            time,
            end,
            offset: 0,
        }
    }

    pub const fn any() -> Self {
        Self::new(TimeKind::Any, 0)
    }
}

impl Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = |t: Micros| t as f64 / MICROS_PER_SECOND as f64;
        match self.kind {
            TimeKind::Absolute => write!(f, "{:.6}", secs(self.time)),
            TimeKind::Relative => write!(f, "+{:.6}", secs(self.time)),
            TimeKind::Any => write!(f, "*"),
            TimeKind::AbsoluteRange => {
                write!(f, "{:.6}~{:.6}", secs(self.time), secs(self.end))
            }
            TimeKind::RelativeRange => {
                write!(f, "+{:.6}~+{:.6}", secs(self.time), secs(self.end))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `<`, injected into the stack under test
    Inbound,
    /// `>`, expected from the stack under test
    Outbound,
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "<"),
            Self::Outbound => write!(f, ">"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// 1-based line of the script the event came from
    pub line: usize,
    /// Position in the event list
    pub number: usize,
    pub time: TimeSpec,
    pub kind: EventKind,
}

impl Event {
    /// Checks the rules that tie time kinds to event kinds. `*` and ranges
    /// describe when something may be observed, so only expected packets
    /// can carry them.
    pub fn check_time(&self) -> Result<(), TimeRuleError> {
        if self.time.kind.is_range() && self.time.end < self.time.time {
            Err(TimeRuleError::BackwardsRange)?
        }
        let outbound = matches!(
            &self.kind,
            EventKind::Packet(PacketEvent {
                direction: Direction::Outbound,
                ..
            })
        );
        if !outbound && self.time.kind == TimeKind::Any {
            Err(TimeRuleError::StarOnNonOutbound)?
        }
        if !outbound && self.time.kind.is_range() {
            Err(TimeRuleError::RangeOnNonOutbound)?
        }
        Ok(())
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time, self.kind)
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum TimeRuleError {
    #[error("time range is backwards")]
    BackwardsRange,
    #[error("event time <star> can only be used with outbound packets")]
    StarOnNonOutbound,
    #[error("event time range can only be used with outbound packets")]
    RangeOnNonOutbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Packet(PacketEvent),
    Syscall(SyscallSpec),
    /// A backquoted shell command. Commands are not executed.
    Command(String),
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packet(packet) => packet.fmt(f),
            Self::Syscall(syscall) => syscall.fmt(f),
            Self::Command(command) => write!(f, "`{command}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEvent {
    pub direction: Direction,
    pub spec: PacketSpec,
}

impl Display for PacketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.direction, self.spec)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketSpec {
    Tcp(TcpSpec),
    Udp(UdpSpec),
    /// SCTP chunks in packet order. Fields the script left as `...` are
    /// wildcards; DATA payloads and missing cookies or heartbeat
    /// information are filled in when the packet is built.
    Sctp(Vec<SctpChunk>),
}

impl PacketSpec {
    pub fn protocol(&self) -> TransportProtocol {
        match self {
            Self::Tcp(_) => TransportProtocol::Tcp,
            Self::Udp(_) => TransportProtocol::Udp,
            Self::Sctp(_) => TransportProtocol::Sctp,
        }
    }
}

impl Display for PacketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(tcp) => tcp.fmt(f),
            Self::Udp(udp) => write!(f, "udp ({})", udp.payload_len),
            Self::Sctp(chunks) => write!(
                f,
                "sctp: {}",
                chunks.iter().map(|chunk| chunk.name()).join("; ")
            ),
        }
    }
}

/// `flags start:end(len) [ack n] [win n] [<options>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSpec {
    pub flags: Control,
    pub start_seq: u32,
    pub payload_len: u16,
    /// Absent acks are not compared on outbound packets and are zero on
    /// inbound ones.
    pub ack: Field<u32>,
    pub window: Field<u16>,
    /// `<...>` is a wildcard. No option list at all is an empty list.
    pub options: Field<Vec<TcpOption>>,
}

impl TcpSpec {
    pub fn end_seq(&self) -> u32 {
        self.start_seq.wrapping_add(self.payload_len as u32)
    }
}

impl Display for TcpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{}({})",
            self.flags,
            self.start_seq,
            self.end_seq(),
            self.payload_len
        )?;
        if let Some(ack) = self.ack.value() {
            write!(f, " ack {ack}")?;
        }
        if let Some(window) = self.window.value() {
            write!(f, " win {window}")?;
        }
        match &self.options {
            Field::Wildcard => write!(f, " <...>"),
            Field::Value(options) if options.is_empty() => Ok(()),
            Field::Value(options) => write!(f, " <{}>", options.iter().join(",")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpSpec {
    pub payload_len: u16,
}

/// `name(args) = result [ERRNO (strerror)]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallSpec {
    pub name: String,
    pub arguments: Vec<Expression>,
    pub result: Expression,
    /// The errno symbol a failing call is expected to set
    pub errno: Option<String>,
    pub note: Option<String>,
    /// For blocking calls written `start...end`, when the call returns
    pub end_time: Option<Micros>,
}

impl SyscallSpec {
    pub fn new(name: impl Into<String>, arguments: Vec<Expression>, result: Expression) -> Self {
        Self {
            name: name.into(),
            arguments,
            result,
            errno: None,
            note: None,
            end_time: None,
        }
    }
}

impl Display for SyscallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) = {}",
            self.name,
            self.arguments.iter().join(", "),
            self.result
        )?;
        if let Some(errno) = &self.errno {
            write!(f, " {errno}")?;
        }
        if let Some(note) = &self.note {
            write!(f, " ({note})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(time: TimeSpec, kind: EventKind) -> Event {
        Event {
            line: 1,
            number: 0,
            time,
            kind,
        }
    }

    fn outbound_udp() -> EventKind {
        EventKind::Packet(PacketEvent {
            direction: Direction::Outbound,
            spec: PacketSpec::Udp(UdpSpec { payload_len: 10 }),
        })
    }

    fn inbound_udp() -> EventKind {
        EventKind::Packet(PacketEvent {
            direction: Direction::Inbound,
            spec: PacketSpec::Udp(UdpSpec { payload_len: 10 }),
        })
    }

    #[test]
    fn star_only_on_outbound_packets() {
        assert_eq!(event(TimeSpec::any(), outbound_udp()).check_time(), Ok(()));
        assert_eq!(
            event(TimeSpec::any(), inbound_udp()).check_time(),
            Err(TimeRuleError::StarOnNonOutbound)
        );
        let close = EventKind::Syscall(SyscallSpec::new(
            "close",
            vec![Expression::Integer(3)],
            Expression::Integer(0),
        ));
        assert_eq!(
            event(TimeSpec::any(), close).check_time(),
            Err(TimeRuleError::StarOnNonOutbound)
        );
    }

    #[test]
    fn ranges_only_on_outbound_packets() {
        let range = TimeSpec::range(TimeKind::AbsoluteRange, 100, 200);
        assert_eq!(event(range, outbound_udp()).check_time(), Ok(()));
        assert_eq!(
            event(range, inbound_udp()).check_time(),
            Err(TimeRuleError::RangeOnNonOutbound)
        );
        let backwards = TimeSpec::range(TimeKind::RelativeRange, 200, 100);
        assert_eq!(
            event(backwards, outbound_udp()).check_time(),
            Err(TimeRuleError::BackwardsRange)
        );
    }

    #[test]
    fn displays_events() {
        let tcp = EventKind::Packet(PacketEvent {
            direction: Direction::Inbound,
            spec: PacketSpec::Tcp(TcpSpec {
                flags: Control::from_letters("S"),
                start_seq: 0,
                payload_len: 0,
                ack: Field::Wildcard,
                window: Field::Value(32792),
                options: Field::Value(vec![TcpOption::MaxSegmentSize(1000)]),
            }),
        });
        let shown = event(TimeSpec::new(TimeKind::Relative, 100_000), tcp).to_string();
        assert_eq!(shown, "+0.100000 < S 0:0(0) win 32792 <mss 1000>");
    }
}
