//! Socket calls a script can make on the stack under test.
//!
//! Each call is an entry in [`SYSCALLS`] naming its argument shape. Argument
//! counts are checked once, generically, before the handler runs. Handlers
//! translate the evaluated arguments into [`StackUnderTest`] operations.

use crate::{
    config::Config,
    datagram::TransportProtocol,
    expression::{evaluate, evaluate_all, EvalError, Expression},
    protocols::utility::Endpoint,
    script::{Micros, SyscallSpec, TimeSpec},
    symbols::SymbolTable,
    timing::{verify_time, TimingError},
};
use std::{collections::VecDeque, fmt};
use thiserror::Error as ThisError;

/// The socket side of the implementation under test.
///
/// Calls return immediately. Anything the stack has to say afterwards
/// arrives as a [`SocketNotification`].
pub trait StackUnderTest {
    /// Opens the single socket a script works with.
    fn open(&mut self, protocol: TransportProtocol);
    fn bind(&mut self, local: Endpoint);
    fn listen(&mut self, backlog: u32);
    fn connect(&mut self, remote: Endpoint);
    fn accept(&mut self);
    fn send(&mut self, request: SendRequest);
    fn send_to(&mut self, remote: Endpoint, data: Vec<u8>);
    /// Asks for data the stack announced to be delivered.
    fn recv_request(&mut self);
    fn close(&mut self);
    fn shutdown(&mut self);
    fn set_option(&mut self, option: SocketOption);
    /// Inbound and outbound stream counts of the association.
    fn stream_counts(&self) -> (u16, u16);
}

/// What the stack reports back to the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketNotification {
    /// Data is waiting to be requested
    DataAvailable,
    /// A message of `len` bytes was handed to the application
    DataDelivered { len: usize },
    /// A connection was set up, either by `connect` or on the listening
    /// socket
    Established,
    OptionsApplied,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendRequest {
    pub data: Vec<u8>,
    pub stream: u16,
    pub ppid: u32,
    pub unordered: bool,
}

/// Settings applied through `setsockopt`. `None` members were `...` in the
/// script and leave the stack's setting alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    InitMsg {
        outbound_streams: Option<u16>,
        inbound_streams: Option<u16>,
        max_attempts: Option<u16>,
        max_init_timeout: Option<u16>,
    },
    /// Retransmission timeouts in milliseconds
    RtoInfo {
        initial: Option<u32>,
        max: Option<u32>,
        min: Option<u32>,
    },
    SackInfo {
        delay: Option<u32>,
        frequency: Option<u32>,
    },
    PeerAddrParams {
        heartbeat: Option<bool>,
        heartbeat_interval: Option<u32>,
        path_max_retransmissions: Option<u16>,
    },
    AssocParams {
        max_retransmissions: Option<u16>,
    },
    MaxBurst(u32),
    MaxSegment(u32),
    EnableStreamReset(u32),
    NoDelay(bool),
    ResetStreams {
        incoming: bool,
        outgoing: bool,
        streams: Vec<u16>,
    },
    ResetAssoc,
    AddStreams {
        inbound: u16,
        outbound: u16,
    },
}

/// How many arguments a syscall takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtMost(usize),
}

impl Arity {
    fn admits(self, count: usize) -> bool {
        match self {
            Self::Exactly(n) => count == n,
            Self::AtMost(n) => count <= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "{n}"),
            Self::AtMost(n) => write!(f, "at most {n}"),
        }
    }
}

/// What happens to the event after the call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The call blocks until the stack reports back
    Blocked(Wait),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Accept,
    /// A `read` expecting `len` bytes
    Read { len: usize },
    /// A `recvfrom` expecting `len` bytes
    RecvFrom { len: usize },
}

/// Socket bookkeeping kept between calls and notifications.
#[derive(Debug, Clone, Default)]
pub struct SocketState {
    pub protocol: Option<TransportProtocol>,
    pub listen_set: bool,
    pub accept_set: bool,
    /// A connection arrived before anyone accepted it
    pub established_pending: bool,
    /// A read is waiting for data to be announced
    pub recv_from_set: bool,
    /// Data was announced before anyone read it
    pub msg_arrived: bool,
    pub options_applied: bool,
    /// Lengths and arrival times of messages delivered before anyone asked
    /// for them
    pub delivered: VecDeque<(usize, Micros)>,
    /// Running count of payload bytes handed to the stack
    pub bytes_sent: usize,
}

impl SocketState {
    /// Payload bytes for the next send. The pattern continues across
    /// calls so every byte of a stream is distinguishable.
    fn next_payload(&mut self, len: usize) -> Vec<u8> {
        let start = self.bytes_sent;
        self.bytes_sent += len;
        (0..len).map(|i| ((start + i) & 0xff) as u8).collect()
    }
}

/// Everything a handler may touch.
pub struct Call<'a> {
    pub name: &'static str,
    pub args: &'a [Expression],
    pub result: &'a Expression,
    pub symbols: &'a SymbolTable,
    pub config: &'a Config,
    /// When the call is allowed to complete
    pub time: &'a TimeSpec,
    pub state: &'a mut SocketState,
    pub stack: &'a mut dyn StackUnderTest,
}

impl<'a> Call<'a> {
    fn arg(&self, index: usize) -> Result<&'a Expression, DispatchError> {
        self.args.get(index).ok_or(DispatchError::BadArgument {
            name: self.name,
            index,
            reason: "missing".to_string(),
        })
    }

    fn int(&self, index: usize) -> Result<i64, DispatchError> {
        let arg = self.arg(index)?;
        arg.integer().ok_or_else(|| DispatchError::BadArgument {
            name: self.name,
            index,
            reason: format!("expected an integer, got {}", arg.kind_name()),
        })
    }

    fn ellipsis(&self, index: usize) -> Result<(), DispatchError> {
        if self.arg(index)?.is_ellipsis() {
            Ok(())
        } else {
            Err(DispatchError::BadArgument {
                name: self.name,
                index,
                reason: "expected ...".to_string(),
            })
        }
    }

    /// The byte count the script says the call returns.
    fn result_count(&self) -> Result<usize, DispatchError> {
        match self.result.integer() {
            Some(count) if count >= 0 => Ok(count as usize),
            _ => Err(DispatchError::BadResult {
                name: self.name,
                result: self.result.to_string(),
            }),
        }
    }

    fn returns_error(&self) -> bool {
        self.result.integer() == Some(-1)
    }

    fn protocol(&self) -> Result<TransportProtocol, DispatchError> {
        self.state.protocol.ok_or(DispatchError::NoSocket(self.name))
    }

    fn require(&self, allowed: &[TransportProtocol]) -> Result<TransportProtocol, DispatchError> {
        let protocol = self.protocol()?;
        if allowed.contains(&protocol) {
            Ok(protocol)
        } else {
            Err(DispatchError::ProtocolNotSupported {
                name: self.name,
                protocol,
            })
        }
    }

    /// An integer member of a socket option structure. `...` leaves it unset.
    fn member(&self, expression: &Expression) -> Result<Option<i64>, DispatchError> {
        if expression.is_ellipsis() {
            return Ok(None);
        }
        match evaluate(expression, self.symbols)? {
            Expression::Integer(value) => Ok(Some(value)),
            other => Err(DispatchError::BadArgument {
                name: self.name,
                index: 3,
                reason: format!("expected an integer member, got {}", other.kind_name()),
            }),
        }
    }
}

type Handler = fn(&mut Call<'_>) -> Result<Outcome, DispatchError>;

pub struct Syscall {
    pub name: &'static str,
    pub arity: Arity,
    handler: Handler,
}

/// Every call a script may make.
pub static SYSCALLS: &[Syscall] = &[
    Syscall {
        name: "socket",
        arity: Arity::Exactly(3),
        handler: socket,
    },
    Syscall {
        name: "bind",
        arity: Arity::Exactly(3),
        handler: bind,
    },
    Syscall {
        name: "listen",
        arity: Arity::Exactly(2),
        handler: listen,
    },
    Syscall {
        name: "accept",
        arity: Arity::Exactly(3),
        handler: accept,
    },
    Syscall {
        name: "connect",
        arity: Arity::Exactly(3),
        handler: connect,
    },
    Syscall {
        name: "write",
        arity: Arity::AtMost(4),
        handler: write,
    },
    Syscall {
        name: "send",
        arity: Arity::AtMost(4),
        handler: write,
    },
    Syscall {
        name: "read",
        arity: Arity::AtMost(4),
        handler: read,
    },
    Syscall {
        name: "sendto",
        arity: Arity::Exactly(6),
        handler: sendto,
    },
    Syscall {
        name: "recvfrom",
        arity: Arity::Exactly(6),
        handler: recvfrom,
    },
    Syscall {
        name: "close",
        arity: Arity::Exactly(1),
        handler: close,
    },
    Syscall {
        name: "shutdown",
        arity: Arity::Exactly(2),
        handler: shutdown,
    },
    Syscall {
        name: "setsockopt",
        arity: Arity::Exactly(5),
        handler: setsockopt,
    },
    Syscall {
        name: "getsockopt",
        arity: Arity::Exactly(5),
        handler: getsockopt,
    },
    Syscall {
        name: "sctp_sendmsg",
        arity: Arity::Exactly(10),
        handler: sctp_sendmsg,
    },
    Syscall {
        name: "sctp_send",
        arity: Arity::Exactly(5),
        handler: sctp_send,
    },
];

pub fn lookup(name: &str) -> Option<&'static Syscall> {
    SYSCALLS.iter().find(|syscall| syscall.name == name)
}

/// Evaluates the arguments of `spec` and runs its handler.
pub fn dispatch(
    spec: &SyscallSpec,
    symbols: &SymbolTable,
    config: &Config,
    time: &TimeSpec,
    state: &mut SocketState,
    stack: &mut dyn StackUnderTest,
) -> Result<Outcome, DispatchError> {
    let syscall =
        lookup(&spec.name).ok_or_else(|| DispatchError::UnknownSyscall(spec.name.clone()))?;
    if !syscall.arity.admits(spec.arguments.len()) {
        Err(DispatchError::WrongArgumentCount {
            name: syscall.name,
            expected: syscall.arity,
            actual: spec.arguments.len(),
        })?
    }
    let args = evaluate_all(&spec.arguments, symbols)?;
    let result = evaluate(&spec.result, symbols)?;
    let mut call = Call {
        name: syscall.name,
        args: &args,
        result: &result,
        symbols,
        config,
        time,
        state,
        stack,
    };
    (syscall.handler)(&mut call)
}

fn socket(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.ellipsis(0)?;
    let kind = call.int(1)?;
    let number = call.int(2)?;
    let symbol = |name| call.symbols.lookup(name);
    let protocol = match TransportProtocol::from_number(number) {
        Some(protocol) => protocol,
        // IPPROTO_IP picks the protocol from the socket type
        None if number == 0 && Some(kind) == symbol("SOCK_STREAM") => TransportProtocol::Tcp,
        None if number == 0 && Some(kind) == symbol("SOCK_DGRAM") => TransportProtocol::Udp,
        None if number == 0 && Some(kind) == symbol("SOCK_SEQPACKET") => TransportProtocol::Sctp,
        None => Err(DispatchError::UnsupportedProtocol(number))?,
    };
    call.state.protocol = Some(protocol);
    call.stack.open(protocol);
    Ok(Outcome::Done)
}

fn bind(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.ellipsis(1)?;
    call.ellipsis(2)?;
    call.protocol()?;
    call.stack.bind(call.config.local);
    Ok(Outcome::Done)
}

fn listen(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    let backlog = call.int(1)?;
    call.require(&[TransportProtocol::Tcp, TransportProtocol::Sctp])?;
    call.stack.listen(backlog.clamp(0, u32::MAX as i64) as u32);
    call.state.listen_set = true;
    Ok(Outcome::Done)
}

fn accept(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    if !call.state.listen_set {
        Err(DispatchError::NotListening)?
    }
    if call.state.established_pending {
        call.state.established_pending = false;
        call.stack.accept();
        Ok(Outcome::Done)
    } else {
        call.state.accept_set = true;
        Ok(Outcome::Blocked(Wait::Accept))
    }
}

fn connect(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.ellipsis(1)?;
    call.protocol()?;
    call.stack.connect(call.config.remote);
    Ok(Outcome::Done)
}

fn write(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.require(&[TransportProtocol::Tcp, TransportProtocol::Sctp])?;
    let len = call.result_count()?;
    let data = call.state.next_payload(len);
    call.stack.send(SendRequest {
        data,
        ..Default::default()
    });
    Ok(Outcome::Done)
}

fn read(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.require(&[TransportProtocol::Tcp, TransportProtocol::Sctp])?;
    if call.returns_error() {
        return Ok(Outcome::Done);
    }
    let len = call.result_count()?;
    if let Some((delivered, _)) = call.state.delivered.pop_front() {
        check_delivered_size(len, delivered)?;
        return Ok(Outcome::Done);
    }
    if call.state.msg_arrived {
        call.state.msg_arrived = false;
        call.stack.recv_request();
    } else {
        call.state.recv_from_set = true;
    }
    Ok(Outcome::Blocked(Wait::Read { len }))
}

pub(crate) fn check_delivered_size(expected: usize, actual: usize) -> Result<(), DispatchError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DispatchError::WrongDeliveredSize { expected, actual })
    }
}

pub(crate) fn check_payload_length(expected: usize, actual: usize) -> Result<(), DispatchError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DispatchError::WrongPayloadLength { expected, actual })
    }
}

fn sendto(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.require(&[TransportProtocol::Udp])?;
    let len = call.result_count()?;
    let data = call.state.next_payload(len);
    call.stack.send_to(call.config.remote, data);
    Ok(Outcome::Done)
}

fn recvfrom(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.require(&[TransportProtocol::Udp])?;
    let len = call.result_count()?;
    match call.state.delivered.pop_front() {
        Some((delivered, arrived)) => {
            check_payload_length(len, delivered)?;
            let tolerance = call.config.tolerance_usecs;
            verify_time(call.time, arrived, tolerance, "inbound packet")?;
            Ok(Outcome::Done)
        }
        None => Ok(Outcome::Blocked(Wait::RecvFrom { len })),
    }
}

fn close(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.protocol()?;
    call.stack.close();
    Ok(Outcome::Done)
}

fn shutdown(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.require(&[TransportProtocol::Sctp])?;
    call.stack.shutdown();
    Ok(Outcome::Done)
}

fn setsockopt(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    let level = call.int(1)?;
    let name = call.int(2)?;
    if call.returns_error() {
        return Ok(Outcome::Done);
    }
    if Some(level) != call.symbols.lookup("IPPROTO_SCTP") {
        Err(DispatchError::UnsupportedOption(level))?
    }
    let Some(option) = socket_option(call, name)? else {
        return Ok(Outcome::Done);
    };
    call.stack.set_option(option);
    Ok(Outcome::Done)
}

fn narrow<T: TryFrom<i64>>(call: &Call<'_>, value: Option<i64>) -> Result<Option<T>, DispatchError> {
    value
        .map(|value| {
            T::try_from(value).map_err(|_| DispatchError::BadArgument {
                name: call.name,
                index: 3,
                reason: format!("{value} is out of range"),
            })
        })
        .transpose()
}

/// Reads the option value argument of `setsockopt`. Plain integers are
/// accepted and ignored.
fn socket_option(call: &Call<'_>, name: i64) -> Result<Option<SocketOption>, DispatchError> {
    let value = call.arg(3)?;
    let named = |symbol| call.symbols.lookup(symbol) == Some(name);
    Ok(Some(match value {
        Expression::SctpInitmsg(init) => SocketOption::InitMsg {
            outbound_streams: narrow(call, call.member(&init.sinit_num_ostreams)?)?,
            inbound_streams: narrow(call, call.member(&init.sinit_max_instreams)?)?,
            max_attempts: narrow(call, call.member(&init.sinit_max_attempts)?)?,
            max_init_timeout: narrow(call, call.member(&init.sinit_max_init_timeo)?)?,
        },
        Expression::SctpRtoInfo(rto) => SocketOption::RtoInfo {
            initial: narrow(call, call.member(&rto.srto_initial)?)?,
            max: narrow(call, call.member(&rto.srto_max)?)?,
            min: narrow(call, call.member(&rto.srto_min)?)?,
        },
        Expression::SctpSackInfo(sack) => SocketOption::SackInfo {
            delay: narrow(call, call.member(&sack.sack_delay)?)?,
            frequency: narrow(call, call.member(&sack.sack_freq)?)?,
        },
        Expression::SctpPeerAddrParams(params) => {
            let flags = call.member(&params.spp_flags)?.unwrap_or(0);
            let has = |symbol| {
                call.symbols
                    .lookup(symbol)
                    .map_or(false, |bit| flags & bit != 0)
            };
            let heartbeat = if has("SPP_HB_DISABLE") {
                Some(false)
            } else if has("SPP_HB_ENABLE") {
                Some(true)
            } else {
                None
            };
            let positive = |value: Option<i64>| value.filter(|value| *value > 0);
            SocketOption::PeerAddrParams {
                heartbeat,
                heartbeat_interval: narrow(call, positive(call.member(&params.spp_hbinterval)?))?,
                path_max_retransmissions: narrow(
                    call,
                    positive(call.member(&params.spp_pathmaxrxt)?),
                )?,
            }
        }
        Expression::SctpAssocParams(params) => SocketOption::AssocParams {
            max_retransmissions: narrow(call, call.member(&params.sasoc_asocmaxrxt)?)?,
        },
        Expression::SctpAssocVal(assoc) => {
            let value = narrow(call, call.member(&assoc.assoc_value)?)?.unwrap_or(0);
            if named("SCTP_MAX_BURST") {
                SocketOption::MaxBurst(value)
            } else if named("SCTP_MAXSEG") {
                SocketOption::MaxSegment(value)
            } else if named("SCTP_ENABLE_STREAM_RESET") {
                SocketOption::EnableStreamReset(value)
            } else {
                Err(DispatchError::UnsupportedOption(name))?
            }
        }
        Expression::SctpResetStreams(reset) => {
            let flags = call.member(&reset.srs_flags)?.unwrap_or(0);
            let flag = |symbol| call.symbols.lookup(symbol).unwrap_or(0);
            let (incoming_bit, outgoing_bit) = (
                flag("SCTP_STREAM_RESET_INCOMING"),
                flag("SCTP_STREAM_RESET_OUTGOING"),
            );
            let streams = match &reset.srs_stream_list {
                Expression::List(items) => items
                    .iter()
                    .map(|item| narrow(call, call.member(item)?).map(Option::unwrap_or_default))
                    .collect::<Result<Vec<u16>, _>>()?,
                _ => vec![],
            };
            SocketOption::ResetStreams {
                incoming: flags & incoming_bit != 0,
                outgoing: flags & outgoing_bit != 0,
                streams,
            }
        }
        Expression::SctpAddStreams(add) => SocketOption::AddStreams {
            inbound: narrow(call, call.member(&add.sas_instrms)?)?.unwrap_or(0),
            outbound: narrow(call, call.member(&add.sas_outstrms)?)?.unwrap_or(0),
        },
        Expression::List(items) if items.len() == 1 => {
            let value = items[0]
                .integer()
                .ok_or_else(|| DispatchError::BadArgument {
                    name: call.name,
                    index: 3,
                    reason: format!("expected an integer, got {}", items[0].kind_name()),
                })?;
            if named("SCTP_NODELAY") {
                SocketOption::NoDelay(value != 0)
            } else if named("SCTP_RESET_ASSOC") {
                SocketOption::ResetAssoc
            } else {
                Err(DispatchError::UnsupportedOption(name))?
            }
        }
        Expression::Integer(_) => return Ok(None),
        _ => Err(DispatchError::UnsupportedOption(name))?,
    }))
}

fn getsockopt(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.int(1)?;
    call.int(2)?;
    if call.returns_error() {
        return Ok(Outcome::Done);
    }
    if let Expression::SctpStatus(status) = call.arg(3)? {
        let (inbound, outbound) = call.stack.stream_counts();
        if let Some(expected) = call.member(&status.sstat_instrms)? {
            if expected != inbound as i64 {
                Err(DispatchError::WrongStatus {
                    member: "sstat_instrms",
                    expected,
                    actual: inbound as i64,
                })?
            }
        }
        if let Some(expected) = call.member(&status.sstat_outstrms)? {
            if expected != outbound as i64 {
                Err(DispatchError::WrongStatus {
                    member: "sstat_outstrms",
                    expected,
                    actual: outbound as i64,
                })?
            }
        }
    }
    Ok(Outcome::Done)
}

fn sctp_sendmsg(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.require(&[TransportProtocol::Sctp])?;
    let member = |index| -> Result<Option<i64>, DispatchError> {
        let arg = call.arg(index)?;
        if arg.is_ellipsis() {
            Ok(None)
        } else {
            call.int(index).map(Some)
        }
    };
    let ppid = member(5)?.unwrap_or(0);
    let flags = member(6)?.unwrap_or(0);
    let stream = member(7)?.unwrap_or(0);
    let unordered = call
        .symbols
        .lookup("SCTP_UNORDERED")
        .map_or(false, |bit| flags & bit != 0);
    let len = call.result_count()?;
    let request = SendRequest {
        data: call.state.next_payload(len),
        stream: narrow(call, Some(stream))?.unwrap_or(0),
        ppid: narrow(call, Some(ppid))?.unwrap_or(0),
        unordered,
    };
    call.stack.send(request);
    Ok(Outcome::Done)
}

fn sctp_send(call: &mut Call<'_>) -> Result<Outcome, DispatchError> {
    call.int(0)?;
    call.require(&[TransportProtocol::Sctp])?;
    if call.returns_error() {
        return Ok(Outcome::Done);
    }
    let len = call.result_count()?;
    let mut request = SendRequest::default();
    if let Expression::SctpSndRcvInfo(info) = call.arg(3)? {
        request.stream = narrow(call, call.member(&info.sinfo_stream)?)?.unwrap_or(0);
        request.ppid = narrow(call, call.member(&info.sinfo_ppid)?)?.unwrap_or(0);
        let flags = call.member(&info.sinfo_flags)?.unwrap_or(0);
        request.unordered = call
            .symbols
            .lookup("SCTP_UNORDERED")
            .map_or(false, |bit| flags & bit != 0);
    }
    request.data = call.state.next_payload(len);
    call.stack.send(request);
    Ok(Outcome::Done)
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error("{name} takes {expected} arguments, got {actual}")]
    WrongArgumentCount {
        name: &'static str,
        expected: Arity,
        actual: usize,
    },
    #[error("{name}: argument {index}: {reason}")]
    BadArgument {
        name: &'static str,
        index: usize,
        reason: String,
    },
    #[error("{name}: unusable result {result}")]
    BadResult { name: &'static str, result: String },
    #[error("{0}")]
    Eval(#[from] EvalError),
    #[error("{0}: no socket was opened")]
    NoSocket(&'static str),
    #[error("accept on a socket that is not listening")]
    NotListening,
    #[error("unsupported socket option {0}")]
    UnsupportedOption(i64),
    #[error("{name}: Protocol not supported: {protocol}")]
    ProtocolNotSupported {
        name: &'static str,
        protocol: TransportProtocol,
    },
    #[error("Protocol not supported: {0}")]
    UnsupportedProtocol(i64),
    #[error("Wrong payload length: expected {expected}, got {actual}")]
    WrongPayloadLength { expected: usize, actual: usize },
    #[error("Delivered message has wrong size: expected {expected}, got {actual}")]
    WrongDeliveredSize { expected: usize, actual: usize },
    #[error("{0}")]
    Timing(#[from] TimingError),
    #[error("{member} is {actual}, expected {expected}")]
    WrongStatus {
        member: &'static str,
        expected: i64,
        actual: i64,
    },
}

impl DispatchError {
    /// Whether the error ends the run. Other dispatch errors are logged and
    /// the script moves on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolNotSupported { .. }
                | Self::UnsupportedProtocol(_)
                | Self::WrongPayloadLength { .. }
                | Self::WrongDeliveredSize { .. }
                | Self::WrongStatus { .. }
                | Self::Timing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expression::SctpInitmsg, script::TimeKind, sim::RecordingStack, sim::StackCall};

    fn word(name: &str) -> Expression {
        Expression::Word(name.to_string())
    }

    fn int(value: i64) -> Expression {
        Expression::Integer(value)
    }

    struct Fixture {
        symbols: SymbolTable,
        config: Config,
        time: TimeSpec,
        state: SocketState,
        stack: RecordingStack,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                symbols: SymbolTable::linux(),
                config: Config::default(),
                time: TimeSpec::any(),
                state: SocketState::default(),
                stack: RecordingStack::default(),
            }
        }

        fn run(
            &mut self,
            name: &str,
            args: Vec<Expression>,
            result: Expression,
        ) -> Result<Outcome, DispatchError> {
            let spec = SyscallSpec::new(name, args, result);
            dispatch(
                &spec,
                &self.symbols,
                &self.config,
                &self.time,
                &mut self.state,
                &mut self.stack,
            )
        }

        fn sctp_socket(&mut self) {
            self.run(
                "socket",
                vec![Expression::Ellipsis, word("SOCK_STREAM"), word("IPPROTO_SCTP")],
                int(3),
            )
            .unwrap();
        }
    }

    #[test]
    fn socket_picks_the_protocol() {
        let mut fixture = Fixture::new();
        fixture.sctp_socket();
        assert_eq!(fixture.state.protocol, Some(TransportProtocol::Sctp));
        assert_eq!(
            fixture.stack.calls,
            vec![StackCall::Open(TransportProtocol::Sctp)]
        );

        let mut fixture = Fixture::new();
        fixture
            .run(
                "socket",
                vec![Expression::Ellipsis, word("SOCK_DGRAM"), word("IPPROTO_IP")],
                int(3),
            )
            .unwrap();
        assert_eq!(fixture.state.protocol, Some(TransportProtocol::Udp));
    }

    #[test]
    fn socket_rejects_unknown_protocols() {
        let mut fixture = Fixture::new();
        let error = fixture
            .run(
                "socket",
                vec![Expression::Ellipsis, word("SOCK_STREAM"), int(99)],
                int(3),
            )
            .unwrap_err();
        assert_eq!(error, DispatchError::UnsupportedProtocol(99));
        assert!(error.is_fatal());
    }

    #[test]
    fn argument_counts_are_checked_first() {
        let mut fixture = Fixture::new();
        let error = fixture.run("close", vec![int(3), int(4)], int(0)).unwrap_err();
        assert_eq!(
            error,
            DispatchError::WrongArgumentCount {
                name: "close",
                expected: Arity::Exactly(1),
                actual: 2,
            }
        );
        assert!(!error.is_fatal());
        assert!(fixture.stack.calls.is_empty());

        let error = fixture.run("frobnicate", vec![], int(0)).unwrap_err();
        assert_eq!(error, DispatchError::UnknownSyscall("frobnicate".to_string()));
    }

    #[test]
    fn write_sends_the_result_count() {
        let mut fixture = Fixture::new();
        fixture.sctp_socket();
        let outcome = fixture
            .run("write", vec![int(3), Expression::Ellipsis, int(1000)], int(300))
            .unwrap();
        assert_eq!(outcome, Outcome::Done);
        fixture
            .run("write", vec![int(3), Expression::Ellipsis, int(10)], int(10))
            .unwrap();
        let sent: Vec<_> = fixture
            .stack
            .calls
            .iter()
            .filter_map(|call| match call {
                StackCall::Send(request) => Some(request.data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].len(), 300);
        assert_eq!(sent[0][255], 255);
        assert_eq!(sent[0][256], 0);
        // The pattern continues where the previous write stopped
        assert_eq!(sent[1][0], (300 & 0xff) as u8);
    }

    #[test]
    fn write_on_udp_is_fatal() {
        let mut fixture = Fixture::new();
        fixture
            .run(
                "socket",
                vec![Expression::Ellipsis, word("SOCK_DGRAM"), word("IPPROTO_UDP")],
                int(3),
            )
            .unwrap();
        let error = fixture
            .run("write", vec![int(3), Expression::Ellipsis, int(10)], int(10))
            .unwrap_err();
        assert!(matches!(error, DispatchError::ProtocolNotSupported { .. }));
        assert!(error.is_fatal());
    }

    #[test]
    fn accept_waits_for_a_connection() {
        let mut fixture = Fixture::new();
        fixture.sctp_socket();
        let accept = |fixture: &mut Fixture| {
            fixture.run(
                "accept",
                vec![int(3), Expression::Ellipsis, Expression::Ellipsis],
                int(4),
            )
        };
        assert_eq!(accept(&mut fixture), Err(DispatchError::NotListening));
        fixture.run("listen", vec![int(3), int(1)], int(0)).unwrap();
        assert_eq!(accept(&mut fixture), Ok(Outcome::Blocked(Wait::Accept)));
        assert!(fixture.state.accept_set);

        fixture.state.accept_set = false;
        fixture.state.established_pending = true;
        assert_eq!(accept(&mut fixture), Ok(Outcome::Done));
        assert_eq!(fixture.stack.calls.last(), Some(&StackCall::Accept));
    }

    #[test]
    fn queued_datagram_is_held_to_the_call_time() {
        let mut fixture = Fixture::new();
        fixture
            .run(
                "socket",
                vec![Expression::Ellipsis, word("SOCK_DGRAM"), word("IPPROTO_UDP")],
                int(3),
            )
            .unwrap();
        let recvfrom = |fixture: &mut Fixture| {
            let args = vec![
                int(3),
                Expression::Ellipsis,
                int(100),
                int(0),
                Expression::Ellipsis,
                Expression::Ellipsis,
            ];
            fixture.run("recvfrom", args, int(100))
        };
        fixture.time = TimeSpec::new(TimeKind::Absolute, 1_000_000);

        fixture.state.delivered.push_back((100, 0));
        let error = recvfrom(&mut fixture).unwrap_err();
        assert!(matches!(error, DispatchError::Timing(ref t) if t.actual == 0));
        assert!(error.is_fatal());

        fixture.state.delivered.push_back((100, 1_002_000));
        assert_eq!(recvfrom(&mut fixture), Ok(Outcome::Done));
    }

    #[test]
    fn read_requests_announced_data() {
        let mut fixture = Fixture::new();
        fixture.sctp_socket();
        let read = |fixture: &mut Fixture| {
            fixture.run("read", vec![int(3), Expression::Ellipsis, int(1000)], int(100))
        };
        assert_eq!(read(&mut fixture), Ok(Outcome::Blocked(Wait::Read { len: 100 })));
        assert!(fixture.state.recv_from_set);

        fixture.state.recv_from_set = false;
        fixture.state.msg_arrived = true;
        assert_eq!(read(&mut fixture), Ok(Outcome::Blocked(Wait::Read { len: 100 })));
        assert_eq!(fixture.stack.calls.last(), Some(&StackCall::RecvRequest));

        fixture.state.delivered.push_back((99, 0));
        assert_eq!(
            read(&mut fixture),
            Err(DispatchError::WrongDeliveredSize {
                expected: 100,
                actual: 99
            })
        );
    }

    #[test]
    fn setsockopt_maps_structures() {
        let mut fixture = Fixture::new();
        fixture.sctp_socket();
        let initmsg = SctpInitmsg {
            sinit_num_ostreams: int(10),
            sinit_max_instreams: word("SCTP_CLOSED"),
            ..Default::default()
        };
        fixture
            .run(
                "setsockopt",
                vec![
                    int(3),
                    word("IPPROTO_SCTP"),
                    word("SCTP_INITMSG"),
                    Expression::SctpInitmsg(Box::new(initmsg)),
                    int(8),
                ],
                int(0),
            )
            .unwrap();
        fixture
            .run(
                "setsockopt",
                vec![
                    int(3),
                    word("IPPROTO_SCTP"),
                    word("SCTP_NODELAY"),
                    Expression::List(vec![int(1)]),
                    int(4),
                ],
                int(0),
            )
            .unwrap();
        assert_eq!(
            fixture.stack.options(),
            vec![
                SocketOption::InitMsg {
                    outbound_streams: Some(10),
                    inbound_streams: Some(1),
                    max_attempts: None,
                    max_init_timeout: None,
                },
                SocketOption::NoDelay(true),
            ]
        );
    }

    #[test]
    fn setsockopt_list_needs_an_integer() {
        let mut fixture = Fixture::new();
        fixture.sctp_socket();
        let error = fixture
            .run(
                "setsockopt",
                vec![
                    int(3),
                    word("IPPROTO_SCTP"),
                    word("SCTP_NODELAY"),
                    Expression::List(vec![Expression::Ellipsis]),
                    int(4),
                ],
                int(0),
            )
            .unwrap_err();
        assert!(matches!(
            error,
            DispatchError::BadArgument { name: "setsockopt", index: 3, .. }
        ));
        assert!(fixture.stack.options().is_empty());
    }

    #[test]
    fn getsockopt_checks_stream_counts() {
        let mut fixture = Fixture::new();
        fixture.sctp_socket();
        fixture.stack.streams = (5, 10);
        let status = |instrms, outstrms| {
            Expression::SctpStatus(Box::new(crate::expression::SctpStatus {
                sstat_instrms: instrms,
                sstat_outstrms: outstrms,
                ..Default::default()
            }))
        };
        let run = |fixture: &mut Fixture, value| {
            fixture.run(
                "getsockopt",
                vec![int(3), word("IPPROTO_SCTP"), word("SCTP_STATUS"), value, Expression::Ellipsis],
                int(0),
            )
        };
        assert_eq!(run(&mut fixture, status(int(5), int(10))), Ok(Outcome::Done));
        assert_eq!(
            run(&mut fixture, status(Expression::Ellipsis, int(10))),
            Ok(Outcome::Done)
        );
        assert!(matches!(
            run(&mut fixture, status(int(6), Expression::Ellipsis)),
            Err(DispatchError::WrongStatus {
                member: "sstat_instrms",
                ..
            })
        ));
    }

    #[test]
    fn sctp_sendmsg_reads_stream_and_flags() {
        let mut fixture = Fixture::new();
        fixture.sctp_socket();
        fixture
            .run(
                "sctp_sendmsg",
                vec![
                    int(3),
                    Expression::Ellipsis,
                    int(1000),
                    Expression::Ellipsis,
                    Expression::Ellipsis,
                    int(7),
                    word("SCTP_UNORDERED"),
                    int(2),
                    int(0),
                    int(0),
                ],
                int(1000),
            )
            .unwrap();
        let Some(StackCall::Send(request)) = fixture.stack.calls.last() else {
            panic!("nothing sent");
        };
        assert_eq!(request.data.len(), 1000);
        assert_eq!(request.ppid, 7);
        assert_eq!(request.stream, 2);
        assert!(request.unordered);
    }
}
