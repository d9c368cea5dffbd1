//! Walks a script's events against a stack under test.
//!
//! The runner owns no clock. The host tells it when the timer it asked for
//! fires and when something arrives, either a packet from the stack's
//! network side or a notification from its socket side. Each entry point
//! does its work synchronously and returns.
//!
//! Events run strictly in script order. The next event is only scheduled
//! once the current one has completed and no timer is pending. Expected
//! packets complete when a matching live packet shows up, and blocking
//! syscalls complete when the stack reports back.

use crate::{
    builders::{build_packet, build_teardown_abort, BuildError},
    comparator::{compare, Mismatch},
    config::{Config, ConfigError},
    context::RunContext,
    datagram::{Datagram, DecodeError, TransportProtocol},
    field::Field,
    logging,
    script::{
        Direction, Event, EventKind, Micros, PacketEvent, PacketSpec, Script, SyscallSpec,
        TimeKind, TimeSpec,
    },
    symbols::SymbolTable,
    syscalls::{
        check_delivered_size, check_payload_length, dispatch, DispatchError, Outcome,
        SocketNotification, SocketState, StackUnderTest, Wait,
    },
    timing::{adjust_time, verify_time, TimingError},
};
use std::collections::VecDeque;
use thiserror::Error as ThisError;

/// The simulation the runner lives in.
pub trait SimHost {
    /// Current simulated time
    fn now(&self) -> Micros;
    /// Arms the run's single timer. It replaces any earlier request.
    fn schedule_at(&mut self, at: Micros);
    /// Hands a serialized IPv4 datagram to the stack under test.
    fn send_inbound_packet(&mut self, bytes: Vec<u8>);
}

/// Something the host delivers to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// A datagram the stack sent onto the network
    Network(Vec<u8>),
    /// A report from the stack's socket side
    Stack(SocketNotification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Finished,
}

/// An outbound packet waiting for its live counterpart.
#[derive(Debug, Clone)]
struct Expected {
    line: usize,
    datagram: Datagram,
    ack: Field<u32>,
    time: TimeSpec,
}

/// A syscall waiting for the stack.
#[derive(Debug, Clone, Copy)]
struct Waiting {
    line: usize,
    wait: Wait,
    /// When the call is allowed to return
    completion: TimeSpec,
}

pub struct Runner<H, S> {
    host: H,
    stack: S,
    events: Vec<Event>,
    symbols: SymbolTable,
    context: RunContext,
    socket: SocketState,
    state: RunState,
    start: Micros,
    /// Scheduled time of the last event scheduled
    previous: Micros,
    /// Index of the next event to schedule
    next: usize,
    /// The event the pending timer belongs to
    current: Option<usize>,
    timer_pending: bool,
    expected: VecDeque<Expected>,
    /// Live packets that arrived before their event, with arrival times
    live: VecDeque<(Datagram, Micros)>,
    waiting: Option<Waiting>,
    failure: Option<RunError>,
}

impl<H: SimHost, S: StackUnderTest> Runner<H, S> {
    /// Prepares a run of `script`. The script's option block is applied on
    /// top of `config`.
    pub fn new(script: Script, config: Config, host: H, stack: S) -> Result<Self, RunError> {
        let config = config.with_options(&script.options)?;
        Ok(Self {
            host,
            stack,
            events: script.events,
            symbols: SymbolTable::linux(),
            context: RunContext::new(config),
            socket: SocketState::default(),
            state: RunState::Idle,
            start: 0,
            previous: 0,
            next: 0,
            current: None,
            timer_pending: false,
            expected: VecDeque::new(),
            live: VecDeque::new(),
            waiting: None,
            failure: None,
        })
    }

    /// Starts the clock and schedules the first event.
    pub fn start(&mut self) -> Result<(), RunError> {
        if self.state != RunState::Idle {
            Err(RunError::NotRunning)?
        }
        self.state = RunState::Running;
        self.tick();
        self.start = self.context.now;
        self.previous = self.start;
        logging::run_event(self.context.now, "run started");
        let result = self.advance();
        self.settle(result)
    }

    /// The timer requested through [`SimHost::schedule_at`] fired.
    pub fn on_timer_fired(&mut self) -> Result<(), RunError> {
        self.ensure_running()?;
        self.tick();
        let result = self.fire_current();
        self.settle(result)
    }

    /// A packet or socket notification arrived from the stack under test.
    pub fn on_packet_or_notification_arrived(&mut self, arrival: Arrival) -> Result<(), RunError> {
        self.ensure_running()?;
        self.tick();
        let result = match arrival {
            Arrival::Network(bytes) => self.on_live_packet(&bytes),
            Arrival::Stack(notification) => self.on_notification(notification),
        };
        let result = result.and_then(|()| self.advance());
        self.settle(result)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The error that ended the run, if one did.
    pub fn failure(&self) -> Option<&RunError> {
        self.failure.as_ref()
    }

    /// Whether the run got through every event without an error.
    pub fn passed(&self) -> bool {
        self.state == RunState::Finished && self.failure.is_none()
    }

    /// The script line the run is currently waiting on, if any.
    pub fn blocked_on(&self) -> Option<usize> {
        self.expected
            .front()
            .map(|expected| expected.line)
            .or(self.waiting.map(|waiting| waiting.line))
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn socket(&self) -> &SocketState {
        &self.socket
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    fn ensure_running(&self) -> Result<(), RunError> {
        match self.state {
            RunState::Running => Ok(()),
            _ => Err(RunError::NotRunning),
        }
    }

    fn tick(&mut self) {
        self.context.now = self.host.now();
    }

    /// Records a fatal error. The run accepts no input afterwards.
    fn settle(&mut self, result: Result<(), RunError>) -> Result<(), RunError> {
        if let Err(error) = &result {
            logging::run_failed_event(self.context.now, error);
            self.state = RunState::Finished;
            self.failure = Some(error.clone());
        }
        result
    }

    fn is_blocked(&self) -> bool {
        !self.expected.is_empty() || self.waiting.is_some()
    }

    /// Schedules the next event or, after the last one, ends the run.
    fn advance(&mut self) -> Result<(), RunError> {
        if self.state != RunState::Running || self.timer_pending || self.is_blocked() {
            return Ok(());
        }
        if self.next < self.events.len() {
            self.schedule_next();
            Ok(())
        } else {
            self.finish()
        }
    }

    fn schedule_next(&mut self) {
        let index = self.next;
        let now = self.context.now;
        let event = &mut self.events[index];
        adjust_time(&mut event.time, self.start, now, self.previous);
        self.previous = event.time.time;
        let at = event.time.time.max(now);
        logging::schedule_event(event, at);
        self.current = Some(index);
        self.next += 1;
        self.timer_pending = true;
        self.host.schedule_at(at);
    }

    fn fire_current(&mut self) -> Result<(), RunError> {
        self.timer_pending = false;
        if let Some(index) = self.current.take() {
            let event = self.events[index].clone();
            match &event.kind {
                EventKind::Packet(packet) => self.fire_packet(&event, packet)?,
                EventKind::Syscall(syscall) => self.fire_syscall(&event, syscall)?,
                EventKind::Command(command) => logging::run_event(
                    self.context.now,
                    &format!("line {}: not running command `{command}`", event.line),
                ),
            }
        }
        self.advance()
    }

    fn fire_packet(&mut self, event: &Event, packet: &PacketEvent) -> Result<(), RunError> {
        let datagram = build_packet(&mut self.context, packet.direction, &packet.spec)?;
        match packet.direction {
            Direction::Inbound => {
                logging::inject_event(self.context.now, &datagram);
                self.host.send_inbound_packet(datagram.serialize());
            }
            Direction::Outbound => {
                let ack = match &packet.spec {
                    PacketSpec::Tcp(tcp) => tcp.ack.clone(),
                    _ => Field::Wildcard,
                };
                let expected = Expected {
                    line: event.line,
                    datagram,
                    ack,
                    time: event.time,
                };
                match self.live.pop_front() {
                    Some((live, arrived)) => self.check(expected, &live, arrived)?,
                    None => {
                        logging::expect_event(self.context.now, &expected.datagram);
                        self.expected.push_back(expected);
                    }
                }
            }
        }
        Ok(())
    }

    /// Matches a live packet against the packet the script expected.
    fn check(&mut self, expected: Expected, live: &Datagram, arrived: Micros) -> Result<(), RunError> {
        verify_time(
            &expected.time,
            arrived,
            self.context.config.tolerance_usecs,
            "outbound packet",
        )?;
        compare(&mut self.context, &expected.datagram, expected.ack, live)?;
        Ok(())
    }

    fn fire_syscall(&mut self, event: &Event, spec: &SyscallSpec) -> Result<(), RunError> {
        let completion = self.completion_time(event, spec);
        let outcome = dispatch(
            spec,
            &self.symbols,
            &self.context.config,
            &completion,
            &mut self.socket,
            &mut self.stack,
        );
        match outcome {
            Ok(outcome) => {
                logging::syscall_event(self.context.now, event, outcome);
                if let Outcome::Blocked(wait) = outcome {
                    self.waiting = Some(Waiting {
                        line: event.line,
                        wait,
                        completion,
                    });
                }
            }
            Err(error) if error.is_fatal() || self.context.config.strict_syscalls => Err(error)?,
            Err(error) => logging::syscall_skipped_event(event, &error),
        }
        Ok(())
    }

    /// A blocking call written `start...end` may return anywhere in
    /// between. Otherwise it has to return at its own time.
    fn completion_time(&self, event: &Event, spec: &SyscallSpec) -> TimeSpec {
        match spec.end_time {
            Some(end) => TimeSpec::range(
                TimeKind::AbsoluteRange,
                event.time.time,
                end + event.time.offset + self.start,
            ),
            None => event.time,
        }
    }

    fn on_live_packet(&mut self, bytes: &[u8]) -> Result<(), RunError> {
        let live = Datagram::from_bytes(bytes)?;
        let now = self.context.now;
        logging::live_event(now, &live);
        match self.expected.pop_front() {
            Some(expected) => self.check(expected, &live, now),
            None => {
                self.live.push_back((live, now));
                Ok(())
            }
        }
    }

    fn on_notification(&mut self, notification: SocketNotification) -> Result<(), RunError> {
        let now = self.context.now;
        let tolerance = self.context.config.tolerance_usecs;
        match notification {
            SocketNotification::DataAvailable => {
                if self.socket.recv_from_set {
                    self.socket.recv_from_set = false;
                    self.stack.recv_request();
                } else {
                    self.socket.msg_arrived = true;
                }
            }
            SocketNotification::DataDelivered { len } => match self.waiting {
                Some(Waiting {
                    wait: Wait::Read { len: expected },
                    completion,
                    ..
                }) => {
                    self.waiting = None;
                    verify_time(&completion, now, tolerance, "inbound packet")?;
                    check_delivered_size(expected, len)?;
                }
                Some(Waiting {
                    wait: Wait::RecvFrom { len: expected },
                    completion,
                    ..
                }) => {
                    self.waiting = None;
                    verify_time(&completion, now, tolerance, "inbound packet")?;
                    check_payload_length(expected, len)?;
                }
                _ => self.socket.delivered.push_back((len, now)),
            },
            SocketNotification::Established => {
                if self.socket.accept_set {
                    self.socket.accept_set = false;
                    self.stack.accept();
                    if matches!(self.waiting, Some(Waiting { wait: Wait::Accept, .. })) {
                        self.waiting = None;
                    }
                } else if self.socket.listen_set {
                    self.socket.established_pending = true;
                }
            }
            SocketNotification::OptionsApplied => self.socket.options_applied = true,
            SocketNotification::Closed => logging::run_event(now, "socket closed"),
        }
        Ok(())
    }

    /// Runs once the last event completed with nothing outstanding.
    fn finish(&mut self) -> Result<(), RunError> {
        let now = self.context.now;
        if self.socket.protocol == Some(TransportProtocol::Sctp) {
            let abort = build_teardown_abort(&mut self.context)?;
            logging::inject_event(now, &abort);
            self.host.send_inbound_packet(abort.serialize());
        }
        for (live, _) in self.live.drain(..) {
            logging::unexpected_event(&live);
        }
        self.state = RunState::Finished;
        logging::run_event(now, "run finished");
        Ok(())
    }
}

/// Ends a run.
#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Build(#[from] BuildError),
    #[error("Malformed live packet: {0}")]
    Decode(#[from] DecodeError),
    #[error("{0}")]
    Timing(#[from] TimingError),
    #[error("{0}")]
    Mismatch(#[from] Mismatch),
    #[error("{0}")]
    Dispatch(#[from] DispatchError),
    #[error("The run is not accepting input")]
    NotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builders::build_tcp_packet,
        datagram::Transport,
        expression::Expression,
        protocols::{sctp::FLAG_T_BIT, tcp::Control},
        script::TcpSpec,
        sim::{ManualHost, RecordingStack, StackCall},
    };

    const MS: Micros = 1000;

    fn at(time: Micros, line: usize, kind: EventKind) -> Event {
        Event {
            line,
            number: line - 1,
            time: TimeSpec::new(TimeKind::Absolute, time),
            kind,
        }
    }

    fn syscall(name: &str, args: Vec<Expression>, result: i64) -> EventKind {
        EventKind::Syscall(SyscallSpec::new(name, args, Expression::Integer(result)))
    }

    fn word(name: &str) -> Expression {
        Expression::Word(name.to_string())
    }

    fn tcp_socket() -> EventKind {
        syscall(
            "socket",
            vec![Expression::Ellipsis, word("SOCK_STREAM"), word("IPPROTO_TCP")],
            3,
        )
    }

    fn tcp(direction: Direction, flags: &str, seq: u32, ack: Field<u32>) -> EventKind {
        EventKind::Packet(PacketEvent {
            direction,
            spec: PacketSpec::Tcp(tcp_spec(flags, seq, ack)),
        })
    }

    fn tcp_spec(flags: &str, seq: u32, ack: Field<u32>) -> TcpSpec {
        TcpSpec {
            flags: Control::from_letters(flags),
            start_seq: seq,
            payload_len: 0,
            ack,
            window: Field::Value(65535),
            options: Field::Value(vec![]),
        }
    }

    /// What the stack would send: the scripted segment with its own ISN.
    fn live_segment(flags: &str, seq: u32, ack: u32) -> Vec<u8> {
        let mut context = RunContext::new(Config::default());
        build_tcp_packet(
            &mut context,
            Direction::Outbound,
            &tcp_spec(flags, seq, Field::Value(ack)),
        )
        .unwrap()
        .serialize()
    }

    fn runner(events: Vec<Event>) -> Runner<ManualHost, RecordingStack> {
        let script = Script {
            options: vec![],
            events,
        };
        Runner::new(script, Config::default(), ManualHost::default(), RecordingStack::default())
            .unwrap()
    }

    fn handshake() -> Vec<Event> {
        vec![
            at(0, 1, tcp_socket()),
            at(0, 2, tcp(Direction::Inbound, "S", 0, Field::Wildcard)),
            at(100 * MS, 3, tcp(Direction::Outbound, "S.", 0, Field::Value(1))),
            at(200 * MS, 4, tcp(Direction::Inbound, ".", 1, Field::Value(1))),
        ]
    }

    #[test]
    fn injects_and_matches_a_handshake() {
        let mut runner = runner(handshake());
        runner.start().unwrap();
        runner.run_until(0).unwrap();
        assert_eq!(runner.host().injected.len(), 1);
        assert_eq!(runner.blocked_on(), None);

        runner.run_until(100 * MS).unwrap();
        assert_eq!(runner.blocked_on(), Some(3));
        runner
            .on_packet_or_notification_arrived(Arrival::Network(live_segment("S.", 5000, 1)))
            .unwrap();
        assert_eq!(runner.context().rel_seq_out, 5000);
        assert_eq!(runner.blocked_on(), None);

        runner.run_until(200 * MS).unwrap();
        assert!(runner.passed());
        let last = Datagram::from_bytes(runner.host().injected.last().unwrap()).unwrap();
        let Transport::Tcp(ack) = last.transport else {
            panic!("not a tcp segment");
        };
        assert_eq!(ack.ack, 5001);
    }

    #[test]
    fn late_packets_end_the_run() {
        let mut runner = runner(handshake());
        runner.start().unwrap();
        runner.run_until(250 * MS).unwrap();
        let error = runner
            .on_packet_or_notification_arrived(Arrival::Network(live_segment("S.", 5000, 1)))
            .unwrap_err();
        assert!(matches!(error, RunError::Timing(_)));
        assert_eq!(runner.state(), RunState::Finished);
        assert_eq!(runner.failure(), Some(&error));
        assert_eq!(runner.on_timer_fired(), Err(RunError::NotRunning));
        assert_eq!(runner.failure(), Some(&error));
    }

    #[test]
    fn early_packets_wait_for_their_event() {
        let mut runner = runner(handshake());
        runner.start().unwrap();
        runner.run_until(50 * MS).unwrap();
        runner
            .on_packet_or_notification_arrived(Arrival::Network(live_segment("S.", 7, 1)))
            .unwrap();
        assert_eq!(runner.blocked_on(), None);
        runner.run_until(200 * MS).unwrap();
        assert!(runner.passed());
    }

    #[test]
    fn wrong_flags_are_a_mismatch() {
        let mut runner = runner(handshake());
        runner.start().unwrap();
        runner.run_until(100 * MS).unwrap();
        let error = runner
            .on_packet_or_notification_arrived(Arrival::Network(live_segment("R", 5000, 1)))
            .unwrap_err();
        assert!(matches!(error, RunError::Mismatch(_)));
    }

    #[test]
    fn malformed_syscalls_are_skipped_unless_strict() {
        let events = || {
            vec![
                at(0, 1, tcp_socket()),
                at(0, 2, syscall("frobnicate", vec![], 0)),
                at(0, 3, syscall("close", vec![Expression::Integer(3)], 0)),
            ]
        };
        let mut lenient = runner(events());
        lenient.start().unwrap();
        lenient.run_until(0).unwrap();
        assert!(lenient.passed());
        assert_eq!(lenient.stack().calls.last(), Some(&StackCall::Close));

        let script = Script {
            options: vec![("strict_syscalls".to_string(), "1".to_string())],
            events: events(),
        };
        let mut strict = Runner::new(
            script,
            Config::default(),
            ManualHost::default(),
            RecordingStack::default(),
        )
        .unwrap();
        strict.start().unwrap();
        assert!(matches!(
            strict.run_until(0),
            Err(RunError::Dispatch(DispatchError::UnknownSyscall(_)))
        ));
        assert!(!strict.passed());
    }

    #[test]
    fn reads_block_until_delivery() {
        let read = syscall(
            "read",
            vec![Expression::Integer(3), Expression::Ellipsis, Expression::Integer(1000)],
            100,
        );
        let mut runner = runner(vec![at(0, 1, tcp_socket()), at(10 * MS, 2, read)]);
        runner.start().unwrap();
        runner.run_until(10 * MS).unwrap();
        assert_eq!(runner.blocked_on(), Some(2));

        runner
            .on_packet_or_notification_arrived(Arrival::Stack(SocketNotification::DataAvailable))
            .unwrap();
        assert_eq!(runner.stack().calls.last(), Some(&StackCall::RecvRequest));
        runner
            .on_packet_or_notification_arrived(Arrival::Stack(SocketNotification::DataDelivered {
                len: 100,
            }))
            .unwrap();
        assert!(runner.passed());
    }

    #[test]
    fn wrong_delivery_size_is_fatal() {
        let read = syscall(
            "read",
            vec![Expression::Integer(3), Expression::Ellipsis, Expression::Integer(1000)],
            100,
        );
        let mut runner = runner(vec![at(0, 1, tcp_socket()), at(0, 2, read)]);
        runner.start().unwrap();
        runner.run_until(0).unwrap();
        runner
            .on_packet_or_notification_arrived(Arrival::Stack(SocketNotification::DataAvailable))
            .unwrap();
        let error = runner
            .on_packet_or_notification_arrived(Arrival::Stack(SocketNotification::DataDelivered {
                len: 10,
            }))
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Delivered message has wrong size: expected 100, got 10"
        );
    }

    #[test]
    fn relative_events_never_go_back_in_time() {
        let relative = |line, time, kind| Event {
            line,
            number: line - 1,
            time: TimeSpec::new(TimeKind::Relative, time),
            kind,
        };
        let mut runner = runner(vec![
            relative(1, 0, tcp_socket()),
            Event {
                line: 2,
                number: 1,
                time: TimeSpec::any(),
                kind: tcp(Direction::Outbound, "S", 0, Field::Wildcard),
            },
            relative(3, 10 * MS, syscall("close", vec![Expression::Integer(3)], 0)),
        ]);
        runner.start().unwrap();
        runner.run_until(300 * MS).unwrap();
        assert_eq!(runner.blocked_on(), Some(2));
        runner
            .on_packet_or_notification_arrived(Arrival::Network(live_segment("S", 9, 0)))
            .unwrap();
        // Anchored to the late arrival, not to the scripted time of the SYN
        assert_eq!(runner.host().timer, Some(310 * MS));
        runner.run_until(310 * MS).unwrap();
        assert!(runner.passed());
    }

    #[test]
    fn sctp_runs_end_with_an_abort() {
        let socket = syscall(
            "socket",
            vec![Expression::Ellipsis, word("SOCK_STREAM"), word("IPPROTO_SCTP")],
            3,
        );
        let mut runner = runner(vec![at(0, 1, socket)]);
        runner.start().unwrap();
        runner.run_until(0).unwrap();
        assert!(runner.passed());
        let abort = Datagram::from_bytes(runner.host().injected.last().unwrap()).unwrap();
        let Transport::Sctp(packet) = abort.transport else {
            panic!("not an sctp packet");
        };
        assert_eq!(packet.verification_tag, runner.context().peer_vtag);
        assert_eq!(packet.chunks.len(), 1);
        assert_eq!(packet.chunks[0].name(), "ABORT");
        assert!(matches!(
            &packet.chunks[0],
            crate::protocols::sctp::chunks::SctpChunk::Abort { flags } if *flags == Field::Value(FLAG_T_BIT)
        ));
    }

    #[test]
    fn start_only_once() {
        let mut runner = runner(vec![]);
        runner.start().unwrap();
        assert!(runner.passed());
        assert_eq!(runner.start(), Err(RunError::NotRunning));
    }
}
