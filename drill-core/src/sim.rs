//! A hand-driven host and a stack that only records what it was asked to do.
//!
//! Together they let a run be stepped through deterministically: tests move
//! the clock with [`Runner::run_until`] and play the stack's part by feeding
//! [`Arrival`](crate::runner::Arrival)s in.

use crate::{
    datagram::TransportProtocol,
    protocols::utility::Endpoint,
    runner::{Runner, RunError, SimHost},
    script::Micros,
    syscalls::{SendRequest, SocketOption, StackUnderTest},
};

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualHost {
    pub now: Micros,
    /// When the runner wants to be woken up
    pub timer: Option<Micros>,
    /// Serialized datagrams handed to the stack, oldest first
    pub injected: Vec<Vec<u8>>,
}

impl SimHost for ManualHost {
    fn now(&self) -> Micros {
        self.now
    }

    fn schedule_at(&mut self, at: Micros) {
        self.timer = Some(at);
    }

    fn send_inbound_packet(&mut self, bytes: Vec<u8>) {
        self.injected.push(bytes);
    }
}

impl<S: StackUnderTest> Runner<ManualHost, S> {
    /// Fires every timer due up to `until`, then leaves the clock there.
    pub fn run_until(&mut self, until: Micros) -> Result<(), RunError> {
        while let Some(at) = self.host().timer.filter(|at| *at <= until) {
            let host = self.host_mut();
            host.timer = None;
            host.now = host.now.max(at);
            self.on_timer_fired()?;
        }
        let host = self.host_mut();
        host.now = host.now.max(until);
        Ok(())
    }
}

/// One call made on a [`RecordingStack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    Open(TransportProtocol),
    Bind(Endpoint),
    Listen(u32),
    Connect(Endpoint),
    Accept,
    Send(SendRequest),
    SendTo(Endpoint, Vec<u8>),
    RecvRequest,
    Close,
    Shutdown,
    SetOption(SocketOption),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingStack {
    pub calls: Vec<StackCall>,
    /// Reported by [`StackUnderTest::stream_counts`]
    pub streams: (u16, u16),
}

impl RecordingStack {
    pub fn options(&self) -> Vec<SocketOption> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                StackCall::SetOption(option) => Some(option.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<&SendRequest> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                StackCall::Send(request) => Some(request),
                _ => None,
            })
            .collect()
    }
}

impl StackUnderTest for RecordingStack {
    fn open(&mut self, protocol: TransportProtocol) {
        self.calls.push(StackCall::Open(protocol));
    }

    fn bind(&mut self, local: Endpoint) {
        self.calls.push(StackCall::Bind(local));
    }

    fn listen(&mut self, backlog: u32) {
        self.calls.push(StackCall::Listen(backlog));
    }

    fn connect(&mut self, remote: Endpoint) {
        self.calls.push(StackCall::Connect(remote));
    }

    fn accept(&mut self) {
        self.calls.push(StackCall::Accept);
    }

    fn send(&mut self, request: SendRequest) {
        self.calls.push(StackCall::Send(request));
    }

    fn send_to(&mut self, remote: Endpoint, data: Vec<u8>) {
        self.calls.push(StackCall::SendTo(remote, data));
    }

    fn recv_request(&mut self) {
        self.calls.push(StackCall::RecvRequest);
    }

    fn close(&mut self) {
        self.calls.push(StackCall::Close);
    }

    fn shutdown(&mut self) {
        self.calls.push(StackCall::Shutdown);
    }

    fn set_option(&mut self, option: SocketOption) {
        self.calls.push(StackCall::SetOption(option));
    }

    fn stream_counts(&self) -> (u16, u16) {
        self.streams
    }
}
