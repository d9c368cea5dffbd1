//! Logging holds wrapper functions for logging run events.
//! Each function corresponds to one kind of event (injected packets, syscalls, ...)
//! and always logs to the same target, so runs can be filtered by concern.

use crate::{
    datagram::Datagram,
    script::{Event, Micros},
    syscalls::{DispatchError, Outcome},
};
use tracing::{event, Level};

/// An inbound packet handed to the stack under test.
pub fn inject_event(now: Micros, datagram: &Datagram) {
    event!(target: "PACKET", Level::INFO, now, direction = "inbound", packet = %datagram);
}

/// An outbound packet the script waits for.
pub fn expect_event(now: Micros, datagram: &Datagram) {
    event!(target: "PACKET", Level::DEBUG, now, direction = "expected", packet = %datagram);
}

/// A packet the stack under test sent.
pub fn live_event(now: Micros, datagram: &Datagram) {
    event!(target: "PACKET", Level::INFO, now, direction = "outbound", packet = %datagram);
}

/// A live packet nothing in the script accounted for.
pub fn unexpected_event(datagram: &Datagram) {
    event!(target: "PACKET", Level::WARN, packet = %datagram, "live packet was never expected");
}

pub fn syscall_event(now: Micros, event: &Event, outcome: Outcome) {
    event!(target: "SYSCALL", Level::INFO, now, line = event.line, call = %event.kind, outcome = ?outcome);
}

/// A syscall that failed without ending the run.
pub fn syscall_skipped_event(event: &Event, error: &DispatchError) {
    event!(target: "SYSCALL", Level::WARN, line = event.line, call = %event.kind, %error, "skipping syscall");
}

pub fn schedule_event(event: &Event, at: Micros) {
    event!(target: "TIMING", Level::DEBUG, line = event.line, number = event.number, at);
}

pub fn run_event(now: Micros, message: &str) {
    event!(target: "RUN", Level::INFO, now, message);
}

pub fn run_failed_event(now: Micros, error: &dyn std::error::Error) {
    event!(target: "RUN", Level::ERROR, now, error = %error);
}
