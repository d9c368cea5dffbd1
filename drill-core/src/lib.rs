//! A scripted conformance engine for TCP, UDP and SCTP implementations.
//!
//! A test script describes a timed sequence of socket calls and of packets
//! flowing in and out of the implementation under test. The engine injects
//! the inbound packets, makes the calls, and checks that the packets the
//! implementation sends match the script, both in content and in timing.
//!
//! # Organization
//! - [`script`] and [`expression`] hold a parsed script
//! - [`builders`] turn packet events into datagrams, [`comparator`] checks
//!   live datagrams against expected ones, and [`timing`] checks when
//!   things happened
//! - [`syscalls`] maps socket calls onto a [`StackUnderTest`]
//! - [`Runner`] walks the events, driven by a [`SimHost`]
//! - [`sim`] has a manual host and a recording stack for driving runs by hand
//!
//! # Learned state
//!
//! Scripts number everything from zero: sequence numbers, TSNs, tags. The
//! implementation under test picks its own. Comparing a live packet teaches
//! the [`RunContext`] what was picked, and later injected packets are
//! rewritten into the implementation's number space.

pub mod logging;
pub mod protocols;

pub mod field;
pub use field::Field;

pub mod config;
pub use config::Config;

pub mod symbols;
pub use symbols::SymbolTable;

pub mod expression;
pub use expression::Expression;

pub mod script;
pub use script::{Event, Micros, Script};

pub mod datagram;
pub use datagram::{Datagram, TransportProtocol};

pub mod context;
pub use context::RunContext;

pub mod builders;
pub mod comparator;
pub mod timing;

pub mod syscalls;
pub use syscalls::{SocketNotification, StackUnderTest};

pub mod runner;
pub use runner::{Arrival, RunError, RunState, Runner, SimHost};

pub mod sim;
