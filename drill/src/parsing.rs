//! Parsing of test scripts.
//!
//! A script is an optional block of `--name=value` options followed by one
//! event per line: a time, then a packet, a syscall, or a backquoted
//! command. `//` starts a comment.
//!
//! ```text
//! --tolerance_usecs=10000
//! 0   socket(..., SOCK_STREAM, IPPROTO_TCP) = 3
//! +0  bind(3, ..., ...) = 0
//! +0  listen(3, 1) = 0
//! +0  < S 0:0(0) win 32792 <mss 1000,sackOK,nop,nop,nop,wscale 7>
//! +0  > S. 0:0(0) ack 1 <...>
//! ```
//!
//! Errors name the line they were found on. Semantic checks, such as a
//! field value out of range, stop the parse with their own message rather
//! than a syntax error.

mod core_parser;
mod packet_parser;
mod parser;
mod parsing_data;
mod sctp_parser;
mod syscall_parser;

pub use parser::{event_time, parse_script, parse_script_with};
pub use parsing_data::{ParseContext, ParseError, ParseErrorKind};
