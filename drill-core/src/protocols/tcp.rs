//! TCP segment headers and options.

mod tcp_parsing;
pub use tcp_parsing::{BuildHeaderError, Control, ParseError, TcpHeader, TcpHeaderBuilder};

mod tcp_options;
pub use tcp_options::{parse_options, serialize_options, TcpOption};
