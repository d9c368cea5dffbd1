//! SCTP packets, chunks, and parameters as exchanged with the stack under
//! test.

mod sctp_parsing;
pub use sctp_parsing::{ParseError, SctpPacket, COMMON_HEADER_OCTETS};

pub mod chunks;
pub use chunks::{
    chunk_name, chunk_type_by_name, data_flags, CookieEchoChunk, DataChunk, ErrorChunk,
    HeartbeatChunk, InitChunk, ReconfigChunk, SackChunk, SctpChunk, ShutdownChunk,
    DATA_CHUNK_HEADER_OCTETS, FLAG_T_BIT,
};

pub mod parameters;
pub use parameters::{ErrorCause, ReconfigParameter, SctpParameter, RECONFIG_RESULT_PERFORMED};
