//! Platform constants that scripts may name symbolically.

use rustc_hash::FxHashMap;

/// Linux values for the socket, SCTP and errno constants scripts use.
const LINUX: &[(&str, i64)] = &[
    // Address families, socket types and protocols
    ("AF_INET", 2),
    ("AF_INET6", 10),
    ("PF_INET", 2),
    ("PF_INET6", 10),
    ("SOCK_STREAM", 1),
    ("SOCK_DGRAM", 2),
    ("SOCK_SEQPACKET", 5),
    ("IPPROTO_IP", 0),
    ("IPPROTO_TCP", 6),
    ("IPPROTO_UDP", 17),
    ("IPPROTO_SCTP", 132),
    ("SOL_SOCKET", 1),
    ("SOL_TCP", 6),
    ("SO_REUSEADDR", 2),
    ("SO_SNDBUF", 7),
    ("SO_RCVBUF", 8),
    ("SO_KEEPALIVE", 9),
    ("SO_LINGER", 13),
    ("TCP_NODELAY", 1),
    ("TCP_MAXSEG", 2),
    ("SHUT_RD", 0),
    ("SHUT_WR", 1),
    ("SHUT_RDWR", 2),
    ("O_NONBLOCK", 2048),
    ("O_RDWR", 2),
    ("F_GETFL", 3),
    ("F_SETFL", 4),
    ("MSG_NOSIGNAL", 0x4000),
    ("MSG_PEEK", 2),
    ("MSG_DONTWAIT", 0x40),
    ("MSG_EOR", 0x80),
    // SCTP socket options
    ("SCTP_RTOINFO", 0),
    ("SCTP_ASSOCINFO", 1),
    ("SCTP_INITMSG", 2),
    ("SCTP_NODELAY", 3),
    ("SCTP_AUTOCLOSE", 4),
    ("SCTP_SET_PEER_PRIMARY_ADDR", 5),
    ("SCTP_PRIMARY_ADDR", 6),
    ("SCTP_ADAPTATION_LAYER", 7),
    ("SCTP_DISABLE_FRAGMENTS", 8),
    ("SCTP_PEER_ADDR_PARAMS", 9),
    ("SCTP_DEFAULT_SEND_PARAM", 10),
    ("SCTP_EVENTS", 11),
    ("SCTP_I_WANT_MAPPED_V4_ADDR", 12),
    ("SCTP_MAXSEG", 13),
    ("SCTP_STATUS", 14),
    ("SCTP_GET_PEER_ADDR_INFO", 15),
    ("SCTP_DELAYED_ACK_TIME", 16),
    ("SCTP_DELAYED_ACK", 16),
    ("SCTP_DELAYED_SACK", 16),
    ("SCTP_CONTEXT", 17),
    ("SCTP_FRAGMENT_INTERLEAVE", 18),
    ("SCTP_PARTIAL_DELIVERY_POINT", 19),
    ("SCTP_MAX_BURST", 20),
    ("SCTP_AUTH_CHUNK", 21),
    ("SCTP_HMAC_IDENT", 22),
    ("SCTP_AUTH_KEY", 23),
    ("SCTP_AUTH_ACTIVE_KEY", 24),
    ("SCTP_AUTH_DELETE_KEY", 25),
    ("SCTP_PEER_AUTH_CHUNKS", 26),
    ("SCTP_LOCAL_AUTH_CHUNKS", 27),
    ("SCTP_GET_ASSOC_NUMBER", 28),
    ("SCTP_GET_ASSOC_ID_LIST", 29),
    ("SCTP_AUTO_ASCONF", 30),
    ("SCTP_PEER_ADDR_THLDS", 31),
    ("SCTP_RECVRCVINFO", 32),
    ("SCTP_RECVNXTINFO", 33),
    ("SCTP_DEFAULT_SNDINFO", 34),
    ("SCTP_ENABLE_STREAM_RESET", 118),
    ("SCTP_RESET_STREAMS", 119),
    ("SCTP_RESET_ASSOC", 120),
    ("SCTP_ADD_STREAMS", 121),
    // Peer address parameter flags
    ("SPP_HB_ENABLE", 1),
    ("SPP_HB_DISABLE", 2),
    ("SPP_HB_DEMAND", 4),
    ("SPP_PMTUD_ENABLE", 8),
    ("SPP_PMTUD_DISABLE", 16),
    ("SPP_SACKDELAY_ENABLE", 32),
    ("SPP_SACKDELAY_DISABLE", 64),
    ("SPP_HB_TIME_IS_ZERO", 128),
    ("SPP_IPV6_FLOWLABEL", 256),
    ("SPP_DSCP", 512),
    // sinfo_flags
    ("SCTP_UNORDERED", 1),
    ("SCTP_ADDR_OVER", 2),
    ("SCTP_ABORT", 4),
    ("SCTP_SACK_IMMEDIATELY", 8),
    ("SCTP_EOF", 0x200),
    // Stream reset
    ("SCTP_ENABLE_RESET_STREAM_REQ", 1),
    ("SCTP_ENABLE_RESET_ASSOC_REQ", 2),
    ("SCTP_ENABLE_CHANGE_ASSOC_REQ", 4),
    ("SCTP_STREAM_RESET_INCOMING", 1),
    ("SCTP_STREAM_RESET_OUTGOING", 2),
    ("SCTP_FUTURE_ASSOC", 0),
    ("SCTP_CURRENT_ASSOC", 1),
    ("SCTP_ALL_ASSOC", 2),
    // Association states
    ("SCTP_EMPTY", 0),
    ("SCTP_CLOSED", 1),
    ("SCTP_COOKIE_WAIT", 2),
    ("SCTP_COOKIE_ECHOED", 3),
    ("SCTP_ESTABLISHED", 4),
    ("SCTP_SHUTDOWN_PENDING", 5),
    ("SCTP_SHUTDOWN_SENT", 6),
    ("SCTP_SHUTDOWN_RECEIVED", 7),
    ("SCTP_SHUTDOWN_ACK_SENT", 8),
    // errno
    ("EPERM", 1),
    ("ENOENT", 2),
    ("EINTR", 4),
    ("EBADF", 9),
    ("EAGAIN", 11),
    ("EWOULDBLOCK", 11),
    ("ENOMEM", 12),
    ("EFAULT", 14),
    ("EINVAL", 22),
    ("EPIPE", 32),
    ("ENOTSOCK", 88),
    ("EMSGSIZE", 90),
    ("ENOPROTOOPT", 92),
    ("EOPNOTSUPP", 95),
    ("EADDRINUSE", 98),
    ("ENETUNREACH", 101),
    ("ECONNABORTED", 103),
    ("ECONNRESET", 104),
    ("EISCONN", 106),
    ("ENOTCONN", 107),
    ("ETIMEDOUT", 110),
    ("ECONNREFUSED", 111),
    ("EHOSTUNREACH", 113),
    ("EALREADY", 114),
    ("EINPROGRESS", 115),
];

/// Maps constant names to integer values for [`evaluate`](crate::expression::evaluate).
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: FxHashMap<&'static str, i64>,
}

impl SymbolTable {
    /// The table of Linux constants.
    pub fn linux() -> Self {
        Self {
            symbols: LINUX.iter().cloned().collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<i64> {
        self.symbols.get(name).copied()
    }

    /// Adds or replaces a constant.
    pub fn define(&mut self, name: &'static str, value: i64) {
        self.symbols.insert(name, value);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
