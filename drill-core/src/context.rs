//! State learned while a script runs.
//!
//! The stack under test picks its own initial sequence numbers, tags and
//! TSNs. Scripts are written as if those were known in advance, so the
//! comparator records what the stack actually chose and the builders use it
//! to rewrite injected packets into the stack's number space.

use crate::{config::Config, script::Micros};
use rustc_hash::FxHashMap;

/// Run-scoped state shared by the builders and the comparator.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub config: Config,
    /// Current simulated time
    pub now: Micros,
    pub(crate) ip_id_inbound: u16,
    pub(crate) ip_id_outbound: u16,

    // TCP
    /// The live initial sequence number of the stack's SYN
    pub rel_seq_out: u32,
    /// Last timestamp value the stack sent, echoed in injected segments
    pub peer_ts_val: u32,
    pub peer_window: u16,

    // SCTP
    /// The tag the stack must put on its packets
    pub local_vtag: u32,
    /// The tag the stack chose, put on injected packets
    pub peer_vtag: u32,
    /// The initial TSN the script expected from the stack
    pub init_local_tsn: u32,
    /// The initial TSN the script uses for injected data
    pub init_peer_tsn: u32,
    /// Live minus scripted TSN of the stack's DATA
    pub local_diff_tsn: u32,
    pub local_cum_tsn: u32,
    pub peer_cum_tsn: u32,
    pub peer_in_streams: u16,
    pub peer_out_streams: u16,
    /// State cookie from the stack's INIT ACK
    pub peer_cookie: Vec<u8>,
    /// Heartbeat information from the stack's last HEARTBEAT
    pub peer_heartbeat_info: Vec<u8>,
    /// Scripted RE-CONFIG request sequence numbers mapped to live ones
    pub seq_num_map: FxHashMap<u32, u32>,
}

impl RunContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// The identification for the next injected datagram.
    pub fn next_inbound_ip_id(&mut self) -> u16 {
        let id = self.ip_id_inbound;
        self.ip_id_inbound = self.ip_id_inbound.wrapping_add(1);
        id
    }

    /// The identification the stack should use on its next datagram.
    pub fn next_outbound_ip_id(&mut self) -> u16 {
        let id = self.ip_id_outbound;
        self.ip_id_outbound = self.ip_id_outbound.wrapping_add(1);
        id
    }

    /// Translates a scripted request sequence number, if a live one was
    /// learned for it.
    pub fn mapped_seq_num(&self, scripted: u32) -> Option<u32> {
        self.seq_num_map.get(&scripted).copied()
    }
}
