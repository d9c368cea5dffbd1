//! Turns scripted packet descriptions into concrete datagrams.
//!
//! Injected packets are rewritten into the number space the stack under
//! test established: acks are shifted by the learned sequence offset, SCTP
//! packets carry the learned tag, and TSNs, cookies and reconfiguration
//! sequence numbers are rebased. Expected packets keep the script's numbers
//! and their wildcards; the comparator does the rebasing on that side.

use crate::{
    context::RunContext,
    datagram::{Datagram, Transport, TransportProtocol},
    field::Field,
    protocols::{
        ipv4::{self, ControlFlags, Ipv4HeaderBuilder},
        sctp::{
            chunks::{
                CookieEchoChunk, DataChunk, HeartbeatChunk, InitChunk, SackChunk, SctpChunk,
                DATA_CHUNK_HEADER_OCTETS, FLAG_T_BIT,
            },
            parameters::{ReconfigParameter, SctpParameter},
            SctpPacket,
        },
        tcp::{self, TcpHeaderBuilder, TcpOption},
        udp::{self, UdpHeader},
        Endpoints, Ipv4Header,
    },
    script::{Direction, PacketSpec, TcpSpec},
};
use thiserror::Error as ThisError;

/// IPv4 time to live on every scripted datagram
pub const SCRIPT_TTL: u8 = 31;

/// Byte used to fill synthesized DATA payloads
const DATA_FILLER: u8 = b'a';

/// Byte and length of the cookie put into injected INIT ACKs without one
const DEFAULT_COOKIE_FILLER: u8 = b'A';
const DEFAULT_COOKIE_OCTETS: usize = 32;

/// Builds the datagram for a packet event.
pub fn build_packet(
    context: &mut RunContext,
    direction: Direction,
    spec: &PacketSpec,
) -> Result<Datagram, BuildError> {
    match spec {
        PacketSpec::Tcp(tcp) => build_tcp_packet(context, direction, tcp),
        PacketSpec::Udp(udp) => build_udp_packet(context, direction, udp.payload_len),
        PacketSpec::Sctp(chunks) => build_sctp_packet(context, direction, chunks),
    }
}

/// Source and destination for a packet travelling in `direction`.
fn endpoints(context: &RunContext, direction: Direction) -> Endpoints {
    let out = Endpoints::new(context.config.local, context.config.remote);
    match direction {
        Direction::Outbound => out,
        Direction::Inbound => out.reverse(),
    }
}

/// Wraps `payload_len` transport bytes in an IPv4 header. Each direction
/// numbers its datagrams with its own identification counter.
pub fn make_ip_header(
    context: &mut RunContext,
    protocol: TransportProtocol,
    direction: Direction,
    payload_len: usize,
) -> Result<Ipv4Header, BuildError> {
    let ends = endpoints(context, direction);
    let identification = match direction {
        Direction::Inbound => context.next_inbound_ip_id(),
        Direction::Outbound => context.next_outbound_ip_id(),
    };
    let payload_len: u16 = payload_len
        .try_into()
        .map_err(|_| BuildError::OverlyLongPayload)?;
    Ok(Ipv4HeaderBuilder::new(
        ends.local.address,
        ends.remote.address,
        protocol.number(),
        payload_len,
    )
    .identification(identification)
    .time_to_live(SCRIPT_TTL)
    .flags(ControlFlags::DEFAULT)
    .type_of_service(0)
    .build()?)
}

pub fn build_tcp_packet(
    context: &mut RunContext,
    direction: Direction,
    spec: &TcpSpec,
) -> Result<Datagram, BuildError> {
    let ends = endpoints(context, direction);
    let mut ack = spec.ack.wire_value();
    let mut options = spec.options.clone();
    if direction == Direction::Inbound {
        if spec.ack.value().is_some() {
            ack = ack.wrapping_add(context.rel_seq_out);
        }
        if let Some(options) = options.as_mut() {
            for option in options.iter_mut() {
                if let TcpOption::Timestamp { ecr, .. } = option {
                    *ecr = context.peer_ts_val;
                }
            }
        }
        // Injected segments must spell out their options
        if options.is_wildcard() {
            options = Field::Value(vec![]);
        }
    }
    let payload = vec![0u8; spec.payload_len as usize];
    let header = TcpHeaderBuilder::new(ends.local.port, ends.remote.port, spec.start_seq)
        .ack_number(ack)
        .ctl(spec.flags)
        .wnd(spec.window.get().unwrap_or(u16::MAX))
        .options(options)
        .build(
            ends.local.address,
            ends.remote.address,
            payload.iter().cloned(),
            payload.len(),
        )?;
    let ip = make_ip_header(
        context,
        TransportProtocol::Tcp,
        direction,
        header.bytes() as usize + payload.len(),
    )?;
    Ok(Datagram {
        ip,
        transport: Transport::Tcp(header),
        payload,
    })
}

pub fn build_udp_packet(
    context: &mut RunContext,
    direction: Direction,
    payload_len: u16,
) -> Result<Datagram, BuildError> {
    let ends = endpoints(context, direction);
    let payload = vec![0u8; payload_len as usize];
    let header = UdpHeader::for_payload(ends.local, ends.remote, &payload)?;
    let ip = make_ip_header(context, TransportProtocol::Udp, direction, header.length as usize)?;
    Ok(Datagram {
        ip,
        transport: Transport::Udp(header),
        payload,
    })
}

pub fn build_sctp_packet(
    context: &mut RunContext,
    direction: Direction,
    chunks: &[SctpChunk],
) -> Result<Datagram, BuildError> {
    let ends = endpoints(context, direction);
    let (tag, chunks) = match direction {
        Direction::Inbound => {
            let chunks = chunks
                .iter()
                .map(|chunk| prepare_inbound_chunk(context, chunk))
                .collect();
            (context.peer_vtag, chunks)
        }
        Direction::Outbound => {
            if let Some(SctpChunk::Init(init) | SctpChunk::InitAck(init)) = chunks.first() {
                learn_expected_init(context, init);
            }
            (context.local_vtag, chunks.to_vec())
        }
    };
    let packet = SctpPacket::new(ends.local.port, ends.remote.port, tag, chunks);
    let ip = make_ip_header(context, TransportProtocol::Sctp, direction, packet.len())?;
    Ok(Datagram {
        ip,
        transport: Transport::Sctp(packet),
        payload: vec![],
    })
}

/// The stack's INIT or INIT ACK is about to be expected: its numbers are
/// what the script will write for the stack's side of the association.
fn learn_expected_init(context: &mut RunContext, init: &InitChunk) {
    if let Some(tsn) = init.initial_tsn.get() {
        context.init_local_tsn = tsn;
        context.local_cum_tsn = tsn.wrapping_sub(1);
    }
    if let Some(tag) = init.initiate_tag.get() {
        context.peer_vtag = tag;
    }
}

fn prepare_inbound_chunk(context: &mut RunContext, chunk: &SctpChunk) -> SctpChunk {
    match chunk {
        SctpChunk::Init(init) => {
            context.peer_in_streams = init.inbound_streams.wire_value();
            context.peer_out_streams = init.outbound_streams.wire_value();
            context.init_peer_tsn = init.initial_tsn.wire_value();
            context.local_vtag = init.initiate_tag.wire_value();
            context.peer_cum_tsn = context.init_peer_tsn.wrapping_sub(1);
            chunk.clone()
        }
        SctpChunk::InitAck(init) => {
            context.local_vtag = init.initiate_tag.wire_value();
            context.init_peer_tsn = init.initial_tsn.wire_value();
            context.peer_cum_tsn = context.init_peer_tsn.wrapping_sub(1);
            SctpChunk::InitAck(build_init_ack_chunk(init))
        }
        SctpChunk::CookieEcho(echo) => SctpChunk::CookieEcho(build_cookie_echo_chunk(context, echo)),
        SctpChunk::Sack(sack) => {
            let diff = context.local_diff_tsn;
            SctpChunk::Sack(SackChunk {
                cum_tsn: sack.cum_tsn.clone().map(|tsn| tsn.wrapping_add(diff)),
                dups: sack.dups.clone().map(|dups| {
                    dups.into_iter()
                        .map(|tsn| tsn.wrapping_add(diff))
                        .collect()
                }),
                ..sack.clone()
            })
        }
        SctpChunk::Heartbeat(heartbeat) => {
            SctpChunk::Heartbeat(build_heartbeat_chunk(context, heartbeat))
        }
        SctpChunk::HeartbeatAck(ack) => SctpChunk::HeartbeatAck(build_heartbeat_ack_chunk(context, ack)),
        SctpChunk::Reconfig(reconfig) => {
            let mut reconfig = reconfig.clone();
            for parameter in reconfig.parameters.iter_mut() {
                rebase_reconfig_parameter(context, parameter);
            }
            SctpChunk::Reconfig(reconfig)
        }
        other => other.clone(),
    }
}

fn rebase_reconfig_parameter(context: &RunContext, parameter: &mut ReconfigParameter) {
    match parameter {
        ReconfigParameter::Response {
            response_seq,
            next_tsns,
            ..
        } => {
            if let Some(live) = response_seq.get().and_then(|seq| context.mapped_seq_num(seq)) {
                *response_seq = Field::Value(live);
            }
            if let Some((_, receiver_next)) = next_tsns {
                if let Some(tsn) = receiver_next.as_mut() {
                    if *tsn != 0 {
                        *tsn = tsn.wrapping_add(context.local_diff_tsn);
                    }
                }
            }
        }
        ReconfigParameter::OutgoingSsnReset { response_seq, .. } => {
            if let Some(live) = response_seq.get().and_then(|seq| context.mapped_seq_num(seq)) {
                *response_seq = Field::Value(live);
            }
        }
        _ => {}
    }
}

/// A DATA chunk whose payload is synthesized from its length. A wildcard
/// length leaves the payload empty.
pub fn build_data_chunk(
    flags: Field<u8>,
    length: Field<u16>,
    tsn: Field<u32>,
    stream_id: Field<u16>,
    stream_seq: Field<u16>,
    ppid: Field<u32>,
) -> Result<DataChunk, BuildError> {
    let payload = match length.get() {
        None => vec![],
        Some(length) if length < DATA_CHUNK_HEADER_OCTETS => {
            Err(BuildError::DataChunkTooShort(length))?
        }
        Some(length) => vec![DATA_FILLER; (length - DATA_CHUNK_HEADER_OCTETS) as usize],
    };
    Ok(DataChunk {
        flags,
        length,
        tsn,
        stream_id,
        stream_seq,
        ppid,
        payload,
    })
}

/// An injected INIT ACK always carries a state cookie.
pub fn build_init_ack_chunk(init: &InitChunk) -> InitChunk {
    let mut init = init.clone();
    if init.state_cookie().is_none() {
        init.parameters.push(SctpParameter::StateCookie(vec![
            DEFAULT_COOKIE_FILLER;
            DEFAULT_COOKIE_OCTETS
        ]));
    }
    init
}

/// Echoes the stack's cookie unless the script spelled one out.
pub fn build_cookie_echo_chunk(context: &RunContext, echo: &CookieEchoChunk) -> CookieEchoChunk {
    let cookie = match &echo.cookie {
        Field::Value(cookie) => cookie.clone(),
        Field::Wildcard => context.peer_cookie.clone(),
    };
    CookieEchoChunk {
        flags: echo.flags.clone(),
        cookie: Field::Value(cookie),
    }
}

/// Without explicit information, a heartbeat carries the peer address and
/// the current simulated time.
pub fn build_heartbeat_chunk(context: &RunContext, heartbeat: &HeartbeatChunk) -> HeartbeatChunk {
    let mut heartbeat = heartbeat.clone();
    if heartbeat.info.is_empty() {
        heartbeat.info = context.config.remote.address.to_bytes().to_vec();
        heartbeat.info.extend_from_slice(&(context.now as u64).to_be_bytes());
    }
    heartbeat
}

/// Without explicit information, a heartbeat ack echoes the stack's last
/// heartbeat.
pub fn build_heartbeat_ack_chunk(context: &RunContext, ack: &HeartbeatChunk) -> HeartbeatChunk {
    let mut ack = ack.clone();
    if ack.info.is_empty() {
        ack.info = context.peer_heartbeat_info.clone();
    }
    ack
}

/// The ABORT injected after the last event to tear the association down.
pub fn build_teardown_abort(context: &mut RunContext) -> Result<Datagram, BuildError> {
    build_sctp_packet(
        context,
        Direction::Inbound,
        &[SctpChunk::Abort {
            flags: Field::Value(FLAG_T_BIT),
        }],
    )
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    #[error("DATA chunk length {0} is shorter than its header")]
    DataChunkTooShort(u16),
    #[error("The packet is longer than fits in an IPv4 datagram")]
    OverlyLongPayload,
    #[error("IPv4: {0}")]
    Ipv4(#[from] ipv4::HeaderBuildError),
    #[error("TCP: {0}")]
    Tcp(#[from] tcp::BuildHeaderError),
    #[error("UDP: {0}")]
    Udp(#[from] udp::BuildHeaderError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocols::sctp::chunks::data_flags,
        script::{PacketSpec, UdpSpec},
    };
    use etherparse::{Ipv4HeaderSlice, TcpHeaderSlice};

    fn syn_spec() -> TcpSpec {
        TcpSpec {
            flags: tcp::Control::from_letters("S"),
            start_seq: 0,
            payload_len: 0,
            ack: Field::Wildcard,
            window: Field::Value(32792),
            options: Field::Value(vec![
                TcpOption::MaxSegmentSize(1000),
                TcpOption::SackPermitted,
                TcpOption::Timestamp { val: 100, ecr: 0 },
                TcpOption::NoOp,
                TcpOption::WindowScale(7),
            ]),
        }
    }

    #[test]
    fn inbound_tcp_is_addressed_to_the_stack() -> anyhow::Result<()> {
        let mut context = RunContext::default();
        context.peer_ts_val = 777;
        let datagram = build_tcp_packet(&mut context, Direction::Inbound, &syn_spec())?;
        let bytes = datagram.serialize();

        let ip = Ipv4HeaderSlice::from_slice(&bytes)?;
        assert_eq!(ip.source(), context.config.remote.address.to_bytes());
        assert_eq!(ip.destination(), context.config.local.address.to_bytes());
        assert_eq!(ip.ttl(), SCRIPT_TTL);
        assert!(!ip.dont_fragment());
        assert!(!ip.more_fragments());
        assert_eq!(ip.identification(), 0);
        assert_eq!(ip.total_len() as usize, bytes.len());

        let tcp = TcpHeaderSlice::from_slice(&bytes[20..])?;
        assert_eq!(tcp.source_port(), context.config.remote.port);
        assert_eq!(tcp.destination_port(), context.config.local.port);
        assert!(tcp.syn());
        assert!(!tcp.ack());
        assert_eq!(tcp.window_size(), 32792);
        // 4 + 2 + 10 + 1 + 3 = 20 option bytes
        assert_eq!(tcp.data_offset(), 10);

        let decoded = Datagram::from_bytes(&bytes)?;
        let Transport::Tcp(header) = decoded.transport else {
            panic!("not tcp");
        };
        assert!(header
            .option_list()
            .contains(&TcpOption::Timestamp { val: 100, ecr: 777 }));
        Ok(())
    }

    #[test]
    fn inbound_ack_is_rebased() -> anyhow::Result<()> {
        let mut context = RunContext::default();
        context.rel_seq_out = 1_000_000;
        let spec = TcpSpec {
            flags: tcp::Control::from_letters("."),
            start_seq: 1,
            payload_len: 0,
            ack: Field::Value(1),
            window: Field::Wildcard,
            options: Field::Value(vec![]),
        };
        let datagram = build_tcp_packet(&mut context, Direction::Inbound, &spec)?;
        let Transport::Tcp(header) = &datagram.transport else {
            panic!("not tcp");
        };
        assert_eq!(header.ack, 1_000_001);
        assert_eq!(header.seq, 1);
        assert_eq!(header.wnd, u16::MAX);

        let expected = build_tcp_packet(&mut context, Direction::Outbound, &spec)?;
        let Transport::Tcp(header) = &expected.transport else {
            panic!("not tcp");
        };
        assert_eq!(header.ack, 1);
        Ok(())
    }

    #[test]
    fn ip_ids_count_per_direction() -> anyhow::Result<()> {
        let mut context = RunContext::default();
        let udp = PacketSpec::Udp(UdpSpec { payload_len: 4 });
        let mut ids = vec![];
        for direction in [
            Direction::Outbound,
            Direction::Inbound,
            Direction::Outbound,
            Direction::Outbound,
            Direction::Inbound,
        ] {
            let datagram = build_packet(&mut context, direction, &udp)?;
            ids.push((direction, datagram.ip.identification));
        }
        assert_eq!(
            ids,
            vec![
                (Direction::Outbound, 0),
                (Direction::Inbound, 0),
                (Direction::Outbound, 1),
                (Direction::Outbound, 2),
                (Direction::Inbound, 1),
            ]
        );
        Ok(())
    }

    #[test]
    fn data_payload_follows_length() {
        let chunk = build_data_chunk(
            Field::Value(data_flags::BEGINNING | data_flags::END),
            Field::Value(116),
            Field::Value(1),
            Field::Value(0),
            Field::Value(0),
            Field::Value(0),
        )
        .unwrap();
        assert_eq!(chunk.payload.len(), 100);
        assert!(chunk.payload.iter().all(|byte| *byte == b'a'));
        assert_eq!(SctpChunk::Data(chunk).length(), 116);

        let wildcard = build_data_chunk(
            Field::Wildcard,
            Field::Wildcard,
            Field::Value(1),
            Field::Value(0),
            Field::Value(0),
            Field::Value(0),
        )
        .unwrap();
        assert!(wildcard.payload.is_empty());

        assert_eq!(
            build_data_chunk(
                Field::Wildcard,
                Field::Value(15),
                Field::Wildcard,
                Field::Wildcard,
                Field::Wildcard,
                Field::Wildcard,
            ),
            Err(BuildError::DataChunkTooShort(15))
        );
    }

    #[test]
    fn inbound_sctp_uses_learned_state() -> anyhow::Result<()> {
        let mut context = RunContext::default();
        context.peer_vtag = 0xdead_beef;
        context.local_diff_tsn = 1000;
        context.peer_cookie = vec![1, 2, 3, 4];
        let chunks = vec![
            SctpChunk::CookieEcho(CookieEchoChunk {
                flags: Field::Value(0),
                cookie: Field::Wildcard,
            }),
            SctpChunk::Sack(SackChunk {
                flags: Field::Value(0),
                cum_tsn: Field::Value(5),
                a_rwnd: Field::Value(1500),
                gaps: Field::Value(vec![(2, 3)]),
                dups: Field::Value(vec![4]),
            }),
        ];
        let datagram = build_sctp_packet(&mut context, Direction::Inbound, &chunks)?;
        let decoded = Datagram::from_bytes(&datagram.serialize())?;
        let Transport::Sctp(packet) = decoded.transport else {
            panic!("not sctp");
        };
        assert_eq!(packet.verification_tag, 0xdead_beef);
        assert_eq!(packet.src_port, context.config.remote.port);
        match &packet.chunks[..] {
            [SctpChunk::CookieEcho(echo), SctpChunk::Sack(sack)] => {
                assert_eq!(echo.cookie, Field::Value(vec![1, 2, 3, 4]));
                assert_eq!(sack.cum_tsn, Field::Value(1005));
                assert_eq!(sack.gaps, Field::Value(vec![(2, 3)]));
                assert_eq!(sack.dups, Field::Value(vec![1004]));
            }
            other => panic!("unexpected chunks {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn inbound_init_learns_peer_numbers() -> anyhow::Result<()> {
        let mut context = RunContext::default();
        let init = InitChunk {
            flags: Field::Value(0),
            initiate_tag: Field::Value(12345),
            a_rwnd: Field::Value(65535),
            outbound_streams: Field::Value(10),
            inbound_streams: Field::Value(5),
            initial_tsn: Field::Value(100),
            parameters: vec![],
        };
        let datagram = build_sctp_packet(&mut context, Direction::Inbound, &[SctpChunk::Init(init)])?;
        assert_eq!(context.local_vtag, 12345);
        assert_eq!(context.init_peer_tsn, 100);
        assert_eq!(context.peer_cum_tsn, 99);
        assert_eq!(context.peer_in_streams, 5);
        assert_eq!(context.peer_out_streams, 10);
        let Transport::Sctp(packet) = datagram.transport else {
            panic!("not sctp");
        };
        assert_eq!(packet.verification_tag, 0);
        Ok(())
    }

    #[test]
    fn injected_init_ack_gets_a_cookie() {
        let init = InitChunk {
            flags: Field::Value(0),
            initiate_tag: Field::Value(1),
            a_rwnd: Field::Value(1),
            outbound_streams: Field::Value(1),
            inbound_streams: Field::Value(1),
            initial_tsn: Field::Value(1),
            parameters: vec![],
        };
        let built = build_init_ack_chunk(&init);
        assert_eq!(built.state_cookie().map(<[u8]>::len), Some(32));
    }

    #[test]
    fn heartbeats_carry_time_and_acks_echo() {
        let mut context = RunContext::default();
        context.now = 1_500_000;
        context.peer_heartbeat_info = vec![9, 9, 9];
        let empty = HeartbeatChunk {
            flags: Field::Value(0),
            info: vec![],
        };
        let heartbeat = build_heartbeat_chunk(&context, &empty);
        assert_eq!(&heartbeat.info[..4], &[192, 0, 2, 1]);
        assert_eq!(&heartbeat.info[4..], &1_500_000u64.to_be_bytes());
        assert_eq!(build_heartbeat_ack_chunk(&context, &empty).info, vec![9, 9, 9]);
    }

    #[test]
    fn teardown_abort_sets_t_bit() -> anyhow::Result<()> {
        let mut context = RunContext::default();
        context.peer_vtag = 42;
        let datagram = build_teardown_abort(&mut context)?;
        let Transport::Sctp(packet) = datagram.transport else {
            panic!("not sctp");
        };
        assert_eq!(packet.verification_tag, 42);
        assert_eq!(
            packet.chunks,
            vec![SctpChunk::Abort {
                flags: Field::Value(FLAG_T_BIT)
            }]
        );
        Ok(())
    }
}
