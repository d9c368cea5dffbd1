//! Field by field comparison of expected and live datagrams.
//!
//! Comparison learns as it goes: the first SYN fixes the TCP sequence
//! offset, INIT and INIT ACK fix the SCTP tags and TSN offsets, and
//! heartbeats, cookies and reconfiguration requests are remembered for the
//! packets injected later. A mismatch reports the first field that differed.

use crate::{
    context::RunContext,
    datagram::{Datagram, Transport},
    field::Field,
    protocols::{
        sctp::{
            chunks::{data_flags, DataChunk, InitChunk, SackChunk, SctpChunk},
            parameters::{ErrorCause, ReconfigParameter, RECONFIG_RESULT_PERFORMED},
            SctpPacket,
        },
        tcp::TcpOption,
        Ipv4Header, TcpHeader, UdpHeader,
    },
};
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// Compares a datagram the stack sent against the one the script expected.
///
/// `ack` is the acknowledgement number the script wrote, if any. Outbound
/// segments without one accept any acknowledgement.
pub fn compare(
    context: &mut RunContext,
    expected: &Datagram,
    ack: Field<u32>,
    live: &Datagram,
) -> Result<(), Mismatch> {
    compare_ip(&expected.ip, &live.ip)?;
    match (&expected.transport, &live.transport) {
        (Transport::Tcp(expected), Transport::Tcp(live)) => {
            compare_tcp(context, expected, ack, live)
        }
        (Transport::Udp(expected), Transport::Udp(live)) => compare_udp(expected, live),
        (Transport::Sctp(expected), Transport::Sctp(live)) => compare_sctp(context, expected, live),
        _ => Err(Mismatch::new(Structure::Datagram, "protocol")),
    }
}

fn check(structure: Structure, field: &'static str, same: bool) -> Result<(), Mismatch> {
    if same {
        Ok(())
    } else {
        Err(Mismatch::new(structure, field))
    }
}

fn compare_ip(expected: &Ipv4Header, live: &Ipv4Header) -> Result<(), Mismatch> {
    let ip = |field, same| check(Structure::Datagram, field, same);
    ip("source", expected.source == live.source)?;
    ip("destination", expected.destination == live.destination)?;
    ip("protocol", expected.protocol == live.protocol)?;
    ip("ttl", expected.time_to_live == live.time_to_live)?;
    ip("identification", expected.identification == live.identification)?;
    ip(
        "more fragments",
        expected.flags.is_last_fragment() == live.flags.is_last_fragment(),
    )?;
    ip(
        "don't fragment",
        expected.flags.may_fragment() == live.flags.may_fragment(),
    )?;
    ip("fragment offset", expected.fragment_offset == live.fragment_offset)?;
    ip("type of service", expected.type_of_service == live.type_of_service)?;
    ip("header length", expected.ihl == live.ihl)
}

fn compare_udp(expected: &UdpHeader, live: &UdpHeader) -> Result<(), Mismatch> {
    let udp = |field, same| check(Structure::Udp, field, same);
    udp("source port", expected.source == live.source)?;
    udp("destination port", expected.destination == live.destination)?;
    udp("length", expected.length == live.length)
}

fn compare_tcp(
    context: &mut RunContext,
    expected: &TcpHeader,
    ack: Field<u32>,
    live: &TcpHeader,
) -> Result<(), Mismatch> {
    if expected.ctl.syn() {
        context.rel_seq_out = live.seq;
        if expected.ctl.ack() {
            context.peer_window = live.wnd;
        }
    }
    if let Some(val) = live.option_list().iter().find_map(|option| match option {
        TcpOption::Timestamp { val, .. } => Some(*val),
        _ => None,
    }) {
        context.peer_ts_val = val;
    }

    let tcp = |field, same| check(Structure::Tcp, field, same);
    tcp("source port", expected.src_port == live.src_port)?;
    tcp("destination port", expected.dst_port == live.dst_port)?;
    tcp(
        "sequence number",
        expected.seq.wrapping_add(context.rel_seq_out) == live.seq,
    )?;
    tcp("acknowledgement number", ack.matches(&live.ack))?;
    let (e, l) = (expected.ctl, live.ctl);
    tcp("URG", e.urg() == l.urg())?;
    tcp("ACK", e.ack() == l.ack())?;
    tcp("PSH", e.psh() == l.psh())?;
    tcp("RST", e.rst() == l.rst())?;
    tcp("SYN", e.syn() == l.syn())?;
    tcp("FIN", e.fin() == l.fin())?;
    tcp("urgent pointer", expected.urg == live.urg)?;
    compare_tcp_options(&expected.options, live.option_list())
}

/// An empty or wildcard expected list accepts whatever the stack sent.
/// Otherwise the lists must line up kind by kind.
fn compare_tcp_options(expected: &Field<Vec<TcpOption>>, live: &[TcpOption]) -> Result<(), Mismatch> {
    let expected = match expected {
        Field::Value(options) if !options.is_empty() => options,
        _ => return Ok(()),
    };
    let tcp = |field, same| check(Structure::Tcp, field, same);
    tcp("option count", expected.len() == live.len())?;
    for (expected, live) in expected.iter().zip(live) {
        tcp("option kind", expected.kind() == live.kind())?;
        match (expected, live) {
            (TcpOption::WindowScale(expected), TcpOption::WindowScale(live)) => {
                tcp("window scale", expected == live)?
            }
            (TcpOption::Sack(expected), TcpOption::Sack(live)) => {
                tcp("sack blocks", expected.len() == live.len())?
            }
            // The echo flows the other way and is not the stack's to choose
            (TcpOption::Timestamp { val: expected, .. }, TcpOption::Timestamp { val: live, .. }) => {
                tcp("timestamp", expected == live)?
            }
            (
                TcpOption::EndOfList | TcpOption::NoOp | TcpOption::SackPermitted,
                _,
            ) => tcp("option length", expected.wire_length() == live.wire_length())?,
            _ => {}
        }
    }
    Ok(())
}

fn compare_sctp(
    context: &mut RunContext,
    expected: &SctpPacket,
    live: &SctpPacket,
) -> Result<(), Mismatch> {
    let sctp = |field, same| check(Structure::Sctp, field, same);
    sctp("source port", expected.src_port == live.src_port)?;
    sctp("destination port", expected.dst_port == live.dst_port)?;
    sctp("chunk count", expected.chunks.len() == live.chunks.len())?;

    for (expected, live_chunk) in expected.chunks.iter().zip(&live.chunks) {
        let structure = Structure::Chunk(expected.name());
        check(
            structure,
            "type",
            expected.chunk_type() == live_chunk.chunk_type(),
        )?;
        let tagless = matches!(
            expected,
            SctpChunk::Init(_) | SctpChunk::InitAck(_) | SctpChunk::Abort { .. }
        );
        if !tagless {
            sctp(
                "verification tag",
                live.verification_tag == context.local_vtag,
            )?;
        }
        compare_chunk(context, expected, live_chunk)?;
    }
    Ok(())
}

fn compare_chunk(
    context: &mut RunContext,
    expected: &SctpChunk,
    live: &SctpChunk,
) -> Result<(), Mismatch> {
    let chunk = |field, same| check(Structure::Chunk(expected.name()), field, same);
    match (expected, live) {
        (SctpChunk::Data(expected), SctpChunk::Data(live)) => compare_data(context, expected, live),
        (SctpChunk::Init(expected), SctpChunk::Init(live)) => {
            learn_live_init(context, live);
            compare_init(context, "INIT", expected, live)
        }
        (SctpChunk::InitAck(expected), SctpChunk::InitAck(live)) => {
            learn_live_init(context, live);
            if let Some(cookie) = live.state_cookie() {
                context.peer_cookie = cookie.to_vec();
            }
            compare_init(context, "INIT_ACK", expected, live)
        }
        (SctpChunk::Sack(expected), SctpChunk::Sack(live)) => compare_sack(context, expected, live),
        (SctpChunk::Heartbeat(_), SctpChunk::Heartbeat(live)) => {
            context.peer_heartbeat_info = live.info.clone();
            Ok(())
        }
        (SctpChunk::CookieEcho(expected), SctpChunk::CookieEcho(live)) => {
            chunk("cookie", expected.cookie.matches_field(&live.cookie))
        }
        (SctpChunk::Shutdown(expected), SctpChunk::Shutdown(live)) => {
            chunk("cumulative TSN", expected.cum_tsn.matches_field(&live.cum_tsn))
        }
        (SctpChunk::Abort { flags: expected }, SctpChunk::Abort { flags: live })
        | (
            SctpChunk::ShutdownComplete { flags: expected },
            SctpChunk::ShutdownComplete { flags: live },
        ) => chunk("T bit", expected.matches_field(live)),
        (SctpChunk::Error(expected), SctpChunk::Error(live)) => {
            chunk("cause count", expected.causes.len() == live.causes.len())?;
            match (expected.causes.first(), live.causes.first()) {
                (
                    Some(ErrorCause::InvalidStreamIdentifier(expected)),
                    Some(ErrorCause::InvalidStreamIdentifier(live)),
                ) => chunk("stream identifier", expected.matches_field(live)),
                (Some(expected), Some(live)) => chunk("cause", expected == live),
                _ => Ok(()),
            }
        }
        (SctpChunk::Reconfig(expected), SctpChunk::Reconfig(live)) => {
            chunk(
                "parameter count",
                expected.parameters.len() == live.parameters.len(),
            )?;
            for (index, parameter) in expected.parameters.iter().enumerate() {
                compare_reconfig_parameter(context, parameter, &live.parameters, index)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn compare_data(context: &RunContext, expected: &DataChunk, live: &DataChunk) -> Result<(), Mismatch> {
    let data = |field, same| check(Structure::Chunk("DATA"), field, same);
    data("length", expected.length.matches_field(&live.length))?;
    if let (Some(expected), Some(live)) = (expected.flags.get(), live.flags.get()) {
        let bits = |flags: u8| flags & (data_flags::BEGINNING | data_flags::END);
        data("flags", bits(expected) == bits(live))?;
    }
    let rebased = expected
        .tsn
        .clone()
        .map(|tsn| tsn.wrapping_add(context.local_diff_tsn));
    data("TSN", rebased.matches_field(&live.tsn))?;
    data("stream identifier", expected.stream_id.matches_field(&live.stream_id))?;
    data("stream sequence number", expected.stream_seq.matches_field(&live.stream_seq))?;
    data("payload protocol identifier", expected.ppid.matches_field(&live.ppid))
}

/// The stack's INIT or INIT ACK fixes its tag and TSN space.
fn learn_live_init(context: &mut RunContext, live: &InitChunk) {
    let live_tsn = live.initial_tsn.wire_value();
    context.peer_vtag = live.initiate_tag.wire_value();
    context.local_diff_tsn = live_tsn.wrapping_sub(context.init_local_tsn);
    context.local_cum_tsn = live_tsn.wrapping_sub(1);
}

fn compare_init(
    context: &mut RunContext,
    name: &'static str,
    expected: &InitChunk,
    live: &InitChunk,
) -> Result<(), Mismatch> {
    let init = |field, same| check(Structure::Chunk(name), field, same);
    let rebased = expected
        .initial_tsn
        .clone()
        .map(|tsn| tsn.wrapping_add(context.local_diff_tsn));
    init("initial TSN", rebased.matches_field(&live.initial_tsn))?;
    init("a_rwnd", expected.a_rwnd.matches_field(&live.a_rwnd))?;
    if name == "INIT" {
        context.peer_in_streams = live.inbound_streams.wire_value();
        context.peer_out_streams = live.outbound_streams.wire_value();
        init(
            "outbound streams",
            expected.outbound_streams.matches_field(&live.outbound_streams),
        )?;
        init(
            "inbound streams",
            expected.inbound_streams.matches_field(&live.inbound_streams),
        )
    } else {
        // The stack answers with no more streams than the peer offered
        let outbound = expected
            .outbound_streams
            .clone()
            .map(|streams| streams.min(context.peer_in_streams));
        let inbound = expected
            .inbound_streams
            .clone()
            .map(|streams| streams.min(context.peer_out_streams));
        init("outbound streams", outbound.matches_field(&live.outbound_streams))?;
        init("inbound streams", inbound.matches_field(&live.inbound_streams))
    }
}

fn compare_sack(
    context: &mut RunContext,
    expected: &SackChunk,
    live: &SackChunk,
) -> Result<(), Mismatch> {
    let sack = |field, same| check(Structure::Chunk("SACK"), field, same);
    sack("cumulative TSN", expected.cum_tsn.matches_field(&live.cum_tsn))?;
    if let Some(cum_tsn) = live.cum_tsn.get() {
        context.peer_cum_tsn = cum_tsn;
    }
    sack("a_rwnd", expected.a_rwnd.matches_field(&live.a_rwnd))?;
    sack("gap blocks", expected.gaps.matches_field(&live.gaps))?;
    sack("duplicate TSNs", expected.dups.matches_field(&live.dups))
}

/// Learns or checks the live number behind a scripted request sequence
/// number. The first sighting of a scripted number records its live
/// counterpart.
fn map_request_seq(
    context: &mut RunContext,
    expected: &Field<u32>,
    live: &Field<u32>,
) -> Result<(), Mismatch> {
    let (Some(scripted), Some(live)) = (expected.get(), live.get()) else {
        return Ok(());
    };
    match context.mapped_seq_num(scripted) {
        None => {
            context.seq_num_map.insert(scripted, live);
            Ok(())
        }
        Some(mapped) => check(
            Structure::Chunk("RECONFIG"),
            "request sequence number",
            mapped == live,
        ),
    }
}

fn compare_reconfig_parameter(
    context: &mut RunContext,
    expected: &ReconfigParameter,
    live: &[ReconfigParameter],
    index: usize,
) -> Result<(), Mismatch> {
    let reconfig = |field, same| check(Structure::Chunk("RECONFIG"), field, same);
    if let ReconfigParameter::Response {
        response_seq,
        result,
        next_tsns,
    } = expected
    {
        // Responses line up by position
        let Some(ReconfigParameter::Response {
            response_seq: live_seq,
            result: live_result,
            next_tsns: live_next,
        }) = live.get(index)
        else {
            return Ok(());
        };
        reconfig("response sequence number", response_seq.matches_field(live_seq))?;
        reconfig("result", result.matches_field(live_result))?;
        if let (Some((sender, receiver)), Some((live_sender, live_receiver))) = (next_tsns, live_next) {
            let performed = result.get() == Some(RECONFIG_RESULT_PERFORMED);
            if performed && sender.get() != Some(0) {
                let rebased = sender
                    .clone()
                    .map(|tsn| tsn.wrapping_add(context.local_diff_tsn));
                reconfig("sender's next TSN", rebased.matches_field(live_sender))?;
                reconfig("receiver's next TSN", receiver.matches_field(live_receiver))?;
            }
        }
        return Ok(());
    }

    // Requests are found by kind
    let Some(live) = live.iter().find(|live| live.kind() == expected.kind()) else {
        return Err(Mismatch::new(Structure::Chunk("RECONFIG"), "parameter"));
    };
    if let (Some(expected_seq), Some(live_seq)) = (expected.request_seq(), live.request_seq()) {
        map_request_seq(context, expected_seq, live_seq)?;
    }
    match (expected, live) {
        (
            ReconfigParameter::OutgoingSsnReset {
                response_seq,
                last_tsn,
                streams,
                ..
            },
            ReconfigParameter::OutgoingSsnReset {
                response_seq: live_response,
                last_tsn: live_last,
                streams: live_streams,
                ..
            },
        ) => {
            if let (Some(scripted), Some(live)) = (response_seq.get(), live_response.get()) {
                context.seq_num_map.entry(scripted).or_insert(live);
            }
            let rebased = last_tsn
                .clone()
                .map(|tsn| tsn.wrapping_add(context.local_diff_tsn));
            reconfig("last TSN", rebased.matches_field(live_last))?;
            reconfig("streams", streams == live_streams)
        }
        (
            ReconfigParameter::IncomingSsnReset { streams, .. },
            ReconfigParameter::IncomingSsnReset {
                streams: live_streams,
                ..
            },
        ) => reconfig("streams", streams == live_streams),
        (
            ReconfigParameter::AddOutgoingStreams { new_streams, .. },
            ReconfigParameter::AddOutgoingStreams {
                new_streams: live_new,
                ..
            },
        )
        | (
            ReconfigParameter::AddIncomingStreams { new_streams, .. },
            ReconfigParameter::AddIncomingStreams {
                new_streams: live_new,
                ..
            },
        ) => reconfig("number of new streams", new_streams.matches_field(live_new)),
        _ => Ok(()),
    }
}

/// The part of a datagram a comparison failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    Datagram,
    Tcp,
    Udp,
    Sctp,
    Chunk(&'static str),
}

impl Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Datagram => write!(f, "datagram"),
            Self::Tcp => write!(f, "tcp segment"),
            Self::Udp => write!(f, "udp datagram"),
            Self::Sctp => write!(f, "sctp packet"),
            Self::Chunk(name) => write!(f, "chunk {name}"),
        }
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
#[error("Datagrams are not the same: {structure} {field} differs")]
pub struct Mismatch {
    pub structure: Structure,
    pub field: &'static str,
}

impl Mismatch {
    pub const fn new(structure: Structure, field: &'static str) -> Self {
        Self { structure, field }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builders::{build_data_chunk, build_packet, build_sctp_packet},
        protocols::{
            sctp::{parameters::SctpParameter, CookieEchoChunk, ReconfigChunk},
            tcp::Control,
        },
        script::{Direction, PacketSpec, TcpSpec, UdpSpec},
    };
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn tcp_spec(flags: &str, seq: u32, ack: Field<u32>) -> PacketSpec {
        PacketSpec::Tcp(TcpSpec {
            flags: Control::from_letters(flags),
            start_seq: seq,
            payload_len: 0,
            ack,
            window: Field::Value(1000),
            options: Field::Value(vec![
                TcpOption::MaxSegmentSize(1460),
                TcpOption::Timestamp { val: 5, ecr: 0 },
            ]),
        })
    }

    fn tcp_mut(datagram: &mut Datagram) -> &mut TcpHeader {
        match &mut datagram.transport {
            Transport::Tcp(tcp) => tcp,
            _ => panic!("not tcp"),
        }
    }

    fn expected_and_live(spec: &PacketSpec) -> (Datagram, Datagram) {
        let mut script = RunContext::default();
        let mut stack = RunContext::default();
        let expected = build_packet(&mut script, Direction::Outbound, spec).unwrap();
        let live = build_packet(&mut stack, Direction::Outbound, spec).unwrap();
        (expected, live)
    }

    #[test]
    fn packets_match_themselves() {
        for spec in [
            tcp_spec("S", 0, Field::Wildcard),
            tcp_spec(".", 1, Field::Value(1)),
            PacketSpec::Udp(UdpSpec { payload_len: 12 }),
        ] {
            let (expected, live) = expected_and_live(&spec);
            let mut context = RunContext::default();
            assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));
        }
    }

    #[test]
    fn syn_learns_sequence_offset() {
        let (expected, mut live) = expected_and_live(&tcp_spec("S", 0, Field::Wildcard));
        tcp_mut(&mut live).seq = 0x1234_5678;
        let mut context = RunContext::default();
        assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));
        assert_eq!(context.rel_seq_out, 0x1234_5678);
        assert_eq!(context.peer_ts_val, 5);

        // Later segments are measured from the learned offset
        let (expected, mut live) = expected_and_live(&tcp_spec(".", 1, Field::Value(1)));
        tcp_mut(&mut live).seq = 0x1234_5679;
        tcp_mut(&mut live).ack = 1;
        assert_eq!(compare(&mut context, &expected, Field::Value(1), &live), Ok(()));
        tcp_mut(&mut live).seq = 0x1234_567a;
        assert_eq!(
            compare(&mut context, &expected, Field::Value(1), &live),
            Err(Mismatch::new(Structure::Tcp, "sequence number"))
        );
    }

    #[test]
    fn ack_is_checked_only_when_given() {
        let (expected, mut live) = expected_and_live(&tcp_spec(".", 0, Field::Wildcard));
        tcp_mut(&mut live).ack = 999;
        let mut context = RunContext::default();
        assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));
        assert_eq!(
            compare(&mut context, &expected, Field::Value(1), &live),
            Err(Mismatch::new(Structure::Tcp, "acknowledgement number"))
        );
    }

    #[test]
    fn options_line_up_by_kind() {
        let mut context = RunContext::default();
        let (expected, mut live) = expected_and_live(&tcp_spec("S", 0, Field::Wildcard));
        // A different echo and mss value are both fine
        tcp_mut(&mut live).options = Field::Value(vec![
            TcpOption::MaxSegmentSize(536),
            TcpOption::Timestamp { val: 5, ecr: 77 },
        ]);
        assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));

        tcp_mut(&mut live).options = Field::Value(vec![
            TcpOption::MaxSegmentSize(536),
            TcpOption::Timestamp { val: 6, ecr: 0 },
        ]);
        assert_eq!(
            compare(&mut context, &expected, Field::Wildcard, &live),
            Err(Mismatch::new(Structure::Tcp, "timestamp"))
        );

        tcp_mut(&mut live).options = Field::Value(vec![TcpOption::MaxSegmentSize(536)]);
        assert_eq!(
            compare(&mut context, &expected, Field::Wildcard, &live),
            Err(Mismatch::new(Structure::Tcp, "option count"))
        );
    }

    #[test]
    fn ip_fields_have_no_wildcards() {
        let (expected, mut live) = expected_and_live(&PacketSpec::Udp(UdpSpec { payload_len: 1 }));
        live.ip.time_to_live = 64;
        let mut context = RunContext::default();
        assert_eq!(
            compare(&mut context, &expected, Field::Wildcard, &live),
            Err(Mismatch::new(Structure::Datagram, "ttl"))
        );
    }

    fn sctp_pair(
        expected_chunks: &[SctpChunk],
        live_chunks: &[SctpChunk],
        live_tag: u32,
    ) -> (Datagram, Datagram) {
        let mut script = RunContext::default();
        let mut stack = RunContext {
            local_vtag: live_tag,
            ..Default::default()
        };
        let expected = build_sctp_packet(&mut script, Direction::Outbound, expected_chunks).unwrap();
        let live = build_sctp_packet(&mut stack, Direction::Outbound, live_chunks).unwrap();
        (expected, live)
    }

    fn init_ack(tag: Field<u32>, tsn: Field<u32>, os: u16, is: u16) -> SctpChunk {
        SctpChunk::InitAck(InitChunk {
            flags: Field::Value(0),
            initiate_tag: tag,
            a_rwnd: Field::Value(106496),
            outbound_streams: Field::Value(os),
            inbound_streams: Field::Value(is),
            initial_tsn: tsn,
            parameters: vec![SctpParameter::StateCookie(vec![7; 8])],
        })
    }

    #[test]
    fn init_ack_learns_tag_and_tsn() {
        let mut context = RunContext {
            peer_in_streams: 5,
            peer_out_streams: 10,
            ..Default::default()
        };
        let (expected, live) = sctp_pair(
            &[init_ack(Field::Wildcard, Field::Wildcard, 16, 16)],
            &[init_ack(Field::Value(0xabcd), Field::Value(5000), 5, 10)],
            1,
        );
        assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));
        assert_eq!(context.peer_vtag, 0xabcd);
        assert_eq!(context.local_diff_tsn, 5000);
        assert_eq!(context.local_cum_tsn, 4999);
        assert_eq!(context.peer_cookie, vec![7; 8]);
    }

    #[test]
    fn later_chunks_need_the_learned_tag() {
        let data = |length| {
            SctpChunk::Data(
                build_data_chunk(
                    Field::Value(data_flags::BEGINNING | data_flags::END),
                    Field::Value(length),
                    Field::Value(1),
                    Field::Value(0),
                    Field::Value(0),
                    Field::Value(0),
                )
                .unwrap(),
            )
        };
        let mut context = RunContext {
            local_vtag: 42,
            ..Default::default()
        };
        let (expected, live) = sctp_pair(&[data(116)], &[data(116)], 42);
        assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));

        let (expected, live) = sctp_pair(&[data(116)], &[data(116)], 43);
        assert_eq!(
            compare(&mut context, &expected, Field::Wildcard, &live),
            Err(Mismatch::new(Structure::Sctp, "verification tag"))
        );

        let (expected, live) = sctp_pair(&[data(116)], &[data(117)], 42);
        assert_eq!(
            compare(&mut context, &expected, Field::Wildcard, &live),
            Err(Mismatch::new(Structure::Chunk("DATA"), "length"))
        );
    }

    #[test]
    fn wildcards_absorb_any_value() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let expected_sack = SctpChunk::Sack(SackChunk {
            flags: Field::Value(0),
            cum_tsn: Field::Value(10),
            a_rwnd: Field::Wildcard,
            gaps: Field::Wildcard,
            dups: Field::Wildcard,
        });
        for _ in 0..32 {
            let gaps = (0..rng.gen_range(0..4))
                .map(|_| (rng.gen(), rng.gen()))
                .collect();
            let live_sack = SctpChunk::Sack(SackChunk {
                flags: Field::Value(0),
                cum_tsn: Field::Value(10),
                a_rwnd: Field::Value(rng.gen()),
                gaps: Field::Value(gaps),
                dups: Field::Value(vec![rng.gen()]),
            });
            let (expected, live) = sctp_pair(&[expected_sack.clone()], &[live_sack], 0);
            let mut context = RunContext::default();
            assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));
            assert_eq!(context.peer_cum_tsn, 10);
        }
    }

    #[test]
    fn cookies_compare_only_when_spelled_out() {
        let echo = |cookie: Field<Vec<u8>>| {
            SctpChunk::CookieEcho(CookieEchoChunk {
                flags: Field::Value(0),
                cookie,
            })
        };
        let mut context = RunContext::default();
        let (expected, live) = sctp_pair(
            &[echo(Field::Wildcard)],
            &[echo(Field::Value(vec![1, 2, 3, 4]))],
            0,
        );
        assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));

        let (expected, live) = sctp_pair(
            &[echo(Field::Value(vec![9, 9, 9, 9]))],
            &[echo(Field::Value(vec![1, 2, 3, 4]))],
            0,
        );
        assert_eq!(
            compare(&mut context, &expected, Field::Wildcard, &live),
            Err(Mismatch::new(Structure::Chunk("COOKIE_ECHO"), "cookie"))
        );
    }

    #[test]
    fn reconfig_learns_request_numbers() {
        let request = |seq, last_tsn| {
            SctpChunk::Reconfig(ReconfigChunk {
                flags: Field::Value(0),
                parameters: vec![ReconfigParameter::OutgoingSsnReset {
                    request_seq: Field::Value(seq),
                    response_seq: Field::Value(0),
                    last_tsn: Field::Value(last_tsn),
                    streams: vec![1],
                }],
            })
        };
        let mut context = RunContext {
            local_diff_tsn: 100,
            ..Default::default()
        };
        let (expected, live) = sctp_pair(&[request(1, 5)], &[request(77, 105)], 0);
        assert_eq!(compare(&mut context, &expected, Field::Wildcard, &live), Ok(()));
        assert_eq!(context.mapped_seq_num(1), Some(77));

        let (expected, live) = sctp_pair(&[request(1, 5)], &[request(78, 105)], 0);
        assert_eq!(
            compare(&mut context, &expected, Field::Wildcard, &live),
            Err(Mismatch::new(
                Structure::Chunk("RECONFIG"),
                "request sequence number"
            ))
        );
    }

    #[test]
    fn mismatch_names_the_structure() {
        let mismatch = Mismatch::new(Structure::Chunk("INIT_ACK"), "a_rwnd");
        assert_eq!(
            mismatch.to_string(),
            "Datagrams are not the same: chunk INIT_ACK a_rwnd differs"
        );
    }
}
