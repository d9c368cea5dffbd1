//! Packet events: `< S 0:0(0) win 32792 <mss 1000>`, `> udp (100)`,
//! `< sctp: DATA[...]; SACK[...]`.

use super::{
    core_parser::{bounded, ellipsis, sym, ws},
    parsing_data::{semantic, Res},
    sctp_parser::sctp_packet,
};
use drill_core::{
    field::Field,
    protocols::tcp::{Control, TcpOption},
    script::{Direction, PacketEvent, PacketSpec, TcpSpec, UdpSpec},
};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0, space1},
    combinator::{map, opt, value},
    multi::{many1, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, tuple},
};

pub fn direction(input: &str) -> Res<&str, Direction> {
    alt((
        value(Direction::Inbound, char('<')),
        value(Direction::Outbound, char('>')),
    ))(input)
}

pub fn packet(input: &str) -> Res<&str, PacketEvent> {
    let (input, direction) = direction(input)?;
    let (input, _) = space0(input)?;
    let (input, spec) = alt((
        map(udp_packet, PacketSpec::Udp),
        map(sctp_packet, PacketSpec::Sctp),
        map(tcp_packet(direction), PacketSpec::Tcp),
    ))(input)?;
    Ok((input, PacketEvent { direction, spec }))
}

/// `udp (len)`
fn udp_packet(input: &str) -> Res<&str, UdpSpec> {
    map(
        preceded(
            tag("udp"),
            delimited(
                sym('('),
                bounded("UDP payload size out of range"),
                sym(')'),
            ),
        ),
        |payload_len| UdpSpec { payload_len },
    )(input)
}

/// `F`, `S`, `R`, `P` and `.` for the ACK bit, or `-` for none at all.
fn tcp_flags(input: &str) -> Res<&str, Control> {
    alt((
        value(Control::default(), char('-')),
        map(take_while1(|c: char| "FSRP.".contains(c)), Control::from_letters),
    ))(input)
}

/// `start:end(len)`, where `end` has to be `start + len`.
fn sequence_numbers(input: &str) -> Res<&str, (u32, u16)> {
    let (rest, ((start, end), len)) = pair(
        separated_pair(
            bounded::<u32>("TCP start sequence number out of range"),
            char(':'),
            bounded::<u32>("TCP end sequence number out of range"),
        ),
        delimited(
            char('('),
            bounded::<u16>("TCP payload size out of range"),
            char(')'),
        ),
    )(input)?;
    if u64::from(start) + u64::from(len) != u64::from(end) {
        return semantic(input, "inconsistent TCP sequence numbers and payload size");
    }
    Ok((rest, (start, len)))
}

fn tcp_packet<'a>(direction: Direction) -> impl FnMut(&'a str) -> Res<&'a str, TcpSpec> {
    move |input| {
        let (input, flags) = tcp_flags(input)?;
        let (input, (start_seq, payload_len)) = preceded(space1, sequence_numbers)(input)?;
        let (input, ack) = opt(preceded(
            tuple((space1, tag("ack"), space1)),
            bounded::<u32>("TCP ack sequence number out of range"),
        ))(input)?;
        let (input, window) = opt(preceded(
            tuple((space1, tag("win"), space1)),
            bounded::<u16>("TCP window value out of range"),
        ))(input)?;
        let (input, options) = opt(preceded(space0, tcp_options(direction)))(input)?;
        Ok((
            input,
            TcpSpec {
                flags,
                start_seq,
                payload_len,
                ack: ack.map_or(Field::Wildcard, Field::Value),
                window: window.map_or(Field::Wildcard, Field::Value),
                options: options.unwrap_or_else(|| Field::Value(vec![])),
            },
        ))
    }
}

/// `<opt, opt, ...>`, or `<...>` on outbound packets to leave the options
/// unchecked.
fn tcp_options<'a>(
    direction: Direction,
) -> impl FnMut(&'a str) -> Res<&'a str, Field<Vec<TcpOption>>> {
    move |input| {
        let (rest, options) = delimited(
            char('<'),
            alt((
                map(ws(ellipsis), |_| Field::Wildcard),
                map(separated_list1(sym(','), ws(tcp_option)), Field::Value),
            )),
            char('>'),
        )(input)?;
        if options.is_wildcard() && direction != Direction::Outbound {
            return semantic(
                input,
                "<...> for TCP options can only be used with outbound packets",
            );
        }
        Ok((rest, options))
    }
}

fn tcp_option(input: &str) -> Res<&str, TcpOption> {
    alt((
        value(TcpOption::NoOp, tag("nop")),
        value(TcpOption::EndOfList, tag("eol")),
        map(
            preceded(pair(tag("mss"), space1), bounded("mss value out of range")),
            TcpOption::MaxSegmentSize,
        ),
        map(
            preceded(
                pair(tag("wscale"), space1),
                bounded("window scale shift count out of range"),
            ),
            TcpOption::WindowScale,
        ),
        value(TcpOption::SackPermitted, tag("sackOK")),
        map(
            preceded(tag("sack"), many1(preceded(space1, sack_block))),
            TcpOption::Sack,
        ),
        map(
            pair(
                preceded(
                    tuple((tag("TS"), space1, tag("val"), space1)),
                    bounded("ts val out of range"),
                ),
                preceded(
                    tuple((space1, tag("ecr"), space1)),
                    bounded("ecr val out of range"),
                ),
            ),
            |(val, ecr)| TcpOption::Timestamp { val, ecr },
        ),
    ))(input)
}

/// `left:right`
fn sack_block(input: &str) -> Res<&str, (u32, u32)> {
    separated_pair(
        bounded("TCP SACK left sequence number out of range"),
        char(':'),
        bounded("TCP SACK right sequence number out of range"),
    )(input)
}
