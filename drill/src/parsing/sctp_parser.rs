//! SCTP chunk lists: `sctp: INIT[flgs=0, tag=1, ...]; DATA[...]`.
//!
//! Every chunk is `NAME[field=value, ...]` with its fields in a fixed
//! order. Any field may be `...` to leave it unchecked.

use super::{
    core_parser::{bounded, byte_list, ellipsis, field, sym, word, ws},
    parsing_data::{semantic, Res},
};
use drill_core::{
    builders::build_data_chunk,
    field::Field,
    protocols::sctp::{
        chunk_type_by_name, data_flags, CookieEchoChunk, ErrorCause, ErrorChunk,
        HeartbeatChunk, InitChunk, ReconfigChunk, ReconfigParameter, SackChunk, SctpChunk,
        SctpParameter, ShutdownChunk, FLAG_T_BIT,
    },
};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, char},
    combinator::{map, map_opt, opt},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, tuple},
};

/// The fixed part of a TLV parameter, and of a COOKIE ECHO chunk
const TLV_HEADER_OCTETS: usize = 4;

type FlagLetter = (char, u8, &'static str);

const DATA_FLAG_LETTERS: &[FlagLetter] = &[
    ('I', data_flags::IMMEDIATE, "I-bit specified multiple times"),
    ('U', data_flags::UNORDERED, "U-bit specified multiple times"),
    ('B', data_flags::BEGINNING, "B-bit specified multiple times"),
    ('E', data_flags::END, "E-bit specified multiple times"),
];

const T_FLAG_LETTERS: &[FlagLetter] = &[('T', FLAG_T_BIT, "T-bit specified multiple times")];

pub fn sctp_packet(input: &str) -> Res<&str, Vec<SctpChunk>> {
    preceded(
        pair(tag("sctp"), sym(':')),
        separated_list1(sym(';'), ws(sctp_chunk)),
    )(input)
}

fn sctp_chunk(input: &str) -> Res<&str, SctpChunk> {
    alt((
        data_chunk,
        map(chunk("INIT", init_body), SctpChunk::Init),
        map(chunk("INIT_ACK", init_body), SctpChunk::InitAck),
        map(chunk("SACK", sack_body), SctpChunk::Sack),
        map(chunk("HEARTBEAT", heartbeat_body), SctpChunk::Heartbeat),
        map(chunk("HEARTBEAT_ACK", heartbeat_body), SctpChunk::HeartbeatAck),
        map(chunk("ABORT", lettered_flags(T_FLAG_LETTERS)), |flags| {
            SctpChunk::Abort { flags }
        }),
        map(chunk("SHUTDOWN", shutdown_body), SctpChunk::Shutdown),
        map(chunk("SHUTDOWN_ACK", flags), |flags| SctpChunk::ShutdownAck {
            flags,
        }),
        map(chunk("ERROR", error_body), SctpChunk::Error),
        map(chunk("COOKIE_ECHO", cookie_echo_body), SctpChunk::CookieEcho),
        map(chunk("COOKIE_ACK", flags), |flags| SctpChunk::CookieAck { flags }),
        map(
            chunk("SHUTDOWN_COMPLETE", lettered_flags(T_FLAG_LETTERS)),
            |flags| SctpChunk::ShutdownComplete { flags },
        ),
        map(chunk("RECONFIG", reconfig_body), SctpChunk::Reconfig),
    ))(input)
}

/// `NAME[body]`
fn chunk<'a, O>(
    name: &'static str,
    body: impl FnMut(&'a str) -> Res<&'a str, O>,
) -> impl FnMut(&'a str) -> Res<&'a str, O> {
    preceded(tag(name), delimited(sym('['), body, sym(']')))
}

/// `, item`
fn next<'a, O>(
    item: impl FnMut(&'a str) -> Res<&'a str, O>,
) -> impl FnMut(&'a str) -> Res<&'a str, O> {
    preceded(sym(','), item)
}

fn flags(input: &str) -> Res<&str, Field<u8>> {
    field("flgs", "flags value out of range")(input)
}

/// `flgs=`, where the value may also be spelled with flag letters.
fn lettered_flags<'a>(
    letters: &'static [FlagLetter],
) -> impl FnMut(&'a str) -> Res<&'a str, Field<u8>> {
    move |input| {
        alt((
            flags,
            preceded(
                pair(ws(tag("flgs")), sym('=')),
                map(flag_letters(letters), Field::Value),
            ),
        ))(input)
    }
}

fn flag_letters<'a>(letters: &'static [FlagLetter]) -> impl FnMut(&'a str) -> Res<&'a str, u8> {
    move |input| {
        let (rest, spelled) = alpha1(input)?;
        let mut flags = 0;
        for c in spelled.chars() {
            match letters.iter().find(|(letter, ..)| *letter == c) {
                Some((_, bit, _)) if flags & bit == 0 => flags |= bit,
                Some((.., repeated)) => return semantic(input, *repeated),
                None if letters.len() == 1 => return semantic(input, "Only expecting T as flags"),
                None => return semantic(input, "Only expecting IUBE as flags"),
            }
        }
        Ok((rest, flags))
    }
}

/// `DATA[flgs=, len=, tsn=, sid=, ssn=, ppid=]`
fn data_chunk(input: &str) -> Res<&str, SctpChunk> {
    let (rest, (flags, length, tsn, sid, ssn, ppid)) = chunk(
        "DATA",
        tuple((
            lettered_flags(DATA_FLAG_LETTERS),
            next(field::<u16>("len", "len value out of range")),
            next(field::<u32>("tsn", "tsn value out of range")),
            next(field::<u16>("sid", "sid value out of range")),
            next(field::<u16>("ssn", "ssn value out of range")),
            next(field::<u32>("ppid", "ppid value out of range")),
        )),
    )(input)?;
    match build_data_chunk(flags, length, tsn, sid, ssn, ppid) {
        Ok(data) => Ok((rest, SctpChunk::Data(data))),
        Err(_) => semantic(input, "length value out of range"),
    }
}

/// `flgs=, tag=, a_rwnd=, os=, is=, tsn=` and then parameters
fn init_body(input: &str) -> Res<&str, InitChunk> {
    map(
        tuple((
            flags,
            next(field::<u32>("tag", "tag value out of range")),
            next(field::<u32>("a_rwnd", "a_rwnd value out of range")),
            next(field::<u16>("os", "os value out of range")),
            next(field::<u16>("is", "is value out of range")),
            next(field::<u32>("tsn", "tsn value out of range")),
            many0(next(parameter)),
        )),
        |(flags, initiate_tag, a_rwnd, outbound_streams, inbound_streams, initial_tsn, parameters)| {
            InitChunk {
                flags,
                initiate_tag,
                a_rwnd,
                outbound_streams,
                inbound_streams,
                initial_tsn,
                parameters: parameters.into_iter().flatten().collect(),
            }
        },
    )(input)
}

/// A parameter of an INIT or INIT ACK. A state cookie without explicit
/// bytes yields nothing; the builder supplies one.
fn parameter(input: &str) -> Res<&str, Option<SctpParameter>> {
    alt((
        map(heartbeat_information, |info| {
            Some(SctpParameter::HeartbeatInfo(info))
        }),
        map(supported_extensions, |types| {
            Some(SctpParameter::SupportedExtensions(types))
        }),
        map(state_cookie, |cookie| cookie.map(SctpParameter::StateCookie)),
    ))(input)
}

/// `HEARTBEAT_INFORMATION[...]` or `HEARTBEAT_INFORMATION[len=, val=]`.
/// Information left out is filled in when the packet is built.
fn heartbeat_information(input: &str) -> Res<&str, Vec<u8>> {
    map(
        chunk(
            "HEARTBEAT_INFORMATION",
            alt((map(ws(ellipsis), |_| None), length_and_value)),
        ),
        Option::unwrap_or_default,
    )(input)
}

/// `SUPPORTED_EXTENSIONS[types=[INIT, 0x82, ...]]`
fn supported_extensions(input: &str) -> Res<&str, Vec<u8>> {
    let chunk_type = alt((
        map_opt(word, chunk_type_by_name),
        bounded("type value out of range"),
    ));
    chunk(
        "SUPPORTED_EXTENSIONS",
        preceded(
            pair(ws(tag("types")), sym('=')),
            alt((
                map(ellipsis, |_| vec![]),
                delimited(sym('['), separated_list0(sym(','), ws(chunk_type)), sym(']')),
            )),
        ),
    )(input)
}

/// `STATE_COOKIE[...]` or `STATE_COOKIE[len=, val=]`
fn state_cookie(input: &str) -> Res<&str, Option<Vec<u8>>> {
    chunk(
        "STATE_COOKIE",
        alt((map(ws(ellipsis), |_| None), length_and_value)),
    )(input)
}

/// `len=, val=` for a TLV whose length covers its own header. A length
/// is required whenever bytes are given, and has to agree with them.
fn length_and_value(input: &str) -> Res<&str, Option<Vec<u8>>> {
    let (rest, (length, bytes)) = pair(
        field::<u16>("len", "length value out of range"),
        next(preceded(
            pair(ws(tag("val")), sym('=')),
            alt((map(ellipsis, |_| None), map(byte_list, Some))),
        )),
    )(input)?;
    match (length.get().map(usize::from), bytes) {
        (Some(length), _) if length < TLV_HEADER_OCTETS => {
            semantic(input, "length value out of range")
        }
        (Some(length), Some(bytes)) if length != TLV_HEADER_OCTETS + bytes.len() => {
            semantic(input, "length value incompatible with val")
        }
        (None, Some(_)) => semantic(input, "length needs to be specified"),
        (_, bytes) => Ok((rest, bytes)),
    }
}

/// `flgs=, cum_tsn=, a_rwnd=, gaps=, dups=`
fn sack_body(input: &str) -> Res<&str, SackChunk> {
    map(
        tuple((
            flags,
            next(field::<u32>("cum_tsn", "cum_tsn value out of range")),
            next(field::<u32>("a_rwnd", "a_rwnd value out of range")),
            next(preceded(pair(ws(tag("gaps")), sym('=')), blocks(gap))),
            next(preceded(pair(ws(tag("dups")), sym('=')), blocks(dup))),
        )),
        |(flags, cum_tsn, a_rwnd, gaps, dups)| SackChunk {
            flags,
            cum_tsn,
            a_rwnd,
            gaps,
            dups,
        },
    )(input)
}

/// `...`, `[...]` or `[item, item, ...]`
fn blocks<'a, O>(
    item: impl FnMut(&'a str) -> Res<&'a str, O>,
) -> impl FnMut(&'a str) -> Res<&'a str, Field<Vec<O>>> {
    alt((
        map(ellipsis, |_| Field::Wildcard),
        map(delimited(sym('['), ellipsis, sym(']')), |_| Field::Wildcard),
        map(
            delimited(sym('['), separated_list0(sym(','), ws(item)), sym(']')),
            Field::Value,
        ),
    ))
}

/// `start:end` offsets of a gap ack block
fn gap(input: &str) -> Res<&str, (u16, u16)> {
    separated_pair(
        bounded("start value out of range"),
        char(':'),
        bounded("end value out of range"),
    )(input)
}

/// A duplicate TSN, written `tsn` or `tsn:tsn`
fn dup(input: &str) -> Res<&str, u32> {
    map(
        pair(
            bounded::<u32>("start value out of range"),
            opt(preceded(
                char(':'),
                bounded::<u32>("end value out of range"),
            )),
        ),
        |(tsn, _)| tsn,
    )(input)
}

/// `flgs=, HEARTBEAT_INFORMATION[...]`
fn heartbeat_body(input: &str) -> Res<&str, HeartbeatChunk> {
    map(
        pair(flags, next(heartbeat_information)),
        |(flags, info)| HeartbeatChunk { flags, info },
    )(input)
}

fn shutdown_body(input: &str) -> Res<&str, ShutdownChunk> {
    map(
        pair(flags, next(field::<u32>("cum_tsn", "cum_tsn value out of range"))),
        |(flags, cum_tsn)| ShutdownChunk { flags, cum_tsn },
    )(input)
}

/// `flgs=, len=, val=`. Only explicit cookie bytes are compared.
fn cookie_echo_body(input: &str) -> Res<&str, CookieEchoChunk> {
    map(pair(flags, next(length_and_value)), |(flags, cookie)| {
        CookieEchoChunk {
            flags,
            cookie: cookie.map_or(Field::Wildcard, Field::Value),
        }
    })(input)
}

/// `flgs=` and then error causes
fn error_body(input: &str) -> Res<&str, ErrorChunk> {
    map(pair(flags, many0(next(error_cause))), |(flags, causes)| {
        ErrorChunk { flags, causes }
    })(input)
}

fn error_cause(input: &str) -> Res<&str, ErrorCause> {
    map(
        chunk(
            "INVALID_STREAM_IDENTIFIER",
            field("sid", "sid value out of range"),
        ),
        ErrorCause::InvalidStreamIdentifier,
    )(input)
}

/// `flgs=` and then stream reconfiguration requests and responses
fn reconfig_body(input: &str) -> Res<&str, ReconfigChunk> {
    map(
        pair(flags, many0(next(reconfig_parameter))),
        |(flags, parameters)| ReconfigChunk { flags, parameters },
    )(input)
}

fn reconfig_parameter(input: &str) -> Res<&str, ReconfigParameter> {
    let request_seq = || field::<u32>("req_sn", "req_sn value out of range");
    let new_streams = || {
        next(field::<u16>(
            "number_of_new_streams",
            "number_of_new_streams value out of range",
        ))
    };
    alt((
        map(
            chunk(
                "OUTGOING_SSN_RESET",
                tuple((
                    request_seq(),
                    next(field::<u32>("resp_sn", "resp_sn value out of range")),
                    next(field::<u32>("last_tsn", "last_tsn value out of range")),
                    stream_list,
                )),
            ),
            |(request_seq, response_seq, last_tsn, streams)| {
                ReconfigParameter::OutgoingSsnReset {
                    request_seq,
                    response_seq,
                    last_tsn,
                    streams,
                }
            },
        ),
        map(
            chunk("INCOMING_SSN_RESET", pair(request_seq(), stream_list)),
            |(request_seq, streams)| ReconfigParameter::IncomingSsnReset {
                request_seq,
                streams,
            },
        ),
        map(chunk("SSN_TSN_RESET", request_seq()), |request_seq| {
            ReconfigParameter::SsnTsnReset { request_seq }
        }),
        map(
            chunk(
                "RECONFIG_RESPONSE",
                tuple((
                    field::<u32>("resp_sn", "resp_sn value out of range"),
                    next(field::<u32>("result", "result value out of range")),
                    opt(pair(
                        next(field::<u32>(
                            "sender_next_tsn",
                            "sender_next_tsn value out of range",
                        )),
                        next(field::<u32>(
                            "receiver_next_tsn",
                            "receiver_next_tsn value out of range",
                        )),
                    )),
                )),
            ),
            |(response_seq, result, next_tsns)| ReconfigParameter::Response {
                response_seq,
                result,
                next_tsns,
            },
        ),
        map(
            chunk("ADD_OUTGOING_STREAMS", pair(request_seq(), new_streams())),
            |(request_seq, new_streams)| ReconfigParameter::AddOutgoingStreams {
                request_seq,
                new_streams,
            },
        ),
        map(
            chunk("ADD_INCOMING_STREAMS", pair(request_seq(), new_streams())),
            |(request_seq, new_streams)| ReconfigParameter::AddIncomingStreams {
                request_seq,
                new_streams,
            },
        ),
    ))(input)
}

/// An optional `, sids=[...]`
fn stream_list(input: &str) -> Res<&str, Vec<u16>> {
    map(
        opt(next(preceded(
            pair(ws(tag("sids")), sym('=')),
            delimited(
                sym('['),
                separated_list0(sym(','), ws(bounded("sid value out of range"))),
                sym(']'),
            ),
        ))),
        Option::unwrap_or_default,
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parsing_data::ParseErrorKind;

    fn chunks(input: &str) -> Vec<SctpChunk> {
        let (rest, chunks) = sctp_packet(input).unwrap();
        assert_eq!(rest, "");
        chunks
    }

    fn failure(input: &str) -> ParseErrorKind {
        ParseErrorKind::from_nom(sctp_packet(input).unwrap_err())
    }

    #[test]
    fn init_with_parameters() {
        let parsed = chunks(
            "sctp: INIT[flgs=0, tag=1, a_rwnd=1500, os=1, is=1, tsn=0, \
             SUPPORTED_EXTENSIONS[types=[RECONFIG, 0xc0]]]",
        );
        assert_eq!(
            parsed,
            vec![SctpChunk::Init(InitChunk {
                flags: Field::Value(0),
                initiate_tag: Field::Value(1),
                a_rwnd: Field::Value(1500),
                outbound_streams: Field::Value(1),
                inbound_streams: Field::Value(1),
                initial_tsn: Field::Value(0),
                parameters: vec![SctpParameter::SupportedExtensions(vec![130, 0xc0])],
            })]
        );
    }

    #[test]
    fn init_ack_with_wildcards() {
        let parsed = chunks(
            "sctp: INIT_ACK[flgs=0, tag=..., a_rwnd=..., os=..., is=..., tsn=0, \
             STATE_COOKIE[len=..., val=...]]",
        );
        let SctpChunk::InitAck(init) = &parsed[0] else {
            panic!("not an INIT ACK: {parsed:?}");
        };
        assert_eq!(init.initiate_tag, Field::Wildcard);
        assert_eq!(init.initial_tsn, Field::Value(0));
        assert!(init.parameters.is_empty());
    }

    #[test]
    fn data_and_sack_in_one_packet() {
        let parsed = chunks(
            "sctp: DATA[flgs=BE, len=1016, tsn=0, sid=0, ssn=0, ppid=0]; \
             SACK[flgs=0, cum_tsn=0, a_rwnd=..., gaps=[2:3], dups=[]]",
        );
        let SctpChunk::Data(data) = &parsed[0] else {
            panic!("not DATA: {parsed:?}");
        };
        assert_eq!(
            data.flags,
            Field::Value(data_flags::BEGINNING | data_flags::END)
        );
        assert_eq!(data.payload.len(), 1000);
        assert_eq!(
            parsed[1],
            SctpChunk::Sack(SackChunk {
                flags: Field::Value(0),
                cum_tsn: Field::Value(0),
                a_rwnd: Field::Wildcard,
                gaps: Field::Value(vec![(2, 3)]),
                dups: Field::Value(vec![]),
            })
        );
    }

    #[test]
    fn sack_block_lists_may_be_unchecked() {
        let parsed = chunks("sctp: SACK[flgs=0, cum_tsn=3, a_rwnd=1000, gaps=[...], dups=...]");
        let SctpChunk::Sack(sack) = &parsed[0] else {
            panic!("not a SACK: {parsed:?}");
        };
        assert_eq!(sack.gaps, Field::Wildcard);
        assert_eq!(sack.dups, Field::Wildcard);
    }

    #[test]
    fn flag_letters() {
        assert_eq!(
            chunks("sctp: ABORT[flgs=T]"),
            vec![SctpChunk::Abort {
                flags: Field::Value(FLAG_T_BIT)
            }]
        );
        assert_eq!(
            failure("sctp: ABORT[flgs=X]"),
            ParseErrorKind::Semantic("Only expecting T as flags")
        );
        assert_eq!(
            failure("sctp: DATA[flgs=BB, len=16, tsn=0, sid=0, ssn=0, ppid=0]"),
            ParseErrorKind::Semantic("B-bit specified multiple times")
        );
        assert_eq!(
            failure("sctp: DATA[flgs=Z, len=16, tsn=0, sid=0, ssn=0, ppid=0]"),
            ParseErrorKind::Semantic("Only expecting IUBE as flags")
        );
    }

    #[test]
    fn data_length_must_cover_the_header() {
        assert_eq!(
            failure("sctp: DATA[flgs=0, len=15, tsn=0, sid=0, ssn=0, ppid=0]"),
            ParseErrorKind::Semantic("length value out of range")
        );
    }

    #[test]
    fn heartbeats_and_cookies() {
        let parsed = chunks(
            "sctp: HEARTBEAT[flgs=0, HEARTBEAT_INFORMATION[len=8, val=[1, 2, 3, 4]]]; \
             HEARTBEAT_ACK[flgs=0, HEARTBEAT_INFORMATION[...]]; \
             COOKIE_ECHO[flgs=0, len=..., val=...]",
        );
        assert_eq!(
            parsed,
            vec![
                SctpChunk::Heartbeat(HeartbeatChunk {
                    flags: Field::Value(0),
                    info: vec![1, 2, 3, 4],
                }),
                SctpChunk::HeartbeatAck(HeartbeatChunk {
                    flags: Field::Value(0),
                    info: vec![],
                }),
                SctpChunk::CookieEcho(CookieEchoChunk {
                    flags: Field::Value(0),
                    cookie: Field::Wildcard,
                }),
            ]
        );
    }

    #[test]
    fn length_and_value_must_agree() {
        assert_eq!(
            failure("sctp: COOKIE_ECHO[flgs=0, len=9, val=[1, 2]]"),
            ParseErrorKind::Semantic("length value incompatible with val")
        );
        assert_eq!(
            failure("sctp: COOKIE_ECHO[flgs=0, len=..., val=[1, 2]]"),
            ParseErrorKind::Semantic("length needs to be specified")
        );
        assert_eq!(
            failure("sctp: HEARTBEAT[flgs=0, HEARTBEAT_INFORMATION[len=3, val=...]]"),
            ParseErrorKind::Semantic("length value out of range")
        );
    }

    #[test]
    fn shutdown_family() {
        assert_eq!(
            chunks(
                "sctp: SHUTDOWN[flgs=0, cum_tsn=5]; SHUTDOWN_ACK[flgs=...]; \
                 SHUTDOWN_COMPLETE[flgs=T]; COOKIE_ACK[flgs=0]"
            ),
            vec![
                SctpChunk::Shutdown(ShutdownChunk {
                    flags: Field::Value(0),
                    cum_tsn: Field::Value(5),
                }),
                SctpChunk::ShutdownAck {
                    flags: Field::Wildcard
                },
                SctpChunk::ShutdownComplete {
                    flags: Field::Value(FLAG_T_BIT)
                },
                SctpChunk::CookieAck {
                    flags: Field::Value(0)
                },
            ]
        );
    }

    #[test]
    fn errors_and_reconfiguration() {
        let parsed = chunks(
            "sctp: ERROR[flgs=0, INVALID_STREAM_IDENTIFIER[sid=7]]; \
             RECONFIG[flgs=0, OUTGOING_SSN_RESET[req_sn=0, resp_sn=..., last_tsn=..., sids=[1, 2]], \
             RECONFIG_RESPONSE[resp_sn=0, result=1]]",
        );
        assert_eq!(
            parsed,
            vec![
                SctpChunk::Error(ErrorChunk {
                    flags: Field::Value(0),
                    causes: vec![ErrorCause::InvalidStreamIdentifier(Field::Value(7))],
                }),
                SctpChunk::Reconfig(ReconfigChunk {
                    flags: Field::Value(0),
                    parameters: vec![
                        ReconfigParameter::OutgoingSsnReset {
                            request_seq: Field::Value(0),
                            response_seq: Field::Wildcard,
                            last_tsn: Field::Wildcard,
                            streams: vec![1, 2],
                        },
                        ReconfigParameter::Response {
                            response_seq: Field::Value(0),
                            result: Field::Value(1),
                            next_tsns: None,
                        },
                    ],
                }),
            ]
        );
    }

    #[test]
    fn range_errors_name_the_field() {
        assert_eq!(
            failure("sctp: INIT[flgs=0, tag=4294967296, a_rwnd=0, os=1, is=1, tsn=0]"),
            ParseErrorKind::Semantic("tag value out of range")
        );
        assert_eq!(
            failure("sctp: COOKIE_ACK[flgs=256]"),
            ParseErrorKind::Semantic("flags value out of range")
        );
        assert_eq!(
            failure("sctp: SACK[flgs=0, cum_tsn=0, a_rwnd=0, gaps=[1:65536], dups=[]]"),
            ParseErrorKind::Semantic("end value out of range")
        );
    }
}
