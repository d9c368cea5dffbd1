//! Syscall events, `accept(3, ..., ...) = 4`, and the expressions in them.

use super::{
    core_parser::{ellipsis, integer, quoted, seconds, sym, word, ws},
    parsing_data::{semantic, Res},
};
use drill_core::{
    expression::{
        SctpAddStreams, SctpAssocParams, SctpAssocVal, SctpInitmsg, SctpPeerAddrParams,
        SctpResetStreams, SctpRtoInfo, SctpSackInfo, SctpSndRcvInfo, SctpStatus,
    },
    script::SyscallSpec,
    Expression,
};
use nom::{
    branch::alt,
    bytes::complete::take_until,
    character::complete::{char, space0},
    combinator::{map, opt, value},
    multi::{fold_many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair},
};

/// `[...end] name(args) = result [ERRNO] [(note)]`
pub fn syscall(input: &str) -> Res<&str, SyscallSpec> {
    let (input, end_time) = opt(preceded(pair(space0, ellipsis), seconds))(input)?;
    let (input, name) = ws(word)(input)?;
    let (input, arguments) = delimited(
        sym('('),
        separated_list0(sym(','), expression),
        sym(')'),
    )(input)?;
    let (input, result) = preceded(sym('='), expression)(input)?;
    let (input, errno) = opt(ws(word))(input)?;
    let (input, note) = opt(ws(delimited(char('('), take_until(")"), char(')'))))(input)?;
    Ok((
        input,
        SyscallSpec {
            name: name.to_string(),
            arguments,
            result,
            errno: errno.map(str::to_string),
            note: note.map(|note: &str| note.trim().to_string()),
            end_time,
        },
    ))
}

/// Terms joined with `|`.
pub fn expression(input: &str) -> Res<&str, Expression> {
    let (input, first) = ws(term)(input)?;
    fold_many0(
        preceded(char('|'), ws(term)),
        move || first.clone(),
        |lhs, rhs| Expression::Binary("|".to_string(), Box::new(lhs), Box::new(rhs)),
    )(input)
}

fn term(input: &str) -> Res<&str, Expression> {
    alt((
        value(Expression::Ellipsis, ellipsis),
        map(integer, Expression::Integer),
        map(word, |word| Expression::Word(word.to_string())),
        map(quoted, |string| Expression::String(string.to_string())),
        map(
            delimited(sym('['), separated_list0(sym(','), expression), sym(']')),
            Expression::List,
        ),
        structure,
    ))(input)
}

/// `{member=value, ...}`. Which socket option structure is meant follows
/// from the member names.
fn structure(input: &str) -> Res<&str, Expression> {
    let (rest, members) = delimited(
        sym('{'),
        separated_list1(sym(','), separated_pair(ws(word), char('='), expression)),
        sym('}'),
    )(input)?;
    let members = members
        .into_iter()
        .map(|(member, value)| (member.to_string(), value))
        .collect();
    match option_structure(members) {
        Some(structure) => Ok((rest, structure)),
        None => semantic(input, "unrecognized structure members"),
    }
}

/// Picks the first structure that has every member named.
fn option_structure(members: Vec<(String, Expression)>) -> Option<Expression> {
    macro_rules! first_fit {
        ($($kind:ident),+) => {
            $(
                if members.iter().all(|(member, _)| $kind::MEMBERS.contains(&member.as_str())) {
                    return $kind::from_members(members)
                        .ok()
                        .map(|structure| Expression::$kind(Box::new(structure)));
                }
            )+
        };
    }
    first_fit!(
        SctpInitmsg,
        SctpRtoInfo,
        SctpSackInfo,
        SctpAssocVal,
        SctpAssocParams,
        SctpPeerAddrParams,
        SctpStatus,
        SctpSndRcvInfo,
        SctpResetStreams,
        SctpAddStreams
    );
    None
}

/// `` `command` ``
pub fn command(input: &str) -> Res<&str, &str> {
    delimited(char('`'), take_until("`"), char('`'))(input)
}
