//! Tokens shared by every part of the script grammar.

use super::parsing_data::{semantic, Res};
use drill_core::{
    field::Field,
    script::{Micros, MICROS_PER_SECOND},
};
use nom::{
    branch::alt,
    bytes::complete::{escaped, is_not, tag, tag_no_case},
    character::complete::{alpha1, alphanumeric1, anychar, char, digit1, hex_digit1, space0},
    combinator::{eof, map, map_res, opt, recognize, value},
    multi::{many0_count, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

/// Wraps a parser so it may be surrounded by spaces or tabs.
pub fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> Res<&'a str, O>,
) -> impl FnMut(&'a str) -> Res<&'a str, O> {
    delimited(space0, inner, space0)
}

/// A single punctuation character with optional spacing around it.
pub fn sym<'a>(c: char) -> impl FnMut(&'a str) -> Res<&'a str, char> {
    ws(char(c))
}

pub fn ellipsis(input: &str) -> Res<&str, ()> {
    value((), tag("..."))(input)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn word(input: &str) -> Res<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

pub fn decimal(input: &str) -> Res<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |n: &str| {
        n.parse::<i64>()
    })(input)
}

pub fn hex(input: &str) -> Res<&str, i64> {
    map_res(preceded(tag_no_case("0x"), hex_digit1), |digits| {
        i64::from_str_radix(digits, 16)
    })(input)
}

/// A decimal or hexadecimal integer.
pub fn integer(input: &str) -> Res<&str, i64> {
    alt((hex, decimal))(input)
}

/// An integer that has to fit in `T`, failing with `message` when it does
/// not.
pub fn bounded<'a, T: TryFrom<i64>>(
    message: &'static str,
) -> impl FnMut(&'a str) -> Res<&'a str, T> {
    move |input| {
        let (rest, number) = integer(input)?;
        match T::try_from(number) {
            Ok(number) => Ok((rest, number)),
            Err(_) => semantic(input, message),
        }
    }
}

/// A value that may be left unchecked with `...`.
pub fn wild<'a, T>(
    inner: impl FnMut(&'a str) -> Res<&'a str, T>,
) -> impl FnMut(&'a str) -> Res<&'a str, Field<T>> {
    alt((map(ellipsis, |_| Field::Wildcard), map(inner, Field::Value)))
}

/// `name=value`, where the value may be `...`.
pub fn field<'a, T: TryFrom<i64>>(
    name: &'static str,
    message: &'static str,
) -> impl FnMut(&'a str) -> Res<&'a str, Field<T>> {
    preceded(pair(ws(tag(name)), sym('=')), wild(bounded(message)))
}

/// Seconds with an optional fraction (`1`, `1.5`, `.5`), as microseconds. The fraction keeps
/// microsecond precision; further digits are dropped.
pub fn seconds(input: &str) -> Res<&str, Micros> {
    map_res(
        alt((
            pair(digit1, opt(preceded(char('.'), digit1))),
            map(preceded(char('.'), digit1), |fraction| ("0", Some(fraction))),
        )),
        |(whole, fraction): (&str, Option<&str>)| {
            let whole: Micros = whole.parse()?;
            let fraction = fraction.unwrap_or("");
            let mut micros = 0;
            for place in 0..6 {
                let digit = fraction.as_bytes().get(place).map_or(0, |d| d - b'0');
                micros = micros * 10 + Micros::from(digit);
            }
            whole
                .checked_mul(MICROS_PER_SECOND)
                .and_then(|whole| whole.checked_add(micros))
                .ok_or(SecondsOverflow)
        },
    )(input)
}

#[derive(Debug)]
pub struct SecondsOverflow;

impl From<std::num::ParseIntError> for SecondsOverflow {
    fn from(_: std::num::ParseIntError) -> Self {
        Self
    }
}

/// `[b, b, ...]` of byte values.
pub fn byte_list(input: &str) -> Res<&str, Vec<u8>> {
    delimited(
        sym('['),
        separated_list0(sym(','), ws(bounded("byte value out of range"))),
        sym(']'),
    )(input)
}

/// A double-quoted string with its escapes left in place.
pub fn quoted(input: &str) -> Res<&str, &str> {
    alt((
        value("", tag("\"\"")),
        delimited(
            char('"'),
            escaped(is_not("\"\\"), '\\', anychar),
            char('"'),
        ),
    ))(input)
}

/// Trailing spaces, then nothing.
pub fn trailing_spaces(input: &str) -> Res<&str, ()> {
    value((), terminated(space0, eof))(input)
}
