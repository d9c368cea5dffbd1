use super::{
    core_parser::{seconds, trailing_spaces, ws},
    packet_parser::packet,
    parsing_data::{semantic, ParseContext, ParseError, ParseErrorKind, Res},
    syscall_parser::{command, syscall},
};
use drill_core::{
    script::{EventKind, Script, TimeKind, TimeSpec},
    Config,
};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{map, opt, value},
    sequence::{pair, preceded, terminated},
};

/// Parses a script with default settings.
pub fn parse_script(input: &str) -> Result<Script, ParseError> {
    parse_script_with(input, Config::default()).map(|(script, _)| script)
}

/// Parses a script on top of `config`, returning the script and the
/// settings after its option block has been applied.
pub fn parse_script_with(input: &str, config: Config) -> Result<(Script, Config), ParseError> {
    let mut context = ParseContext::new(config);
    for line in input.lines() {
        context.next_line();
        parse_line(&mut context, line)?;
    }
    Ok(context.finish())
}

/// Parses one line of a script into `context`.
fn parse_line(context: &mut ParseContext, line: &str) -> Result<(), ParseError> {
    let text = strip_comment(line).trim();
    if text.is_empty() {
        return Ok(());
    }
    let nom_error = |e| context.error(ParseErrorKind::from_nom(e));
    if text.starts_with("--") {
        let (_, (name, value)) = option(text).map_err(nom_error)?;
        context.add_option(name, value)
    } else {
        let (_, (time, kind)) = event(text).map_err(nom_error)?;
        context.add_event(time, kind)
    }
}

/// Drops a `//` comment, leaving strings and commands alone.
fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    let mut previous = None;
    for (index, c) in line.char_indices() {
        match (quote, c) {
            (None, '"' | '`') => quote = Some(c),
            (Some(open), _) if c == open && previous != Some('\\') => quote = None,
            (None, '/') if previous == Some('/') => return &line[..index - 1],
            _ => {}
        }
        previous = Some(c);
    }
    line
}

/// `--name=value`, or `--name` alone for a switch
fn option(input: &str) -> Res<&str, (&str, &str)> {
    terminated(
        preceded(
            tag("--"),
            pair(
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
                map(
                    opt(preceded(char('='), take_while1(|c: char| !c.is_whitespace()))),
                    Option::unwrap_or_default,
                ),
            ),
        ),
        trailing_spaces,
    )(input)
}

fn event(input: &str) -> Res<&str, (TimeSpec, EventKind)> {
    let (input, time) = event_time(input)?;
    let (input, kind) = alt((
        map(ws(command), |command| EventKind::Command(command.to_string())),
        map(ws(packet), EventKind::Packet),
        map(syscall, EventKind::Syscall),
    ))(input)?;
    let (input, _) = trailing_spaces(input)?;
    Ok((input, (time, kind)))
}

/// `*`, `t`, `+t`, `a~b` or `+a~+b`, in seconds.
pub fn event_time(input: &str) -> Res<&str, TimeSpec> {
    alt((
        value(TimeSpec::any(), char('*')),
        negative_time,
        map(
            preceded(char('+'), pair(seconds, opt(preceded(tag("~+"), seconds)))),
            |(time, end)| match end {
                Some(end) => TimeSpec::range(TimeKind::RelativeRange, time, end),
                None => TimeSpec::new(TimeKind::Relative, time),
            },
        ),
        map(
            pair(seconds, opt(preceded(char('~'), seconds))),
            |(time, end)| match end {
                Some(end) => TimeSpec::range(TimeKind::AbsoluteRange, time, end),
                None => TimeSpec::new(TimeKind::Absolute, time),
            },
        ),
    ))(input)
}

fn negative_time(input: &str) -> Res<&str, TimeSpec> {
    let _ = pair(opt(char('+')), char('-'))(input)?;
    semantic(input, "negative time")
}
