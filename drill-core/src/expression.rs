//! Script expressions and their evaluation.
//!
//! The parser produces [`Expression`] trees in which symbols are still words
//! and strings still carry their escapes. [`evaluate`] resolves those against
//! a [`SymbolTable`] into a second tree that syscall handlers consume.

use crate::symbols::SymbolTable;
use itertools::Itertools;
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// A value appearing in a syscall argument list or result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Integer(i64),
    /// A symbolic constant such as `AF_INET`
    Word(String),
    String(String),
    List(Vec<Expression>),
    /// `...`, the value is not specified and must not be checked
    Ellipsis,
    Binary(String, Box<Expression>, Box<Expression>),
    SctpInitmsg(Box<SctpInitmsg>),
    SctpRtoInfo(Box<SctpRtoInfo>),
    SctpSackInfo(Box<SctpSackInfo>),
    SctpAssocVal(Box<SctpAssocVal>),
    SctpAssocParams(Box<SctpAssocParams>),
    SctpPeerAddrParams(Box<SctpPeerAddrParams>),
    SctpStatus(Box<SctpStatus>),
    SctpSndRcvInfo(Box<SctpSndRcvInfo>),
    SctpResetStreams(Box<SctpResetStreams>),
    SctpAddStreams(Box<SctpAddStreams>),
}

impl Expression {
    pub fn integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_ellipsis(&self) -> bool {
        matches!(self, Self::Ellipsis)
    }

    /// A short name for the kind of expression, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Word(_) => "symbol",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Ellipsis => "ellipsis",
            Self::Binary(..) => "binary expression",
            Self::SctpInitmsg(_) => "sctp_initmsg",
            Self::SctpRtoInfo(_) => "sctp_rtoinfo",
            Self::SctpSackInfo(_) => "sctp_sack_info",
            Self::SctpAssocVal(_) => "sctp_assoc_value",
            Self::SctpAssocParams(_) => "sctp_assocparams",
            Self::SctpPeerAddrParams(_) => "sctp_paddrparams",
            Self::SctpStatus(_) => "sctp_status",
            Self::SctpSndRcvInfo(_) => "sctp_sndrcvinfo",
            Self::SctpResetStreams(_) => "sctp_reset_streams",
            Self::SctpAddStreams(_) => "sctp_add_streams",
        }
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Word(word) => write!(f, "{word}"),
            Self::String(string) => write!(f, "\"{string}\""),
            Self::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Self::Ellipsis => write!(f, "..."),
            Self::Binary(op, lhs, rhs) => write!(f, "{lhs}{op}{rhs}"),
            Self::SctpInitmsg(inner) => inner.fmt(f),
            Self::SctpRtoInfo(inner) => inner.fmt(f),
            Self::SctpSackInfo(inner) => inner.fmt(f),
            Self::SctpAssocVal(inner) => inner.fmt(f),
            Self::SctpAssocParams(inner) => inner.fmt(f),
            Self::SctpPeerAddrParams(inner) => inner.fmt(f),
            Self::SctpStatus(inner) => inner.fmt(f),
            Self::SctpSndRcvInfo(inner) => inner.fmt(f),
            Self::SctpResetStreams(inner) => inner.fmt(f),
            Self::SctpAddStreams(inner) => inner.fmt(f),
        }
    }
}

/// Declares a socket option structure whose members are all expressions.
///
/// Every member defaults to [`Expression::Ellipsis`]. `from_members` accepts
/// members by their C name in any order and rejects names the structure
/// does not have.
macro_rules! option_struct {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            $(pub $field: Expression,)+
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $($field: Expression::Ellipsis,)+
                }
            }
        }

        impl $name {
            pub const MEMBERS: &'static [&'static str] = &[$(stringify!($field)),+];

            pub fn from_members(
                members: impl IntoIterator<Item = (String, Expression)>,
            ) -> Result<Self, UnknownMember> {
                let mut out = Self::default();
                for (member, value) in members {
                    match member.as_str() {
                        $(stringify!($field) => out.$field = value,)+
                        _ => Err(UnknownMember {
                            structure: stringify!($name),
                            member,
                        })?,
                    }
                }
                Ok(out)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let members = [$((stringify!($field), &self.$field)),+];
                write!(
                    f,
                    "{{{}}}",
                    members
                        .iter()
                        .map(|(name, value)| format!("{name}={value}"))
                        .join(", ")
                )
            }
        }
    };
}

option_struct!(
    /// `struct sctp_initmsg`
    SctpInitmsg {
        sinit_num_ostreams,
        sinit_max_instreams,
        sinit_max_attempts,
        sinit_max_init_timeo,
    }
);

option_struct!(
    /// `struct sctp_rtoinfo`
    SctpRtoInfo {
        srto_assoc_id,
        srto_initial,
        srto_max,
        srto_min,
    }
);

option_struct!(
    /// `struct sctp_sack_info`
    SctpSackInfo {
        sack_assoc_id,
        sack_delay,
        sack_freq,
    }
);

option_struct!(
    /// `struct sctp_assoc_value`
    SctpAssocVal {
        assoc_id,
        assoc_value,
    }
);

option_struct!(
    /// `struct sctp_assocparams`
    SctpAssocParams {
        sasoc_assoc_id,
        sasoc_asocmaxrxt,
        sasoc_number_peer_destinations,
        sasoc_peer_rwnd,
        sasoc_local_rwnd,
        sasoc_cookie_life,
    }
);

option_struct!(
    /// `struct sctp_paddrparams`
    SctpPeerAddrParams {
        spp_assoc_id,
        spp_address,
        spp_hbinterval,
        spp_pathmaxrxt,
        spp_pathmtu,
        spp_flags,
        spp_ipv6_flowlabel,
        spp_dscp,
    }
);

option_struct!(
    /// `struct sctp_status`
    SctpStatus {
        sstat_assoc_id,
        sstat_state,
        sstat_rwnd,
        sstat_unackdata,
        sstat_penddata,
        sstat_instrms,
        sstat_outstrms,
        sstat_fragmentation_point,
        sstat_primary,
    }
);

option_struct!(
    /// `struct sctp_sndrcvinfo`
    SctpSndRcvInfo {
        sinfo_stream,
        sinfo_ssn,
        sinfo_flags,
        sinfo_ppid,
        sinfo_context,
        sinfo_timetolive,
        sinfo_tsn,
        sinfo_cumtsn,
        sinfo_assoc_id,
    }
);

option_struct!(
    /// `struct sctp_reset_streams`
    SctpResetStreams {
        srs_assoc_id,
        srs_flags,
        srs_number_streams,
        srs_stream_list,
    }
);

option_struct!(
    /// `struct sctp_add_streams`
    SctpAddStreams {
        sas_assoc_id,
        sas_instrms,
        sas_outstrms,
    }
);

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
#[error("{structure} has no member named {member}")]
pub struct UnknownMember {
    pub structure: &'static str,
    pub member: String,
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("unsupported escape code: '\\{0}'")]
    BadEscape(char),
    #[error("bad binary expression: {0}")]
    BadBinaryExpr(String),
}

/// Resolves symbols to integers, unescapes strings and folds `|`
/// expressions. Socket option structures pass through untouched; their
/// consumers read the members they need.
pub fn evaluate(expression: &Expression, symbols: &SymbolTable) -> Result<Expression, EvalError> {
    Ok(match expression {
        Expression::Integer(value) => Expression::Integer(*value),
        Expression::Word(word) => Expression::Integer(
            symbols
                .lookup(word)
                .ok_or_else(|| EvalError::UnknownSymbol(word.clone()))?,
        ),
        Expression::String(string) => Expression::String(unescape(string)?),
        Expression::Binary(op, lhs, rhs) => {
            let lhs = evaluate(lhs, symbols)?;
            let rhs = evaluate(rhs, symbols)?;
            match (op.as_str(), &lhs, &rhs) {
                ("|", Expression::Integer(lhs), Expression::Integer(rhs)) => {
                    Expression::Integer(lhs | rhs)
                }
                ("|", _, _) => Err(EvalError::BadBinaryExpr(format!(
                    "'|' needs integer operands, got {} and {}",
                    lhs.kind_name(),
                    rhs.kind_name()
                )))?,
                (op, _, _) => Err(EvalError::BadBinaryExpr(format!("unsupported operator '{op}'")))?,
            }
        }
        Expression::List(items) => Expression::List(
            items
                .iter()
                .map(|item| evaluate(item, symbols))
                .collect::<Result<_, _>>()?,
        ),
        other => other.clone(),
    })
}

/// Evaluates each expression of an argument list in order.
pub fn evaluate_all(
    expressions: &[Expression],
    symbols: &SymbolTable,
) -> Result<Vec<Expression>, EvalError> {
    expressions
        .iter()
        .map(|expression| evaluate(expression, symbols))
        .collect()
}

fn unescape(input: &str) -> Result<String, EvalError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some(other) => Err(EvalError::BadEscape(other))?,
            None => Err(EvalError::BadEscape('\\'))?,
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(name: &str) -> Expression {
        Expression::Word(name.to_string())
    }

    #[test]
    fn resolves_symbols() {
        let symbols = SymbolTable::linux();
        assert_eq!(
            evaluate(&word("AF_INET"), &symbols),
            Ok(Expression::Integer(2))
        );
        assert_eq!(
            evaluate(&word("NOT_A_SYMBOL"), &symbols),
            Err(EvalError::UnknownSymbol("NOT_A_SYMBOL".to_string()))
        );
    }

    #[test]
    fn ors_integers() {
        let symbols = SymbolTable::linux();
        let expression = Expression::Binary(
            "|".to_string(),
            Box::new(word("SPP_HB_ENABLE")),
            Box::new(Expression::Integer(8)),
        );
        assert_eq!(evaluate(&expression, &symbols), Ok(Expression::Integer(1 | 8)));
    }

    #[test]
    fn rejects_bad_binary_expressions() {
        let symbols = SymbolTable::linux();
        let not_or = Expression::Binary(
            "&".to_string(),
            Box::new(Expression::Integer(1)),
            Box::new(Expression::Integer(3)),
        );
        assert!(matches!(
            evaluate(&not_or, &symbols),
            Err(EvalError::BadBinaryExpr(_))
        ));
        let with_string = Expression::Binary(
            "|".to_string(),
            Box::new(Expression::Integer(1)),
            Box::new(Expression::String("x".to_string())),
        );
        assert!(matches!(
            evaluate(&with_string, &symbols),
            Err(EvalError::BadBinaryExpr(_))
        ));
    }

    #[test]
    fn unescapes_strings() {
        let symbols = SymbolTable::linux();
        let input = Expression::String(r#"a\tb\n\"c\"\\"#.to_string());
        assert_eq!(
            evaluate(&input, &symbols),
            Ok(Expression::String("a\tb\n\"c\"\\".to_string()))
        );
        assert_eq!(
            evaluate(&Expression::String(r"\q".to_string()), &symbols),
            Err(EvalError::BadEscape('q'))
        );
    }

    #[test]
    fn list_stops_at_first_failure() {
        let symbols = SymbolTable::linux();
        let list = Expression::List(vec![
            Expression::Integer(1),
            word("BOGUS_ONE"),
            word("BOGUS_TWO"),
        ]);
        assert_eq!(
            evaluate(&list, &symbols),
            Err(EvalError::UnknownSymbol("BOGUS_ONE".to_string()))
        );
        let list = Expression::List(vec![word("SOCK_STREAM"), Expression::Ellipsis]);
        assert_eq!(
            evaluate(&list, &symbols),
            Ok(Expression::List(vec![Expression::Integer(1), Expression::Ellipsis]))
        );
    }

    #[test]
    fn structures_pass_through() {
        let symbols = SymbolTable::linux();
        let initmsg = SctpInitmsg::from_members([
            ("sinit_num_ostreams".to_string(), Expression::Integer(3)),
            ("sinit_max_instreams".to_string(), word("UNRESOLVED")),
        ])
        .unwrap();
        let expression = Expression::SctpInitmsg(Box::new(initmsg));
        assert_eq!(evaluate(&expression, &symbols), Ok(expression.clone()));
    }

    #[test]
    fn rejects_unknown_members() {
        let err = SctpAddStreams::from_members([("sas_bogus".to_string(), Expression::Ellipsis)])
            .unwrap_err();
        assert_eq!(err.structure, "SctpAddStreams");
        assert_eq!(err.member, "sas_bogus");
    }
}
