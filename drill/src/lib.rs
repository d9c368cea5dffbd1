//! Script front end for the conformance engine in `drill_core`: the script
//! parser and the command line.

pub mod cli;
pub mod parsing;

pub use parsing::{parse_script, parse_script_with, ParseError};
