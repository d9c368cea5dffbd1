//! Run-wide settings.

use crate::protocols::{
    ipv4::{AddressParseError, Ipv4Address},
    utility::Endpoint,
};
use std::num::ParseIntError;
use thiserror::Error as ThisError;

/// Settings shared by the parser, builders and runner of one script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Where the stack under test lives
    pub local: Endpoint,
    /// The scripted peer
    pub remote: Endpoint,
    /// How far a live event may drift from its scripted time
    pub tolerance_usecs: u64,
    pub mtu: u16,
    /// Abort the run on unknown or malformed syscalls instead of skipping them
    pub strict_syscalls: bool,
}

impl Config {
    pub const DEFAULT_TOLERANCE_USECS: u64 = 75_000;

    /// Applies one `--name=value` setting from a script's option block.
    pub fn apply_option(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            "tolerance_usecs" => self.tolerance_usecs = parse_number(name, value)?,
            "local_ip" => self.local.address = value.parse()?,
            "remote_ip" => self.remote.address = value.parse()?,
            "local_port" => self.local.port = parse_number(name, value)?,
            "remote_port" => self.remote.port = parse_number(name, value)?,
            "mtu" => self.mtu = parse_number(name, value)?,
            "strict_syscalls" => {
                self.strict_syscalls = match value {
                    "" | "1" | "true" | "yes" => true,
                    "0" | "false" | "no" => false,
                    _ => Err(ConfigError::InvalidValue {
                        name: name.to_string(),
                        value: value.to_string(),
                    })?,
                }
            }
            _ => Err(ConfigError::UnknownOption(name.to_string()))?,
        }
        Ok(())
    }

    /// Applies a script's option block on top of these settings.
    pub fn with_options<'a>(
        mut self,
        options: impl IntoIterator<Item = &'a (String, String)>,
    ) -> Result<Self, ConfigError> {
        for (name, value) in options {
            self.apply_option(name, value)?;
        }
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local: Endpoint::new(Ipv4Address::new([192, 168, 0, 1]), 8080),
            remote: Endpoint::new(Ipv4Address::new([192, 0, 2, 1]), 9090),
            tolerance_usecs: Self::DEFAULT_TOLERANCE_USECS,
            mtu: 1500,
            strict_syscalls: false,
        }
    }
}

fn parse_number<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown option: --{0}")]
    UnknownOption(String),
    #[error("invalid value '{value}' for option --{name}")]
    InvalidValue { name: String, value: String },
    #[error("{0}")]
    Address(#[from] AddressParseError),
}
