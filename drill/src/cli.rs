//! Parses the command line arguments.
//!
//! Checks a script and prints the events it resolves to:
//!
//! ```cargo run -- tests/scripts/passive_open.pkt --log```

use crate::parsing::{parse_script_with, ParseError};
use clap::Parser;
use drill_core::{protocols::ipv4::Ipv4Address, Config, Script};
use std::{
    fs::{create_dir_all, OpenOptions},
    io,
    sync::Arc,
};
use thiserror::Error as ThisError;
use tracing_subscriber::FmtSubscriber;

/// Stores the different command line arguments.
#[derive(Parser, Debug)]
#[command(version, about = "Checks a conformance script and lists its events")]
pub struct Args {
    /// The script to check
    pub script: String,
    /// Logging flag. Used to turn logging on or off.
    #[arg(short, long)]
    pub log: bool,
    /// How far live events may drift from their scripted time
    #[arg(long)]
    pub tolerance_usecs: Option<u64>,
    #[arg(long)]
    pub local_ip: Option<Ipv4Address>,
    #[arg(long)]
    pub remote_ip: Option<Ipv4Address>,
    #[arg(long)]
    pub local_port: Option<u16>,
    #[arg(long)]
    pub remote_port: Option<u16>,
    #[arg(long)]
    pub mtu: Option<u16>,
    /// Stop at unknown or malformed syscalls instead of skipping them
    #[arg(long)]
    pub strict_syscalls: bool,
}

impl Args {
    /// Settings from the command line. A script's own options are applied
    /// on top of these.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(tolerance) = self.tolerance_usecs {
            config.tolerance_usecs = tolerance;
        }
        if let Some(ip) = self.local_ip {
            config.local.address = ip;
        }
        if let Some(ip) = self.remote_ip {
            config.remote.address = ip;
        }
        if let Some(port) = self.local_port {
            config.local.port = port;
        }
        if let Some(port) = self.remote_port {
            config.remote.port = port;
        }
        if let Some(mtu) = self.mtu {
            config.mtu = mtu;
        }
        config.strict_syscalls |= self.strict_syscalls;
        config
    }
}

/// Parses command line arguments and checks the script they name.
pub async fn initialize_from_arguments() -> Result<(), CliError> {
    let args = Args::parse();
    if args.log {
        initialize_logging()?;
    }
    let (script, config) = check_script(&args).await?;
    print!("{}", describe(&script, &config));
    Ok(())
}

/// Reads and parses the script named by `args`, returning it along with
/// the final settings.
pub async fn check_script(args: &Args) -> Result<(Script, Config), CliError> {
    let contents = tokio::fs::read_to_string(&args.script)
        .await
        .map_err(CliError::Script)?;
    Ok(parse_script_with(&contents, args.config())?)
}

/// A listing of the settings and every event, one per line.
pub fn describe(script: &Script, config: &Config) -> String {
    let mut out = format!(
        "local {} remote {} tolerance {}us mtu {}{}\n",
        config.local,
        config.remote,
        config.tolerance_usecs,
        config.mtu,
        if config.strict_syscalls { " strict" } else { "" },
    );
    for event in script.events.iter() {
        out.push_str(&format!("{:>4}: {}\n", event.line, event));
    }
    out
}

/// Initializes the event protocol. Only should be called once when the run starts.
/// Allows for event! to be called and writes to a log file in ./logs.
fn initialize_logging() -> Result<(), CliError> {
    let main_path = "./logs";
    create_dir_all(main_path)?;
    let file_path = format!(
        "{}/debug-{}.log",
        main_path,
        chrono::offset::Local::now().format("%y-%m-%d_%H-%M-%S")
    );
    let file = OpenOptions::new()
        .write(true)
        .append(true)
        .create(true)
        .open(file_path)?;
    let subscriber = FmtSubscriber::builder()
        .with_writer(Arc::new(file))
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| CliError::LoggingAlreadySet)
}

#[derive(Debug, ThisError)]
pub enum CliError {
    #[error("Could not read the script: {0}")]
    Script(io::Error),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("Could not open the log file: {0}")]
    Log(#[from] io::Error),
    #[error("A logger is already installed")]
    LoggingAlreadySet,
}
