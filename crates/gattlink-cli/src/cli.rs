//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};
use gattlink_core::{uuid_from_u16, Uuid};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Device address (AA:BB:CC:DD:EE:FF)
    #[arg(short, long)]
    pub mac: Option<String>,

    /// Address type: public, random or unspecified
    #[arg(short = 't', long)]
    pub address_type: Option<String>,

    /// Extra session option as key=value, may be repeated
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Print the device information service
    Info,
    /// List discovered services and characteristics
    Services,
    /// Read a characteristic value
    Read {
        /// Service UUID (16-bit short form or full)
        #[arg(value_parser = parse_uuid)]
        service: Uuid,
        /// Characteristic UUID (16-bit short form or full)
        #[arg(value_parser = parse_uuid)]
        characteristic: Uuid,
    },
    /// Write a hex encoded value to a characteristic
    Write {
        #[arg(value_parser = parse_uuid)]
        service: Uuid,
        #[arg(value_parser = parse_uuid)]
        characteristic: Uuid,
        /// Value as hex, e.g. 0102ff
        value: String,
        /// Do not wait for the device acknowledgement
        #[arg(long)]
        no_response: bool,
    },
    /// Print notifications from a characteristic
    Notify {
        #[arg(value_parser = parse_uuid)]
        service: Uuid,
        #[arg(value_parser = parse_uuid)]
        characteristic: Uuid,
        /// Stop after this many notifications
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },
}

/// Parse a UUID given either as a 16-bit assigned number or in full
pub fn parse_uuid(value: &str) -> Result<Uuid, String> {
    let short = value.trim_start_matches("0x");
    if short.len() == 4 {
        return u16::from_str_radix(short, 16)
            .map(uuid_from_u16)
            .map_err(|_| format!("invalid 16-bit uuid '{}'", value));
    }
    Uuid::parse_str(value).map_err(|e| format!("invalid uuid '{}': {}", value, e))
}

/// Split a `key=value` option
pub fn parse_option(option: &str) -> Option<(String, String)> {
    let (key, value) = option.split_once('=')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}
