//! gattlink CLI library
//!
//! This library provides the building blocks of the `gattlink` command-line
//! client: argument parsing, configuration loading and the command handlers
//! that drive a GATT session.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::CliConfig;
pub use error::{CliError, Result};
