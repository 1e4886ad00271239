//! Command line access to a sqlkv store.
//!
//! ```text
//! sqlkv DB_URI [-t TABLE] get KEY
//! sqlkv DB_URI [-t TABLE] set KEY VALUE
//! sqlkv DB_URI [-t TABLE] del KEY
//! ```
//!
//! `get` and `del` exit with status 1 and print nothing when the key is
//! missing. Keys given on the command line are text keys; `set` stores the
//! value as a JSON string.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use sqlkv::config::DEFAULT_TABLE;
use sqlkv::{IfLocked, KvConfig, KvError, Mapping, SqliteKv};
use thiserror::Error;
use tracing::debug;

pub mod logging;

#[derive(Parser, Debug)]
#[command(name = "sqlkv")]
#[command(about = "Key-value store backed by SQLite")]
#[command(version)]
pub struct Cli {
    /// Database filename or URI
    pub db_uri: String,

    /// Table name
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    pub table: String,

    /// Seconds to wait for another process holding the database lock
    #[arg(long, value_parser = parse_timeout, default_value = "5")]
    pub timeout: Duration,

    /// Log level used when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get the value for a key
    Get { key: String },
    /// Set a value for a key
    Set { key: String, value: String },
    /// Delete a key
    Del { key: String },
}

impl Cli {
    /// Store options derived from the flags
    pub fn config(&self) -> KvConfig {
        KvConfig::new()
            .with_table(&self.table)
            .with_timeout(self.timeout)
    }
}

/// Errors that end the process with a diagnostic
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Store(#[from] KvError),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Result of a successfully executed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The addressed key does not exist
    Missing,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Done => ExitCode::SUCCESS,
            Outcome::Missing => ExitCode::from(1),
        }
    }
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|e| format!("invalid number of seconds '{s}': {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid timeout '{s}': {e}"))
}

/// Execute `cli` against its store, writing printed values to `out`.
pub fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<Outcome, CliError> {
    let mut kv = SqliteKv::open_with(&cli.db_uri, cli.config())?;
    debug!(command = ?cli.command, db_uri = %cli.db_uri, "running command");

    let outcome = execute(&kv, &cli.command, out)?;
    kv.close(IfLocked::Raise)?;
    Ok(outcome)
}

fn execute<W: Write>(kv: &SqliteKv, command: &Command, out: &mut W) -> Result<Outcome, CliError> {
    match command {
        Command::Get { key } => match kv.get(key)? {
            None => Ok(Outcome::Missing),
            Some(Value::String(text)) => {
                writeln!(out, "{text}")?;
                Ok(Outcome::Done)
            }
            Some(value) => {
                writeln!(out, "{value}")?;
                Ok(Outcome::Done)
            }
        },
        Command::Set { key, value } => {
            kv.set(key, &Value::String(value.clone()))?;
            Ok(Outcome::Done)
        }
        Command::Del { key } => match kv.delete(key) {
            Ok(()) => Ok(Outcome::Done),
            Err(KvError::NotFound(_)) => Ok(Outcome::Missing),
            Err(err) => Err(err.into()),
        },
    }
}
