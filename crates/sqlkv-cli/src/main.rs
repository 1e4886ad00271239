//! sqlkv - Main Entry Point
//!
//! Usage:
//!     sqlkv /tmp/demo.kv set hello world
//!     sqlkv /tmp/demo.kv get hello
//!     sqlkv /tmp/demo.kv -t other del hello

use std::io;
use std::process::ExitCode;

use clap::Parser;
use sqlkv_cli::{logging, run, Cli};
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let stdout = io::stdout();
    match run(&cli, &mut stdout.lock()) {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            error!(%err, db_uri = %cli.db_uri, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
