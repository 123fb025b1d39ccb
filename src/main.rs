#![allow(clippy::type_complexity)]

use std::process::ExitCode;

use clap::Parser;
use medlayers::cli::{self, CliArgs};
use medlayers::logger;

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = CliArgs::parse();
    cli::run(args)
}
