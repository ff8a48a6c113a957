mod bench_cmd;
mod cli;
mod config;
mod convert;
mod logging;
mod probe_cmd;

use std::process;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Probe(args) => probe_cmd::run(args),
        Command::Bench(args) => bench_cmd::run(args),
    }
}
