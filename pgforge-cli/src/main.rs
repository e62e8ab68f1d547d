#![doc = include_str!("../README.md")]

mod args;
mod cli;
mod command;
mod runner;

use std::process::ExitCode;

use clap::Parser;
use miette::Result;

fn main() -> Result<ExitCode> {
    simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Info).env().init().expect("installing the logger failed");

    // Ignore SIGINT/TERM/HUP in the CLI itself; the child `postgres`/`pg_ctl`
    // processes we invoke receive and handle these directly.
    ctrlc::set_handler(|| ()).expect("installing the Ctrl-C handler failed");

    let cli = cli::Cli::parse();
    match cli.command {
        cli::Command::Instance(instance) => instance.invoke(),
        cli::Command::Test(test) => test.invoke(),
    }
}
