use clap::{Parser, Subcommand};

use crate::command;

/// Download, install, and orchestrate local PostgreSQL clusters.
#[derive(Parser)]
#[clap(author, version, about = "Download, install, and orchestrate local PostgreSQL clusters", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Acquire, validate, or remove a PostgreSQL instance.
    #[clap(display_order = 1)]
    Instance(command::instance::InstanceCommand),

    /// Bring a cluster up through its full lifecycle, confirm it works,
    /// then tear it back down.
    #[clap(display_order = 2)]
    Test(command::test::Test),
}
