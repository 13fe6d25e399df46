// SPDX-License-Identifier: AGPL-3.0

//! evmscan - a symbolic-execution security scanner for Solidity contracts.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod analyze;
mod disassemble;
mod version;

#[derive(Parser)]
#[command(name = "evmscan", about = "Solidity security scanner based on symbolic execution")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Scan a Solidity file for vulnerabilities.
    Analyze {
        /// The Solidity source file to analyze.
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the disassembled runtime and creation code of a Solidity file.
    Disassemble {
        /// The Solidity source file to disassemble.
        #[arg(long)]
        file: PathBuf,
    },
    /// Show build information.
    Version,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        CliCommand::Analyze { file } => analyze::run(&file),
        CliCommand::Disassemble { file } => disassemble::run(&file),
        CliCommand::Version => version::run(),
    }
}
