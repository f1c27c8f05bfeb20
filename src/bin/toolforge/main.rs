//! Toolforge CLI - a phase-aware build driver for self-hosting compilers

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("toolforge=debug")
    } else {
        EnvFilter::new("toolforge=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Configure => commands::configure::execute(&cli),
        Commands::Build => commands::build::execute(&cli),
        Commands::Test => commands::test::execute(&cli),
        Commands::Doc => commands::doc::execute(&cli),
        Commands::Speed => commands::speed::execute(&cli),
        Commands::Install => commands::install::execute(&cli),
        Commands::Dist => commands::dist::execute(&cli),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
