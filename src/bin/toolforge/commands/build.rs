//! `toolforge build` command

use anyhow::Result;

use crate::cli::Cli;
use toolforge::ops::build;

pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = super::context(cli)?;
    let built = build(&ctx)?;

    if cli.verbose {
        for (id, result) in &built.results.results {
            println!("{:<24} {}", id.to_string(), result.static_.display());
        }
        for (id, reason) in &built.results.skipped {
            println!("{:<24} skipped: {}", id.to_string(), reason);
        }
    }
    Ok(())
}
