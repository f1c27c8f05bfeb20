//! `toolforge install` command

use anyhow::Result;

use crate::cli::Cli;
use toolforge::ops::install;

pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = super::context(cli)?;
    let report = install(&ctx)?;

    println!("installed libraries into {}", report.lib_dir.display());
    for bin in &report.bins {
        println!("installed {}", bin.display());
    }
    Ok(())
}
