//! `toolforge dist` command

use anyhow::Result;

use crate::cli::Cli;
use toolforge::ops::dist;

pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = super::context(cli)?;
    let report = dist(&ctx)?;

    println!("{}", report.tarball.display());
    println!("{}", report.zip.display());
    Ok(())
}
