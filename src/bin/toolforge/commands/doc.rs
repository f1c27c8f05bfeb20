//! `toolforge doc` command

use anyhow::Result;

use crate::cli::Cli;
use toolforge::ops::doc;

pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = super::context(cli)?;
    doc(&ctx)?;
    Ok(())
}
