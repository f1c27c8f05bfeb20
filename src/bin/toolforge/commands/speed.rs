//! `toolforge speed` command

use anyhow::Result;

use crate::cli::Cli;
use toolforge::ops::speed;
use toolforge::util::shell::format_duration;

pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = super::context(cli)?;

    for result in speed(&ctx)? {
        let name = result
            .source
            .strip_prefix(ctx.source_root())
            .unwrap_or(&result.source);
        match result.best {
            Some(best) => println!("{:<40} {}", name.display(), format_duration(best)),
            None => println!("{:<40} failed", name.display()),
        }
    }
    Ok(())
}
