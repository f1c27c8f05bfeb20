//! `toolforge configure` command

use anyhow::Result;

use crate::cli::Cli;
use toolforge::ops::configure;
use toolforge::phase::RoleEntry;

pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = super::context(cli)?;
    let configured = configure(&ctx)?;

    let summary = configured.phases.summary();
    println!("build: {}", summary.build.platform.join(","));
    for (role, entry) in [("host", &summary.host), ("target", &summary.target)] {
        match entry {
            RoleEntry::Alias(of) => println!("{}: same as {}", role, of),
            RoleEntry::Own(phase) => println!("{}: {}", role, phase.platform.join(",")),
        }
    }
    if !configured.extraction.failed.is_empty() {
        println!(
            "{} package(s) failed to extract",
            configured.extraction.failed.len()
        );
    }
    Ok(())
}
