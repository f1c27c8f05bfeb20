//! Command implementations

pub mod build;
pub mod completions;
pub mod configure;
pub mod dist;
pub mod doc;
pub mod install;
pub mod speed;

use std::sync::Arc;

use anyhow::Result;

use crate::cli::Cli;
use toolforge::util::config::{global_config_path, load_config, project_config_path};
use toolforge::util::{BuildContext, Shell};

/// Resolve options (command line over config files) and open the context.
pub fn context(cli: &Cli) -> Result<BuildContext> {
    let mut options = cli.options();
    let file = load_config(
        global_config_path().as_deref(),
        &project_config_path(&options.source_root),
    )?;
    options.apply_file_config(file);

    let shell = Shell::from_flags(cli.quiet, cli.verbose);
    BuildContext::new(options, Arc::new(shell))
}
