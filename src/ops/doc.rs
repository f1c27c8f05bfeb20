//! Implementation of `toolforge doc`.

use std::path::PathBuf;

use anyhow::Result;

use crate::ops::build::build;
use crate::ops::copy::copy_spec;
use crate::util::context::BuildContext;
use crate::util::shell::Status;

/// Build, then copy the `[doc]` trees into the output root.
pub fn doc(ctx: &BuildContext) -> Result<Vec<PathBuf>> {
    let built = build(ctx)?;

    let mut copied = Vec::new();
    for spec in &built.manifest.doc.copy {
        copied.extend(copy_spec(ctx, spec)?);
    }

    ctx.shell()
        .status(Status::Finished, format!("documentation ({} files)", copied.len()));
    Ok(copied)
}
