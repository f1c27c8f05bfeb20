//! Implementation of `toolforge speed`: wall-clock timing of benchmark
//! programs compiled with the builder.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::ops::build::build;
use crate::ops::compiler::TargetCompiler;
use crate::util::context::BuildContext;
use crate::util::fs::{glob_files, relative_path};
use crate::util::shell::{format_duration, Status};

#[derive(Debug, Clone, Serialize)]
pub struct SpeedResult {
    pub source: PathBuf,
    /// Fastest of the runs; `None` when the program failed to build or run.
    pub best: Option<Duration>,
}

fn time_program(
    ctx: &BuildContext,
    compiler: &TargetCompiler,
    src: &Path,
    runs: u32,
) -> Result<Duration> {
    let rel = relative_path(ctx.source_root(), src).with_extension("");
    let exe = compiler.compile(ctx, src, &ctx.out("speed").join(rel), false)?;

    let mut best: Option<Duration> = None;
    for _ in 0..runs.max(1) {
        let start = Instant::now();
        let output = compiler.run(&exe)?;
        let elapsed = start.elapsed();
        if !output.status.success() {
            return Err(anyhow!("{} exited with {}", exe.display(), output.status));
        }
        best = Some(best.map_or(elapsed, |b| b.min(elapsed)));
    }
    best.ok_or_else(|| anyhow!("no runs of {}", exe.display()))
}

/// Build, then time every `[speed]` program. Programs run one at a time so
/// they do not compete for the machine.
pub fn speed(ctx: &BuildContext) -> Result<Vec<SpeedResult>> {
    let built = build(ctx)?;
    let spec = &built.manifest.speed;
    if spec.sources.is_empty() {
        ctx.shell().note("no speed tests defined");
        return Ok(Vec::new());
    }
    let compiler = built
        .compiler
        .as_ref()
        .ok_or_else(|| anyhow!("speed tests need a [builder] to compile them"))?;

    let mut results = Vec::new();
    for src in glob_files(ctx.source_root(), &spec.sources)? {
        let best = match time_program(ctx, compiler, &src, spec.runs) {
            Ok(best) => {
                ctx.shell()
                    .status(Status::Finished, format!("{}: {}", src.display(), format_duration(best)));
                Some(best)
            }
            Err(e) => {
                ctx.shell()
                    .status(Status::Failed, format!("{}: {:#}", src.display(), e));
                None
            }
        };
        results.push(SpeedResult { source: src, best });
    }
    Ok(results)
}
