//! The per-invocation build context.
//!
//! A [`BuildContext`] is created once from the parsed [`Options`] and passed
//! by reference through every operation. Nothing in it changes after
//! construction except the cache's internal records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::{Cache, DB_FILE};
use crate::scheduler::Scheduler;
use crate::util::config::Options;
use crate::util::fs::ensure_dir;
use crate::util::shell::Shell;

#[derive(Debug)]
pub struct BuildContext {
    options: Options,
    shell: Arc<Shell>,
    scheduler: Scheduler,
    cache: Cache,
    source_root: PathBuf,
    output_root: PathBuf,
}

impl BuildContext {
    /// Create the context: makes the output root and opens its cache.
    ///
    /// Relative roots are resolved against the current directory so later
    /// steps may change directory for sub-processes safely.
    pub fn new(options: Options, shell: Arc<Shell>) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let source_root = cwd.join(&options.source_root);
        let source_root = source_root
            .canonicalize()
            .with_context(|| format!("source root not found: {}", source_root.display()))?;

        let output_root = cwd.join(options.output_root());
        ensure_dir(&output_root)?;

        let cache = Cache::open(&output_root.join(DB_FILE))?;
        let scheduler = Scheduler::new(options.jobs);

        tracing::debug!(
            "source root {}, output root {}, {} jobs",
            source_root.display(),
            output_root.display(),
            scheduler.jobs()
        );

        Ok(BuildContext {
            options,
            shell,
            scheduler,
            cache,
            source_root,
            output_root,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `<output-root>/<rel>`
    pub fn out(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.output_root.join(rel)
    }

    /// `<source-root>/<rel>`
    pub fn src(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.source_root.join(rel)
    }

    /// Run `f` over `items` on the scheduler with a progress bar labelled
    /// `label`. Results are in input order.
    pub fn map<T, R, F>(&self, label: &str, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let progress = self.shell.progress(items.len() as u64, label);
        let results = self.scheduler.map(items, |item| {
            let r = f(item);
            progress.inc();
            r
        });
        progress.finish();
        results
    }
}
