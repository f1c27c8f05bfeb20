//! Implementation of `toolforge dist`: source archives of the tracked files,
//! named after `git describe`.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use git2::{DescribeFormatOptions, DescribeOptions, Repository};

use crate::ops::configure::{configure, load_manifest};
use crate::util::context::BuildContext;
use crate::util::fs::ensure_dir;
use crate::util::process::{find_program, ProcessBuilder};
use crate::util::shell::Status;

/// Archives written by [`dist`].
#[derive(Debug, Clone)]
pub struct DistReport {
    pub version: String,
    pub tarball: PathBuf,
    pub zip: PathBuf,
}

/// Revision name from `git describe --tags`.
pub fn describe_version(repo: &Repository) -> Result<String> {
    let mut opts = DescribeOptions::new();
    opts.describe_tags().show_commit_oid_as_fallback(true);
    let describe = repo.describe(&opts).context("git describe failed")?;
    describe
        .format(Some(&DescribeFormatOptions::new()))
        .context("failed to format git describe output")
}

/// Paths of every file in the index, relative to the work tree.
pub fn tracked_files(repo: &Repository) -> Result<Vec<PathBuf>> {
    let index = repo.index().context("failed to read git index")?;
    let mut files: Vec<PathBuf> = index
        .iter()
        .map(|entry| PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
        .collect();
    files.sort();
    Ok(files)
}

/// Write a gzipped tarball of `files` (relative to `root`) under `prefix/`.
pub fn write_tarball(root: &Path, files: &[PathBuf], prefix: &str, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for rel in files {
        let src = root.join(rel);
        if !src.is_file() {
            tracing::warn!("tracked file {} is missing from the work tree", rel.display());
            continue;
        }
        builder
            .append_path_with_name(&src, Path::new(prefix).join(rel))
            .with_context(|| format!("failed to add {} to archive", rel.display()))?;
    }

    builder
        .into_inner()
        .context("failed to finish tar archive")?
        .finish()
        .context("failed to finish gzip stream")?;
    Ok(())
}

fn write_zip(root: &Path, prefix: &str, output: &Path) -> Result<()> {
    let git = find_program(None, &["git"]).ok_or_else(|| anyhow!("git not found on PATH"))?;
    ProcessBuilder::new(git)
        .cwd(root)
        .arg("archive")
        .arg("--format=zip")
        .arg(format!("--prefix={}/", prefix))
        .arg("-o")
        .arg(output)
        .arg("HEAD")
        .exec_and_check()
        .context("git archive failed")?;
    Ok(())
}

/// Configure, then pack the tracked sources into `<buildroot>/dist`.
pub fn dist(ctx: &BuildContext) -> Result<DistReport> {
    configure(ctx)?;
    let manifest = load_manifest(ctx)?
        .ok_or_else(|| anyhow!("dist needs a {}", crate::core::MANIFEST_FILE))?;

    let repo = Repository::discover(ctx.source_root())
        .with_context(|| format!("{} is not in a git repository", ctx.source_root().display()))?;
    let root = repo
        .workdir()
        .ok_or_else(|| anyhow!("cannot pack a bare repository"))?
        .to_path_buf();

    let version = describe_version(&repo)?;
    ctx.shell()
        .status(Status::Packing, format!("source as version {}", version));

    let prefix = format!("{}-{}", manifest.project.name, version);
    // the output root is `<buildroot>/{debug,release}`, already absolute
    let buildroot = ctx.output_root().parent().unwrap_or(ctx.output_root());
    let dist_dir = buildroot.join("dist");
    let tarball = dist_dir.join(format!("{}.tar.gz", prefix));
    let zip = dist_dir.join(format!("{}.zip", prefix));

    write_tarball(&root, &tracked_files(&repo)?, &prefix, &tarball)?;
    write_zip(&root, &prefix, &zip)?;

    ctx.shell()
        .status(Status::Finished, format!("{} and {}", tarball.display(), zip.display()));
    Ok(DistReport {
        version,
        tarball,
        zip,
    })
}
