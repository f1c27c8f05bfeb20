//! Implementation of `toolforge install`.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::core::Manifest;
use crate::error::ForgeError;
use crate::ops::build::build;
use crate::phase::Phases;
use crate::util::context::BuildContext;
use crate::util::fs::{copy_dir_all, copy_file, ensure_dir};
use crate::util::shell::Status;

/// Output-root directories copied into the library install directory.
const LIB_TREES: &[&str] = &["bin", "lib", "config"];

/// Where things were installed.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub lib_dir: PathBuf,
    pub bins: Vec<PathBuf>,
}

/// `<libdir>/<name>/<name>-<version>`
pub fn lib_install_dir(ctx: &BuildContext, manifest: &Manifest) -> PathBuf {
    ctx.options()
        .libdir()
        .join(&manifest.project.name)
        .join(manifest.versioned_name())
}

/// Copy the output tree into the versioned library directory. Refuses to
/// touch an existing installation.
pub fn install_lib(ctx: &BuildContext, manifest: &Manifest) -> Result<PathBuf> {
    let dir = lib_install_dir(ctx, manifest);
    if dir.exists() {
        return Err(ForgeError::InstallConflict { path: dir }.into());
    }

    ctx.shell()
        .status(Status::Installing, format!("libraries into {}", dir.display()));
    for tree in LIB_TREES {
        let src = ctx.out(tree);
        if src.is_dir() {
            copy_dir_all(&src, &dir.join(tree))?;
        } else {
            tracing::debug!("nothing to install from {}", src.display());
        }
    }
    Ok(dir)
}

/// Copy the binaries listed under `[install]` into the bindir.
pub fn install_bin(ctx: &BuildContext, manifest: &Manifest, phases: &Phases) -> Result<Vec<PathBuf>> {
    let bindir = ctx.options().bindir();
    ctx.shell()
        .status(Status::Installing, format!("binaries into {}", bindir.display()));
    ensure_dir(&bindir)?;

    let suffix = phases.target.platform().exe_suffix();
    let mut installed = Vec::new();
    for name in &manifest.install.bins {
        let file = format!("{}{}", name, suffix);
        let src = ctx.out("bin").join(&file);
        if !src.is_file() {
            return Err(anyhow!("binary `{}` was not built", file));
        }
        let dst = bindir.join(&file);
        copy_file(&src, &dst)?;
        installed.push(dst);
    }
    Ok(installed)
}

/// Build, then install libraries and binaries.
pub fn install(ctx: &BuildContext) -> Result<InstallReport> {
    let built = build(ctx)?;

    let lib_dir = install_lib(ctx, &built.manifest)?;
    let bins = install_bin(ctx, &built.manifest, &built.phases)?;

    ctx.shell().status(
        Status::Finished,
        format!("install of {}", built.manifest.versioned_name()),
    );
    Ok(InstallReport { lib_dir, bins })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error;
    use crate::test_support::{test_context_with, ProjectFixture};
    use tempfile::TempDir;

    #[test]
    fn test_install_layout() {
        let tmp = TempDir::new().unwrap();
        let project = ProjectFixture::full(tmp.path());
        let ctx = test_context_with(project.options());

        let report = install(&ctx).unwrap();
        let prefix = tmp.path().join("prefix");
        assert_eq!(report.lib_dir, prefix.join("lib/felix/felix-1.1.6"));
        assert!(report.lib_dir.join("bin/flx").exists());
        assert!(report.lib_dir.join("lib/std.flx").exists());
        assert!(report.lib_dir.join("config/phases.json").exists());
        assert_eq!(report.bins, [prefix.join("bin/flx"), prefix.join("bin/flx_ls")]);
    }

    #[test]
    fn test_existing_install_is_a_conflict() {
        let tmp = TempDir::new().unwrap();
        let project = ProjectFixture::full(tmp.path());
        let existing = tmp.path().join("prefix/lib/felix/felix-1.1.6");
        std::fs::create_dir_all(&existing).unwrap();
        let ctx = test_context_with(project.options());

        let err = install(&ctx).unwrap_err();
        assert!(matches!(
            error::category(&err),
            Some(ForgeError::InstallConflict { .. })
        ));
        assert!(!tmp.path().join("prefix/bin").exists());
        assert_eq!(std::fs::read_dir(&existing).unwrap().count(), 0);
    }
}
