//! File copies into the output tree.
//!
//! Copies never rewrite a destination that already holds the same bytes, so
//! replaying them is free and leaves timestamps alone.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::CopySpec;
use crate::util::context::BuildContext;
use crate::util::fs::{glob_files, relative_path, write_if_changed};
use crate::util::shell::Status;

/// One layer of a last-wins copy: files matching `pattern` in `dir` land
/// directly in `dest`.
#[derive(Debug, Clone)]
pub struct Layer {
    pub dir: PathBuf,
    pub pattern: String,
    pub dest: PathBuf,
}

impl Layer {
    pub fn new(dir: impl Into<PathBuf>, pattern: &str, dest: impl Into<PathBuf>) -> Self {
        Layer {
            dir: dir.into(),
            pattern: pattern.to_string(),
            dest: dest.into(),
        }
    }
}

/// Copy `src` to `dst` unless `dst` already has the same contents.
pub fn copy_if_changed(src: &Path, dst: &Path) -> Result<bool> {
    let bytes = std::fs::read(src).with_context(|| format!("failed to read {}", src.display()))?;
    write_if_changed(dst, &bytes)
}

/// Pick the winning source for every destination: the last layer providing
/// a file name wins. Result is ordered by destination.
pub fn resolve_layers(layers: &[Layer]) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut winners: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
    for layer in layers {
        if !layer.dir.is_dir() {
            tracing::debug!("layer {} not present", layer.dir.display());
            continue;
        }
        for src in glob_files(&layer.dir, std::slice::from_ref(&layer.pattern))? {
            let Some(name) = src.file_name() else { continue };
            winners.insert(layer.dest.join(name), src);
        }
    }
    Ok(winners.into_iter().map(|(dst, src)| (src, dst)).collect())
}

/// Apply `layers` in order with last-wins semantics. Only winners are
/// copied, so no destination is written twice.
pub fn layered_copy(ctx: &BuildContext, layers: &[Layer]) -> Result<Vec<PathBuf>> {
    copy_winners(ctx, resolve_layers(layers)?)
}

/// Copy already-resolved `(src, dst)` pairs.
pub fn copy_winners(ctx: &BuildContext, winners: Vec<(PathBuf, PathBuf)>) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for (src, dst) in winners {
        if copy_if_changed(&src, &dst)? {
            ctx.shell().verbose(
                Status::Copying,
                format!("{} -> {}", src.display(), dst.display()),
            );
        }
        copied.push(dst);
    }
    Ok(copied)
}

/// Copy a manifest copy spec from the source root into the output root,
/// keeping paths relative to `from`. A pattern without a `/` applies in
/// every subdirectory.
pub fn copy_spec(ctx: &BuildContext, spec: &CopySpec) -> Result<Vec<PathBuf>> {
    let from = ctx.src(&spec.from);
    let to = ctx.out(&spec.to);
    let pattern = if spec.pattern.contains('/') {
        spec.pattern.clone()
    } else {
        format!("**/{}", spec.pattern)
    };

    let mut copied = Vec::new();
    for src in glob_files(&from, &[pattern])? {
        let dst = to.join(relative_path(&from, &src));
        copy_if_changed(&src, &dst)?;
        copied.push(dst);
    }

    ctx.shell().verbose(
        Status::Copying,
        format!("{} files from {} to {}", copied.len(), spec.from, spec.to),
    );
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use tempfile::TempDir;

    fn write(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn test_last_layer_wins() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        write(&ctx.src("src/config/judy.fpc"), "generic");
        write(&ctx.src("src/config/re2.fpc"), "generic");
        write(&ctx.src("src/config/unix/judy.fpc"), "unix");

        let layers = [
            Layer::new(ctx.src("src/config"), "*.fpc", ctx.out("config")),
            Layer::new(ctx.src("src/config/win32"), "*.fpc", ctx.out("config")),
            Layer::new(ctx.src("src/config/unix"), "*.fpc", ctx.out("config")),
        ];
        let copied = layered_copy(&ctx, &layers).unwrap();
        assert_eq!(copied.len(), 2);
        assert_eq!(std::fs::read_to_string(ctx.out("config/judy.fpc")).unwrap(), "unix");
        assert_eq!(std::fs::read_to_string(ctx.out("config/re2.fpc")).unwrap(), "generic");
    }

    #[test]
    fn test_copy_spec_keeps_relative_layout() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        write(&ctx.src("src/lib/std/list.flx"), "list");
        write(&ctx.src("src/lib/std/c/io.flxh"), "io");
        write(&ctx.src("src/lib/std/notes.txt"), "skip");

        let spec = CopySpec {
            from: "src/lib".into(),
            pattern: "*.{flx,flxh}".into(),
            to: "lib".into(),
        };
        let copied = copy_spec(&ctx, &spec).unwrap();
        assert_eq!(copied.len(), 2);
        assert!(ctx.out("lib/std/list.flx").exists());
        assert!(ctx.out("lib/std/c/io.flxh").exists());
        assert!(!ctx.out("lib/std/notes.txt").exists());
    }

    #[test]
    fn test_unchanged_copy_is_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.fpc");
        let dst = tmp.path().join("out/a.fpc");
        std::fs::write(&src, "x").unwrap();

        assert!(copy_if_changed(&src, &dst).unwrap());
        assert!(!copy_if_changed(&src, &dst).unwrap());
    }
}
