//! Driving the freshly built builder tool.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{Context, Result};

use crate::cache::CacheKey;
use crate::platform::Platform;
use crate::util::context::BuildContext;
use crate::util::fs::ensure_dir;
use crate::util::hash::Fingerprint;
use crate::util::process::ProcessBuilder;
use crate::util::shell::Status;

/// The builder tool, used to compile programs written in the target
/// language against the output tree.
#[derive(Debug, Clone)]
pub struct TargetCompiler {
    exe: PathBuf,
    root: PathBuf,
    debug: bool,
    exe_suffix: &'static str,
    identity: String,
}

impl TargetCompiler {
    /// `stdlib` is a digest of the library sources programs compile
    /// against; it invalidates compiled programs when the library changes.
    pub fn new(
        exe: &Path,
        root: &Path,
        debug: bool,
        platform: &Platform,
        stdlib: &str,
    ) -> Result<Self> {
        let mut fp = Fingerprint::new();
        fp.update_file(exe)?
            .update_path(root)
            .update_bool(debug)
            .update_str(stdlib);

        Ok(TargetCompiler {
            exe: exe.to_path_buf(),
            root: root.to_path_buf(),
            debug,
            exe_suffix: platform.exe_suffix(),
            identity: fp.finish_short(),
        })
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    /// Compile `src` into the executable `output` (the platform suffix is
    /// added). Cached on the contents of `src` and of the builder.
    pub fn compile(
        &self,
        ctx: &BuildContext,
        src: &Path,
        output: &Path,
        static_link: bool,
    ) -> Result<PathBuf> {
        let mut output = output.as_os_str().to_owned();
        output.push(self.exe_suffix);
        let output = PathBuf::from(output);

        let key = CacheKey::builder("flx-compile")
            .str(&self.identity)
            .file(src)?
            .path(&output)
            .flag(static_link)
            .finish();

        ctx.cache().call(&key, || {
            ctx.shell().verbose(Status::Compiling, src.display());
            ensure_dir(output.parent().unwrap_or(Path::new(".")))?;

            let mut pb = ProcessBuilder::new(&self.exe).arg(format!("--test={}", self.root.display()));
            if self.debug {
                pb = pb.arg("--debug");
            }
            if static_link {
                pb = pb.arg("--static");
            }
            pb.arg("-c")
                .arg("-o")
                .arg(&output)
                .arg(src)
                .exec_and_check()
                .with_context(|| format!("failed to compile {}", src.display()))?;
            Ok(output.clone())
        })
    }

    /// Run a compiled program from the output root.
    pub fn run(&self, program: &Path) -> Result<Output> {
        ProcessBuilder::new(program).cwd(&self.root).exec()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{test_context, write_script, FAKE_BUILDER};
    use tempfile::TempDir;

    #[test]
    fn test_compile_and_run() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let flx = write_script(&tmp.path().join("bin"), "flx", FAKE_BUILDER);
        let linux = Platform::parse("linux").unwrap();
        let compiler = TargetCompiler::new(&flx, ctx.output_root(), false, &linux, "").unwrap();

        let src = ctx.src("hello.flx");
        std::fs::write(&src, "// hello\n").unwrap();
        let exe = compiler.compile(&ctx, &src, &ctx.out("test/hello"), false).unwrap();

        let out = compiler.run(&exe).unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout), "hello\n");

        compiler.compile(&ctx, &src, &ctx.out("test/hello"), false).unwrap();
        assert_eq!(ctx.cache().stats().hits, 1);
    }

    #[test]
    fn test_compile_error_is_reported() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let flx = write_script(&tmp.path().join("bin"), "flx", FAKE_BUILDER);
        let win = Platform::parse("windows").unwrap();
        let compiler = TargetCompiler::new(&flx, ctx.output_root(), true, &win, "").unwrap();

        let src = ctx.src("broken.flx");
        std::fs::write(&src, "absent_function();\n").unwrap();
        assert!(compiler.compile(&ctx, &src, &ctx.out("test/broken"), true).is_err());
    }
}
