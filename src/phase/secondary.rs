//! The secondary-language (OCaml) toolchain used to build the front end.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, Cached};
use crate::platform::{detect, detect_config_tool, Capability, ConfigTool};
use crate::util::config::HostExtras;
use crate::util::context::BuildContext;
use crate::util::fs::ensure_dir;
use crate::util::hash::Fingerprint;
use crate::util::process::{find_program, ProcessBuilder};
use crate::util::shell::Status;

/// Oldest compiler release the front end builds with.
pub const MIN_VERSION: Version = Version::new(3, 11, 0);

const WARNING_FLAGS: &[&str] = &["-w", "yzex", "-warn-error", "FDPSU"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryCompiler {
    /// ocamlopt
    Native,
    /// ocamlc
    Bytecode,
}

impl SecondaryCompiler {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecondaryCompiler::Native => "native",
            SecondaryCompiler::Bytecode => "bytecode",
        }
    }

    fn object_extension(&self) -> &'static str {
        match self {
            SecondaryCompiler::Native => "cmx",
            SecondaryCompiler::Bytecode => "cmo",
        }
    }

    fn library_extension(&self) -> &'static str {
        match self {
            SecondaryCompiler::Native => "cmxa",
            SecondaryCompiler::Bytecode => "cma",
        }
    }
}

/// A resolved OCaml compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryToolchain {
    pub kind: SecondaryCompiler,
    pub path: PathBuf,
    pub version: Version,
    pub flags: Vec<String>,
    pub debug: bool,
}

impl Cached for SecondaryToolchain {
    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }
}

/// Module sources and link settings for one executable.
#[derive(Debug, Clone, Default)]
pub struct ModuleOpts {
    pub includes: Vec<PathBuf>,
    /// Library names such as `unix`; the extension follows the compiler.
    pub libs: Vec<String>,
}

/// Find the OCaml compiler, preferring the native one.
pub fn detect_secondary(extras: &HostExtras, debug: bool) -> Capability<SecondaryToolchain> {
    let make = |kind, tool: ConfigTool| SecondaryToolchain {
        kind,
        path: tool.path,
        version: tool.version,
        flags: WARNING_FLAGS.iter().map(|s| s.to_string()).collect(),
        debug,
    };

    let native = detect_config_tool(
        "ocamlopt",
        extras.ocamlopt.as_deref(),
        &["ocamlopt.opt", "ocamlopt"],
        "-version",
        &MIN_VERSION,
    );
    let native_reason = match native {
        Capability::Present(tool) => return Capability::Present(make(SecondaryCompiler::Native, tool)),
        Capability::Absent { reason } => reason,
    };

    match detect_config_tool(
        "ocamlc",
        extras.ocamlc.as_deref(),
        &["ocamlc.opt", "ocamlc"],
        "-version",
        &MIN_VERSION,
    ) {
        Capability::Present(tool) => Capability::Present(make(SecondaryCompiler::Bytecode, tool)),
        Capability::Absent { reason } => {
            Capability::absent(format!("ocamlopt: {}; ocamlc: {}", native_reason, reason))
        }
    }
}

/// Find the lexer generator.
pub fn detect_lexer(explicit: Option<&Path>) -> Capability<PathBuf> {
    detect("ocamllex", || {
        find_program(explicit, &["ocamllex.opt", "ocamllex"])
            .ok_or_else(|| anyhow::anyhow!("no ocamllex found on PATH"))
    })
}

impl SecondaryToolchain {
    fn base_command(&self) -> ProcessBuilder {
        let mut pb = ProcessBuilder::new(&self.path);
        if self.debug {
            pb = pb.arg("-g");
        }
        pb.args(&self.flags)
    }

    fn identity(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_path(&self.path)
            .update_str(self.kind.as_str())
            .update_str(&self.version.to_string())
            .update_strs(self.flags.iter().map(String::as_str))
            .update_bool(self.debug);
        fp.finish_short()
    }

    fn object_path(&self, src: &Path, obj_dir: &Path) -> PathBuf {
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = if src.extension().is_some_and(|e| e == "mli") {
            "cmi"
        } else {
            self.kind.object_extension()
        };
        obj_dir.join(format!("{}.{}", stem, ext))
    }

    /// Compile one module. `deps` is a digest of every module compiled
    /// before it, since a module may refer to any earlier one.
    pub fn compile_module(
        &self,
        ctx: &BuildContext,
        src: &Path,
        obj_dir: &Path,
        includes: &[PathBuf],
        deps: &str,
    ) -> Result<PathBuf> {
        let output = self.object_path(src, obj_dir);

        let key = CacheKey::builder("ocaml-compile")
            .str(&self.identity())
            .file(src)?
            .path(&output)
            .paths(includes)
            .digest(deps)
            .finish();

        ctx.cache().call(&key, || {
            ctx.shell().verbose(Status::Compiling, src.display());
            ensure_dir(obj_dir)?;

            let mut pb = self.base_command().arg("-c").arg("-I").arg(obj_dir);
            for dir in includes {
                pb = pb.arg("-I").arg(dir);
            }
            pb.arg("-o")
                .arg(&output)
                .arg(src)
                .exec_and_check()
                .with_context(|| format!("failed to compile {}", src.display()))?;
            Ok(output.clone())
        })
    }

    /// Link compiled modules into an executable.
    pub fn link_exe(
        &self,
        ctx: &BuildContext,
        objects: &[PathBuf],
        opts: &ModuleOpts,
        output: &Path,
    ) -> Result<PathBuf> {
        let libs: Vec<String> = opts
            .libs
            .iter()
            .map(|l| format!("{}.{}", l, self.kind.library_extension()))
            .collect();

        let key = CacheKey::builder("ocaml-link")
            .str(&self.identity())
            .path(output)
            .files(objects)?
            .strs(&libs)
            .paths(&opts.includes)
            .finish();

        ctx.cache().call(&key, || {
            ensure_dir(output.parent().unwrap_or(Path::new(".")))?;
            let mut pb = self.base_command();
            for dir in &opts.includes {
                pb = pb.arg("-I").arg(dir);
            }
            pb.args(&libs)
                .args(objects.iter().map(|o| o.as_os_str()))
                .arg("-o")
                .arg(output)
                .exec_and_check()
                .with_context(|| format!("failed to link {}", output.display()))?;
            Ok(output.to_path_buf())
        })
    }

    /// Compile `srcs` in order and link them into `output`. Interfaces
    /// (`.mli`) are compiled but not linked.
    pub fn build_exe(
        &self,
        ctx: &BuildContext,
        name: &str,
        srcs: &[PathBuf],
        opts: &ModuleOpts,
        output: &Path,
    ) -> Result<PathBuf> {
        let obj_dir = ctx.out("obj").join("ocaml").join(name);
        let mut chain = Fingerprint::new();
        let mut objects = Vec::new();

        for src in srcs {
            let deps = chain.clone().finish();
            let obj = self.compile_module(ctx, src, &obj_dir, &opts.includes, &deps)?;
            chain.update_file(src)?;
            if obj.extension().is_some_and(|e| e != "cmi") {
                objects.push(obj);
            }
        }

        self.link_exe(ctx, &objects, opts, output)
    }
}

/// Generate an OCaml module from a lexer definition.
pub fn run_lexer(ctx: &BuildContext, ocamllex: &Path, src: &Path, out_dir: &Path) -> Result<PathBuf> {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = out_dir.join(format!("{}.ml", stem));

    let key = CacheKey::builder("ocamllex")
        .path(ocamllex)
        .file(src)?
        .path(&output)
        .finish();

    ctx.cache().call(&key, || {
        ctx.shell().verbose(Status::Running, format!("ocamllex {}", src.display()));
        ensure_dir(out_dir)?;
        ProcessBuilder::new(ocamllex)
            .arg("-q")
            .arg("-o")
            .arg(&output)
            .arg(src)
            .exec_and_check()
            .with_context(|| format!("failed to generate lexer from {}", src.display()))?;
        Ok(output.clone())
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{fake_ocaml, test_context, write_script};
    use tempfile::TempDir;

    #[test]
    fn test_prefers_native_compiler() {
        let tmp = TempDir::new().unwrap();
        let fake = fake_ocaml(&tmp.path().join("ocaml"), "4.14.1");
        let extras = HostExtras {
            ocamlopt: Some(fake.ocamlopt.clone()),
            ocamlc: Some(fake.ocamlc.clone()),
            ..HostExtras::default()
        };

        let tc = detect_secondary(&extras, false).into_option().unwrap();
        assert_eq!(tc.kind, SecondaryCompiler::Native);
        assert_eq!(tc.path, fake.ocamlopt);
        assert_eq!(tc.flags, WARNING_FLAGS);
    }

    #[test]
    fn test_falls_back_to_bytecode() {
        let tmp = TempDir::new().unwrap();
        let fake = fake_ocaml(&tmp.path().join("ocaml"), "4.14.1");
        let old = write_script(tmp.path(), "ocamlopt-old", "echo 3.10.2");
        let extras = HostExtras {
            ocamlopt: Some(old),
            ocamlc: Some(fake.ocamlc.clone()),
            ..HostExtras::default()
        };

        let tc = detect_secondary(&extras, true).into_option().unwrap();
        assert_eq!(tc.kind, SecondaryCompiler::Bytecode);
        assert!(tc.debug);
    }

    #[test]
    fn test_both_missing_is_absent() {
        let extras = HostExtras {
            ocamlopt: Some("/nonexistent/ocamlopt".into()),
            ocamlc: Some("/nonexistent/ocamlc".into()),
            ..HostExtras::default()
        };
        let cap = detect_secondary(&extras, false);
        assert!(cap.reason().unwrap().contains("ocamlc"));
    }

    #[test]
    fn test_build_exe_links_in_order() {
        let tmp = TempDir::new().unwrap();
        let fake = fake_ocaml(&tmp.path().join("ocaml"), "4.14.1");
        let ctx = test_context(tmp.path());
        let extras = HostExtras {
            ocamlopt: Some(fake.ocamlopt.clone()),
            ..HostExtras::default()
        };
        let tc = detect_secondary(&extras, false).into_option().unwrap();

        let srcs: Vec<PathBuf> = ["flx_ast.mli", "flx_ast.ml", "flxg.ml"]
            .iter()
            .map(|n| {
                let p = ctx.src(n);
                std::fs::write(&p, format!("(* {} *)", n)).unwrap();
                p
            })
            .collect();

        let opts = ModuleOpts {
            libs: vec!["unix".into()],
            ..ModuleOpts::default()
        };
        let exe = tc.build_exe(&ctx, "flxg", &srcs, &opts, &ctx.out("bin/flxg")).unwrap();
        assert!(exe.exists());

        let link = std::fs::read_to_string(&exe).unwrap();
        assert!(link.contains("unix.cmxa"));
        let ast = link.find("flx_ast.cmx").unwrap();
        let main = link.find("flxg.cmx").unwrap();
        assert!(ast < main);
        assert!(!link.contains(".cmi"));

        // three compiles and one link, nothing on the second run
        let before = fake.invocations();
        tc.build_exe(&ctx, "flxg", &srcs, &opts, &ctx.out("bin/flxg")).unwrap();
        assert_eq!(fake.invocations(), before);
    }

    #[test]
    fn test_run_lexer() {
        let tmp = TempDir::new().unwrap();
        let fake = fake_ocaml(&tmp.path().join("ocaml"), "4.14.1");
        let ctx = test_context(tmp.path());
        let src = ctx.src("flx_lex.mll");
        std::fs::write(&src, "rule token = parse eof { () }").unwrap();

        let out = run_lexer(&ctx, &fake.ocamllex, &src, &ctx.out("gen")).unwrap();
        assert_eq!(out, ctx.out("gen/flx_lex.ml"));
        assert!(out.exists());
    }
}
