//! Cached compile, archive and link operations.
//!
//! Every operation is keyed on the builder's identity (compiler, platform,
//! flags, link mode) plus the *contents* of its inputs, so an unchanged
//! source is never recompiled, in this run or the next.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use walkdir::WalkDir;

use crate::cache::CacheKey;
use crate::error;
use crate::platform::{Platform, PlatformClass};
use crate::util::context::BuildContext;
use crate::util::fs::ensure_dir;
use crate::util::hash::Fingerprint;
use crate::util::process::ProcessBuilder;
use crate::util::shell::Status;

use super::{
    ArchiveInput, CompileInput, FlagTable, Language, LinkInput, Toolchain,
};

/// Whether a builder produces static archives or shared objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    Static,
    Shared,
}

impl LinkMode {
    fn tag(&self) -> &'static str {
        match self {
            LinkMode::Static => "static",
            LinkMode::Shared => "dynamic",
        }
    }
}

/// Per-call compile settings on top of the builder's own.
#[derive(Debug, Clone, Default)]
pub struct CompileOpts {
    pub includes: Vec<PathBuf>,
    /// `NAME` or `NAME=VALUE`
    pub macros: Vec<String>,
}

/// Per-call link settings.
#[derive(Debug, Clone, Default)]
pub struct LinkOpts {
    /// Static archives linked by path, in order.
    pub archives: Vec<PathBuf>,
    pub libs: Vec<String>,
    pub libpaths: Vec<PathBuf>,
}

const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "inc", "include", "ipp"];

/// A compiler configured for one language, platform and link mode.
#[derive(Debug)]
pub struct Builder {
    toolchain: Arc<dyn Toolchain>,
    lang: Language,
    mode: LinkMode,
    platform: Platform,
    flags: Vec<String>,
    includes: Vec<PathBuf>,
    libpaths: Vec<PathBuf>,
    identity: String,
}

impl Builder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        lang: Language,
        mode: LinkMode,
        platform: Platform,
        user_flags: &[String],
        includes: Vec<PathBuf>,
        libpaths: Vec<PathBuf>,
        debug: bool,
    ) -> Self {
        let flags = FlagTable::for_platform(platform.class(), lang).render(
            toolchain.as_ref(),
            debug,
            user_flags,
        );

        let mut fp = Fingerprint::new();
        fp.update_str(toolchain.family().as_str())
            .update_path(toolchain.compiler_path(lang))
            .update_str(lang.as_str())
            .update_str(mode.tag())
            .update_str(&platform.to_string())
            .update_strs(flags.iter().map(String::as_str));
        for dir in includes.iter().chain(&libpaths) {
            fp.update_path(dir);
        }

        Builder {
            toolchain,
            lang,
            mode,
            platform,
            flags,
            includes,
            libpaths,
            identity: fp.finish_short(),
        }
    }

    pub fn toolchain(&self) -> &dyn Toolchain {
        self.toolchain.as_ref()
    }

    pub fn lang(&self) -> Language {
        self.lang
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn includes(&self) -> &[PathBuf] {
        &self.includes
    }

    /// Short digest identifying this builder's configuration.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn compiler(&self) -> &Path {
        self.toolchain.compiler_path(self.lang)
    }

    fn shared_lib_extension(&self) -> &'static str {
        match self.platform.class() {
            PlatformClass::Windows => "dll",
            PlatformClass::Darwin => "dylib",
            PlatformClass::Posix => "so",
        }
    }

    /// File name of library `name` in this builder's mode, e.g.
    /// `libjudy_static.a` or `libjudy_dynamic.so`.
    pub fn lib_file_name(&self, name: &str) -> String {
        let ext = match self.mode {
            LinkMode::Static => self.toolchain.static_lib_extension(),
            LinkMode::Shared => self.shared_lib_extension(),
        };
        format!(
            "{}{}_{}.{}",
            self.toolchain.lib_prefix(),
            name,
            self.mode.tag(),
            ext
        )
    }

    /// Link name for `-l`, matching [`Builder::lib_file_name`].
    pub fn link_name(&self, name: &str) -> String {
        format!("{}_{}", name, self.mode.tag())
    }

    pub fn exe_file_name(&self, name: &str) -> String {
        format!("{}{}", name, self.platform.exe_suffix())
    }

    /// Object path for `src` under `obj_dir`, keeping the source's relative
    /// location so equal file names in different directories do not clash.
    pub fn object_path(&self, ctx: &BuildContext, obj_dir: &Path, src: &Path) -> PathBuf {
        let rel = src
            .strip_prefix(ctx.source_root())
            .or_else(|_| src.strip_prefix(ctx.output_root()))
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(src.file_name().unwrap_or(src.as_os_str())));

        let stem = rel
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = format!(
            "{}_{}.{}",
            stem,
            self.mode.tag(),
            self.toolchain.object_extension()
        );
        obj_dir.join(rel.with_file_name(file))
    }

    /// Digest of every header under the include directories, memoized for
    /// the run.
    fn header_digest(&self, ctx: &BuildContext, dirs: &[PathBuf]) -> Result<Arc<String>> {
        let mut key = Fingerprint::new();
        for d in dirs {
            key.update_path(d);
        }
        let key = format!("headers:{}", key.finish());

        ctx.cache().memo(&key, || {
            let mut fp = Fingerprint::new();
            for dir in dirs.iter().filter(|d| d.is_dir()) {
                let mut headers: Vec<PathBuf> = WalkDir::new(dir)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .filter(|p| {
                        p.extension()
                            .and_then(|e| e.to_str())
                            .is_some_and(|e| HEADER_EXTENSIONS.contains(&e))
                    })
                    .collect();
                headers.sort();
                for h in &headers {
                    fp.update_file(h)?;
                }
            }
            Ok(fp.finish())
        })
    }

    /// Compile one source file into `obj_dir`.
    pub fn compile(
        &self,
        ctx: &BuildContext,
        src: &Path,
        obj_dir: &Path,
        opts: &CompileOpts,
    ) -> Result<PathBuf> {
        let output = self.object_path(ctx, obj_dir, src);

        let mut include_dirs: Vec<PathBuf> = Vec::new();
        if let Some(parent) = src.parent() {
            include_dirs.push(parent.to_path_buf());
        }
        include_dirs.extend(opts.includes.iter().cloned());
        include_dirs.extend(self.includes.iter().cloned());

        let headers = self.header_digest(ctx, &include_dirs)?;

        let key = CacheKey::builder("compile")
            .str(&self.identity)
            .file(src)?
            .path(&output)
            .paths(&include_dirs)
            .strs(&opts.macros)
            .digest(&headers)
            .finish();

        ctx.cache().call(&key, || {
            ctx.shell().verbose(Status::Compiling, src.display());
            ensure_dir(output.parent().unwrap_or(obj_dir))?;

            let input = CompileInput {
                source: src.to_path_buf(),
                output: output.clone(),
                include_dirs: include_dirs.clone(),
                defines: opts.macros.iter().map(|m| parse_macro(m)).collect(),
                cflags: self.flags.clone(),
                pic: self.mode == LinkMode::Shared && !self.platform.is_windows(),
            };
            let cmd = self.toolchain.compile_command(&input, self.lang);
            ProcessBuilder::from(&cmd)
                .exec_and_check()
                .with_context(|| format!("failed to compile {}", src.display()))?;
            Ok(output.clone())
        })
    }

    /// Compile many sources on the scheduler. Every source is attempted;
    /// the first failure (in input order) is returned.
    pub fn compile_all(
        &self,
        ctx: &BuildContext,
        srcs: &[PathBuf],
        obj_dir: &Path,
        opts: &CompileOpts,
    ) -> Result<Vec<PathBuf>> {
        ctx.map("Compiling", srcs, |src| self.compile(ctx, src, obj_dir, opts))
            .into_iter()
            .collect()
    }

    /// Archive objects into a static library.
    pub fn archive(&self, ctx: &BuildContext, objects: &[PathBuf], output: &Path) -> Result<PathBuf> {
        let key = CacheKey::builder("archive")
            .str(&self.identity)
            .path(output)
            .files(objects)?
            .finish();

        ctx.cache().call(&key, || {
            ensure_dir(output.parent().unwrap_or(Path::new(".")))?;
            // ar appends to an existing archive
            if output.exists() {
                std::fs::remove_file(output)
                    .with_context(|| format!("failed to remove {}", output.display()))?;
            }
            let cmd = self.toolchain.archive_command(&ArchiveInput {
                objects: objects.to_vec(),
                output: output.to_path_buf(),
            });
            ProcessBuilder::from(&cmd).exec_and_check()?;
            Ok(output.to_path_buf())
        })
    }

    fn link(
        &self,
        ctx: &BuildContext,
        op: &str,
        objects: &[PathBuf],
        opts: &LinkOpts,
        output: &Path,
    ) -> Result<PathBuf> {
        let libpaths: Vec<PathBuf> = opts.libpaths.iter().chain(&self.libpaths).cloned().collect();

        let key = CacheKey::builder(op)
            .str(&self.identity)
            .path(output)
            .files(objects)?
            .files(&opts.archives)?
            .strs(&opts.libs)
            .paths(&libpaths)
            .finish();

        ctx.cache().call(&key, || {
            ensure_dir(output.parent().unwrap_or(Path::new(".")))?;
            let input = LinkInput {
                objects: objects.to_vec(),
                archives: opts.archives.clone(),
                output: output.to_path_buf(),
                lib_dirs: libpaths.clone(),
                libs: opts.libs.clone(),
                ldflags: Vec::new(),
            };
            let cmd = if op == "link-shared" {
                self.toolchain.link_shared_command(&input, self.lang)
            } else {
                self.toolchain.link_exe_command(&input, self.lang)
            };
            ProcessBuilder::from(&cmd)
                .exec_and_check()
                .with_context(|| format!("failed to link {}", output.display()))?;
            Ok(output.to_path_buf())
        })
    }

    pub fn link_shared(
        &self,
        ctx: &BuildContext,
        objects: &[PathBuf],
        opts: &LinkOpts,
        output: &Path,
    ) -> Result<PathBuf> {
        self.link(ctx, "link-shared", objects, opts, output)
    }

    pub fn link_exe(
        &self,
        ctx: &BuildContext,
        objects: &[PathBuf],
        opts: &LinkOpts,
        output: &Path,
    ) -> Result<PathBuf> {
        self.link(ctx, "link-exe", objects, opts, output)
    }

    /// Compile `srcs` and produce library `name` in `lib_dir`: an archive
    /// for a static builder, a shared object for a shared one.
    pub fn build_lib(
        &self,
        ctx: &BuildContext,
        name: &str,
        srcs: &[PathBuf],
        lib_dir: &Path,
        compile: &CompileOpts,
        link: &LinkOpts,
    ) -> Result<PathBuf> {
        let obj_dir = ctx.out("obj").join(self.mode.tag()).join(name);
        let objects = self.compile_all(ctx, srcs, &obj_dir, compile)?;
        let output = lib_dir.join(self.lib_file_name(name));

        match self.mode {
            LinkMode::Static => self.archive(ctx, &objects, &output),
            LinkMode::Shared => self.link_shared(ctx, &objects, link, &output),
        }
    }

    /// Compile `srcs` and link executable `name` into `bin_dir`.
    pub fn build_exe(
        &self,
        ctx: &BuildContext,
        name: &str,
        srcs: &[PathBuf],
        bin_dir: &Path,
        compile: &CompileOpts,
        link: &LinkOpts,
    ) -> Result<PathBuf> {
        let obj_dir = ctx.out("obj").join("exe").join(name);
        let objects = self.compile_all(ctx, srcs, &obj_dir, compile)?;
        let output = bin_dir.join(self.exe_file_name(name));
        self.link_exe(ctx, &objects, link, &output)
    }

    /// Whether `header` can be included with this builder. Cached; a
    /// failed compile is a `false` answer, not an error.
    pub fn check_header(&self, ctx: &BuildContext, header: &str) -> Result<bool> {
        let key = CacheKey::builder("check-header")
            .str(&self.identity)
            .str(header)
            .finish();

        ctx.cache().call(&key, || {
            let dir = tempfile::tempdir().context("failed to create temp dir for header check")?;
            let ext = match self.lang {
                Language::C => "c",
                Language::Cxx => "cpp",
            };
            let src = dir.path().join(format!("check.{}", ext));
            std::fs::write(&src, format!("#include <{}>\nint main(void) {{ return 0; }}\n", header))?;

            let input = CompileInput {
                source: src,
                output: dir.path().join(format!("check.{}", self.toolchain.object_extension())),
                include_dirs: self.includes.clone(),
                ..CompileInput::default()
            };
            let cmd = self.toolchain.compile_command(&input, self.lang);

            match ProcessBuilder::from(&cmd).exec_and_check() {
                Ok(_) => Ok(true),
                Err(e) if error::category(&e).is_some() => {
                    tracing::debug!("header {} not usable: {:#}", header, e);
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
    }
}

fn parse_macro(m: &str) -> (String, Option<String>) {
    match m.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (m.to_string(), None),
    }
}

/// The static and shared builder for one language.
#[derive(Debug)]
pub struct BuilderPair {
    pub static_: Arc<Builder>,
    pub shared: Arc<Builder>,
}

impl BuilderPair {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        lang: Language,
        platform: &Platform,
        user_flags: &[String],
        includes: &[PathBuf],
        libpaths: &[PathBuf],
        debug: bool,
    ) -> Self {
        let make = |mode| {
            Arc::new(Builder::new(
                toolchain.clone(),
                lang,
                mode,
                platform.clone(),
                user_flags,
                includes.to_vec(),
                libpaths.to_vec(),
                debug,
            ))
        };
        BuilderPair {
            static_: make(LinkMode::Static),
            shared: make(LinkMode::Shared),
        }
    }

    pub fn get(&self, mode: LinkMode) -> &Arc<Builder> {
        match mode {
            LinkMode::Static => &self.static_,
            LinkMode::Shared => &self.shared,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ForgeError;
    use crate::test_support::{fake_toolchain, test_context};
    use crate::toolchain::{detect, CompilerFamily, GccToolchain};
    use tempfile::TempDir;

    fn posix_gcc() -> Arc<dyn Toolchain> {
        Arc::new(GccToolchain::new(
            "gcc".into(),
            "g++".into(),
            "ar".into(),
            CompilerFamily::Gcc,
        ))
    }

    #[test]
    fn test_library_names() {
        let pair = BuilderPair::new(
            posix_gcc(),
            Language::Cxx,
            &Platform::parse("linux").unwrap(),
            &[],
            &[],
            &[],
            false,
        );
        assert_eq!(pair.static_.lib_file_name("judy"), "libjudy_static.a");
        assert_eq!(pair.shared.lib_file_name("judy"), "libjudy_dynamic.so");
        assert_eq!(pair.shared.link_name("judy"), "judy_dynamic");
        assert_ne!(pair.static_.identity(), pair.shared.identity());
    }

    #[test]
    fn test_flags_change_identity() {
        let linux = Platform::parse("linux").unwrap();
        let a = Builder::new(posix_gcc(), Language::C, LinkMode::Static, linux.clone(), &[], vec![], vec![], false);
        let b = Builder::new(posix_gcc(), Language::C, LinkMode::Static, linux, &["-DX".into()], vec![], vec![], false);
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_parse_macro() {
        assert_eq!(parse_macro("BUILD_RE2"), ("BUILD_RE2".into(), None));
        assert_eq!(parse_macro("N=3"), ("N".into(), Some("3".into())));
    }

    #[test]
    fn test_compile_is_cached_by_content() {
        let tmp = TempDir::new().unwrap();
        let fake = fake_toolchain(&tmp.path().join("tools"));
        let ctx = test_context(tmp.path());
        let platform = Platform::parse("linux").unwrap();
        let tc = detect(&platform, Some(&fake.cc), Some(&fake.cxx)).unwrap().into_toolchain();
        let builder = Builder::new(tc, Language::C, LinkMode::Static, platform, &[], vec![], vec![], false);

        let src = ctx.src("judy.c");
        std::fs::write(&src, "int judy;").unwrap();
        let obj_dir = ctx.out("obj");

        let obj = builder.compile(&ctx, &src, &obj_dir, &CompileOpts::default()).unwrap();
        assert!(obj.exists());
        assert_eq!(fake.invocations(), 1);

        builder.compile(&ctx, &src, &obj_dir, &CompileOpts::default()).unwrap();
        assert_eq!(fake.invocations(), 1);

        std::fs::write(&src, "int judy2;").unwrap();
        builder.compile(&ctx, &src, &obj_dir, &CompileOpts::default()).unwrap();
        assert_eq!(fake.invocations(), 2);
    }

    #[test]
    fn test_build_lib_and_failure() {
        let tmp = TempDir::new().unwrap();
        let fake = fake_toolchain(&tmp.path().join("tools"));
        let ctx = test_context(tmp.path());
        let platform = Platform::parse("linux").unwrap();
        let tc = detect(&platform, Some(&fake.cc), Some(&fake.cxx)).unwrap().into_toolchain();
        let pair = BuilderPair::new(tc, Language::C, &platform, &[], &[], &[], false);

        let a = ctx.src("a.c");
        let b = ctx.src("b.c");
        std::fs::write(&a, "int a;").unwrap();
        std::fs::write(&b, "int b;").unwrap();
        let lib_dir = ctx.out("lib/rtl");

        let lib = pair
            .static_
            .build_lib(&ctx, "ab", &[a.clone(), b], &lib_dir, &CompileOpts::default(), &LinkOpts::default())
            .unwrap();
        assert_eq!(lib, lib_dir.join("libab_static.a"));
        assert!(lib.exists());

        let broken = ctx.src("broken.c");
        std::fs::write(&broken, "absent_symbol").unwrap();
        let err = pair
            .static_
            .build_lib(&ctx, "broken", &[a, broken], &lib_dir, &CompileOpts::default(), &LinkOpts::default())
            .unwrap_err();
        assert!(matches!(
            error::category(&err),
            Some(ForgeError::ExecutionError { .. })
        ));
    }

    #[test]
    fn test_check_header() {
        let tmp = TempDir::new().unwrap();
        let fake = fake_toolchain(&tmp.path().join("tools"));
        let ctx = test_context(tmp.path());
        let platform = Platform::parse("linux").unwrap();
        let tc = detect(&platform, Some(&fake.cc), Some(&fake.cxx)).unwrap().into_toolchain();
        let builder = Builder::new(tc, Language::C, LinkMode::Static, platform, &[], vec![], vec![], false);

        assert!(builder.check_header(&ctx, "stdio.h").unwrap());
        assert!(!builder.check_header(&ctx, "absent_gmp.h").unwrap());
    }
}
