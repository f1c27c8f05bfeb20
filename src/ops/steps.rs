//! The leaf steps of the standard build.
//!
//! Native code for the runtime, drivers and tools is built for the target
//! phase. The front end is built with the host's OCaml toolchain, since it
//! runs wherever the builder runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;

use crate::core::{CopySpec, ExecutableSpec, FrontendSpec, LibrarySpec, Manifest, ToolSpec};
use crate::ops::build::{library_ids, ComponentResult, LeafStep, Stage, StepId, StepInputs};
use crate::ops::compiler::TargetCompiler;
use crate::ops::copy::{copy_if_changed, copy_spec};
use crate::phase::secondary::{run_lexer, ModuleOpts};
use crate::platform::Capability;
use crate::toolchain::{CompileOpts, Language, LinkMode, LinkOpts};
use crate::util::context::BuildContext;
use crate::util::fs::{exclude_files, glob_files, glob_files_ordered, write_if_changed};
use crate::util::hash::Fingerprint;

/// Directory of runtime libraries and their published headers.
const RTL_DIR: &str = "lib/rtl";

/// File the builder reads its configuration from.
pub const BUILDER_CONFIG: &str = "config/target/builder.toml";

fn sources(
    ctx: &BuildContext,
    what: &str,
    patterns: &[String],
    exclude: &[String],
) -> Result<Vec<PathBuf>> {
    let files = glob_files(ctx.source_root(), patterns)?;
    let files = exclude_files(ctx.source_root(), files, exclude)?;
    if files.is_empty() {
        bail!("no sources for {} match {}", what, patterns.join(", "));
    }
    Ok(files)
}

/// Include directories for executables: their own, then every published
/// runtime header.
fn native_includes(ctx: &BuildContext, own: &[String]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = own.iter().map(|d| ctx.src(d)).collect();
    dirs.push(ctx.out(RTL_DIR));
    dirs.push(ctx.out("config/target"));
    dirs
}

/// Front-end compiler, built from OCaml modules.
#[derive(Debug)]
pub struct FrontendStep {
    spec: FrontendSpec,
}

impl FrontendStep {
    pub fn new(spec: FrontendSpec) -> Self {
        FrontendStep { spec }
    }
}

impl LeafStep for FrontendStep {
    fn id(&self) -> StepId {
        StepId::new(Stage::Frontend, self.spec.name.as_str())
    }

    fn run(&self, inputs: &StepInputs<'_>) -> Result<ComponentResult> {
        let ctx = inputs.ctx;
        let tools = inputs
            .phases
            .host_tools()
            .ok_or_else(|| anyhow!("host tools were not resolved"))?;
        let ocaml = match &tools.secondary {
            Capability::Present(tc) => tc,
            Capability::Absent { reason } => bail!("no ocaml compiler: {}", reason),
        };

        let gen_dir = ctx.out("gen").join(&self.spec.name);
        let mut modules = Vec::new();
        if !self.spec.lexers.is_empty() {
            let ocamllex = match &tools.lexer {
                Capability::Present(path) => path,
                Capability::Absent { reason } => {
                    bail!("`{}` has lexers but ocamllex is missing: {}", self.spec.name, reason)
                }
            };
            for lexer in glob_files_ordered(ctx.source_root(), &self.spec.lexers)? {
                modules.push(run_lexer(ctx, ocamllex, &lexer, &gen_dir)?);
            }
        }
        modules.extend(glob_files_ordered(ctx.source_root(), &self.spec.sources)?);
        if modules.is_empty() {
            bail!("no sources for `{}`", self.spec.name);
        }

        let mut includes = vec![gen_dir];
        includes.extend(self.spec.includes.iter().map(|d| ctx.src(d)));
        let opts = ModuleOpts {
            includes,
            libs: self.spec.libs.clone(),
        };

        let exe = format!(
            "{}{}",
            self.spec.name,
            inputs.phases.host.platform().exe_suffix()
        );
        let output = ctx.out("bin").join(exe);
        ocaml
            .build_exe(ctx, &self.spec.name, &modules, &opts, &output)
            .map(ComponentResult::single)
    }
}

/// A runtime library or stdlib binding, built static and shared for the
/// target.
#[derive(Debug)]
pub struct LibraryStep {
    stage: Stage,
    spec: LibrarySpec,
    deps: Vec<StepId>,
    /// Header patterns of this library and its direct dependencies.
    headers: Vec<String>,
}

impl LibraryStep {
    pub fn new(stage: Stage, spec: LibrarySpec, manifest: &Manifest) -> Result<Self> {
        let deps = library_ids(manifest, &spec.deps, &format!("library `{}`", spec.name))?;
        let mut headers = spec.headers.clone();
        for lib in manifest.libraries().filter(|l| spec.deps.contains(&l.name)) {
            headers.extend(lib.headers.iter().cloned());
        }
        Ok(LibraryStep {
            stage,
            spec,
            deps,
            headers,
        })
    }

    /// Libraries compile against header sources, not `lib/rtl`, which
    /// fills up as later libraries publish theirs.
    fn includes(&self, ctx: &BuildContext) -> Result<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = self.spec.includes.iter().map(|d| ctx.src(d)).collect();
        for header in glob_files(ctx.source_root(), &self.headers)? {
            if let Some(dir) = header.parent() {
                if !dirs.iter().any(|d| d == dir) {
                    dirs.push(dir.to_path_buf());
                }
            }
        }
        dirs.push(ctx.out("config/target"));
        Ok(dirs)
    }

    fn publish_headers(&self, ctx: &BuildContext) -> Result<()> {
        if self.spec.headers.is_empty() {
            return Ok(());
        }
        let rtl = ctx.out(RTL_DIR);
        for header in glob_files(ctx.source_root(), &self.spec.headers)? {
            let Some(name) = header.file_name() else { continue };
            copy_if_changed(&header, &rtl.join(name))?;
        }
        Ok(())
    }
}

impl LeafStep for LibraryStep {
    fn id(&self) -> StepId {
        StepId::new(self.stage, self.spec.name.as_str())
    }

    fn requires(&self) -> Vec<StepId> {
        self.deps.clone()
    }

    fn run(&self, inputs: &StepInputs<'_>) -> Result<ComponentResult> {
        let ctx = inputs.ctx;
        let pair = inputs.phases.target.builders(self.spec.lang);
        let srcs = sources(
            ctx,
            &format!("library `{}`", self.spec.name),
            &self.spec.sources,
            &self.spec.exclude,
        )?;

        self.publish_headers(ctx)?;

        let mut macros = self.spec.macros.clone();
        macros.push(format!("BUILD_{}", self.spec.name.to_uppercase()));
        let compile = CompileOpts {
            includes: self.includes(ctx)?,
            macros,
        };
        let lib_dir = ctx.out(RTL_DIR);

        let static_ = pair
            .static_
            .build_lib(ctx, &self.spec.name, &srcs, &lib_dir, &compile, &LinkOpts::default())?;

        let mut libs = Vec::new();
        for dep in &self.deps {
            inputs.result(dep)?;
            libs.push(pair.shared.link_name(&dep.name));
        }
        libs.extend(self.spec.system_libs.iter().cloned());
        let link = LinkOpts {
            archives: Vec::new(),
            libs,
            libpaths: vec![lib_dir.clone()],
        };
        let shared = pair
            .shared
            .build_lib(ctx, &self.spec.name, &srcs, &lib_dir, &compile, &link)?;

        Ok(ComponentResult::new(static_, shared))
    }
}

/// Standard library sources copied into the output tree.
#[derive(Debug)]
pub struct StdlibStep {
    copies: Vec<CopySpec>,
}

impl StdlibStep {
    pub fn new(copies: Vec<CopySpec>) -> Self {
        StdlibStep { copies }
    }
}

impl LeafStep for StdlibStep {
    fn id(&self) -> StepId {
        StepId::new(Stage::Stdlib, "stdlib")
    }

    /// Result is a digest file of everything copied, so programs compiled
    /// against the library can key on it.
    fn run(&self, inputs: &StepInputs<'_>) -> Result<ComponentResult> {
        let ctx = inputs.ctx;
        let mut fp = Fingerprint::new();
        for spec in &self.copies {
            for file in copy_spec(ctx, spec)? {
                fp.update_path(&file).update_file(&file)?;
            }
        }

        let digest = ctx.out("config/stdlib.digest");
        write_if_changed(&digest, fp.finish().as_bytes())?;
        Ok(ComponentResult::single(digest))
    }
}

/// Read the digest written by [`StdlibStep`].
pub fn stdlib_digest(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .with_context(|| format!("failed to read {}", path.display()))
}

/// A native executable linked against earlier libraries: runtime drivers
/// and platform support tools.
#[derive(Debug)]
pub struct ExecutableStep {
    stage: Stage,
    spec: ExecutableSpec,
    /// Platform tag the target must have.
    requires: Option<String>,
    libs: Vec<StepId>,
}

impl ExecutableStep {
    pub fn new(
        stage: Stage,
        spec: ExecutableSpec,
        requires: Option<String>,
        manifest: &Manifest,
    ) -> Result<Self> {
        let libs = library_ids(manifest, &spec.libs, &format!("`{}`", spec.name))?;
        Ok(ExecutableStep {
            stage,
            spec,
            requires,
            libs,
        })
    }
}

impl LeafStep for ExecutableStep {
    fn id(&self) -> StepId {
        StepId::new(self.stage, self.spec.name.as_str())
    }

    fn requires(&self) -> Vec<StepId> {
        self.libs.clone()
    }

    fn skip_reason(&self, inputs: &StepInputs<'_>) -> Option<String> {
        let tag = self.requires.as_deref()?;
        let target = inputs.phases.target.platform();
        (!target.contains(tag)).then(|| format!("target {} is not {}", target, tag))
    }

    fn run(&self, inputs: &StepInputs<'_>) -> Result<ComponentResult> {
        let ctx = inputs.ctx;
        let builder = inputs.phases.target.builder(self.spec.lang, LinkMode::Static);
        let srcs = sources(ctx, &format!("`{}`", self.spec.name), &self.spec.sources, &[])?;

        let compile = CompileOpts {
            includes: native_includes(ctx, &self.spec.includes),
            macros: self.spec.macros.clone(),
        };
        let archives = self
            .libs
            .iter()
            .map(|id| inputs.result(id).map(|r| r.static_.clone()))
            .collect::<Result<Vec<_>>>()?;
        let link = LinkOpts {
            archives,
            libs: self.spec.system_libs.clone(),
            libpaths: Vec::new(),
        };

        builder
            .build_exe(ctx, &self.spec.name, &srcs, &ctx.out("bin"), &compile, &link)
            .map(ComponentResult::single)
    }
}

/// Written to [`BUILDER_CONFIG`]; the builder tool reads it at run time to
/// find the front end, the drivers and the target C++ compiler.
#[derive(Debug, Serialize)]
struct BuilderConfig {
    root: PathBuf,
    debug: bool,
    frontend: Option<PathBuf>,
    drivers: BTreeMap<String, PathBuf>,
    cxx: PathBuf,
    cxx_flags: Vec<String>,
    lib_dir: PathBuf,
}

/// The builder tool: a target C++ program configured with the paths of the
/// front end and the drivers.
#[derive(Debug)]
pub struct BuilderStep {
    spec: ExecutableSpec,
    frontend: Option<StepId>,
    drivers: Vec<StepId>,
    libs: Vec<StepId>,
}

impl BuilderStep {
    pub fn new(
        spec: ExecutableSpec,
        frontend: Option<StepId>,
        drivers: Vec<StepId>,
        manifest: &Manifest,
    ) -> Result<Self> {
        let libs = library_ids(manifest, &spec.libs, &format!("`{}`", spec.name))?;
        Ok(BuilderStep {
            spec,
            frontend,
            drivers,
            libs,
        })
    }

    fn write_config(&self, inputs: &StepInputs<'_>) -> Result<PathBuf> {
        let ctx = inputs.ctx;
        let cxx = inputs.phases.target.builder(Language::Cxx, LinkMode::Static);

        let frontend = match &self.frontend {
            Some(id) => Some(inputs.result(id)?.static_.clone()),
            None => None,
        };
        let mut drivers = BTreeMap::new();
        for id in &self.drivers {
            drivers.insert(id.name.clone(), inputs.result(id)?.static_.clone());
        }

        let config = BuilderConfig {
            root: ctx.output_root().to_path_buf(),
            debug: ctx.options().debug,
            frontend,
            drivers,
            cxx: cxx.compiler().to_path_buf(),
            cxx_flags: cxx.flags().to_vec(),
            lib_dir: ctx.out(RTL_DIR),
        };
        let text = toml::to_string_pretty(&config).context("failed to serialize builder config")?;

        let path = ctx.out(BUILDER_CONFIG);
        write_if_changed(&path, text.as_bytes())?;
        Ok(path)
    }
}

impl LeafStep for BuilderStep {
    fn id(&self) -> StepId {
        StepId::new(Stage::Builder, self.spec.name.as_str())
    }

    fn requires(&self) -> Vec<StepId> {
        self.frontend
            .iter()
            .chain(&self.drivers)
            .chain(&self.libs)
            .cloned()
            .collect()
    }

    fn run(&self, inputs: &StepInputs<'_>) -> Result<ComponentResult> {
        let ctx = inputs.ctx;
        let config = self.write_config(inputs)?;
        let builder = inputs.phases.target.builder(Language::Cxx, LinkMode::Static);
        let srcs = sources(ctx, &format!("`{}`", self.spec.name), &self.spec.sources, &[])?;

        let mut macros = self.spec.macros.clone();
        macros.push(format!("TOOLFORGE_BUILDER_CONFIG=\"{}\"", config.display()));
        let compile = CompileOpts {
            includes: native_includes(ctx, &self.spec.includes),
            macros,
        };
        let archives = self
            .libs
            .iter()
            .map(|id| inputs.result(id).map(|r| r.static_.clone()))
            .collect::<Result<Vec<_>>>()?;
        let link = LinkOpts {
            archives,
            libs: self.spec.system_libs.clone(),
            libpaths: Vec::new(),
        };

        builder
            .build_exe(ctx, &self.spec.name, &srcs, &ctx.out("bin"), &compile, &link)
            .map(ComponentResult::single)
    }
}

/// A tool written in the target language, compiled with the builder.
#[derive(Debug)]
pub struct ToolStep {
    spec: ToolSpec,
    builder: StepId,
    stdlib: StepId,
}

impl ToolStep {
    pub fn new(spec: ToolSpec, builder: StepId, stdlib: StepId) -> Self {
        ToolStep {
            spec,
            builder,
            stdlib,
        }
    }
}

impl LeafStep for ToolStep {
    fn id(&self) -> StepId {
        StepId::new(Stage::Tool, self.spec.name.as_str())
    }

    fn requires(&self) -> Vec<StepId> {
        vec![self.builder.clone(), self.stdlib.clone()]
    }

    fn run(&self, inputs: &StepInputs<'_>) -> Result<ComponentResult> {
        let ctx = inputs.ctx;
        let exe = &inputs.result(&self.builder)?.static_;
        let stdlib = stdlib_digest(&inputs.result(&self.stdlib)?.static_)?;
        let compiler = TargetCompiler::new(
            exe,
            ctx.output_root(),
            ctx.options().debug,
            inputs.phases.target.platform(),
            &stdlib,
        )?;

        compiler
            .compile(
                ctx,
                &ctx.src(&self.spec.source),
                &ctx.out("bin").join(&self.spec.name),
                self.spec.static_link,
            )
            .map(ComponentResult::single)
    }
}
