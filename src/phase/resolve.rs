//! Resolution of the build, host and target phases.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use semver::Version;

use crate::cache::{CacheKey, Cached};
use crate::platform::{guess_platform, detect_config_tool, Capability, Platform};
use crate::toolchain::{detect, BuilderPair, DetectedToolchain, Language};
use crate::util::config::{Role, RoleOptions};
use crate::util::context::BuildContext;
use crate::util::shell::Status;

use super::secondary::{detect_lexer, detect_secondary};
use super::{HostTools, Phase, Phases, TargetTools};

const LLVM_MIN: Version = Version::new(2, 7, 0);
const SDL_MIN: Version = Version::new(1, 3, 0);

/// Environment variables that change what detection finds.
const DETECTION_ENV: &[&str] = &["CC", "CXX", "AR", "PATH"];

pub struct PhaseResolver<'a> {
    ctx: &'a BuildContext,
}

impl<'a> PhaseResolver<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        PhaseResolver { ctx }
    }

    /// Resolve all three roles in order.
    pub fn resolve_all(&self) -> Result<Phases> {
        let build = self.resolve_build()?;
        let host = self.resolve_host(&build)?;
        let target = self.resolve_target(&host)?;
        Ok(Phases {
            build,
            host,
            target,
        })
    }

    pub fn resolve_build(&self) -> Result<Arc<Phase>> {
        self.ctx.shell().status(Status::Configuring, "build phase");
        let platform = guess_platform(self.ctx.options().build.platform.as_deref())?;
        Ok(Arc::new(self.construct(Role::Build, platform)?))
    }

    /// The host phase, sharing `build` when the platforms agree. Always
    /// attaches the front-end toolchain and optional host tools.
    pub fn resolve_host(&self, build: &Arc<Phase>) -> Result<Arc<Phase>> {
        self.ctx.shell().status(Status::Configuring, "host phase");
        let phase = self.derive(Role::Host, Role::Build, build)?;

        let options = self.ctx.options();
        let extras = &options.host_extras;
        let debug = options.debug || extras.ocaml_debug;

        let secondary = self.cached_detect(
            "detect-ocaml",
            &[extras.ocamlopt.as_deref(), extras.ocamlc.as_deref()],
            debug,
            || detect_secondary(extras, debug),
        )?;
        match &secondary {
            Capability::Present(tc) => tracing::info!(
                "using {} ocaml compiler {} ({})",
                tc.kind.as_str(),
                tc.path.display(),
                tc.version
            ),
            Capability::Absent { reason } => tracing::warn!("no ocaml compiler: {}", reason),
        }

        let lexer = self.cached_detect("detect-ocamllex", &[extras.ocamllex.as_deref()], false, || {
            detect_lexer(extras.ocamllex.as_deref())
        })?;

        let llvm = self.cached_detect("detect-llvm-config", &[extras.llvm_config.as_deref()], false, || {
            detect_config_tool(
                "llvm-config",
                extras.llvm_config.as_deref(),
                &["llvm-config"],
                "--version",
                &LLVM_MIN,
            )
        })?;
        let llvm_config = match llvm {
            Capability::Present(tool) => {
                tracing::info!(
                    "found llvm-config {} at {}, but llvm support is disabled",
                    tool.version,
                    tool.path.display()
                );
                Capability::absent("llvm support is disabled")
            }
            absent => absent,
        };

        phase.attach_host(HostTools {
            secondary,
            lexer,
            llvm_config,
        });
        Ok(phase)
    }

    /// The target phase, sharing `host` when the platforms agree.
    pub fn resolve_target(&self, host: &Arc<Phase>) -> Result<Arc<Phase>> {
        self.ctx.shell().status(Status::Configuring, "target phase");
        let phase = self.derive(Role::Target, Role::Host, host)?;

        let sdl = self.ctx.options().target_extras.sdl_config.as_deref();
        let sdl_config = self.cached_detect("detect-sdl-config", &[sdl], false, || {
            detect_config_tool("sdl-config", sdl, &["sdl-config"], "--version", &SDL_MIN)
        })?;

        phase.attach_target(TargetTools { sdl_config });
        Ok(phase)
    }

    /// Reuse `previous`, the phase of role `prev`, when `role` resolves to
    /// the same platform, otherwise configure a fresh phase.
    fn derive(&self, role: Role, prev: Role, previous: &Arc<Phase>) -> Result<Arc<Phase>> {
        let requested = self.ctx.options().role(role);
        let platform = match requested.platform.as_deref() {
            Some(p) => Platform::parse(p)?,
            None => previous.platform().clone(),
        };

        if &platform == previous.platform() {
            self.ctx
                .shell()
                .note(format!("using {}'s c and cxx compiler", prev));
            tracing::info!("{} phase shares the {} phase ({})", role, prev, platform);
            let ignored = ignored_overrides(requested);
            if !ignored.is_empty() {
                let flags: Vec<String> =
                    ignored.iter().map(|o| format!("--{}-{}", role, o)).collect();
                self.ctx.shell().warn(format!(
                    "{} ignored: {} platform matches {}",
                    flags.join(", "),
                    role,
                    prev
                ));
            }
            return Ok(previous.clone());
        }

        Ok(Arc::new(self.construct(role, platform)?))
    }

    fn construct(&self, role: Role, platform: Platform) -> Result<Phase> {
        let options = self.ctx.options();
        let detected = self.detect_toolchain(role, &platform)?;
        tracing::info!(
            "{} phase: {} on {} ({})",
            role,
            detected.family.as_str(),
            platform,
            detected.cc.display()
        );

        let includes = options.role_includes(role);
        let libpaths = options.role_libpaths(role);
        let flags = options.role_c_flags(role);
        let debug = options.role_debug(role);

        let key = CacheKey::builder("builders")
            .value(&detected)?
            .str(&platform.to_string())
            .strs(&flags)
            .paths(&includes)
            .paths(&libpaths)
            .flag(debug)
            .finish();

        let toolchain = detected.into_toolchain();
        let make = |lang: Language| {
            self.ctx.cache().memo(&format!("{}:{}", key, lang.as_str()), || {
                Ok(BuilderPair::new(
                    toolchain.clone(),
                    lang,
                    &platform,
                    &flags,
                    &includes,
                    &libpaths,
                    debug,
                ))
            })
        };
        let c = make(Language::C)?;
        let cxx = make(Language::Cxx)?;

        Ok(Phase::new(role, platform, c, cxx))
    }

    fn detect_toolchain(&self, role: Role, platform: &Platform) -> Result<DetectedToolchain> {
        let requested = self.ctx.options().role(role);

        let mut key = CacheKey::builder("detect-toolchain")
            .str(&platform.to_string())
            .opt(requested.cc.as_deref().and_then(Path::to_str))
            .opt(requested.cxx.as_deref().and_then(Path::to_str));
        for var in DETECTION_ENV {
            key = key.opt(std::env::var(var).ok().as_deref());
        }

        self.ctx
            .cache()
            .call(&key.finish(), || {
                Ok(detect(platform, requested.cc.as_deref(), requested.cxx.as_deref())?)
            })
            .with_context(|| format!("failed to configure the {} phase", role))
    }

    /// Run a detection through the cache, keyed on its explicit paths and
    /// `PATH`. Absent results are cached like present ones.
    fn cached_detect<T, F>(
        &self,
        op: &str,
        explicit: &[Option<&Path>],
        flag: bool,
        detect: F,
    ) -> Result<Capability<T>>
    where
        Capability<T>: Cached,
        F: FnOnce() -> Capability<T>,
    {
        let mut key = CacheKey::builder(op).flag(flag);
        for path in explicit {
            key = key.opt(path.and_then(Path::to_str));
        }
        key = key.opt(std::env::var("PATH").ok().as_deref());
        self.ctx.cache().call(&key.finish(), || Ok(detect()))
    }
}

/// Role overrides that have no effect when the role shares a phase.
fn ignored_overrides(requested: &RoleOptions) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if requested.cc.is_some() {
        ignored.push("cc");
    }
    if requested.cxx.is_some() {
        ignored.push("cxx");
    }
    if !requested.c_flags.is_empty() {
        ignored.push("c-flag");
    }
    if !requested.includes.is_empty() {
        ignored.push("include");
    }
    if !requested.libpaths.is_empty() {
        ignored.push("library-path");
    }
    ignored
}
