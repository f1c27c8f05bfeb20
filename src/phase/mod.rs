//! Toolchain environments for the three cross-compilation roles.
//!
//! A [`Phase`] bundles a platform with its C and C++ builder pairs. The
//! build, host and target roles each get one, but roles that resolve to the
//! same platform share a single `Arc<Phase>`: the host phase *is* the build
//! phase when their platforms agree. Role-specific extras (the front-end
//! toolchain for the host, optional libraries for the target) are
//! attached to the shared phase once through set-once cells.

pub mod resolve;
pub mod secondary;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::platform::{Capability, ConfigTool, Platform};
use crate::toolchain::{Builder, BuilderPair, Language, LinkMode};
use crate::util::config::Role;

pub use resolve::PhaseResolver;
pub use secondary::{SecondaryCompiler, SecondaryToolchain};

/// Tools resolved for the host role.
#[derive(Debug, Clone, Serialize)]
pub struct HostTools {
    pub secondary: Capability<SecondaryToolchain>,
    pub lexer: Capability<PathBuf>,
    /// Detected and logged, but always recorded as absent.
    pub llvm_config: Capability<ConfigTool>,
}

/// Optional tools resolved for the target role.
#[derive(Debug, Clone, Serialize)]
pub struct TargetTools {
    pub sdl_config: Capability<ConfigTool>,
}

/// A resolved toolchain environment.
#[derive(Debug)]
pub struct Phase {
    role: Role,
    platform: Platform,
    c: Arc<BuilderPair>,
    cxx: Arc<BuilderPair>,
    host: OnceLock<HostTools>,
    target: OnceLock<TargetTools>,
}

impl Phase {
    pub fn new(role: Role, platform: Platform, c: Arc<BuilderPair>, cxx: Arc<BuilderPair>) -> Self {
        Phase {
            role,
            platform,
            c,
            cxx,
            host: OnceLock::new(),
            target: OnceLock::new(),
        }
    }

    /// The role this phase was first constructed for.
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn c(&self) -> &BuilderPair {
        &self.c
    }

    pub fn cxx(&self) -> &BuilderPair {
        &self.cxx
    }

    pub fn builders(&self, lang: Language) -> &BuilderPair {
        match lang {
            Language::C => &self.c,
            Language::Cxx => &self.cxx,
        }
    }

    pub fn builder(&self, lang: Language, mode: LinkMode) -> &Arc<Builder> {
        self.builders(lang).get(mode)
    }

    pub fn host_tools(&self) -> Option<&HostTools> {
        self.host.get()
    }

    pub fn target_tools(&self) -> Option<&TargetTools> {
        self.target.get()
    }

    /// Attach host tools; the first attachment wins.
    pub(crate) fn attach_host(&self, tools: HostTools) -> &HostTools {
        self.host.get_or_init(|| tools)
    }

    pub(crate) fn attach_target(&self, tools: TargetTools) -> &TargetTools {
        self.target.get_or_init(|| tools)
    }

    pub fn summary(&self) -> PhaseSummary {
        let side = |pair: &BuilderPair| BuilderSummary {
            compiler: pair.static_.compiler().to_path_buf(),
            family: pair.static_.toolchain().family().as_str().to_string(),
            flags: pair.static_.flags().to_vec(),
        };
        PhaseSummary {
            role: self.role,
            platform: self.platform.tags().map(String::from).collect(),
            c: side(&self.c),
            cxx: side(&self.cxx),
            host: self.host.get().cloned(),
            target: self.target.get().cloned(),
        }
    }
}

/// The three role handles of one run.
#[derive(Debug, Clone)]
pub struct Phases {
    pub build: Arc<Phase>,
    pub host: Arc<Phase>,
    pub target: Arc<Phase>,
}

impl Phases {
    pub fn get(&self, role: Role) -> &Arc<Phase> {
        match role {
            Role::Build => &self.build,
            Role::Host => &self.host,
            Role::Target => &self.target,
        }
    }

    /// Host tools; always attached once the phases are resolved.
    pub fn host_tools(&self) -> Option<&HostTools> {
        self.host.host_tools()
    }

    pub fn summary(&self) -> PhasesSummary {
        let alias = |role: Role| {
            [Role::Build, Role::Host, Role::Target]
                .into_iter()
                .take_while(|r| *r != role)
                .find(|r| Arc::ptr_eq(self.get(*r), self.get(role)))
        };
        PhasesSummary {
            build: self.build.summary(),
            host: alias(Role::Host).map_or_else(|| RoleEntry::Own(self.host.summary()), RoleEntry::Alias),
            target: alias(Role::Target)
                .map_or_else(|| RoleEntry::Own(self.target.summary()), RoleEntry::Alias),
        }
    }
}

/// Serializable view of a phase, written to `config/phases.json`.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    pub role: Role,
    pub platform: Vec<String>,
    pub c: BuilderSummary,
    pub cxx: BuilderSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostTools>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetTools>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuilderSummary {
    pub compiler: PathBuf,
    pub family: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleEntry {
    /// Shares the phase of an earlier role.
    Alias(Role),
    Own(PhaseSummary),
}

#[derive(Debug, Clone, Serialize)]
pub struct PhasesSummary {
    pub build: PhaseSummary,
    pub host: RoleEntry,
    pub target: RoleEntry,
}
