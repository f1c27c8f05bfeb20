//! Build options and configuration files.
//!
//! Options are layered from three sources, highest precedence first:
//! - command line flags (and `TOOLFORGE_*` environment variables)
//! - project config: `.toolforge/config.toml`
//! - global config: `~/.toolforge/config.toml`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One of the three build roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The machine running this driver.
    Build,
    /// The machine running build-time tools.
    Host,
    /// The machine the produced artifacts run on.
    Target,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Build => "build",
            Role::Host => "host",
            Role::Target => "target",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-role toolchain overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleOptions {
    /// Platform tags or alias (e.g. `linux`, `posix,darwin`).
    pub platform: Option<String>,
    pub cc: Option<PathBuf>,
    pub cxx: Option<PathBuf>,
    pub includes: Vec<PathBuf>,
    pub libpaths: Vec<PathBuf>,
    pub c_flags: Vec<String>,
    /// Build this role's C code with debug info.
    pub c_debug: bool,
}

impl RoleOptions {
    fn merge(&mut self, other: RoleOptions) {
        if other.platform.is_some() {
            self.platform = other.platform;
        }
        if other.cc.is_some() {
            self.cc = other.cc;
        }
        if other.cxx.is_some() {
            self.cxx = other.cxx;
        }
        if !other.includes.is_empty() {
            self.includes = other.includes;
        }
        if !other.libpaths.is_empty() {
            self.libpaths = other.libpaths;
        }
        if !other.c_flags.is_empty() {
            self.c_flags = other.c_flags;
        }
        self.c_debug |= other.c_debug;
    }
}

/// Tools only the host role needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostExtras {
    pub ocaml_debug: bool,
    pub ocamlc: Option<PathBuf>,
    pub ocamlopt: Option<PathBuf>,
    pub ocamllex: Option<PathBuf>,
    pub llvm_config: Option<PathBuf>,
}

impl HostExtras {
    fn merge(&mut self, other: HostExtras) {
        self.ocaml_debug |= other.ocaml_debug;
        if other.ocamlc.is_some() {
            self.ocamlc = other.ocamlc;
        }
        if other.ocamlopt.is_some() {
            self.ocamlopt = other.ocamlopt;
        }
        if other.ocamllex.is_some() {
            self.ocamllex = other.ocamllex;
        }
        if other.llvm_config.is_some() {
            self.llvm_config = other.llvm_config;
        }
    }
}

/// Tools only the target role needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetExtras {
    pub sdl_config: Option<PathBuf>,
}

/// Fully resolved options for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub prefix: PathBuf,
    pub bindir: Option<PathBuf>,
    pub libdir: Option<PathBuf>,
    /// Include paths added to every role.
    pub includes: Vec<PathBuf>,
    /// Library paths added to every role.
    pub libpaths: Vec<PathBuf>,
    /// C flags added to every role.
    pub c_flags: Vec<String>,
    pub debug: bool,
    pub skip_tests: bool,
    pub buildroot: PathBuf,
    pub source_root: PathBuf,
    /// Worker count; `None` means one per CPU.
    pub jobs: Option<usize>,
    pub verbose: bool,
    pub build: RoleOptions,
    pub host: RoleOptions,
    pub target: RoleOptions,
    pub host_extras: HostExtras,
    pub target_extras: TargetExtras,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            prefix: PathBuf::from("/usr/local"),
            bindir: None,
            libdir: None,
            includes: Vec::new(),
            libpaths: Vec::new(),
            c_flags: Vec::new(),
            debug: false,
            skip_tests: false,
            buildroot: PathBuf::from("build"),
            source_root: PathBuf::from("."),
            jobs: None,
            verbose: false,
            build: RoleOptions::default(),
            host: RoleOptions::default(),
            target: RoleOptions::default(),
            host_extras: HostExtras::default(),
            target_extras: TargetExtras::default(),
        }
    }
}

impl Options {
    pub fn bindir(&self) -> PathBuf {
        self.bindir
            .clone()
            .unwrap_or_else(|| self.prefix.join("bin"))
    }

    pub fn libdir(&self) -> PathBuf {
        self.libdir
            .clone()
            .unwrap_or_else(|| self.prefix.join("lib"))
    }

    /// `<buildroot>/debug` or `<buildroot>/release`.
    pub fn output_root(&self) -> PathBuf {
        self.buildroot
            .join(if self.debug { "debug" } else { "release" })
    }

    pub fn role(&self, role: Role) -> &RoleOptions {
        match role {
            Role::Build => &self.build,
            Role::Host => &self.host,
            Role::Target => &self.target,
        }
    }

    /// Whether C code for `role` is built with debug info.
    pub fn role_debug(&self, role: Role) -> bool {
        self.debug || self.role(role).c_debug
    }

    /// Global and per-role include paths, global first.
    pub fn role_includes(&self, role: Role) -> Vec<PathBuf> {
        self.includes
            .iter()
            .chain(&self.role(role).includes)
            .cloned()
            .collect()
    }

    pub fn role_libpaths(&self, role: Role) -> Vec<PathBuf> {
        self.libpaths
            .iter()
            .chain(&self.role(role).libpaths)
            .cloned()
            .collect()
    }

    pub fn role_c_flags(&self, role: Role) -> Vec<String> {
        self.c_flags
            .iter()
            .chain(&self.role(role).c_flags)
            .cloned()
            .collect()
    }

    /// Apply file configuration underneath values already set on the
    /// command line. Only fields the command line left at their defaults
    /// are filled in.
    pub fn apply_file_config(&mut self, file: FileConfig) {
        let defaults = Options::default();

        if self.prefix == defaults.prefix {
            if let Some(prefix) = file.install.prefix {
                self.prefix = prefix;
            }
        }
        if self.bindir.is_none() {
            self.bindir = file.install.bindir;
        }
        if self.libdir.is_none() {
            self.libdir = file.install.libdir;
        }
        if self.buildroot == defaults.buildroot {
            if let Some(buildroot) = file.build.buildroot {
                self.buildroot = buildroot;
            }
        }
        if self.jobs.is_none() {
            self.jobs = file.build.jobs;
        }

        for (role, from_file) in [
            (Role::Build, file.build_role),
            (Role::Host, file.host),
            (Role::Target, file.target),
        ] {
            let mut merged = from_file;
            merged.merge(self.role(role).clone());
            match role {
                Role::Build => self.build = merged,
                Role::Host => self.host = merged,
                Role::Target => self.target = merged,
            }
        }

        let mut host_extras = file.host_extras;
        host_extras.merge(self.host_extras.clone());
        self.host_extras = host_extras;

        if self.target_extras.sdl_config.is_none() {
            self.target_extras.sdl_config = file.target_extras.sdl_config;
        }
    }
}

/// Contents of a `config.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub install: InstallConfig,
    pub build: BuildConfig,
    #[serde(rename = "build-role")]
    pub build_role: RoleOptions,
    pub host: RoleOptions,
    pub target: RoleOptions,
    #[serde(rename = "host-tools")]
    pub host_extras: HostExtras,
    #[serde(rename = "target-tools")]
    pub target_extras: TargetExtras,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub prefix: Option<PathBuf>,
    pub bindir: Option<PathBuf>,
    pub libdir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub buildroot: Option<PathBuf>,
    pub jobs: Option<usize>,
}

impl FileConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: FileConfig) {
        if other.install.prefix.is_some() {
            self.install.prefix = other.install.prefix;
        }
        if other.install.bindir.is_some() {
            self.install.bindir = other.install.bindir;
        }
        if other.install.libdir.is_some() {
            self.install.libdir = other.install.libdir;
        }
        if other.build.buildroot.is_some() {
            self.build.buildroot = other.build.buildroot;
        }
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        self.build_role.merge(other.build_role);
        self.host.merge(other.host);
        self.target.merge(other.target);
        self.host_extras.merge(other.host_extras);
        if other.target_extras.sdl_config.is_some() {
            self.target_extras.sdl_config = other.target_extras.sdl_config;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// A file that fails to parse is an error; a missing file is skipped.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<FileConfig> {
    let mut config = FileConfig::default();

    if let Some(global_path) = global_path.filter(|p| p.exists()) {
        config.merge(FileConfig::load(global_path)?);
    }

    if project_path.exists() {
        config.merge(FileConfig::load(project_path)?);
    }

    Ok(config)
}

/// Get the global config directory (`~/.toolforge`).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".toolforge"))
}

pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

pub fn project_config_path(source_root: &Path) -> PathBuf {
    source_root.join(".toolforge").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_root() {
        let mut opts = Options::default();
        assert_eq!(opts.output_root(), PathBuf::from("build/release"));
        opts.debug = true;
        assert_eq!(opts.output_root(), PathBuf::from("build/debug"));
    }

    #[test]
    fn test_install_dirs_default_under_prefix() {
        let opts = Options {
            prefix: PathBuf::from("/opt/forge"),
            ..Options::default()
        };
        assert_eq!(opts.bindir(), PathBuf::from("/opt/forge/bin"));
        assert_eq!(opts.libdir(), PathBuf::from("/opt/forge/lib"));
    }

    #[test]
    fn test_role_flags_are_global_then_role() {
        let mut opts = Options::default();
        opts.c_flags = vec!["-DGLOBAL".into()];
        opts.target.c_flags = vec!["-DTARGET".into()];
        opts.target.c_debug = true;

        assert_eq!(opts.role_c_flags(Role::Target), vec!["-DGLOBAL", "-DTARGET"]);
        assert_eq!(opts.role_c_flags(Role::Host), vec!["-DGLOBAL"]);
        assert!(opts.role_debug(Role::Target));
        assert!(!opts.role_debug(Role::Build));
    }

    #[test]
    fn test_project_config_overrides_global() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = tmp.path().join("project.toml");

        std::fs::write(
            &global,
            "[install]\nprefix = \"/global\"\nlibdir = \"/global/lib64\"\n",
        )
        .unwrap();
        std::fs::write(&project, "[install]\nprefix = \"/project\"\n").unwrap();

        let config = load_config(Some(&global), &project).unwrap();
        assert_eq!(config.install.prefix, Some(PathBuf::from("/project")));
        assert_eq!(config.install.libdir, Some(PathBuf::from("/global/lib64")));
    }

    #[test]
    fn test_command_line_beats_file() {
        let file: FileConfig = toml::from_str(
            "[build]\njobs = 3\n[target]\ncc = \"/usr/bin/cross-gcc\"\n[host-tools]\nocamlopt = \"/opt/ocamlopt\"\n",
        )
        .unwrap();

        let mut opts = Options::default();
        opts.jobs = Some(8);
        opts.apply_file_config(file);

        assert_eq!(opts.jobs, Some(8));
        assert_eq!(opts.target.cc, Some(PathBuf::from("/usr/bin/cross-gcc")));
        assert_eq!(
            opts.host_extras.ocamlopt,
            Some(PathBuf::from("/opt/ocamlopt"))
        );
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("config.toml");
        std::fs::write(&project, "[install\nprefix=").unwrap();

        assert!(load_config(None, &project).is_err());
    }
}
