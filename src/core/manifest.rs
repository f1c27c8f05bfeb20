//! Forge.toml manifest parsing and schema.
//!
//! The manifest names the leaf units of the build: which sources make up the
//! front end, the runtime libraries, the drivers and so on. How and in which
//! order they are built is fixed by the orchestrator.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::toolchain::Language;

/// File name of the manifest at the source root.
pub const MANIFEST_FILE: &str = "Forge.toml";

/// The parsed Forge.toml manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub project: ProjectMeta,

    /// Front-end compiler, built with the host's secondary toolchain.
    #[serde(default)]
    pub frontend: Option<FrontendSpec>,

    /// Runtime libraries, built in order for the target.
    #[serde(default)]
    pub runtime: Vec<LibrarySpec>,

    #[serde(default)]
    pub stdlib: StdlibSpec,

    /// Runtime driver executables.
    #[serde(default, rename = "driver")]
    pub drivers: Vec<ExecutableSpec>,

    /// The builder tool that turns target-language programs into binaries.
    #[serde(default)]
    pub builder: Option<ExecutableSpec>,

    #[serde(default, rename = "support_tool")]
    pub support_tools: Vec<SupportToolSpec>,

    /// Tools written in the target language.
    #[serde(default, rename = "tool")]
    pub tools: Vec<ToolSpec>,

    #[serde(default, rename = "suite")]
    pub suites: Vec<SuiteSpec>,

    #[serde(default)]
    pub install: InstallSpec,

    #[serde(default)]
    pub doc: DocSpec,

    #[serde(default)]
    pub speed: SpeedSpec,
}

/// Project metadata from [project] section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: String,
    pub version: Version,
}

/// Front end, compiled with the secondary-language toolchain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendSpec {
    pub name: String,
    /// Module sources, in link order. Globs are expanded in place.
    pub sources: Vec<String>,
    /// Lexer definitions, turned into modules before compiling.
    pub lexers: Vec<String>,
    /// Libraries of the secondary language to link.
    pub libs: Vec<String>,
    pub includes: Vec<String>,
}

/// A native library, built both static and shared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySpec {
    pub name: String,
    pub sources: Vec<String>,
    pub exclude: Vec<String>,
    pub includes: Vec<String>,
    /// `NAME` or `NAME=VALUE`
    pub macros: Vec<String>,
    pub lang: Language,
    /// Earlier libraries this one links against.
    pub deps: Vec<String>,
    /// Headers published into `lib/rtl`.
    pub headers: Vec<String>,
    pub system_libs: Vec<String>,
}

/// Standard library: copied sources plus native bindings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StdlibSpec {
    pub copy: Vec<CopySpec>,
    pub bindings: Vec<LibrarySpec>,
}

/// Copy files matching `pattern` under `from` (source root) into `to`
/// (output root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySpec {
    pub from: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    pub to: String,
}

fn default_pattern() -> String {
    "**/*".to_string()
}

/// A native executable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutableSpec {
    pub name: String,
    pub sources: Vec<String>,
    pub includes: Vec<String>,
    pub macros: Vec<String>,
    pub lang: Language,
    /// Runtime or binding libraries linked statically.
    pub libs: Vec<String>,
    pub system_libs: Vec<String>,
}

/// A platform support tool, skipped when the target lacks `requires`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportToolSpec {
    #[serde(flatten)]
    pub exe: ExecutableSpec,
    /// Platform tag the target must carry, e.g. `posix`.
    #[serde(default)]
    pub requires: Option<String>,
}

/// A tool written in the target language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub source: String,
    #[serde(default, rename = "static")]
    pub static_link: bool,
}

/// A test suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSpec {
    pub name: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Optional suites only run when this resource is available.
    #[serde(default)]
    pub requires: Option<Requirement>,
    #[serde(default)]
    pub mode: SuiteMode,
    #[serde(default, rename = "static")]
    pub static_link: bool,
}

/// A resource an optional suite needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    /// A header usable with the target C compiler.
    Header(String),
    /// A target platform tag.
    Platform(String),
}

impl Requirement {
    pub fn describe(&self) -> &str {
        match self {
            Requirement::Header(h) => h,
            Requirement::Platform(p) => p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteMode {
    /// Compile, run and compare against a `.expect` file when present.
    #[default]
    Run,
    /// Compile only.
    Compile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSpec {
    /// Binaries from `bin/` copied into the install bindir.
    pub bins: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocSpec {
    pub copy: Vec<CopySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedSpec {
    pub sources: Vec<String>,
    /// Runs per program; the best time is reported.
    pub runs: u32,
}

impl Default for SpeedSpec {
    fn default() -> Self {
        SpeedSpec {
            sources: Vec::new(),
            runs: 1,
        }
    }
}

impl Manifest {
    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("invalid manifest: {}", path.display()))
    }

    /// Parse and validate manifest content.
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Manifest =
            toml::from_str(content).with_context(|| format!("failed to parse {}", MANIFEST_FILE))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            bail!("[project] name must not be empty");
        }

        let mut libs = HashSet::new();
        for lib in self.libraries() {
            if lib.name.is_empty() {
                bail!("library with empty name");
            }
            if !libs.insert(lib.name.as_str()) {
                bail!("library `{}` is defined more than once", lib.name);
            }
        }

        let mut exes = HashSet::new();
        let names = self
            .drivers
            .iter()
            .chain(self.builder.iter())
            .chain(self.support_tools.iter().map(|s| &s.exe))
            .map(|e| e.name.as_str())
            .chain(self.tools.iter().map(|t| t.name.as_str()))
            .chain(self.frontend.iter().map(|f| f.name.as_str()));
        for name in names {
            if !exes.insert(name) {
                bail!("executable `{}` is defined more than once", name);
            }
        }

        let mut suites = HashSet::new();
        for suite in &self.suites {
            if !suites.insert(suite.name.as_str()) {
                bail!("suite `{}` is defined more than once", suite.name);
            }
        }

        Ok(())
    }

    /// Runtime libraries followed by stdlib bindings.
    pub fn libraries(&self) -> impl Iterator<Item = &LibrarySpec> {
        self.runtime.iter().chain(&self.stdlib.bindings)
    }

    /// `<name>-<version>`
    pub fn versioned_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[project]
name = "felix"
version = "1.1.6"

[frontend]
name = "flxg"
sources = ["src/compiler/flx_core/*.ml", "src/compiler/flxg.ml"]
lexers = ["src/compiler/flx_lex.mll"]
libs = ["nums", "unix"]

[[runtime]]
name = "judy"
sources = ["src/judy/*.c"]
lang = "c"
macros = ["JU_64BIT"]

[[runtime]]
name = "re2"
sources = ["src/re2/**/*.cc"]
deps = ["judy"]

[stdlib]
copy = [{ from = "src/lib", pattern = "*.{flx,flxh}", to = "lib/std" }]

[[stdlib.bindings]]
name = "flx_glob"
sources = ["src/glob/*.c"]
lang = "c"

[[driver]]
name = "flx_run"
sources = ["src/rtl/flx_run.cxx"]
libs = ["judy", "re2"]

[builder]
name = "flx"
sources = ["src/tools/flx.cxx"]

[[support_tool]]
name = "timeout"
sources = ["src/tools/timeout.c"]
lang = "c"
requires = "posix"

[[tool]]
name = "flx_ls"
source = "src/tools/flx_ls.flx"

[[suite]]
name = "regress_rt"
sources = ["test/regress/rt/*.flx"]

[[suite]]
name = "gmp"
sources = ["test/gmp/*.flx"]
requires = { header = "gmp.h" }

[[suite]]
name = "zmq"
sources = ["test/zmq/*.flx"]
requires = { header = "zmq.h" }
mode = "compile"

[install]
bins = ["flx"]
"#;

    #[test]
    fn test_parse_sample() {
        let m = Manifest::parse(SAMPLE).unwrap();

        assert_eq!(m.project.name, "felix");
        assert_eq!(m.versioned_name(), "felix-1.1.6");
        assert_eq!(m.frontend.as_ref().unwrap().lexers.len(), 1);
        assert_eq!(m.runtime[0].lang, Language::C);
        assert_eq!(m.runtime[1].lang, Language::Cxx);
        assert_eq!(m.libraries().count(), 3);
        assert_eq!(m.stdlib.copy[0].pattern, "*.{flx,flxh}");
        assert_eq!(m.support_tools[0].requires.as_deref(), Some("posix"));
        assert_eq!(m.support_tools[0].exe.name, "timeout");
        assert_eq!(m.suites[1].requires, Some(Requirement::Header("gmp.h".into())));
        assert_eq!(m.suites[2].mode, SuiteMode::Compile);
        assert_eq!(m.speed.runs, 1);
    }

    #[test]
    fn test_duplicate_library_rejected() {
        let src = r#"
[project]
name = "x"
version = "0.1.0"

[[runtime]]
name = "judy"

[[stdlib.bindings]]
name = "judy"
"#;
        let err = Manifest::parse(src).unwrap_err();
        assert!(format!("{:#}", err).contains("more than once"));
    }

    #[test]
    fn test_bad_version_rejected() {
        let src = "[project]\nname = \"x\"\nversion = \"one\"\n";
        assert!(Manifest::parse(src).is_err());
    }
}
