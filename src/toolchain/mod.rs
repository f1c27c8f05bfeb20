//! C/C++ toolchains and the builders made from them.
//!
//! A [`Toolchain`] only knows how to spell commands for one compiler family.
//! A [`Builder`] adds a platform, a flag set and a link mode on top and runs
//! those commands through the cache.
//!
//! Toolchain detection priority:
//! 1. Explicit `--<role>-cc` / `--<role>-cxx`
//! 2. Environment variables (CC, CXX, AR)
//! 3. Auto-detection (searching PATH for common compilers)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

mod builder;
mod detect;
mod flags;
mod gcc;
mod msvc;

pub use builder::{Builder, BuilderPair, CompileOpts, LinkMode, LinkOpts};
pub use detect::{detect, DetectedToolchain};
pub use flags::FlagTable;
pub use gcc::GccToolchain;
pub use msvc::MsvcToolchain;

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Input for a compile step.
#[derive(Debug, Clone, Default)]
pub struct CompileInput {
    pub source: PathBuf,
    pub output: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    /// Preprocessor defines (name, optional value)
    pub defines: Vec<(String, Option<String>)>,
    pub cflags: Vec<String>,
    /// Position independent code, for objects going into shared libraries.
    pub pic: bool,
}

/// Input for an archive step (creating static library).
#[derive(Debug, Clone)]
pub struct ArchiveInput {
    pub objects: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Input for a link step.
#[derive(Debug, Clone, Default)]
pub struct LinkInput {
    pub objects: Vec<PathBuf>,
    /// Static archives linked by path, in order.
    pub archives: Vec<PathBuf>,
    pub output: PathBuf,
    pub lib_dirs: Vec<PathBuf>,
    /// Libraries to link (without -l prefix)
    pub libs: Vec<String>,
    pub ldflags: Vec<String>,
}

/// Compiler family of a toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilerFamily {
    Gcc,
    Clang,
    AppleClang,
    Msvc,
}

impl CompilerFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::Clang => "clang",
            CompilerFamily::AppleClang => "apple-clang",
            CompilerFamily::Msvc => "msvc",
        }
    }
}

/// Source language of a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    #[default]
    Cxx,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "cxx",
        }
    }
}

/// Generates compiler/archiver/linker commands for one compiler family.
pub trait Toolchain: std::fmt::Debug + Send + Sync {
    fn family(&self) -> CompilerFamily;

    /// The compiler driver used for `lang`.
    fn compiler_path(&self, lang: Language) -> &Path;

    fn compile_command(&self, input: &CompileInput, lang: Language) -> CommandSpec;

    /// Static libraries always use ar/lib.exe, never the compiler driver.
    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec;

    fn link_shared_command(&self, input: &LinkInput, driver: Language) -> CommandSpec;

    fn link_exe_command(&self, input: &LinkInput, driver: Language) -> CommandSpec;

    /// Render a warning name such as `fatal-errors` as a flag, or `None`
    /// when the family has no such switch.
    fn warning_flag(&self, warning: &str) -> Option<String>;

    fn debug_flags(&self) -> Vec<String>;

    fn object_extension(&self) -> &str;

    fn static_lib_extension(&self) -> &str;

    /// Prefix for library file names (e.g., "lib" on Unix).
    fn lib_prefix(&self) -> &str;
}
