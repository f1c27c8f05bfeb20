//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;

use toolforge::util::config::{HostExtras, Options, RoleOptions, TargetExtras};

/// Toolforge - a phase-aware build driver for self-hosting compilers
#[derive(Parser)]
#[command(name = "toolforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub build_role: BuildRoleArgs,

    #[command(flatten)]
    pub host_role: HostRoleArgs,

    #[command(flatten)]
    pub target_role: TargetRoleArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the toolchains and prepare the output tree
    Configure,

    /// Build every component
    Build,

    /// Build, then run the test suites
    Test,

    /// Build, then copy the documentation into the output tree
    Doc,

    /// Build, then time the benchmark programs
    Speed,

    /// Build, then install libraries and binaries
    Install,

    /// Pack the tracked sources into tar.gz and zip archives
    Dist,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Installation prefix
    #[arg(long, global = true, env = "TOOLFORGE_PREFIX", default_value = "/usr/local")]
    pub prefix: PathBuf,

    /// Binary install directory [default: <prefix>/bin]
    #[arg(long, global = true)]
    pub bindir: Option<PathBuf>,

    /// Library install directory [default: <prefix>/lib]
    #[arg(long, global = true)]
    pub libdir: Option<PathBuf>,

    /// Include path added to every role
    #[arg(short = 'I', long = "include", global = true, value_name = "DIR")]
    pub includes: Vec<PathBuf>,

    /// Library path added to every role
    #[arg(short = 'L', long = "library-path", global = true, value_name = "DIR")]
    pub libpaths: Vec<PathBuf>,

    /// C flag added to every role
    #[arg(long = "c-flag", global = true, value_name = "FLAG", allow_hyphen_values = true)]
    pub c_flags: Vec<String>,

    /// Build with debug info, into <buildroot>/debug
    #[arg(short = 'g', long, global = true)]
    pub debug: bool,

    /// Build but do not run the test suites
    #[arg(long, global = true)]
    pub skip_tests: bool,

    /// Directory holding the debug and release output trees
    #[arg(long, global = true, env = "TOOLFORGE_BUILDROOT", default_value = "build")]
    pub buildroot: PathBuf,

    /// Project source directory
    #[arg(long, global = true, default_value = ".")]
    pub source_root: PathBuf,

    /// Number of parallel jobs [default: number of CPUs]
    #[arg(short, long, global = true, env = "TOOLFORGE_JOBS")]
    pub jobs: Option<usize>,
}

#[derive(Args)]
#[command(next_help_heading = "Build role")]
pub struct BuildRoleArgs {
    /// Platform of the machine running the build
    #[arg(long, global = true, value_name = "PLATFORM")]
    pub build_platform: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    pub build_cc: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub build_cxx: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub build_include: Vec<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub build_library_path: Vec<PathBuf>,

    #[arg(long, global = true, value_name = "FLAG", allow_hyphen_values = true)]
    pub build_c_flag: Vec<String>,

    #[arg(long, global = true)]
    pub build_c_debug: bool,
}

#[derive(Args)]
#[command(next_help_heading = "Host role")]
pub struct HostRoleArgs {
    /// Platform the built compiler runs on [default: build platform]
    #[arg(long, global = true, value_name = "PLATFORM")]
    pub host_platform: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    pub host_cc: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub host_cxx: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub host_include: Vec<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub host_library_path: Vec<PathBuf>,

    #[arg(long, global = true, value_name = "FLAG", allow_hyphen_values = true)]
    pub host_c_flag: Vec<String>,

    #[arg(long, global = true)]
    pub host_c_debug: bool,

    /// Build the front end with debug info
    #[arg(long, global = true)]
    pub host_ocaml_debug: bool,

    #[arg(long, global = true, value_name = "PATH")]
    pub host_ocamlc: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub host_ocamlopt: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub host_ocamllex: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub host_llvm_config: Option<PathBuf>,
}

#[derive(Args)]
#[command(next_help_heading = "Target role")]
pub struct TargetRoleArgs {
    /// Platform built programs run on [default: host platform]
    #[arg(long, global = true, value_name = "PLATFORM")]
    pub target_platform: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    pub target_cc: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub target_cxx: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub target_include: Vec<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub target_library_path: Vec<PathBuf>,

    #[arg(long, global = true, value_name = "FLAG", allow_hyphen_values = true)]
    pub target_c_flag: Vec<String>,

    #[arg(long, global = true)]
    pub target_c_debug: bool,

    #[arg(long, global = true, value_name = "PATH")]
    pub target_sdl_config: Option<PathBuf>,
}

impl Cli {
    /// Options as given on the command line, before config files apply.
    pub fn options(&self) -> Options {
        let g = &self.global;
        let b = &self.build_role;
        let h = &self.host_role;
        let t = &self.target_role;

        Options {
            prefix: g.prefix.clone(),
            bindir: g.bindir.clone(),
            libdir: g.libdir.clone(),
            includes: g.includes.clone(),
            libpaths: g.libpaths.clone(),
            c_flags: g.c_flags.clone(),
            debug: g.debug,
            skip_tests: g.skip_tests,
            buildroot: g.buildroot.clone(),
            source_root: g.source_root.clone(),
            jobs: g.jobs,
            verbose: self.verbose,
            build: RoleOptions {
                platform: b.build_platform.clone(),
                cc: b.build_cc.clone(),
                cxx: b.build_cxx.clone(),
                includes: b.build_include.clone(),
                libpaths: b.build_library_path.clone(),
                c_flags: b.build_c_flag.clone(),
                c_debug: b.build_c_debug,
            },
            host: RoleOptions {
                platform: h.host_platform.clone(),
                cc: h.host_cc.clone(),
                cxx: h.host_cxx.clone(),
                includes: h.host_include.clone(),
                libpaths: h.host_library_path.clone(),
                c_flags: h.host_c_flag.clone(),
                c_debug: h.host_c_debug,
            },
            target: RoleOptions {
                platform: t.target_platform.clone(),
                cc: t.target_cc.clone(),
                cxx: t.target_cxx.clone(),
                includes: t.target_include.clone(),
                libpaths: t.target_library_path.clone(),
                c_flags: t.target_c_flag.clone(),
                c_debug: t.target_c_debug,
            },
            host_extras: HostExtras {
                ocaml_debug: h.host_ocaml_debug,
                ocamlc: h.host_ocamlc.clone(),
                ocamlopt: h.host_ocamlopt.clone(),
                ocamllex: h.host_ocamllex.clone(),
                llvm_config: h.host_llvm_config.clone(),
            },
            target_extras: TargetExtras {
                sdl_config: t.target_sdl_config.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_options() {
        let cli = Cli::parse_from([
            "toolforge",
            "build",
            "--target-platform",
            "windows",
            "--host-cc",
            "/opt/cc",
            "--target-c-flag",
            "-DNDEBUG",
            "-I",
            "inc",
            "-g",
        ]);
        let options = cli.options();
        assert_eq!(options.target.platform.as_deref(), Some("windows"));
        assert_eq!(options.host.cc, Some(PathBuf::from("/opt/cc")));
        assert_eq!(options.target.c_flags, ["-DNDEBUG"]);
        assert_eq!(options.includes, [PathBuf::from("inc")]);
        assert!(options.debug);
        assert_eq!(options.output_root(), PathBuf::from("build/debug"));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["toolforge", "configure"]);
        let options = cli.options();
        assert_eq!(options.prefix, PathBuf::from("/usr/local"));
        assert_eq!(options.bindir(), PathBuf::from("/usr/local/bin"));
        assert!(options.build.platform.is_none());
    }
}
