//! GCC/Clang toolchain implementation.

use std::path::{Path, PathBuf};

use super::{
    ArchiveInput, CommandSpec, CompileInput, CompilerFamily, Language, LinkInput, Toolchain,
};

/// GCC-compatible toolchain (gcc, clang, apple clang).
#[derive(Debug, Clone)]
pub struct GccToolchain {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ar: PathBuf,
    pub family: CompilerFamily,
}

impl GccToolchain {
    pub fn new(cc: PathBuf, cxx: PathBuf, ar: PathBuf, family: CompilerFamily) -> Self {
        GccToolchain {
            cc,
            cxx,
            ar,
            family,
        }
    }

    /// Infer C++ compiler path from C compiler path.
    ///
    /// - gcc, x86_64-linux-gnu-gcc -> g++, x86_64-linux-gnu-g++
    /// - clang -> clang++
    /// - cc, /usr/bin/cc -> c++, /usr/bin/c++
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let cc_str = cc.to_string_lossy();

        if cc_str.ends_with("gcc") {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 2]));
        }

        if cc_str.ends_with("clang") {
            return PathBuf::from(format!("{}++", cc_str));
        }

        // Only a complete basename "cc", not "mycc"
        let is_standalone_cc = cc_str == "cc"
            || cc_str.ends_with("/cc")
            || cc_str.ends_with("\\cc")
            || cc_str.ends_with("-cc");

        if is_standalone_cc {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 1]));
        }

        PathBuf::from(format!("{}++", cc_str))
    }

    fn driver(&self, lang: Language) -> &Path {
        match lang {
            Language::C => &self.cc,
            Language::Cxx => &self.cxx,
        }
    }

    fn link_tail(cmd: CommandSpec, input: &LinkInput) -> CommandSpec {
        let mut cmd = cmd.arg("-o").arg(input.output.display().to_string());

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }
        for archive in &input.archives {
            cmd = cmd.arg(archive.display().to_string());
        }
        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("-L{}", dir.display()));
        }
        for lib in &input.libs {
            cmd = cmd.arg(format!("-l{}", lib));
        }

        cmd.args(input.ldflags.iter().cloned())
    }
}

impl Toolchain for GccToolchain {
    fn family(&self) -> CompilerFamily {
        self.family
    }

    fn compiler_path(&self, lang: Language) -> &Path {
        self.driver(lang)
    }

    fn compile_command(&self, input: &CompileInput, lang: Language) -> CommandSpec {
        let mut cmd = CommandSpec::new(self.driver(lang)).arg("-c");

        if input.pic {
            cmd = cmd.arg("-fPIC");
        }

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("-I{}", dir.display()));
        }

        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("-D{}={}", name, v)),
                None => cmd = cmd.arg(format!("-D{}", name)),
            }
        }

        cmd.args(input.cflags.iter().cloned())
            .arg(input.source.display().to_string())
            .arg("-o")
            .arg(input.output.display().to_string())
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.ar)
            .arg("rcs")
            .arg(input.output.display().to_string());

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        cmd
    }

    fn link_shared_command(&self, input: &LinkInput, driver: Language) -> CommandSpec {
        let cmd = CommandSpec::new(self.driver(driver));
        let cmd = if self.family == CompilerFamily::AppleClang {
            cmd.arg("-dynamiclib")
        } else {
            cmd.arg("-shared")
        };
        Self::link_tail(cmd, input)
    }

    fn link_exe_command(&self, input: &LinkInput, driver: Language) -> CommandSpec {
        Self::link_tail(CommandSpec::new(self.driver(driver)), input)
    }

    fn warning_flag(&self, warning: &str) -> Option<String> {
        Some(format!("-W{}", warning))
    }

    fn debug_flags(&self) -> Vec<String> {
        vec!["-g".to_string()]
    }

    fn object_extension(&self) -> &str {
        "o"
    }

    fn static_lib_extension(&self) -> &str {
        "a"
    }

    fn lib_prefix(&self) -> &str {
        "lib"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcc() -> GccToolchain {
        GccToolchain::new(
            PathBuf::from("gcc"),
            PathBuf::from("g++"),
            PathBuf::from("ar"),
            CompilerFamily::Gcc,
        )
    }

    #[test]
    fn test_infer_cxx() {
        assert_eq!(GccToolchain::infer_cxx(Path::new("gcc")), PathBuf::from("g++"));
        assert_eq!(
            GccToolchain::infer_cxx(Path::new("/usr/bin/x86_64-linux-gnu-gcc")),
            PathBuf::from("/usr/bin/x86_64-linux-gnu-g++")
        );
        assert_eq!(GccToolchain::infer_cxx(Path::new("clang")), PathBuf::from("clang++"));
        assert_eq!(GccToolchain::infer_cxx(Path::new("/usr/bin/cc")), PathBuf::from("/usr/bin/c++"));
    }

    #[test]
    fn test_compile_command() {
        let input = CompileInput {
            source: PathBuf::from("src/judy/JudyL.c"),
            output: PathBuf::from("build/JudyL.o"),
            include_dirs: vec![PathBuf::from("src/judy")],
            defines: vec![("JU_64BIT".into(), None), ("BUILD_JUDY".into(), Some("1".into()))],
            cflags: vec!["-O3".into()],
            pic: true,
        };

        let cmd = gcc().compile_command(&input, Language::C);
        assert_eq!(cmd.program, PathBuf::from("gcc"));
        assert_eq!(
            cmd.args,
            vec![
                "-c",
                "-fPIC",
                "-Isrc/judy",
                "-DJU_64BIT",
                "-DBUILD_JUDY=1",
                "-O3",
                "src/judy/JudyL.c",
                "-o",
                "build/JudyL.o"
            ]
        );
    }

    #[test]
    fn test_link_uses_cxx_driver() {
        let input = LinkInput {
            objects: vec![PathBuf::from("main.o")],
            archives: vec![PathBuf::from("lib/rtl/libflx_static.a")],
            output: PathBuf::from("bin/flx"),
            libs: vec!["m".into()],
            ..LinkInput::default()
        };

        let cmd = gcc().link_exe_command(&input, Language::Cxx);
        assert_eq!(cmd.program, PathBuf::from("g++"));
        assert_eq!(
            cmd.args,
            vec!["-o", "bin/flx", "main.o", "lib/rtl/libflx_static.a", "-lm"]
        );

        let cmd = gcc().link_shared_command(&input, Language::Cxx);
        assert_eq!(cmd.args[0], "-shared");
    }

    #[test]
    fn test_archive_command() {
        let cmd = gcc().archive_command(&ArchiveInput {
            objects: vec![PathBuf::from("a.o"), PathBuf::from("b.o")],
            output: PathBuf::from("libx.a"),
        });
        assert_eq!(cmd.args, vec!["rcs", "libx.a", "a.o", "b.o"]);
    }
}
