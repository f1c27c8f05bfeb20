//! MSVC toolchain implementation.

use std::path::{Path, PathBuf};

use super::{
    ArchiveInput, CommandSpec, CompileInput, CompilerFamily, Language, LinkInput, Toolchain,
};

/// MSVC toolchain (Windows).
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    /// cl.exe
    pub cl: PathBuf,
    /// lib.exe
    pub lib: PathBuf,
    /// link.exe
    pub link: PathBuf,
}

impl MsvcToolchain {
    pub fn new(cl: PathBuf, lib: PathBuf, link: PathBuf) -> Self {
        MsvcToolchain { cl, lib, link }
    }

    fn link_tail(&self, mut cmd: CommandSpec, input: &LinkInput) -> CommandSpec {
        cmd = cmd.arg(format!("/OUT:{}", input.output.display()));

        for obj in input.objects.iter().chain(&input.archives) {
            cmd = cmd.arg(obj.display().to_string());
        }
        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("/LIBPATH:{}", dir.display()));
        }
        for lib in &input.libs {
            cmd = cmd.arg(format!("{}.lib", lib));
        }

        cmd.args(input.ldflags.iter().cloned())
    }
}

impl Toolchain for MsvcToolchain {
    fn family(&self) -> CompilerFamily {
        CompilerFamily::Msvc
    }

    fn compiler_path(&self, _lang: Language) -> &Path {
        // cl.exe compiles both languages
        &self.cl
    }

    fn compile_command(&self, input: &CompileInput, lang: Language) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.cl).arg("/nologo").arg("/c");

        if lang == Language::Cxx {
            cmd = cmd.arg("/TP");
        }

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("/I{}", dir.display()));
        }

        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("/D{}={}", name, v)),
                None => cmd = cmd.arg(format!("/D{}", name)),
            }
        }

        cmd.args(input.cflags.iter().cloned())
            .arg(input.source.display().to_string())
            .arg(format!("/Fo{}", input.output.display()))
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.lib)
            .arg("/nologo")
            .arg(format!("/OUT:{}", input.output.display()));

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        cmd
    }

    fn link_shared_command(&self, input: &LinkInput, _driver: Language) -> CommandSpec {
        let cmd = CommandSpec::new(&self.link).arg("/nologo").arg("/DLL");
        self.link_tail(cmd, input)
    }

    fn link_exe_command(&self, input: &LinkInput, _driver: Language) -> CommandSpec {
        let cmd = CommandSpec::new(&self.link).arg("/nologo");
        self.link_tail(cmd, input)
    }

    fn warning_flag(&self, _warning: &str) -> Option<String> {
        None
    }

    fn debug_flags(&self) -> Vec<String> {
        vec!["/Zi".to_string()]
    }

    fn object_extension(&self) -> &str {
        "obj"
    }

    fn static_lib_extension(&self) -> &str {
        "lib"
    }

    fn lib_prefix(&self) -> &str {
        ""
    }
}
