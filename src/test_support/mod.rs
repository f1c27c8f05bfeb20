//! Test utilities: fake toolchains and throwaway build contexts.
//!
//! The fake compiler is a shell script that understands just enough of the
//! gcc command line to produce output files. It fails on any source file
//! containing `absent_`, which lets tests model missing headers and broken
//! sources without a real compiler. Linked executables are shell scripts;
//! when `link-body.sh` exists next to the compiler its text becomes their
//! body, which is how tests get a working builder tool out of a fake link.

pub mod fixtures;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use fixtures::*;

use crate::util::config::Options;
use crate::util::context::BuildContext;
use crate::util::shell::Shell;

/// Write an executable `/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    crate::util::fs::make_executable(&path).unwrap();
    path
}

const FAKE_CC: &str = r##"
if [ "$1" = "--version" ]; then echo "gcc (Fake) 12.2.0"; exit 0; fi
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  case "$a" in
    *.c|*.cc|*.cpp|*.cxx|*.ml)
      if grep -q absent_ "$a" 2>/dev/null; then echo "fatal error: $a: absent" >&2; exit 1; fi ;;
  esac
  prev="$a"
done
echo "$*" >> "$(dirname "$0")/invocations.log"
if [ -n "$out" ]; then
  mkdir -p "$(dirname "$out")"
  if [ "$1" = "-c" ]; then
    echo "$*" > "$out"
  else
    { echo "#!/bin/sh"; echo "# $*"; cat "$(dirname "$0")/link-body.sh" 2>/dev/null; } > "$out"
    chmod +x "$out"
  fi
fi
exit 0
"##;

const FAKE_AR: &str = r#"
shift
out="$1"
shift
mkdir -p "$(dirname "$out")"
cat "$@" > "$out"
"#;

/// Paths of a fake gcc toolchain.
#[derive(Debug, Clone)]
pub struct FakeToolchain {
    pub dir: PathBuf,
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ar: PathBuf,
}

impl FakeToolchain {
    /// Number of compile/link invocations so far.
    pub fn invocations(&self) -> usize {
        std::fs::read_to_string(self.dir.join("invocations.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

/// Create `gcc`, `g++` and `ar` scripts in `dir`.
pub fn fake_toolchain(dir: &Path) -> FakeToolchain {
    FakeToolchain {
        dir: dir.to_path_buf(),
        cc: write_script(dir, "gcc", FAKE_CC),
        cxx: write_script(dir, "g++", FAKE_CC),
        ar: write_script(dir, "ar", FAKE_AR),
    }
}

/// Paths of a fake OCaml installation.
#[derive(Debug, Clone)]
pub struct FakeOcaml {
    pub dir: PathBuf,
    pub ocamlopt: PathBuf,
    pub ocamlc: PathBuf,
    pub ocamllex: PathBuf,
}

impl FakeOcaml {
    pub fn invocations(&self) -> usize {
        std::fs::read_to_string(self.dir.join("invocations.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

/// Create `ocamlopt`, `ocamlc` and `ocamllex` scripts reporting `version`.
pub fn fake_ocaml(dir: &Path, version: &str) -> FakeOcaml {
    let compiler = format!(
        "if [ \"$1\" = \"-version\" ]; then echo {}; exit 0; fi\n{}",
        version, FAKE_CC
    );
    FakeOcaml {
        dir: dir.to_path_buf(),
        ocamlopt: write_script(dir, "ocamlopt", &compiler),
        ocamlc: write_script(dir, "ocamlc", &compiler),
        ocamllex: write_script(dir, "ocamllex", FAKE_CC),
    }
}

/// Options for a project rooted at `root`, building into `root/build`.
pub fn test_options(root: &Path) -> Options {
    Options {
        source_root: root.to_path_buf(),
        buildroot: root.join("build"),
        jobs: Some(2),
        ..Options::default()
    }
}

/// A context with a capturing shell over `test_options(root)`.
pub fn test_context(root: &Path) -> BuildContext {
    test_context_with(test_options(root))
}

pub fn test_context_with(options: Options) -> BuildContext {
    BuildContext::new(options, Arc::new(Shell::capture())).unwrap()
}
