//! Test fixtures for common test scenarios.
//!
//! A [`ProjectFixture`] is a throwaway source tree with its own fake C and
//! OCaml toolchains, plus options that point every role at them.

use std::path::{Path, PathBuf};

use super::{fake_ocaml, fake_toolchain, test_options, FakeOcaml, FakeToolchain};
use crate::util::config::Options;

/// Body of every executable the fake compiler links once
/// [`ProjectFixture::with_builder`] is called. It behaves like the target
/// builder: `flx [flags] -c -o OUT SRC` turns SRC into a script that prints
/// the lines of SRC starting with `// ` and exits 1 when SRC mentions
/// `fail_`. Sources mentioning `absent_` do not compile.
pub const FAKE_BUILDER: &str = r#"
out=""
src=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  src="$a"
  prev="$a"
done
if [ -z "$out" ]; then echo "usage: flx -c -o OUT SRC" >&2; exit 2; fi
if grep -q absent_ "$src"; then echo "$src: compile error" >&2; exit 1; fi
mkdir -p "$(dirname "$out")"
echo '#!/bin/sh' > "$out"
echo "sed -n 's|^// ||p' '$src'" >> "$out"
if grep -q fail_ "$src"; then echo 'exit 1' >> "$out"; fi
chmod +x "$out"
exit 0
"#;

/// A project tree on disk with fake toolchains.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    root: PathBuf,
    pub cc: FakeToolchain,
    pub ocaml: FakeOcaml,
}

impl ProjectFixture {
    /// Create the fixture rooted at `root`. Tools live under `root/.tools`.
    pub fn new(root: &Path) -> Self {
        ProjectFixture {
            root: root.to_path_buf(),
            cc: fake_toolchain(&root.join(".tools/cc")),
            ocaml: fake_ocaml(&root.join(".tools/ocaml"), "4.14.1"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make linked executables behave like the target builder.
    pub fn with_builder(self) -> Self {
        self.file(".tools/cc/link-body.sh", FAKE_BUILDER);
        self
    }

    /// Write a file relative to the root.
    pub fn file(&self, rel: impl AsRef<Path>, content: &str) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Write `Forge.toml`.
    pub fn manifest(&self, content: &str) -> PathBuf {
        self.file(crate::core::MANIFEST_FILE, content)
    }

    /// Path under the release output root.
    pub fn out(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join("build/release").join(rel)
    }

    /// Options pinning every role and optional tool to the fake tools.
    /// Missing optional tools point at paths that do not exist, so results
    /// never depend on what the machine running the tests has installed.
    pub fn options(&self) -> Options {
        let mut options = test_options(&self.root);
        options.build.platform = Some("linux".into());
        options.build.cc = Some(self.cc.cc.clone());
        options.build.cxx = Some(self.cc.cxx.clone());
        options.host_extras.ocamlopt = Some(self.ocaml.ocamlopt.clone());
        options.host_extras.ocamlc = Some(self.root.join(".tools/missing/ocamlc"));
        options.host_extras.ocamllex = Some(self.ocaml.ocamllex.clone());
        options.host_extras.llvm_config = Some(self.root.join(".tools/missing/llvm-config"));
        options.target_extras.sdl_config = Some(self.root.join(".tools/missing/sdl-config"));
        options.prefix = self.root.join("prefix");
        options
    }
}

/// Common manifest templates.
pub mod manifests {
    /// A project with every kind of component, small enough to build with
    /// the fake toolchains.
    pub const FULL: &str = r#"
[project]
name = "felix"
version = "1.1.6"

[frontend]
name = "flxg"
sources = ["src/compiler/*.ml"]
lexers = ["src/compiler/flx_lex.mll"]
libs = ["unix"]

[[runtime]]
name = "judy"
sources = ["src/judy/*.c"]
lang = "c"

[[runtime]]
name = "flx_gc"
sources = ["src/gc/*.cpp"]
deps = ["judy"]
headers = ["src/gc/*.hpp"]

[stdlib]
copy = [{ from = "src/lib", pattern = "*.flx", to = "lib" }]

[[stdlib.bindings]]
name = "flx_glob"
sources = ["src/glob/*.c"]
lang = "c"

[[driver]]
name = "flx_run"
sources = ["src/drivers/flx_run.cxx"]
libs = ["flx_gc", "judy"]

[builder]
name = "flx"
sources = ["src/tools/flx.cxx"]

[[support_tool]]
name = "timeout"
sources = ["src/tools/timeout.c"]
lang = "c"
requires = "posix"

[[support_tool]]
name = "flx_win"
sources = ["src/tools/flx_win.c"]
lang = "c"
requires = "windows"

[[tool]]
name = "flx_ls"
source = "src/tools/flx_ls.flx"

[[suite]]
name = "regress_rt"
sources = ["test/regress/rt/*.flx"]

[[suite]]
name = "gmp"
sources = ["test/gmp/*.flx"]
requires = { header = "absent_gmp.h" }

[[suite]]
name = "zmq"
sources = ["test/zmq/*.flx"]
requires = { header = "zmq.h" }
mode = "compile"

[install]
bins = ["flx", "flx_ls"]

[doc]
copy = [{ from = "src/doc", pattern = "*.fdoc", to = "doc" }]

[speed]
sources = ["speed/*.flx"]
runs = 2
"#;

    /// Sources for [`FULL`], relative to the project root.
    pub const FULL_SOURCES: &[(&str, &str)] = &[
        ("src/compiler/flx_ast.ml", "type t = int"),
        ("src/compiler/flxg.ml", "let () = ()"),
        ("src/compiler/flx_lex.mll", "rule token = parse eof { () }"),
        ("src/judy/judy.c", "int judy;"),
        ("src/gc/gc.cpp", "int gc;"),
        ("src/gc/gc.hpp", "#pragma once"),
        ("src/lib/std.flx", "// standard library\n"),
        ("src/lib/io/stream.flx", "// streams\n"),
        ("src/glob/glob.c", "int glob;"),
        ("src/drivers/flx_run.cxx", "int main() { return 0; }"),
        ("src/tools/flx.cxx", "int main() { return 0; }"),
        ("src/tools/timeout.c", "int main(void) { return 0; }"),
        ("src/tools/flx_win.c", "int main(void) { return 0; }"),
        ("src/tools/flx_ls.flx", "// flx_ls\n"),
        ("test/regress/rt/a.flx", "// a\n"),
        ("test/regress/rt/a.expect", "a\n"),
        ("test/regress/rt/b.flx", "// b\n// fail_here\n"),
        ("test/regress/rt/c.flx", "// c\n"),
        ("test/gmp/bigint.flx", "// big\n"),
        ("test/zmq/pub.flx", "// pub\n"),
        ("src/doc/intro.fdoc", "@h1 Intro"),
        ("speed/loop.flx", "// loop\n"),
    ];
}

impl ProjectFixture {
    /// The full sample project, with a working fake builder.
    pub fn full(root: &Path) -> Self {
        let project = ProjectFixture::new(root).with_builder();
        project.manifest(manifests::FULL);
        for (rel, content) in manifests::FULL_SOURCES {
            project.file(rel, content);
        }
        project
    }
}
