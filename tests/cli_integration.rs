//! CLI integration tests for Toolforge.
//!
//! Projects are built with a fake C toolchain made of shell scripts, so the
//! tests need `/bin/sh` but no real compiler.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the toolforge binary command.
fn toolforge() -> Command {
    let mut cmd = Command::cargo_bin("toolforge").unwrap();
    cmd.env_remove("TOOLFORGE_PREFIX")
        .env_remove("TOOLFORGE_BUILDROOT")
        .env_remove("TOOLFORGE_JOBS")
        .env_remove("CC")
        .env_remove("CXX")
        .env_remove("AR");
    cmd
}

// ============================================================================
// help and completions
// ============================================================================

#[test]
fn test_help_lists_commands() {
    toolforge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("configure"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("dist"));
}

#[test]
fn test_help_shows_role_options() {
    toolforge()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--host-ocamlopt"))
        .stdout(predicate::str::contains("--target-sdl-config"));
}

#[test]
fn test_completions_bash() {
    toolforge()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("toolforge"));
}

#[test]
fn test_unknown_command_fails() {
    toolforge().arg("frobnicate").assert().failure();
}

// ============================================================================
// fake toolchain
// ============================================================================

#[cfg(unix)]
mod fake {
    use super::*;

    const FAKE_CC: &str = r##"
if [ "$1" = "--version" ]; then echo "gcc (Fake) 12.2.0"; exit 0; fi
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  case "$a" in
    *.c|*.cc|*.cpp|*.cxx)
      if grep -q absent_ "$a" 2>/dev/null; then echo "fatal error: $a: absent" >&2; exit 1; fi ;;
  esac
  prev="$a"
done
if [ -n "$out" ]; then
  mkdir -p "$(dirname "$out")"
  if [ "$1" = "-c" ]; then
    echo "$*" > "$out"
  else
    { echo "#!/bin/sh"; cat "$(dirname "$0")/link-body.sh"; } > "$out"
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

    /// Every linked executable behaves like the builder: it turns SRC into
    /// a script printing SRC's `// ` lines, failing when SRC says `fail_`.
    const LINK_BODY: &str = r#"
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
"#;

    fn script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    pub struct Project {
        pub dir: TempDir,
        cc: PathBuf,
        cxx: PathBuf,
    }

    impl Project {
        pub fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let tools = dir.path().join(".tools");
            script(&tools.join("gcc"), FAKE_CC);
            script(&tools.join("g++"), FAKE_CC);
            script(&tools.join("ar"), FAKE_AR);
            fs::write(tools.join("link-body.sh"), LINK_BODY).unwrap();
            Project {
                cc: tools.join("gcc"),
                cxx: tools.join("g++"),
                dir,
            }
        }

        pub fn root(&self) -> &Path {
            self.dir.path()
        }

        pub fn file(&self, rel: &str, content: &str) {
            let path = self.root().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        /// A small project: one runtime library, the builder and a suite
        /// with one failing program.
        pub fn with_sources(self) -> Self {
            self.file(
                "Forge.toml",
                r#"
[project]
name = "felix"
version = "1.1.6"

[[runtime]]
name = "judy"
sources = ["src/judy/*.c"]
lang = "c"

[stdlib]
copy = [{ from = "src/lib", pattern = "*.flx", to = "lib" }]

[builder]
name = "flx"
sources = ["src/flx.cxx"]
libs = ["judy"]

[[suite]]
name = "regress_rt"
sources = ["test/rt/*.flx"]

[install]
bins = ["flx"]
"#,
            );
            self.file("src/judy/judy.c", "int judy;");
            self.file("src/lib/std.flx", "// std\n");
            self.file("src/flx.cxx", "int main() { return 0; }");
            self.file("test/rt/a.flx", "// a\n");
            self.file("test/rt/a.expect", "a\n");
            self.file("test/rt/b.flx", "// b\n// fail_here\n");
            self
        }

        pub fn cmd(&self, command: &str) -> Command {
            let mut cmd = toolforge();
            cmd.current_dir(self.root())
                .arg(command)
                .arg("--build-platform")
                .arg("linux")
                .arg("--build-cc")
                .arg(&self.cc)
                .arg("--build-cxx")
                .arg(&self.cxx)
                .arg("--host-ocamlopt")
                .arg(self.root().join(".tools/missing/ocamlopt"))
                .arg("--host-ocamlc")
                .arg(self.root().join(".tools/missing/ocamlc"))
                .arg("--prefix")
                .arg(self.root().join("prefix"))
                .arg("--jobs")
                .arg("2");
            cmd
        }

        pub fn target_cmd(&self, command: &str, platform: &str) -> Command {
            let mut cmd = self.cmd(command);
            cmd.arg("--target-platform")
                .arg(platform)
                .arg("--target-cc")
                .arg(&self.cc)
                .arg("--target-cxx")
                .arg(&self.cxx);
            cmd
        }
    }
}

// ============================================================================
// toolforge configure
// ============================================================================

#[cfg(unix)]
#[test]
fn test_configure_aliases_roles() {
    let project = fake::Project::new();

    project
        .cmd("configure")
        .assert()
        .success()
        .stdout(predicate::str::contains("host: same as build"))
        .stdout(predicate::str::contains("target: same as build"));

    let phases = project.root().join("build/release/config/phases.json");
    let json = fs::read_to_string(phases).unwrap();
    assert!(json.contains("\"alias\""));
}

#[cfg(unix)]
#[test]
fn test_configure_cross_target() {
    let project = fake::Project::new();

    project
        .target_cmd("configure", "freebsd")
        .assert()
        .success()
        .stdout(predicate::str::contains("host: same as build"))
        .stdout(predicate::str::contains("freebsd"));
}

#[cfg(unix)]
#[test]
fn test_configure_missing_compiler() {
    let project = fake::Project::new();

    toolforge()
        .current_dir(project.root())
        .args(["configure", "--build-platform", "linux", "--build-cc"])
        .arg(project.root().join("no-such-cc"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration failed"));
}

#[cfg(unix)]
#[test]
fn test_debug_uses_debug_output_root() {
    let project = fake::Project::new();

    project.cmd("configure").arg("-g").assert().success();
    assert!(project.root().join("build/debug/config/phases.json").exists());
    assert!(!project.root().join("build/release").exists());
}

// ============================================================================
// toolforge build / test / install
// ============================================================================

#[cfg(unix)]
#[test]
fn test_build_without_manifest_fails() {
    let project = fake::Project::new();

    project
        .cmd("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no Forge.toml found"));
}

#[cfg(unix)]
#[test]
fn test_build_produces_tree() {
    let project = fake::Project::new().with_sources();

    project.cmd("build").assert().success();

    let out = project.root().join("build/release");
    assert!(out.join("lib/rtl/libjudy_static.a").exists());
    assert!(out.join("lib/std.flx").exists());
    assert!(out.join("bin/flx").exists());
    assert!(out.join("toolforge-db.json").exists());
}

#[cfg(unix)]
#[test]
fn test_broken_source_is_a_step_failure() {
    let project = fake::Project::new().with_sources();
    project.file("src/judy/judy.c", "absent_symbol();");

    project
        .cmd("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("build step `runtime:judy` failed"));
}

#[cfg(unix)]
#[test]
fn test_failing_tests_fail_the_command() {
    let project = fake::Project::new().with_sources();

    project
        .cmd("test")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 tests failed"))
        .stderr(predicate::str::contains("b.flx"));
}

#[cfg(unix)]
#[test]
fn test_skip_tests() {
    let project = fake::Project::new().with_sources();

    project.cmd("test").arg("--skip-tests").assert().success();
}

#[cfg(unix)]
#[test]
fn test_install_twice_conflicts() {
    let project = fake::Project::new().with_sources();

    project
        .cmd("install")
        .assert()
        .success()
        .stdout(predicate::str::contains("felix-1.1.6"));
    assert!(project.root().join("prefix/bin/flx").exists());
    assert!(project
        .root()
        .join("prefix/lib/felix/felix-1.1.6/lib/std.flx")
        .exists());

    project
        .cmd("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
