//! Package extraction.
//!
//! A package file (`*.pak`) is a literate bundle of configuration files.
//! Lines starting with `@` are directives:
//!
//! ```text
//! @tangle config/judy.fpc     start (or continue) an output file
//! @doc                        start a section that is not extracted
//! @@include <x>               a literal line `@include <x>`
//! ```
//!
//! Text before the first directive is commentary. Output paths are relative
//! to the output root and may not escape it. Extraction of one package only
//! writes that package's outputs, so packages extract independently on the
//! scheduler.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::cache::CacheKey;
use crate::util::context::BuildContext;
use crate::util::fs::{read_to_string, write_if_changed};
use crate::util::shell::Status;

/// One output file assembled from a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tangle {
    pub path: PathBuf,
    pub content: String,
}

enum Section {
    Commentary,
    Doc,
    Tangle(usize),
}

/// Split package text into its output files, in first-appearance order.
/// Repeated `@tangle` of the same path appends.
pub fn parse_package(text: &str) -> Result<Vec<Tangle>> {
    let mut tangles: Vec<Tangle> = Vec::new();
    let mut section = Section::Commentary;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;

        if let Some(rest) = line.strip_prefix('@') {
            if let Some(literal) = rest.strip_prefix('@') {
                if let Section::Tangle(i) = section {
                    tangles[i].content.push('@');
                    tangles[i].content.push_str(literal);
                    tangles[i].content.push('\n');
                }
                continue;
            }

            let (directive, arg) = match rest.split_once(char::is_whitespace) {
                Some((d, a)) => (d, a.trim()),
                None => (rest.trim(), ""),
            };
            section = match directive {
                "tangle" => {
                    if arg.is_empty() {
                        bail!("line {}: @tangle needs a path", lineno);
                    }
                    let path = output_path(arg).with_context(|| format!("line {}", lineno))?;
                    let i = match tangles.iter().position(|t| t.path == path) {
                        Some(i) => i,
                        None => {
                            tangles.push(Tangle {
                                path,
                                content: String::new(),
                            });
                            tangles.len() - 1
                        }
                    };
                    Section::Tangle(i)
                }
                "doc" => Section::Doc,
                other => bail!("line {}: unknown directive `@{}`", lineno, other),
            };
            continue;
        }

        match section {
            Section::Tangle(i) => {
                tangles[i].content.push_str(line);
                tangles[i].content.push('\n');
            }
            Section::Commentary | Section::Doc => {}
        }
    }

    Ok(tangles)
}

fn output_path(arg: &str) -> Result<PathBuf> {
    let path = PathBuf::from(arg);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => bail!("output path `{}` must stay inside the output root", arg),
        }
    }
    Ok(path)
}

/// Extract one package under `out_root`. Cached on the package contents;
/// unchanged files are not rewritten.
pub fn extract(ctx: &BuildContext, pak: &Path, out_root: &Path) -> Result<Vec<PathBuf>> {
    let key = CacheKey::builder("extract")
        .file(pak)?
        .path(out_root)
        .finish();

    ctx.cache().call(&key, || {
        ctx.shell().verbose(Status::Extracting, pak.display());
        let text = read_to_string(pak)?;
        let tangles =
            parse_package(&text).with_context(|| format!("invalid package {}", pak.display()))?;

        let mut written = Vec::with_capacity(tangles.len());
        for tangle in tangles {
            let dest = out_root.join(&tangle.path);
            if write_if_changed(&dest, tangle.content.as_bytes())? {
                tracing::debug!("extracted {}", dest.display());
            }
            written.push(dest);
        }
        Ok(written)
    })
}

/// Outcome of extracting a batch of packages.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Files written, per package.
    pub extracted: Vec<(PathBuf, Vec<PathBuf>)>,
    /// Packages that could not be extracted, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl ExtractReport {
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.extracted.iter().flat_map(|(_, files)| files)
    }
}

/// Extract every package on the scheduler. A failing package is logged and
/// reported; it does not stop the others.
pub fn extract_all(ctx: &BuildContext, paks: &[PathBuf], out_root: &Path) -> ExtractReport {
    let results = ctx.map("Extracting", paks, |pak| extract(ctx, pak, out_root));

    let mut report = ExtractReport::default();
    let mut owners: BTreeMap<&Path, &Path> = BTreeMap::new();

    for (pak, result) in paks.iter().zip(results) {
        match result {
            Ok(files) => report.extracted.push((pak.clone(), files)),
            Err(e) => {
                ctx.shell()
                    .warn(format!("failed to extract {}: {:#}", pak.display(), e));
                report.failed.push((pak.clone(), format!("{:#}", e)));
            }
        }
    }

    for (pak, files) in &report.extracted {
        for file in files {
            if let Some(previous) = owners.insert(file.as_path(), pak.as_path()) {
                ctx.shell().warn(format!(
                    "{} is written by both {} and {}",
                    file.display(),
                    previous.display(),
                    pak.display()
                ));
            }
        }
    }

    tracing::info!(
        "extracted {} packages ({} failed)",
        report.extracted.len(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use tempfile::TempDir;

    const JUDY: &str = "\
Judy arrays.

@tangle config/judy.fpc
Name: judy
@@ not a directive
@doc
How judy is configured.
@tangle config/target/judy_config.hpp
#define JUDY_EXTERN
@tangle config/judy.fpc
provides_dlib: -ljudy_dynamic
";

    #[test]
    fn test_parse_package() {
        let tangles = parse_package(JUDY).unwrap();
        assert_eq!(tangles.len(), 2);
        assert_eq!(tangles[0].path, PathBuf::from("config/judy.fpc"));
        assert_eq!(
            tangles[0].content,
            "Name: judy\n@ not a directive\nprovides_dlib: -ljudy_dynamic\n"
        );
        assert_eq!(tangles[1].content, "#define JUDY_EXTERN\n");
    }

    #[test]
    fn test_rejects_escaping_paths() {
        assert!(parse_package("@tangle ../etc/passwd\nx\n").is_err());
        assert!(parse_package("@tangle /etc/passwd\nx\n").is_err());
    }

    #[test]
    fn test_unknown_directive_names_line() {
        let err = parse_package("intro\n@weave foo\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_extract_all_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let good = ctx.src("judy.pak");
        let bad = ctx.src("broken.pak");
        std::fs::write(&good, JUDY).unwrap();
        std::fs::write(&bad, "@frobnicate\n").unwrap();

        let report = extract_all(&ctx, &[bad.clone(), good], ctx.output_root());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, bad);
        assert_eq!(report.files().count(), 2);
        assert!(ctx.out("config/judy.fpc").exists());
    }

    #[test]
    fn test_extract_is_cached_and_replayed() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let pak = ctx.src("judy.pak");
        std::fs::write(&pak, JUDY).unwrap();

        extract(&ctx, &pak, ctx.output_root()).unwrap();
        extract(&ctx, &pak, ctx.output_root()).unwrap();
        assert_eq!(ctx.cache().stats().hits, 1);

        // a deleted output makes the record stale
        std::fs::remove_file(ctx.out("config/judy.fpc")).unwrap();
        extract(&ctx, &pak, ctx.output_root()).unwrap();
        assert!(ctx.out("config/judy.fpc").exists());
    }
}
