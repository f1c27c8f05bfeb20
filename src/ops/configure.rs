//! Implementation of `toolforge configure`.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::{Manifest, MANIFEST_FILE};
use crate::error::ForgeError;
use crate::extract::{extract_all, ExtractReport};
use crate::ops::copy::{copy_winners, layered_copy, resolve_layers, Layer};
use crate::phase::{PhaseResolver, Phases};
use crate::util::context::BuildContext;
use crate::util::fs::{ensure_dir, glob_files, read_to_string, relative_path, write_if_changed};
use crate::util::shell::Status;

/// Name of the aggregate configuration file under `config/`.
pub const PHASES_FILE: &str = "phases.json";

/// Record of the descriptor files the last configure wrote.
const DESCRIPTORS_FILE: &str = "descriptors.json";

/// Result of configuring: the resolved phases and what was extracted.
#[derive(Debug)]
pub struct Configured {
    pub phases: Phases,
    pub manifest: Option<Manifest>,
    pub extraction: ExtractReport,
}

/// Load `Forge.toml` from the source root, if there is one.
pub fn load_manifest(ctx: &BuildContext) -> Result<Option<Manifest>> {
    let path = ctx.src(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    Manifest::load(&path).map(Some)
}

/// Descriptor layers in application order, most generic first.
fn descriptor_layers(ctx: &BuildContext, phases: &Phases) -> Vec<Layer> {
    let config = ctx.out("config");
    let target = phases.target.platform();

    let mut layers = vec![
        Layer::new(ctx.src("src/config"), "*.fpc", &config),
        Layer::new(ctx.src("src/config/target"), "*.hpp", config.join("target")),
    ];
    for (tag, dir) in [("posix", "unix"), ("windows", "win32"), ("macosx", "macosx")] {
        if target.contains(tag) {
            ctx.shell()
                .verbose(Status::Copying, format!("{} resource descriptors", dir));
            layers.push(Layer::new(ctx.src("src/config").join(dir), "*.fpc", &config));
        }
    }
    layers
}

/// Configure the output tree. Safe to call repeatedly: unchanged inputs
/// cause no toolchain runs and no file writes.
pub fn configure(ctx: &BuildContext) -> Result<Configured> {
    let phases = PhaseResolver::new(ctx).resolve_all()?;
    let manifest = load_manifest(ctx)?;

    if let Some(frontend) = manifest.as_ref().and_then(|m| m.frontend.as_ref()) {
        let secondary = phases
            .host_tools()
            .map(|tools| &tools.secondary)
            .and_then(|cap| cap.reason().map(str::to_string));
        if let Some(reason) = secondary {
            return Err(ForgeError::configuration(
                format!("ocaml compiler for `{}`", frontend.name),
                reason,
            )
            .into());
        }
    }

    for role in ["build", "host", "target"] {
        ensure_dir(&ctx.out("config").join(role))?;
    }

    // package outputs win over descriptors; a descriptor never writes a
    // file a package owns, so replays leave the package version in place
    let paks: Vec<PathBuf> = glob_files(&ctx.src("lpsrc"), &["*.pak".to_string()])?;
    let extraction = extract_all(ctx, &paks, ctx.output_root());
    let owned: BTreeSet<&PathBuf> = extraction.files().collect();

    let (shadowed, winners): (Vec<_>, Vec<_>) =
        resolve_layers(&descriptor_layers(ctx, &phases))?
            .into_iter()
            .partition(|(_, dst)| owned.contains(dst));
    for (_, file) in &shadowed {
        ctx.shell().warn(format!(
            "{} is both a resource descriptor and a package output",
            file.display()
        ));
    }
    let written = copy_winners(ctx, winners)?;
    prune_descriptors(ctx, &written, &owned)?;

    write_phases(ctx, &phases)?;

    // user descriptors override everything, including package outputs
    let user = Layer::new(ctx.src("config/user"), "*.fpc", ctx.out("config"));
    let overlaid = layered_copy(ctx, &[user])?;
    if !overlaid.is_empty() {
        tracing::info!("applied {} user descriptors", overlaid.len());
    }

    ctx.shell().status(
        Status::Finished,
        format!("configure for {}", phases.target.platform()),
    );

    Ok(Configured {
        phases,
        manifest,
        extraction,
    })
}

/// Delete descriptors a previous configure wrote that no layer provides
/// any more, e.g. after switching target platform, then record `written`.
fn prune_descriptors(
    ctx: &BuildContext,
    written: &[PathBuf],
    owned: &BTreeSet<&PathBuf>,
) -> Result<()> {
    let record = ctx.out("config").join(DESCRIPTORS_FILE);
    let current: BTreeSet<PathBuf> = written
        .iter()
        .map(|path| relative_path(ctx.output_root(), path))
        .collect();

    if record.is_file() {
        let previous: BTreeSet<PathBuf> = serde_json::from_str(&read_to_string(&record)?)
            .with_context(|| format!("failed to parse {}", record.display()))?;
        for rel in previous.difference(&current) {
            let path = ctx.out(rel);
            if owned.contains(&path) || !path.is_file() {
                continue;
            }
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            ctx.shell()
                .verbose(Status::Removing, format!("stale descriptor {}", rel.display()));
        }
    }

    let json = serde_json::to_string_pretty(&current)
        .context("failed to serialize descriptor record")?;
    write_if_changed(&record, json.as_bytes())?;
    Ok(())
}

fn write_phases(ctx: &BuildContext, phases: &Phases) -> Result<()> {
    let path = ctx.out("config").join(PHASES_FILE);
    let json = serde_json::to_string_pretty(&phases.summary())
        .context("failed to serialize phase configuration")?;
    if write_if_changed(&path, json.as_bytes())? {
        tracing::debug!("wrote {}", path.display());
    }
    Ok(())
}
