//! Optional capability detection.
//!
//! Detection never fails the run. Whatever goes wrong while looking for an
//! optional tool or library becomes [`Capability::Absent`] with the reason.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::cache::Cached;
use crate::util::process::{find_program, ProcessBuilder};

/// Outcome of probing for an optional dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Capability<T> {
    Present(T),
    Absent { reason: String },
}

impl<T> Capability<T> {
    pub fn absent(reason: impl Into<String>) -> Self {
        Capability::Absent {
            reason: reason.into(),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Capability::Present(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Capability::Present(v) => Some(v),
            Capability::Absent { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Present(_) => None,
            Capability::Absent { reason } => Some(reason),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Capability::Present(v) => Some(v),
            Capability::Absent { .. } => None,
        }
    }
}

/// A cached `Present` result is stale once the tool it found is gone.
impl<T: Cached> Cached for Capability<T> {
    fn outputs(&self) -> Vec<PathBuf> {
        match self {
            Capability::Present(v) => v.outputs(),
            Capability::Absent { .. } => Vec::new(),
        }
    }
}

/// Run an optional detection; any error becomes `Absent` and is logged.
pub fn detect<T>(what: &str, f: impl FnOnce() -> Result<T>) -> Capability<T> {
    match f() {
        Ok(v) => Capability::Present(v),
        Err(e) => {
            tracing::warn!("{} not available: {:#}", what, e);
            Capability::absent(format!("{:#}", e))
        }
    }
}

/// A `*-config` style tool that reports its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTool {
    pub path: PathBuf,
    pub version: Version,
}

impl Cached for ConfigTool {
    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }
}

static VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok());

/// Pull the first `major.minor[.patch]` out of a tool's version output.
pub fn parse_version(text: &str) -> Option<Version> {
    let re = VERSION_RE.as_ref()?;
    let caps = re.captures(text)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(Version::new(num(1)?, num(2)?, num(3).unwrap_or(0)))
}

/// Locate a tool, run it with `version_arg` and require at least `min`.
pub fn detect_config_tool(
    name: &str,
    explicit: Option<&Path>,
    candidates: &[&str],
    version_arg: &str,
    min: &Version,
) -> Capability<ConfigTool> {
    detect(name, || {
        let path = find_program(explicit, candidates)
            .ok_or_else(|| anyhow!("no {} found on PATH", candidates.join(" or ")))?;

        let output = ProcessBuilder::new(&path).arg(version_arg).exec_stdout()?;
        let version = parse_version(&output)
            .ok_or_else(|| anyhow!("could not read a version from `{}`", output))?;

        if &version < min {
            return Err(anyhow!(
                "{} {} is older than the required {}",
                path.display(),
                version,
                min
            ));
        }

        tracing::debug!("found {} {} at {}", name, version, path.display());
        Ok(ConfigTool { path, version })
    })
}
