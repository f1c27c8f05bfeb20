//! Toolchain detection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use which::which;

use crate::cache::Cached;
use crate::error::ForgeError;
use crate::platform::{Platform, PlatformClass};
use crate::util::process::{find_program, ProcessBuilder};

use super::{CompilerFamily, GccToolchain, MsvcToolchain, Toolchain};

/// The programs making up one C/C++ toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedToolchain {
    pub family: CompilerFamily,
    pub cc: PathBuf,
    pub cxx: PathBuf,
    /// ar, or lib.exe for MSVC
    pub ar: PathBuf,
    /// link.exe for MSVC; unused otherwise
    pub link: Option<PathBuf>,
}

impl Cached for DetectedToolchain {
    fn outputs(&self) -> Vec<PathBuf> {
        let mut out = vec![self.cc.clone(), self.cxx.clone(), self.ar.clone()];
        out.extend(self.link.clone());
        out
    }
}

impl DetectedToolchain {
    pub fn into_toolchain(self) -> Arc<dyn Toolchain> {
        match self.family {
            CompilerFamily::Msvc => {
                let link = self.link.unwrap_or_else(|| PathBuf::from("link"));
                Arc::new(MsvcToolchain::new(self.cc, self.ar, link))
            }
            family => Arc::new(GccToolchain::new(self.cc, self.cxx, self.ar, family)),
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Detect the toolchain for `platform`, honouring explicit compilers.
///
/// Fails with [`ForgeError::ConfigurationFailure`] when no usable C or C++
/// compiler (or archiver) can be found.
pub fn detect(
    platform: &Platform,
    cc: Option<&Path>,
    cxx: Option<&Path>,
) -> Result<DetectedToolchain, ForgeError> {
    match platform.class() {
        PlatformClass::Windows => detect_msvc(cc),
        _ => detect_gcc(cc, cxx),
    }
}

fn detect_gcc(cc: Option<&Path>, cxx: Option<&Path>) -> Result<DetectedToolchain, ForgeError> {
    let cc_request = cc.map(Path::to_path_buf).or_else(|| env_path("CC"));
    let cc = match &cc_request {
        Some(requested) => find_program(Some(requested), &[]),
        None => find_program(None, &["cc", "gcc", "clang"]),
    }
    .ok_or_else(|| {
        ForgeError::configuration(
            "C compiler",
            match &cc_request {
                Some(p) => format!("{} not found", p.display()),
                None => "no cc, gcc or clang on PATH".to_string(),
            },
        )
    })?;

    // An explicit C compiler implies its sibling C++ compiler over $CXX.
    let cxx_request = cxx.map(Path::to_path_buf).unwrap_or_else(|| {
        if cc_request.is_some() {
            GccToolchain::infer_cxx(&cc)
        } else {
            env_path("CXX").unwrap_or_else(|| GccToolchain::infer_cxx(&cc))
        }
    });
    let cxx = find_program(Some(&cxx_request), &[]).ok_or_else(|| {
        ForgeError::configuration(
            "C++ compiler",
            format!("{} not found", cxx_request.display()),
        )
    })?;

    let ar = env_path("AR")
        .and_then(|ar| find_program(Some(&ar), &[]))
        .or_else(|| sibling_archiver(&cc))
        .or_else(|| which("ar").ok())
        .or_else(|| which("llvm-ar").ok())
        .ok_or_else(|| ForgeError::configuration("archiver", "no ar or llvm-ar found"))?;

    let family = detect_compiler_family(&cc);

    tracing::debug!(
        "detected {} toolchain: cc={}, cxx={}, ar={}",
        family.as_str(),
        cc.display(),
        cxx.display(),
        ar.display()
    );

    Ok(DetectedToolchain {
        family,
        cc,
        cxx,
        ar,
        link: None,
    })
}

/// `x86_64-w64-mingw32-gcc` → `x86_64-w64-mingw32-ar` next to it.
fn sibling_archiver(cc: &Path) -> Option<PathBuf> {
    let name = cc.file_name()?.to_str()?;
    let stem = ["gcc", "clang", "cc"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))?;
    let candidate = cc.with_file_name(format!("{}ar", stem));
    candidate.is_file().then_some(candidate)
}

fn detect_msvc(cc: Option<&Path>) -> Result<DetectedToolchain, ForgeError> {
    let missing = |tool: &str| {
        ForgeError::configuration(
            "MSVC toolchain",
            format!("{} not found; run from a Developer Command Prompt", tool),
        )
    };

    let cl = find_program(cc, &["cl"]).ok_or_else(|| missing("cl.exe"))?;
    let lib = which("lib").map_err(|_| missing("lib.exe"))?;
    let link = which("link").map_err(|_| missing("link.exe"))?;

    Ok(DetectedToolchain {
        family: CompilerFamily::Msvc,
        cc: cl.clone(),
        cxx: cl,
        ar: lib,
        link: Some(link),
    })
}

fn detect_compiler_family(cc: &Path) -> CompilerFamily {
    let name = cc
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name.contains("gcc") || name.contains("g++") {
        return CompilerFamily::Gcc;
    }

    let version = ProcessBuilder::new(cc)
        .arg("--version")
        .exec()
        .map(|out| String::from_utf8_lossy(&out.stdout).to_lowercase())
        .unwrap_or_default();

    if version.contains("apple") && version.contains("clang") {
        CompilerFamily::AppleClang
    } else if version.contains("clang") || name.contains("clang") {
        CompilerFamily::Clang
    } else {
        CompilerFamily::Gcc
    }
}
