//! Platform identity.
//!
//! A platform is a set of tags such as `{posix, linux}` or
//! `{posix, darwin, macosx, bsd}`. Two roles share a toolchain exactly when
//! their tag sets are equal.

mod detect;

pub use detect::{detect, detect_config_tool, parse_version, Capability, ConfigTool};

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ForgeError;

/// Coarse platform family used to pick flag tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformClass {
    Darwin,
    Posix,
    Windows,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    tags: BTreeSet<String>,
}

const ALIASES: &[(&str, &[&str])] = &[
    ("linux", &["posix", "linux"]),
    ("macosx", &["posix", "darwin", "macosx", "bsd"]),
    ("darwin", &["posix", "darwin", "macosx", "bsd"]),
    ("freebsd", &["posix", "bsd", "freebsd"]),
    ("netbsd", &["posix", "bsd", "netbsd"]),
    ("openbsd", &["posix", "bsd", "openbsd"]),
    ("solaris", &["posix", "solaris"]),
    ("cygwin", &["posix", "cygwin"]),
    ("windows", &["windows", "win32"]),
    ("win32", &["windows", "win32"]),
    ("posix", &["posix"]),
];

/// Tags every platform string may combine.
const KNOWN_TAGS: &[&str] = &[
    "posix", "linux", "darwin", "macosx", "bsd", "freebsd", "netbsd", "openbsd", "solaris",
    "cygwin", "windows", "win32", "win64",
];

impl Platform {
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Platform {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// The platform this driver is running on.
    pub fn host() -> Self {
        let alias = match std::env::consts::OS {
            "macos" | "ios" => "macosx",
            "windows" => "windows",
            "freebsd" => "freebsd",
            "netbsd" => "netbsd",
            "openbsd" => "openbsd",
            "solaris" | "illumos" => "solaris",
            "linux" | "android" => "linux",
            _ => "posix",
        };
        Self::alias(alias).unwrap_or_else(|| Platform::from_tags(["posix"]))
    }

    fn alias(name: &str) -> Option<Self> {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, tags)| Platform::from_tags(tags.iter().copied()))
    }

    /// Parse a `--<role>-platform` value: a known alias such as `linux`, or a
    /// comma separated tag list such as `posix,linux`.
    pub fn parse(s: &str) -> Result<Self, ForgeError> {
        let s = s.trim().to_lowercase();
        if let Some(p) = Self::alias(&s) {
            return Ok(p);
        }

        let tags: Vec<&str> = s.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
        if tags.is_empty() {
            return Err(ForgeError::configuration("platform", "empty platform string"));
        }
        if let Some(bad) = tags.iter().find(|t| !KNOWN_TAGS.contains(t)) {
            return Err(ForgeError::configuration(
                "platform",
                format!("unknown platform tag `{}`", bad),
            ));
        }
        Ok(Platform::from_tags(tags))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn class(&self) -> PlatformClass {
        if self.contains("windows") || self.contains("win32") || self.contains("win64") {
            PlatformClass::Windows
        } else if self.contains("darwin") {
            PlatformClass::Darwin
        } else {
            PlatformClass::Posix
        }
    }

    pub fn is_windows(&self) -> bool {
        self.class() == PlatformClass::Windows
    }

    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() {
            ".exe"
        } else {
            ""
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.tags().collect();
        write!(f, "{{{}}}", tags.join(", "))
    }
}

/// Use the explicit platform when given, otherwise detect the running one.
pub fn guess_platform(explicit: Option<&str>) -> Result<Platform, ForgeError> {
    match explicit {
        Some(s) => Platform::parse(s),
        None => Ok(Platform::host()),
    }
}
