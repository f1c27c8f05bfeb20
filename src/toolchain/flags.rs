//! Platform-keyed compiler flag tables.

use crate::platform::PlatformClass;

use super::{Language, Toolchain};

/// Warnings, base flags and optimisation flags for one platform class and
/// language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagTable {
    /// Warning names, rendered by the toolchain (`all` becomes `-Wall`).
    pub warnings: &'static [&'static str],
    pub flags: &'static [&'static str],
    /// Used when not building with debug info.
    pub optimize: &'static [&'static str],
}

const POSIX_OPTIMIZE: &[&str] = &["-O3", "-fomit-frame-pointer"];

// clang on darwin needs extra suppressions for the runtime sources
const DARWIN_C: FlagTable = FlagTable {
    warnings: &[
        "all",
        "fatal-errors",
        "no-constant-logical-operand",
        "no-array-bounds",
    ],
    flags: &["-fno-common"],
    optimize: POSIX_OPTIMIZE,
};

const DARWIN_CXX: FlagTable = FlagTable {
    warnings: &[
        "all",
        "fatal-errors",
        "no-invalid-offsetof",
        "no-bitwise-op-parentheses",
        "no-parentheses-equality",
        "no-return-stack-address",
        "no-tautological-compare",
        "no-return-type-c-linkage",
    ],
    flags: &["-fno-common"],
    optimize: POSIX_OPTIMIZE,
};

const POSIX_C: FlagTable = FlagTable {
    warnings: &["all", "fatal-errors"],
    flags: &["-fno-common"],
    optimize: POSIX_OPTIMIZE,
};

const POSIX_CXX: FlagTable = FlagTable {
    warnings: &["all", "fatal-errors", "no-invalid-offsetof"],
    flags: &["-fno-common"],
    optimize: POSIX_OPTIMIZE,
};

const WINDOWS: FlagTable = FlagTable {
    warnings: &[],
    flags: &["/GR", "/MD", "/EHs", "/wd4291"],
    optimize: &["/Ox"],
};

impl FlagTable {
    pub fn for_platform(class: PlatformClass, lang: Language) -> FlagTable {
        match (class, lang) {
            (PlatformClass::Darwin, Language::C) => DARWIN_C,
            (PlatformClass::Darwin, Language::Cxx) => DARWIN_CXX,
            (PlatformClass::Posix, Language::C) => POSIX_C,
            (PlatformClass::Posix, Language::Cxx) => POSIX_CXX,
            (PlatformClass::Windows, _) => WINDOWS,
        }
    }

    /// The full flag list: warnings, base flags, user flags, then either
    /// debug or optimisation flags.
    pub fn render(&self, toolchain: &dyn Toolchain, debug: bool, user_flags: &[String]) -> Vec<String> {
        let mut out: Vec<String> = self
            .warnings
            .iter()
            .filter_map(|w| toolchain.warning_flag(w))
            .collect();

        out.extend(self.flags.iter().map(|f| f.to_string()));
        out.extend(user_flags.iter().cloned());

        if debug {
            out.extend(toolchain.debug_flags());
        } else {
            out.extend(self.optimize.iter().map(|f| f.to_string()));
        }
        out
    }
}
