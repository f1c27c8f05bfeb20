//! Error categories for the build driver.
//!
//! Operations return `anyhow::Result`; when the category of a failure
//! matters to a caller (fatal vs. per-item), the error is a [`ForgeError`]
//! and can be recovered with `downcast_ref`.
//!
//! Optional dependencies never produce an error value: a failed detection is a
//! [`Capability::Absent`](crate::platform::Capability) marker. A failing test
//! item is a [`TestResult`](crate::ops::test::TestResult) with `passed: false`.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// A categorized build failure.
#[derive(Debug, Error, Diagnostic)]
pub enum ForgeError {
    /// A mandatory toolchain or platform could not be resolved.
    #[error("configuration failed: {what}: {reason}")]
    #[diagnostic(
        code(toolforge::configure::failed),
        help("pass an explicit compiler with --build-cc/--build-cxx, or set CC and CXX")
    )]
    ConfigurationFailure { what: String, reason: String },

    /// A leaf build step failed to compile or link.
    #[error("build step `{step}` failed: {reason}")]
    #[diagnostic(
        code(toolforge::build::step_failed),
        help("run with --verbose to see the commands that were executed")
    )]
    BuildStepFailure { step: String, reason: String },

    /// A spawned sub-process behaved unexpectedly.
    #[error("`{program}` failed: {reason}")]
    #[diagnostic(code(toolforge::exec::failed))]
    ExecutionError { program: String, reason: String },

    /// The install directory is already populated.
    #[error("install directory {} already exists", path.display())]
    #[diagnostic(
        code(toolforge::install::conflict),
        help("remove the existing installation or bump the project version")
    )]
    InstallConflict { path: PathBuf },
}

impl ForgeError {
    pub fn configuration(what: impl Into<String>, reason: impl Into<String>) -> Self {
        ForgeError::ConfigurationFailure {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub fn build_step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        ForgeError::BuildStepFailure {
            step: step.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(program: impl Into<String>, reason: impl Into<String>) -> Self {
        ForgeError::ExecutionError {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Whether this failure must halt the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ForgeError::ExecutionError { .. })
    }
}

/// Find the [`ForgeError`] category of an `anyhow` error, if it has one.
pub fn category(err: &anyhow::Error) -> Option<&ForgeError> {
    err.chain().find_map(|e| e.downcast_ref::<ForgeError>())
}
