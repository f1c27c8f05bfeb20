//! Toolforge - a phase-aware build driver for self-hosting compilers
//!
//! A build is described for three roles: the machine running the build, the
//! machine the built compiler runs on (host) and the machine its programs
//! run on (target). Each role resolves to a [`phase::Phase`]; roles with the
//! same platform share one. Every compile, link and tool lookup goes through a
//! content-addressed [`cache::Cache`], so rebuilding an unchanged tree runs
//! no tools at all.

pub mod cache;
pub mod core;
pub mod error;
pub mod extract;
pub mod ops;
pub mod phase;
pub mod platform;
pub mod scheduler;
pub mod toolchain;
pub mod util;

/// Fake toolchains and project fixtures for unit tests.
#[cfg(test)]
pub mod test_support;

pub use crate::core::Manifest;
pub use error::ForgeError;
pub use phase::{Phase, Phases};
pub use platform::{Capability, Platform};
pub use util::context::BuildContext;
