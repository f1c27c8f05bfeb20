//! Shared utilities

pub mod config;
pub mod context;
pub mod fs;
pub mod hash;
pub mod process;
pub mod shell;

pub use config::{Options, Role};
pub use context::BuildContext;
pub use shell::{Shell, Status};
