//! High-level operations.
//!
//! One module per subcommand, plus the pieces they share: the build graph
//! and its steps, file copies, and the driver for the freshly built builder.

pub mod build;
pub mod compiler;
pub mod configure;
pub mod copy;
pub mod dist;
pub mod doc;
pub mod install;
pub mod speed;
pub mod steps;

pub use build::{build, BuildOutputs, ComponentResult, LeafStep, Stage, StepId};
pub use configure::{configure, Configured};
pub use dist::{dist, DistReport};
pub use doc::doc;
pub use install::{install, install_bin, install_lib, InstallReport};
pub use speed::{speed, SpeedResult};
pub use test::{run_tests, TestReport, TestResult};
