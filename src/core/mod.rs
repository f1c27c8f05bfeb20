//! Project description types.

pub mod manifest;

pub use manifest::{
    CopySpec, ExecutableSpec, FrontendSpec, LibrarySpec, Manifest, Requirement, SuiteMode,
    SuiteSpec, ToolSpec, MANIFEST_FILE,
};
