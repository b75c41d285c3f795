//! Shared CLI plumbing for the fallwatch binaries.

pub mod common;
pub mod logging;

pub use common::{wgpu_enabled, BackendKind, ConfigArgs};
pub use logging::init_logging;
