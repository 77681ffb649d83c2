//! Prelude module for convenient imports.

pub use crate::error::{ExecutionError, LoadError, Result};
pub use crate::sandbox::{
    config::SandboxConfig,
    executor::{CodeExecutor, ExecutionResult},
    loader::{LoadState, RuntimeLoader},
    normalize::matches,
};
