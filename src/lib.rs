//! # pyground
//!
//! A lazy-loading Python execution sandbox for interactive code
//! playgrounds.
//!
//! The interpreter (RustPython compiled to WebAssembly, run under
//! Wasmtime) is not touched until the first execution: the loader then
//! fetches the versioned distribution, compiles it, and caches the handle
//! for the rest of the process. Submitted source runs against that shared
//! handle with:
//!
//! - **Deduplicated bootstrap**: concurrent first calls share one fetch
//!   and one compile; a failed load can be retried.
//! - **Deterministic capture**: stdout/stderr go to fresh in-memory pipes
//!   per run and come back in the result.
//! - **A wall-clock budget**: runs are raced against a timeout (5 s by
//!   default) and forcibly interrupted via epoch interruption when they
//!   exceed it.
//! - **Structured results**: exceptions, timeouts, and limit violations
//!   are values inside [`ExecutionResult`], not errors from `execute`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pyground::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let loader = Arc::new(RuntimeLoader::new(SandboxConfig::default()));
//!     let executor = CodeExecutor::new(Arc::clone(&loader));
//!
//!     let result = executor.execute("print('hello')").await?;
//!     assert!(result.is_success());
//!     assert!(matches(&result.output, "hello"));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Isolation Model
//!
//! Guest code runs under WASI Preview 1 with no preopened directories, no
//! inherited environment, and no network capability. This bounds what a
//! snippet can touch; it is not a hardened multi-tenant boundary.

pub mod error;
pub mod prelude;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use error::{ExecutionError, LoadError, Result};
pub use sandbox::config::{InterpreterSource, SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::{CodeExecutor, ExecutionResult};
pub use sandbox::loader::{LoadState, RuntimeHandle, RuntimeLoader};
pub use sandbox::normalize::{matches, normalize};
