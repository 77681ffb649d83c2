//! Sandbox configuration with builder pattern.

use std::path::PathBuf;
use std::time::Duration;

/// Fixed, versioned interpreter distribution fetched on first use.
pub const DEFAULT_DIST_URL: &str =
    "https://github.com/RustPython/RustPython/releases/download/v0.4.0/rustpython.wasm";

/// Wall-clock budget for a single execution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Where the interpreter wasm comes from.
#[derive(Debug, Clone)]
pub enum InterpreterSource {
    /// Download from a distribution URL, cached on disk after the first fetch.
    Url(String),
    /// Read a pre-provisioned wasm file from the local filesystem.
    Path(PathBuf),
}

impl Default for InterpreterSource {
    fn default() -> Self {
        InterpreterSource::Url(DEFAULT_DIST_URL.to_string())
    }
}

/// Configuration for the playground sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum execution time before timeout.
    pub timeout: Duration,
    /// Where to obtain the interpreter wasm.
    pub interpreter: InterpreterSource,
    /// Directory for the downloaded-interpreter disk cache.
    pub cache_dir: PathBuf,
    /// Maximum guest memory in bytes.
    pub max_memory: u64,
    /// Maximum bytes captured per output stream.
    pub max_output_bytes: usize,
    /// Epoch interruption interval for cooperative timeout.
    pub epoch_tick_interval: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interpreter: InterpreterSource::default(),
            cache_dir: std::env::temp_dir().join("pyground"),
            max_memory: 64 * 1024 * 1024, // 64MB
            max_output_bytes: 1024 * 1024,
            epoch_tick_interval: Duration::from_millis(10),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Epoch deadline for one run: the ticks that fit inside the timeout
    /// budget, plus two ticks of slack.
    ///
    /// The slack keeps the wall-clock race the authority on when a run
    /// timed out; the deadline is the backstop that traps a guest nobody
    /// is waiting on anymore.
    pub(crate) fn deadline_ticks(&self) -> u64 {
        let ticks = self.timeout.as_millis() / self.epoch_tick_interval.as_millis().max(1);
        ticks as u64 + 2
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    timeout: Option<Duration>,
    interpreter: Option<InterpreterSource>,
    cache_dir: Option<PathBuf>,
    max_memory: Option<u64>,
    max_output_bytes: Option<usize>,
    epoch_tick_interval: Option<Duration>,
}

impl SandboxConfigBuilder {
    /// Set the maximum execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the interpreter distribution URL.
    pub fn dist_url(mut self, url: impl Into<String>) -> Self {
        self.interpreter = Some(InterpreterSource::Url(url.into()));
        self
    }

    /// Use a local wasm file instead of downloading a distribution.
    pub fn interpreter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(InterpreterSource::Path(path.into()));
        self
    }

    /// Set the directory used to cache the downloaded interpreter.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the maximum guest memory limit in bytes.
    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Set the per-stream captured output cap in bytes.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set the epoch tick interval for timeout checking.
    pub fn epoch_tick_interval(mut self, interval: Duration) -> Self {
        self.epoch_tick_interval = Some(interval);
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            interpreter: self.interpreter.unwrap_or(default.interpreter),
            cache_dir: self.cache_dir.unwrap_or(default.cache_dir),
            max_memory: self.max_memory.unwrap_or(default.max_memory),
            max_output_bytes: self.max_output_bytes.unwrap_or(default.max_output_bytes),
            epoch_tick_interval: self
                .epoch_tick_interval
                .unwrap_or(default.epoch_tick_interval),
        }
    }
}
