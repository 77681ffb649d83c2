//! Stdout/stderr capture for guest executions.

use wasmtime_wasi::pipe::MemoryOutputPipe;

use crate::error::{parse_python_exception, ExecutionError};

/// Fresh in-memory capture pipes for one execution.
///
/// Every execution gets its own pair, handed to the WASI context before the
/// guest starts and read back once it settles. Nothing is shared between
/// runs, so a crashed or interrupted run cannot leak output into a later
/// one.
pub struct CapturePipes {
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
}

impl CapturePipes {
    /// Create a pipe pair capped at `capacity` bytes per stream.
    pub fn new(capacity: usize) -> Self {
        Self {
            stdout: MemoryOutputPipe::new(capacity),
            stderr: MemoryOutputPipe::new(capacity),
        }
    }

    /// Handle to plug into the WASI context as stdout.
    ///
    /// Clones share the underlying buffer with this pair.
    pub fn stdout_pipe(&self) -> MemoryOutputPipe {
        self.stdout.clone()
    }

    /// Handle to plug into the WASI context as stderr.
    pub fn stderr_pipe(&self) -> MemoryOutputPipe {
        self.stderr.clone()
    }

    /// Read both streams back out after the guest has settled.
    pub fn read_back(self) -> CapturedStreams {
        CapturedStreams {
            stdout: String::from_utf8_lossy(&self.stdout.contents()).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr.contents()).into_owned(),
        }
    }
}

/// Captured stream contents of a settled execution.
#[derive(Debug, Clone, Default)]
pub struct CapturedStreams {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CapturedStreams {
    /// Compose the user-visible output and the structured error.
    ///
    /// When stderr parses as a Python traceback, the traceback belongs to
    /// the error and output is stdout alone (partial prints before the
    /// crash are preserved). Otherwise output is stdout followed by stderr;
    /// a non-zero exit without a recognizable traceback still counts as a
    /// failure.
    pub fn into_outcome(self, exit_code: i32) -> (String, Option<ExecutionError>) {
        if let Some(exception) = parse_python_exception(&self.stderr) {
            return (self.stdout, Some(exception));
        }

        let mut output = self.stdout;
        output.push_str(&self.stderr);

        let error = if exit_code == 0 {
            None
        } else {
            Some(ExecutionError::Internal(format!(
                "interpreter exited with status {exit_code}"
            )))
        };

        (output, error)
    }
}
