//! Error types for the playground sandbox.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while bootstrapping the interpreter runtime.
///
/// This is the only error kind that escapes the public API. It propagates
/// from [`RuntimeLoader::ensure_runtime`] and from a
/// [`CodeExecutor::execute`] call that triggers the load itself; every
/// failure after a successful load is folded into the returned
/// [`ExecutionResult`] instead.
///
/// [`RuntimeLoader::ensure_runtime`]: crate::sandbox::loader::RuntimeLoader::ensure_runtime
/// [`CodeExecutor::execute`]: crate::sandbox::executor::CodeExecutor::execute
/// [`ExecutionResult`]: crate::sandbox::executor::ExecutionResult
#[derive(Error, Debug)]
pub enum LoadError {
    /// Downloading the interpreter distribution failed.
    #[error("failed to fetch interpreter from {url}: {source}")]
    Fetch {
        /// The distribution URL that was requested.
        url: String,
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// A local-path interpreter source pointed at nothing.
    #[error("interpreter wasm not found at: {0}")]
    InterpreterNotFound(String),

    /// I/O error while reading or caching the interpreter.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to construct the Wasm engine.
    #[error("failed to initialize runtime: {0}")]
    RuntimeInit(#[source] anyhow::Error),

    /// The interpreter module failed to compile.
    #[error("failed to compile interpreter module: {0}")]
    Compile(#[source] anyhow::Error),

    /// The post-compile priming run did not come back clean.
    #[error("interpreter priming failed: {0}")]
    Prime(String),
}

/// Failure modes of a single execution.
///
/// Carried inside [`ExecutionResult`](crate::sandbox::executor::ExecutionResult)
/// rather than returned as `Err`: a caller that got the runtime loaded once
/// always receives a result, whatever the submitted source did.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The guest raised a Python exception.
    #[error("Python {exception_type}: {message}")]
    Exception {
        /// The type of Python exception (e.g., "ValueError", "TypeError").
        exception_type: String,
        /// The exception message.
        message: String,
        /// The full Python traceback, if available.
        traceback: Option<String>,
    },

    /// The execution did not settle within its wall-clock budget.
    #[error("execution exceeded the {0:?} time budget")]
    Timeout(Duration),

    /// Guest memory growth was denied by the resource limiter.
    #[error("memory limit exceeded: {0}")]
    MemoryLimit(String),

    /// Any other failure at the executor boundary.
    #[error("execution failed: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout(_))
    }

    /// Check if this error represents a Python exception.
    pub fn is_exception(&self) -> bool {
        matches!(self, ExecutionError::Exception { .. })
    }

    /// Check if this error represents a memory limit violation.
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, ExecutionError::MemoryLimit(_))
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Parse a Python exception from captured stderr.
///
/// Extracts the exception type, message, and traceback from Python's
/// standard error output format. Returns `None` when stderr does not look
/// like an interpreter traceback (plain diagnostics stay part of the
/// user-visible output).
pub fn parse_python_exception(stderr: &str) -> Option<ExecutionError> {
    if stderr.trim().is_empty() {
        return None;
    }

    let lines: Vec<&str> = stderr.lines().collect();

    // The exception line is the last unindented line that names an
    // exception; everything from "Traceback (most recent call last):" down
    // to it is the traceback.
    let mut exception_line = None;
    let mut traceback_start = None;

    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("Traceback (most recent call last):") {
            traceback_start = Some(i);
        }
        if !line.starts_with(' ') && !line.starts_with("Traceback") && looks_like_exception(line) {
            exception_line = Some((i, *line));
        }
    }

    let (line_idx, exception_str) = exception_line?;

    let (exception_type, message) = match exception_str.find(':') {
        Some(colon) => (
            exception_str[..colon].trim().to_string(),
            exception_str[colon + 1..].trim().to_string(),
        ),
        None => (exception_str.trim().to_string(), String::new()),
    };

    let traceback = traceback_start.map(|start| lines[start..=line_idx].join("\n"));

    Some(ExecutionError::Exception {
        exception_type,
        message,
        traceback,
    })
}

/// Check if a line looks like a Python exception.
fn looks_like_exception(line: &str) -> bool {
    let standalone = [
        "KeyboardInterrupt",
        "SystemExit",
        "StopIteration",
        "GeneratorExit",
    ];

    if !line
        .chars()
        .next()
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
    {
        return false;
    }

    // "SomethingError: message", "SomethingError", or a standalone name.
    for pattern in ["Error", "Exception", "Warning"] {
        if let Some(idx) = line.find(pattern) {
            if boundary_after(line, idx + pattern.len()) {
                return true;
            }
        }
    }

    standalone
        .iter()
        .any(|exc| line.starts_with(exc) && boundary_after(line, exc.len()))
}

/// Whether the byte at `idx` ends an exception name (colon, space, or EOL).
fn boundary_after(line: &str, idx: usize) -> bool {
    idx >= line.len() || matches!(line.as_bytes()[idx], b':' | b' ' | b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_exception() {
        let stderr = "ValueError: invalid literal for int() with base 10: 'abc'";
        let result = parse_python_exception(stderr);

        assert!(result.is_some());
        if let Some(ExecutionError::Exception {
            exception_type,
            message,
            traceback,
        }) = result
        {
            assert_eq!(exception_type, "ValueError");
            assert_eq!(message, "invalid literal for int() with base 10: 'abc'");
            assert!(traceback.is_none());
        } else {
            panic!("Expected Exception");
        }
    }

    #[test]
    fn test_parse_exception_with_traceback() {
        let stderr = r#"Traceback (most recent call last):
  File "<string>", line 1, in <module>
ZeroDivisionError: division by zero"#;

        let result = parse_python_exception(stderr);

        assert!(result.is_some());
        if let Some(ExecutionError::Exception {
            exception_type,
            message,
            traceback,
        }) = result
        {
            assert_eq!(exception_type, "ZeroDivisionError");
            assert_eq!(message, "division by zero");
            assert!(traceback.is_some());
            assert!(traceback.unwrap().contains("Traceback"));
        } else {
            panic!("Expected Exception");
        }
    }

    #[test]
    fn test_parse_exception_no_message() {
        let stderr = "StopIteration";
        let result = parse_python_exception(stderr);

        assert!(result.is_some());
        if let Some(ExecutionError::Exception {
            exception_type,
            message,
            ..
        }) = result
        {
            assert_eq!(exception_type, "StopIteration");
            assert!(message.is_empty());
        } else {
            panic!("Expected Exception");
        }
    }

    #[test]
    fn test_parse_empty_stderr() {
        assert!(parse_python_exception("").is_none());
        assert!(parse_python_exception("   ").is_none());
    }

    #[test]
    fn test_plain_diagnostics_are_not_exceptions() {
        assert!(parse_python_exception("warning: something minor\n").is_none());
        assert!(parse_python_exception("loaded 3 modules").is_none());
    }

    #[test]
    fn test_error_helpers() {
        let timeout = ExecutionError::Timeout(Duration::from_secs(5));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_memory_limit());
        assert!(!timeout.is_exception());

        let memory = ExecutionError::MemoryLimit("test".to_string());
        assert!(!memory.is_timeout());
        assert!(memory.is_memory_limit());

        let exc = ExecutionError::Exception {
            exception_type: "ValueError".to_string(),
            message: "test".to_string(),
            traceback: None,
        };
        assert!(exc.is_exception());
    }
}
