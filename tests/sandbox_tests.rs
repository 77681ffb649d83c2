//! End-to-end tests against stub interpreter modules.
//!
//! These run the full load/execute pipeline without the real interpreter
//! distribution: each fixture is a tiny WASI module (written as wat, which
//! the engine compiles directly) standing in for the interpreter. Tests
//! that need real Python live in `interpreter_tests.rs`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pyground::prelude::*;

/// An interpreter that accepts any source and produces nothing.
const EMPTY_INTERPRETER: &str = r#"(module (func (export "_start")))"#;

/// An interpreter stuck in a tight loop, regardless of source.
const SPIN_INTERPRETER: &str = r#"(module (func (export "_start") (loop (br 0))))"#;

/// An interpreter that prints a greeting to stdout.
const GREETING_INTERPRETER: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "hello\n")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 16))
    (i32.store (i32.const 4) (i32.const 6))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))"#;

/// An interpreter that dies with a Python-style traceback on stderr.
fn traceback_interpreter() -> String {
    let msg = "Traceback (most recent call last):\n  File \"<string>\", line 1, in <module>\nZeroDivisionError: division by zero\n";
    let escaped = msg
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!(
        r#"(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "{escaped}")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 16))
    (i32.store (i32.const 4) (i32.const {len}))
    (drop (call $fd_write (i32.const 2) (i32.const 0) (i32.const 1) (i32.const 8)))
    (call $proc_exit (i32.const 1))))"#,
        len = msg.len()
    )
}

fn stub_path(dir: &tempfile::TempDir, wat: &str) -> PathBuf {
    let path = dir.path().join("interpreter.wasm");
    std::fs::write(&path, wat).unwrap();
    path
}

fn executor_for(wat: &str, timeout: Duration) -> (CodeExecutor, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = SandboxConfig::builder()
        .interpreter_path(stub_path(&dir, wat))
        .timeout(timeout)
        .build();
    let executor = CodeExecutor::new(Arc::new(RuntimeLoader::new(config)));
    (executor, dir)
}

#[tokio::test]
async fn concurrent_loads_share_one_handle() {
    let dir = tempfile::tempdir().unwrap();
    let config = SandboxConfig::builder()
        .interpreter_path(stub_path(&dir, EMPTY_INTERPRETER))
        .build();
    let loader = RuntimeLoader::new(config);
    assert_eq!(loader.state(), LoadState::Unloaded);

    // Both issued before the first settles; they must resolve to the same
    // handle from a single load.
    let (a, b) = tokio::join!(loader.ensure_runtime(), loader.ensure_runtime());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(loader.state(), LoadState::Ready);

    // And a later call returns the cached handle.
    let c = loader.ensure_runtime().await.unwrap();
    assert!(Arc::ptr_eq(&a, &c));
}

#[tokio::test]
async fn execute_resolves_for_any_source() {
    let (executor, _dir) = executor_for(EMPTY_INTERPRETER, Duration::from_secs(5));

    for source in ["", "print('hi')", "def broken(:", "   \n\t", "print('🦀')"] {
        let result = executor.execute(source).await.unwrap();
        assert!(result.is_success(), "source {source:?} should produce a result");
        assert!(result.output.is_empty());
    }
}

#[tokio::test]
async fn empty_source_yields_empty_result() {
    let (executor, _dir) = executor_for(EMPTY_INTERPRETER, Duration::from_secs(5));

    let result = executor.execute("").await.unwrap();
    assert_eq!(result.output, "");
    assert!(result.error.is_none());
}

#[tokio::test]
async fn stdout_is_captured() {
    let (executor, _dir) = executor_for(GREETING_INTERPRETER, Duration::from_secs(5));

    let result = executor.execute("print('hello')").await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.output, "hello\n");
    assert!(matches(&result.output, "hello"));
}

#[tokio::test]
async fn traceback_becomes_structured_error() {
    let wat = traceback_interpreter();
    let (executor, _dir) = executor_for(&wat, Duration::from_secs(5));

    let result = executor.execute("1/0").await.unwrap();
    assert_eq!(result.output, "");
    let error = result.error.expect("expected an exception");
    assert!(error.is_exception());
    assert!(error.to_string().contains("division by zero"));
}

#[tokio::test]
async fn runaway_guest_times_out() {
    let (executor, _dir) = executor_for(SPIN_INTERPRETER, Duration::from_millis(250));

    let result = executor.execute("while True: pass").await.unwrap();
    let error = result.error.expect("expected a timeout");
    assert!(error.is_timeout());
    assert!(result.output.is_empty());

    // Elapsed time reflects the budget, not the (interrupted) spin.
    assert!(result.duration >= Duration::from_millis(250));
    assert!(result.duration < Duration::from_secs(5));
}

#[tokio::test]
async fn executor_stays_usable_after_timeout() {
    // A run that blows its budget must not poison later runs: every run
    // gets a fresh store and fresh pipes.
    let dir = tempfile::tempdir().unwrap();
    let spin = stub_path(&dir, SPIN_INTERPRETER);
    let config = SandboxConfig::builder()
        .interpreter_path(&spin)
        .timeout(Duration::from_millis(200))
        .build();
    let executor = CodeExecutor::new(Arc::new(RuntimeLoader::new(config)));

    let first = executor.execute("while True: pass").await.unwrap();
    assert!(first.error.unwrap().is_timeout());

    let second = executor.execute("while True: pass").await.unwrap();
    let error = second.error.expect("second run should time out the same way");
    assert!(error.is_timeout());
    assert!(second.output.is_empty());
}

#[tokio::test]
async fn overlapping_executions_are_serialized() {
    let (executor, _dir) = executor_for(GREETING_INTERPRETER, Duration::from_secs(5));
    let executor = Arc::new(executor);

    let (a, b) = tokio::join!(
        {
            let executor = Arc::clone(&executor);
            async move { executor.execute("print('hello')").await }
        },
        {
            let executor = Arc::clone(&executor);
            async move { executor.execute("print('hello')").await }
        }
    );

    // Neither run observes the other's output.
    assert_eq!(a.unwrap().output, "hello\n");
    assert_eq!(b.unwrap().output, "hello\n");
}

#[tokio::test]
async fn load_failure_then_valid_retry_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interpreter.wasm");

    let config = SandboxConfig::builder().interpreter_path(&path).build();
    let loader = RuntimeLoader::new(config);

    // Nothing at the path yet: the load fails.
    assert!(loader.ensure_runtime().await.is_err());
    assert_eq!(loader.state(), LoadState::Failed);

    // Provision the interpreter and retry on the same loader.
    std::fs::write(&path, EMPTY_INTERPRETER).unwrap();
    loader.ensure_runtime().await.unwrap();
    assert_eq!(loader.state(), LoadState::Ready);

    // The recovered runtime executes normally.
    let executor = CodeExecutor::new(Arc::new(loader));
    let result = executor.execute("x = 1").await.unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn corrupt_interpreter_fails_to_compile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interpreter.wasm");
    std::fs::write(&path, b"this is not a wasm module").unwrap();

    let config = SandboxConfig::builder().interpreter_path(&path).build();
    let loader = RuntimeLoader::new(config);

    assert!(matches!(
        loader.ensure_runtime().await,
        Err(LoadError::Compile(_))
    ));
    assert_eq!(loader.state(), LoadState::Failed);
}
