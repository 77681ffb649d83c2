//! Core execution engine for the playground sandbox.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;
use wasmtime::{Linker, Store, Trap, TypedFunc};
use wasmtime_wasi::preview1;
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

use crate::error::{ExecutionError, Result};
use crate::sandbox::io::{CapturePipes, CapturedStreams};
use crate::sandbox::limits::{StoreData, StoreLimiterExt};
use crate::sandbox::loader::{RuntimeHandle, RuntimeLoader};

/// Result of one execution.
///
/// Exactly one of these comes back per [`CodeExecutor::execute`] call.
/// Once the runtime has loaded, every failure mode lives in `error`; the
/// call itself only errs when the load does.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// User-visible output (stdout, plus stderr when it is not a traceback).
    pub output: String,
    /// What went wrong, if anything.
    pub error: Option<ExecutionError>,
    /// Elapsed wall-clock time, whichever way the run settled.
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the execution completed without an error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Elapsed wall-clock time in milliseconds.
    pub fn execution_time_ms(&self) -> u128 {
        self.duration.as_millis()
    }

    /// Rendered error message, if any (what a result panel displays).
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Drives source strings through the shared runtime.
///
/// Executions are serialized through an internal lock: the interpreter
/// handle is shared, and exactly one run may use it at a time. Each run
/// gets a fresh store and fresh capture pipes, so neither a timeout nor a
/// crash can leak state into the next run.
pub struct CodeExecutor {
    loader: Arc<RuntimeLoader>,
    exec_lock: tokio::sync::Mutex<()>,
}

impl CodeExecutor {
    /// Create an executor on top of a (possibly not yet loaded) runtime.
    pub fn new(loader: Arc<RuntimeLoader>) -> Self {
        Self {
            loader,
            exec_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The loader this executor resolves its runtime through.
    pub fn loader(&self) -> &Arc<RuntimeLoader> {
        &self.loader
    }

    /// Execute Python source in the sandbox.
    ///
    /// Suspends until the runtime is ready (triggering the load if nobody
    /// has yet). The returned future only errs on a load failure; any
    /// input, valid or not, otherwise produces an [`ExecutionResult`].
    pub async fn execute(&self, source: &str) -> Result<ExecutionResult> {
        let handle = self.loader.ensure_runtime().await?;
        let config = self.loader.config();
        let timeout = config.timeout;

        let _permit = self.exec_lock.lock().await;

        let started = Instant::now();

        // Epoch ticker: advances the engine epoch so the store's deadline
        // can trap a guest that never yields.
        let ticker_engine = handle.engine().clone();
        let tick = config.epoch_tick_interval;
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                ticker_engine.increment_epoch();
            }
        });

        let run_handle = {
            let handle = Arc::clone(&handle);
            let source = source.to_string();
            let max_memory = config.max_memory;
            let max_output = config.max_output_bytes;
            let ticks = config.deadline_ticks();
            tokio::task::spawn_blocking(move || {
                run_sync(&handle, &source, max_memory, max_output, ticks)
            })
        };

        // Race execution against the wall clock.
        let outcome = tokio::select! {
            joined = run_handle => {
                ticker.abort();
                match joined {
                    Ok(run) => run,
                    Err(e) => Err(ExecutionError::Internal(format!(
                        "execution task panicked: {e}"
                    ))),
                }
            }
            _ = tokio::time::sleep(timeout) => {
                ticker.abort();
                // Push the guest past its epoch deadline: the abandoned run
                // traps and its thread is reclaimed instead of spinning on.
                handle.engine().increment_epoch();
                Err(ExecutionError::Timeout(timeout))
            }
        };

        let duration = started.elapsed();

        let result = match outcome {
            Ok(raw) => {
                let (output, error) = raw.streams.into_outcome(raw.exit_code);
                ExecutionResult {
                    output,
                    error,
                    duration,
                }
            }
            // The trap inside the guest does not know the budget; stamp it.
            Err(ExecutionError::Timeout(_)) => ExecutionResult {
                output: String::new(),
                error: Some(ExecutionError::Timeout(timeout)),
                duration,
            },
            Err(error) => ExecutionResult {
                output: String::new(),
                error: Some(error),
                duration,
            },
        };

        debug!(
            elapsed_ms = duration.as_millis() as u64,
            success = result.is_success(),
            "execution settled"
        );
        Ok(result)
    }
}

/// A guest instance ready to run: store, entrypoint, and capture pipes.
pub(crate) struct GuestSession {
    pub store: Store<StoreData>,
    pub start: TypedFunc<(), ()>,
    pub pipes: CapturePipes,
}

/// Build a fresh store, WASI context, and instance for one run.
///
/// The source is passed programmatically through WASI argv (`python -c
/// <source>`); nothing is spliced into interpreter-level code, so no input
/// can escape the argument position.
pub(crate) fn instantiate_guest(
    handle: &RuntimeHandle,
    source: &str,
    max_memory: u64,
    max_output_bytes: usize,
    deadline_ticks: u64,
) -> std::result::Result<GuestSession, ExecutionError> {
    let pipes = CapturePipes::new(max_output_bytes);

    // No preopened directories, no inherited environment: the guest sees
    // only its argv and the capture pipes.
    let wasi = WasiCtxBuilder::new()
        .args(&["python", "-c", source])
        .stdout(pipes.stdout_pipe())
        .stderr(pipes.stderr_pipe())
        .build_p1();

    let mut store = Store::new(handle.engine(), StoreData::new(max_memory, wasi));
    store.configure_limiter();
    store.epoch_deadline_trap();
    store.set_epoch_deadline(deadline_ticks);

    let mut linker = Linker::new(handle.engine());
    preview1::add_to_linker_sync(&mut linker, |data: &mut StoreData| &mut data.wasi)
        .map_err(|e| ExecutionError::Internal(format!("failed to link WASI: {e}")))?;

    let instance = linker.instantiate(&mut store, handle.module()).map_err(|e| {
        if let Some(denied) = store.data().limiter.denied() {
            ExecutionError::MemoryLimit(denied.to_string())
        } else {
            ExecutionError::Internal(format!("failed to instantiate interpreter: {e}"))
        }
    })?;

    let start = instance
        .get_typed_func::<(), ()>(&mut store, "_start")
        .map_err(|e| ExecutionError::Internal(format!("interpreter has no entrypoint: {e}")))?;

    Ok(GuestSession {
        store,
        start,
        pipes,
    })
}

/// Raw, uncomposed outcome of a guest run.
pub(crate) struct RawRun {
    pub streams: CapturedStreams,
    pub exit_code: i32,
}

/// Synchronous execution (runs on a blocking thread).
pub(crate) fn run_sync(
    handle: &RuntimeHandle,
    source: &str,
    max_memory: u64,
    max_output_bytes: usize,
    deadline_ticks: u64,
) -> std::result::Result<RawRun, ExecutionError> {
    let GuestSession {
        mut store,
        start,
        pipes,
    } = instantiate_guest(handle, source, max_memory, max_output_bytes, deadline_ticks)?;

    let exit_code = match start.call(&mut store, ()) {
        Ok(()) => 0,
        Err(e) => {
            if let Some(denied) = store.data().limiter.denied() {
                return Err(ExecutionError::MemoryLimit(denied.to_string()));
            }

            // Epoch deadline reached; the caller stamps the real budget in.
            if matches!(e.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
                return Err(ExecutionError::Timeout(Duration::ZERO));
            }

            match e.downcast_ref::<I32Exit>() {
                Some(exit) => exit.0,
                None => return Err(ExecutionError::Internal(e.to_string())),
            }
        }
    };

    Ok(RawRun {
        streams: pipes.read_back(),
        exit_code,
    })
}
