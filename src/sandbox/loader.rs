//! Lazy bootstrap of the interpreter runtime.
//!
//! The loader owns the one [`RuntimeHandle`] of the process. Nothing is
//! fetched or compiled until the first [`ensure_runtime`] call; concurrent
//! callers during that first load all await the same in-flight bootstrap,
//! so the distribution is fetched and compiled at most once. A failed load
//! leaves the cell empty and a later call starts over.
//!
//! [`ensure_runtime`]: RuntimeLoader::ensure_runtime

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};
use wasmtime::{Engine, Module};

use crate::error::{LoadError, Result};
use crate::sandbox::config::{InterpreterSource, SandboxConfig};
use crate::sandbox::executor;

/// Phase of the one-time runtime bootstrap, observable by UI code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No load has been attempted yet.
    Unloaded,
    /// A load is in flight.
    Loading,
    /// The runtime is ready. Terminal for the loader's lifetime.
    Ready,
    /// The last load attempt failed. A later call retries.
    Failed,
}

/// The loaded interpreter: engine plus compiled module.
///
/// Exactly one exists per loader once a load succeeds, shared as
/// `Arc<RuntimeHandle>`. Executors borrow it for the duration of one run
/// and build a fresh store each time, so the handle carries no
/// per-execution state.
pub struct RuntimeHandle {
    engine: Engine,
    module: Module,
}

impl RuntimeHandle {
    /// The engine the module was compiled for.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The compiled interpreter module.
    pub fn module(&self) -> &Module {
        &self.module
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("engine", &"<wasmtime::Engine>")
            .field("module", &"<wasmtime::Module>")
            .finish()
    }
}

/// Lazily bootstraps the interpreter and hands out the shared handle.
pub struct RuntimeLoader {
    config: SandboxConfig,
    handle: OnceCell<Arc<RuntimeHandle>>,
    state_tx: watch::Sender<LoadState>,
}

impl RuntimeLoader {
    /// Create a loader. No work happens until the first
    /// [`ensure_runtime`](Self::ensure_runtime) call.
    pub fn new(config: SandboxConfig) -> Self {
        let (state_tx, _) = watch::channel(LoadState::Unloaded);
        Self {
            config,
            handle: OnceCell::new(),
            state_tx,
        }
    }

    /// The configuration this loader (and its executions) run under.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Current bootstrap phase.
    pub fn state(&self) -> LoadState {
        *self.state_tx.borrow()
    }

    /// Subscribe to bootstrap phase changes (loading indicators).
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state_tx.subscribe()
    }

    /// Resolve the shared runtime handle, bootstrapping it on first use.
    ///
    /// Idempotent and safe to call concurrently: callers that arrive while
    /// a load is in flight await that same load. Only a load failure
    /// returns `Err`; the cell stays empty afterwards so the next call
    /// retries from scratch.
    pub async fn ensure_runtime(&self) -> Result<Arc<RuntimeHandle>> {
        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }

        self.handle
            .get_or_try_init(|| self.bootstrap())
            .await
            .map(Arc::clone)
    }

    async fn bootstrap(&self) -> Result<Arc<RuntimeHandle>> {
        self.state_tx.send_replace(LoadState::Loading);
        let started = Instant::now();

        match self.bootstrap_inner().await {
            Ok(handle) => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "runtime ready");
                self.state_tx.send_replace(LoadState::Ready);
                Ok(handle)
            }
            Err(e) => {
                warn!(error = %e, "runtime load failed");
                self.state_tx.send_replace(LoadState::Failed);
                Err(e)
            }
        }
    }

    async fn bootstrap_inner(&self) -> Result<Arc<RuntimeHandle>> {
        let wasm = self.interpreter_bytes().await?;

        let mut engine_config = wasmtime::Config::new();
        engine_config.epoch_interruption(true);
        let engine = Engine::new(&engine_config).map_err(LoadError::RuntimeInit)?;

        // Compiling the interpreter takes long enough to deserve a blocking
        // thread.
        let module = {
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || Module::new(&engine, &wasm))
                .await
                .map_err(|e| {
                    LoadError::RuntimeInit(anyhow::anyhow!("compile task panicked: {e}"))
                })?
                .map_err(LoadError::Compile)?
        };

        let handle = Arc::new(RuntimeHandle { engine, module });
        self.prime(&handle).await?;
        Ok(handle)
    }

    /// Obtain the interpreter wasm bytes from the configured source.
    async fn interpreter_bytes(&self) -> Result<Vec<u8>> {
        match &self.config.interpreter {
            InterpreterSource::Path(path) => {
                debug!(path = %path.display(), "reading local interpreter");
                tokio::fs::read(path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        LoadError::InterpreterNotFound(path.display().to_string())
                    } else {
                        LoadError::Io(e)
                    }
                })
            }
            InterpreterSource::Url(url) => {
                let cached = self.cache_path(url);
                if cached.exists() {
                    debug!(path = %cached.display(), "interpreter cache hit");
                    return Ok(tokio::fs::read(&cached).await?);
                }

                info!(url = %url, "fetching interpreter distribution");
                let bytes = fetch_distribution(url).await?;

                // Write-then-rename so a concurrent process never reads a
                // torn cache file.
                tokio::fs::create_dir_all(&self.config.cache_dir).await?;
                let partial = cached.with_extension("part");
                tokio::fs::write(&partial, &bytes).await?;
                tokio::fs::rename(&partial, &cached).await?;
                debug!(path = %cached.display(), bytes = bytes.len(), "interpreter cached");

                Ok(bytes)
            }
        }
    }

    /// Disk cache location for a distribution URL.
    fn cache_path(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.config.cache_dir.join(format!("{digest:x}.wasm"))
    }

    /// Verify the compiled module is actually runnable before declaring
    /// the runtime ready: it must instantiate, export the entrypoint, and
    /// its capture pipes must read back clean.
    async fn prime(&self, handle: &Arc<RuntimeHandle>) -> Result<()> {
        let handle = Arc::clone(handle);
        let max_memory = self.config.max_memory;
        let max_output = self.config.max_output_bytes;
        let ticks = self.config.deadline_ticks();

        tokio::task::spawn_blocking(move || -> std::result::Result<(), String> {
            let session = executor::instantiate_guest(&handle, "", max_memory, max_output, ticks)
                .map_err(|e| e.to_string())?;

            let streams = session.pipes.read_back();
            if !streams.stdout.is_empty() || !streams.stderr.is_empty() {
                return Err("capture pipes not clean after instantiation".to_string());
            }
            Ok(())
        })
        .await
        .map_err(|e| LoadError::Prime(format!("priming task panicked: {e}")))?
        .map_err(LoadError::Prime)?;

        debug!("interpreter primed");
        Ok(())
    }
}

/// One-time download of the interpreter distribution.
async fn fetch_distribution(url: &str) -> Result<Vec<u8>> {
    let fetch_err = |source: reqwest::Error| LoadError::Fetch {
        url: url.to_string(),
        source,
    };

    let response = reqwest::get(url)
        .await
        .map_err(fetch_err)?
        .error_for_status()
        .map_err(fetch_err)?;

    let bytes = response.bytes().await.map_err(fetch_err)?;
    Ok(bytes.to_vec())
}
