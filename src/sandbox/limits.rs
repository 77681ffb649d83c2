//! Resource limiting for guest executions.

use wasmtime::{ResourceLimiter, Store};

/// Resource limiter that bounds guest memory and table growth.
///
/// Denials are recorded so the executor can report what was refused
/// instead of surfacing an opaque instantiation trap.
pub struct GuestLimiter {
    /// Maximum memory in bytes.
    max_memory: u64,
    /// Maximum table elements.
    max_table_elements: usize,
    /// Why growth was denied, if it was.
    denied: Option<String>,
}

impl GuestLimiter {
    /// Create a new limiter with the specified memory limit.
    pub fn new(max_memory: u64) -> Self {
        Self {
            max_memory,
            max_table_elements: 10_000,
            denied: None,
        }
    }

    /// The denial reason, if any limit was hit.
    pub fn denied(&self) -> Option<&str> {
        self.denied.as_deref()
    }
}

impl ResourceLimiter for GuestLimiter {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired as u64 > self.max_memory {
            self.denied = Some(format!(
                "guest requested {desired} bytes of memory, limit is {}",
                self.max_memory
            ));
            return Ok(false);
        }
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.max_table_elements {
            self.denied = Some(format!(
                "guest requested {desired} table elements, limit is {}",
                self.max_table_elements
            ));
            return Ok(false);
        }
        Ok(true)
    }
}

/// Per-execution store data: the limiter plus the WASI context.
pub struct StoreData {
    /// The resource limiter.
    pub limiter: GuestLimiter,
    /// WASI Preview 1 context for the guest.
    pub wasi: wasmtime_wasi::preview1::WasiP1Ctx,
}

impl StoreData {
    /// Create new store data with the given memory limit and WASI context.
    pub fn new(max_memory: u64, wasi: wasmtime_wasi::preview1::WasiP1Ctx) -> Self {
        Self {
            limiter: GuestLimiter::new(max_memory),
            wasi,
        }
    }
}

/// Extension trait for Store to configure resource limiting.
pub trait StoreLimiterExt {
    /// Configure the store with resource limiting enabled.
    fn configure_limiter(&mut self);
}

impl StoreLimiterExt for Store<StoreData> {
    fn configure_limiter(&mut self) {
        self.limiter(|data| &mut data.limiter);
    }
}
