//! Infrastructure Layer
//!
//! Resource management and I/O machinery behind the lookup service.

pub mod backoff;
pub mod fetch_engine;
pub mod result_cache;
pub mod shutdown;
pub mod slot_pool;

pub use backoff::{BackoffConfig, BackoffState, ErrorBackoff};
pub use fetch_engine::{EngineConfig, EngineError, FetchEngine};
pub use result_cache::{ResultCache, DEFAULT_CACHE_CAPACITY};
pub use shutdown::{shutdown_signal, ShutdownController};
pub use slot_pool::{LookupCallback, PoolError, PoolStats, RequestSlot, SlotPhase, SlotPool};
