//! cloud-pinyin Library
//!
//! Asynchronous remote lookup of pinyin keys for an input method: a bounded
//! pool of request slots, a background fetch engine, an LRU result cache and
//! an error backoff, exposed through [`LookupService`].

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::inbound::Console;
pub use adapters::outbound::{BaiduBackend, GoogleBackend};
pub use application::{LookupOptions, LookupService, LookupStats};
pub use config::{load_config, Config, ConfigError};
pub use domain::entities::{TransferStatus, TransportRequest};
pub use domain::ports::BackendStrategy;
pub use domain::value_objects::{BackendKind, Hotkey};
pub use infrastructure::{EngineConfig, FetchEngine};
