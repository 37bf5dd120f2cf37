//! Lookup Service - Main application use case
//!
//! Resolves pinyin keys to replacement text through a remote backend.
//! Lives on the caller thread: it answers synchronously whenever it can
//! (cache hit, rejected input, backoff, pool exhaustion) and otherwise
//! defers to the fetch engine, delivering the result later from `drain`.

use crate::domain::ports::BackendStrategy;
use crate::domain::value_objects::BackendKind;
use crate::infrastructure::backoff::{BackoffConfig, BackoffState, ErrorBackoff};
use crate::infrastructure::fetch_engine::{EngineConfig, EngineError, FetchEngine};
use crate::infrastructure::result_cache::ResultCache;
use crate::infrastructure::slot_pool::{RequestSlot, SlotPool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Tunables for the lookup service.
#[derive(Debug, Clone)]
pub struct LookupOptions {
    /// Keys shorter than this (in characters) never hit the network
    pub min_key_length: usize,
    /// Maximum cached results
    pub cache_capacity: usize,
    /// Maximum concurrent remote lookups
    pub max_requests: usize,
    /// Response buffer reserved per slot
    pub max_response_bytes: usize,
    /// Failure threshold and backoff duration
    pub backoff: BackoffConfig,
    /// Initially active backend
    pub backend: Option<BackendKind>,
    /// Whether the feature starts enabled
    pub enabled: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            min_key_length: 4,
            cache_capacity: 2048,
            max_requests: 100,
            max_response_bytes: 2048,
            backoff: BackoffConfig::default(),
            backend: Some(BackendKind::Google),
            enabled: true,
        }
    }
}

/// Counters describing what the service has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupStats {
    /// Calls to `request`
    pub requests: u64,
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Requests answered empty without network I/O
    pub short_circuited: u64,
    /// Requests handed to the fetch engine
    pub network_lookups: u64,
    /// Transfers that failed at the transport level
    pub transport_failures: u64,
    /// Successful transfers with nothing extractable
    pub parse_misses: u64,
    /// Slots currently in flight
    pub in_flight: usize,
    /// Maximum concurrent lookups
    pub slot_capacity: usize,
    /// Entries currently cached
    pub cached_entries: usize,
}

/// Lookup orchestrator.
///
/// Owns the cache, the slot pool and the fetch engine. Every callback runs
/// on the thread that calls `request` or `drain`.
pub struct LookupService {
    options: LookupOptions,
    cache: ResultCache,
    pool: SlotPool,
    engine: FetchEngine,
    backoff: ErrorBackoff,
    strategies: HashMap<BackendKind, Arc<dyn BackendStrategy>>,
    active: Option<BackendKind>,
    enabled: bool,
    stats: LookupStats,
}

impl LookupService {
    /// Create a service around an already running engine.
    pub fn new(options: LookupOptions, engine: FetchEngine) -> Self {
        Self {
            cache: ResultCache::new(options.cache_capacity),
            pool: SlotPool::new(options.max_requests, options.max_response_bytes),
            backoff: ErrorBackoff::new(options.backoff.clone()),
            active: options.backend,
            enabled: options.enabled,
            strategies: HashMap::new(),
            stats: LookupStats::default(),
            engine,
            options,
        }
    }

    /// Start a fetch engine and build the service on top of it.
    ///
    /// Fails if the engine's worker cannot be started.
    pub fn start(options: LookupOptions, engine_config: EngineConfig) -> Result<Self, EngineError> {
        let engine = FetchEngine::new(EngineConfig {
            max_response_bytes: options.max_response_bytes,
            ..engine_config
        })?;
        Ok(Self::new(options, engine))
    }

    /// Register the strategy used when `strategy.kind()` is active.
    pub fn with_backend(mut self, strategy: Arc<dyn BackendStrategy>) -> Self {
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    /// Look up `key`, answering through `callback(key, result)`.
    ///
    /// The callback runs synchronously for short keys, cache hits, a
    /// disabled feature, an engaged backoff or an exhausted pool; otherwise
    /// it runs from a later [`drain`](Self::drain). An empty result means
    /// "no candidate".
    pub fn request<F>(&mut self, key: &str, callback: F)
    where
        F: FnOnce(&str, &str) + Send + 'static,
    {
        self.stats.requests += 1;

        if !self.enabled || key.chars().count() < self.options.min_key_length {
            self.stats.short_circuited += 1;
            callback(key, "");
            return;
        }

        if let Some(cached) = self.cache.find(key) {
            self.stats.cache_hits += 1;
            tracing::debug!("cache hit for '{}'", key);
            callback(key, cached);
            return;
        }

        let Some(strategy) = self.active_strategy() else {
            self.stats.short_circuited += 1;
            callback(key, "");
            return;
        };

        if !self.backoff.allow_request() || !self.engine.is_running() {
            self.stats.short_circuited += 1;
            callback(key, "");
            return;
        }

        let slot = match self.pool.acquire() {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!("dropping lookup for '{}': {}", key, e);
                self.stats.short_circuited += 1;
                callback(key, "");
                return;
            }
        };

        let request = strategy.prepare_request(key);
        let kind = strategy.kind();
        let submitted = self.engine.submit(slot, |slot| {
            slot.set_key(key);
            slot.set_backend(kind);
            slot.set_request(request);
            slot.set_callback(Box::new(callback));
        });

        match submitted {
            Ok(()) => self.stats.network_lookups += 1,
            Err(mut slot) => {
                // Engine already stopped; the slot never left this thread.
                self.stats.short_circuited += 1;
                let callback = slot.take_callback();
                self.release(slot);
                if let Some(callback) = callback {
                    callback(key, "");
                }
            }
        }
    }

    /// Deliver every finished lookup to its callback.
    ///
    /// Returns the number of completions processed.
    pub fn drain(&mut self) -> usize {
        let mut completed = 0;
        while let Some(slot) = self.engine.poll_finished() {
            self.complete(slot);
            completed += 1;
        }
        completed
    }

    /// Wait until the fetch engine reports finished lookups.
    pub async fn wait_finished(&self) {
        self.engine.wait_finished().await;
    }

    /// Worker→caller signal for integrating with an external event loop.
    pub fn finished_signal(&self) -> Arc<Notify> {
        self.engine.finished_signal()
    }

    /// Zero the failure count and lift backoff immediately.
    pub fn reset_error(&mut self) {
        self.backoff.reset();
    }

    /// Flip the feature on or off, returning the new state.
    pub fn toggle(&mut self) -> bool {
        self.set_enabled(!self.enabled);
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            tracing::info!("cloud pinyin {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Switch providers. Cached results belong to the old provider and
    /// are discarded.
    pub fn set_backend(&mut self, backend: Option<BackendKind>) {
        if self.active == backend {
            return;
        }
        tracing::info!(
            "switching lookup backend to {}",
            backend.map(|b| b.as_str()).unwrap_or("none")
        );
        self.active = backend;
        self.cache.clear();
    }

    pub fn active_backend(&self) -> Option<BackendKind> {
        self.active
    }

    pub fn backoff_state(&self) -> BackoffState {
        self.backoff.state()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.backoff.consecutive_errors()
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_use()
    }

    pub fn stats(&self) -> LookupStats {
        let pool = self.pool.stats();
        LookupStats {
            in_flight: pool.in_use,
            slot_capacity: pool.capacity,
            cached_entries: self.cache.len(),
            ..self.stats.clone()
        }
    }

    /// Stop the fetch engine and return every outstanding slot to the pool.
    ///
    /// Callbacks of lookups that never completed are dropped without being
    /// called. Returns the number of reclaimed slots.
    pub fn shutdown(&mut self) -> usize {
        let outstanding = self.engine.shutdown();
        let count = outstanding.len();
        for slot in outstanding {
            self.release(slot);
        }
        if count > 0 {
            tracing::info!("discarded {} unfinished lookups", count);
        }
        count
    }

    fn active_strategy(&self) -> Option<Arc<dyn BackendStrategy>> {
        let kind = self.active?;
        let strategy = self.strategies.get(&kind).cloned();
        if strategy.is_none() {
            tracing::warn!("no strategy registered for backend {}", kind);
        }
        strategy
    }

    fn complete(&mut self, mut slot: RequestSlot) {
        let status = slot.status();
        let mut result = String::new();

        if status.is_transport_failure() {
            self.stats.transport_failures += 1;
            tracing::debug!("lookup for '{}' failed: {}", slot.key(), status);
            self.backoff.record_failure();
        } else if status.is_success() {
            self.backoff.record_success();
            if let Some(strategy) = slot.backend().and_then(|kind| self.strategies.get(&kind)) {
                result = strategy.parse_response(slot.response());
            }
            if result.is_empty() {
                self.stats.parse_misses += 1;
                tracing::debug!("no result in response for '{}'", slot.key());
            } else if slot.backend() == self.active {
                self.cache.insert(slot.key(), &result);
            }
        }

        if let Some(callback) = slot.take_callback() {
            callback(slot.key(), &result);
        }
        self.release(slot);
    }

    fn release(&mut self, slot: RequestSlot) {
        if let Err(e) = self.pool.release(slot) {
            tracing::error!("failed to release request slot: {}", e);
        }
    }
}

impl Drop for LookupService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::TransportRequest;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tracing_test::traced_test;

    // ===== Mock Implementations =====

    struct MockStrategy {
        kind: BackendKind,
    }

    impl BackendStrategy for MockStrategy {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn prepare_request(&self, key: &str) -> TransportRequest {
            // Port 9 (discard) on localhost refuses connections quickly.
            TransportRequest::get(format!("http://127.0.0.1:9/?q={}", key))
        }

        fn parse_response(&self, body: &[u8]) -> String {
            String::from_utf8_lossy(body).into_owned()
        }
    }

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    fn recorder() -> (Calls, impl Fn() -> Box<dyn FnOnce(&str, &str) + Send>) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let make = move || {
            let sink = sink.clone();
            Box::new(move |key: &str, result: &str| {
                sink.lock().push((key.to_string(), result.to_string()));
            }) as Box<dyn FnOnce(&str, &str) + Send>
        };
        (calls, make)
    }

    fn service(options: LookupOptions) -> LookupService {
        LookupService::start(options, EngineConfig::default())
            .unwrap()
            .with_backend(Arc::new(MockStrategy {
                kind: BackendKind::Google,
            }))
    }

    // ===== Synchronous Answers =====

    #[test]
    fn test_short_key_answers_empty_synchronously() {
        let mut svc = service(LookupOptions::default());
        let (calls, cb) = recorder();

        svc.request("nih", cb());

        assert_eq!(*calls.lock(), vec![("nih".to_string(), String::new())]);
        assert_eq!(svc.in_flight(), 0);
        assert_eq!(svc.stats().network_lookups, 0);
    }

    #[test]
    fn test_key_length_counts_characters() {
        let mut svc = service(LookupOptions {
            min_key_length: 3,
            ..Default::default()
        });
        let (calls, cb) = recorder();

        // two characters, six bytes
        svc.request("你好", cb());
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(svc.stats().short_circuited, 1);
    }

    #[test]
    fn test_cache_hit_answers_synchronously() {
        let mut svc = service(LookupOptions::default());
        svc.cache.insert("nihao", "你好");
        let (calls, cb) = recorder();

        svc.request("nihao", cb());

        assert_eq!(*calls.lock(), vec![("nihao".to_string(), "你好".to_string())]);
        assert_eq!(svc.in_flight(), 0);
        assert_eq!(svc.stats().cache_hits, 1);
    }

    #[test]
    fn test_disabled_answers_empty() {
        let mut svc = service(LookupOptions::default());
        svc.cache.insert("nihao", "你好");
        assert!(!svc.toggle());
        let (calls, cb) = recorder();

        svc.request("nihao", cb());

        assert_eq!(calls.lock()[0].1, "");
        assert!(svc.toggle());
        assert!(svc.is_enabled());
    }

    #[test]
    fn test_no_backend_answers_empty() {
        let mut svc = service(LookupOptions {
            backend: None,
            ..Default::default()
        });
        let (calls, cb) = recorder();

        svc.request("nihao", cb());

        assert_eq!(calls.lock()[0].1, "");
        assert_eq!(svc.in_flight(), 0);
    }

    #[test]
    fn test_unregistered_backend_answers_empty() {
        let mut svc = service(LookupOptions {
            backend: Some(BackendKind::Baidu),
            ..Default::default()
        });
        let (calls, cb) = recorder();

        svc.request("nihao", cb());

        assert_eq!(calls.lock()[0].1, "");
        assert_eq!(svc.in_flight(), 0);
    }

    #[test]
    fn test_backoff_short_circuits_until_reset() {
        let mut svc = service(LookupOptions {
            backoff: BackoffConfig {
                error_threshold: 1,
                backoff_duration: Duration::from_secs(300),
            },
            ..Default::default()
        });
        svc.backoff.record_failure();
        let (calls, cb) = recorder();

        svc.request("nihao", cb());
        assert_eq!(calls.lock()[0].1, "");
        assert_eq!(svc.in_flight(), 0);

        svc.reset_error();
        assert_eq!(svc.backoff_state(), BackoffState::Healthy);
        svc.request("nihao", cb());
        assert_eq!(svc.in_flight(), 1);
    }

    #[test]
    fn test_pool_exhaustion_answers_empty() {
        let mut svc = service(LookupOptions {
            max_requests: 1,
            ..Default::default()
        });
        let (calls, cb) = recorder();

        svc.request("nihao", cb());
        svc.request("zaijian", cb());

        assert_eq!(svc.in_flight(), 1);
        assert_eq!(*calls.lock(), vec![("zaijian".to_string(), String::new())]);

        let stats = svc.stats();
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.slot_capacity, 1);
    }

    #[test]
    fn test_set_backend_clears_cache() {
        let mut svc = service(LookupOptions::default());
        svc.cache.insert("nihao", "你好");

        svc.set_backend(Some(BackendKind::Google));
        assert_eq!(svc.stats().cached_entries, 1);

        svc.set_backend(Some(BackendKind::Baidu));
        assert_eq!(svc.active_backend(), Some(BackendKind::Baidu));
        assert_eq!(svc.stats().cached_entries, 0);
    }

    // ===== Completion Path =====

    #[tokio::test]
    #[traced_test]
    async fn test_connection_failure_counts_toward_backoff() {
        let mut svc = service(LookupOptions {
            backoff: BackoffConfig {
                error_threshold: 1,
                backoff_duration: Duration::from_secs(300),
            },
            ..Default::default()
        });
        let (calls, cb) = recorder();

        svc.request("nihao", cb());
        tokio::time::timeout(Duration::from_secs(5), svc.wait_finished())
            .await
            .unwrap();
        assert_eq!(svc.drain(), 1);

        assert_eq!(*calls.lock(), vec![("nihao".to_string(), String::new())]);
        assert_eq!(svc.consecutive_errors(), 1);
        assert!(matches!(svc.backoff_state(), BackoffState::Backoff { .. }));
        assert_eq!(svc.in_flight(), 0);
        assert!(logs_contain("lookup backoff engaged"));
    }

    #[test]
    fn test_shutdown_drops_pending_callbacks() {
        let mut svc = service(LookupOptions::default());
        let (calls, cb) = recorder();

        svc.request("nihao", cb());
        svc.shutdown();

        assert_eq!(svc.in_flight(), 0);
        // the callback is either already queued as finished or discarded,
        // but never invoked by shutdown itself
        assert!(calls.lock().is_empty());

        // the stopped engine turns new lookups away
        svc.request("zaijian", cb());
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(svc.in_flight(), 0);
    }

    #[test]
    fn test_default_options() {
        let options = LookupOptions::default();
        assert_eq!(options.min_key_length, 4);
        assert_eq!(options.cache_capacity, 2048);
        assert_eq!(options.max_requests, 100);
        assert_eq!(options.backend, Some(BackendKind::Google));
        assert!(options.enabled);
    }
}
