//! Fetch Engine
//!
//! Runs every remote lookup on a dedicated worker thread so the caller
//! thread never blocks on the network.
//!
//! # Data Flow
//! ```text
//! caller thread                         worker thread
//! ─────────────                         ─────────────
//! submit(slot) ──▶ pending queue ──┐
//!              ──▶ doorbell (Work) ─┴──▶ start transfers (working set)
//!                                         │  reqwest GET, capped body
//!                                         ▼
//! poll_finished() ◀── finishing queue ◀── transfer done
//! wait_finished() ◀── finished signal ◀──┘
//! ```
//!
//! # Design Decisions
//! - The worker owns a current-thread tokio runtime; all sockets and timers
//!   live there.
//! - Slots are moved through the queues, never shared, so each one has
//!   exactly one owner at a time.
//! - Transfer errors are recorded on the slot as a [`TransferStatus`];
//!   nothing is raised across the thread boundary.
//! - The caller never runs worker code and the worker never runs caller
//!   callbacks.

use crate::domain::entities::{TransferStatus, TransportRequest};
use crate::infrastructure::slot_pool::{RequestSlot, SlotPhase};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::{Id, JoinError, JoinSet};

const WORKER_THREAD_NAME: &str = "cloudpinyin-fetch";

/// Fetch engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for each individual transfer (connect + body)
    pub request_timeout: Duration,
    /// Largest accepted response body; bigger bodies fail with `Overflow`
    pub max_response_bytes: usize,
    /// Optional HTTP(S) proxy for all transfers
    pub proxy: Option<String>,
    /// Capacity of the caller→worker doorbell
    pub doorbell_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_response_bytes: 2048,
            proxy: None,
            doorbell_capacity: 128,
        }
    }
}

/// Fatal errors while starting the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid proxy `{url}`: {source}")]
    Proxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("failed to build worker runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to spawn fetch worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("fetch worker exited during startup")]
    WorkerExited,
}

/// Caller→worker notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Doorbell {
    /// New slots are waiting in the pending queue
    Work,
    /// Stop the worker loop
    Quit,
}

/// State handed between the two threads.
#[derive(Default)]
struct Shared {
    pending: Mutex<VecDeque<RequestSlot>>,
    finishing: Mutex<VecDeque<RequestSlot>>,
    finished: Arc<Notify>,
}

/// Asynchronous HTTP fetcher with a private worker thread.
pub struct FetchEngine {
    shared: Arc<Shared>,
    doorbell: Option<mpsc::Sender<Doorbell>>,
    worker: Option<thread::JoinHandle<Vec<RequestSlot>>>,
}

impl FetchEngine {
    /// Build the HTTP client and start the worker thread.
    ///
    /// Returns only once the worker's event loop is up, so every startup
    /// failure is reported here.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("cloud-pinyin/", env!("CARGO_PKG_VERSION")));
        if let Some(url) = &config.proxy {
            let proxy = reqwest::Proxy::all(url.as_str()).map_err(|source| EngineError::Proxy {
                url: url.clone(),
                source,
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build()?;

        let shared = Arc::new(Shared::default());
        let (doorbell_tx, doorbell_rx) = mpsc::channel(config.doorbell_capacity.max(1));
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<(), std::io::Error>>(1);

        let worker = Worker {
            shared: shared.clone(),
            client,
            max_response_bytes: config.max_response_bytes,
            doorbell: doorbell_rx,
            working: HashMap::new(),
            transfers: JoinSet::new(),
            task_slots: HashMap::new(),
        };

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => {
                        let _ = ready_tx.send(Ok(()));
                        runtime
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Vec::new();
                    }
                };
                runtime.block_on(worker.run())
            })
            .map_err(EngineError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(EngineError::Runtime(e));
            }
            Err(_) => {
                let _ = handle.join();
                return Err(EngineError::WorkerExited);
            }
        }

        tracing::debug!(
            "fetch engine started (timeout={:?}, max_response_bytes={})",
            config.request_timeout,
            config.max_response_bytes
        );

        Ok(Self {
            shared,
            doorbell: Some(doorbell_tx),
            worker: Some(handle),
        })
    }

    /// Queue a slot for transfer and wake the worker.
    ///
    /// `setup` runs on the caller thread before the hand-off; use it to fill
    /// in the transport parameters. Returns immediately. If the engine has
    /// been shut down the slot is handed back untouched by the worker.
    pub fn submit<F>(&self, mut slot: RequestSlot, setup: F) -> Result<(), RequestSlot>
    where
        F: FnOnce(&mut RequestSlot),
    {
        let Some(doorbell) = &self.doorbell else {
            return Err(slot);
        };

        setup(&mut slot);
        slot.set_phase(SlotPhase::Pending);
        tracing::debug!("submitting slot {} for '{}'", slot.index(), slot.key());
        self.shared.pending.lock().push_back(slot);

        match doorbell.try_send(Doorbell::Work) {
            // A full doorbell already guarantees a wake-up.
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("fetch worker is gone, rejecting submission");
                match self.shared.pending.lock().pop_back() {
                    Some(slot) => Err(slot),
                    None => Ok(()),
                }
            }
        }
    }

    /// Take one finished slot, if any.
    ///
    /// Call repeatedly until it returns `None` to drain all completions.
    pub fn poll_finished(&self) -> Option<RequestSlot> {
        self.shared.finishing.lock().pop_front()
    }

    /// Level-triggered worker→caller signal.
    ///
    /// A permit is stored when nobody is waiting, so a completion that
    /// lands between a drain and the next wait is never missed.
    pub fn finished_signal(&self) -> Arc<Notify> {
        self.shared.finished.clone()
    }

    /// Wait until the worker reports at least one finished transfer.
    pub async fn wait_finished(&self) {
        self.shared.finished.notified().await;
    }

    /// Number of slots queued but not yet picked up by the worker.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.doorbell.is_some()
    }

    /// Stop the worker and reclaim every outstanding slot.
    ///
    /// Slots are returned in the order working, pending, finishing.
    /// Transfers that never completed are marked `Cancelled`. Idempotent.
    pub fn shutdown(&mut self) -> Vec<RequestSlot> {
        let mut outstanding = Vec::new();

        if let Some(doorbell) = self.doorbell.take() {
            // Dropping the sender also ends the loop if Quit cannot be queued.
            let _ = doorbell.try_send(Doorbell::Quit);
        }

        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(working) => outstanding.extend(working),
                Err(_) => tracing::error!("fetch worker panicked"),
            }
        }

        for mut slot in self.shared.pending.lock().drain(..) {
            slot.set_status(TransferStatus::Cancelled);
            outstanding.push(slot);
        }
        outstanding.extend(self.shared.finishing.lock().drain(..));

        if !outstanding.is_empty() {
            tracing::debug!("fetch engine reclaimed {} outstanding slots", outstanding.len());
        }
        outstanding
    }
}

impl Drop for FetchEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Result of one transfer, joined back onto its slot by index.
struct TransferOutcome {
    index: usize,
    status: TransferStatus,
    buffer: Vec<u8>,
}

/// Worker-thread side of the engine.
struct Worker {
    shared: Arc<Shared>,
    client: reqwest::Client,
    max_response_bytes: usize,
    doorbell: mpsc::Receiver<Doorbell>,
    working: HashMap<usize, RequestSlot>,
    transfers: JoinSet<TransferOutcome>,
    /// Slot index of every running transfer task
    task_slots: HashMap<Id, usize>,
}

impl Worker {
    async fn run(mut self) -> Vec<RequestSlot> {
        tracing::debug!("fetch worker loop running");

        loop {
            tokio::select! {
                bell = self.doorbell.recv() => match bell {
                    Some(Doorbell::Work) => self.start_pending(),
                    Some(Doorbell::Quit) | None => break,
                },
                Some(joined) = self.transfers.join_next_with_id(), if !self.transfers.is_empty() => {
                    self.complete(joined);
                }
            }
        }

        self.transfers.abort_all();
        self.task_slots.clear();
        let mut cancelled: Vec<RequestSlot> = self.working.drain().map(|(_, slot)| slot).collect();
        cancelled.sort_by_key(|slot| slot.index());
        for slot in &mut cancelled {
            slot.set_status(TransferStatus::Cancelled);
        }

        tracing::debug!(
            "fetch worker loop stopped with {} transfers in flight",
            cancelled.len()
        );
        cancelled
    }

    /// Move every pending slot into the working set and start its transfer.
    fn start_pending(&mut self) {
        let batch: Vec<RequestSlot> = self.shared.pending.lock().drain(..).collect();

        for mut slot in batch {
            let index = slot.index();
            let Some(request) = slot.request().cloned() else {
                tracing::warn!("slot {} submitted without a request", index);
                slot.set_status(TransferStatus::TransportError);
                self.finish(slot);
                continue;
            };

            slot.set_phase(SlotPhase::Working);
            let buffer = slot.take_buffer();
            self.working.insert(index, slot);

            let client = self.client.clone();
            let limit = self.max_response_bytes;
            self.spawn_transfer(index, async move {
                let (status, buffer) = perform_transfer(&client, &request, buffer, limit).await;
                TransferOutcome {
                    index,
                    status,
                    buffer,
                }
            });
        }
    }

    fn spawn_transfer<F>(&mut self, index: usize, transfer: F)
    where
        F: Future<Output = TransferOutcome> + Send + 'static,
    {
        let handle = self.transfers.spawn(transfer);
        self.task_slots.insert(handle.id(), index);
    }

    fn complete(&mut self, joined: Result<(Id, TransferOutcome), JoinError>) {
        let outcome = match joined {
            Ok((id, outcome)) => {
                self.task_slots.remove(&id);
                outcome
            }
            Err(e) => {
                tracing::error!("fetch transfer task failed: {}", e);
                let Some(index) = self.task_slots.remove(&e.id()) else {
                    return;
                };
                let Some(mut slot) = self.working.remove(&index) else {
                    tracing::error!("failed transfer for unknown slot {}", index);
                    return;
                };
                // The response buffer went down with the task.
                slot.set_status(TransferStatus::TransportError);
                self.finish(slot);
                return;
            }
        };

        let Some(mut slot) = self.working.remove(&outcome.index) else {
            tracing::error!("transfer finished for unknown slot {}", outcome.index);
            return;
        };
        slot.restore_buffer(outcome.buffer);
        slot.set_status(outcome.status);
        tracing::debug!(
            "slot {} for '{}' finished: {}",
            slot.index(),
            slot.key(),
            outcome.status
        );
        self.finish(slot);
    }

    fn finish(&self, mut slot: RequestSlot) {
        slot.set_phase(SlotPhase::Finishing);
        self.shared.finishing.lock().push_back(slot);
        self.shared.finished.notify_one();
    }
}

/// Run one GET, collecting at most `limit` body bytes into `buffer`.
async fn perform_transfer(
    client: &reqwest::Client,
    request: &TransportRequest,
    mut buffer: Vec<u8>,
    limit: usize,
) -> (TransferStatus, Vec<u8>) {
    let mut response = match client.get(&request.url).send().await {
        Ok(response) => response,
        Err(e) => return (classify_error(&e), buffer),
    };
    let code = response.status().as_u16();

    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if buffer.len() + chunk.len() > limit {
                    return (TransferStatus::Overflow, buffer);
                }
                buffer.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => return (classify_error(&e), buffer),
        }
    }

    (TransferStatus::Http(code), buffer)
}

fn classify_error(e: &reqwest::Error) -> TransferStatus {
    if e.is_timeout() {
        TransferStatus::Timeout
    } else if e.is_connect() {
        TransferStatus::ConnectFailed
    } else {
        TransferStatus::TransportError
    }
}
