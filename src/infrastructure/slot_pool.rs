//! Request Slot Pool
//!
//! Fixed set of reusable request slots. The pool is the only admission
//! control for remote lookups: when every slot is busy, new lookups are
//! refused immediately instead of queued.

use crate::domain::entities::{TransferStatus, TransportRequest};
use crate::domain::value_objects::BackendKind;
use std::fmt;

/// Completion callback invoked with `(key, result)` on the caller thread.
pub type LookupCallback = Box<dyn FnOnce(&str, &str) + Send + 'static>;

/// Where a slot currently sits in the request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPhase {
    /// Free, owned by the pool
    #[default]
    Idle,
    /// Handed out by the pool, being filled in
    Busy,
    /// Queued for the fetch worker
    Pending,
    /// Transfer in progress on the fetch worker
    Working,
    /// Transfer done, waiting to be drained on the caller thread
    Finishing,
}

/// Per-request state for one in-flight lookup.
///
/// A slot is moved between the pool, the fetch engine queues and the
/// lookup service; whoever holds the value owns it.
pub struct RequestSlot {
    index: usize,
    phase: SlotPhase,
    key: String,
    backend: Option<BackendKind>,
    request: Option<TransportRequest>,
    buffer: Vec<u8>,
    callback: Option<LookupCallback>,
    status: TransferStatus,
}

impl RequestSlot {
    fn new(index: usize, buffer_capacity: usize) -> Self {
        Self {
            index,
            phase: SlotPhase::Idle,
            key: String::new(),
            backend: None,
            request: None,
            buffer: Vec::with_capacity(buffer_capacity),
            callback: None,
            status: TransferStatus::NotStarted,
        }
    }

    /// Position of this slot in its pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: SlotPhase) {
        self.phase = phase;
    }

    /// Lookup key this slot was acquired for.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_key(&mut self, key: &str) {
        self.key.clear();
        self.key.push_str(key);
    }

    /// Backend that built the request, if any.
    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    pub fn set_backend(&mut self, backend: BackendKind) {
        self.backend = Some(backend);
    }

    pub fn request(&self) -> Option<&TransportRequest> {
        self.request.as_ref()
    }

    pub fn set_request(&mut self, request: TransportRequest) {
        self.request = Some(request);
    }

    /// Response bytes accumulated by the fetch engine.
    pub fn response(&self) -> &[u8] {
        &self.buffer
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: TransferStatus) {
        self.status = status;
    }

    pub fn set_callback(&mut self, callback: LookupCallback) {
        self.callback = Some(callback);
    }

    /// Take the completion callback out of the slot.
    pub fn take_callback(&mut self) -> Option<LookupCallback> {
        self.callback.take()
    }

    /// Lend the (cleared) response buffer to a transfer.
    pub(crate) fn take_buffer(&mut self) -> Vec<u8> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        buffer
    }

    pub(crate) fn restore_buffer(&mut self, buffer: Vec<u8>) {
        self.buffer = buffer;
    }

    /// Forget everything about the last request, keeping allocations.
    fn reset(&mut self) {
        self.phase = SlotPhase::Idle;
        self.key.clear();
        self.backend = None;
        self.request = None;
        self.buffer.clear();
        self.callback = None;
        self.status = TransferStatus::NotStarted;
    }
}

impl fmt::Debug for RequestSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSlot")
            .field("index", &self.index)
            .field("phase", &self.phase)
            .field("key", &self.key)
            .field("backend", &self.backend)
            .field("request", &self.request)
            .field("buffered", &self.buffer.len())
            .field("has_callback", &self.callback.is_some())
            .field("status", &self.status)
            .finish()
    }
}

/// Pool errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Every slot is busy
    #[error("request slot pool exhausted")]
    Exhausted,
    /// Slot index outside this pool
    #[error("slot {0} does not belong to this pool")]
    UnknownSlot(usize),
    /// Slot was already returned
    #[error("slot {0} released twice")]
    AlreadyReleased(usize),
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of slots
    pub capacity: usize,
    /// Slots currently checked out
    pub in_use: usize,
}

/// Fixed-capacity arena of request slots with a free-list.
///
/// `slots[i]` is `Some` exactly when slot `i` is idle, and `free` holds
/// the indices of those idle slots.
pub struct SlotPool {
    slots: Vec<Option<RequestSlot>>,
    free: Vec<usize>,
}

impl SlotPool {
    /// Create a pool of `capacity` slots, each pre-allocating
    /// `buffer_capacity` bytes of response buffer.
    pub fn new(capacity: usize, buffer_capacity: usize) -> Self {
        Self {
            slots: (0..capacity)
                .map(|i| Some(RequestSlot::new(i, buffer_capacity)))
                .collect(),
            free: (0..capacity).rev().collect(),
        }
    }

    /// Check out an idle slot.
    ///
    /// Never blocks: fails with [`PoolError::Exhausted`] when all slots are
    /// busy.
    pub fn acquire(&mut self) -> Result<RequestSlot, PoolError> {
        let index = self.free.pop().ok_or(PoolError::Exhausted)?;
        match self.slots[index].take() {
            Some(mut slot) => {
                slot.set_phase(SlotPhase::Busy);
                Ok(slot)
            }
            None => {
                tracing::error!("slot {} on free list but checked out", index);
                Err(PoolError::Exhausted)
            }
        }
    }

    /// Return a slot, clearing all per-request state.
    pub fn release(&mut self, mut slot: RequestSlot) -> Result<(), PoolError> {
        let index = slot.index;
        let entry = self
            .slots
            .get_mut(index)
            .ok_or(PoolError::UnknownSlot(index))?;
        if entry.is_some() {
            return Err(PoolError::AlreadyReleased(index));
        }

        slot.reset();
        *entry = Some(slot);
        self.free.push(index);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of idle slots.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of slots checked out.
    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            in_use: self.in_use(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_pool_new() {
        let pool = SlotPool::new(4, 16);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_acquire_marks_busy() {
        let mut pool = SlotPool::new(2, 16);
        let slot = pool.acquire().unwrap();
        assert_eq!(slot.phase(), SlotPhase::Busy);
        assert_eq!(slot.index(), 0);
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn test_acquire_distinct_indices() {
        let mut pool = SlotPool::new(3, 16);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        let mut indices = vec![a.index(), b.index(), c.index()];
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_pool_exhausted() {
        let mut pool = SlotPool::new(2, 16);
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();

        let result = pool.acquire();
        assert!(matches!(result, Err(PoolError::Exhausted)));
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_zero_capacity_pool() {
        let mut pool = SlotPool::new(0, 16);
        assert_eq!(pool.acquire().unwrap_err(), PoolError::Exhausted);
    }

    #[test]
    fn test_release_makes_slot_available() {
        let mut pool = SlotPool::new(1, 16);
        let slot = pool.acquire().unwrap();
        assert!(pool.acquire().is_err());

        pool.release(slot).unwrap();
        assert_eq!(pool.available(), 1);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_release_clears_state() {
        let mut pool = SlotPool::new(1, 16);
        let fired = Arc::new(AtomicBool::new(false));

        let mut slot = pool.acquire().unwrap();
        slot.set_key("nihao");
        slot.set_backend(BackendKind::Google);
        slot.set_request(TransportRequest::get("http://localhost/"));
        slot.restore_buffer(b"payload".to_vec());
        slot.set_status(TransferStatus::Http(200));
        let flag = fired.clone();
        slot.set_callback(Box::new(move |_, _| flag.store(true, Ordering::SeqCst)));

        pool.release(slot).unwrap();

        let slot = pool.acquire().unwrap();
        assert_eq!(slot.key(), "");
        assert_eq!(slot.backend(), None);
        assert!(slot.request().is_none());
        assert!(slot.response().is_empty());
        assert_eq!(slot.status(), TransferStatus::NotStarted);
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(Arc::strong_count(&fired), 1); // callback dropped
    }

    #[test]
    fn test_release_keeps_buffer_allocation() {
        let mut pool = SlotPool::new(1, 64);
        let mut slot = pool.acquire().unwrap();
        let mut buffer = slot.take_buffer();
        buffer.extend_from_slice(b"abc");
        slot.restore_buffer(buffer);
        pool.release(slot).unwrap();

        let slot = pool.acquire().unwrap();
        assert!(slot.buffer.capacity() >= 64);
    }

    #[test]
    fn test_release_twice_rejected() {
        let mut pool = SlotPool::new(2, 16);
        let slot = pool.acquire().unwrap();
        let index = slot.index();
        pool.release(slot).unwrap();

        let forged = RequestSlot::new(index, 0);
        assert_eq!(pool.release(forged), Err(PoolError::AlreadyReleased(index)));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_release_unknown_slot() {
        let mut pool = SlotPool::new(1, 16);
        let foreign = RequestSlot::new(7, 0);
        assert_eq!(pool.release(foreign), Err(PoolError::UnknownSlot(7)));
    }

    #[test]
    fn test_take_callback() {
        let mut pool = SlotPool::new(1, 16);
        let mut slot = pool.acquire().unwrap();
        assert!(slot.take_callback().is_none());

        slot.set_callback(Box::new(|_, _| {}));
        assert!(slot.take_callback().is_some());
        assert!(slot.take_callback().is_none());
    }

    #[test]
    fn test_stats() {
        let mut pool = SlotPool::new(5, 16);
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.stats(), PoolStats { capacity: 5, in_use: 2 });
    }

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::Exhausted.to_string(), "request slot pool exhausted");
        assert_eq!(
            PoolError::UnknownSlot(3).to_string(),
            "slot 3 does not belong to this pool"
        );
    }
}
