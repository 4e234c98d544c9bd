// crates/publisher-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Backends
// Description: Process-local status store, counters, lock, and broker.
// Purpose: Run the pipeline without external services.
// Dependencies: crate::{core, interfaces}, tokio
// ============================================================================

//! ## Overview
//! In-memory implementations of every storage and broker seam. Expiry is
//! tracked with `tokio::time::Instant` so paused-clock tests can advance TTLs.
//! The broker keeps one append-only log and an independent cursor per
//! consumer group, mirroring stream consumer-group semantics.
//! Invariants:
//! - Expired entries behave as absent.
//! - Each consumer group sees every published envelope exactly once unless
//!   the delivery is left unsettled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::core::Envelope;
use crate::core::JobStatus;
use crate::core::RequestId;
use crate::interfaces::BrokerError;
use crate::interfaces::BrokerProducer;
use crate::interfaces::BrokerSubscription;
use crate::interfaces::CounterStore;
use crate::interfaces::Delivery;
use crate::interfaces::LockBackend;
use crate::interfaces::LockError;
use crate::interfaces::StatusStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Value with an optional expiry deadline.
#[derive(Debug, Clone)]
struct Expiring<T> {
    /// Stored value.
    value: T,
    /// Deadline after which the value is absent.
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    /// Wraps a value expiring after `ttl`.
    fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    /// Returns true once the deadline has passed.
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Returns a live entry, dropping it first when expired.
fn live<'a, T>(map: &'a mut HashMap<String, Expiring<T>>, key: &str) -> Option<&'a mut Expiring<T>> {
    if map.get(key).is_some_and(Expiring::is_expired) {
        map.remove(key);
    }
    map.get_mut(key)
}

/// Locks a mutex, mapping poisoning through `err`.
fn guard<'a, T, E>(mutex: &'a Mutex<T>, err: impl FnOnce(String) -> E) -> Result<MutexGuard<'a, T>, E> {
    mutex.lock().map_err(|_| err("in-memory backend lock poisoned".to_string()))
}

// ============================================================================
// SECTION: Status Store
// ============================================================================

/// In-memory [`StatusStore`].
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    /// Status entries keyed by request id.
    statuses: Mutex<HashMap<String, Expiring<JobStatus>>>,
    /// Result payloads keyed by `<id>-result`.
    results: Mutex<HashMap<String, Expiring<String>>>,
}

impl InMemoryStatusStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn set_if_absent(
        &self,
        id: &RequestId,
        status: JobStatus,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut statuses = guard(&self.statuses, StoreError::Backend)?;
        if live(&mut statuses, id.as_str()).is_some() {
            return Ok(false);
        }
        statuses.insert(id.to_string(), Expiring::new(status, Some(ttl)));
        Ok(true)
    }

    async fn set_if_present(&self, id: &RequestId, status: JobStatus) -> Result<bool, StoreError> {
        let mut statuses = guard(&self.statuses, StoreError::Backend)?;
        match live(&mut statuses, id.as_str()) {
            Some(entry) => {
                entry.value = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: &RequestId) -> Result<Option<JobStatus>, StoreError> {
        let mut statuses = guard(&self.statuses, StoreError::Backend)?;
        Ok(live(&mut statuses, id.as_str()).map(|entry| entry.value))
    }

    async fn put_result(
        &self,
        id: &RequestId,
        payload: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        guard(&self.results, StoreError::Backend)?
            .insert(id.result_key(), Expiring::new(payload.to_string(), Some(ttl)));
        Ok(())
    }

    async fn get_result(&self, id: &RequestId) -> Result<Option<String>, StoreError> {
        let mut results = guard(&self.results, StoreError::Backend)?;
        Ok(live(&mut results, &id.result_key()).map(|entry| entry.value.clone()))
    }
}

// ============================================================================
// SECTION: Counter Store
// ============================================================================

/// In-memory [`CounterStore`].
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    /// Counters keyed by full key.
    counters: Mutex<HashMap<String, Expiring<u64>>>,
}

impl InMemoryCounterStore {
    /// Creates an empty counter store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut counters = guard(&self.counters, StoreError::Backend)?;
        if let Some(entry) = live(&mut counters, key) {
            entry.value += 1;
            return Ok(entry.value);
        }
        counters.insert(key.to_string(), Expiring::new(1, None));
        Ok(1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut counters = guard(&self.counters, StoreError::Backend)?;
        if let Some(entry) = live(&mut counters, key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut counters = guard(&self.counters, StoreError::Backend)?;
        let mut removed = 0_u64;
        counters.retain(|key, entry| {
            if !key.starts_with(prefix) {
                return true;
            }
            if !entry.is_expired() {
                removed += 1;
            }
            false
        });
        Ok(removed)
    }
}

// ============================================================================
// SECTION: Lock
// ============================================================================

/// In-memory [`LockBackend`].
#[derive(Debug, Default)]
pub struct InMemoryLock {
    /// Lease holders keyed by lock name.
    leases: Mutex<HashMap<String, Expiring<String>>>,
}

impl InMemoryLock {
    /// Creates an unlocked backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockBackend for InMemoryLock {
    async fn try_acquire(&self, name: &str, token: &str, lease: Duration) -> Result<bool, LockError> {
        let mut leases = guard(&self.leases, LockError::Backend)?;
        if live(&mut leases, name).is_some() {
            return Ok(false);
        }
        leases.insert(name.to_string(), Expiring::new(token.to_string(), Some(lease)));
        Ok(true)
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool, LockError> {
        let mut leases = guard(&self.leases, LockError::Backend)?;
        match live(&mut leases, name) {
            Some(entry) if entry.value == token => {
                leases.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// SECTION: Broker
// ============================================================================

/// Per-group delivery state.
#[derive(Debug, Default)]
struct GroupState {
    /// Next log index to deliver.
    cursor: usize,
    /// Receipts delivered but not yet settled.
    pending: VecDeque<usize>,
}

/// Shared broker state.
#[derive(Debug, Default)]
struct BrokerState {
    /// Append-only envelope log.
    log: Vec<Envelope>,
    /// Consumer groups by name.
    groups: BTreeMap<String, GroupState>,
    /// Ids acknowledged by any group.
    acked: Vec<RequestId>,
    /// Ids rejected by any group.
    nacked: Vec<RequestId>,
    /// Simulated outage flag.
    unavailable: bool,
    /// Set once the broker stops delivering.
    closed: bool,
}

/// In-memory broker with consumer-group fan-out.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    /// Shared state.
    state: Arc<Mutex<BrokerState>>,
    /// Wakes blocked receivers on publish or close.
    notify: Arc<Notify>,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a subscription for `group`, starting at the beginning of the log.
    #[must_use]
    pub fn subscribe(&self, group: impl Into<String>) -> InMemorySubscription {
        InMemorySubscription {
            broker: self.clone(),
            group: group.into(),
        }
    }

    /// Makes every publish fail while `unavailable` is true.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }

    /// Stops delivery once each group drains the log.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    /// Returns every published envelope in order.
    #[must_use]
    pub fn published(&self) -> Vec<Envelope> {
        self.state.lock().map(|state| state.log.clone()).unwrap_or_default()
    }

    /// Returns ids acknowledged so far.
    #[must_use]
    pub fn acked(&self) -> Vec<RequestId> {
        self.state.lock().map(|state| state.acked.clone()).unwrap_or_default()
    }

    /// Returns ids rejected so far.
    #[must_use]
    pub fn nacked(&self) -> Vec<RequestId> {
        self.state.lock().map(|state| state.nacked.clone()).unwrap_or_default()
    }

    /// Locks the shared state.
    fn lock_state(&self) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        guard(&self.state, BrokerError::Backend)
    }
}

#[async_trait]
impl BrokerProducer for InMemoryBroker {
    async fn publish_batch(&self, envelopes: &[Envelope]) -> Result<(), BrokerError> {
        {
            let mut state = self.lock_state()?;
            if state.unavailable {
                return Err(BrokerError::Backend("broker unavailable".to_string()));
            }
            state.log.extend(envelopes.iter().cloned());
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Consumer-group subscription on an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemorySubscription {
    /// Owning broker.
    broker: InMemoryBroker,
    /// Consumer group name.
    group: String,
}

impl InMemorySubscription {
    /// Takes the next undelivered envelope for this group.
    fn try_next(&self) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.broker.lock_state()?;
        let state = &mut *state;
        let group = state.groups.entry(self.group.clone()).or_default();
        let Some(envelope) = state.log.get(group.cursor) else {
            return if state.closed { Err(BrokerError::Closed) } else { Ok(None) };
        };
        let index = group.cursor;
        group.cursor += 1;
        group.pending.push_back(index);
        Ok(Some(Delivery {
            receipt: index.to_string(),
            envelope: envelope.clone(),
        }))
    }

    /// Removes a delivery from the pending list.
    fn settle(&self, delivery: &Delivery, accepted: bool) -> Result<(), BrokerError> {
        let index: usize = delivery
            .receipt
            .parse()
            .map_err(|_| BrokerError::Codec(format!("invalid receipt {}", delivery.receipt)))?;
        let mut state = self.broker.lock_state()?;
        if let Some(group) = state.groups.get_mut(&self.group) {
            group.pending.retain(|pending| *pending != index);
        }
        let id = delivery.envelope.id.clone();
        if accepted {
            state.acked.push(id);
        } else {
            state.nacked.push(id);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerSubscription for InMemorySubscription {
    async fn receive(&mut self) -> Result<Delivery, BrokerError> {
        loop {
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(delivery) = self.try_next()? {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.settle(delivery, true)
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.settle(delivery, false)
    }
}
