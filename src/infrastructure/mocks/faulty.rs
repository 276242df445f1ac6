//! Store double that never succeeds.

use crate::application::ports::{
    BlockEntry, BlockStore, CounterSnapshot, CounterStore, EventLog, StoreError,
};
use crate::domain::event::{SecurityEvent, Severity};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    /// Every call returns `StoreError::Unavailable`
    Fail,
    /// Every call sleeps far beyond any sane timeout
    Hang,
}

/// Implements every store port and fails each call, either immediately or
/// by hanging until the caller's deadline fires.
///
/// Clones share the call counter.
#[derive(Debug, Clone)]
pub struct FaultyStore {
    fault: Fault,
    calls: Arc<AtomicUsize>,
}

impl FaultyStore {
    /// A store whose calls return `StoreError::Unavailable`.
    pub fn failing() -> Self {
        Self {
            fault: Fault::Fail,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A store whose calls never complete in time.
    pub fn hanging() -> Self {
        Self {
            fault: Fault::Hang,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of calls started against this store.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn fault<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::Hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl CounterStore for FaultyStore {
    async fn increment(&self, _key: &str, _window: Duration) -> Result<CounterSnapshot, StoreError> {
        self.fault().await
    }

    async fn reset(&self, _key: &str) -> Result<(), StoreError> {
        self.fault().await
    }
}

#[async_trait]
impl BlockStore for FaultyStore {
    async fn set_block(
        &self,
        _actor_key: &str,
        _duration: Duration,
        _reason: &str,
        _severity: Severity,
    ) -> Result<BlockEntry, StoreError> {
        self.fault().await
    }

    async fn is_blocked(&self, _actor_key: &str) -> Result<bool, StoreError> {
        self.fault().await
    }

    async fn get_block(&self, _actor_key: &str) -> Result<Option<BlockEntry>, StoreError> {
        self.fault().await
    }

    async fn unblock(&self, _actor_key: &str) -> Result<bool, StoreError> {
        self.fault().await
    }
}

#[async_trait]
impl EventLog for FaultyStore {
    async fn append(&self, _event: SecurityEvent) -> Result<(), StoreError> {
        self.fault().await
    }

    async fn recent(
        &self,
        _actor_key: &str,
        _since_ms: u64,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        self.fault().await
    }
}
