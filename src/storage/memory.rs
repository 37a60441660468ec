use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crate::delivery::types::Recipient;
use crate::signals::types::ClassifiedSignal;
use crate::storage::persistence::{SignalStore, StoreError};

/// In-process store for dry runs and tests. Contents are lost on restart.
pub struct MemoryStore {
    signals: DashMap<i64, ClassifiedSignal>,
    recipients: DashMap<String, Recipient>,
    next_id: AtomicI64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            signals: DashMap::new(),
            recipients: DashMap::new(),
            next_id: AtomicI64::new(1),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of persisted signals
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn insert_signal(&self, signal: &ClassifiedSignal) -> Result<i64, StoreError> {
        self.check_writable()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = signal.clone();
        stored.id = Some(id);
        self.signals.insert(id, stored);
        Ok(id)
    }

    async fn recent_signals(&self, limit: usize) -> Result<Vec<ClassifiedSignal>, StoreError> {
        let mut all: Vec<ClassifiedSignal> =
            self.signals.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        all.truncate(limit);
        Ok(all)
    }

    async fn upsert_recipient(&self, recipient: &Recipient) -> Result<(), StoreError> {
        self.check_writable()?;
        self.recipients.insert(recipient.token.clone(), recipient.clone());
        Ok(())
    }

    async fn recipients(&self) -> Result<Vec<Recipient>, StoreError> {
        let mut all: Vec<Recipient> =
            self.recipients.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by(|a, b| a.token.cmp(&b.token));
        Ok(all)
    }
}
