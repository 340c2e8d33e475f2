//! In-memory registry of chunked uploads.
//!
//! Each upload key owns a slot with an async gate. Chunk writes hold the
//! shared side, so different indices stage concurrently; merge and abort
//! hold the exclusive side, so they never overlap a write or each other.
//! A slot is retired when its upload is merged or discarded. Writers that
//! were queued on a retired slot move to a fresh one, while exclusive
//! waiters get `NotFound`.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::{BlobError, BlobResult, MediaKey, UploadSession};

#[derive(Debug, Default)]
struct SlotState {
    session: Option<UploadSession>,
    retired: bool,
}

#[derive(Debug, Default)]
struct SessionSlot {
    gate: Arc<RwLock<()>>,
    state: Mutex<SlotState>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: DashMap<MediaKey, Arc<SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &MediaKey) -> Arc<SessionSlot> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(SessionSlot::default()))
            .clone()
    }

    /// Shared access for staging one chunk of `key`.
    pub async fn begin_write(&self, key: &MediaKey) -> WriteTicket {
        loop {
            let slot = self.slot(key);
            let guard = slot.gate.clone().read_owned().await;
            if slot.state.lock().retired {
                continue;
            }
            return WriteTicket {
                key: key.clone(),
                slot,
                _guard: guard,
            };
        }
    }

    /// Exclusive access for merging or discarding `key`.
    pub async fn begin_exclusive(&self, key: &MediaKey) -> BlobResult<ExclusiveTicket<'_>> {
        let slot = self.slot(key);
        let guard = slot.gate.clone().write_owned().await;
        if slot.state.lock().retired {
            return Err(BlobError::not_found(format!(
                "Upload already completed: {key}"
            )));
        }
        Ok(ExclusiveTicket {
            registry: self,
            key: key.clone(),
            slot,
            _guard: guard,
        })
    }

    /// Snapshot of the session for `key`, if one is tracked.
    pub fn get(&self, key: &MediaKey) -> Option<UploadSession> {
        self.slots
            .get(key)
            .and_then(|slot| slot.state.lock().session.clone())
    }

    /// Number of uploads with recorded chunks.
    pub fn active(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state.lock().session.is_some())
            .count()
    }

    fn retire(&self, key: &MediaKey, slot: &Arc<SessionSlot>) {
        slot.state.lock().retired = true;
        self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }
}

/// Shared hold on an upload slot while a chunk is staged.
pub struct WriteTicket {
    key: MediaKey,
    slot: Arc<SessionSlot>,
    _guard: OwnedRwLockReadGuard<()>,
}

impl WriteTicket {
    /// Record a staged chunk, creating the session on first use.
    pub fn record(&self, index: u32, total: u32, size: u64) -> UploadSession {
        let mut state = self.slot.state.lock();
        let session = state
            .session
            .get_or_insert_with(|| UploadSession::new(self.key.clone(), total));
        session.record(index, total, size);
        session.clone()
    }
}

/// Exclusive hold on an upload slot.
pub struct ExclusiveTicket<'a> {
    registry: &'a SessionRegistry,
    key: MediaKey,
    slot: Arc<SessionSlot>,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl ExclusiveTicket<'_> {
    pub fn session(&self) -> Option<UploadSession> {
        self.slot.state.lock().session.clone()
    }

    /// Overwrite the tracked session, e.g. with what is still on disk after
    /// a failed merge.
    pub fn replace_session(&self, session: Option<UploadSession>) {
        self.slot.state.lock().session = session;
    }

    /// End the upload: later writers start a fresh session and queued
    /// exclusive holders see `NotFound`.
    pub fn retire(self) {
        self.registry.retire(&self.key, &self.slot);
    }

    /// Drop the slot if nothing was ever recorded in it. Keeps failed
    /// completions of unknown keys from accumulating.
    pub fn release(self) {
        if self.slot.state.lock().session.is_none() {
            self.registry.retire(&self.key, &self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(name: &str) -> MediaKey {
        MediaKey::parse(name).unwrap()
    }

    #[tokio::test]
    async fn writes_create_and_update_session() {
        let registry = SessionRegistry::new();
        let movie = key("movie");

        registry.begin_write(&movie).await.record(1, 3, 10);
        let snapshot = registry.begin_write(&movie).await.record(2, 4, 5);

        assert_eq!(snapshot.total_chunks, 4);
        assert_eq!(snapshot.received_bytes, 15);
        assert_eq!(registry.get(&movie), Some(snapshot));
        assert_eq!(registry.active(), 1);
    }

    #[tokio::test]
    async fn retired_slot_rejects_second_exclusive_holder() {
        let registry = Arc::new(SessionRegistry::new());
        let movie = key("movie");
        registry.begin_write(&movie).await.record(1, 1, 1);

        let first = registry.begin_exclusive(&movie).await.unwrap();
        let waiter = {
            let registry = Arc::clone(&registry);
            let movie = movie.clone();
            tokio::spawn(async move { registry.begin_exclusive(&movie).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        first.retire();

        let second = waiter.await.unwrap();
        assert!(second.unwrap_err().is_not_found());
        assert!(registry.get(&movie).is_none());
    }

    #[tokio::test]
    async fn writer_queued_behind_retire_gets_fresh_session() {
        let registry = Arc::new(SessionRegistry::new());
        let movie = key("movie");
        registry.begin_write(&movie).await.record(1, 2, 1);

        let exclusive = registry.begin_exclusive(&movie).await.unwrap();
        let writer = {
            let registry = Arc::clone(&registry);
            let movie = movie.clone();
            tokio::spawn(async move { registry.begin_write(&movie).await.record(1, 1, 7) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        exclusive.retire();

        let fresh = writer.await.unwrap();
        assert_eq!(fresh.received_bytes, 7);
        assert_eq!(fresh.total_chunks, 1);
    }

    #[tokio::test]
    async fn release_drops_only_empty_slots() {
        let registry = SessionRegistry::new();
        let ghost = key("ghost");
        registry.begin_exclusive(&ghost).await.unwrap().release();
        assert!(registry.slots.get(&ghost).is_none());

        let movie = key("movie");
        registry.begin_write(&movie).await.record(1, 1, 1);
        registry.begin_exclusive(&movie).await.unwrap().release();
        assert!(registry.get(&movie).is_some());
    }
}
