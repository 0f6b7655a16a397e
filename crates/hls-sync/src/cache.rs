use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::sync::{Mutex, MutexGuard};
use url::Url;

use crate::{
    config::Retention,
    error::{HlsSyncError, HlsSyncResult},
    gate::PendingWait,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    File(PathBuf),
    /// The payload was downloaded and dropped.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct CachedSegment {
    pub sequence: u64,
    pub storage: Storage,
    /// Absolute url the segment was downloaded from.
    pub url: Url,
}

impl CachedSegment {
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(path) => Some(path),
            Storage::Discarded => None,
        }
    }
}

/// Why no more segments will be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    EndOfMedia,
    Stopped,
    PlaylistUnavailable(u32),
}

impl From<CloseReason> for HlsSyncError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::EndOfMedia => HlsSyncError::EndOfMedia,
            CloseReason::Stopped => HlsSyncError::Stopped,
            CloseReason::PlaylistUnavailable(failures) => HlsSyncError::ReloadFailed(failures),
        }
    }
}

pub(crate) struct CacheState {
    entries: BTreeMap<u64, CachedSegment>,
    retention: Retention,
    pub(crate) waiter: Option<PendingWait>,
    pub(crate) closed: Option<CloseReason>,
}

impl CacheState {
    /// Smallest cached segment whose sequence is at least `min_sequence`.
    pub(crate) fn lookup(&self, min_sequence: u64) -> Option<&CachedSegment> {
        self.entries.range(min_sequence..).next().map(|(_, s)| s)
    }

    pub(crate) fn sequences(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub(crate) async fn insert(&mut self, segment: CachedSegment) {
        let sequence = segment.sequence;

        if let Storage::File(path) = &segment.storage {
            tracing::debug!("Saved {} in {}", segment.url, path.display());
            self.entries.insert(sequence, segment.clone());
        }

        if let Some(up_to) = self.retention.evict_up_to(sequence) {
            self.remove_where(|s| s <= up_to).await;
        }

        if self
            .waiter
            .as_ref()
            .is_some_and(|waiter| waiter.accepts(sequence))
        {
            if let Some(waiter) = self.waiter.take() {
                waiter.resolve(segment);
            }
        }
    }

    async fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(u64) -> bool,
    {
        let doomed: Vec<u64> = self
            .entries
            .keys()
            .copied()
            .filter(|sequence| predicate(*sequence))
            .collect();

        for sequence in doomed.iter() {
            let Some(segment) = self.entries.remove(sequence) else {
                continue;
            };
            let Storage::File(path) = segment.storage else {
                continue;
            };

            tracing::debug!("Removing {}", path.display());
            match tokio::fs::remove_file(&path).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {e}", path.display()),
            }
        }

        doomed.len()
    }
}

/// Downloaded segments by sequence number, together with the pending consumer request.
///
/// Lookups, insertions and evictions (file removal included) all happen under
/// one lock, so a lookup never returns an entry that is being deleted.
pub struct SegmentCache {
    state: Mutex<CacheState>,
}

impl SegmentCache {
    pub fn new(retention: Retention) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                retention,
                waiter: None,
                closed: None,
            }),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().await
    }

    pub async fn retention(&self) -> Retention {
        self.lock().await.retention
    }

    pub async fn set_retention(&self, retention: Retention) {
        self.lock().await.retention = retention;
    }

    /// Register a downloaded segment, evict what falls out of the retention
    /// window and hand the segment to the pending request if it satisfies it.
    pub async fn insert(&self, segment: CachedSegment) {
        self.lock().await.insert(segment).await;
    }

    pub async fn lookup(&self, min_sequence: u64) -> Option<CachedSegment> {
        self.lock().await.lookup(min_sequence).cloned()
    }

    pub async fn contains(&self, sequence: u64) -> bool {
        self.lock().await.entries.contains_key(&sequence)
    }

    pub async fn len(&self) -> usize {
        self.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lock().await.entries.is_empty()
    }

    pub async fn sequences(&self) -> Vec<u64> {
        self.lock().await.sequences()
    }

    /// Remove every entry whose sequence matches `predicate`, deleting its file.
    pub async fn evict<F>(&self, predicate: F) -> usize
    where
        F: Fn(u64) -> bool,
    {
        self.lock().await.remove_where(predicate).await
    }

    /// Remove every entry and its file.
    pub async fn clear(&self) -> usize {
        self.evict(|_| true).await
    }

    /// Report a segment that could not be downloaded to a consumer waiting for it.
    pub(crate) async fn fail(&self, sequence: u64, error: HlsSyncError) {
        let mut state = self.lock().await;
        if state
            .waiter
            .as_ref()
            .is_some_and(|waiter| waiter.accepts(sequence))
        {
            if let Some(waiter) = state.waiter.take() {
                waiter.fail(error);
            }
        }
    }

    /// No more segments will arrive. The pending request and every later miss fail with `reason`.
    pub(crate) async fn close(&self, reason: CloseReason) {
        let mut state = self.lock().await;
        if state.closed.is_none() || reason == CloseReason::Stopped {
            state.closed = Some(reason);
        }
        if let Some(waiter) = state.waiter.take() {
            waiter.fail(reason.into());
        }
    }

    pub(crate) async fn check_open(&self) -> HlsSyncResult<()> {
        match self.lock().await.closed {
            Some(reason) => Err(reason.into()),
            None => Ok(()),
        }
    }
}
