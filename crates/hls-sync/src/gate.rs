use std::sync::Arc;

use tokio::sync::oneshot;

use crate::{
    cache::{CachedSegment, SegmentCache},
    error::{HlsSyncError, HlsSyncResult},
};

/// The single outstanding consumer request.
pub(crate) struct PendingWait {
    min_sequence: u64,
    sender: oneshot::Sender<HlsSyncResult<CachedSegment>>,
}

impl PendingWait {
    pub(crate) fn accepts(&self, sequence: u64) -> bool {
        sequence >= self.min_sequence
    }

    pub(crate) fn resolve(self, segment: CachedSegment) {
        // the consumer may have given up already
        _ = self.sender.send(Ok(segment));
    }

    pub(crate) fn fail(self, error: HlsSyncError) {
        _ = self.sender.send(Err(error));
    }
}

pub(crate) enum Ticket {
    Ready(CachedSegment),
    Waiting(oneshot::Receiver<HlsSyncResult<CachedSegment>>),
}

impl Ticket {
    pub(crate) async fn wait(self) -> HlsSyncResult<CachedSegment> {
        match self {
            Ticket::Ready(segment) => Ok(segment),
            // the sender is dropped when a newer request replaces this one
            Ticket::Waiting(receiver) => receiver
                .await
                .unwrap_or_else(|_| Err(HlsSyncError::WaitSuperseded)),
        }
    }
}

/// Consumer side of the engine: hands out segments by sequence number.
#[derive(Clone)]
pub struct ConsumerGate {
    cache: Arc<SegmentCache>,
}

impl ConsumerGate {
    pub fn new(cache: Arc<SegmentCache>) -> Self {
        Self { cache }
    }

    /// Get the first segment whose sequence is at least `min_sequence`.
    ///
    /// Returns without suspending when such a segment is cached. Otherwise waits
    /// until the scheduler delivers one. Only one request can wait at a time: a
    /// newer request makes the older one fail with [`HlsSyncError::WaitSuperseded`].
    pub async fn request_segment(&self, min_sequence: u64) -> HlsSyncResult<CachedSegment> {
        self.ticket(min_sequence).await?.wait().await
    }

    pub(crate) async fn ticket(&self, min_sequence: u64) -> HlsSyncResult<Ticket> {
        let mut state = self.cache.lock().await;
        if let Some(segment) = state.lookup(min_sequence) {
            return Ok(Ticket::Ready(segment.clone()));
        }
        if let Some(reason) = state.closed {
            return Err(reason.into());
        }

        let (sender, receiver) = oneshot::channel();
        let previous = state.waiter.replace(PendingWait {
            min_sequence,
            sender,
        });
        if let Some(previous) = previous {
            log::debug!(
                "Request for segment {} superseded by {min_sequence}",
                previous.min_sequence
            );
        }
        log::debug!(
            "Waiting for segment {min_sequence} (available: {:?})",
            state.sequences()
        );

        Ok(Ticket::Waiting(receiver))
    }
}
