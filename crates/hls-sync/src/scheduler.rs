use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::{CloseReason, SegmentCache},
    config::SyncConfig,
    fetch::SegmentFetcher,
    http::Transport,
    playlist::{MediaPlaylist, SegmentDescriptor},
};

/// Delay between fetches once the playlist has ended.
const END_OF_STREAM_DELAY: Duration = Duration::from_secs(1);

enum Step {
    /// Draining: a segment not fetched yet is available.
    Fetch(Arc<MediaPlaylist>, SegmentDescriptor),
    /// The playlist ended and every segment was fetched.
    Finished,
    /// The playlist is stalled and the monitor stopped publishing updates.
    Unavailable,
}

/// Sequence that must be cached for the pre-buffer to count as filled after
/// fetching `sequence`. `None` when it lies before the start of the stream.
pub fn buffer_anchor(sequence: u64, buffer: usize) -> Option<u64> {
    sequence.checked_sub(buffer.checked_sub(1)? as u64)
}

/// Time to wait after fetching `segment` before fetching the next one.
///
/// Fetches run back to back until the pre-buffer is filled, then follow the
/// segment duration, and speed up to one per second once the stream has ended.
pub fn pacing_delay(
    segment: &SegmentDescriptor,
    buffer: usize,
    buffer_filled: bool,
    end_of_stream: bool,
) -> Duration {
    if buffer > 0 && !buffer_filled {
        Duration::ZERO
    } else if end_of_stream {
        END_OF_STREAM_DELAY
    } else {
        segment.duration()
    }
}

/// Walks the media playlist and fetches its segments one after another.
pub struct SegmentScheduler<T> {
    fetcher: SegmentFetcher<T>,
    cache: Arc<SegmentCache>,
    playlist: watch::Receiver<Arc<MediaPlaylist>>,

    buffer: usize,
    live_edge: usize,
    max_reload_failures: u32,

    last: Option<u64>,
}

impl<T> SegmentScheduler<T>
where
    T: Transport,
{
    pub fn new(
        fetcher: SegmentFetcher<T>,
        cache: Arc<SegmentCache>,
        playlist: watch::Receiver<Arc<MediaPlaylist>>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            fetcher,
            cache,
            playlist,

            buffer: config.buffer,
            live_edge: config.live_edge_segments,
            max_reload_failures: config.reload_failure_limit(),

            last: None,
        }
    }

    /// Sequence of the segment that will be fetched first.
    pub fn first_sequence(&self) -> Option<u64> {
        self.playlist
            .borrow()
            .next_after(self.last, self.live_edge)
            .map(|s| s.sequence)
    }

    pub async fn run(mut self, token: CancellationToken) {
        loop {
            let step = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                step = self.next_step() => step,
            };

            let (playlist, segment) = match step {
                Step::Fetch(playlist, segment) => (playlist, segment),
                Step::Finished => {
                    tracing::info!("End of media");
                    self.cache.close(CloseReason::EndOfMedia).await;
                    return;
                }
                Step::Unavailable => {
                    tracing::error!("Playlist is no longer available, stop downloading.");
                    self.cache
                        .close(CloseReason::PlaylistUnavailable(self.max_reload_failures))
                        .await;
                    return;
                }
            };

            let sequence = segment.sequence;
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = self.fetcher.fetch(&playlist, &segment) => result,
            };
            if let Err(e) = result {
                tracing::warn!("Segment {sequence} skipped: {e}");
                self.cache.fail(sequence, e).await;
            }
            self.last = Some(sequence);

            let delay = self.delay_after(&segment).await;
            tracing::debug!("Next segment in {delay:?}");
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn delay_after(&self, segment: &SegmentDescriptor) -> Duration {
        let buffer_filled = match buffer_anchor(segment.sequence, self.buffer) {
            Some(anchor) => self.cache.contains(anchor).await,
            None => false,
        };
        let end_of_stream = self.playlist.borrow().end_of_stream;

        pacing_delay(segment, self.buffer, buffer_filled, end_of_stream)
    }

    async fn next_step(&mut self) -> Step {
        let mut closed = false;
        loop {
            let playlist = self.playlist.borrow_and_update().clone();
            if let Some(segment) = playlist.next_after(self.last, self.live_edge) {
                let segment = segment.clone();
                return Step::Fetch(playlist, segment);
            }
            if playlist.end_of_stream {
                return Step::Finished;
            }
            if closed {
                return Step::Unavailable;
            }

            tracing::debug!("No new segment, waiting for the playlist to be updated.");
            if self.playlist.changed().await.is_err() {
                closed = true;
            }
        }
    }
}
