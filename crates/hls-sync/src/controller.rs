use crate::{
    cache::CachedSegment,
    config::Retention,
    error::HlsSyncResult,
    http::{HttpClient, Transport},
    sync::HlsSync,
};

/// Plays an [`HlsSync`] segment after segment.
///
/// The engine's retention is applied behind the playhead instead of behind
/// the newest download, so the segment being played is never evicted while
/// the scheduler fetches ahead.
pub struct PlaybackController<T = HttpClient> {
    sync: HlsSync<T>,
    retention: Retention,
    playhead: Option<u64>,
}

impl<T> PlaybackController<T>
where
    T: Transport,
{
    pub async fn new(sync: HlsSync<T>) -> Self {
        let retention = sync.cache().retention().await;
        sync.cache().set_retention(Retention::Unbounded).await;

        Self {
            sync,
            retention,
            playhead: None,
        }
    }

    pub async fn start(&mut self) -> HlsSyncResult<CachedSegment> {
        let segment = self.sync.start().await?;
        self.playhead = Some(segment.sequence);
        Ok(segment)
    }

    /// Release what is behind the playhead and move to the following segment.
    ///
    /// Segments that could not be downloaded are skipped, the playhead moves to
    /// the sequence actually returned.
    pub async fn next(&mut self) -> HlsSyncResult<CachedSegment> {
        let Some(playhead) = self.playhead else {
            return self.start().await;
        };

        if let Some(up_to) = self.retention.evict_up_to(playhead) {
            let removed = self.sync.cache().evict(|s| s <= up_to).await;
            if removed > 0 {
                log::debug!("Released {removed} segments up to {up_to}");
            }
        }

        let mut wanted = playhead + 1;
        let segment = loop {
            match self.sync.request_segment(wanted).await {
                Ok(segment) => break segment,
                Err(e) if !e.is_lifecycle() => {
                    log::warn!("Segment {wanted} could not be downloaded, skipped. {e}");
                    wanted += 1;
                }
                Err(e) => return Err(e),
            }
        };
        if segment.sequence > playhead + 1 {
            log::warn!(
                "Segments {} to {} are missing, skipped.",
                playhead + 1,
                segment.sequence - 1
            );
        }
        self.playhead = Some(segment.sequence);
        Ok(segment)
    }

    pub async fn stop(&self) {
        self.sync.stop().await;
    }

    pub fn playhead(&self) -> Option<u64> {
        self.playhead
    }

    pub fn sync(&self) -> &HlsSync<T> {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut HlsSync<T> {
        &mut self.sync
    }
}
