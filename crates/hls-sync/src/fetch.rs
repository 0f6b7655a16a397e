use std::{path::PathBuf, sync::Arc};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::{
    cache::{CachedSegment, SegmentCache, Storage},
    error::HlsSyncResult,
    http::Transport,
    playlist::{segment_file_name, MediaPlaylist, SegmentDescriptor},
};

/// Downloads segments into the working directory and registers them in the cache.
pub struct SegmentFetcher<T> {
    transport: Arc<T>,
    cache: Arc<SegmentCache>,
    working_dir: PathBuf,
    retries: u32,
}

/// A downloaded segment that is not registered in the cache yet.
///
/// The payload lives in a temporary file until it is persisted, dropping it
/// removes the file.
struct Downloaded {
    sequence: u64,
    url: Url,
    part: Option<NamedTempFile>,
}

impl<T> SegmentFetcher<T>
where
    T: Transport,
{
    pub fn new(transport: Arc<T>, cache: Arc<SegmentCache>, working_dir: PathBuf) -> Self {
        Self {
            transport,
            cache,
            working_dir,
            retries: 3,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Download `segment` of `playlist`. On success the segment is inserted
    /// into the cache, which evicts old segments and wakes a waiting consumer.
    ///
    /// The file only gets its final name while the cache is locked, so a fetch
    /// cancelled at any point leaves nothing behind in the working directory.
    pub async fn fetch(
        &self,
        playlist: &MediaPlaylist,
        segment: &SegmentDescriptor,
    ) -> HlsSyncResult<CachedSegment> {
        let url = playlist.segment_url(segment)?;

        let mut retries = self.retries;
        let downloaded = loop {
            match self.download(&url, segment.sequence).await {
                Ok(downloaded) => break downloaded,
                Err(e) => {
                    if retries == 0 {
                        tracing::error!("Downloading {url} failed, max retries exceed. {e}");
                        return Err(e);
                    }

                    retries -= 1;
                    tracing::warn!("Downloading {url} failed, retry later. {e}");
                }
            }
        };

        let mut state = self.cache.lock().await;
        let storage = match downloaded.part {
            Some(part) => {
                let path = self
                    .working_dir
                    .join(segment_file_name(&downloaded.url, downloaded.sequence));
                part.persist(&path).map_err(|e| e.error)?;
                Storage::File(path)
            }
            None => Storage::Discarded,
        };
        let cached = CachedSegment {
            sequence: downloaded.sequence,
            storage,
            url: downloaded.url,
        };

        state.insert(cached.clone()).await;
        Ok(cached)
    }

    async fn download(&self, url: &Url, sequence: u64) -> HlsSyncResult<Downloaded> {
        let bytes = self.transport.get(url.clone()).await?;
        tracing::debug!("Received segment {sequence} of {} bytes.", bytes.len());

        let part = if self.cache.retention().await.persists() {
            Some(self.write_part(bytes).await?)
        } else {
            None
        };

        Ok(Downloaded {
            sequence,
            url: url.clone(),
            part,
        })
    }

    async fn write_part(&self, bytes: Bytes) -> HlsSyncResult<NamedTempFile> {
        let part = tempfile::Builder::new()
            .prefix(".hls-sync-")
            .suffix(".part")
            .tempfile_in(&self.working_dir)?;

        // written through the open handle, the path may be unlinked meanwhile
        let mut file = tokio::fs::File::from_std(part.as_file().try_clone()?);
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(part)
    }
}
