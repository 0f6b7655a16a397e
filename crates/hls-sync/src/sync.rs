use std::{path::PathBuf, sync::Arc, time::Duration};

use reqwest::Client;
use tempfile::TempDir;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    cache::{CachedSegment, CloseReason, SegmentCache},
    config::{Retention, SyncConfig},
    error::{HlsSyncError, HlsSyncResult},
    fetch::SegmentFetcher,
    gate::ConsumerGate,
    http::{HttpClient, Transport},
    monitor::PlaylistMonitor,
    scheduler::SegmentScheduler,
};

pub const USER_AGENT: &str = concat!("hls-sync/", env!("CARGO_PKG_VERSION"));

/// Keeps a local copy of an HLS stream in sync with the server.
///
/// Once started, two tasks run in the background: one reloads the playlist
/// while the stream is live, the other downloads its segments ahead of the
/// consumer. Segments are handed out with [`HlsSync::request_segment`].
pub struct HlsSync<T = HttpClient> {
    url: Url,
    config: SyncConfig,
    transport: Arc<T>,
    cache: Arc<SegmentCache>,

    working_dir: PathBuf,
    // removed together with the engine
    _temp_dir: Option<TempDir>,

    token: CancellationToken,
    started: bool,
    monitor: Option<JoinHandle<HlsSyncResult<()>>>,
    scheduler: Option<JoinHandle<()>>,
}

impl HlsSync<HttpClient> {
    pub fn new(url: Url, config: SyncConfig) -> HlsSyncResult<Self> {
        let client = HttpClient::new(
            Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(60)),
        )?
        .with_referer(config.referer.clone());

        Self::with_transport(url, config, client)
    }
}

impl<T> HlsSync<T>
where
    T: Transport,
{
    pub fn with_transport(url: Url, config: SyncConfig, transport: T) -> HlsSyncResult<Self> {
        let (working_dir, temp_dir) = match &config.path {
            Some(path) => {
                std::fs::create_dir_all(path)?;
                (path.clone(), None)
            }
            None => {
                let temp_dir = tempfile::Builder::new().prefix("hls-sync").tempdir()?;
                (temp_dir.path().to_path_buf(), Some(temp_dir))
            }
        };
        log::debug!("Segments of {url} are stored in {}", working_dir.display());

        Ok(Self {
            url,
            cache: Arc::new(SegmentCache::new(config.retention)),
            config,
            transport: Arc::new(transport),

            working_dir,
            _temp_dir: temp_dir,

            token: CancellationToken::new(),
            started: false,
            monitor: None,
            scheduler: None,
        })
    }

    /// Load the playlist, start the background tasks and wait for the first segment.
    pub async fn start(&mut self) -> HlsSyncResult<CachedSegment> {
        if self.started {
            return Err(HlsSyncError::AlreadyStarted);
        }
        self.started = true;
        self.cache.check_open().await?;

        // the playback controller may have replaced the configured retention
        match self.cache.retention().await {
            Retention::Keep(keep) if keep < self.config.buffer as u64 => {
                tracing::warn!(
                    "Keeping {keep} segments is less than the buffer of {}, downloads will not be paced.",
                    self.config.buffer
                );
            }
            Retention::Discard if self.config.buffer > 0 => {
                tracing::warn!("Segments are discarded, downloads will not be paced.");
            }
            _ => {}
        }

        let mut monitor =
            PlaylistMonitor::new(self.transport.clone(), self.url.clone(), &self.config);
        let playlist = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(HlsSyncError::Stopped),
            playlist = monitor.start() => playlist?,
        };
        tracing::info!(
            "Loaded {} with {} segments{}",
            monitor.url(),
            playlist.segments.len(),
            if playlist.end_of_stream { ", complete" } else { "" }
        );

        let (sender, receiver) = watch::channel(Arc::new(playlist));
        let fetcher = SegmentFetcher::new(
            self.transport.clone(),
            self.cache.clone(),
            self.working_dir.clone(),
        )
        .with_retries(self.config.segment_retries);
        let scheduler = SegmentScheduler::new(fetcher, self.cache.clone(), receiver, &self.config);

        // registered before the scheduler runs so the first segment cannot be missed
        let first = scheduler.first_sequence().unwrap_or_default();
        let ticket = self.gate().ticket(first).await?;

        self.monitor = Some(tokio::spawn(monitor.run(sender, self.token.clone())));
        self.scheduler = Some(tokio::spawn(scheduler.run(self.token.clone())));

        let first = ticket.wait().await;
        if let Err(e) = &first {
            tracing::error!("First segment unavailable, stopping: {e}");
            self.token.cancel();
        }
        first
    }

    /// See [`ConsumerGate::request_segment`].
    pub async fn request_segment(&self, min_sequence: u64) -> HlsSyncResult<CachedSegment> {
        self.gate().request_segment(min_sequence).await
    }

    pub fn gate(&self) -> ConsumerGate {
        ConsumerGate::new(self.cache.clone())
    }

    pub fn cache(&self) -> &Arc<SegmentCache> {
        &self.cache
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    /// Wait until every segment was downloaded or the engine stopped.
    ///
    /// Returns the error that made the playlist monitor give up, if any.
    pub async fn finished(&mut self) -> HlsSyncResult<()> {
        if let Some(scheduler) = self.scheduler.take() {
            if let Err(e) = scheduler.await {
                tracing::error!("Segment scheduler crashed: {e}");
            }
        }

        if let Some(monitor) = self.monitor.take() {
            match monitor.await {
                Ok(result) => result?,
                Err(e) => tracing::error!("Playlist monitor crashed: {e}"),
            }
        }

        Ok(())
    }

    /// Stop both background tasks and delete every cached segment.
    ///
    /// Pending and later requests for missing segments fail with [`HlsSyncError::Stopped`].
    pub async fn stop(&self) {
        self.token.cancel();
        self.cache.close(CloseReason::Stopped).await;
        let removed = self.cache.clear().await;
        log::info!("Synchronization of {} stopped, {removed} segments removed.", self.url);
    }
}

impl<T> Drop for HlsSync<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
