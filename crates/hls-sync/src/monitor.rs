use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::SyncConfig,
    error::{HlsSyncError, HlsSyncResult},
    http::Transport,
    playlist::{MediaPlaylist, Playlist, DEFAULT_RELOAD_DELAY},
};

/// How many master playlists may point to each other before a media playlist shows up.
const MAX_MASTER_DEPTH: usize = 4;

pub enum Reload {
    Updated(MediaPlaylist),
    /// The server returned exactly the same body as last time.
    Unchanged,
}

/// Loads the playlist and keeps reloading it while the stream is live.
pub struct PlaylistMonitor<T> {
    transport: Arc<T>,
    bitrate: u64,
    url: Url,
    last_body: Option<Bytes>,

    suggested_delay: Duration,
    target_duration: Duration,
    backoff: Option<Duration>,
    failures: u32,

    reload_interval: Duration,
    max_backoff: Duration,
    max_failures: u32,
}

impl<T> PlaylistMonitor<T>
where
    T: Transport,
{
    pub fn new(transport: Arc<T>, url: Url, config: &SyncConfig) -> Self {
        Self {
            transport,
            bitrate: config.bitrate,
            url,
            last_body: None,

            suggested_delay: DEFAULT_RELOAD_DELAY,
            target_duration: Duration::ZERO,
            backoff: None,
            failures: 0,

            reload_interval: config.reload_interval,
            max_backoff: config.max_reload_backoff,
            max_failures: config.reload_failure_limit(),
        }
    }

    /// Url of the playlist being monitored. Points to the media playlist once one was loaded.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Load the playlist until a media playlist is obtained, following master playlists.
    pub async fn start(&mut self) -> HlsSyncResult<MediaPlaylist> {
        loop {
            let before_load = Instant::now();
            match self.reload().await {
                Ok(Reload::Updated(playlist)) => return Ok(playlist),
                Ok(Reload::Unchanged) => {}
                Err(e) => self.record_failure(e)?,
            }

            let delay = self.next_backoff();
            log::info!("Retrying to load playlist in {delay:?}");
            sleep_until(before_load + delay).await;
        }
    }

    /// Fetch the monitored playlist once.
    pub async fn reload(&mut self) -> HlsSyncResult<Reload> {
        let mut url = self.url.clone();

        for _ in 0..=MAX_MASTER_DEPTH {
            log::debug!("Fetching {url}");
            let body = self.transport.get(url.clone()).await?;
            if self.last_body.as_ref() == Some(&body) {
                self.failures = 0;
                return Ok(Reload::Unchanged);
            }

            match Playlist::parse(url.clone(), &body)? {
                Playlist::Master(master) => {
                    let variant = master
                        .select_variant(self.bitrate)
                        .ok_or(HlsSyncError::NoVariant)?;
                    let variant_url = master.variant_url(variant)?;
                    log::info!(
                        "Master playlist input detected. Selected stream: {variant_url}; Bandwidth: {bandwidth}",
                        bandwidth = variant.bandwidth
                    );
                    url = variant_url;
                }
                Playlist::Media(playlist) => {
                    self.url = url;
                    self.last_body = Some(body);
                    self.suggested_delay = playlist.suggested_reload_delay();
                    self.target_duration = playlist.target_duration;
                    self.backoff = None;
                    self.failures = 0;
                    return Ok(Reload::Updated(playlist));
                }
            }
        }

        Err(HlsSyncError::NestedMasterPlaylist)
    }

    /// Keep reloading the playlist and publish every new version on `sender`.
    ///
    /// Ends once the playlist reaches its end, when `token` is cancelled, or
    /// with [`HlsSyncError::ReloadFailed`] after too many failures in a row.
    pub async fn run(
        mut self,
        sender: watch::Sender<Arc<MediaPlaylist>>,
        token: CancellationToken,
    ) -> HlsSyncResult<()> {
        if sender.borrow().end_of_stream {
            log::info!("Playlist is complete, no reload needed.");
            return Ok(());
        }

        let mut last_load = Instant::now();
        let mut delay = self.reload_interval;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                _ = sleep_until(last_load + delay) => {}
            }

            last_load = Instant::now();
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                result = self.reload() => result,
            };

            delay = match result {
                Ok(Reload::Updated(playlist)) => {
                    let is_end = playlist.end_of_stream;
                    log::debug!(
                        "Playlist updated, last sequence: {:?}",
                        playlist.last_sequence()
                    );
                    sender.send_replace(Arc::new(playlist));

                    if is_end {
                        log::info!("Playlist reached its end, stop reloading.");
                        return Ok(());
                    }
                    self.reload_interval
                }
                Ok(Reload::Unchanged) => {
                    let delay = self.next_backoff();
                    log::debug!("Playlist unchanged, reloading in {delay:?}");
                    delay
                }
                Err(e) => {
                    self.record_failure(e)?;
                    let delay = self.next_backoff();
                    log::info!("Reloading playlist in {delay:?}");
                    delay
                }
            };
        }
    }

    fn record_failure(&mut self, error: HlsSyncError) -> HlsSyncResult<()> {
        self.failures += 1;
        log::warn!(
            "Failed to load playlist ({}/{}): {error}",
            self.failures,
            self.max_failures
        );

        if self.failures >= self.max_failures {
            log::error!("Exceeded retry limit for loading playlist, giving up.");
            return Err(HlsSyncError::ReloadFailed(self.failures));
        }
        Ok(())
    }

    /// Delay before the next attempt after a failed or unchanged reload.
    ///
    /// Starts at the playlist's suggested delay and doubles on every attempt,
    /// up to three target durations and never more than the configured ceiling.
    fn next_backoff(&mut self) -> Duration {
        let ceiling = if self.target_duration.is_zero() {
            self.max_backoff
        } else {
            (self.target_duration * 3).min(self.max_backoff)
        };

        let delay = match self.backoff {
            None => self.suggested_delay,
            Some(previous) => previous.saturating_mul(2).min(ceiling),
        }
        .max(self.suggested_delay.min(ceiling));

        self.backoff = Some(delay);
        delay
    }
}
