use std::{path::PathBuf, time::Duration};

use anyhow::bail;
use clap::Parser;
use hls_sync::{HlsSync, HlsSyncError, PlaybackController, SyncConfig};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Window over which the syncs of one url are started.
const STAGGER_WINDOW: Duration = Duration::from_secs(10);

#[derive(Parser, Debug, Clone)]
#[clap(name = "hls-sync", version, about)]
pub struct HlsSyncArgs {
    /// Debug output
    #[clap(short, long)]
    verbose: bool,

    /// Preferred bitrate when the url points to a master playlist
    #[clap(short, long, default_value = "200000")]
    bitrate: u64,

    /// Number of segments to download before pacing at playback speed
    #[clap(short = 'u', long, default_value = "3")]
    buffer: usize,

    /// Number of played segments kept on disk
    ///
    /// -1 keeps everything, 0 removes a segment as soon as the next one is played.
    #[clap(short, long, default_value = "3", allow_hyphen_values = true)]
    keep: i64,

    /// Referer sent with every request
    #[clap(short, long)]
    referer: Option<String>,

    /// Directory where segments are stored. A temporary directory is used by default.
    #[clap(short, long, env = "HLS_SYNC_PATH")]
    path: Option<PathBuf>,

    /// Append every played segment to this file. Only one stream can be saved.
    #[clap(short, long)]
    save: Option<PathBuf>,

    /// Number of syncs per url, started a few seconds apart
    #[clap(short, long, default_value = "1")]
    number: u32,

    urls: Vec<String>,
}

impl HlsSyncArgs {
    fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::default()
            .with_bitrate(self.bitrate)
            .with_buffer(self.buffer)
            .with_retention(self.keep);
        if let Some(referer) = &self.referer {
            config = config.with_referer(referer);
        }
        if let Some(path) = &self.path {
            config = config.with_path(path);
        }
        config
    }

    fn urls(&self) -> anyhow::Result<Vec<Url>> {
        self.urls
            .iter()
            .map(|url| {
                let url = if url.contains("://") {
                    url.clone()
                } else {
                    format!("http://{url}")
                };
                Ok(Url::parse(&url)?)
            })
            .collect()
    }
}

async fn play(
    url: Url,
    config: SyncConfig,
    save: Option<PathBuf>,
    delay: Duration,
    token: CancellationToken,
) -> anyhow::Result<()> {
    tokio::select! {
        _ = token.cancelled() => return Ok(()),
        _ = tokio::time::sleep(delay) => {}
    }

    let sync = HlsSync::new(url.clone(), config)?;
    let mut controller = PlaybackController::new(sync).await;
    let mut output = match save {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?,
        ),
        None => None,
    };

    let mut result = tokio::select! {
        _ = token.cancelled() => Err(HlsSyncError::Stopped),
        result = controller.start() => result,
    };
    let outcome = loop {
        let segment = match result {
            Ok(segment) => segment,
            Err(HlsSyncError::EndOfMedia) => {
                tracing::info!("End of media: {url}");
                break Ok(());
            }
            Err(HlsSyncError::Stopped) => break Ok(()),
            Err(e) => break Err(e.into()),
        };

        match segment.path() {
            Some(path) => {
                tracing::info!("Segment {}: {}", segment.sequence, path.display());
                if let Some(output) = &mut output {
                    let bytes = tokio::fs::read(path).await?;
                    output.write_all(&bytes).await?;
                }
            }
            None => tracing::info!("Segment {} was not stored", segment.sequence),
        }

        result = tokio::select! {
            _ = token.cancelled() => Err(HlsSyncError::Stopped),
            result = controller.next() => result,
        };
    };

    if let Some(mut output) = output {
        output.flush().await?;
    }
    controller.stop().await;
    outcome
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = HlsSyncArgs::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let urls = args.urls()?;
    if urls.is_empty() {
        bail!("No url given");
    }
    let number = args.number.max(1);
    if args.save.is_some() && (urls.len() > 1 || number > 1) {
        bail!("--save can only be used with a single stream");
    }

    let token = CancellationToken::new();
    let mut tasks = JoinSet::new();
    for url in urls {
        for i in 0..number {
            let delay = STAGGER_WINDOW / number * i;
            tasks.spawn(play(
                url.clone(),
                args.config(),
                args.save.clone(),
                delay,
                token.clone(),
            ));
        }
    }

    let mut failed = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !token.is_cancelled() => {
                log::info!("Interrupted, stopping.");
                token.cancel();
            }
            joined = tasks.join_next() => match joined {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    tracing::error!("{e}");
                    failed = true;
                }
                Some(Err(e)) => {
                    tracing::error!("Sync task crashed: {e}");
                    failed = true;
                }
                None => break,
            },
        }
    }

    if failed {
        bail!("Some streams could not be synchronized");
    }
    Ok(())
}
