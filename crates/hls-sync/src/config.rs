use std::{path::PathBuf, time::Duration};

/// How many downloaded segments stay on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Never evict.
    Unbounded,
    /// Download only, nothing is written to disk.
    Discard,
    /// Keep the last `n` segments.
    Keep(u64),
}

impl Retention {
    pub fn persists(&self) -> bool {
        !matches!(self, Self::Discard)
    }

    /// Highest sequence that should be evicted once `sequence` is the newest one.
    pub fn evict_up_to(&self, sequence: u64) -> Option<u64> {
        match self {
            Self::Unbounded => None,
            Self::Discard => Some(sequence),
            Self::Keep(n) => sequence.checked_sub(*n),
        }
    }
}

impl From<i64> for Retention {
    fn from(keep: i64) -> Self {
        match keep {
            0 => Self::Discard,
            n if n < 0 => Self::Unbounded,
            n => Self::Keep(n as u64),
        }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self::Keep(3)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Working directory for downloaded segments. A temporary directory is used when unset.
    pub path: Option<PathBuf>,
    /// Referer header sent with every request.
    pub referer: Option<String>,
    /// Target bitrate used to pick a variant from a master playlist.
    pub bitrate: u64,
    pub retention: Retention,
    /// Number of segments fetched back to back before pacing at playback speed.
    pub buffer: usize,

    /// Period between two reloads of a live playlist.
    pub reload_interval: Duration,
    /// Ceiling of the delay between failed reloads.
    pub max_reload_backoff: Duration,
    /// Consecutive reload failures tolerated before giving up.
    pub max_reload_failures: u32,
    /// Extra attempts for a failed segment download.
    pub segment_retries: u32,
    /// A live stream starts this many segments before the end of the playlist.
    pub live_edge_segments: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            path: None,
            referer: None,
            bitrate: 200000,
            retention: Retention::default(),
            buffer: 3,

            reload_interval: Duration::from_secs(10),
            max_reload_backoff: Duration::from_secs(30),
            max_reload_failures: 10,
            segment_retries: 3,
            live_edge_segments: 3,
        }
    }
}

impl SyncConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_retention(mut self, retention: impl Into<Retention>) -> Self {
        self.retention = retention.into();
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    pub fn with_max_reload_backoff(mut self, backoff: Duration) -> Self {
        self.max_reload_backoff = backoff;
        self
    }

    pub fn with_max_reload_failures(mut self, failures: u32) -> Self {
        self.max_reload_failures = failures;
        self
    }

    pub fn with_segment_retries(mut self, retries: u32) -> Self {
        self.segment_retries = retries;
        self
    }

    pub fn with_live_edge_segments(mut self, segments: usize) -> Self {
        self.live_edge_segments = segments;
        self
    }

    /// Consecutive reload failures after which the playlist is given up.
    /// At least one failure is always needed.
    pub fn reload_failure_limit(&self) -> u32 {
        self.max_reload_failures.max(1)
    }
}
