pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod http;
pub mod monitor;
pub mod playlist;
pub mod scheduler;
pub mod sync;

#[cfg(test)]
mod testing;

pub use cache::{CachedSegment, SegmentCache, Storage};
pub use config::{Retention, SyncConfig};
pub use controller::PlaybackController;
pub use error::{HlsSyncError, HlsSyncResult};
pub use gate::ConsumerGate;
pub use http::{HttpClient, Transport};
pub use sync::HlsSync;

// ┌────────────────────┐  watch<Arc<MediaPlaylist>>  ┌────────────────────┐
// │                    ├─────────────────────────────►                    │
// │  PlaylistMonitor   │                             │  SegmentScheduler  │
// │                    │                             │                    │
// └─────────┬──────────┘                             └─────────┬──────────┘
//           │ reload                                           │ fetch
//           │                                                  │
// ┌─────────▼──────────┐                             ┌─────────▼──────────┐
// │                    │                             │                    │
// │     Transport      ◄─────────────────────────────┤   SegmentFetcher   │
// │                    │                             │                    │
// └────────────────────┘                             └─────────┬──────────┘
//                                                              │ insert
//                                                              │
// ┌────────────────────┐     request_segment         ┌─────────▼──────────┐
// │                    ├─────────────────────────────►                    │
// │    ConsumerGate    │                             │    SegmentCache    │
// │                    ◄─────────────────────────────┤   [pending wait]   │
// └────────────────────┘     resolve / fail          └────────────────────┘
