use std::time::Duration;

use url::Url;

use crate::error::{HlsSyncError, HlsSyncResult};

/// Reload delay used when the playlist does not tell us anything better.
pub const DEFAULT_RELOAD_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub enum Playlist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

impl Playlist {
    /// Parse a playlist body downloaded from `url`.
    pub fn parse(url: Url, bytes: &[u8]) -> HlsSyncResult<Self> {
        let parsed = m3u8_rs::parse_playlist_res(bytes)
            .map_err(|e| HlsSyncError::M3u8ParseError(e.to_string()))?;

        Ok(match parsed {
            m3u8_rs::Playlist::MasterPlaylist(pl) => Self::Master(MasterPlaylist {
                url,
                variants: pl
                    .variants
                    .into_iter()
                    .filter(|v| !v.is_i_frame)
                    .map(|v| Variant {
                        uri: v.uri,
                        bandwidth: v.bandwidth,
                    })
                    .collect(),
            }),
            m3u8_rs::Playlist::MediaPlaylist(pl) => {
                let media_sequence = pl.media_sequence;
                Self::Media(MediaPlaylist {
                    url,
                    target_duration: Duration::try_from_secs_f64(pl.target_duration as f64)
                        .unwrap_or_default(),
                    media_sequence,
                    segments: pl
                        .segments
                        .into_iter()
                        .enumerate()
                        .map(|(i, s)| SegmentDescriptor {
                            sequence: media_sequence + i as u64,
                            uri: s.uri,
                            duration: s.duration,
                        })
                        .collect(),
                    end_of_stream: pl.end_list,
                })
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub uri: String,
    pub bandwidth: u64,
}

#[derive(Debug, Clone)]
pub struct MasterPlaylist {
    pub url: Url,
    pub variants: Vec<Variant>,
}

impl MasterPlaylist {
    /// The variant with the bandwidth closest to `bitrate`, the lower one on a tie.
    pub fn select_variant(&self, bitrate: u64) -> Option<&Variant> {
        self.variants
            .iter()
            .min_by_key(|v| (v.bandwidth.abs_diff(bitrate), v.bandwidth))
    }

    pub fn variant_url(&self, variant: &Variant) -> HlsSyncResult<Url> {
        Ok(self.url.join(&variant.uri)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDescriptor {
    pub sequence: u64,
    /// Segment uri as written in the playlist, possibly relative.
    pub uri: String,
    /// Duration in seconds.
    pub duration: f32,
}

impl SegmentDescriptor {
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f32(self.duration).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub url: Url,
    pub target_duration: Duration,
    pub media_sequence: u64,
    pub segments: Vec<SegmentDescriptor>,
    /// `#EXT-X-ENDLIST` was present, no segment will be appended anymore.
    pub end_of_stream: bool,
}

impl MediaPlaylist {
    /// First segment to download when nothing has been downloaded yet.
    ///
    /// A finished playlist is played from its beginning. A live one starts
    /// `live_edge` segments before its end, or from the beginning when
    /// `live_edge` is zero.
    pub fn start_position(&self, live_edge: usize) -> Option<&SegmentDescriptor> {
        if self.end_of_stream || live_edge == 0 {
            return self.segments.first();
        }

        let index = self.segments.len().saturating_sub(live_edge);
        self.segments.get(index)
    }

    /// The segment following `last`, which is the sequence downloaded most recently.
    pub fn next_after(&self, last: Option<u64>, live_edge: usize) -> Option<&SegmentDescriptor> {
        match last {
            None => self.start_position(live_edge),
            Some(last) => self.segments.iter().find(|s| s.sequence > last),
        }
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.segments.last().map(|s| s.sequence)
    }

    pub fn segment_url(&self, segment: &SegmentDescriptor) -> HlsSyncResult<Url> {
        Ok(self.url.join(&segment.uri)?)
    }

    /// Delay before retrying a reload that failed or returned the same content.
    pub fn suggested_reload_delay(&self) -> Duration {
        if self.target_duration.is_zero() {
            DEFAULT_RELOAD_DELAY
        } else {
            self.target_duration
        }
    }
}

/// File name used to store a segment: the last path component of its url.
pub fn segment_file_name(url: &Url, sequence: u64) -> String {
    url.path_segments()
        .and_then(|mut c| c.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("segment_{sequence}.ts"))
}
