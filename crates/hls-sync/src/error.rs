use thiserror::Error;

#[derive(Error, Debug)]
pub enum HlsSyncError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid m3u8 file: {0}")]
    M3u8ParseError(String),

    #[error("Master playlist does not contain any playable variant")]
    NoVariant,

    #[error("Too many nested master playlists")]
    NestedMasterPlaylist,

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error("Playlist reload failed {0} times in a row")]
    ReloadFailed(u32),

    /// The playlist reached its end and every segment has been delivered.
    #[error("End of media")]
    EndOfMedia,

    #[error("Segment request was superseded by a newer one")]
    WaitSuperseded,

    #[error("Synchronization stopped")]
    Stopped,

    #[error("Synchronization already started")]
    AlreadyStarted,
}

impl HlsSyncError {
    /// Whether the error came from the network rather than from parsing or storage.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::RequestError(_))
    }

    /// Whether the engine itself ended or refused the request, as opposed to a
    /// single segment that could not be downloaded or stored.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::ReloadFailed(_)
                | Self::EndOfMedia
                | Self::WaitSuperseded
                | Self::Stopped
                | Self::AlreadyStarted
        )
    }
}

pub type HlsSyncResult<T> = Result<T, HlsSyncError>;
