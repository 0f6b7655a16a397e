use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use bytes::Bytes;
use reqwest::StatusCode;
use tokio::time::Instant;
use url::Url;

use crate::{
    error::{HlsSyncError, HlsSyncResult},
    http::Transport,
};

#[derive(Clone)]
enum Response {
    Body(Bytes),
    Status(StatusCode),
}

/// In-memory transport. Responses registered for an url are served in order,
/// the last one is repeated forever. Unknown urls answer 404.
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Response>>>,
    requests: Mutex<Vec<(Instant, String)>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, url: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub(crate) fn respond(&self, url: &str, body: impl Into<String>) {
        self.push(url, Response::Body(Bytes::from(body.into())));
    }

    pub(crate) fn respond_status(&self, url: &str, status: StatusCode) {
        self.push(url, Response::Status(status));
    }

    pub(crate) fn request_count(&self, url: &str) -> usize {
        self.request_times(url).len()
    }

    pub(crate) fn request_times(&self, url: &str) -> Vec<Instant> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| u == url)
            .map(|(at, _)| *at)
            .collect()
    }
}

impl Transport for MockTransport {
    async fn get(&self, url: Url) -> HlsSyncResult<Bytes> {
        let url = url.to_string();
        self.requests
            .lock()
            .unwrap()
            .push((Instant::now(), url.clone()));

        let response = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match response {
            Some(Response::Body(body)) => Ok(body),
            Some(Response::Status(status)) => Err(HlsSyncError::HttpError(status)),
            None => Err(HlsSyncError::HttpError(StatusCode::NOT_FOUND)),
        }
    }
}

/// A media playlist body with segments `first..first + count` named `seg{n}.ts`.
pub(crate) fn media_playlist(first: u64, count: u64, duration: f32, end: bool) -> String {
    let mut body = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{}\n#EXT-X-MEDIA-SEQUENCE:{first}\n",
        duration.ceil() as u64
    );
    for sequence in first..first + count {
        body.push_str(&format!("#EXTINF:{duration:.3},\nseg{sequence}.ts\n"));
    }
    if end {
        body.push_str("#EXT-X-ENDLIST\n");
    }
    body
}
