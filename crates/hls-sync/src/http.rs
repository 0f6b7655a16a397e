use std::{future::Future, sync::Arc};

use bytes::Bytes;
use reqwest::{header::REFERER, Client, ClientBuilder, Url};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::error::{HlsSyncError, HlsSyncResult};

/// When this variable is present, the cookie jar is emptied before every request.
pub const RESET_COOKIES_ENV: &str = "HLS_RESET_COOKIES";

/// Network side of the engine: fetches the body behind an url.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, url: Url) -> impl Future<Output = HlsSyncResult<Bytes>> + Send;
}

/// HTTP session shared by playlist reloads and segment downloads.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
    referer: Option<String>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> HlsSyncResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
            referer: None,
        })
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    pub fn reset_cookies(&self) {
        let mut lock = self
            .cookies_store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *lock = CookieStore::default();
    }

    /// Number of cookies that would be sent to `url`.
    pub fn cookie_count(&self, url: &Url) -> usize {
        let lock = self
            .cookies_store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lock.matches(url).len()
    }
}

impl Transport for HttpClient {
    async fn get(&self, url: Url) -> HlsSyncResult<Bytes> {
        if std::env::var_os(RESET_COOKIES_ENV).is_some() {
            self.reset_cookies();
        }

        let mut request = self.client.get(url.clone());
        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.inspect_err(|e| {
            log::error!("Request to {url} failed: {e}");
        })?;
        if !response.status().is_success() {
            let status = response.status();
            log::warn!("{url} responded with {status}");
            return Err(HlsSyncError::HttpError(status));
        }

        let bytes = response.bytes().await?;
        log::debug!("Received {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}
