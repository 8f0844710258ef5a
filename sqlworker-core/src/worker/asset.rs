use std::fs;
use std::path::Path;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Response, StatusCode};

use crate::config::AssetFetchConfig;
use crate::error::{BridgeError, BridgeResult};

/// Loads asset databases for `importAssetDatabase`.
///
/// `http://` and `https://` locations are downloaded with retries for
/// transient failures; `file://` URLs and plain paths are read from disk.
pub struct AssetFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl AssetFetcher {
    /// Creates a fetcher tuned by `config`.
    pub fn new(config: &AssetFetchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// Returns the bytes at `location`.
    ///
    /// Blocks the calling thread; must not be called from inside an async
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Network`] for download failures, [`BridgeError::Io`]
    /// for local reads.
    pub fn fetch(&self, location: &str) -> BridgeResult<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            return runtime.block_on(self.download(location));
        }
        let path = location.strip_prefix("file://").unwrap_or(location);
        Ok(fs::read(Path::new(path))?)
    }

    async fn download(&self, url: &str) -> BridgeResult<Vec<u8>> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        let response = (|| self.attempt(url))
            .retry(backoff)
            .when(FetchError::is_retryable)
            .notify(|err: &FetchError, delay: Duration| {
                log::warn!("retrying {url} in {delay:?}: {}", err.error);
            })
            .await
            .map_err(|err| err.into_bridge(url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Network {
                url: url.to_string(),
                status: Some(status.as_u16()),
                error: format!("Failed to fetch asset database: {status}"),
            });
        }
        let bytes = response.bytes().await.map_err(|err| BridgeError::Network {
            url: url.to_string(),
            status: Some(status.as_u16()),
            error: format!("failed to read response body: {err}"),
        })?;
        log::debug!("fetched {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }

    /// A single GET of `url`. Throttling, server errors, timeouts and refused
    /// connections come back as retryable errors.
    async fn attempt(&self, url: &str) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("sqlworker-core/{}", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .await
            .map_err(|err| FetchError {
                status: None,
                error: format!("request failed: {err}"),
                retryable: err.is_timeout() || err.is_connect(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError {
                status: Some(status.as_u16()),
                error: format!("Failed to fetch asset database: {status}"),
                retryable: true,
            });
        }
        Ok(response)
    }
}

impl std::fmt::Debug for AssetFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetFetcher")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Failure of one download attempt.
#[derive(Debug)]
struct FetchError {
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl FetchError {
    const fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn into_bridge(self, url: &str) -> BridgeError {
        BridgeError::Network {
            url: url.to_string(),
            status: self.status,
            error: self.error,
        }
    }
}
