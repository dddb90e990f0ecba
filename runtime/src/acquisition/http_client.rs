//! Async HTTP client wrapping reqwest.
//!
//! Fetches the statistics page with a hard per-fetch deadline, retrying on
//! 5xx and backing off on 429 while the deadline allows.

use std::time::Duration;

use tracing::debug;

/// Why a fetch produced no document.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("fetching {url} timed out after {}s", .after.as_secs())]
    Timeout { url: String, after: Duration },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// HTTP client for the statistics source.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl HttpClient {
    /// Create a client whose fetches never take longer than `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let ua = concat!("statwatch/", env!("CARGO_PKG_VERSION"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            timeout,
            max_retries: 2,
        })
    }

    /// Override how many times a failed request is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and return the body. Retries all happen inside the deadline.
    pub async fn get(&self, url: &str) -> Result<String, FetchError> {
        match tokio::time::timeout(self.timeout, self.get_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }),
        }
    }

    async fn get_inner(&self, url: &str) -> Result<String, FetchError> {
        let mut retries = 0u32;

        loop {
            let resp = self.client.get(url).send().await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();

                    // Retry on 5xx
                    if status >= 500 && retries < self.max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        debug!("{url} answered {status}, retry {retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < self.max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        let delay = Duration::from_secs(retry_after.min(10));
                        debug!("{url} rate limited, retry {retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if !r.status().is_success() {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status,
                        });
                    }

                    return r.text().await.map_err(|source| FetchError::Transport {
                        url: url.to_string(),
                        source,
                    });
                }
                Err(source) => {
                    if retries < self.max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        debug!("request to {url} failed ({source}), retry {retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }
}
