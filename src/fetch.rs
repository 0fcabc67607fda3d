//! Upstream fetching.
//!
//! [`SourceFetcher`] is the seam between the handler and the network. The
//! production implementation, [`HttpFetcher`], is a reqwest client with
//! automatic redirects disabled: it follows redirects itself so every hop can
//! be re-checked by the same [`SourceValidator`] that admitted the original
//! source. Bodies are streamed and capped at a configured size, and the whole
//! exchange (all hops plus the body) runs under one deadline.

use crate::validate::{SourceValidator, ValidationError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Upstream body plus the header the handler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSource {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream returned {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("upstream body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("redirect to {location} rejected: {reason}")]
    RedirectRejected {
        location: String,
        reason: ValidationError,
    },
    #[error("more than {0} redirects")]
    TooManyRedirects(usize),
}

/// Retrieves source image bytes.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedSource, FetchError>;
}

/// Bounds on a single upstream fetch.
#[derive(Debug, Clone)]
pub struct FetchLimits {
    pub timeout: Duration,
    pub max_bytes: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 50 * 1024 * 1024,
            max_redirects: 10,
            user_agent: concat!("pixgate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
    validator: SourceValidator,
    limits: FetchLimits,
}

impl HttpFetcher {
    pub fn new(limits: FetchLimits, validator: SourceValidator) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(limits.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(limits.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            validator,
            limits,
        })
    }

    async fn fetch_following_redirects(&self, url: &Url) -> Result<FetchedSource, FetchError> {
        let mut current = url.clone();
        for _ in 0..=self.limits.max_redirects {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| self.transport(&current, e))?;
            let status = response.status();

            if status.is_redirection()
                && let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
            {
                let rejected = |reason: ValidationError| FetchError::RedirectRejected {
                    location: location.to_string(),
                    reason,
                };
                let next = current.join(location).map_err(|e| rejected(e.into()))?;
                self.validator.check(&next).map_err(rejected)?;
                debug!("Following redirect {} -> {}", current, next);
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status {
                    status,
                    url: current.to_string(),
                });
            }
            return self.read_body(response, &current).await;
        }
        Err(FetchError::TooManyRedirects(self.limits.max_redirects))
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
        url: &Url,
    ) -> Result<FetchedSource, FetchError> {
        let limit = self.limits.max_bytes;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if response.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }
        let mut buffer = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport(url, e))? {
            if (buffer.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        debug!("Fetched {} ({} bytes)", url, buffer.len());
        Ok(FetchedSource {
            bytes: buffer.freeze(),
            content_type,
        })
    }

    fn transport(&self, url: &Url, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout(self.limits.timeout)
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedSource, FetchError> {
        tokio::time::timeout(self.limits.timeout, self.fetch_following_redirects(url))
            .await
            .map_err(|_| FetchError::Timeout(self.limits.timeout))?
    }
}
