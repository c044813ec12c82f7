//! Data sources and the ordered chain a poller fetches through.

use crate::upstream::{UpstreamError, read_json};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::{fmt, marker::PhantomData, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Failure of a single source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("not configured")]
    NotConfigured,

    #[error("{0}")]
    Failed(String),
}

impl From<UpstreamError> for SourceError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotConfigured { .. } => SourceError::NotConfigured,
            other => SourceError::Failed(other.to_string()),
        }
    }
}

/// One way of obtaining a `T`.
#[async_trait]
pub trait DataSource<T>: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<T, SourceError>;
}

/// GET a JSON document from `url` with its own deadline.
///
/// A 503 reply is how the proxy endpoints say their upstream is not configured, so it is read
/// as [`SourceError::NotConfigured`] rather than a failure.
pub struct HttpSource<T> {
    name: String,
    http: reqwest::Client,
    url: Url,
    timeout: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HttpSource<T> {
    pub fn new(name: impl Into<String>, http: reqwest::Client, url: Url, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            http,
            url,
            timeout,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> DataSource<T> for HttpSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(source = %self.name, url = %self.url), err)]
    async fn fetch(&self) -> Result<T, SourceError> {
        let response = self
            .http
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(&self.name, e))?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Err(SourceError::NotConfigured);
        }

        Ok(read_json(&self.name, response).await?)
    }
}

/// Why one source in a chain did not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// Outcome of a chain where no source produced a value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// No sources, or every source reported it is not configured
    #[error("not configured")]
    NotConfigured,

    /// At least one source was configured and every configured source failed
    #[error("all sources failed: {}", join_failures(.0))]
    Exhausted(Vec<SourceFailure>),
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Sources tried in order until one succeeds.
pub struct SourceChain<T> {
    sources: Vec<Arc<dyn DataSource<T>>>,
}

impl<T> Default for SourceChain<T> {
    fn default() -> Self {
        Self { sources: Vec::new() }
    }
}

impl<T> SourceChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl DataSource<T> + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub async fn fetch(&self) -> Result<T, ChainError> {
        let mut failures = Vec::new();

        for source in &self.sources {
            match source.fetch().await {
                Ok(value) => return Ok(value),
                Err(SourceError::NotConfigured) => {
                    debug!(source = source.name(), "Source not configured, trying next");
                }
                Err(SourceError::Failed(reason)) => {
                    debug!(source = source.name(), %reason, "Source failed, trying next");
                    failures.push(SourceFailure {
                        source: source.name().to_string(),
                        reason,
                    });
                }
            }
        }

        if failures.is_empty() {
            Err(ChainError::NotConfigured)
        } else {
            Err(ChainError::Exhausted(failures))
        }
    }
}
