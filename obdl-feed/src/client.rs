//! HTTP client for the OBD logger backend
//!
//! Endpoints used:
//! - `GET /events` - full status snapshot (EventKey → `{status}`)
//! - `DELETE /events/remove/{key}` - drop an event, response body ignored
//! - `GET /plots/{heatmap|trend}_{SafeKey}.png` - artifact images for done events
//! - `GET /health` - liveness probe

use crate::error::{FeedError, FeedResult};
use async_trait::async_trait;
use obdl_common::timestamp::{to_artifact_ref, ArtifactKind};
use obdl_common::{Error, EventKey, Snapshot};
use reqwest::{Client, Response, Url};
use std::time::Duration;
use tracing::debug;

/// Operations the reconciliation engine needs from the backend
///
/// Implemented over HTTP by [`HttpFeedClient`]; tests substitute scripted
/// implementations.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch the current snapshot of all tracked events
    async fn fetch_snapshot(&self) -> FeedResult<Snapshot>;

    /// Ask the backend to forget an event
    async fn delete_event(&self, key: &EventKey) -> FeedResult<()>;

    /// Download one artifact image
    async fn fetch_artifact(&self, kind: ArtifactKind, key: &EventKey) -> FeedResult<Vec<u8>>;

    /// Liveness probe
    async fn health(&self) -> FeedResult<()>;
}

/// reqwest-backed [`FeedClient`]
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    http: Client,
    base_url: Url,
}

impl HttpFeedClient {
    /// Create a client for the backend at `base_url`
    ///
    /// `timeout` bounds every request issued by this client.
    pub fn new(base_url: &str, timeout: Duration) -> FeedResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid feed URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Feed URL '{}' cannot be a base", base_url)).into());
        }

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("obdl-feed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, escaping each one
    fn endpoint(&self, segments: &[&str]) -> FeedResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Feed URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn events_url(&self) -> FeedResult<Url> {
        self.endpoint(&["events"])
    }

    pub fn remove_url(&self, key: &EventKey) -> FeedResult<Url> {
        self.endpoint(&["events", "remove", key.as_str()])
    }

    pub fn artifact_url(&self, kind: ArtifactKind, key: &EventKey) -> FeedResult<Url> {
        let file = format!("{}_{}.png", kind.prefix(), to_artifact_ref(key.as_str()));
        self.endpoint(&["plots", &file])
    }

    fn check_status(response: Response) -> FeedResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(FeedError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            })
        }
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_snapshot(&self) -> FeedResult<Snapshot> {
        let url = self.events_url()?;
        let response = Self::check_status(self.http.get(url).send().await?)?;
        let body = response.bytes().await?;

        let snapshot: Snapshot = serde_json::from_slice(&body)
            .map_err(|e| FeedError::Decode(format!("GET /events: {}", e)))?;
        debug!(events = snapshot.len(), "Fetched event snapshot");
        Ok(snapshot)
    }

    async fn delete_event(&self, key: &EventKey) -> FeedResult<()> {
        let url = self.remove_url(key)?;
        Self::check_status(self.http.delete(url).send().await?)?;
        debug!(key = %key, "Backend accepted event removal");
        Ok(())
    }

    async fn fetch_artifact(&self, kind: ArtifactKind, key: &EventKey) -> FeedResult<Vec<u8>> {
        let url = self.artifact_url(kind, key)?;
        let response = Self::check_status(self.http.get(url).send().await?)?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn health(&self) -> FeedResult<()> {
        let url = self.endpoint(&["health"])?;
        Self::check_status(self.http.get(url).send().await?)?;
        Ok(())
    }
}
