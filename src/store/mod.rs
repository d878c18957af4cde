use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{RemoteStream, Snapshot, SnapshotSender, StreamError, Subscription};
use crate::config::Config;
use crate::model::NewListing;
use crate::store::model::{CreateListingResponse, SnapshotPayload};

pub mod model;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to reach listing store: {0}")]
    Transport(String),
    #[error("listing store error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid listing store response: {0}")]
    Response(String),
}

/// Write path for finished listings. Returns the id assigned by the store.
#[async_trait]
pub trait ListingWriter: Send + Sync {
    async fn add_listing(&self, listing: &NewListing) -> Result<String, WriteError>;
}

/// HTTP adapter for the remote listing collection of one app.
#[derive(Clone)]
pub struct ListingStoreClient {
    http: Client,
    base_url: Url,
    app_id: String,
    token: String,
    poll_interval: Duration,
}

impl fmt::Debug for ListingStoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingStoreClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl ListingStoreClient {
    pub fn new(
        base_url: Url,
        app_id: String,
        token: String,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("sport-resell/0.1")
            .no_proxy()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            app_id,
            token,
            poll_interval,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.store.base_url).context("invalid store.base_url")?;
        Self::new(
            base_url,
            cfg.app.app_id.clone(),
            cfg.store.token.clone(),
            cfg.poll_interval(),
        )
    }

    fn collection_url(&self) -> Result<Url, String> {
        self.base_url
            .join(&format!("v1/apps/{}/listings", self.app_id))
            .map_err(|e| format!("invalid listing store URL: {}", e))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.token))
        }
    }

    pub fn build_create_request(
        &self,
        listing: &NewListing,
    ) -> Result<reqwest::Request, WriteError> {
        let endpoint = self
            .collection_url()
            .map_err(WriteError::Transport)?;
        self.authorize(self.http.post(endpoint))
            .header("Content-Type", "application/json")
            .json(listing)
            .build()
            .map_err(|e| WriteError::Transport(e.to_string()))
    }

    /// Fetch the full collection. Returns the raw body alongside the decoded
    /// snapshot so the poller can detect unchanged collections.
    pub async fn fetch_snapshot(&self) -> Result<(String, Snapshot), StreamError> {
        let endpoint = self
            .collection_url()
            .map_err(StreamError::Transport)?;
        let res = self
            .authorize(self.http.get(endpoint))
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(StreamError::Transport(format!("status {}: {}", status, body)));
        }

        let payload: SnapshotPayload =
            serde_json::from_str(&body).map_err(|e| StreamError::Payload(e.to_string()))?;
        Ok((body, Snapshot::new(payload.into_records())))
    }

    async fn poll_loop(self, tx: SnapshotSender) {
        let mut last_body: Option<String> = None;
        loop {
            if tx.is_cancelled() {
                break;
            }
            let fetched = tokio::select! {
                _ = tx.cancelled() => break,
                res = self.fetch_snapshot() => res,
            };
            let delivered = match fetched {
                Ok((body, snapshot)) => {
                    if last_body.as_deref() == Some(body.as_str()) {
                        true
                    } else {
                        last_body = Some(body);
                        tx.send(Ok(snapshot)).await
                    }
                }
                Err(err) => tx.send(Err(err)).await,
            };
            if !delivered {
                break;
            }
            tokio::select! {
                _ = tx.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        debug!(app_id = %self.app_id, "snapshot poller stopped");
    }
}

#[async_trait]
impl RemoteStream for ListingStoreClient {
    async fn subscribe(&self) -> Result<Subscription, StreamError> {
        let (tx, subscription) = Subscription::channel(16);
        tokio::spawn(self.clone().poll_loop(tx));
        Ok(subscription)
    }
}

#[async_trait]
impl ListingWriter for ListingStoreClient {
    #[instrument(skip_all, fields(title = %listing.title))]
    async fn add_listing(&self, listing: &NewListing) -> Result<String, WriteError> {
        let request = self.build_create_request(listing)?;
        debug!(url = %request.url(), "sending listing create request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %body, "listing store rejected create");
            return Err(WriteError::Status { status, body });
        }

        let payload: CreateListingResponse = res
            .json()
            .await
            .map_err(|e| WriteError::Response(e.to_string()))?;
        info!(id = %payload.id, "listing created");
        Ok(payload.id)
    }
}
