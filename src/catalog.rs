//! Live catalog view fed by a remote snapshot stream.
//!
//! Each snapshot replaces the view wholesale with a freshly reconciled,
//! immutable [`CatalogView`]. Stream errors keep the last good view.
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::model::{ListingRecord, Session};
use crate::reconcile::reconcile_snapshot;

/// Complete point-in-time listing of remote records, not a delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub records: Vec<Value>,
}

impl Snapshot {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream transport error: {0}")]
    Transport(String),
    #[error("invalid snapshot payload: {0}")]
    Payload(String),
}

pub type StreamEvent = Result<Snapshot, StreamError>;

/// Source of full snapshots of the remote listing collection.
#[async_trait]
pub trait RemoteStream: Send + Sync {
    async fn subscribe(&self) -> Result<Subscription, StreamError>;
}

/// Receiving half of a stream subscription. Cancelling (or dropping) it
/// tells the producer to stop.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

/// Producer half handed to the stream implementation.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn channel(buffer: usize) -> (SnapshotSender, Subscription) {
        let (tx, events) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        (
            SnapshotSender {
                tx,
                cancel: cancel.clone(),
            },
            Subscription { events, cancel },
        )
    }

    /// Next event in delivery order, or `None` once cancelled or closed.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            ev = self.events.recv() => ev,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SnapshotSender {
    /// Deliver an event. Returns false once the subscriber has gone away.
    pub async fn send(&self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Immutable reconciled catalog, tagged with a generation number.
#[derive(Debug, Clone)]
pub struct CatalogView {
    generation: u64,
    records: Arc<[ListingRecord]>,
}

impl CatalogView {
    pub fn new(generation: u64, records: Vec<ListingRecord>) -> Self {
        Self {
            generation,
            records: records.into(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owner of the current catalog view.
#[derive(Debug)]
pub struct LiveCatalog {
    seed: Vec<ListingRecord>,
    view_tx: watch::Sender<CatalogView>,
}

impl LiveCatalog {
    /// Start with a view holding only the seed records.
    pub fn new(seed: Vec<ListingRecord>) -> Self {
        let initial = CatalogView::new(0, reconcile_snapshot(&[], &seed));
        let (view_tx, _) = watch::channel(initial);
        Self { seed, view_tx }
    }

    pub fn view(&self) -> CatalogView {
        self.view_tx.borrow().clone()
    }

    /// Observers may see only the latest view; intermediate ones can be coalesced.
    pub fn watch(&self) -> watch::Receiver<CatalogView> {
        self.view_tx.subscribe()
    }

    /// Apply one stream event. Returns true when the view was replaced.
    pub fn apply(&self, event: StreamEvent) -> bool {
        match event {
            Ok(snapshot) => {
                let records = reconcile_snapshot(&snapshot.records, &self.seed);
                let generation = self.view_tx.borrow().generation() + 1;
                debug!(
                    generation,
                    incoming = snapshot.records.len(),
                    records = records.len(),
                    "catalog view reconciled"
                );
                self.view_tx
                    .send_replace(CatalogView::new(generation, records));
                true
            }
            Err(err) => {
                warn!(%err, "remote stream error; reconciliation skipped");
                false
            }
        }
    }

    /// Subscribe to `stream` and apply snapshots until the stream ends or
    /// `shutdown` fires. The subscription is cancelled on return.
    #[instrument(skip_all)]
    pub async fn follow(
        &self,
        stream: &dyn RemoteStream,
        shutdown: CancellationToken,
    ) -> Result<(), StreamError> {
        let mut subscription = stream.subscribe().await?;
        info!("subscribed to remote listings");
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                ev = subscription.next() => ev,
            };
            match event {
                Some(ev) => {
                    self.apply(ev);
                }
                None => break,
            }
        }
        subscription.cancel();
        info!("remote listings subscription closed");
        Ok(())
    }

    /// [`follow`](Self::follow) for a signed-in user. Without a session the
    /// stream is never subscribed and the view stays at the seed catalog.
    /// Returns whether the stream was followed.
    pub async fn follow_if_authenticated(
        &self,
        session: Option<&Session>,
        stream: &dyn RemoteStream,
        shutdown: CancellationToken,
    ) -> Result<bool, StreamError> {
        let Some(session) = session else {
            warn!("no session; showing seed catalog only");
            return Ok(false);
        };
        info!(user = session.user_id(), "following remote listings");
        self.follow(stream, shutdown).await?;
        Ok(true)
    }
}
