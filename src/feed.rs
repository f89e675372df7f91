use std::collections::BTreeSet;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{FeedDeliveryError, SharedLedger, TransportError};
use crate::model::{ChangeEvent, FeedMessage};

/// Stream of feed messages. Adapters that decode documents themselves surface
/// undecodable ones as `Err`, which the subscription logs and skips.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<FeedMessage, FeedDeliveryError>> + Send>>;

/// Which facilities a subscription covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacilityScope {
    All,
    Only(BTreeSet<String>),
}

impl FacilityScope {
    pub fn facility(id: impl Into<String>) -> Self {
        FacilityScope::Only(BTreeSet::from([id.into()]))
    }

    pub fn contains(&self, facility_id: &str) -> bool {
        match self {
            FacilityScope::All => true,
            FacilityScope::Only(ids) => ids.contains(facility_id),
        }
    }

    /// The single facility this scope names, if it names exactly one.
    pub fn single(&self) -> Option<&str> {
        match self {
            FacilityScope::Only(ids) if ids.len() == 1 => ids.iter().next().map(String::as_str),
            _ => None,
        }
    }
}

/// Push-based change feed supplied by the backing store.
///
/// A fresh stream starts with a full snapshot (`FeedMessage::Reset`) and then
/// delivers live changes in the store's commit order.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, scope: FacilityScope) -> Result<FeedStream, TransportError>;
}

/// Decode one JSON change document, for adapters whose store hands out raw JSON.
pub fn decode_change(json: &str) -> Result<FeedMessage, FeedDeliveryError> {
    serde_json::from_str::<ChangeEvent>(json)
        .map(FeedMessage::Change)
        .map_err(|e| FeedDeliveryError::Undecodable(e.to_string()))
}

/// Live subscription feeding one session's ledger.
///
/// Dropping the handle cancels the subscription; [`Subscription::unsubscribe`]
/// additionally waits for the driver task to finish.
pub struct Subscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    progress: watch::Receiver<u64>,
}

impl Subscription {
    pub(crate) fn spawn(stream: FeedStream, ledger: SharedLedger) -> Self {
        let cancel = CancellationToken::new();
        let (progress_tx, progress) = watch::channel(0);
        metrics::gauge!(crate::observability::SUBSCRIPTIONS_ACTIVE).increment(1.0);
        let task = tokio::spawn(drive(stream, ledger, cancel.clone(), progress_tx));
        Self {
            cancel,
            task: Some(task),
            progress,
        }
    }

    /// False once cancelled or once the feed has ended.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Number of feed messages handled so far (applied or skipped).
    pub fn progress(&self) -> watch::Receiver<u64> {
        self.progress.clone()
    }

    /// Wait until at least `count` messages have been handled. Returns false if
    /// the subscription ended first.
    pub async fn wait_for(&self, count: u64) -> bool {
        let mut rx = self.progress.clone();
        rx.wait_for(|n| *n >= count).await.is_ok()
    }

    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("feed subscription task failed: {e}");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Apply feed messages to the ledger one at a time, in delivery order.
async fn drive(
    mut stream: FeedStream,
    ledger: SharedLedger,
    cancel: CancellationToken,
    progress: watch::Sender<u64>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("feed subscription cancelled");
                break;
            }
            next = stream.next() => {
                match next {
                    Some(Ok(message)) => {
                        let is_reset = matches!(message, FeedMessage::Reset(_));
                        let mut guard = ledger.write().await;
                        match guard.apply(message) {
                            Ok(()) if is_reset => info!("ledger rebuilt: {} live records", guard.len()),
                            Ok(()) => {}
                            Err(e) => {
                                warn!("skipping feed event: {e}");
                                metrics::counter!(crate::observability::FEED_EVENTS_SKIPPED_TOTAL).increment(1);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!("skipping feed event: {e}");
                        metrics::counter!(crate::observability::FEED_EVENTS_SKIPPED_TOTAL).increment(1);
                    }
                    None => {
                        info!("feed ended; ledger keeps its last view");
                        break;
                    }
                }
                progress.send_modify(|n| *n += 1);
            }
        }
    }
    metrics::gauge!(crate::observability::SUBSCRIPTIONS_ACTIVE).decrement(1.0);
}
