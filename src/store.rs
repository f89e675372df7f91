use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::{EngineError, FeedDeliveryError, TransportError, check_record};
use crate::feed::{ChangeFeed, FacilityScope, FeedStream};
use crate::model::*;
use crate::notify::FeedHub;

/// A reservation as handed to the backing store. The store assigns id and
/// creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSubmission {
    pub slot: SlotKey,
    pub requester_name: String,
    pub requester_contact: String,
    pub party_size: u32,
    pub notes: Option<String>,
    /// Initial status. Member requests always start `pending`.
    pub status: ReservationStatus,
}

/// Durable, optimistic write of a new reservation.
#[async_trait]
pub trait ReservationSink: Send + Sync {
    async fn submit(&self, submission: ReservationSubmission) -> Result<ReservationId, TransportError>;
}

/// Outcome of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    /// Already in the requested status; nothing was written.
    Unchanged,
}

/// Staff-side status changes: `pending -> confirmed` and `-> cancelled`.
#[async_trait]
pub trait StatusAdmin: Send + Sync {
    async fn set_status(
        &self,
        id: &str,
        status: ReservationStatus,
    ) -> Result<Transition, EngineError>;
}

/// Transitions staff may make. Same-status requests are handled before this.
pub fn transition_allowed(from: ReservationStatus, to: ReservationStatus) -> bool {
    use ReservationStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled)
    )
}

// ── In-memory backing store ──────────────────────────────────────

struct StoreInner {
    /// Keyed by ulid string, so iteration follows creation order.
    records: RwLock<BTreeMap<ReservationId, ReservationRecord>>,
    hub: FeedHub,
    failures_pending: AtomicU32,
}

/// In-process backing store: optimistic writes, per-facility fan-out, and
/// snapshot-then-live subscriptions. Clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                records: RwLock::new(BTreeMap::new()),
                hub: FeedHub::new(),
                failures_pending: AtomicU32::new(0),
            }),
        }
    }

    /// Load existing records (e.g. from a seed file). Malformed records are
    /// skipped; returns how many were loaded.
    pub async fn seed(&self, records: Vec<ReservationRecord>) -> usize {
        let mut guard = self.inner.records.write().await;
        let mut loaded = 0;
        for record in records {
            if let Err(e) = check_record(&record) {
                warn!("seed: skipping record: {e}");
                continue;
            }
            let event = ChangeEvent {
                kind: ChangeKind::Added,
                record: record.clone(),
            };
            guard.insert(record.id.clone(), record);
            self.inner.hub.send(&event);
            loaded += 1;
        }
        loaded
    }

    /// Make the next `n` writes fail with a transport error.
    pub fn fail_next_writes(&self, n: u32) {
        self.inner.failures_pending.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.inner
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Every record the store holds, cancelled ones included, in creation order.
    pub async fn records(&self) -> Vec<ReservationRecord> {
        self.inner.records.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<ReservationRecord> {
        self.inner.records.read().await.get(id).cloned()
    }

    /// Hard-delete a record, emitting `removed`.
    pub async fn delete(&self, id: &str) -> Result<(), EngineError> {
        let mut guard = self.inner.records.write().await;
        let record = guard
            .remove(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        self.inner.hub.send(&ChangeEvent {
            kind: ChangeKind::Removed,
            record,
        });
        Ok(())
    }

    /// Subscribe and snapshot under one read lock, so no write can land
    /// between the two.
    async fn snapshot_and_subscribe(
        &self,
        scope: &FacilityScope,
    ) -> (Vec<ReservationRecord>, broadcast::Receiver<ChangeEvent>) {
        let guard = self.inner.records.read().await;
        self.inner.hub.prune();
        let rx = self.inner.hub.subscribe(scope);
        let snapshot = guard
            .values()
            .filter(|r| scope.contains(&r.slot.facility_id))
            .cloned()
            .collect();
        (snapshot, rx)
    }
}

struct LiveFeed {
    store: MemoryStore,
    scope: FacilityScope,
    rx: broadcast::Receiver<ChangeEvent>,
    pending_reset: Option<Vec<ReservationRecord>>,
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self, scope: FacilityScope) -> Result<FeedStream, TransportError> {
        let (snapshot, rx) = self.snapshot_and_subscribe(&scope).await;
        let state = LiveFeed {
            store: self.clone(),
            scope,
            rx,
            pending_reset: Some(snapshot),
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            if let Some(records) = st.pending_reset.take() {
                return Some((Ok::<_, FeedDeliveryError>(FeedMessage::Reset(records)), st));
            }
            loop {
                match st.rx.recv().await {
                    Ok(event) if st.scope.contains(&event.record.slot.facility_id) => {
                        return Some((Ok(FeedMessage::Change(event)), st));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Missed events cannot be replayed; start over from a snapshot.
                        warn!("feed lagged by {missed} events, resending snapshot");
                        let (snapshot, rx) = st.store.snapshot_and_subscribe(&st.scope).await;
                        st.rx = rx;
                        return Some((Ok(FeedMessage::Reset(snapshot)), st));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ReservationSink for MemoryStore {
    /// Written as given, with no slot check: conflicts are for staff to resolve.
    async fn submit(&self, submission: ReservationSubmission) -> Result<ReservationId, TransportError> {
        if self.take_failure() {
            return Err(TransportError::new("backing store unavailable"));
        }
        let record = ReservationRecord {
            id: Ulid::new().to_string(),
            slot: submission.slot,
            status: submission.status,
            requester_name: submission.requester_name,
            requester_contact: submission.requester_contact,
            party_size: submission.party_size,
            created_at: Utc::now(),
            notes: submission.notes,
        };
        check_record(&record).map_err(|e| TransportError::new(format!("rejected: {e}")))?;

        let mut guard = self.inner.records.write().await;
        let id = record.id.clone();
        guard.insert(id.clone(), record.clone());
        self.inner.hub.send(&ChangeEvent {
            kind: ChangeKind::Added,
            record,
        });
        info!("stored reservation {id}");
        Ok(id)
    }
}

#[async_trait]
impl StatusAdmin for MemoryStore {
    async fn set_status(
        &self,
        id: &str,
        status: ReservationStatus,
    ) -> Result<Transition, EngineError> {
        if self.take_failure() {
            return Err(TransportError::new("backing store unavailable").into());
        }
        let mut guard = self.inner.records.write().await;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if record.status == status {
            return Ok(Transition::Unchanged);
        }
        if !transition_allowed(record.status, status) {
            return Err(EngineError::InvalidTransition {
                from: record.status,
                to: status,
            });
        }
        record.status = status;
        let event = ChangeEvent {
            kind: ChangeKind::Modified,
            record: record.clone(),
        };
        self.inner.hub.send(&event);
        info!("reservation {id} is now {}", status.as_str());
        Ok(Transition::Changed)
    }
}
