mod availability;
mod error;
mod ledger;
mod projection;
mod validate;

pub use availability::{Resolver, daily_status};
pub use error::{EngineError, FeedDeliveryError, InvalidKeyError, TransportError, ValidationError};
pub use ledger::Ledger;
pub use projection::{Cell, CellStatus, Grid, Window, project};
pub use validate::{ReservationRequest, validate};

pub(crate) use ledger::check_record;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{FixedOffset, Local, Utc};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::catalog::Catalog;
use crate::feed::{ChangeFeed, FacilityScope, Subscription};
use crate::model::*;

pub type SharedLedger = Arc<RwLock<Ledger>>;

/// Source of "today" in the club's local timezone.
pub trait Clock: Send + Sync {
    fn today(&self) -> CalendarDate;
}

/// Wall clock, either at a fixed UTC offset or the host's local zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    pub offset: Option<FixedOffset>,
}

impl Clock for SystemClock {
    fn today(&self) -> CalendarDate {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
            None => Local::now().date_naive(),
        }
    }
}

/// Clock pinned to one day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub CalendarDate);

impl Clock for FixedClock {
    fn today(&self) -> CalendarDate {
        self.0
    }
}

/// Per-session engine context: the facility catalog, this session's ledger, and
/// its clock. Owned by the caller; nothing here is process-global.
///
/// The ledger is written only by the session's feed subscription. Every query
/// takes a read guard, so it sees one consistent snapshot.
#[derive(Clone)]
pub struct Session {
    catalog: Arc<Catalog>,
    ledger: SharedLedger,
    clock: Arc<dyn Clock>,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_clock(catalog, Arc::new(SystemClock::default()))
    }

    pub fn with_clock(catalog: Arc<Catalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog,
            ledger: Arc::new(RwLock::new(Ledger::new())),
            clock,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn today(&self) -> CalendarDate {
        self.clock.today()
    }

    /// Read access to the ledger, e.g. for admin listings.
    pub async fn ledger(&self) -> RwLockReadGuard<'_, Ledger> {
        self.ledger.read().await
    }

    /// Subscribe this session's ledger to `feed`. The returned handle must be kept
    /// for as long as the view is active and released when it goes away.
    pub async fn activate(
        &self,
        feed: &dyn ChangeFeed,
        scope: FacilityScope,
    ) -> Result<Subscription, TransportError> {
        let stream = feed.subscribe(scope).await?;
        Ok(Subscription::spawn(stream, self.ledger.clone()))
    }

    pub async fn status_of(&self, slot: &SlotKey) -> SlotStatus {
        let ledger = self.ledger.read().await;
        Resolver::new(&ledger, &self.catalog).status_of(slot)
    }

    pub async fn status_range(
        &self,
        facility_id: &str,
        start: CalendarDate,
        end: CalendarDate,
        granularity: Granularity,
    ) -> Result<BTreeMap<SlotKey, SlotStatus>, EngineError> {
        let ledger = self.ledger.read().await;
        Resolver::new(&ledger, &self.catalog).status_range(facility_id, start, end, granularity)
    }

    pub async fn list_in_range(
        &self,
        facility_id: &str,
        start: CalendarDate,
        end: CalendarDate,
    ) -> Vec<ReservationRecord> {
        let ledger = self.ledger.read().await;
        ledger
            .list_in_range(facility_id, start, end)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Check a request against the current view, using the session clock for "today".
    pub async fn validate(&self, request: &ReservationRequest) -> Result<SlotKey, ValidationError> {
        let today = self.clock.today();
        let ledger = self.ledger.read().await;
        let result = validate(&Resolver::new(&ledger, &self.catalog), request, today);
        metrics::counter!(
            crate::observability::VALIDATIONS_TOTAL,
            "outcome" => crate::observability::validation_label(&result)
        )
        .increment(1);
        result
    }

    /// Render-ready grid for one facility. Month windows over hourly facilities show
    /// each day's most available status.
    pub async fn grid(&self, facility_id: &str, window: &Window) -> Result<Grid, EngineError> {
        let facility = self
            .catalog
            .get(facility_id)
            .ok_or_else(|| EngineError::UnknownFacility(facility_id.to_string()))?;
        let (start, end) = window.range();
        let statuses = self
            .status_range(facility_id, start, end, facility.granularity)
            .await?;
        Ok(project(&statuses, window, self.clock.today()))
    }
}
