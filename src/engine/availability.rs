use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::limits::MAX_QUERY_WINDOW_DAYS;
use crate::model::*;

use super::{EngineError, Ledger};

// ── Availability Resolver ─────────────────────────────────────────

/// Answers status questions against one ledger snapshot.
pub struct Resolver<'a> {
    ledger: &'a Ledger,
    catalog: &'a Catalog,
}

impl<'a> Resolver<'a> {
    pub fn new(ledger: &'a Ledger, catalog: &'a Catalog) -> Self {
        Self { ledger, catalog }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn ledger(&self) -> &'a Ledger {
        self.ledger
    }

    /// `free` when the slot has no entry, otherwise the entry's status.
    pub fn status_of(&self, slot: &SlotKey) -> SlotStatus {
        self.ledger
            .get(slot)
            .map(|r| SlotStatus::from(r.status))
            .unwrap_or(SlotStatus::Free)
    }

    /// Status of every valid slot of `facility_id` in `[start, end]`: one per day
    /// for whole-day facilities, one per block within operating hours for hourly.
    pub fn status_range(
        &self,
        facility_id: &str,
        start: CalendarDate,
        end: CalendarDate,
        granularity: Granularity,
    ) -> Result<BTreeMap<SlotKey, SlotStatus>, EngineError> {
        let slots = self.slots(facility_id, start, end, granularity)?;
        Ok(slots
            .into_iter()
            .map(|slot| {
                let status = self.status_of(&slot);
                (slot, status)
            })
            .collect())
    }

    /// Enumerate every valid slot in range, in key order.
    pub fn slots(
        &self,
        facility_id: &str,
        start: CalendarDate,
        end: CalendarDate,
        granularity: Granularity,
    ) -> Result<Vec<SlotKey>, EngineError> {
        let facility = self
            .catalog
            .get(facility_id)
            .ok_or_else(|| EngineError::UnknownFacility(facility_id.to_string()))?;
        if facility.granularity != granularity {
            return Err(EngineError::GranularityMismatch {
                facility: facility_id.to_string(),
                expected: facility.granularity,
            });
        }
        if start > end {
            return Err(EngineError::InvalidRange { start, end });
        }
        if (end - start).num_days() + 1 > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }

        let blocks = facility.blocks();
        let mut slots = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            match granularity {
                Granularity::WholeDay => slots.push(SlotKey::floor(&facility.id, date)),
                Granularity::Hourly => slots.extend(blocks.iter().map(|b| SlotKey {
                    facility_id: facility.id.clone(),
                    date,
                    block: Some(*b),
                })),
            }
        }
        Ok(slots)
    }
}

/// Fold per-slot statuses into one status per day: the most available status
/// among that day's slots.
pub fn daily_status(statuses: &BTreeMap<SlotKey, SlotStatus>) -> BTreeMap<CalendarDate, SlotStatus> {
    let mut days: BTreeMap<CalendarDate, SlotStatus> = BTreeMap::new();
    for (slot, status) in statuses {
        days.entry(slot.date)
            .and_modify(|s| *s = (*s).min(*status))
            .or_insert(*status);
    }
    days
}
