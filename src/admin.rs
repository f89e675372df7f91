use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::engine::EngineError;
use crate::limits::{MAX_CONTACT_LEN, MAX_NOTES_LEN, MAX_REQUESTER_NAME_LEN, clip};
use crate::model::*;
use crate::store::ReservationSubmission;

/// Staff-panel filter over reservation records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub facility: Option<String>,
    pub category: Option<String>,
    pub status: Option<ReservationStatus>,
    pub date_from: Option<CalendarDate>,
    pub date_to: Option<CalendarDate>,
    /// Case-insensitive substring of name, contact, notes, or facility id.
    pub search: Option<String>,
}

impl ReservationFilter {
    pub fn matches(&self, record: &ReservationRecord, catalog: &Catalog) -> bool {
        let slot = &record.slot;
        if self.facility.as_ref().is_some_and(|f| *f != slot.facility_id) {
            return false;
        }
        if let Some(ref category) = self.category {
            let in_category = catalog
                .get(&slot.facility_id)
                .is_some_and(|f| f.category == *category);
            if !in_category {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        if self.date_from.is_some_and(|d| slot.date < d) {
            return false;
        }
        if self.date_to.is_some_and(|d| slot.date > d) {
            return false;
        }
        if let Some(ref needle) = self.search {
            let needle = needle.trim().to_lowercase();
            if !needle.is_empty() {
                let haystacks = [
                    record.requester_name.as_str(),
                    record.requester_contact.as_str(),
                    record.notes.as_deref().unwrap_or(""),
                    slot.facility_id.as_str(),
                ];
                if !haystacks.iter().any(|h| h.to_lowercase().contains(&needle)) {
                    return false;
                }
            }
        }
        true
    }

    /// Matching records, in slot order (ties keep their input order).
    pub fn apply<'a>(
        &self,
        records: impl IntoIterator<Item = &'a ReservationRecord>,
        catalog: &Catalog,
    ) -> Vec<&'a ReservationRecord> {
        let mut matched: Vec<_> = records
            .into_iter()
            .filter(|r| self.matches(r, catalog))
            .collect();
        matched.sort_by(|a, b| a.slot.cmp(&b.slot));
        matched
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a ReservationRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.status {
                ReservationStatus::Pending => counts.pending += 1,
                ReservationStatus::Confirmed => counts.confirmed += 1,
                ReservationStatus::Cancelled => counts.cancelled += 1,
            }
            counts.total += 1;
        }
        counts
    }
}

/// Staff-entered reservation (walk-in or phone). May be recorded as already
/// confirmed; skips member verification and the conflict check, but the
/// block must still fit the facility's grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualReservation {
    pub slot: SlotKey,
    pub requester_name: String,
    pub requester_contact: String,
    pub party_size: u32,
    pub notes: Option<String>,
    pub status: ReservationStatus,
}

pub const MANUAL_NOTE_TAG: &str = "[manual]";

impl ManualReservation {
    pub fn into_submission(self, catalog: &Catalog) -> Result<ReservationSubmission, EngineError> {
        if self.status == ReservationStatus::Cancelled {
            return Err(EngineError::InvalidTransition {
                from: ReservationStatus::Pending,
                to: ReservationStatus::Cancelled,
            });
        }
        let facility = catalog
            .get(&self.slot.facility_id)
            .ok_or_else(|| EngineError::UnknownFacility(self.slot.facility_id.clone()))?;
        facility
            .check_block(self.slot.block)
            .map_err(EngineError::InvalidBlock)?;
        if self.party_size == 0 || self.party_size > facility.capacity {
            return Err(EngineError::LimitExceeded("party size outside facility capacity"));
        }
        let notes = match self.notes.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => format!("{MANUAL_NOTE_TAG} {n}"),
            _ => MANUAL_NOTE_TAG.to_string(),
        };
        Ok(ReservationSubmission {
            slot: self.slot,
            requester_name: clip(&self.requester_name, MAX_REQUESTER_NAME_LEN).to_string(),
            requester_contact: clip(&self.requester_contact, MAX_CONTACT_LEN).to_string(),
            party_size: self.party_size,
            notes: Some(clip(&notes, MAX_NOTES_LEN).to_string()),
            status: self.status,
        })
    }
}
