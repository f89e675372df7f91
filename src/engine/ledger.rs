use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, warn};

use crate::limits::*;
use crate::model::*;

use super::FeedDeliveryError;

/// In-memory projection of all live (non-cancelled) reservations, keyed by slot.
///
/// Mutated only by applying feed messages, in delivery order. Each slot resolves
/// to the record most recently applied for it. Every live record is also kept by
/// id, so that two requests racing for one slot at the backing store both stay
/// visible through [`Ledger::list_in_range`] and [`Ledger::contested`] until staff
/// resolve them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ledger {
    records: HashMap<ReservationId, ReservationRecord>,
    /// Live record ids per slot, in arrival order. The last id is the slot's entry.
    slots: BTreeMap<SlotKey, Vec<ReservationId>>,
    audit: VecDeque<ReservationRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole ledger with a fresh snapshot. Returns how many records
    /// were indexed; malformed and cancelled entries are skipped.
    pub fn apply_reset(&mut self, records: Vec<ReservationRecord>) -> usize {
        self.records.clear();
        self.slots.clear();
        self.audit.clear();

        let mut indexed = 0;
        for record in records {
            if let Err(e) = check_record(&record) {
                warn!("skipping snapshot record: {e}");
                metrics::counter!(crate::observability::FEED_EVENTS_SKIPPED_TOTAL).increment(1);
                continue;
            }
            if !record.is_active() {
                continue;
            }
            if self.records.len() >= MAX_LEDGER_RECORDS {
                warn!("snapshot truncated at {MAX_LEDGER_RECORDS} records");
                break;
            }
            self.upsert(record);
            indexed += 1;
        }

        metrics::counter!(crate::observability::LEDGER_RESETS_TOTAL).increment(1);
        metrics::gauge!(crate::observability::LEDGER_RECORDS).set(self.records.len() as f64);
        indexed
    }

    /// Apply one incremental change.
    ///
    /// - added/modified, not cancelled: index under its slot (replacing the slot's entry)
    /// - added/modified, cancelled: drop it from the index
    /// - removed: drop it from the index regardless of status
    ///
    /// Drops are by record id, not by slot: cancelling one of two records at a
    /// slot leaves the other holding it.
    ///
    /// A malformed event leaves the ledger untouched.
    pub fn apply_change(&mut self, event: ChangeEvent) -> Result<(), FeedDeliveryError> {
        check_record(&event.record)?;
        let kind = event.kind;
        match (kind, event.record.status) {
            (ChangeKind::Added | ChangeKind::Modified, ReservationStatus::Cancelled)
            | (ChangeKind::Removed, _) => {
                let id = event.record.id.clone();
                self.detach(&id, Some(event.record));
            }
            (ChangeKind::Added | ChangeKind::Modified, _) => {
                if !self.records.contains_key(&event.record.id)
                    && self.records.len() >= MAX_LEDGER_RECORDS
                {
                    return Err(FeedDeliveryError::LedgerFull(MAX_LEDGER_RECORDS));
                }
                self.upsert(event.record);
            }
        }

        metrics::counter!(crate::observability::FEED_EVENTS_APPLIED_TOTAL, "kind" => kind.as_str())
            .increment(1);
        metrics::gauge!(crate::observability::LEDGER_RECORDS).set(self.records.len() as f64);
        Ok(())
    }

    /// Apply either kind of feed message.
    pub fn apply(&mut self, message: FeedMessage) -> Result<(), FeedDeliveryError> {
        match message {
            FeedMessage::Reset(records) => {
                let indexed = self.apply_reset(records);
                debug!("ledger reset with {indexed} live records");
                Ok(())
            }
            FeedMessage::Change(event) => self.apply_change(event),
        }
    }

    /// The record currently occupying `slot`, if any.
    pub fn get(&self, slot: &SlotKey) -> Option<&ReservationRecord> {
        self.slots
            .get(slot)
            .and_then(|ids| ids.last())
            .and_then(|id| self.records.get(id))
    }

    pub fn get_by_id(&self, id: &str) -> Option<&ReservationRecord> {
        self.records.get(id)
    }

    /// All live records for `facility_id` dated within `[start, end]`, ordered by
    /// date then block start. A slot held by several racing records yields all of
    /// them, in arrival order.
    pub fn list_in_range(
        &self,
        facility_id: &str,
        start: CalendarDate,
        end: CalendarDate,
    ) -> Vec<&ReservationRecord> {
        if start > end {
            return Vec::new();
        }
        self.slots
            .range(SlotKey::floor(facility_id, start)..)
            .take_while(|(key, _)| key.facility_id == facility_id && key.date <= end)
            .flat_map(|(_, ids)| ids.iter().filter_map(|id| self.records.get(id)))
            .collect()
    }

    /// Slots currently held by more than one live record.
    pub fn contested(&self) -> Vec<(&SlotKey, Vec<&ReservationRecord>)> {
        self.slots
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(key, ids)| {
                (
                    key,
                    ids.iter().filter_map(|id| self.records.get(id)).collect(),
                )
            })
            .collect()
    }

    /// Every live record, in slot order.
    pub fn records(&self) -> impl Iterator<Item = &ReservationRecord> {
        self.slots
            .values()
            .flat_map(|ids| ids.iter().filter_map(|id| self.records.get(id)))
    }

    /// Records that left the index through cancellation or removal, oldest first.
    pub fn audit(&self) -> impl Iterator<Item = &ReservationRecord> {
        self.audit.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn upsert(&mut self, record: ReservationRecord) {
        // A record may move to another slot (rescheduled); leave the old one first.
        if let Some(previous) = self.records.get(&record.id)
            && previous.slot != record.slot
        {
            let old_slot = previous.slot.clone();
            self.unlink(&old_slot, &record.id);
        }

        let ids = self.slots.entry(record.slot.clone()).or_default();
        ids.retain(|id| id != &record.id);
        ids.push(record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    /// Drop a record from the index. `latest` is the version carried by the event,
    /// kept for the audit trail.
    fn detach(&mut self, id: &str, latest: Option<ReservationRecord>) {
        let Some(previous) = self.records.remove(id) else {
            return;
        };
        self.unlink(&previous.slot, id);

        let retained = latest.unwrap_or(previous);
        if self.audit.len() >= MAX_AUDIT_RECORDS {
            self.audit.pop_front();
        }
        self.audit.push_back(retained);
    }

    fn unlink(&mut self, slot: &SlotKey, id: &str) {
        if let Some(ids) = self.slots.get_mut(slot) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                self.slots.remove(slot);
            }
        }
    }
}

/// Structural checks on a record arriving from the feed.
pub(crate) fn check_record(record: &ReservationRecord) -> Result<(), FeedDeliveryError> {
    let malformed = |reason| FeedDeliveryError::MalformedRecord {
        id: record.id.clone(),
        reason,
    };
    if record.id.is_empty() {
        return Err(malformed("empty id"));
    }
    if record.id.len() > MAX_RESERVATION_ID_LEN {
        return Err(malformed("id too long"));
    }
    if validate_facility_id(&record.slot.facility_id).is_err() {
        return Err(malformed("bad facility id"));
    }
    if let Some(b) = record.slot.block
        && b.start_hour >= b.end_hour
    {
        return Err(malformed("empty time block"));
    }
    if record.party_size == 0 {
        return Err(malformed("party size is zero"));
    }
    if record.requester_name.len() > MAX_REQUESTER_NAME_LEN {
        return Err(malformed("requester name too long"));
    }
    if record.requester_contact.len() > MAX_CONTACT_LEN {
        return Err(malformed("contact too long"));
    }
    if let Some(ref n) = record.notes
        && n.len() > MAX_NOTES_LEN
    {
        return Err(malformed("notes too long"));
    }
    Ok(())
}
