use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::InvalidKeyError;
use crate::limits::MAX_FACILITY_ID_LEN;

/// Timezone-naive calendar day in the club's local timezone.
pub type CalendarDate = NaiveDate;

/// Opaque id assigned by the backing store.
pub type ReservationId = String;

const KEY_SEPARATOR: char = '/';

/// Half-open hour range `[start_hour, end_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeBlock {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl TimeBlock {
    pub fn new(start_hour: u8, end_hour: u8) -> Result<Self, InvalidKeyError> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(InvalidKeyError::InvalidBlock {
                start_hour,
                end_hour,
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn hours(&self) -> u8 {
        self.end_hour - self.start_hour
    }

    /// Returns true if `self` lies entirely inside `outer`.
    pub fn within(&self, outer: &TimeBlock) -> bool {
        outer.start_hour <= self.start_hour && self.end_hour <= outer.end_hour
    }

    /// `"06:00 - 07:00"`
    pub fn label(&self) -> String {
        format!("{:02}:00 - {:02}:00", self.start_hour, self.end_hour)
    }
}

/// Canonical identity of a reservable unit: facility + day (+ hour block).
///
/// Ordering is facility, then date, then block start, so a range scan over one
/// facility yields records in calendar order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotKey {
    pub facility_id: String,
    pub date: CalendarDate,
    pub block: Option<TimeBlock>,
}

impl SlotKey {
    pub fn new(
        facility_id: impl Into<String>,
        date: CalendarDate,
        block: Option<TimeBlock>,
    ) -> Result<Self, InvalidKeyError> {
        let facility_id = facility_id.into();
        validate_facility_id(&facility_id)?;
        if let Some(b) = block {
            TimeBlock::new(b.start_hour, b.end_hour)?;
        }
        Ok(Self {
            facility_id,
            date,
            block,
        })
    }

    /// Build a key from a raw year/month/day triple.
    pub fn from_ymd(
        facility_id: impl Into<String>,
        year: i32,
        month: u32,
        day: u32,
        block: Option<TimeBlock>,
    ) -> Result<Self, InvalidKeyError> {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(InvalidKeyError::InvalidDate { year, month, day })?;
        Self::new(facility_id, date, block)
    }

    /// Lowest key a facility can have on `date`; used as a range-scan bound.
    pub(crate) fn floor(facility_id: &str, date: CalendarDate) -> Self {
        Self {
            facility_id: facility_id.to_string(),
            date,
            block: None,
        }
    }

    /// Stable text form, e.g. `court-1/2025-06-01/10-11`.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

pub(crate) fn validate_facility_id(id: &str) -> Result<(), InvalidKeyError> {
    if id.is_empty() {
        return Err(InvalidKeyError::EmptyFacility);
    }
    if id.len() > MAX_FACILITY_ID_LEN {
        return Err(InvalidKeyError::FacilityTooLong(id.len()));
    }
    if id.contains(KEY_SEPARATOR) || id.chars().any(char::is_whitespace) {
        return Err(InvalidKeyError::MalformedFacility(id.to_string()));
    }
    Ok(())
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{:04}-{:02}-{:02}",
            self.facility_id,
            self.date.year(),
            self.date.month(),
            self.date.day()
        )?;
        if let Some(b) = self.block {
            write!(f, "{KEY_SEPARATOR}{:02}-{:02}", b.start_hour, b.end_hour)?;
        }
        Ok(())
    }
}

impl FromStr for SlotKey {
    type Err = InvalidKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || InvalidKeyError::Unparseable(s.to_string());
        let mut parts = s.split(KEY_SEPARATOR);
        let facility = parts.next().ok_or_else(malformed)?;
        let date = parts.next().ok_or_else(malformed)?;
        let block = parts.next();
        if parts.next().is_some() {
            return Err(malformed());
        }

        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| malformed())?;
        let block = match block {
            None => None,
            Some(b) => {
                let (start, end) = b.split_once('-').ok_or_else(malformed)?;
                let start: u8 = start.parse().map_err(|_| malformed())?;
                let end: u8 = end.parse().map_err(|_| malformed())?;
                Some(TimeBlock::new(start, end)?)
            }
        };
        SlotKey::new(facility, date, block)
    }
}

impl TryFrom<String> for SlotKey {
    type Error = InvalidKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotKey> for String {
    fn from(key: SlotKey) -> Self {
        key.to_string()
    }
}

/// `makeSlotKey` in functional form.
pub fn make_slot_key(
    facility_id: &str,
    date: CalendarDate,
    block: Option<TimeBlock>,
) -> Result<SlotKey, InvalidKeyError> {
    SlotKey::new(facility_id, date, block)
}

/// Field-wise key equality; the conflict-detection relation.
pub fn slot_keys_equal(a: &SlotKey, b: &SlotKey) -> bool {
    a == b
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

/// Availability of one slot as seen by the resolver.
///
/// Ordered from most to least available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Free,
    Pending,
    Confirmed,
}

impl From<ReservationStatus> for SlotStatus {
    fn from(status: ReservationStatus) -> Self {
        match status {
            ReservationStatus::Pending => SlotStatus::Pending,
            ReservationStatus::Confirmed => SlotStatus::Confirmed,
            // Cancelled records never reach the index.
            ReservationStatus::Cancelled => SlotStatus::Free,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: ReservationId,
    pub slot: SlotKey,
    pub status: ReservationStatus,
    pub requester_name: String,
    pub requester_contact: String,
    pub party_size: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ReservationRecord {
    pub fn is_active(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    WholeDay,
    Hourly,
}

fn default_slot_hours() -> u8 {
    1
}

/// Static facility configuration. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityDefinition {
    pub id: String,
    pub display_name: String,
    /// Facility group, e.g. `grills` or `tennis`.
    #[serde(default)]
    pub category: String,
    pub granularity: Granularity,
    pub capacity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_hours: Option<TimeBlock>,
    /// Width of one bookable block for hourly facilities.
    #[serde(default = "default_slot_hours")]
    pub slot_hours: u8,
}

impl FacilityDefinition {
    /// Every bookable block in a day, in order. Empty for whole-day facilities.
    ///
    /// A block that would run past the closing hour is not offered.
    pub fn blocks(&self) -> Vec<TimeBlock> {
        let (Granularity::Hourly, Some(hours)) = (self.granularity, self.operating_hours) else {
            return Vec::new();
        };
        let step = self.slot_hours.max(1);
        let mut blocks = Vec::new();
        let mut start = hours.start_hour;
        while let Some(end) = start.checked_add(step)
            && end <= hours.end_hour
        {
            blocks.push(TimeBlock {
                start_hour: start,
                end_hour: end,
            });
            start = end;
        }
        blocks
    }

    /// Whether `block` is an acceptable block for this facility: none for
    /// whole-day facilities, one of [`blocks`](Self::blocks) for hourly ones.
    pub fn check_block(&self, block: Option<TimeBlock>) -> Result<(), String> {
        match (self.granularity, block) {
            (Granularity::WholeDay, None) => Ok(()),
            (Granularity::WholeDay, Some(_)) => Err(format!("{} is booked by whole day", self.id)),
            (Granularity::Hourly, None) => Err(format!("{} requires a time block", self.id)),
            (Granularity::Hourly, Some(b)) => {
                if b.start_hour >= b.end_hour || !self.is_on_grid(&b) {
                    return Err(format!(
                        "[{}, {}) is not a bookable block of {}",
                        b.start_hour, b.end_hour, self.id
                    ));
                }
                Ok(())
            }
        }
    }

    /// True if `block` is one of the blocks this facility offers.
    pub fn is_on_grid(&self, block: &TimeBlock) -> bool {
        let Some(hours) = self.operating_hours else {
            return false;
        };
        let step = self.slot_hours.max(1);
        block.within(&hours)
            && block.hours() == step
            && (block.start_hour - hours.start_hour) % step == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

/// One incremental change delivered by the feed. Always carries the full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: ReservationRecord,
}

/// What a feed delivers: a full snapshot, or one change on top of the last snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedMessage {
    Reset(Vec<ReservationRecord>),
    Change(ChangeEvent),
}
