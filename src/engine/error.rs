use crate::model::{CalendarDate, Granularity, ReservationId, ReservationStatus, SlotStatus};

/// A slot key could not be built from the given parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidKeyError {
    EmptyFacility,
    FacilityTooLong(usize),
    MalformedFacility(String),
    InvalidDate { year: i32, month: u32, day: u32 },
    InvalidBlock { start_hour: u8, end_hour: u8 },
    Unparseable(String),
}

impl std::fmt::Display for InvalidKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidKeyError::EmptyFacility => write!(f, "facility id is empty"),
            InvalidKeyError::FacilityTooLong(len) => {
                write!(f, "facility id too long ({len} bytes)")
            }
            InvalidKeyError::MalformedFacility(id) => {
                write!(f, "facility id {id:?} contains '/' or whitespace")
            }
            InvalidKeyError::InvalidDate { year, month, day } => {
                write!(f, "invalid date {year:04}-{month:02}-{day:02}")
            }
            InvalidKeyError::InvalidBlock {
                start_hour,
                end_hour,
            } => write!(f, "invalid hour block [{start_hour}, {end_hour})"),
            InvalidKeyError::Unparseable(s) => write!(f, "cannot parse slot key {s:?}"),
        }
    }
}

impl std::error::Error for InvalidKeyError {}

/// Why a prospective booking was turned down. All variants are recoverable;
/// the caller shows them to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    UnknownFacility(String),
    InvalidKey(InvalidKeyError),
    PastDate {
        date: CalendarDate,
        today: CalendarDate,
    },
    InvalidBlock(String),
    CapacityExceeded {
        requested: u32,
        capacity: u32,
    },
    SlotConflict {
        current: SlotStatus,
    },
    UnverifiedRequester,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::UnknownFacility(id) => write!(f, "unknown facility: {id}"),
            ValidationError::InvalidKey(e) => write!(f, "invalid slot: {e}"),
            ValidationError::PastDate { date, today } => {
                write!(f, "{date} is in the past (today is {today})")
            }
            ValidationError::InvalidBlock(reason) => write!(f, "invalid time block: {reason}"),
            ValidationError::CapacityExceeded {
                requested,
                capacity,
            } => {
                if *requested == 0 {
                    write!(f, "party size must be at least 1")
                } else {
                    write!(f, "party of {requested} exceeds capacity {capacity}")
                }
            }
            ValidationError::SlotConflict { current } => match current {
                SlotStatus::Pending => write!(f, "slot already has a pending request"),
                SlotStatus::Confirmed => write!(f, "slot is already reserved"),
                SlotStatus::Free => write!(f, "slot conflict"),
            },
            ValidationError::UnverifiedRequester => {
                write!(f, "requester is not a verified active member")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<InvalidKeyError> for ValidationError {
    fn from(e: InvalidKeyError) -> Self {
        ValidationError::InvalidKey(e)
    }
}

/// A single feed event that could not be applied. Logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedDeliveryError {
    Undecodable(String),
    MalformedRecord {
        id: ReservationId,
        reason: &'static str,
    },
    LedgerFull(usize),
}

impl std::fmt::Display for FeedDeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedDeliveryError::Undecodable(e) => write!(f, "undecodable feed event: {e}"),
            FeedDeliveryError::MalformedRecord { id, reason } => {
                write!(f, "malformed record {id:?}: {reason}")
            }
            FeedDeliveryError::LedgerFull(max) => write!(f, "ledger full ({max} records)"),
        }
    }
}

impl std::error::Error for FeedDeliveryError {}

/// The backing store could not be reached or refused the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    UnknownFacility(String),
    InvalidRange {
        start: CalendarDate,
        end: CalendarDate,
    },
    InvalidWindow(String),
    GranularityMismatch {
        facility: String,
        expected: Granularity,
    },
    InvalidBlock(String),
    LimitExceeded(&'static str),
    NotFound(ReservationId),
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    Transport(TransportError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnknownFacility(id) => write!(f, "unknown facility: {id}"),
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid date range [{start}, {end}]")
            }
            EngineError::InvalidWindow(msg) => write!(f, "invalid window: {msg}"),
            EngineError::GranularityMismatch { facility, expected } => {
                write!(f, "facility {facility} is booked {expected:?}")
            }
            EngineError::InvalidBlock(reason) => write!(f, "invalid time block: {reason}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::NotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move reservation from {} to {}", from.as_str(), to.as_str())
            }
            EngineError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<TransportError> for EngineError {
    fn from(e: TransportError) -> Self {
        EngineError::Transport(e)
    }
}
