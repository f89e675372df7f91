use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{ReservationRequest, Session, TransportError, ValidationError};
use crate::limits::{MAX_CONTACT_LEN, MAX_NOTES_LEN, MAX_REQUESTER_NAME_LEN, clip};
use crate::members::MemberDirectory;
use crate::model::*;
use crate::store::{ReservationSink, ReservationSubmission};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Another submission from this desk has not finished yet.
    InFlight,
    Validation(ValidationError),
    /// The store could not be reached. The request was not recorded; the
    /// requester may retry or use another contact channel.
    Transport(TransportError),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::InFlight => write!(f, "a submission is already in progress"),
            SubmitError::Validation(e) => write!(f, "{e}"),
            SubmitError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<ValidationError> for SubmitError {
    fn from(e: ValidationError) -> Self {
        SubmitError::Validation(e)
    }
}

impl From<TransportError> for SubmitError {
    fn from(e: TransportError) -> Self {
        SubmitError::Transport(e)
    }
}

/// What a member fills in on the booking form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub facility_id: String,
    pub date: CalendarDate,
    pub block: Option<TimeBlock>,
    pub party_size: u32,
    /// Membership number or document id.
    pub member_identifier: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub id: ReservationId,
    pub slot: SlotKey,
    /// First eight characters of the id, upper-cased, for quoting to staff.
    pub short_code: String,
}

impl Receipt {
    fn new(id: ReservationId, slot: SlotKey) -> Self {
        let short_code = id.chars().take(8).collect::<String>().to_uppercase();
        Self {
            id,
            slot,
            short_code,
        }
    }
}

/// Member-facing submission flow: verify membership, validate against the
/// session's view, then write optimistically as `pending`.
///
/// One desk backs one form; it refuses a second submission while the first is
/// still in flight.
pub struct BookingDesk<S, D> {
    sink: S,
    directory: D,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SubmitError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| SubmitError::InFlight)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: ReservationSink, D: MemberDirectory> BookingDesk<S, D> {
    pub fn new(sink: S, directory: D) -> Self {
        Self {
            sink,
            directory,
            in_flight: AtomicBool::new(false),
        }
    }

    /// True while a submission is running; the form keeps its controls disabled.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn submit(
        &self,
        session: &Session,
        request: BookingRequest,
    ) -> Result<Receipt, SubmitError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let started = Instant::now();

        let result = self.submit_inner(session, request).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(SubmitError::Validation(_)) => "rejected",
            Err(SubmitError::Transport(_)) => "transport_error",
            Err(SubmitError::InFlight) => "in_flight",
        };
        metrics::counter!(crate::observability::SUBMISSIONS_TOTAL, "status" => status).increment(1);
        metrics::histogram!(crate::observability::SUBMISSION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn submit_inner(
        &self,
        session: &Session,
        request: BookingRequest,
    ) -> Result<Receipt, SubmitError> {
        let member = self.directory.verify_member(&request.member_identifier);

        let slot = session
            .validate(&ReservationRequest {
                facility_id: request.facility_id.clone(),
                date: request.date,
                block: request.block,
                party_size: request.party_size,
                committer_is_member: member.is_some(),
            })
            .await?;
        let Some(member) = member else {
            return Err(ValidationError::UnverifiedRequester.into());
        };

        let notes = request
            .notes
            .as_deref()
            .map(|n| clip(n.trim(), MAX_NOTES_LEN).to_string())
            .filter(|n| !n.is_empty());
        let submission = ReservationSubmission {
            slot: slot.clone(),
            requester_name: clip(&member.name, MAX_REQUESTER_NAME_LEN).to_string(),
            requester_contact: clip(&member.contact, MAX_CONTACT_LEN).to_string(),
            party_size: request.party_size,
            notes,
            status: ReservationStatus::Pending,
        };

        match self.sink.submit(submission).await {
            Ok(id) => {
                info!("reservation {id} requested for {slot}");
                Ok(Receipt::new(id, slot))
            }
            Err(e) => {
                warn!("submission for {slot} failed: {e}");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_code_is_upper_prefix() {
        let slot: SlotKey = "grill-1/2025-06-01".parse().unwrap();
        let receipt = Receipt::new("01hzx3abcdefgh".into(), slot);
        assert_eq!(receipt.short_code, "01HZX3AB");
    }

    #[test]
    fn guard_releases_flag() {
        let flag = AtomicBool::new(false);
        {
            let _g = InFlightGuard::acquire(&flag).unwrap();
            assert!(matches!(InFlightGuard::acquire(&flag), Err(SubmitError::InFlight)));
        }
        assert!(!flag.load(Ordering::Acquire));
        assert!(InFlightGuard::acquire(&flag).is_ok());
    }
}
