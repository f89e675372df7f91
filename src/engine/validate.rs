use serde::{Deserialize, Serialize};

use crate::model::*;

use super::availability::Resolver;
use super::ValidationError;

/// A prospective booking, checked before anything is sent to the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub facility_id: String,
    pub date: CalendarDate,
    pub block: Option<TimeBlock>,
    pub party_size: u32,
    pub committer_is_member: bool,
}

/// Check a request against the resolver's current view. First failure wins:
///
/// 1. date not before `today`
/// 2. block present, on grid, and within operating hours for hourly facilities
/// 3. party size within `(0, capacity]`
/// 4. slot currently free
/// 5. requester is a verified member
///
/// Advisory only: the view may be stale, so a passing request can still race
/// another session's write.
pub fn validate(
    resolver: &Resolver<'_>,
    request: &ReservationRequest,
    today: CalendarDate,
) -> Result<SlotKey, ValidationError> {
    if request.date < today {
        return Err(ValidationError::PastDate {
            date: request.date,
            today,
        });
    }

    let facility = resolver
        .catalog()
        .get(&request.facility_id)
        .ok_or_else(|| ValidationError::UnknownFacility(request.facility_id.clone()))?;

    facility
        .check_block(request.block)
        .map_err(ValidationError::InvalidBlock)?;

    if request.party_size == 0 || request.party_size > facility.capacity {
        return Err(ValidationError::CapacityExceeded {
            requested: request.party_size,
            capacity: facility.capacity,
        });
    }

    let slot = SlotKey::new(facility.id.clone(), request.date, request.block)?;
    let current = resolver.status_of(&slot);
    if current != SlotStatus::Free {
        return Err(ValidationError::SlotConflict { current });
    }

    if !request.committer_is_member {
        return Err(ValidationError::UnverifiedRequester);
    }

    Ok(slot)
}
