use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::engine::ValidationError;
use crate::model::SlotKey;

// ── Feed metrics ────────────────────────────────────────────────

/// Counter: feed changes applied to a ledger. Labels: kind.
pub const FEED_EVENTS_APPLIED_TOTAL: &str = "clubslot_feed_events_applied_total";

/// Counter: feed messages dropped as undecodable or malformed.
pub const FEED_EVENTS_SKIPPED_TOTAL: &str = "clubslot_feed_events_skipped_total";

/// Counter: full snapshots applied.
pub const LEDGER_RESETS_TOTAL: &str = "clubslot_ledger_resets_total";

/// Gauge: records held by the most recently updated ledger.
pub const LEDGER_RECORDS: &str = "clubslot_ledger_records";

/// Gauge: live feed subscriptions.
pub const SUBSCRIPTIONS_ACTIVE: &str = "clubslot_subscriptions_active";

// ── Request metrics ─────────────────────────────────────────────

/// Counter: validation calls. Labels: outcome.
pub const VALIDATIONS_TOTAL: &str = "clubslot_validations_total";

/// Counter: booking submissions. Labels: status.
pub const SUBMISSIONS_TOTAL: &str = "clubslot_submissions_total";

/// Histogram: booking submission latency in seconds.
pub const SUBMISSION_DURATION_SECONDS: &str = "clubslot_submission_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a validation outcome to a short label for metrics.
pub fn validation_label(result: &Result<SlotKey, ValidationError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(ValidationError::UnknownFacility(_)) => "unknown_facility",
        Err(ValidationError::InvalidKey(_)) => "invalid_key",
        Err(ValidationError::PastDate { .. }) => "past_date",
        Err(ValidationError::InvalidBlock(_)) => "invalid_block",
        Err(ValidationError::CapacityExceeded { .. }) => "capacity_exceeded",
        Err(ValidationError::SlotConflict { .. }) => "slot_conflict",
        Err(ValidationError::UnverifiedRequester) => "unverified_requester",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SlotStatus;

    #[test]
    fn labels_are_distinct() {
        let outcomes = [
            Err(ValidationError::UnknownFacility("x".into())),
            Err(ValidationError::InvalidBlock("x".into())),
            Err(ValidationError::CapacityExceeded {
                requested: 5,
                capacity: 4,
            }),
            Err(ValidationError::SlotConflict {
                current: SlotStatus::Pending,
            }),
            Err(ValidationError::UnverifiedRequester),
            "court-1/2025-06-01".parse::<SlotKey>().map_err(ValidationError::from),
        ];
        let mut labels: Vec<_> = outcomes.iter().map(validation_label).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), outcomes.len());
        assert!(labels.contains(&"ok"));
    }

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }
}
