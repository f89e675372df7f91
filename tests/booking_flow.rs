use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok, assert_pending, task};

use clubslot::admin::{ManualReservation, ReservationFilter, StatusCounts};
use clubslot::booking::{BookingDesk, BookingRequest, SubmitError};
use clubslot::catalog::Catalog;
use clubslot::engine::{
    EngineError, FixedClock, ReservationRequest, Session, TransportError, ValidationError,
};
use clubslot::feed::{FacilityScope, Subscription};
use clubslot::members::{MemberRecord, MembershipType, StaticDirectory};
use clubslot::model::*;
use clubslot::store::{
    MemoryStore, ReservationSink, ReservationSubmission, StatusAdmin, Transition,
};

// ── Test infrastructure ──────────────────────────────────────

fn date(y: i32, m: u32, d: u32) -> CalendarDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> CalendarDate {
    date(2025, 6, 1)
}

fn member(number: &str, document_id: &str, name: &str, is_active: bool) -> MemberRecord {
    MemberRecord {
        number: number.into(),
        document_id: document_id.into(),
        name: name.into(),
        contact: "987654321".into(),
        membership_type: MembershipType::Holder,
        is_active,
    }
}

fn directory() -> StaticDirectory {
    StaticDirectory::new(vec![
        member("S-0042", "45871236", "Quispe, Ana", true),
        member("C-0100", "10203040", "Rojas, Luis", true),
        member("S-0001", "11111111", "Former, Member", false),
    ])
}

fn session() -> Session {
    Session::with_clock(
        Arc::new(Catalog::club_default().unwrap()),
        Arc::new(FixedClock(today())),
    )
}

fn tennis_request(member: &str, start: u8) -> BookingRequest {
    BookingRequest {
        facility_id: "tennis-1".into(),
        date: date(2025, 6, 2),
        block: TimeBlock::new(start, start + 1).ok(),
        party_size: 2,
        member_identifier: member.into(),
        notes: Some("  doubles  ".into()),
    }
}

fn tennis_key(start: u8) -> SlotKey {
    SlotKey::new("tennis-1", date(2025, 6, 2), TimeBlock::new(start, start + 1).ok()).unwrap()
}

/// Wait until the subscription has handled `count` feed messages.
async fn settle(sub: &Subscription, count: u64) {
    let reached = tokio::time::timeout(Duration::from_secs(2), sub.wait_for(count)).await;
    assert!(
        matches!(reached, Ok(true)),
        "feed did not deliver {count} messages"
    );
}

async fn activate(session: &Session, store: &MemoryStore, facility: &str) -> Subscription {
    let sub = assert_ok!(
        session
            .activate(store, FacilityScope::facility(facility))
            .await
    );
    settle(&sub, 1).await;
    sub
}

/// Sink that holds every write until a permit is released.
struct GatedSink {
    store: MemoryStore,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl ReservationSink for GatedSink {
    async fn submit(
        &self,
        submission: ReservationSubmission,
    ) -> Result<ReservationId, TransportError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| TransportError::new("gate closed"))?;
        permit.forget();
        self.store.submit(submission).await
    }
}

// ── Member booking ───────────────────────────────────────────

#[tokio::test]
async fn member_booking_lands_as_pending() {
    let store = MemoryStore::new();
    let session = session();
    let sub = activate(&session, &store, "tennis-1").await;
    let desk = BookingDesk::new(store.clone(), directory());

    let receipt = assert_ok!(desk.submit(&session, tennis_request("45871236", 10)).await);
    assert_eq!(receipt.slot, tennis_key(10));
    assert_eq!(receipt.short_code.len(), 8);
    assert!(receipt.id.to_uppercase().starts_with(&receipt.short_code));

    settle(&sub, 2).await;
    assert_eq!(session.status_of(&tennis_key(10)).await, SlotStatus::Pending);

    let stored = store.get(&receipt.id).await.unwrap();
    assert_eq!(stored.requester_name, "Quispe, Ana");
    assert_eq!(stored.notes.as_deref(), Some("doubles"));

    // The same slot is now refused to the next member.
    let again = assert_err!(desk.submit(&session, tennis_request("C-0100", 10)).await);
    assert_eq!(
        again,
        SubmitError::Validation(ValidationError::SlotConflict {
            current: SlotStatus::Pending
        })
    );
    sub.unsubscribe().await;
}

#[tokio::test]
async fn accented_notes_are_clipped_to_fit() {
    let store = MemoryStore::new();
    let session = session();
    let sub = activate(&session, &store, "tennis-1").await;
    let desk = BookingDesk::new(store.clone(), directory());

    let request = BookingRequest {
        notes: Some("ñ".repeat(1500)),
        ..tennis_request("S-0042", 11)
    };
    let receipt = assert_ok!(desk.submit(&session, request).await);
    let stored = store.get(&receipt.id).await.unwrap();
    let notes = stored.notes.unwrap();
    assert!(notes.len() <= 2_000);
    assert!(notes.chars().all(|c| c == 'ñ'));
    sub.unsubscribe().await;
}

#[tokio::test]
async fn unknown_or_inactive_member_is_refused() {
    let store = MemoryStore::new();
    let session = session();
    let desk = BookingDesk::new(store.clone(), directory());

    for identifier in ["S-9999", "S-0001", ""] {
        let err = assert_err!(desk.submit(&session, tennis_request(identifier, 10)).await);
        assert_eq!(
            err,
            SubmitError::Validation(ValidationError::UnverifiedRequester)
        );
    }
    assert!(store.records().await.is_empty());
    assert!(!desk.is_busy());
}

#[tokio::test]
async fn transport_failure_is_surfaced_not_dropped() {
    let store = MemoryStore::new();
    let session = session();
    let sub = activate(&session, &store, "tennis-1").await;
    let desk = BookingDesk::new(store.clone(), directory());

    store.fail_next_writes(1);
    let err = assert_err!(desk.submit(&session, tennis_request("S-0042", 11)).await);
    assert!(matches!(err, SubmitError::Transport(_)));
    assert!(store.records().await.is_empty());
    assert_eq!(session.status_of(&tennis_key(11)).await, SlotStatus::Free);

    // The caller may retry.
    assert_ok!(desk.submit(&session, tennis_request("S-0042", 11)).await);
    settle(&sub, 2).await;
    assert_eq!(session.status_of(&tennis_key(11)).await, SlotStatus::Pending);
    sub.unsubscribe().await;
}

// ── Racing sessions ──────────────────────────────────────────

#[tokio::test]
async fn racing_sessions_both_land_and_staff_resolve() {
    let store = MemoryStore::new();
    let session_a = session();
    let session_b = session();
    let sub_a = activate(&session_a, &store, "tennis-1").await;
    let sub_b = activate(&session_b, &store, "tennis-1").await;

    let gate = Arc::new(Semaphore::new(0));
    let desk_a = BookingDesk::new(store.clone(), directory());
    let desk_b = BookingDesk::new(
        GatedSink {
            store: store.clone(),
            gate: gate.clone(),
        },
        directory(),
    );

    // B validates against an empty view and stalls on the write.
    let mut b_submit = task::spawn(desk_b.submit(&session_b, tennis_request("S-0042", 10)));
    assert_pending!(b_submit.poll());
    assert!(desk_b.is_busy());
    assert_eq!(
        desk_b.submit(&session_b, tennis_request("S-0042", 12)).await,
        Err(SubmitError::InFlight)
    );

    // A books the same hour and commits first.
    let receipt_a = assert_ok!(desk_a.submit(&session_a, tennis_request("C-0100", 10)).await);
    settle(&sub_b, 2).await;

    // B's write still goes through.
    gate.add_permits(1);
    let receipt_b = loop {
        if let Poll::Ready(result) = b_submit.poll() {
            break assert_ok!(result);
        }
        tokio::task::yield_now().await;
    };
    assert!(!desk_b.is_busy());
    assert_ne!(receipt_a.id, receipt_b.id);

    settle(&sub_a, 3).await;
    settle(&sub_b, 3).await;
    for session in [&session_a, &session_b] {
        let listed = session
            .list_in_range("tennis-1", date(2025, 6, 2), date(2025, 6, 2))
            .await;
        let ids: Vec<_> = listed.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![receipt_a.id.clone(), receipt_b.id.clone()]);
        assert!(listed.iter().all(|r| r.status == ReservationStatus::Pending));

        let ledger = session.ledger().await;
        let contested = ledger.contested();
        assert_eq!(contested.len(), 1);
        assert_eq!(*contested[0].0, tennis_key(10));
    }

    // A session joining now sees both through its initial snapshot.
    let session_c = session();
    let sub_c = activate(&session_c, &store, "tennis-1").await;
    let ids: Vec<_> = session_c
        .list_in_range("tennis-1", date(2025, 6, 2), date(2025, 6, 2))
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&receipt_a.id) && ids.contains(&receipt_b.id));
    assert_eq!(session_c.ledger().await.contested().len(), 1);
    sub_c.unsubscribe().await;

    // Staff cancel the later request and confirm the earlier one.
    assert_eq!(
        assert_ok!(store.set_status(&receipt_b.id, ReservationStatus::Cancelled).await),
        Transition::Changed
    );
    assert_eq!(
        assert_ok!(store.set_status(&receipt_a.id, ReservationStatus::Confirmed).await),
        Transition::Changed
    );
    assert_eq!(
        assert_ok!(store.set_status(&receipt_a.id, ReservationStatus::Confirmed).await),
        Transition::Unchanged
    );
    settle(&sub_a, 5).await;

    assert_eq!(session_a.status_of(&tennis_key(10)).await, SlotStatus::Confirmed);
    let ledger = session_a.ledger().await;
    assert!(ledger.contested().is_empty());
    assert_eq!(ledger.get(&tennis_key(10)).unwrap().id, receipt_a.id);
    assert_eq!(ledger.audit().count(), 1);
    drop(ledger);

    let err = assert_err!(store.set_status(&receipt_b.id, ReservationStatus::Pending).await);
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    sub_a.unsubscribe().await;
    sub_b.unsubscribe().await;
}

// ── Staff panel ──────────────────────────────────────────────

#[tokio::test]
async fn manual_reservations_and_admin_listing() {
    let store = MemoryStore::new();
    let catalog = Catalog::club_default().unwrap();
    let session = session();
    let sub = assert_ok!(session.activate(&store, FacilityScope::All).await);
    settle(&sub, 1).await;

    let walk_in = ManualReservation {
        slot: SlotKey::new("grill-central", date(2025, 6, 7), None).unwrap(),
        requester_name: "Huaman, Jose".into(),
        requester_contact: "ext 12".into(),
        party_size: 30,
        notes: None,
        status: ReservationStatus::Confirmed,
    };
    let submission = assert_ok!(walk_in.into_submission(&catalog));
    assert_ok!(store.submit(submission).await);

    let desk = BookingDesk::new(store.clone(), directory());
    assert_ok!(desk.submit(&session, tennis_request("S-0042", 8)).await);
    assert_ok!(desk.submit(&session, tennis_request("S-0042", 9)).await);
    settle(&sub, 4).await;

    let ledger = session.ledger().await;
    let tennis = ReservationFilter {
        category: Some("tennis".into()),
        ..Default::default()
    };
    assert_eq!(tennis.apply(ledger.records(), &catalog).len(), 2);

    let confirmed = ReservationFilter {
        status: Some(ReservationStatus::Confirmed),
        search: Some("huaman".into()),
        ..Default::default()
    };
    let found = confirmed.apply(ledger.records(), &catalog);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].notes.as_deref(), Some("[manual]"));
    drop(ledger);

    assert_eq!(
        session.status_of(&SlotKey::new("grill-central", date(2025, 6, 7), None).unwrap()).await,
        SlotStatus::Confirmed
    );

    let counts = StatusCounts::tally(&store.records().await);
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.confirmed, 1);
    assert_eq!(counts.total, 3);
    sub.unsubscribe().await;
}

// ── Teardown ─────────────────────────────────────────────────

#[tokio::test]
async fn unsubscribed_session_stops_updating() {
    let store = MemoryStore::new();
    let session = session();
    let sub = activate(&session, &store, "tennis-1").await;
    assert!(sub.is_active());
    sub.unsubscribe().await;

    let desk = BookingDesk::new(store.clone(), directory());
    assert_ok!(desk.submit(&session, tennis_request("S-0042", 14)).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(session.status_of(&tennis_key(14)).await, SlotStatus::Free);
    assert_eq!(store.records().await.len(), 1);
}

#[tokio::test]
async fn removal_at_the_store_frees_the_slot() {
    let store = MemoryStore::new();
    let session = session();
    let sub = activate(&session, &store, "tennis-1").await;
    let desk = BookingDesk::new(store.clone(), directory());

    let receipt = assert_ok!(desk.submit(&session, tennis_request("S-0042", 15)).await);
    settle(&sub, 2).await;
    assert_ok!(store.delete(&receipt.id).await);
    settle(&sub, 3).await;

    assert_eq!(session.status_of(&tennis_key(15)).await, SlotStatus::Free);
    let request = ReservationRequest {
        facility_id: "tennis-1".into(),
        date: date(2025, 6, 2),
        block: TimeBlock::new(15, 16).ok(),
        party_size: 4,
        committer_is_member: true,
    };
    assert_eq!(assert_ok!(session.validate(&request).await), tennis_key(15));
    sub.unsubscribe().await;
}
