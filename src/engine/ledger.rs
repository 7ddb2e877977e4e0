use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::location::Location;
use crate::models::parcel::{Parcel, ParcelStatus};
use crate::models::tracking::{EventDraft, TrackingEvent};
use crate::store::Store;

/// Append-only tracking log. The latest event of a parcel is the source of truth for its
/// status; `Parcel.status` is a cache of it.
pub struct TrackingLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl TrackingLedger {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Appends an event that keeps the parcel's status. Anything else is `InvalidEvent`.
    pub async fn append(&self, draft: EventDraft) -> Result<TrackingEvent, AppError> {
        let event = self.materialize(draft).await?;
        self.store.append_event(event).await
    }

    /// Appends `draft` and stores `parcel` in one atomic step, provided nobody else has
    /// committed since `expected_version` was read. `finalize` sees the stamped event
    /// before the parcel is written.
    pub async fn commit<F>(
        &self,
        expected_version: u64,
        mut parcel: Parcel,
        draft: EventDraft,
        finalize: F,
    ) -> Result<(Parcel, TrackingEvent), AppError>
    where
        F: FnOnce(&mut Parcel, &TrackingEvent) + Send,
    {
        if draft.parcel_id != parcel.id {
            return Err(AppError::InvalidEvent(format!(
                "event for parcel {} committed against parcel {}",
                draft.parcel_id, parcel.id
            )));
        }

        let event = self.materialize(draft).await?;
        finalize(&mut parcel, &event);
        parcel.updated_at = event.created_at;
        self.store
            .commit_transition(expected_version, parcel, event)
            .await
    }

    /// Builds the first event of a freshly registered parcel.
    pub async fn opening_event(&self, draft: EventDraft) -> Result<TrackingEvent, AppError> {
        self.materialize(draft).await
    }

    pub async fn current_status(&self, parcel_id: Uuid) -> Result<ParcelStatus, AppError> {
        match self.latest(parcel_id).await? {
            Some(event) => Ok(event.status),
            None => {
                error!(
                    parcel_id = %parcel_id,
                    "data integrity violation: parcel has no tracking events"
                );
                Err(AppError::NotFound(format!(
                    "no tracking events for parcel {parcel_id}"
                )))
            }
        }
    }

    pub async fn latest(&self, parcel_id: Uuid) -> Result<Option<TrackingEvent>, AppError> {
        let mut events = self.store.events(parcel_id).await?;
        Ok(events.pop())
    }

    /// Snapshot of the log, newest first.
    pub async fn history(&self, parcel_id: Uuid) -> Result<Vec<TrackingEvent>, AppError> {
        let mut events = self.store.events(parcel_id).await?;
        events.reverse();
        Ok(events)
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    async fn materialize(&self, draft: EventDraft) -> Result<TrackingEvent, AppError> {
        let location: Option<Location> = match draft.location {
            Some(new_location) => Some(self.store.find_or_create_location(new_location).await?),
            None => None,
        };

        Ok(TrackingEvent {
            id: Uuid::new_v4(),
            parcel_id: draft.parcel_id,
            sequence: 0,
            event_type: draft.event_type,
            status: draft.status,
            location,
            description: draft.description,
            automated: draft.automated,
            driver_id: draft.driver_id,
            created_at: self.clock.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::TrackingLedger;
    use crate::clock::ManualClock;
    use crate::error::AppError;
    use crate::models::location::{Location, NewLocation};
    use crate::models::parcel::{Parcel, ParcelStatus, WeightCategory};
    use crate::models::tracking::{EventDraft, TrackingEventType};
    use crate::store::memory::InMemoryStore;
    use crate::store::Store;

    fn location() -> Location {
        Location {
            id: Uuid::new_v4(),
            name: "Kenyatta Avenue".to_string(),
            address: "Kenyatta Avenue, Nairobi".to_string(),
            latitude: Some(-1.2841),
            longitude: Some(36.8155),
        }
    }

    fn setup() -> (Arc<InMemoryStore>, Arc<ManualClock>, TrackingLedger) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        ));
        let ledger = TrackingLedger::new(store.clone(), clock.clone());
        (store, clock, ledger)
    }

    async fn register(ledger: &TrackingLedger, store: &InMemoryStore) -> Parcel {
        let id = Uuid::new_v4();
        let now = ledger.now();
        let parcel = Parcel {
            id,
            tracking_number: format!("TRK-{}", id.simple()),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            driver_id: None,
            weight: 0.5,
            weight_category: WeightCategory::Light,
            pickup_location: location(),
            destination_location: location(),
            status: ParcelStatus::Pending,
            quote: Decimal::new(500, 2),
            created_at: now,
            assigned_at: None,
            pickup_time: None,
            delivered_at: None,
            completed_at: None,
            updated_at: now,
            is_active: true,
            version: 0,
        };
        let opening = ledger
            .opening_event(EventDraft::new(
                id,
                TrackingEventType::OrderCreated,
                ParcelStatus::Pending,
            ))
            .await
            .unwrap();
        store.insert_parcel(parcel, opening).await.unwrap().0
    }

    #[tokio::test]
    async fn current_status_follows_latest_event() {
        let (store, clock, ledger) = setup();
        let parcel = register(&ledger, &store).await;
        assert_eq!(
            ledger.current_status(parcel.id).await.unwrap(),
            ParcelStatus::Pending
        );

        clock.advance(Duration::seconds(30));
        let mut assigned = parcel.clone();
        assigned.driver_id = Some(Uuid::new_v4());
        let (updated, event) = ledger
            .commit(
                parcel.version,
                assigned,
                EventDraft::new(parcel.id, TrackingEventType::DriverAssigned, ParcelStatus::Assigned),
                |parcel, event| parcel.assigned_at = Some(event.created_at),
            )
            .await
            .unwrap();

        assert_eq!(updated.status, ParcelStatus::Assigned);
        assert_eq!(updated.updated_at, event.created_at);
        assert_eq!(updated.assigned_at, Some(event.created_at));
        assert_eq!(
            ledger.current_status(parcel.id).await.unwrap(),
            updated.status
        );
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let (store, clock, ledger) = setup();
        let parcel = register(&ledger, &store).await;

        for minutes in 1..=3 {
            clock.advance(Duration::minutes(minutes));
            ledger
                .append(
                    EventDraft::new(parcel.id, TrackingEventType::Exception, ParcelStatus::Pending)
                        .describe(format!("note {minutes}")),
                )
                .await
                .unwrap();
        }

        let history = ledger.history(parcel.id).await.unwrap();
        let sequences: Vec<u64> = history.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![4, 3, 2, 1]);
        assert_eq!(history[0].description, "note 3");
        assert!(history.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[tokio::test]
    async fn clock_regression_is_rejected_and_ledger_unchanged() {
        let (store, clock, ledger) = setup();
        let parcel = register(&ledger, &store).await;

        clock.advance(Duration::minutes(-1));
        let err = ledger
            .append(EventDraft::new(
                parcel.id,
                TrackingEventType::Exception,
                ParcelStatus::Pending,
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidEvent(_)));
        assert_eq!(ledger.history(parcel.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn appends_cannot_move_the_status() {
        let (store, clock, ledger) = setup();
        let parcel = register(&ledger, &store).await;

        clock.advance(Duration::seconds(10));
        let err = ledger
            .append(
                EventDraft::new(parcel.id, TrackingEventType::Exception, ParcelStatus::Cancelled)
                    .describe("cancelled out of band"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidEvent(_)));
        assert_eq!(ledger.history(parcel.id).await.unwrap().len(), 1);
        let stored = store.parcel(parcel.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ParcelStatus::Pending);
        assert_eq!(
            ledger.current_status(parcel.id).await.unwrap(),
            stored.status
        );
    }

    #[tokio::test]
    async fn unknown_parcel_has_no_status() {
        let (_store, _clock, ledger) = setup();
        let err = ledger.current_status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = ledger
            .append(EventDraft::new(
                Uuid::new_v4(),
                TrackingEventType::Exception,
                ParcelStatus::Pending,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn event_locations_are_shared_when_identical() {
        let (store, clock, ledger) = setup();
        let parcel = register(&ledger, &store).await;
        let at = NewLocation {
            name: "Driver location".to_string(),
            address: "Tom Mboya Street".to_string(),
            latitude: Some(-1.2833),
            longitude: Some(36.8258),
        };

        clock.advance(Duration::seconds(1));
        let first = ledger
            .append(
                EventDraft::new(parcel.id, TrackingEventType::Exception, ParcelStatus::Pending)
                    .at(Some(at.clone())),
            )
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        let second = ledger
            .append(
                EventDraft::new(parcel.id, TrackingEventType::Exception, ParcelStatus::Pending)
                    .at(Some(at)),
            )
            .await
            .unwrap();

        assert_eq!(
            first.location.map(|l| l.id),
            second.location.map(|l| l.id)
        );
    }
}
