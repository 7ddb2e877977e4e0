use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::proximity::{evaluate_proximity, ProximityDecision};
use crate::engine::state_machine::{ParcelStateMachine, TransitionContext};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::actor::Actor;
use crate::models::location::{DriverLocation, NewLocation};
use crate::models::parcel::{Parcel, ParcelStatus};
use crate::observability::metrics::Metrics;
use crate::resolver::{address_or_coordinates, AddressResolver};
use crate::store::Store;

pub const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelAction {
    Delivered,
    LocationUpdated,
    /// Driver is at the pickup point; pickup still needs the driver's confirmation.
    AtPickup,
    AwaitingPickup,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParcelUpdate {
    pub parcel_id: Uuid,
    pub tracking_number: String,
    pub resulting_status: ParcelStatus,
    pub action: ParcelAction,
    pub distance_to_destination_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParcelFailure {
    pub parcel_id: Uuid,
    pub tracking_number: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationReport {
    pub location: DriverLocation,
    pub updates: Vec<ParcelUpdate>,
    pub failures: Vec<ParcelFailure>,
}

pub struct LocationIngestor {
    store: Arc<dyn Store>,
    resolver: Arc<dyn AddressResolver>,
    machine: Arc<ParcelStateMachine>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    threshold_meters: f64,
    resolver_timeout: Duration,
}

impl LocationIngestor {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: Arc<dyn AddressResolver>,
        machine: Arc<ParcelStateMachine>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        threshold_meters: f64,
        resolver_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            machine,
            clock,
            metrics,
            threshold_meters,
            resolver_timeout,
        }
    }

    pub async fn report_location(
        &self,
        driver_id: Uuid,
        lat: f64,
        lng: f64,
        address: Option<String>,
    ) -> Result<LocationReport, AppError> {
        let point = match GeoPoint::new(lat, lng) {
            Ok(point) => point,
            Err(err) => {
                self.metrics
                    .location_reports_total
                    .with_label_values(&["invalid"])
                    .inc();
                return Err(err);
            }
        };

        let address = match address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()) {
            Some(address) => address,
            None => {
                address_or_coordinates(self.resolver.as_ref(), point, self.resolver_timeout).await
            }
        };

        let location = self
            .store
            .append_driver_location(DriverLocation {
                id: Uuid::new_v4(),
                driver_id,
                latitude: point.lat,
                longitude: point.lng,
                address,
                timestamp: self.clock.now(),
            })
            .await?;

        let parcels = self.store.active_parcels_for_driver(driver_id).await?;
        let actor = Actor::driver(driver_id);

        let results = join_all(
            parcels
                .iter()
                .map(|parcel| self.process_parcel(parcel, &location, &actor)),
        )
        .await;

        let mut updates = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(update) => updates.push(update),
                Err(failure) => failures.push(failure),
            }
        }

        let outcome = if failures.is_empty() { "ok" } else { "partial" };
        self.metrics
            .location_reports_total
            .with_label_values(&[outcome])
            .inc();

        info!(
            driver_id = %driver_id,
            address = %location.address,
            parcels = parcels.len(),
            failures = failures.len(),
            "driver location processed"
        );

        Ok(LocationReport {
            location,
            updates,
            failures,
        })
    }

    pub async fn current_location(&self, driver_id: Uuid) -> Result<DriverLocation, AppError> {
        self.store
            .latest_driver_location(driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no location reported by driver {driver_id}")))
    }

    pub async fn location_history(
        &self,
        driver_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DriverLocation>, AppError> {
        self.store
            .driver_locations(driver_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }

    pub async fn active_parcels(&self, driver_id: Uuid) -> Result<Vec<Parcel>, AppError> {
        self.store.active_parcels_for_driver(driver_id).await
    }

    async fn process_parcel(
        &self,
        parcel: &Parcel,
        location: &DriverLocation,
        actor: &Actor,
    ) -> Result<ParcelUpdate, ParcelFailure> {
        let decision = evaluate_proximity(parcel, &location.point(), self.threshold_meters);
        let (target, action, distance_to_destination_m) = match decision {
            ProximityDecision::Deliver { distance_m } => (
                Some(ParcelStatus::Delivered),
                ParcelAction::Delivered,
                Some(distance_m),
            ),
            ProximityDecision::LocationUpdate { distance_m } => (
                Some(ParcelStatus::InTransit),
                ParcelAction::LocationUpdated,
                distance_m,
            ),
            ProximityDecision::AwaitingPickup {
                near_pickup: true, ..
            } => (None, ParcelAction::AtPickup, None),
            ProximityDecision::AwaitingPickup { .. } => (None, ParcelAction::AwaitingPickup, None),
            ProximityDecision::Settled => (None, ParcelAction::Unchanged, None),
        };

        let update = |resulting_status, action| ParcelUpdate {
            parcel_id: parcel.id,
            tracking_number: parcel.tracking_number.clone(),
            resulting_status,
            action,
            distance_to_destination_m,
        };

        let Some(target) = target else {
            return Ok(update(parcel.status, action));
        };

        let context = TransitionContext::automated(NewLocation {
            name: "Driver location".to_string(),
            address: location.address.clone(),
            latitude: Some(location.latitude),
            longitude: Some(location.longitude),
        });

        match self
            .machine
            .transition_with_retry(parcel.id, target, actor, &context)
            .await
        {
            Ok(outcome) if outcome.is_applied() => Ok(update(outcome.parcel().status, action)),
            Ok(outcome) => Ok(update(outcome.parcel().status, ParcelAction::Unchanged)),
            // Delivered or cancelled since the snapshot was read; the report no longer applies.
            Err(AppError::InvalidTransition { from, .. }) if from.is_terminal_for_location() => {
                debug!(
                    parcel_id = %parcel.id,
                    status = %from,
                    "parcel settled before the location report was applied"
                );
                Ok(update(from, ParcelAction::Unchanged))
            }
            Err(err) => {
                warn!(
                    parcel_id = %parcel.id,
                    target = %target,
                    error = %err,
                    "automatic transition failed"
                );
                Err(ParcelFailure {
                    parcel_id: parcel.id,
                    tracking_number: parcel.tracking_number.clone(),
                    error: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::ParcelAction;
    use crate::clock::{Clock, ManualClock};
    use crate::config::Config;
    use crate::engine::registry::{LocationInput, NewParcel};
    use crate::engine::state_machine::TransitionContext;
    use crate::models::actor::Actor;
    use crate::models::location::DriverLocation;
    use crate::models::parcel::{Parcel, ParcelStatus};
    use crate::models::tracking::TrackingEventType;
    use crate::resolver::OfflineResolver;
    use crate::state::AppState;
    use crate::store::memory::InMemoryStore;

    fn located(address: &str, lat: f64, lng: f64) -> LocationInput {
        LocationInput {
            name: None,
            address: address.to_string(),
            latitude: Some(lat),
            longitude: Some(lng),
        }
    }

    async fn picked_up(state: &AppState, clock: &ManualClock, driver_id: Uuid) -> Parcel {
        let parcel = state
            .registry
            .register(NewParcel {
                sender_id: Uuid::new_v4(),
                receiver_id: Uuid::new_v4(),
                weight: 1.2,
                quote: Decimal::new(30000, 2),
                pickup: located("Westlands, Nairobi", -1.2676, 36.8108),
                destination: located("Kenyatta Avenue, Nairobi", -1.2921, 36.8219),
            })
            .await
            .unwrap();

        for (status, actor, context) in [
            (
                ParcelStatus::Assigned,
                Actor::admin(Uuid::new_v4()),
                TransitionContext::manual().with_driver(driver_id),
            ),
            (
                ParcelStatus::PickedUp,
                Actor::driver(driver_id),
                TransitionContext::manual(),
            ),
        ] {
            clock.advance(Duration::seconds(1));
            state
                .machine
                .transition_with_retry(parcel.id, status, &actor, &context)
                .await
                .unwrap();
        }
        state.store.parcel(parcel.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn report_against_a_parcel_delivered_meanwhile_is_a_no_op() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        ));
        let (state, _jobs) = AppState::new(
            Config::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(OfflineResolver),
            clock.clone(),
        );
        let driver_id = Uuid::new_v4();
        let snapshot = picked_up(&state, &clock, driver_id).await;

        clock.advance(Duration::seconds(1));
        state
            .machine
            .transition_with_retry(
                snapshot.id,
                ParcelStatus::Delivered,
                &Actor::driver(driver_id),
                &TransitionContext::manual(),
            )
            .await
            .unwrap();

        clock.advance(Duration::seconds(1));
        let far_away = DriverLocation {
            id: Uuid::new_v4(),
            driver_id,
            latitude: -1.2100,
            longitude: 36.8219,
            address: "Thika Road".to_string(),
            timestamp: clock.now(),
        };
        let update = state
            .ingestor
            .process_parcel(&snapshot, &far_away, &Actor::driver(driver_id))
            .await
            .unwrap();

        assert_eq!(update.action, ParcelAction::Unchanged);
        assert_eq!(update.resulting_status, ParcelStatus::Delivered);
        assert!(update.distance_to_destination_m.unwrap() > 9_000.0);

        let history = state.ledger.history(snapshot.id).await.unwrap();
        assert_eq!(history[0].event_type, TrackingEventType::Delivered);
        assert!(history
            .iter()
            .all(|event| event.event_type != TrackingEventType::LocationUpdate));
    }
}
