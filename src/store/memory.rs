use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Contact;
use crate::models::location::{DriverLocation, Location, LocationKey, NewLocation};
use crate::models::parcel::Parcel;
use crate::models::tracking::TrackingEvent;
use crate::store::{Store, StoreStats};

/// Process-local store. Parcel entries double as the per-parcel lock: every write that
/// touches a parcel's events holds that parcel's map entry first.
#[derive(Default)]
pub struct InMemoryStore {
    parcels: DashMap<Uuid, Parcel>,
    tracking_numbers: DashMap<String, Uuid>,
    events: DashMap<Uuid, Vec<TrackingEvent>>,
    driver_locations: DashMap<Uuid, Vec<DriverLocation>>,
    locations: DashMap<LocationKey, Location>,
    contacts: DashMap<Uuid, Contact>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn push_in_order(
    events: &mut Vec<TrackingEvent>,
    mut event: TrackingEvent,
) -> Result<TrackingEvent, AppError> {
    if let Some(last) = events.last() {
        if event.created_at < last.created_at {
            return Err(AppError::InvalidEvent(format!(
                "event at {} precedes latest event at {} for parcel {}",
                event.created_at, last.created_at, event.parcel_id
            )));
        }
    }

    event.sequence = events.len() as u64 + 1;
    events.push(event.clone());
    Ok(event)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_parcel(
        &self,
        mut parcel: Parcel,
        mut created: TrackingEvent,
    ) -> Result<(Parcel, TrackingEvent), AppError> {
        if created.parcel_id != parcel.id {
            return Err(AppError::InvalidEvent(format!(
                "event belongs to parcel {}, not {}",
                created.parcel_id, parcel.id
            )));
        }

        match self.tracking_numbers.entry(parcel.tracking_number.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "tracking number {} already exists",
                parcel.tracking_number
            ))),
            Entry::Vacant(slot) => {
                if self.parcels.contains_key(&parcel.id) {
                    return Err(AppError::Conflict(format!(
                        "parcel {} already exists",
                        parcel.id
                    )));
                }

                created.sequence = 1;
                parcel.status = created.status;
                parcel.version = 0;

                self.events.insert(parcel.id, vec![created.clone()]);
                self.parcels.insert(parcel.id, parcel.clone());
                slot.insert(parcel.id);
                Ok((parcel, created))
            }
        }
    }

    async fn parcel(&self, id: Uuid) -> Result<Option<Parcel>, AppError> {
        Ok(self.parcels.get(&id).map(|entry| entry.value().clone()))
    }

    async fn parcel_by_tracking_number(
        &self,
        tracking_number: &str,
    ) -> Result<Option<Parcel>, AppError> {
        let Some(id) = self.tracking_numbers.get(tracking_number).map(|entry| *entry.value())
        else {
            return Ok(None);
        };
        self.parcel(id).await
    }

    async fn active_parcels_for_driver(&self, driver_id: Uuid) -> Result<Vec<Parcel>, AppError> {
        let mut parcels: Vec<Parcel> = self
            .parcels
            .iter()
            .filter_map(|entry| {
                let parcel = entry.value();
                let reacts_to_location = parcel.is_active
                    && parcel.driver_id == Some(driver_id)
                    && !parcel.status.is_terminal_for_location();

                if reacts_to_location {
                    Some(parcel.clone())
                } else {
                    None
                }
            })
            .collect();

        parcels.sort_by_key(|parcel| parcel.created_at);
        Ok(parcels)
    }

    async fn events(&self, parcel_id: Uuid) -> Result<Vec<TrackingEvent>, AppError> {
        Ok(self
            .events
            .get(&parcel_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn append_event(&self, event: TrackingEvent) -> Result<TrackingEvent, AppError> {
        let mut parcel = self.parcels.get_mut(&event.parcel_id).ok_or_else(|| {
            AppError::InvalidEvent(format!("parcel {} does not exist", event.parcel_id))
        })?;

        if event.status != parcel.status {
            return Err(AppError::InvalidEvent(format!(
                "{} event would move parcel {} from {} to {} outside a transition",
                event.event_type.as_str(),
                event.parcel_id,
                parcel.status,
                event.status
            )));
        }

        let mut events = self.events.entry(event.parcel_id).or_default();
        let event = push_in_order(&mut events, event)?;

        parcel.version += 1;
        Ok(event)
    }

    async fn commit_transition(
        &self,
        expected_version: u64,
        mut parcel: Parcel,
        event: TrackingEvent,
    ) -> Result<(Parcel, TrackingEvent), AppError> {
        if event.parcel_id != parcel.id {
            return Err(AppError::InvalidEvent(format!(
                "event belongs to parcel {}, not {}",
                event.parcel_id, parcel.id
            )));
        }

        let mut stored = self
            .parcels
            .get_mut(&parcel.id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {} not found", parcel.id)))?;

        if stored.version != expected_version {
            return Err(AppError::ConcurrentModification(parcel.id.to_string()));
        }

        let mut events = self.events.entry(parcel.id).or_default();
        let event = push_in_order(&mut events, event)?;

        parcel.status = event.status;
        parcel.version = expected_version + 1;
        *stored = parcel.clone();

        Ok((parcel, event))
    }

    async fn append_driver_location(
        &self,
        location: DriverLocation,
    ) -> Result<DriverLocation, AppError> {
        self.driver_locations
            .entry(location.driver_id)
            .or_default()
            .push(location.clone());
        Ok(location)
    }

    async fn latest_driver_location(
        &self,
        driver_id: Uuid,
    ) -> Result<Option<DriverLocation>, AppError> {
        Ok(self
            .driver_locations
            .get(&driver_id)
            .and_then(|entry| entry.value().last().cloned()))
    }

    async fn driver_locations(
        &self,
        driver_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DriverLocation>, AppError> {
        Ok(self
            .driver_locations
            .get(&driver_id)
            .map(|entry| entry.value().iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_or_create_location(&self, location: NewLocation) -> Result<Location, AppError> {
        let stored = self
            .locations
            .entry(location.dedup_key())
            .or_insert_with(|| Location {
                id: Uuid::new_v4(),
                name: location.name,
                address: location.address,
                latitude: location.latitude,
                longitude: location.longitude,
            });
        Ok(stored.value().clone())
    }

    async fn contact(&self, user_id: Uuid) -> Result<Option<Contact>, AppError> {
        Ok(self.contacts.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn upsert_contact(&self, contact: Contact) -> Result<(), AppError> {
        self.contacts.insert(contact.user_id, contact);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        Ok(StoreStats {
            parcels: self.parcels.len(),
            tracking_events: self.events.iter().map(|entry| entry.value().len()).sum(),
            driver_locations: self
                .driver_locations
                .iter()
                .map(|entry| entry.value().len())
                .sum(),
            locations: self.locations.len(),
        })
    }
}
