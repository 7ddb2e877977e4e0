pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Contact;
use crate::models::location::{DriverLocation, Location, NewLocation};
use crate::models::parcel::Parcel;
use crate::models::tracking::TrackingEvent;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreStats {
    pub parcels: usize,
    pub tracking_events: usize,
    pub driver_locations: usize,
    pub locations: usize,
}

/// Durable persistence. Implementations must make `commit_transition` atomic: the event
/// append and the parcel update land together or not at all.
#[async_trait]
pub trait Store: Send + Sync {
    /// Stores a new parcel together with its first event. Fails with `Conflict` on a
    /// duplicate id or tracking number.
    async fn insert_parcel(
        &self,
        parcel: Parcel,
        created: TrackingEvent,
    ) -> Result<(Parcel, TrackingEvent), AppError>;

    async fn parcel(&self, id: Uuid) -> Result<Option<Parcel>, AppError>;

    async fn parcel_by_tracking_number(
        &self,
        tracking_number: &str,
    ) -> Result<Option<Parcel>, AppError>;

    /// Active parcels of a driver whose status still reacts to location reports.
    async fn active_parcels_for_driver(&self, driver_id: Uuid) -> Result<Vec<Parcel>, AppError>;

    /// Events of a parcel, oldest first.
    async fn events(&self, parcel_id: Uuid) -> Result<Vec<TrackingEvent>, AppError>;

    /// Appends an event that keeps the parcel's current status; status changes go through
    /// `commit_transition`. The store assigns `sequence` and rejects, with `InvalidEvent`,
    /// a different status or a timestamp earlier than the latest event.
    async fn append_event(&self, event: TrackingEvent) -> Result<TrackingEvent, AppError>;

    /// Compare-and-swap on `Parcel.version`: appends `event` and replaces the parcel only
    /// if the stored version still equals `expected_version`. The stored parcel gets
    /// `expected_version + 1`.
    async fn commit_transition(
        &self,
        expected_version: u64,
        parcel: Parcel,
        event: TrackingEvent,
    ) -> Result<(Parcel, TrackingEvent), AppError>;

    async fn append_driver_location(
        &self,
        location: DriverLocation,
    ) -> Result<DriverLocation, AppError>;

    async fn latest_driver_location(
        &self,
        driver_id: Uuid,
    ) -> Result<Option<DriverLocation>, AppError>;

    /// Newest first.
    async fn driver_locations(
        &self,
        driver_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DriverLocation>, AppError>;

    /// Returns the existing location with the same address and coordinates, or stores a
    /// new one.
    async fn find_or_create_location(&self, location: NewLocation) -> Result<Location, AppError>;

    async fn contact(&self, user_id: Uuid) -> Result<Option<Contact>, AppError>;

    async fn upsert_contact(&self, contact: Contact) -> Result<(), AppError>;

    async fn stats(&self) -> Result<StoreStats, AppError>;
}
