use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::{Location, NewLocation};
use crate::models::parcel::ParcelStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingEventType {
    OrderCreated,
    DriverAssigned,
    PickedUp,
    LocationUpdate,
    OutForDelivery,
    ArrivedAtDestination,
    Delivered,
    Completed,
    Cancelled,
    Exception,
}

impl TrackingEventType {
    /// The event recorded when a parcel moves into `status`.
    pub fn for_status(status: ParcelStatus) -> Self {
        match status {
            ParcelStatus::Pending => TrackingEventType::OrderCreated,
            ParcelStatus::Assigned => TrackingEventType::DriverAssigned,
            ParcelStatus::PickedUp => TrackingEventType::PickedUp,
            ParcelStatus::InTransit => TrackingEventType::LocationUpdate,
            ParcelStatus::OutForDelivery => TrackingEventType::OutForDelivery,
            ParcelStatus::ArrivedAtDestination => TrackingEventType::ArrivedAtDestination,
            ParcelStatus::Delivered => TrackingEventType::Delivered,
            ParcelStatus::Completed => TrackingEventType::Completed,
            ParcelStatus::Cancelled => TrackingEventType::Cancelled,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackingEventType::OrderCreated => "ORDER_CREATED",
            TrackingEventType::DriverAssigned => "DRIVER_ASSIGNED",
            TrackingEventType::PickedUp => "PICKED_UP",
            TrackingEventType::LocationUpdate => "LOCATION_UPDATE",
            TrackingEventType::OutForDelivery => "OUT_FOR_DELIVERY",
            TrackingEventType::ArrivedAtDestination => "ARRIVED_AT_DESTINATION",
            TrackingEventType::Delivered => "DELIVERED",
            TrackingEventType::Completed => "COMPLETED",
            TrackingEventType::Cancelled => "CANCELLED",
            TrackingEventType::Exception => "EXCEPTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub parcel_id: Uuid,
    pub sequence: u64,
    pub event_type: TrackingEventType,
    /// Status of the parcel once this event is applied.
    pub status: ParcelStatus,
    pub location: Option<Location>,
    pub description: String,
    pub automated: bool,
    pub driver_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// An event before the ledger has stamped, sequenced and stored it.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub parcel_id: Uuid,
    pub event_type: TrackingEventType,
    pub status: ParcelStatus,
    pub location: Option<NewLocation>,
    pub description: String,
    pub automated: bool,
    pub driver_id: Option<Uuid>,
}

impl EventDraft {
    pub fn new(parcel_id: Uuid, event_type: TrackingEventType, status: ParcelStatus) -> Self {
        Self {
            parcel_id,
            event_type,
            status,
            location: None,
            description: String::new(),
            automated: false,
            driver_id: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn at(mut self, location: Option<NewLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn automated(mut self, automated: bool) -> Self {
        self.automated = automated;
        self
    }

    pub fn by_driver(mut self, driver_id: Option<Uuid>) -> Self {
        self.driver_id = driver_id;
        self
    }
}
