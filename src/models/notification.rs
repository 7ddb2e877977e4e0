use serde::{Deserialize, Serialize};

use crate::models::tracking::TrackingEventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    DriverAssigned,
    ParcelPickedUp,
    LocationUpdate,
    OutForDelivery,
    ArrivedAtDestination,
    ParcelDelivered,
    ParcelCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Sender,
    Receiver,
    Both,
}

impl NotificationTemplate {
    pub fn for_event(event_type: TrackingEventType) -> Option<Self> {
        match event_type {
            TrackingEventType::DriverAssigned => Some(NotificationTemplate::DriverAssigned),
            TrackingEventType::PickedUp => Some(NotificationTemplate::ParcelPickedUp),
            TrackingEventType::LocationUpdate => Some(NotificationTemplate::LocationUpdate),
            TrackingEventType::OutForDelivery => Some(NotificationTemplate::OutForDelivery),
            TrackingEventType::ArrivedAtDestination => {
                Some(NotificationTemplate::ArrivedAtDestination)
            }
            TrackingEventType::Delivered => Some(NotificationTemplate::ParcelDelivered),
            TrackingEventType::Cancelled => Some(NotificationTemplate::ParcelCancelled),
            TrackingEventType::OrderCreated
            | TrackingEventType::Completed
            | TrackingEventType::Exception => None,
        }
    }

    pub fn audience(self) -> Audience {
        match self {
            NotificationTemplate::DriverAssigned => Audience::Sender,
            NotificationTemplate::LocationUpdate
            | NotificationTemplate::OutForDelivery
            | NotificationTemplate::ArrivedAtDestination => Audience::Receiver,
            NotificationTemplate::ParcelPickedUp
            | NotificationTemplate::ParcelDelivered
            | NotificationTemplate::ParcelCancelled => Audience::Both,
        }
    }

    pub fn is_throttled(self) -> bool {
        self == NotificationTemplate::LocationUpdate
    }

    pub fn subject(self) -> &'static str {
        match self {
            NotificationTemplate::DriverAssigned => "A driver has been assigned to your parcel",
            NotificationTemplate::ParcelPickedUp => "Your parcel has been picked up",
            NotificationTemplate::LocationUpdate => "Your parcel is on its way",
            NotificationTemplate::OutForDelivery => "Your parcel is out for delivery",
            NotificationTemplate::ArrivedAtDestination => "Your parcel has arrived",
            NotificationTemplate::ParcelDelivered => "Your parcel has been delivered",
            NotificationTemplate::ParcelCancelled => "Your parcel has been cancelled",
        }
    }
}
