use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    OutForDelivery,
    ArrivedAtDestination,
    Delivered,
    Completed,
    Cancelled,
}

impl ParcelStatus {
    /// Position along the happy path. Cancelled sits outside it.
    pub fn rank(self) -> u8 {
        match self {
            ParcelStatus::Pending => 0,
            ParcelStatus::Assigned => 1,
            ParcelStatus::PickedUp => 2,
            ParcelStatus::InTransit => 3,
            ParcelStatus::OutForDelivery => 4,
            ParcelStatus::ArrivedAtDestination => 5,
            ParcelStatus::Delivered => 6,
            ParcelStatus::Completed => 7,
            ParcelStatus::Cancelled => u8::MAX,
        }
    }

    /// No status-changing transition is possible out of these.
    pub fn is_final(self) -> bool {
        matches!(self, ParcelStatus::Completed | ParcelStatus::Cancelled)
    }

    /// Location reports no longer drive these parcels.
    pub fn is_terminal_for_location(self) -> bool {
        matches!(
            self,
            ParcelStatus::Delivered | ParcelStatus::Completed | ParcelStatus::Cancelled
        )
    }

    /// Statuses in which a driver must be attached to the parcel.
    pub fn requires_driver(self) -> bool {
        matches!(
            self,
            ParcelStatus::Assigned
                | ParcelStatus::PickedUp
                | ParcelStatus::InTransit
                | ParcelStatus::OutForDelivery
                | ParcelStatus::ArrivedAtDestination
                | ParcelStatus::Delivered
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParcelStatus::Pending => "PENDING",
            ParcelStatus::Assigned => "ASSIGNED",
            ParcelStatus::PickedUp => "PICKED_UP",
            ParcelStatus::InTransit => "IN_TRANSIT",
            ParcelStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            ParcelStatus::ArrivedAtDestination => "ARRIVED_AT_DESTINATION",
            ParcelStatus::Delivered => "DELIVERED",
            ParcelStatus::Completed => "COMPLETED",
            ParcelStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightCategory {
    Light,
    Medium,
    Heavy,
    ExtraHeavy,
}

impl WeightCategory {
    /// Bands in kilograms: up to 1, up to 5, up to 20, above.
    pub fn from_weight(weight_kg: f64) -> Self {
        if weight_kg <= 1.0 {
            WeightCategory::Light
        } else if weight_kg <= 5.0 {
            WeightCategory::Medium
        } else if weight_kg <= 20.0 {
            WeightCategory::Heavy
        } else {
            WeightCategory::ExtraHeavy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    pub id: Uuid,
    pub tracking_number: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub weight: f64,
    pub weight_category: WeightCategory,
    pub pickup_location: Location,
    pub destination_location: Location,
    pub status: ParcelStatus,
    pub quote: Decimal,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    pub version: u64,
}

impl Parcel {
    /// Stamps the lifecycle timestamp belonging to `status`. Going backwards clears the
    /// timestamps of the stages being undone.
    pub fn stamp(&mut self, status: ParcelStatus, at: DateTime<Utc>) {
        match status {
            ParcelStatus::Assigned => self.assigned_at = Some(at),
            ParcelStatus::PickedUp => self.pickup_time = Some(at),
            ParcelStatus::Delivered => self.delivered_at = Some(at),
            ParcelStatus::Completed => self.completed_at = Some(at),
            _ => {}
        }

        if status == ParcelStatus::Cancelled {
            return;
        }
        let rank = status.rank();
        if rank < ParcelStatus::Completed.rank() {
            self.completed_at = None;
        }
        if rank < ParcelStatus::Delivered.rank() {
            self.delivered_at = None;
        }
        if rank < ParcelStatus::PickedUp.rank() {
            self.pickup_time = None;
        }
        if rank < ParcelStatus::Assigned.rank() {
            self.assigned_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ParcelStatus, WeightCategory};

    #[test]
    fn weight_bands() {
        assert_eq!(WeightCategory::from_weight(0.4), WeightCategory::Light);
        assert_eq!(WeightCategory::from_weight(1.0), WeightCategory::Light);
        assert_eq!(WeightCategory::from_weight(1.01), WeightCategory::Medium);
        assert_eq!(WeightCategory::from_weight(20.0), WeightCategory::Heavy);
        assert_eq!(WeightCategory::from_weight(35.0), WeightCategory::ExtraHeavy);
    }

    #[test]
    fn status_serializes_in_screaming_snake_case() {
        let json = serde_json::to_string(&ParcelStatus::ArrivedAtDestination).unwrap();
        assert_eq!(json, "\"ARRIVED_AT_DESTINATION\"");
        assert_eq!(ParcelStatus::OutForDelivery.to_string(), "OUT_FOR_DELIVERY");
    }

    #[test]
    fn delivered_is_terminal_for_location_but_not_final() {
        assert!(ParcelStatus::Delivered.is_terminal_for_location());
        assert!(!ParcelStatus::Delivered.is_final());
        assert!(ParcelStatus::Cancelled.is_final());
        assert!(!ParcelStatus::InTransit.is_terminal_for_location());
    }
}
