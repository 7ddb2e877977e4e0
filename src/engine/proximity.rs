use serde::Serialize;

use crate::geo::{classify, distance_meters, GeoPoint, Proximity};
use crate::models::parcel::{Parcel, ParcelStatus};

/// What a driver's position means for one parcel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ProximityDecision {
    /// Within the threshold of the destination.
    Deliver { distance_m: f64 },
    /// Carrying the parcel but not there yet. Distance is unknown when the destination
    /// was never geocoded.
    LocationUpdate { distance_m: Option<f64> },
    /// Not picked up yet. Pickup always needs the driver's explicit confirmation, so
    /// being near the pickup point is reported and nothing more.
    AwaitingPickup {
        distance_to_pickup_m: Option<f64>,
        near_pickup: bool,
    },
    /// Location reports no longer apply.
    Settled,
}

pub fn evaluate_proximity(
    parcel: &Parcel,
    driver_at: &GeoPoint,
    threshold_meters: f64,
) -> ProximityDecision {
    match parcel.status {
        ParcelStatus::Assigned => {
            let distance_to_pickup_m = parcel
                .pickup_location
                .point()
                .map(|pickup| distance_meters(driver_at, &pickup));
            ProximityDecision::AwaitingPickup {
                distance_to_pickup_m,
                near_pickup: distance_to_pickup_m.is_some_and(|d| d <= threshold_meters),
            }
        }
        ParcelStatus::PickedUp
        | ParcelStatus::InTransit
        | ParcelStatus::OutForDelivery
        | ParcelStatus::ArrivedAtDestination => match parcel.destination_location.point() {
            Some(destination) => {
                let distance_m = distance_meters(driver_at, &destination);
                match classify(driver_at, &destination, threshold_meters) {
                    Proximity::AtDestination => ProximityDecision::Deliver { distance_m },
                    Proximity::EnRoute => ProximityDecision::LocationUpdate {
                        distance_m: Some(distance_m),
                    },
                }
            }
            None => ProximityDecision::LocationUpdate { distance_m: None },
        },
        ParcelStatus::Pending
        | ParcelStatus::Delivered
        | ParcelStatus::Completed
        | ParcelStatus::Cancelled => ProximityDecision::Settled,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{evaluate_proximity, ProximityDecision};
    use crate::geo::GeoPoint;
    use crate::models::location::Location;
    use crate::models::parcel::{Parcel, ParcelStatus, WeightCategory};

    fn location(lat: Option<f64>, lng: Option<f64>) -> Location {
        Location {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            address: "test".to_string(),
            latitude: lat,
            longitude: lng,
        }
    }

    fn parcel(status: ParcelStatus, destination: Location) -> Parcel {
        Parcel {
            id: Uuid::new_v4(),
            tracking_number: "TRK-TEST".to_string(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            driver_id: Some(Uuid::new_v4()),
            weight: 3.0,
            weight_category: WeightCategory::Medium,
            pickup_location: location(Some(-1.2921), Some(36.8219)),
            destination_location: destination,
            status,
            quote: Decimal::ZERO,
            created_at: Utc::now(),
            assigned_at: None,
            pickup_time: None,
            delivered_at: None,
            completed_at: None,
            updated_at: Utc::now(),
            is_active: true,
            version: 0,
        }
    }

    const DRIVER: GeoPoint = GeoPoint {
        lat: -1.2921,
        lng: 36.8219,
    };

    #[test]
    fn in_transit_parcel_near_destination_is_delivered() {
        let p = parcel(
            ParcelStatus::InTransit,
            location(Some(-1.2921), Some(36.8220)),
        );
        let decision = evaluate_proximity(&p, &DRIVER, 100.0);
        assert!(matches!(decision, ProximityDecision::Deliver { distance_m } if distance_m < 100.0));
    }

    #[test]
    fn far_destination_is_a_location_update() {
        let p = parcel(
            ParcelStatus::PickedUp,
            location(Some(-1.3200), Some(36.9000)),
        );
        let decision = evaluate_proximity(&p, &DRIVER, 100.0);
        assert!(matches!(
            decision,
            ProximityDecision::LocationUpdate { distance_m: Some(d) } if d > 8_000.0
        ));
    }

    #[test]
    fn assigned_parcel_at_pickup_is_never_picked_up_automatically() {
        let p = parcel(
            ParcelStatus::Assigned,
            location(Some(-1.2921), Some(36.8219)),
        );
        let decision = evaluate_proximity(&p, &DRIVER, 100.0);
        assert_eq!(
            decision,
            ProximityDecision::AwaitingPickup {
                distance_to_pickup_m: Some(0.0),
                near_pickup: true,
            }
        );
    }

    #[test]
    fn destination_without_coordinates_only_updates_location() {
        let p = parcel(ParcelStatus::InTransit, location(None, None));
        assert_eq!(
            evaluate_proximity(&p, &DRIVER, 100.0),
            ProximityDecision::LocationUpdate { distance_m: None }
        );
    }

    #[test]
    fn delivered_parcels_are_settled() {
        let p = parcel(
            ParcelStatus::Delivered,
            location(Some(-1.2921), Some(36.8220)),
        );
        assert_eq!(
            evaluate_proximity(&p, &DRIVER, 100.0),
            ProximityDecision::Settled
        );
    }
}
