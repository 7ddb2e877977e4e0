use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::ledger::TrackingLedger;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::location::NewLocation;
use crate::models::parcel::{Parcel, ParcelStatus, WeightCategory};
use crate::models::tracking::{EventDraft, TrackingEventType};
use crate::resolver::{geocode_within, AddressResolver};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct LocationInput {
    #[serde(default)]
    pub name: Option<String>,
    pub address: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A parcel as handed over by the ordering flow.
#[derive(Debug, Clone, Deserialize)]
pub struct NewParcel {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub weight: f64,
    pub quote: Decimal,
    pub pickup: LocationInput,
    pub destination: LocationInput,
}

/// Turns accepted orders into PENDING parcels with their opening ledger entry.
pub struct ParcelRegistry {
    store: Arc<dyn Store>,
    ledger: Arc<TrackingLedger>,
    resolver: Arc<dyn AddressResolver>,
    resolver_timeout: Duration,
}

impl ParcelRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<TrackingLedger>,
        resolver: Arc<dyn AddressResolver>,
        resolver_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            resolver,
            resolver_timeout,
        }
    }

    pub async fn register(&self, request: NewParcel) -> Result<Parcel, AppError> {
        if !request.weight.is_finite() || request.weight <= 0.0 {
            return Err(AppError::BadRequest("weight must be > 0".to_string()));
        }
        if request.quote.is_sign_negative() {
            return Err(AppError::BadRequest("quote cannot be negative".to_string()));
        }
        if request.sender_id == request.receiver_id {
            return Err(AppError::BadRequest(
                "sender and receiver must differ".to_string(),
            ));
        }

        let pickup = self.locate(request.pickup, "Pickup").await?;
        let destination = self.locate(request.destination, "Destination").await?;

        let pickup_location = self.store.find_or_create_location(pickup.clone()).await?;
        let destination_location = self.store.find_or_create_location(destination).await?;

        let id = Uuid::new_v4();
        let opening = self
            .ledger
            .opening_event(
                EventDraft::new(id, TrackingEventType::OrderCreated, ParcelStatus::Pending)
                    .describe("Parcel order created")
                    .at(Some(pickup)),
            )
            .await?;

        let parcel = Parcel {
            id,
            tracking_number: tracking_number(id),
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            driver_id: None,
            weight: request.weight,
            weight_category: WeightCategory::from_weight(request.weight),
            pickup_location,
            destination_location,
            status: ParcelStatus::Pending,
            quote: request.quote,
            created_at: opening.created_at,
            assigned_at: None,
            pickup_time: None,
            delivered_at: None,
            completed_at: None,
            updated_at: opening.created_at,
            is_active: true,
            version: 0,
        };

        let (parcel, _) = self.store.insert_parcel(parcel, opening).await?;

        info!(
            parcel_id = %parcel.id,
            tracking_number = %parcel.tracking_number,
            weight_category = ?parcel.weight_category,
            "parcel registered"
        );
        Ok(parcel)
    }

    /// Uses the given coordinates when both are present, otherwise geocodes the address.
    /// A location the resolver cannot place is kept without coordinates.
    async fn locate(&self, input: LocationInput, default_name: &str) -> Result<NewLocation, AppError> {
        let address = input.address.trim().to_string();
        if address.is_empty() {
            return Err(AppError::BadRequest(format!(
                "{} address cannot be empty",
                default_name.to_lowercase()
            )));
        }
        let name = input
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_name.to_string());

        if let (Some(lat), Some(lng)) = (input.latitude, input.longitude) {
            let point = GeoPoint::new(lat, lng)?;
            return Ok(NewLocation {
                name,
                address,
                latitude: Some(point.lat),
                longitude: Some(point.lng),
            });
        }

        match geocode_within(self.resolver.as_ref(), &address, self.resolver_timeout).await {
            Ok(geocoded) => Ok(NewLocation {
                name,
                address: geocoded.formatted_address,
                latitude: Some(geocoded.point.lat),
                longitude: Some(geocoded.point.lng),
            }),
            Err(err) => {
                warn!(address = %address, error = %err, "geocoding failed; storing location without coordinates");
                Ok(NewLocation {
                    name,
                    address,
                    latitude: None,
                    longitude: None,
                })
            }
        }
    }
}

/// `TRK-` followed by the first twelve hex digits of the parcel id, uppercased.
pub fn tracking_number(id: Uuid) -> String {
    let hex = id.simple().to_string().to_uppercase();
    format!("TRK-{}", &hex[..12])
}
