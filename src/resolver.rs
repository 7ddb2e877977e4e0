use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::warn;

use crate::error::AppError;
use crate::geo::GeoPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub point: GeoPoint,
    pub formatted_address: String,
}

/// Geocoding backend. Calls may fail or hang; callers degrade instead of failing.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn reverse_geocode(&self, point: GeoPoint) -> Result<String, AppError>;

    async fn geocode(&self, address: &str) -> Result<GeocodedAddress, AppError>;
}

/// Used when no geocoding backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineResolver;

#[async_trait]
impl AddressResolver for OfflineResolver {
    async fn reverse_geocode(&self, _point: GeoPoint) -> Result<String, AppError> {
        Err(AppError::ResolverUnavailable(
            "no geocoding backend configured".to_string(),
        ))
    }

    async fn geocode(&self, _address: &str) -> Result<GeocodedAddress, AppError> {
        Err(AppError::ResolverUnavailable(
            "no geocoding backend configured".to_string(),
        ))
    }
}

pub fn coordinate_label(point: &GeoPoint) -> String {
    format!("{:.6},{:.6}", point.lat, point.lng)
}

/// Address for `point`, or its coordinates as text when the resolver fails or is slow.
pub async fn address_or_coordinates(
    resolver: &dyn AddressResolver,
    point: GeoPoint,
    limit: Duration,
) -> String {
    let failure = match timeout(limit, resolver.reverse_geocode(point)).await {
        Ok(Ok(address)) if !address.trim().is_empty() => return address,
        Ok(Ok(_)) => AppError::ResolverUnavailable("resolver returned an empty address".to_string()),
        Ok(Err(err)) => err,
        Err(_) => AppError::ResolverUnavailable(format!("reverse geocoding timed out after {limit:?}")),
    };

    warn!(
        lat = point.lat,
        lng = point.lng,
        error = %failure,
        "reverse geocoding failed; falling back to coordinates"
    );
    coordinate_label(&point)
}

pub async fn geocode_within(
    resolver: &dyn AddressResolver,
    address: &str,
    limit: Duration,
) -> Result<GeocodedAddress, AppError> {
    match timeout(limit, resolver.geocode(address)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::ResolverUnavailable(format!(
            "geocoding timed out after {limit:?}"
        ))),
    }
}
