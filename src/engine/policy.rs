use crate::error::AppError;
use crate::models::actor::{Actor, ActorRole};
use crate::models::parcel::{Parcel, ParcelStatus};

/// Who may request which target status. Checked by callers before they reach the state
/// machine, which only knows about legal edges.
pub fn authorize_transition(
    actor: &Actor,
    parcel: &Parcel,
    target: ParcelStatus,
) -> Result<(), AppError> {
    if actor.is_admin() {
        return Ok(());
    }

    let allowed = match target {
        ParcelStatus::Pending | ParcelStatus::Assigned | ParcelStatus::Completed => false,
        ParcelStatus::Cancelled => actor.is(ActorRole::Sender, parcel.sender_id),
        ParcelStatus::PickedUp
        | ParcelStatus::InTransit
        | ParcelStatus::OutForDelivery
        | ParcelStatus::ArrivedAtDestination
        | ParcelStatus::Delivered => parcel
            .driver_id
            .is_some_and(|driver_id| actor.is(ActorRole::Driver, driver_id)),
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{:?} may not move parcel {} to {target}",
            actor.role, parcel.tracking_number
        )))
    }
}

/// Drivers may only report their own position.
pub fn authorize_location_report(actor: &Actor, driver_id: uuid::Uuid) -> Result<(), AppError> {
    if actor.is_admin() || actor.is(ActorRole::Driver, driver_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "cannot report location for driver {driver_id}"
        )))
    }
}
