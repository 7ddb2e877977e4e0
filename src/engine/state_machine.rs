use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::ledger::TrackingLedger;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::location::NewLocation;
use crate::models::parcel::{Parcel, ParcelStatus};
use crate::models::tracking::{EventDraft, TrackingEvent, TrackingEventType};
use crate::notify::gateway::NotificationGateway;
use crate::observability::metrics::Metrics;
use crate::store::Store;

/// Legal targets out of each status. Anything not listed is rejected.
pub fn allowed_targets(from: ParcelStatus) -> &'static [ParcelStatus] {
    use ParcelStatus::*;

    match from {
        Pending => &[Assigned, Cancelled],
        Assigned => &[PickedUp, Cancelled],
        PickedUp => &[
            InTransit,
            OutForDelivery,
            ArrivedAtDestination,
            Delivered,
            Cancelled,
        ],
        InTransit => &[
            InTransit,
            OutForDelivery,
            ArrivedAtDestination,
            Delivered,
            Cancelled,
        ],
        OutForDelivery => &[ArrivedAtDestination, Delivered, Cancelled],
        ArrivedAtDestination => &[Delivered, Cancelled],
        Delivered => &[Completed],
        Completed | Cancelled => &[],
    }
}

pub fn is_legal(from: ParcelStatus, to: ParcelStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Extra information carried by a transition request.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    /// Set for transitions derived from a location report rather than a person.
    pub automated: bool,
    /// Driver to attach when assigning.
    pub driver_id: Option<Uuid>,
    pub location: Option<NewLocation>,
    pub note: Option<String>,
}

impl TransitionContext {
    pub fn manual() -> Self {
        Self::default()
    }

    pub fn automated(location: NewLocation) -> Self {
        Self {
            automated: true,
            location: Some(location),
            ..Self::default()
        }
    }

    pub fn with_driver(mut self, driver_id: Uuid) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied { parcel: Parcel, event: TrackingEvent },
    /// The requested status was already the latest recorded one.
    Unchanged { parcel: Parcel },
}

impl TransitionOutcome {
    pub fn parcel(&self) -> &Parcel {
        match self {
            TransitionOutcome::Applied { parcel, .. } | TransitionOutcome::Unchanged { parcel } => {
                parcel
            }
        }
    }

    pub fn event(&self) -> Option<&TrackingEvent> {
        match self {
            TransitionOutcome::Applied { event, .. } => Some(event),
            TransitionOutcome::Unchanged { .. } => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

pub struct ParcelStateMachine {
    store: Arc<dyn Store>,
    ledger: Arc<TrackingLedger>,
    notifier: NotificationGateway,
    events_tx: broadcast::Sender<TrackingEvent>,
    metrics: Metrics,
    max_retries: u32,
}

impl ParcelStateMachine {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<TrackingLedger>,
        notifier: NotificationGateway,
        events_tx: broadcast::Sender<TrackingEvent>,
        metrics: Metrics,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            events_tx,
            metrics,
            max_retries,
        }
    }

    /// Single attempt. A lost race surfaces as `ConcurrentModification`.
    pub async fn transition(
        &self,
        parcel_id: Uuid,
        target: ParcelStatus,
        actor: &Actor,
        context: &TransitionContext,
    ) -> Result<TransitionOutcome, AppError> {
        let start = Instant::now();
        let result = self.apply(parcel_id, target, actor, context).await;

        let outcome = match &result {
            Ok(TransitionOutcome::Applied { .. }) => "applied",
            Ok(TransitionOutcome::Unchanged { .. }) => "unchanged",
            Err(AppError::ConcurrentModification(_)) => "conflict",
            Err(AppError::InvalidTransition { .. }) => "rejected",
            Err(_) => "error",
        };
        self.metrics
            .transitions_total
            .with_label_values(&[target.as_str(), outcome])
            .inc();
        self.metrics
            .transition_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        result
    }

    /// Re-runs `transition` against fresh state after lost races, a few times at most.
    pub async fn transition_with_retry(
        &self,
        parcel_id: Uuid,
        target: ParcelStatus,
        actor: &Actor,
        context: &TransitionContext,
    ) -> Result<TransitionOutcome, AppError> {
        self.retrying(parcel_id, move || self.transition(parcel_id, target, actor, context))
            .await
    }

    /// Admin-only escape hatch that may move a parcel backwards. Still refuses to touch
    /// completed or cancelled parcels.
    pub async fn override_status(
        &self,
        parcel_id: Uuid,
        target: ParcelStatus,
        actor: &Actor,
        reason: &str,
        driver_id: Option<Uuid>,
    ) -> Result<TransitionOutcome, AppError> {
        if !actor.is_admin() {
            return Err(AppError::Forbidden(
                "status overrides require an admin".to_string(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(
                "an override needs a reason".to_string(),
            ));
        }

        self.retrying(parcel_id, move || {
            self.apply_override(parcel_id, target, actor, reason, driver_id)
        })
        .await
    }

    async fn retrying<F, Fut>(&self, parcel_id: Uuid, mut op: F) -> Result<TransitionOutcome, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<TransitionOutcome, AppError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(parcel_id = %parcel_id, attempt, "lost parcel race; retrying with fresh state");
                    sleep(Duration::from_millis(5 * u64::from(attempt))).await;
                }
                result => return result,
            }
        }
    }

    async fn apply(
        &self,
        parcel_id: Uuid,
        target: ParcelStatus,
        actor: &Actor,
        context: &TransitionContext,
    ) -> Result<TransitionOutcome, AppError> {
        let parcel = self.load(parcel_id).await?;
        let from = self.projected_status(&parcel).await?;

        if from == target && target != ParcelStatus::InTransit {
            debug!(parcel_id = %parcel_id, status = %target, "status already recorded; nothing to do");
            return Ok(TransitionOutcome::Unchanged { parcel });
        }

        // A position report for a parcel already past IN_TRANSIT is logged without moving
        // the parcel backwards.
        let keeps_status = context.automated
            && target == ParcelStatus::InTransit
            && matches!(
                from,
                ParcelStatus::OutForDelivery | ParcelStatus::ArrivedAtDestination
            );
        let next = if keeps_status { from } else { target };

        if !keeps_status && !is_legal(from, target) {
            return Err(AppError::InvalidTransition { from, to: target });
        }

        let mut updated = parcel.clone();
        if target == ParcelStatus::Assigned {
            let driver_id = context.driver_id.ok_or_else(|| {
                AppError::BadRequest("driver_id is required to assign a parcel".to_string())
            })?;
            updated.driver_id = Some(driver_id);
        }
        if next.requires_driver() && updated.driver_id.is_none() {
            return Err(AppError::InvalidTransition { from, to: target });
        }
        updated.status = next;

        let event_type = TrackingEventType::for_status(target);
        let description = context
            .note
            .clone()
            .unwrap_or_else(|| describe(event_type, context));
        let draft = EventDraft::new(parcel_id, event_type, next)
            .describe(description)
            .at(context.location.clone())
            .automated(context.automated)
            .by_driver(updated.driver_id);

        let (updated, event) = self
            .ledger
            .commit(parcel.version, updated, draft, |parcel, event| {
                if event.status != from {
                    parcel.stamp(event.status, event.created_at);
                }
            })
            .await?;

        info!(
            parcel_id = %parcel_id,
            tracking_number = %updated.tracking_number,
            from = %from,
            to = %updated.status,
            event_type = event.event_type.as_str(),
            automated = context.automated,
            actor = ?actor.role,
            "parcel transition applied"
        );

        self.publish(&updated, &event);
        Ok(TransitionOutcome::Applied {
            parcel: updated,
            event,
        })
    }

    async fn apply_override(
        &self,
        parcel_id: Uuid,
        target: ParcelStatus,
        actor: &Actor,
        reason: &str,
        driver_id: Option<Uuid>,
    ) -> Result<TransitionOutcome, AppError> {
        let parcel = self.load(parcel_id).await?;
        let from = self.projected_status(&parcel).await?;

        if from.is_final() {
            return Err(AppError::InvalidTransition { from, to: target });
        }
        if from == target && driver_id.is_none() {
            return Ok(TransitionOutcome::Unchanged { parcel });
        }

        let mut updated = parcel.clone();
        if let Some(driver_id) = driver_id {
            updated.driver_id = Some(driver_id);
        }
        if target.requires_driver() && updated.driver_id.is_none() {
            return Err(AppError::BadRequest(format!(
                "a driver is required for status {target}"
            )));
        }
        updated.status = target;

        let draft = EventDraft::new(parcel_id, TrackingEventType::Exception, target)
            .describe(format!("Status overridden from {from} to {target}: {reason}"))
            .by_driver(updated.driver_id);

        let (updated, event) = self
            .ledger
            .commit(parcel.version, updated, draft, |parcel, event| {
                parcel.stamp(event.status, event.created_at);
            })
            .await?;

        warn!(
            parcel_id = %parcel_id,
            from = %from,
            to = %target,
            admin_id = ?actor.id,
            reason,
            "parcel status overridden"
        );

        self.publish(&updated, &event);
        Ok(TransitionOutcome::Applied {
            parcel: updated,
            event,
        })
    }

    async fn load(&self, parcel_id: Uuid) -> Result<Parcel, AppError> {
        self.store
            .parcel(parcel_id)
            .await?
            .filter(|parcel| parcel.is_active)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))
    }

    /// The ledger wins over the cached column. The next commit rewrites the cache.
    async fn projected_status(&self, parcel: &Parcel) -> Result<ParcelStatus, AppError> {
        let projected = self.ledger.current_status(parcel.id).await?;
        if projected != parcel.status {
            error!(
                parcel_id = %parcel.id,
                cached = %parcel.status,
                projected = %projected,
                "cached parcel status disagrees with tracking ledger"
            );
        }
        Ok(projected)
    }

    fn publish(&self, parcel: &Parcel, event: &TrackingEvent) {
        let _ = self.events_tx.send(event.clone());
        self.notifier.dispatch(event, parcel);
    }
}

fn describe(event_type: TrackingEventType, context: &TransitionContext) -> String {
    match event_type {
        TrackingEventType::OrderCreated => "Parcel order created".to_string(),
        TrackingEventType::DriverAssigned => "Driver assigned to parcel".to_string(),
        TrackingEventType::PickedUp => "Parcel picked up by driver".to_string(),
        TrackingEventType::LocationUpdate => match &context.location {
            Some(location) => format!("Parcel in transit near {}", location.address),
            None => "Parcel in transit".to_string(),
        },
        TrackingEventType::OutForDelivery => "Parcel out for delivery".to_string(),
        TrackingEventType::ArrivedAtDestination => "Driver arrived at destination".to_string(),
        TrackingEventType::Delivered if context.automated => {
            "Parcel delivered: driver reached the destination".to_string()
        }
        TrackingEventType::Delivered => "Parcel delivered".to_string(),
        TrackingEventType::Completed => "Delivery completed".to_string(),
        TrackingEventType::Cancelled => "Parcel cancelled".to_string(),
        TrackingEventType::Exception => "Exception recorded".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{allowed_targets, is_legal};
    use crate::models::parcel::ParcelStatus;

    const ALL: [ParcelStatus; 9] = [
        ParcelStatus::Pending,
        ParcelStatus::Assigned,
        ParcelStatus::PickedUp,
        ParcelStatus::InTransit,
        ParcelStatus::OutForDelivery,
        ParcelStatus::ArrivedAtDestination,
        ParcelStatus::Delivered,
        ParcelStatus::Completed,
        ParcelStatus::Cancelled,
    ];

    #[test]
    fn final_statuses_have_no_way_out() {
        assert!(allowed_targets(ParcelStatus::Completed).is_empty());
        assert!(allowed_targets(ParcelStatus::Cancelled).is_empty());
    }

    #[test]
    fn cancel_is_reachable_from_every_status_before_delivery() {
        for from in ALL {
            let expected = from.rank() < ParcelStatus::Delivered.rank();
            assert_eq!(is_legal(from, ParcelStatus::Cancelled), expected, "from {from}");
        }
    }

    #[test]
    fn no_edge_goes_backwards() {
        for from in ALL {
            for to in allowed_targets(from) {
                assert!(
                    *to == ParcelStatus::Cancelled || to.rank() >= from.rank(),
                    "{from} -> {to} regresses"
                );
            }
        }
    }

    #[test]
    fn pickup_cannot_be_skipped() {
        assert!(!is_legal(ParcelStatus::Assigned, ParcelStatus::InTransit));
        assert!(!is_legal(ParcelStatus::Assigned, ParcelStatus::Delivered));
        assert!(!is_legal(ParcelStatus::Pending, ParcelStatus::PickedUp));
    }

    #[test]
    fn completion_only_follows_delivery() {
        for from in ALL {
            assert_eq!(
                is_legal(from, ParcelStatus::Completed),
                from == ParcelStatus::Delivered
            );
        }
    }
}
