use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::models::actor::Contact;
use crate::models::notification::{Audience, NotificationTemplate};
use crate::models::parcel::ParcelStatus;
use crate::models::tracking::{TrackingEvent, TrackingEventType};
use crate::notify::gateway::NotificationJob;
use crate::notify::mailer::Mailer;
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { delivered: usize, failed: usize },
    Throttled,
    Stale,
    NoTemplate,
}

impl DispatchOutcome {
    fn label(self) -> &'static str {
        match self {
            DispatchOutcome::Sent { failed: 0, .. } => "sent",
            DispatchOutcome::Sent { .. } => "partial",
            DispatchOutcome::Throttled => "throttled",
            DispatchOutcome::Stale => "stale",
            DispatchOutcome::NoTemplate => "skipped",
        }
    }
}

pub struct NotificationWorker {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    location_window: chrono::Duration,
    metrics: Metrics,
}

impl NotificationWorker {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        location_window: std::time::Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            mailer,
            location_window: chrono::Duration::from_std(location_window)
                .unwrap_or(chrono::Duration::MAX),
            metrics,
        }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<NotificationJob>) {
        info!("notification worker started");

        while let Some(job) = rx.recv().await {
            self.metrics.notifications_in_queue.dec();

            let parcel_id = job.event.parcel_id;
            match self.process(job).await {
                Ok(outcome) => {
                    self.metrics
                        .notifications_total
                        .with_label_values(&[outcome.label()])
                        .inc();
                }
                Err(err) => {
                    self.metrics
                        .notifications_total
                        .with_label_values(&["error"])
                        .inc();
                    error!(parcel_id = %parcel_id, error = %err, "failed to process notification");
                }
            }
        }

        warn!("notification worker stopped: queue channel closed");
    }

    pub async fn process(&self, job: NotificationJob) -> Result<DispatchOutcome, AppError> {
        let NotificationJob { event, parcel } = job;

        let Some(template) = NotificationTemplate::for_event(event.event_type) else {
            return Ok(DispatchOutcome::NoTemplate);
        };

        if template.is_throttled() {
            if let Some(prior) = self.prior_location_update(&event).await? {
                debug!(
                    parcel_id = %parcel.id,
                    prior_event = %prior.id,
                    prior_at = %prior.created_at,
                    "location notification throttled"
                );
                return Ok(DispatchOutcome::Throttled);
            }
        }

        let current_status = self
            .store
            .parcel(parcel.id)
            .await?
            .map_or(parcel.status, |current| current.status);
        if current_status == ParcelStatus::Cancelled
            && event.event_type != TrackingEventType::Cancelled
        {
            debug!(parcel_id = %parcel.id, "parcel cancelled; dropping stale notification");
            return Ok(DispatchOutcome::Stale);
        }

        let recipient_ids = match template.audience() {
            Audience::Sender => vec![parcel.sender_id],
            Audience::Receiver => vec![parcel.receiver_id],
            Audience::Both => vec![parcel.sender_id, parcel.receiver_id],
        };

        let mut recipients: Vec<Contact> = Vec::with_capacity(recipient_ids.len());
        for user_id in recipient_ids {
            match self.store.contact(user_id).await? {
                Some(contact) => recipients.push(contact),
                None => warn!(user_id = %user_id, "no contact on file; skipping recipient"),
            }
        }

        let mut delivered = 0;
        let mut failed = 0;
        for recipient in &recipients {
            let context = json!({
                "recipient_name": recipient.name,
                "tracking_number": parcel.tracking_number,
                "status": event.status,
                "event_type": event.event_type,
                "description": event.description,
                "location": event.location.as_ref().map(|l| l.address.clone()),
                "occurred_at": event.created_at.to_rfc3339(),
            });

            match self.mailer.send(template, recipient, &context).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    failed += 1;
                    let err = AppError::NotificationFailed(err.to_string());
                    warn!(
                        parcel_id = %parcel.id,
                        to = %recipient.email,
                        error = %err,
                        "mail delivery failed"
                    );
                }
            }
        }

        Ok(DispatchOutcome::Sent { delivered, failed })
    }

    /// Latest LOCATION_UPDATE in the ledger that precedes `event` by less than the window.
    async fn prior_location_update(
        &self,
        event: &TrackingEvent,
    ) -> Result<Option<TrackingEvent>, AppError> {
        let events = self.store.events(event.parcel_id).await?;
        Ok(events.into_iter().rev().find(|prior| {
            prior.id != event.id
                && prior.sequence < event.sequence
                && prior.event_type == TrackingEventType::LocationUpdate
                && event.created_at - prior.created_at < self.location_window
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use uuid::Uuid;

    use super::{DispatchOutcome, NotificationWorker};
    use crate::error::AppError;
    use crate::models::actor::Contact;
    use crate::models::location::Location;
    use crate::models::notification::NotificationTemplate;
    use crate::models::parcel::{Parcel, ParcelStatus, WeightCategory};
    use crate::models::tracking::{TrackingEvent, TrackingEventType};
    use crate::notify::gateway::NotificationJob;
    use crate::notify::mailer::Mailer;
    use crate::observability::metrics::Metrics;
    use crate::store::memory::InMemoryStore;
    use crate::store::Store;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(NotificationTemplate, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(
            &self,
            template: NotificationTemplate,
            recipient: &Contact,
            _context: &Value,
        ) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::Internal("smtp down".to_string()));
            }
            self.sent.lock().push((template, recipient.email.clone()));
            Ok(())
        }
    }

    fn location() -> Location {
        Location {
            id: Uuid::new_v4(),
            name: "x".to_string(),
            address: "x".to_string(),
            latitude: None,
            longitude: None,
        }
    }

    fn parcel(status: ParcelStatus) -> Parcel {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        Parcel {
            id: Uuid::new_v4(),
            tracking_number: "TRK-NOTIFY".to_string(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            driver_id: Some(Uuid::new_v4()),
            weight: 1.0,
            weight_category: WeightCategory::Light,
            pickup_location: location(),
            destination_location: location(),
            status,
            quote: Decimal::ONE,
            created_at: now,
            assigned_at: None,
            pickup_time: None,
            delivered_at: None,
            completed_at: None,
            updated_at: now,
            is_active: true,
            version: 0,
        }
    }

    fn event(parcel: &Parcel, event_type: TrackingEventType, minutes: i64) -> TrackingEvent {
        TrackingEvent {
            id: Uuid::new_v4(),
            parcel_id: parcel.id,
            sequence: 0,
            event_type,
            status: parcel.status,
            location: None,
            description: "test".to_string(),
            automated: true,
            driver_id: parcel.driver_id,
            created_at: parcel.created_at + Duration::minutes(minutes),
        }
    }

    async fn setup(
        status: ParcelStatus,
        fail: bool,
    ) -> (NotificationWorker, Arc<RecordingMailer>, Parcel) {
        let store = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(RecordingMailer {
            fail,
            ..RecordingMailer::default()
        });
        let p = parcel(status);
        let created = event(&p, TrackingEventType::OrderCreated, 0);
        let created = TrackingEvent { status, ..created };
        let (p, _) = store.insert_parcel(p, created).await.unwrap();

        for (user_id, email) in [(p.sender_id, "sender@example.com"), (p.receiver_id, "receiver@example.com")] {
            store
                .upsert_contact(Contact {
                    user_id,
                    name: email.to_string(),
                    email: email.to_string(),
                })
                .await
                .unwrap();
        }

        let worker = NotificationWorker::new(
            store,
            mailer.clone(),
            std::time::Duration::from_secs(30 * 60),
            Metrics::new(),
        );
        (worker, mailer, p)
    }

    fn job(parcel: &Parcel, event: TrackingEvent) -> NotificationJob {
        NotificationJob {
            event,
            parcel: parcel.clone(),
        }
    }

    /// Records the event in the ledger the way a committed transition would.
    async fn logged(
        worker: &NotificationWorker,
        parcel: &Parcel,
        event_type: TrackingEventType,
        minutes: i64,
    ) -> TrackingEvent {
        worker
            .store
            .append_event(event(parcel, event_type, minutes))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn location_updates_five_minutes_apart_send_once() {
        let (worker, mailer, p) = setup(ParcelStatus::InTransit, false).await;

        let first = logged(&worker, &p, TrackingEventType::LocationUpdate, 10).await;
        let first = worker.process(job(&p, first)).await.unwrap();
        let second = logged(&worker, &p, TrackingEventType::LocationUpdate, 15).await;
        let second = worker.process(job(&p, second)).await.unwrap();

        assert_eq!(first, DispatchOutcome::Sent { delivered: 1, failed: 0 });
        assert_eq!(second, DispatchOutcome::Throttled);
        assert_eq!(mailer.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn location_updates_forty_minutes_apart_send_twice() {
        let (worker, mailer, p) = setup(ParcelStatus::InTransit, false).await;

        let first = logged(&worker, &p, TrackingEventType::LocationUpdate, 10).await;
        worker.process(job(&p, first)).await.unwrap();
        let second = logged(&worker, &p, TrackingEventType::LocationUpdate, 50).await;
        let second = worker.process(job(&p, second)).await.unwrap();

        assert_eq!(second, DispatchOutcome::Sent { delivered: 1, failed: 0 });
        let sent = mailer.sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, to)| to == "receiver@example.com"));
    }

    #[tokio::test]
    async fn any_recent_location_update_in_the_ledger_throttles() {
        let (worker, mailer, p) = setup(ParcelStatus::InTransit, false).await;

        let mut outcomes = Vec::new();
        for minutes in [0, 25, 50] {
            let event = logged(&worker, &p, TrackingEventType::LocationUpdate, minutes).await;
            outcomes.push(worker.process(job(&p, event)).await.unwrap());
        }

        // 50 is within the window of the unsent update at 25
        assert_eq!(
            outcomes,
            vec![
                DispatchOutcome::Sent { delivered: 1, failed: 0 },
                DispatchOutcome::Throttled,
                DispatchOutcome::Throttled,
            ]
        );
        assert_eq!(mailer.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn later_ledger_entries_do_not_throttle_earlier_ones() {
        let (worker, mailer, p) = setup(ParcelStatus::InTransit, false).await;

        let first = logged(&worker, &p, TrackingEventType::LocationUpdate, 0).await;
        let second = logged(&worker, &p, TrackingEventType::LocationUpdate, 0).await;

        let first = worker.process(job(&p, first)).await.unwrap();
        let second = worker.process(job(&p, second)).await.unwrap();

        assert_eq!(first, DispatchOutcome::Sent { delivered: 1, failed: 0 });
        assert_eq!(second, DispatchOutcome::Throttled);
        assert_eq!(mailer.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn delivered_is_never_throttled_and_reaches_both_parties() {
        let (worker, mailer, p) = setup(ParcelStatus::Delivered, false).await;

        for minutes in [1, 2] {
            let outcome = worker
                .process(job(&p, event(&p, TrackingEventType::Delivered, minutes)))
                .await
                .unwrap();
            assert_eq!(outcome, DispatchOutcome::Sent { delivered: 2, failed: 0 });
        }
        assert_eq!(mailer.sent.lock().len(), 4);
    }

    #[tokio::test]
    async fn cancelled_parcel_drops_stale_notifications() {
        let (worker, mailer, p) = setup(ParcelStatus::Cancelled, false).await;

        let stale = worker
            .process(job(&p, event(&p, TrackingEventType::PickedUp, 1)))
            .await
            .unwrap();
        assert_eq!(stale, DispatchOutcome::Stale);

        let cancelled = worker
            .process(job(&p, event(&p, TrackingEventType::Cancelled, 2)))
            .await
            .unwrap();
        assert_eq!(cancelled, DispatchOutcome::Sent { delivered: 2, failed: 0 });
        assert_eq!(mailer.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn mail_failures_are_absorbed() {
        let (worker, mailer, p) = setup(ParcelStatus::PickedUp, true).await;

        let outcome = worker
            .process(job(&p, event(&p, TrackingEventType::PickedUp, 1)))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent { delivered: 0, failed: 2 });
        assert!(mailer.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn order_created_has_no_template() {
        let (worker, _mailer, p) = setup(ParcelStatus::Pending, false).await;
        let outcome = worker
            .process(job(&p, event(&p, TrackingEventType::OrderCreated, 0)))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::NoTemplate);
    }
}
