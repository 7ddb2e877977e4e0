use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::notification::NotificationTemplate;
use crate::models::parcel::Parcel;
use crate::models::tracking::TrackingEvent;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub event: TrackingEvent,
    pub parcel: Parcel,
}

/// Producer side of the notification queue. `dispatch` never waits and never fails.
#[derive(Clone)]
pub struct NotificationGateway {
    tx: mpsc::Sender<NotificationJob>,
    metrics: Metrics,
}

impl NotificationGateway {
    pub fn new(queue_size: usize, metrics: Metrics) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (tx, rx) = mpsc::channel(queue_size);
        (Self { tx, metrics }, rx)
    }

    pub fn dispatch(&self, event: &TrackingEvent, parcel: &Parcel) {
        if NotificationTemplate::for_event(event.event_type).is_none() {
            return;
        }

        let job = NotificationJob {
            event: event.clone(),
            parcel: parcel.clone(),
        };

        match self.tx.try_send(job) {
            Ok(()) => {
                self.metrics.notifications_in_queue.inc();
                debug!(
                    parcel_id = %event.parcel_id,
                    event_type = event.event_type.as_str(),
                    "notification queued"
                );
            }
            Err(TrySendError::Full(job)) => {
                self.dropped(&job, "notification queue full");
            }
            Err(TrySendError::Closed(job)) => {
                self.dropped(&job, "notification worker is not running");
            }
        }
    }

    fn dropped(&self, job: &NotificationJob, reason: &str) {
        self.metrics
            .notifications_total
            .with_label_values(&["dropped"])
            .inc();
        let err = AppError::NotificationFailed(reason.to_string());
        warn!(
            parcel_id = %job.event.parcel_id,
            event_type = job.event.event_type.as_str(),
            error = %err,
            "notification dropped"
        );
    }
}
