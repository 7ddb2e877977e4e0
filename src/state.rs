use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::ingest::LocationIngestor;
use crate::engine::ledger::TrackingLedger;
use crate::engine::registry::ParcelRegistry;
use crate::engine::state_machine::ParcelStateMachine;
use crate::models::tracking::TrackingEvent;
use crate::notify::gateway::{NotificationGateway, NotificationJob};
use crate::notify::mailer::Mailer;
use crate::notify::worker::NotificationWorker;
use crate::observability::metrics::Metrics;
use crate::resolver::{AddressResolver, OfflineResolver};
use crate::store::memory::InMemoryStore;
use crate::store::Store;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub ledger: Arc<TrackingLedger>,
    pub machine: Arc<ParcelStateMachine>,
    pub ingestor: Arc<LocationIngestor>,
    pub registry: Arc<ParcelRegistry>,
    pub tracking_events_tx: broadcast::Sender<TrackingEvent>,
    pub metrics: Metrics,
}

impl AppState {
    /// Wires the components together. The returned receiver feeds the notification
    /// worker, which the caller spawns.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        resolver: Arc<dyn AddressResolver>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<NotificationJob>) {
        let metrics = Metrics::new();
        let (tracking_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let (notifier, notification_rx) =
            NotificationGateway::new(config.notification_queue_size, metrics.clone());

        let ledger = Arc::new(TrackingLedger::new(store.clone(), clock.clone()));
        let machine = Arc::new(ParcelStateMachine::new(
            store.clone(),
            ledger.clone(),
            notifier,
            tracking_events_tx.clone(),
            metrics.clone(),
            config.transition_max_retries,
        ));
        let ingestor = Arc::new(LocationIngestor::new(
            store.clone(),
            resolver.clone(),
            machine.clone(),
            clock,
            metrics.clone(),
            config.proximity_threshold_meters,
            config.resolver_timeout,
        ));
        let registry = Arc::new(ParcelRegistry::new(
            store.clone(),
            ledger.clone(),
            resolver,
            config.resolver_timeout,
        ));

        (
            Self {
                config,
                store,
                ledger,
                machine,
                ingestor,
                registry,
                tracking_events_tx,
                metrics,
            },
            notification_rx,
        )
    }

    /// Process-local wiring: in-memory store, no geocoder, system clock.
    pub fn in_memory(config: Config) -> (Self, mpsc::Receiver<NotificationJob>) {
        Self::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(OfflineResolver),
            Arc::new(SystemClock),
        )
    }

    pub fn notification_worker(&self, mailer: Arc<dyn Mailer>) -> NotificationWorker {
        NotificationWorker::new(
            self.store.clone(),
            mailer,
            self.config.location_notification_window,
            self.metrics.clone(),
        )
    }
}
