use std::sync::Arc;

use platform_types::AuditEntry;
use utils::config::Config;
use utils::storage::{FileStore, Store};
use utils::telemetry::Metrics;

use crate::event_bus::EventBus;
use crate::lifecycle::LifecycleManager;
use crate::service_engine::ServiceEngine;

/// Shared state handed to every axum handler, analogous to the teacher's
/// `HttpState`: config, the registered-service substrate, and metrics.
#[derive(Clone)]
pub struct HttpState {
    pub config: Config,
    pub services: Arc<Vec<Arc<dyn ServiceEngine>>>,
    pub lifecycle: Arc<LifecycleManager>,
    pub bus: Arc<EventBus>,
    pub metrics: Arc<Metrics>,
    pub audit: Arc<FileStore<AuditEntry>>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl HttpState {
    pub fn new(
        config: Config,
        services: Vec<Arc<dyn ServiceEngine>>,
        lifecycle: Arc<LifecycleManager>,
        bus: Arc<EventBus>,
        metrics: Arc<Metrics>,
        audit: Arc<FileStore<AuditEntry>>,
    ) -> Self {
        Self {
            config,
            services: Arc::new(services),
            lifecycle,
            bus,
            metrics,
            audit,
            started_at: chrono::Utc::now(),
        }
    }

    pub fn find_service(&self, name: &str) -> Option<&Arc<dyn ServiceEngine>> {
        self.services.iter().find(|s| s.name() == name)
    }
}
