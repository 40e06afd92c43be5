use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// One service's self-reported health, as returned from `ServiceEngine::ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    pub detail: Option<String>,
    pub elapsed: Duration,
}

/// Aggregate view served by `GET /readyz` and `GET /system/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub details: BTreeMap<String, ServiceHealth>,
    pub slow_modules: Vec<String>,
}

/// Combines per-service health checks into one readiness report. `ready` is
/// true only when every service reports `Healthy`. A service whose check
/// took longer than `slow_threshold` is listed in `slow_modules`, per
/// spec.md §6's "slow-module report".
pub fn aggregate_readiness(checks: Vec<ServiceHealth>, slow_threshold: Duration) -> ReadinessReport {
    let ready = checks.iter().all(|c| c.status == HealthStatus::Healthy);
    let slow_modules = checks
        .iter()
        .filter(|c| c.elapsed > slow_threshold)
        .map(|c| c.name.clone())
        .collect();
    let details = checks.into_iter().map(|c| (c.name.clone(), c)).collect();

    ReadinessReport {
        ready,
        details,
        slow_modules,
    }
}
