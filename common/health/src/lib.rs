use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{info, warn};

/// Health reporting for components of the service.
///
/// Every component that wants to take part in the process health registers
/// a named probe. The process' health status is the combination of the
/// individual probe results:
///   - if any probe is unhealthy, the process is unhealthy
///   - degraded probes are reported but keep the process healthy
///   - a registry without any probe is unhealthy, nothing vouches for it yet
///
/// The registry is a cheap handle over shared state: clone it and pass it to
/// every component that registers or queries probes.

#[derive(Debug, Error)]
pub enum Error {
    #[error("health registry name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ProbeStatus {
    Healthy,
    /// Working, but not as expected
    Degraded(String),
    Unhealthy(String),
}

impl ProbeStatus {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, ProbeStatus::Unhealthy(_))
    }

    fn severity(&self) -> u8 {
        match self {
            ProbeStatus::Healthy => 0,
            ProbeStatus::Degraded(_) => 1,
            ProbeStatus::Unhealthy(_) => 2,
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Healthy => write!(f, "healthy"),
            ProbeStatus::Degraded(reason) => write!(f, "degraded: {reason}"),
            ProbeStatus::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// A named health probe.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check_health(&self) -> ProbeStatus;
}

#[derive(Debug)]
pub struct HealthStatus {
    /// The overall status: false if any probe is unhealthy
    pub healthy: bool,
    /// Worst status among all probes
    pub status: ProbeStatus,
    /// Current status of each registered probe, for display
    pub components: BTreeMap<String, ProbeStatus>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            healthy: false,
            status: ProbeStatus::Unhealthy("no probes registered".to_string()),
            components: BTreeMap::new(),
        }
    }
}

impl IntoResponse for HealthStatus {
    /// Computes the axum status code based on the overall health status,
    /// and prints each component status in the body for debugging.
    fn into_response(self) -> Response {
        let body = format!("{self:?}");
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a heartbeat is newly registered
    Starting,
    /// Recently reported healthy, will need to report again before the date
    HealthyUntil(time::OffsetDateTime),
    /// Reported degraded
    Degraded(String),
    /// Reported unhealthy
    Unhealthy(String),
}

/// Heartbeat probe handed to a looping component, which must call
/// [`HealthHandle::report_healthy`] more often than its deadline.
#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: time::Duration,
    status: Arc<RwLock<ComponentStatus>>,
}

impl HealthHandle {
    pub fn new(component: &str, deadline: std::time::Duration) -> Self {
        Self {
            component: component.to_owned(),
            deadline: time::Duration::try_from(deadline).unwrap_or(time::Duration::MAX),
            status: Arc::new(RwLock::new(ComponentStatus::Starting)),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Report healthy until now + deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            time::OffsetDateTime::now_utc().add(self.deadline),
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        if let Ok(mut current) = self.status.write() {
            *current = status;
        } else {
            // Poisoned lock: the probe keeps its last status and the check reports it
            warn!("poisoned HealthHandle lock for {}", self.component)
        }
    }

    pub fn status(&self) -> ComponentStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(_) => ComponentStatus::Unhealthy("poisoned lock".to_string()),
        }
    }
}

#[async_trait]
impl HealthChecker for HealthHandle {
    async fn check_health(&self) -> ProbeStatus {
        match self.status() {
            ComponentStatus::Starting => ProbeStatus::Degraded("starting".to_string()),
            ComponentStatus::HealthyUntil(until) => {
                if until.gt(&time::OffsetDateTime::now_utc()) {
                    ProbeStatus::Healthy
                } else {
                    ProbeStatus::Unhealthy("stalled".to_string())
                }
            }
            ComponentStatus::Degraded(reason) => ProbeStatus::Degraded(reason),
            ComponentStatus::Unhealthy(reason) => ProbeStatus::Unhealthy(reason),
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    probes: Arc<RwLock<BTreeMap<String, Arc<dyn HealthChecker>>>>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Result<Self, Error> {
        if name.trim().is_empty() {
            return Err(Error::EmptyName);
        }
        Ok(Self {
            name: name.to_owned(),
            probes: Default::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a probe under the given name, replacing any previous probe with that name.
    pub fn register<P>(&self, name: &str, probe: P)
    where
        P: HealthChecker + 'static,
    {
        match self.probes.write() {
            Ok(mut probes) => {
                if probes.insert(name.to_owned(), Arc::new(probe)).is_some() {
                    warn!("{} health probe {} registered twice", self.name, name);
                }
            }
            Err(_) => warn!("poisoned HealthRegistry lock, probe {} not registered", name),
        }
    }

    /// Registers a heartbeat probe and returns the handle the component reports through.
    pub fn register_heartbeat(&self, name: &str, deadline: std::time::Duration) -> HealthHandle {
        let handle = HealthHandle::new(name, deadline);
        self.register(name, handle.clone());
        handle
    }

    pub fn probe_names(&self) -> Vec<String> {
        match self.probes.read() {
            Ok(probes) => probes.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Runs every registered probe and combines their results. Can be used as an axum handler.
    pub async fn check_all(&self) -> HealthStatus {
        // Snapshot the probes so no lock is held while they run
        let probes: Vec<(String, Arc<dyn HealthChecker>)> = match self.probes.read() {
            Ok(probes) => probes
                .iter()
                .map(|(name, probe)| (name.clone(), probe.clone()))
                .collect(),
            Err(_) => {
                warn!("poisoned HealthRegistry lock");
                return HealthStatus::default();
            }
        };
        if probes.is_empty() {
            warn!("{} health check failed: no probes registered", self.name);
            return HealthStatus::default();
        }

        let mut result = HealthStatus {
            healthy: true,
            status: ProbeStatus::Healthy,
            components: BTreeMap::new(),
        };
        for (name, probe) in probes {
            let status = probe.check_health().await;
            if status.severity() > result.status.severity() {
                result.status = status.clone();
            }
            result.components.insert(name, status);
        }
        result.healthy = result.status.is_healthy();

        match result.healthy {
            true => info!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, result.components),
        }
        result
    }
}
