use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use health::HealthRegistry;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Span};
use youless_client::{MeterReading, PhaseReading};
use youless_observer::ReadFn;

use crate::buildinfo::BuildInfo;
use crate::components::{Components, DeviceClient, Observer, Production, Server, Telemetry};
use crate::config::Config;
use crate::error::{Branch, Error, ShutdownError, ShutdownFailure};
use crate::lifecycle;
use crate::logging::LogAdapter;

pub const DEFAULT_SERVICE_NAME: &str = "youless-observer";

const HEALTH_REGISTRY_NAME: &str = "health";

// Deadline used when the shutdown timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Owns every component of the service and drives their lifecycle.
///
/// Components are created leaf first: health registry, telemetry, server,
/// device client and observer. `run` starts the observer and then serves
/// until cancelled. `shutdown` consumes the app, so nothing can run after it.
pub struct App {
    service_name: String,
    health: HealthRegistry,
    telemetry: Arc<dyn Telemetry>,
    server: Arc<dyn Server>,
    client: Arc<dyn DeviceClient>,
    observer: Arc<dyn Observer>,
}

type Outcome = (Branch, Duration, Result<(), ShutdownFailure>);

impl App {
    pub fn new(config: &Config, log_span: Span, build: BuildInfo) -> Result<Self, Error> {
        Self::with_components(&Production, config, log_span, build)
    }

    /// Creates the app with the given component factory. The first stage
    /// that fails aborts construction.
    pub fn with_components<C>(
        components: &C,
        config: &Config,
        log_span: Span,
        build: BuildInfo,
    ) -> Result<Self, Error>
    where
        C: Components + ?Sized,
    {
        let health = components
            .health_checker(HEALTH_REGISTRY_NAME)
            .map_err(Error::CreateHealthCheck)?;

        let service_name = config
            .telemetry
            .otel_service_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SERVICE_NAME)
            .to_owned();
        let telemetry = components
            .telemetry(&config.telemetry, &service_name, &build, &health)
            .map_err(Error::SetupTelemetry)?;

        let server = components
            .server(
                &config.server,
                &service_name,
                &build,
                &health,
                telemetry.as_ref(),
            )
            .map_err(Error::CreateServer)?;

        let logger = Arc::new(LogAdapter::new(log_span));
        let client = components
            .client(
                &config.youless,
                logger.clone(),
                telemetry.tracer("youless-client"),
            )
            .map_err(Error::CreateClient)?;

        let (read_meter, read_phases) = bind_readings(&client);
        let observer = components
            .observer(
                &config.observer,
                telemetry.meter(),
                logger,
                read_meter,
                read_phases,
            )
            .map_err(Error::CreateObserver)?;
        observer.register_health_checkers(&health);

        Ok(Self {
            service_name,
            health,
            telemetry,
            server,
            client,
            observer,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn client(&self) -> &dyn DeviceClient {
        self.client.as_ref()
    }

    /// Starts the observer, then serves until `token` is cancelled. The
    /// server is never started when the observer fails to start.
    pub async fn run(&self, token: CancellationToken) -> Result<(), Error> {
        self.observer.start().map_err(Error::StartObserver)?;
        info!(service = %self.service_name, "started");

        self.server.run(token).await.map_err(Error::RunServer)
    }

    /// Stops the server, then stops the observer while flushing and shutting
    /// down telemetry. Every branch runs to completion, bounded by `timeout`,
    /// and all failures are returned together. `Duration::MAX` waits without
    /// a deadline.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), ShutdownError> {
        let deadline = deadline_after(timeout);
        info!(timeout_ms = timeout.as_millis() as u64, "shutting down");

        let mut outcomes = Vec::with_capacity(3);

        let started = Instant::now();
        let result = match timeout_at(deadline, self.server.shutdown()).await {
            Ok(result) => result.map_err(ShutdownFailure::Server),
            Err(_) => Err(ShutdownFailure::Timeout),
        };
        outcomes.push((Branch::Server, started.elapsed(), result));

        let observer = tokio::spawn(stop_observer(self.observer.clone(), deadline));
        let telemetry = tokio::spawn(stop_telemetry(self.telemetry.clone(), deadline));
        let (observer, telemetry) = tokio::join!(observer, telemetry);
        outcomes.push(joined(Branch::Observer, observer));
        outcomes.push(joined(Branch::Telemetry, telemetry));

        let mut failures = Vec::new();
        let meter = self.telemetry.meter();
        metrics::with_local_recorder(meter.as_ref(), || {
            for (branch, elapsed, result) in outcomes {
                let status = if result.is_ok() { "ok" } else { "error" };
                lifecycle::emit_component_shutdown(
                    &self.service_name,
                    branch.as_str(),
                    status,
                    elapsed,
                );
                if let Err(failure) = result {
                    failures.push((branch, failure));
                }
            }
            lifecycle::emit_shutdown_completed(&self.service_name, failures.is_empty());
        });

        match ShutdownError::from_failures(failures) {
            None => {
                info!("shutdown complete");
                Ok(())
            }
            Some(err) => {
                error!("{err}");
                Err(err)
            }
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

fn bind_readings(
    client: &Arc<dyn DeviceClient>,
) -> (ReadFn<MeterReading>, ReadFn<PhaseReading>) {
    let meter_client = client.clone();
    let read_meter: ReadFn<MeterReading> = Arc::new(move || {
        let client = meter_client.clone();
        async move { client.meter_reading().await }.boxed()
    });

    let phase_client = client.clone();
    let read_phases: ReadFn<PhaseReading> = Arc::new(move || {
        let client = phase_client.clone();
        async move { client.phase_reading().await }.boxed()
    });

    (read_meter, read_phases)
}

async fn stop_observer(observer: Arc<dyn Observer>, deadline: Instant) -> Outcome {
    let started = Instant::now();
    let result = match timeout_at(deadline, observer.stop()).await {
        Ok(result) => result.map_err(ShutdownFailure::Observer),
        Err(_) => Err(ShutdownFailure::Timeout),
    };
    (Branch::Observer, started.elapsed(), result)
}

/// Flushes pending exports, then shuts telemetry down. A failed flush skips
/// the shutdown.
async fn stop_telemetry(telemetry: Arc<dyn Telemetry>, deadline: Instant) -> Outcome {
    let started = Instant::now();
    let result = match timeout_at(deadline, telemetry.force_flush()).await {
        Ok(Ok(())) => match timeout_at(deadline, telemetry.shutdown()).await {
            Ok(result) => result.map_err(ShutdownFailure::Telemetry),
            Err(_) => Err(ShutdownFailure::Timeout),
        },
        Ok(Err(err)) => Err(ShutdownFailure::Flush(err)),
        Err(_) => Err(ShutdownFailure::Timeout),
    };
    (Branch::Telemetry, started.elapsed(), result)
}

fn joined(branch: Branch, result: Result<Outcome, tokio::task::JoinError>) -> Outcome {
    match result {
        Ok(outcome) => outcome,
        Err(err) => (branch, Duration::ZERO, Err(ShutdownFailure::Panicked(err))),
    }
}
