use std::sync::Arc;

use async_trait::async_trait;
use common_metrics::SharedRecorder;
use health::HealthRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use opentelemetry::global::BoxedTracer;
use tokio_util::sync::CancellationToken;
use youless_client::{MeterReading, PhaseReading};
use youless_observer::ReadFn;

use crate::buildinfo::BuildInfo;
use crate::config::{ObserverConfig, ServerConfig, TelemetryConfig, YoulessConfig};
use crate::logging::LogAdapter;
use crate::server::{self, HttpServer};
use crate::telemetry::{self, Provider};

/// What the coordinator needs from the telemetry provider.
#[async_trait]
pub trait Telemetry: Send + Sync {
    fn tracer(&self, name: &'static str) -> BoxedTracer;

    fn meter(&self) -> SharedRecorder;

    fn metrics_handle(&self) -> PrometheusHandle;

    async fn force_flush(&self) -> Result<(), telemetry::Error>;

    async fn shutdown(&self) -> Result<(), telemetry::Error>;
}

#[async_trait]
pub trait Server: Send + Sync {
    /// Blocks until `token` is cancelled, `shutdown` is called or serving fails.
    async fn run(&self, token: CancellationToken) -> Result<(), server::Error>;

    async fn shutdown(&self) -> Result<(), server::Error>;
}

#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn meter_reading(&self) -> Result<MeterReading, youless_client::Error>;

    async fn phase_reading(&self) -> Result<PhaseReading, youless_client::Error>;
}

#[async_trait]
pub trait Observer: Send + Sync {
    fn start(&self) -> Result<(), youless_observer::Error>;

    /// Must succeed when the observer was never started.
    async fn stop(&self) -> Result<(), youless_observer::Error>;

    fn register_health_checkers(&self, registry: &HealthRegistry);
}

/// Creates the components, one method per construction stage.
pub trait Components {
    fn health_checker(&self, name: &str) -> Result<HealthRegistry, health::Error>;

    fn telemetry(
        &self,
        config: &TelemetryConfig,
        service_name: &str,
        build: &BuildInfo,
        health: &HealthRegistry,
    ) -> Result<Arc<dyn Telemetry>, telemetry::Error>;

    fn server(
        &self,
        config: &ServerConfig,
        service_name: &str,
        build: &BuildInfo,
        health: &HealthRegistry,
        telemetry: &dyn Telemetry,
    ) -> Result<Arc<dyn Server>, server::Error>;

    fn client(
        &self,
        config: &YoulessConfig,
        logger: Arc<LogAdapter>,
        tracer: BoxedTracer,
    ) -> Result<Arc<dyn DeviceClient>, youless_client::Error>;

    fn observer(
        &self,
        config: &ObserverConfig,
        meter: SharedRecorder,
        logger: Arc<LogAdapter>,
        read_meter: ReadFn<MeterReading>,
        read_phases: ReadFn<PhaseReading>,
    ) -> Result<Arc<dyn Observer>, youless_observer::Error>;
}

/// The real components.
pub struct Production;

impl Components for Production {
    fn health_checker(&self, name: &str) -> Result<HealthRegistry, health::Error> {
        HealthRegistry::new(name)
    }

    fn telemetry(
        &self,
        config: &TelemetryConfig,
        service_name: &str,
        build: &BuildInfo,
        health: &HealthRegistry,
    ) -> Result<Arc<dyn Telemetry>, telemetry::Error> {
        Ok(Arc::new(Provider::new(config, service_name, build, health)?))
    }

    fn server(
        &self,
        config: &ServerConfig,
        service_name: &str,
        build: &BuildInfo,
        health: &HealthRegistry,
        telemetry: &dyn Telemetry,
    ) -> Result<Arc<dyn Server>, server::Error> {
        Ok(Arc::new(HttpServer::new(
            config,
            service_name,
            build,
            health,
            telemetry.meter(),
            telemetry.metrics_handle(),
        )?))
    }

    fn client(
        &self,
        config: &YoulessConfig,
        logger: Arc<LogAdapter>,
        tracer: BoxedTracer,
    ) -> Result<Arc<dyn DeviceClient>, youless_client::Error> {
        let client = youless_client::Client::new(config.into())?
            .with_logger(logger)
            .with_tracer(tracer);
        Ok(Arc::new(client))
    }

    fn observer(
        &self,
        config: &ObserverConfig,
        meter: SharedRecorder,
        logger: Arc<LogAdapter>,
        read_meter: ReadFn<MeterReading>,
        read_phases: ReadFn<PhaseReading>,
    ) -> Result<Arc<dyn Observer>, youless_observer::Error> {
        let observer = youless_observer::Observer::builder(meter)
            .logger(logger)
            .meter_reading(config.meter_reading(), read_meter)
            .phase_reading(config.phase_reading(), read_phases)
            .build()?;
        Ok(Arc::new(observer))
    }
}

#[async_trait]
impl Telemetry for Provider {
    fn tracer(&self, name: &'static str) -> BoxedTracer {
        Provider::tracer(self, name)
    }

    fn meter(&self) -> SharedRecorder {
        Provider::meter(self)
    }

    fn metrics_handle(&self) -> PrometheusHandle {
        Provider::metrics_handle(self)
    }

    async fn force_flush(&self) -> Result<(), telemetry::Error> {
        Provider::force_flush(self).await
    }

    async fn shutdown(&self) -> Result<(), telemetry::Error> {
        Provider::shutdown(self).await
    }
}

#[async_trait]
impl Server for HttpServer {
    async fn run(&self, token: CancellationToken) -> Result<(), server::Error> {
        HttpServer::run(self, token).await
    }

    async fn shutdown(&self) -> Result<(), server::Error> {
        HttpServer::shutdown(self).await
    }
}

#[async_trait]
impl DeviceClient for youless_client::Client {
    async fn meter_reading(&self) -> Result<MeterReading, youless_client::Error> {
        youless_client::Client::meter_reading(self).await
    }

    async fn phase_reading(&self) -> Result<PhaseReading, youless_client::Error> {
        youless_client::Client::phase_reading(self).await
    }
}

#[async_trait]
impl Observer for youless_observer::Observer {
    fn start(&self) -> Result<(), youless_observer::Error> {
        youless_observer::Observer::start(self)
    }

    async fn stop(&self) -> Result<(), youless_observer::Error> {
        youless_observer::Observer::stop(self).await
    }

    fn register_health_checkers(&self, registry: &HealthRegistry) {
        youless_observer::Observer::register_health_checkers(self, registry)
    }
}
