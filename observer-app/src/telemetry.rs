use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common_metrics::SharedRecorder;
use health::{HealthChecker, HealthRegistry, ProbeStatus};
use metrics_exporter_prometheus::{BuildError, PrometheusHandle};
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::TraceError;
use opentelemetry::{KeyValue, Value};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing::{info, warn};

use crate::buildinfo::BuildInfo;
use crate::config::TelemetryConfig;

pub const PROBE_NAME: &str = "telemetry";

#[derive(Error, Debug)]
pub enum Error {
    #[error("sampling rate must be between 0 and 1, got {0}")]
    InvalidSamplingRate(f64),
    #[error("failed to build metrics recorder")]
    Recorder(#[from] BuildError),
    #[error("failed to install trace pipeline")]
    Tracer(#[source] TraceError),
    #[error("failed to flush trace exports")]
    Flush(#[source] TraceError),
    #[error("telemetry task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// Reports the provider state to the health registry.
#[derive(Clone)]
struct StateProbe(Arc<RwLock<ProbeStatus>>);

impl StateProbe {
    fn set(&self, status: ProbeStatus) {
        if let Ok(mut current) = self.0.write() {
            *current = status;
        }
    }
}

#[async_trait]
impl HealthChecker for StateProbe {
    async fn check_health(&self) -> ProbeStatus {
        match self.0.read() {
            Ok(status) => status.clone(),
            Err(_) => ProbeStatus::Unhealthy("poisoned lock".to_string()),
        }
    }
}

/// Owns the trace export pipeline and the metrics recorder.
///
/// Traces are exported over OTLP when an endpoint is configured, otherwise
/// the global no-op tracer provider stays in place. Metrics are recorded
/// into a local prometheus recorder that is never installed globally; the
/// components that emit metrics get it through [`Provider::meter`].
pub struct Provider {
    tracer: Option<Tracer>,
    recorder: SharedRecorder,
    handle: PrometheusHandle,
    probe: StateProbe,
    shut_down: AtomicBool,
}

impl Provider {
    pub fn new(
        config: &TelemetryConfig,
        service_name: &str,
        build: &BuildInfo,
        health: &HealthRegistry,
    ) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&config.otel_sampling_rate) {
            return Err(Error::InvalidSamplingRate(config.otel_sampling_rate));
        }

        let recorder = common_metrics::setup_metrics_recorder()?;
        let handle = recorder.handle();

        let tracer = match config.otel_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => {
                info!(url, service_name, "exporting traces");
                Some(
                    init_tracer(
                        url,
                        config.otel_sampling_rate,
                        service_name,
                        &build.version,
                        config.otel_export_timeout_secs,
                    )
                    .map_err(Error::Tracer)?,
                )
            }
            None => None,
        };

        let probe = StateProbe(Arc::new(RwLock::new(ProbeStatus::Healthy)));
        health.register(PROBE_NAME, probe.clone());

        Ok(Self {
            tracer,
            recorder: Arc::new(recorder),
            handle,
            probe,
            shut_down: AtomicBool::new(false),
        })
    }

    /// A tracer bound to the installed provider.
    pub fn tracer(&self, name: &'static str) -> BoxedTracer {
        opentelemetry::global::tracer(name)
    }

    pub fn meter(&self) -> SharedRecorder {
        self.recorder.clone()
    }

    pub fn metrics_handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }

    pub fn is_exporting_traces(&self) -> bool {
        self.tracer.is_some()
    }

    /// Exports every span still buffered in the batch processor.
    pub async fn force_flush(&self) -> Result<(), Error> {
        let Some(provider) = self.tracer.as_ref().and_then(Tracer::provider) else {
            return Ok(());
        };

        // The batch processor blocks until the export completes
        let results = tokio::task::spawn_blocking(move || provider.force_flush()).await?;
        let mut failures = results.into_iter().filter_map(Result::err);
        match failures.next() {
            None => Ok(()),
            Some(first) => {
                for other in failures {
                    warn!("trace flush failed: {other}");
                }
                self.probe
                    .set(ProbeStatus::Degraded(format!("flush failed: {first}")));
                Err(Error::Flush(first))
            }
        }
    }

    /// Shuts the tracer provider down. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<(), Error> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.probe
            .set(ProbeStatus::Unhealthy("shut down".to_string()));

        if self.tracer.is_some() {
            tokio::task::spawn_blocking(opentelemetry::global::shutdown_tracer_provider).await?;
        }
        info!("telemetry shut down");
        Ok(())
    }
}

fn init_tracer(
    sink_url: &str,
    sampling_rate: f64,
    service_name: &str,
    service_version: &str,
    export_timeout_secs: u64,
) -> Result<Tracer, TraceError> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    sampling_rate,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", Value::from(service_name.to_string())),
                    KeyValue::new("service.version", Value::from(service_version.to_string())),
                ])),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(sink_url)
                .with_timeout(Duration::from_secs(export_timeout_secs)),
        )
        .install_batch(runtime::Tokio)
}
