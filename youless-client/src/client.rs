use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::global::BoxedTracer;
use opentelemetry::propagation::{Injector, TextMapPropagator};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::logger::{Logger, NopLogger};
use crate::reading::{MeterReading, PhaseReading};

const METER_READING_PATH: &str = "e?f=j";
const PHASE_READING_PATH: &str = "f";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base url of the device, e.g. `http://192.168.1.10`
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://youless".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Reads measurements from a YouLess device. Every request is wrapped in a
/// client span and carries the W3C trace context to the device.
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
    logger: Arc<dyn Logger>,
    tracer: BoxedTracer,
    propagator: TraceContextPropagator,
}

impl Client {
    pub fn new(config: Config) -> Result<Self, Error> {
        let mut base = config.base_url.trim().to_owned();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("youless-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Build)?;

        Ok(Self {
            base_url,
            http,
            logger: Arc::new(NopLogger),
            tracer: opentelemetry::global::tracer("youless-client"),
            propagator: TraceContextPropagator::new(),
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_tracer(mut self, tracer: BoxedTracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Read the meter counters from `/e?f=j`.
    pub async fn meter_reading(&self) -> Result<MeterReading, Error> {
        let readings: Vec<MeterReading> = self.get("meter_reading", METER_READING_PATH).await?;
        readings.into_iter().next().ok_or(Error::EmptyResponse)
    }

    /// Read the per phase values from `/f`.
    pub async fn phase_reading(&self) -> Result<PhaseReading, Error> {
        self.get("phase_reading", PHASE_READING_PATH).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<T, Error> {
        let url = self.base_url.join(path)?;

        let span = self
            .tracer
            .span_builder(operation)
            .with_kind(SpanKind::Client)
            .with_attributes(vec![KeyValue::new("http.url", url.to_string())])
            .start(&self.tracer);
        let cx = Context::current_with_span(span);

        let result = self.send(&cx, url).await;
        if let Err(err) = &result {
            cx.span().set_status(Status::error(err.to_string()));
        }
        cx.span().end();
        result
    }

    async fn send<T: DeserializeOwned>(&self, cx: &Context, url: Url) -> Result<T, Error> {
        let mut headers = HeaderMap::new();
        self.propagator.inject_context(cx, &mut HeaderInjector(&mut headers));

        self.logger.log_request(&url);
        let start = Instant::now();
        let response = self
            .http
            .get(url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|source| Error::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        self.logger.log_response(&url, status, start.elapsed());
        cx.span()
            .set_attribute(KeyValue::new("http.status_code", i64::from(status.as_u16())));

        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
            });
        }

        response.json::<T>().await.map_err(|source| Error::Decode {
            url: url.to_string(),
            source,
        })
    }
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}
