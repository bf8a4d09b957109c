use std::time::Duration;

use tracing::{debug, info, Span};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use youless_client::{StatusCode, Url};

use crate::config::LogConfig;

/// Bridges the client and observer logging capabilities onto a tracing span.
#[derive(Clone)]
pub struct LogAdapter {
    span: Span,
}

impl LogAdapter {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

impl youless_client::Logger for LogAdapter {
    fn log_request(&self, url: &Url) {
        self.span.in_scope(|| debug!(%url, "youless request"));
    }

    fn log_response(&self, url: &Url, status: StatusCode, elapsed: Duration) {
        self.span.in_scope(|| {
            debug!(
                %url,
                status = status.as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                "youless response"
            )
        });
    }
}

impl youless_observer::Logger for LogAdapter {
    fn log_register(&self, name: &str) {
        self.span.in_scope(|| debug!(reading = name, "observer registered reading"));
    }

    fn log_observer_start(&self) {
        self.span.in_scope(|| info!("observer starting"));
    }

    fn log_observer_stop(&self) {
        self.span.in_scope(|| info!("observer stopped"));
    }
}

/// Installs the global subscriber: stdout with a level configured by the
/// RUST_LOG envvar, falling back to LOG_LEVEL.
pub fn init(config: &LogConfig) -> eyre::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let base_layer = fmt::layer().with_target(true).with_level(true);
    let log_layer = if config.json {
        base_layer.json().with_filter(filter).boxed()
    } else {
        base_layer.pretty().with_filter(filter).boxed()
    };

    tracing_subscriber::registry().with(log_layer).try_init()?;
    Ok(())
}
