use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

/// Logging capability the client needs from its host application.
pub trait Logger: Send + Sync {
    fn log_request(&self, url: &Url);

    fn log_response(&self, url: &Url, status: StatusCode, elapsed: Duration);
}

/// Discards everything, used when no logger is configured.
pub struct NopLogger;

impl Logger for NopLogger {
    fn log_request(&self, _url: &Url) {}

    fn log_response(&self, _url: &Url, _status: StatusCode, _elapsed: Duration) {}
}
