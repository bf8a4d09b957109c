//! Client for the local HTTP API of a YouLess energy monitor.

mod client;
mod error;
mod logger;
mod reading;

pub use client::{Client, Config};
pub use error::Error;
pub use logger::{Logger, NopLogger};
pub use reading::{MeterReading, Phase, PhaseReading};
pub use reqwest::StatusCode;
pub use url::Url;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
