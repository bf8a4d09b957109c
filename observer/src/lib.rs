//! Observes a YouLess device by polling it on a fixed interval and recording
//! the readings as gauges.

mod error;
mod logger;
mod observer;
mod record;
mod registerer;

pub use error::Error;
pub use logger::{Logger, NopLogger};
pub use observer::{Observer, ObserverBuilder, ReadFn};
pub use registerer::{MeterReadingRegisterer, PhaseReadingRegisterer};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
