//! Lifecycle coordinator of the YouLess observer service: wires the health
//! registry, telemetry, HTTP server, device client and observer together.

pub mod app;
pub mod buildinfo;
pub mod components;
pub mod config;
pub mod error;
mod lifecycle;
pub mod logging;
pub mod server;
pub mod telemetry;

pub use app::App;
pub use error::{Branch, Error, ShutdownError, ShutdownFailure};
