use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use youless_observer::{MeterReadingRegisterer, PhaseReadingRegisterer};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub server: ServerConfig,

    #[envconfig(nested = true)]
    pub telemetry: TelemetryConfig,

    #[envconfig(nested = true)]
    pub youless: YoulessConfig,

    #[envconfig(nested = true)]
    pub observer: ObserverConfig,

    #[envconfig(nested = true)]
    pub log: LogConfig,

    #[envconfig(from = "SHUTDOWN_TIMEOUT_MS", default = "5000")]
    pub shutdown_timeout: EnvMsDuration,
}

#[derive(Envconfig, Clone)]
pub struct ServerConfig {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3310")]
    pub port: u16,
}

impl ServerConfig {
    /// The socket address to bind the TcpListener to. `BIND_HOST` is an IPv4
    /// or IPv6 address, without brackets.
    pub fn bind(&self) -> Result<SocketAddr, AddrParseError> {
        let ip = self.host.parse::<IpAddr>()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Envconfig, Clone)]
pub struct TelemetryConfig {
    #[envconfig(from = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_url: Option<String>,

    #[envconfig(from = "OTEL_SERVICE_NAME")]
    pub otel_service_name: Option<String>,

    #[envconfig(from = "OTEL_SAMPLING_RATE", default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(from = "OTEL_EXPORT_TIMEOUT_SECS", default = "3")]
    pub otel_export_timeout_secs: u64,
}

#[derive(Envconfig, Clone)]
pub struct YoulessConfig {
    #[envconfig(from = "YOULESS_BASE_URL", default = "http://youless")]
    pub base_url: String,

    #[envconfig(from = "YOULESS_TIMEOUT_MS", default = "5000")]
    pub timeout: EnvMsDuration,
}

impl From<&YoulessConfig> for youless_client::Config {
    fn from(config: &YoulessConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: config.timeout.0,
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct ObserverConfig {
    #[envconfig(from = "OBSERVE_ELECTRICITY", default = "true")]
    pub electricity: bool,

    #[envconfig(from = "OBSERVE_GAS", default = "true")]
    pub gas: bool,

    #[envconfig(from = "OBSERVE_WATER", default = "false")]
    pub water: bool,

    #[envconfig(from = "OBSERVE_S0", default = "false")]
    pub s0: bool,

    #[envconfig(from = "OBSERVE_PHASES", default = "true")]
    pub phases: bool,

    #[envconfig(from = "METER_READING_INTERVAL_MS", default = "10000")]
    pub meter_reading_interval: EnvMsDuration,

    #[envconfig(from = "PHASE_READING_INTERVAL_MS", default = "10000")]
    pub phase_reading_interval: EnvMsDuration,
}

impl ObserverConfig {
    pub fn meter_reading(&self) -> MeterReadingRegisterer {
        MeterReadingRegisterer {
            electricity: self.electricity,
            gas: self.gas,
            water: self.water,
            s0: self.s0,
            interval: self.meter_reading_interval.0,
        }
    }

    pub fn phase_reading(&self) -> PhaseReadingRegisterer {
        PhaseReadingRegisterer {
            enabled: self.phases,
            interval: self.phase_reading_interval.0,
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct LogConfig {
    /// Used when RUST_LOG is not set
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub level: String,

    #[envconfig(from = "LOG_JSON", default = "true")]
    pub json: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

impl std::fmt::Display for ParseEnvMsDurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected a duration in milliseconds")
    }
}

impl std::error::Error for ParseEnvMsDurationError {}
