use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use health::{ComponentStatus, HealthHandle, HealthRegistry};
use metrics::Recorder;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use youless_client::{MeterReading, PhaseReading};

use crate::error::Error;
use crate::logger::{Logger, NopLogger};
use crate::record;
use crate::registerer::{MeterReadingRegisterer, PhaseReadingRegisterer};

/// Callback reading a measurement from the device, usually bound to a [`youless_client::Client`].
pub type ReadFn<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, youless_client::Error>> + Send + Sync>;

type SharedRecorder = Arc<dyn Recorder + Send + Sync>;

/// Heartbeats may miss two ticks before the probe reports the reading as stalled.
const HEARTBEAT_TICKS: u32 = 3;

enum Reading {
    Meter {
        registerer: MeterReadingRegisterer,
        read: ReadFn<MeterReading>,
    },
    Phase {
        read: ReadFn<PhaseReading>,
    },
}

struct Registration {
    name: &'static str,
    interval: Duration,
    heartbeat: HealthHandle,
    reading: Reading,
}

impl Registration {
    async fn poll(
        &self,
        meter: &(dyn Recorder + Send + Sync),
    ) -> Result<(), youless_client::Error> {
        match &self.reading {
            Reading::Meter { registerer, read } => {
                let reading = read().await?;
                metrics::with_local_recorder(meter, || {
                    record::record_meter_reading(registerer, &reading)
                });
            }
            Reading::Phase { read } => {
                let reading = read().await?;
                metrics::with_local_recorder(meter, || record::record_phase_reading(&reading));
            }
        }
        Ok(())
    }
}

struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct ObserverBuilder {
    meter: SharedRecorder,
    logger: Arc<dyn Logger>,
    meter_reading: Option<(MeterReadingRegisterer, ReadFn<MeterReading>)>,
    phase_reading: Option<(PhaseReadingRegisterer, ReadFn<PhaseReading>)>,
}

impl ObserverBuilder {
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn meter_reading(
        mut self,
        registerer: MeterReadingRegisterer,
        read: ReadFn<MeterReading>,
    ) -> Self {
        self.meter_reading = Some((registerer, read));
        self
    }

    pub fn phase_reading(
        mut self,
        registerer: PhaseReadingRegisterer,
        read: ReadFn<PhaseReading>,
    ) -> Self {
        self.phase_reading = Some((registerer, read));
        self
    }

    pub fn build(self) -> Result<Observer, Error> {
        let mut registrations = Vec::new();

        if let Some((registerer, read)) = self.meter_reading {
            if registerer.is_enabled() {
                registrations.push(register(
                    self.logger.as_ref(),
                    "meter_reading",
                    registerer.interval,
                    Reading::Meter { registerer, read },
                )?);
            }
        }
        if let Some((registerer, read)) = self.phase_reading {
            if registerer.enabled {
                registrations.push(register(
                    self.logger.as_ref(),
                    "phase_reading",
                    registerer.interval,
                    Reading::Phase { read },
                )?);
            }
        }

        if registrations.is_empty() {
            return Err(Error::NothingToObserve);
        }

        Ok(Observer {
            meter: self.meter,
            logger: self.logger,
            registrations,
            running: Mutex::new(None),
        })
    }
}

fn register(
    logger: &dyn Logger,
    name: &'static str,
    interval: Duration,
    reading: Reading,
) -> Result<Arc<Registration>, Error> {
    if interval.is_zero() {
        return Err(Error::InvalidInterval(name));
    }
    logger.log_register(name);
    Ok(Arc::new(Registration {
        name,
        interval,
        heartbeat: HealthHandle::new(name, interval.saturating_mul(HEARTBEAT_TICKS)),
        reading,
    }))
}

/// Runs one polling task per registered reading. Readings are recorded into
/// the recorder the observer was built with.
pub struct Observer {
    meter: SharedRecorder,
    logger: Arc<dyn Logger>,
    registrations: Vec<Arc<Registration>>,
    running: Mutex<Option<Running>>,
}

impl Observer {
    pub fn builder(meter: SharedRecorder) -> ObserverBuilder {
        ObserverBuilder {
            meter,
            logger: Arc::new(NopLogger),
            meter_reading: None,
            phase_reading: None,
        }
    }

    /// Names of the registered readings, in polling order.
    pub fn registrations(&self) -> Vec<&'static str> {
        self.registrations.iter().map(|r| r.name).collect()
    }

    /// Exposes a heartbeat probe per registered reading.
    pub fn register_health_checkers(&self, registry: &HealthRegistry) {
        for registration in &self.registrations {
            registry.register(registration.name, registration.heartbeat.clone());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.is_some())
            .unwrap_or(false)
    }

    /// Spawns the polling tasks and returns immediately.
    pub fn start(&self) -> Result<(), Error> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let mut running = self.running.lock().map_err(|_| Error::Poisoned)?;
        if running.is_some() {
            return Err(Error::AlreadyStarted);
        }

        self.logger.log_observer_start();
        let token = CancellationToken::new();
        let tasks = self
            .registrations
            .iter()
            .map(|registration| {
                runtime.spawn(observe(
                    registration.clone(),
                    self.meter.clone(),
                    token.child_token(),
                ))
            })
            .collect();

        *running = Some(Running { token, tasks });
        Ok(())
    }

    /// Stops the polling tasks and waits for them to exit. Stopping an
    /// observer that is not running is a no-op.
    pub async fn stop(&self) -> Result<(), Error> {
        let running = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => return Err(Error::Poisoned),
        };
        let Some(running) = running else {
            return Ok(());
        };

        running.token.cancel();
        let mut result = Ok(());
        for task in running.tasks {
            if let Err(err) = task.await {
                if result.is_ok() {
                    result = Err(Error::Task(err));
                }
            }
        }

        self.logger.log_observer_stop();
        result
    }
}

async fn observe(
    registration: Arc<Registration>,
    meter: SharedRecorder,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(registration.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = registration.poll(meter.as_ref()) => result,
        };

        metrics::with_local_recorder(meter.as_ref(), || {
            record::emit_reading_result(registration.name, result.is_ok())
        });
        match result {
            Ok(()) => {
                debug!(reading = registration.name, "reading recorded");
                registration.heartbeat.report_healthy();
            }
            Err(err) => {
                warn!(reading = registration.name, "failed to read from device: {err}");
                registration
                    .heartbeat
                    .report_status(ComponentStatus::Degraded(err.to_string()));
            }
        }
    }
}
