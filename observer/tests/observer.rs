use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use health::{HealthRegistry, ProbeStatus};
use metrics_exporter_prometheus::PrometheusHandle;
use youless_client::{MeterReading, PhaseReading};
use youless_observer::{
    Error, Logger, MeterReadingRegisterer, Observer, PhaseReadingRegisterer, ReadFn,
};

#[derive(Default)]
struct RecordingLogger {
    events: Mutex<Vec<String>>,
}

impl Logger for RecordingLogger {
    fn log_register(&self, name: &str) {
        self.events.lock().unwrap().push(format!("register {name}"));
    }

    fn log_observer_start(&self) {
        self.events.lock().unwrap().push("start".to_string());
    }

    fn log_observer_stop(&self) {
        self.events.lock().unwrap().push("stop".to_string());
    }
}

fn meter_reading() -> MeterReading {
    MeterReading {
        timestamp: 1708300800,
        net: 12.5,
        power: 432,
        import_tariff1: 100.0,
        import_tariff2: 200.0,
        export_tariff1: 10.0,
        export_tariff2: 20.0,
        s0_total: 0.0,
        s0_power: 0,
        gas: Some(2345.5),
        water: None,
    }
}

fn phase_reading() -> PhaseReading {
    PhaseReading {
        tariff: 1,
        current1: 1.5,
        current2: 0.5,
        current3: 0.0,
        voltage1: 230.0,
        voltage2: 231.0,
        voltage3: 229.0,
        power1: 345,
        power2: 115,
        power3: 0,
    }
}

fn counting_meter_read(calls: Arc<AtomicUsize>) -> ReadFn<MeterReading> {
    Arc::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(meter_reading()) }.boxed()
    })
}

fn phase_read() -> ReadFn<PhaseReading> {
    Arc::new(|| async { Ok(phase_reading()) }.boxed())
}

fn failing_phase_read() -> ReadFn<PhaseReading> {
    Arc::new(|| async { Err(youless_client::Error::EmptyResponse) }.boxed())
}

fn fast_meter() -> MeterReadingRegisterer {
    MeterReadingRegisterer {
        interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn fast_phases() -> PhaseReadingRegisterer {
    PhaseReadingRegisterer {
        enabled: true,
        interval: Duration::from_millis(10),
    }
}

fn recorder() -> (Arc<metrics_exporter_prometheus::PrometheusRecorder>, PrometheusHandle) {
    let recorder = common_metrics::setup_metrics_recorder().unwrap();
    let handle = recorder.handle();
    (Arc::new(recorder), handle)
}

async fn wait_until<F>(check: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(check())
}

#[tokio::test]
async fn records_readings_until_stopped() {
    let (meter, handle) = recorder();
    let calls = Arc::new(AtomicUsize::new(0));
    let observer = Observer::builder(meter)
        .meter_reading(fast_meter(), counting_meter_read(calls.clone()))
        .phase_reading(fast_phases(), phase_read())
        .build()
        .unwrap();

    observer.start().unwrap();
    assert!(observer.is_running());
    wait_until(|| {
        calls.load(Ordering::SeqCst) >= 2 && handle.render().contains("youless_phase_voltage_volts")
    })
    .await;
    observer.stop().await.unwrap();
    assert!(!observer.is_running());

    let rendered = handle.render();
    assert!(rendered.contains("youless_electricity_power_watts 432"));
    assert!(rendered.contains("youless_gas_m3 2345.5"));
    assert!(rendered.contains("youless_phase_voltage_volts{phase=\"2\"} 231"));
    assert!(!rendered.contains("youless_water_m3"));

    // No more polling once stopped
    let after_stop = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);
}

#[tokio::test]
async fn stop_without_start_is_ok() {
    let (meter, _) = recorder();
    let observer = Observer::builder(meter)
        .phase_reading(fast_phases(), phase_read())
        .build()
        .unwrap();

    observer.stop().await.unwrap();
    observer.stop().await.unwrap();
}

#[tokio::test]
async fn second_start_fails() {
    let (meter, _) = recorder();
    let observer = Observer::builder(meter)
        .phase_reading(fast_phases(), phase_read())
        .build()
        .unwrap();

    observer.start().unwrap();
    assert!(matches!(observer.start(), Err(Error::AlreadyStarted)));
    observer.stop().await.unwrap();

    // A stopped observer can be started again
    observer.start().unwrap();
    observer.stop().await.unwrap();
}

#[test]
fn start_outside_runtime_fails() {
    let (meter, _) = recorder();
    let observer = Observer::builder(meter)
        .phase_reading(fast_phases(), phase_read())
        .build()
        .unwrap();

    assert!(matches!(observer.start(), Err(Error::NoRuntime)));
}

#[test]
fn nothing_to_observe() {
    let (meter, _) = recorder();
    let result = Observer::builder(meter.clone()).build();
    assert!(matches!(result, Err(Error::NothingToObserve)));

    let disabled = MeterReadingRegisterer {
        electricity: false,
        s0: false,
        gas: false,
        water: false,
        interval: Duration::from_secs(1),
    };
    let result = Observer::builder(meter)
        .meter_reading(disabled, counting_meter_read(Arc::new(AtomicUsize::new(0))))
        .build();
    assert!(matches!(result, Err(Error::NothingToObserve)));
}

#[test]
fn zero_interval_is_rejected() {
    let (meter, _) = recorder();
    let result = Observer::builder(meter)
        .phase_reading(
            PhaseReadingRegisterer {
                enabled: true,
                interval: Duration::ZERO,
            },
            phase_read(),
        )
        .build();
    assert!(matches!(result, Err(Error::InvalidInterval("phase_reading"))));
}

#[tokio::test]
async fn logs_lifecycle_events() {
    let (meter, _) = recorder();
    let logger = Arc::new(RecordingLogger::default());
    let observer = Observer::builder(meter)
        .logger(logger.clone())
        .meter_reading(fast_meter(), counting_meter_read(Arc::new(AtomicUsize::new(0))))
        .phase_reading(fast_phases(), phase_read())
        .build()
        .unwrap();

    assert_eq!(observer.registrations(), vec!["meter_reading", "phase_reading"]);

    observer.start().unwrap();
    observer.stop().await.unwrap();

    assert_eq!(
        *logger.events.lock().unwrap(),
        vec![
            "register meter_reading".to_string(),
            "register phase_reading".to_string(),
            "start".to_string(),
            "stop".to_string(),
        ]
    );
}

#[tokio::test]
async fn health_follows_readings() {
    let (meter, handle) = recorder();
    let registry = HealthRegistry::new("health").unwrap();
    let observer = Observer::builder(meter)
        .meter_reading(fast_meter(), counting_meter_read(Arc::new(AtomicUsize::new(0))))
        .phase_reading(fast_phases(), failing_phase_read())
        .build()
        .unwrap();
    observer.register_health_checkers(&registry);
    assert_eq!(
        registry.probe_names(),
        vec!["meter_reading".to_string(), "phase_reading".to_string()]
    );

    observer.start().unwrap();
    let mut status = registry.check_all().await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while status.components.get("meter_reading") != Some(&ProbeStatus::Healthy)
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = registry.check_all().await;
    }
    observer.stop().await.unwrap();

    assert_eq!(
        status.components.get("meter_reading"),
        Some(&ProbeStatus::Healthy)
    );
    assert!(matches!(
        status.components.get("phase_reading"),
        Some(ProbeStatus::Degraded(_))
    ));
    assert!(handle
        .render()
        .contains("youless_readings_total{reading=\"phase_reading\",result=\"error\"}"));
}
