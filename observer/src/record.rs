use metrics::gauge;
use youless_client::{MeterReading, PhaseReading};

use crate::registerer::MeterReadingRegisterer;

pub(crate) const METRIC_READINGS: &str = "youless_readings_total";
pub(crate) const METRIC_LAST_READING: &str = "youless_last_reading_timestamp_seconds";

pub(crate) fn emit_reading_result(reading: &'static str, ok: bool) {
    metrics::counter!(
        METRIC_READINGS,
        "reading" => reading,
        "result" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

pub(crate) fn record_meter_reading(registerer: &MeterReadingRegisterer, reading: &MeterReading) {
    gauge!(METRIC_LAST_READING, "reading" => "meter_reading").set(reading.timestamp as f64);

    if registerer.electricity {
        gauge!("youless_electricity_power_watts").set(reading.power as f64);
        gauge!("youless_electricity_net_kwh").set(reading.net);
        gauge!("youless_electricity_import_kwh", "tariff" => "1").set(reading.import_tariff1);
        gauge!("youless_electricity_import_kwh", "tariff" => "2").set(reading.import_tariff2);
        gauge!("youless_electricity_export_kwh", "tariff" => "1").set(reading.export_tariff1);
        gauge!("youless_electricity_export_kwh", "tariff" => "2").set(reading.export_tariff2);
    }
    if registerer.s0 {
        gauge!("youless_s0_power_watts").set(reading.s0_power as f64);
        gauge!("youless_s0_total_kwh").set(reading.s0_total);
    }
    if registerer.gas {
        if let Some(gas) = reading.gas {
            gauge!("youless_gas_m3").set(gas);
        }
    }
    if registerer.water {
        if let Some(water) = reading.water {
            gauge!("youless_water_m3").set(water);
        }
    }
}

pub(crate) fn record_phase_reading(reading: &PhaseReading) {
    gauge!("youless_tariff").set(f64::from(reading.tariff));

    for phase in reading.phases() {
        let label = phase.number.to_string();
        gauge!("youless_phase_current_amperes", "phase" => label.clone()).set(phase.current);
        gauge!("youless_phase_voltage_volts", "phase" => label.clone()).set(phase.voltage);
        gauge!("youless_phase_power_watts", "phase" => label).set(phase.power as f64);
    }
}
