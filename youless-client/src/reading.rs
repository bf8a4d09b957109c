use serde::{Deserialize, Serialize};

/// Counters as reported by the `/e` endpoint. Devices without a gas or water
/// sensor omit those fields.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MeterReading {
    /// Unix timestamp of the reading
    #[serde(rename = "tm")]
    pub timestamp: i64,
    /// Net electricity counter in kWh
    #[serde(rename = "net", default)]
    pub net: f64,
    /// Current power usage in watts, negative when delivering
    #[serde(rename = "pwr", default)]
    pub power: i64,
    #[serde(rename = "p1", default)]
    pub import_tariff1: f64,
    #[serde(rename = "p2", default)]
    pub import_tariff2: f64,
    #[serde(rename = "n1", default)]
    pub export_tariff1: f64,
    #[serde(rename = "n2", default)]
    pub export_tariff2: f64,
    /// S0 pulse counter in kWh
    #[serde(rename = "cs0", default)]
    pub s0_total: f64,
    /// S0 power in watts
    #[serde(rename = "ps0", default)]
    pub s0_power: i64,
    /// Gas counter in m3
    #[serde(rename = "gas", default)]
    pub gas: Option<f64>,
    /// Water counter in m3
    #[serde(rename = "wtr", default)]
    pub water: Option<f64>,
}

/// Per phase values as reported by the `/f` endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PhaseReading {
    #[serde(rename = "tr", default)]
    pub tariff: u8,
    #[serde(rename = "i1", default)]
    pub current1: f64,
    #[serde(rename = "i2", default)]
    pub current2: f64,
    #[serde(rename = "i3", default)]
    pub current3: f64,
    #[serde(rename = "v1", default)]
    pub voltage1: f64,
    #[serde(rename = "v2", default)]
    pub voltage2: f64,
    #[serde(rename = "v3", default)]
    pub voltage3: f64,
    #[serde(rename = "l1", default)]
    pub power1: i64,
    #[serde(rename = "l2", default)]
    pub power2: i64,
    #[serde(rename = "l3", default)]
    pub power3: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub number: u8,
    pub current: f64,
    pub voltage: f64,
    pub power: i64,
}

impl PhaseReading {
    pub fn phases(&self) -> [Phase; 3] {
        [
            Phase {
                number: 1,
                current: self.current1,
                voltage: self.voltage1,
                power: self.power1,
            },
            Phase {
                number: 2,
                current: self.current2,
                voltage: self.voltage2,
                power: self.power2,
            },
            Phase {
                number: 3,
                current: self.current3,
                voltage: self.voltage3,
                power: self.power3,
            },
        ]
    }
}
