use std::time::Duration;

/// Selects which counters of the meter reading are recorded.
#[derive(Debug, Clone)]
pub struct MeterReadingRegisterer {
    pub electricity: bool,
    pub s0: bool,
    pub gas: bool,
    pub water: bool,
    pub interval: Duration,
}

impl MeterReadingRegisterer {
    pub fn is_enabled(&self) -> bool {
        self.electricity || self.s0 || self.gas || self.water
    }
}

impl Default for MeterReadingRegisterer {
    fn default() -> Self {
        Self {
            electricity: true,
            s0: false,
            gas: true,
            water: false,
            interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseReadingRegisterer {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for PhaseReadingRegisterer {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
        }
    }
}
