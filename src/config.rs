//! System configuration parameters.
//!
//! All tunable parameters for the sensing core. Fixed at boot; loaded from
//! persistent storage by an adapter and range-validated before use.

use serde::{Deserialize, Serialize};

/// BME280 oversampling setting, per measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Oversampling {
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    /// Register encoding for the ctrl_meas / ctrl_hum fields.
    pub fn bits(self) -> u8 {
        match self {
            Self::X1 => 0b001,
            Self::X2 => 0b010,
            Self::X4 => 0b011,
            Self::X8 => 0b100,
            Self::X16 => 0b101,
        }
    }
}

/// BME280 IIR filter coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterCoefficient {
    Off,
    C2,
    C4,
    C8,
    C16,
}

impl FilterCoefficient {
    pub fn bits(self) -> u8 {
        match self {
            Self::Off => 0b000,
            Self::C2 => 0b001,
            Self::C4 => 0b010,
            Self::C8 => 0b011,
            Self::C16 => 0b100,
        }
    }
}

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Bus ---
    /// I2C baud rate (Hz). Most supported sensors top out at 400 kHz.
    pub i2c_baud_hz: u32,
    /// Sensor scheduler tick period (ms). The host-side VOC index algorithm
    /// is calibrated for ~1 s update rates and needs at least 500 ms.
    pub sensor_update_period_ms: u32,

    // --- BME280 ---
    pub bme280_oversampling: Oversampling,
    pub bme280_filter: FilterCoefficient,

    // --- Fan policy (environmental) ---
    /// VOC index at/above which filtering always runs.
    pub voc_passive_max: u16,
    /// Minimum intake-minus-exhaust improvement that keeps filtering going.
    pub voc_improve_min: u16,
    /// How long to keep spinning after the decision rules stop firing (s).
    pub cooldown_secs: u16,

    // --- Fan policy (thermal limit) ---
    /// Derating starts above this exhaust temperature (°C).
    pub thermal_min_c: f32,
    /// Full derating at/above this exhaust temperature (°C).
    pub thermal_max_c: f32,
    /// Fan power coefficient at full derating, percent. 100 disables the
    /// limiter entirely.
    pub thermal_coefficient_pct: u8,

    // --- Gas index ---
    /// Gating index: baseline adaptation is suspended while the computed
    /// index sits above this, so sustained events don't get calibrated away.
    pub voc_gating: u16,
    /// Calibration checkpoint interval (s).
    pub checkpoint_interval_secs: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            i2c_baud_hz: 400_000,
            sensor_update_period_ms: 1000,

            bme280_oversampling: Oversampling::X1,
            bme280_filter: FilterCoefficient::C2,

            voc_passive_max: 125,
            voc_improve_min: 25,
            cooldown_secs: 60 * 15,

            thermal_min_c: 50.0,
            thermal_max_c: 60.0,
            thermal_coefficient_pct: 0,

            voc_gating: 340,
            checkpoint_interval_secs: 60 * 60 * 24,
        }
    }
}

impl SystemConfig {
    /// Range-check every field. Called by storage adapters before persisting
    /// and by the session context at construction.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(100_000..=1_000_000).contains(&self.i2c_baud_hz) {
            return Err("i2c_baud_hz must be 100 kHz - 1 MHz");
        }
        if self.sensor_update_period_ms < 500 {
            return Err("sensor_update_period_ms must be >= 500");
        }
        if !(1..=500).contains(&self.voc_passive_max) {
            return Err("voc_passive_max must be 1-500");
        }
        if !(1..=500).contains(&self.voc_improve_min) {
            return Err("voc_improve_min must be 1-500");
        }
        if !(1..=500).contains(&self.voc_gating) {
            return Err("voc_gating must be 1-500");
        }
        if self.thermal_coefficient_pct > 100 {
            return Err("thermal_coefficient_pct must be 0-100");
        }
        if !self.thermal_min_c.is_finite() || !self.thermal_max_c.is_finite() {
            return Err("thermal band must be finite");
        }
        if self.thermal_max_c < self.thermal_min_c {
            return Err("thermal_max_c must be >= thermal_min_c");
        }
        if self.checkpoint_interval_secs < 3600 {
            return Err("checkpoint_interval_secs must be >= 1 hour");
        }
        Ok(())
    }
}
