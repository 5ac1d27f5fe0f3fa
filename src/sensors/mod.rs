//! Sensor drivers and the per-bus probe registry.
//!
//! Capability is a closed tagged variant ([`SensorDriver`]): the scheduler
//! dispatches on [`Capability`], not on an open subtype hierarchy. A
//! [`SensorHandle`] exists only after its driver passed identification
//! during [`probe_bus`] and lives until session teardown — there is no
//! runtime unplug detection.

pub mod bme280;
pub mod ens16x;
pub mod gas_index;
pub mod mcu_temp;
pub mod sgp40;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use heapless::Vec;
use log::{info, warn};

use crate::config::SystemConfig;
use crate::fusion::{EnvironmentalFilter, Side};
use crate::scheduler::{AsyncState, SensorCtx};
use bme280::Bme280;
use ens16x::Ens16x;
use gas_index::CalibrationBlob;
use sgp40::Sgp40;

/// Known driver kinds plus headroom; probing can never overrun this.
pub const MAX_SENSORS_PER_BUS: usize = 4;

/// How a driver is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// One `read` per tick, fast enough to never block the tick boundary.
    Periodic,
    /// `issue` starts a measurement; `read` is valid only `delay_ms` later.
    DelayedResponse { delay_ms: u32 },
}

/// One identified sensor on one bus.
pub enum SensorDriver {
    Bme280(Bme280),
    Ens16x(Ens16x),
    Sgp40(Sgp40),
}

impl SensorDriver {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bme280(s) => s.name(),
            Self::Ens16x(s) => s.name(),
            Self::Sgp40(s) => s.name(),
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Bme280(_) | Self::Ens16x(_) => Capability::Periodic,
            Self::Sgp40(_) => Capability::DelayedResponse {
                delay_ms: sgp40::MEASURE_DELAY_MS,
            },
        }
    }

    /// Fetch and publish a measurement. For delayed-response drivers the
    /// scheduler guarantees the settling delay has elapsed.
    pub fn read<B: I2c>(&mut self, bus: &mut B, filter: &mut EnvironmentalFilter, ctx: &SensorCtx) {
        match self {
            Self::Bme280(s) => s.read(bus, filter),
            Self::Ens16x(s) => s.read(bus, filter, ctx),
            Self::Sgp40(s) => s.read(bus, filter),
        }
    }

    /// Start a measurement. Meaningful only for delayed-response drivers;
    /// periodic drivers trivially succeed.
    pub fn issue<B: I2c>(&mut self, bus: &mut B, ctx: &SensorCtx) -> bool {
        match self {
            Self::Bme280(_) | Self::Ens16x(_) => true,
            Self::Sgp40(s) => s.issue(bus, ctx),
        }
    }

    /// Whether this driver carries host-side calibration state worth
    /// persisting.
    pub fn has_calibration(&self) -> bool {
        matches!(self, Self::Sgp40(_))
    }

    pub fn restore_calibration(&mut self, blob: &CalibrationBlob, now_ms: u64) {
        if let Self::Sgp40(s) = self {
            s.restore_calibration(blob, now_ms);
        }
    }

    /// Serialized calibration state when a checkpoint interval has elapsed.
    pub fn checkpoint(&mut self, now_ms: u64) -> Option<CalibrationBlob> {
        match self {
            Self::Sgp40(s) => s.checkpoint(now_ms),
            _ => None,
        }
    }
}

/// Driver plus its scheduling state.
pub struct SensorHandle {
    pub driver: SensorDriver,
    pub state: AsyncState,
}

impl SensorHandle {
    fn new(driver: SensorDriver) -> Self {
        Self {
            driver,
            state: AsyncState::Idle,
        }
    }
}

/// Probe every known driver kind against `bus`, in fixed priority order.
/// Devices that do not answer, or answer as something unrecognized, simply
/// contribute nothing; an empty bus is worth a warning but is not an error.
pub fn probe_bus<B: I2c, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    config: &SystemConfig,
    filter: &mut EnvironmentalFilter,
    side: Side,
    now_ms: u64,
) -> Vec<SensorHandle, MAX_SENSORS_PER_BUS> {
    let mut sensors: Vec<SensorHandle, MAX_SENSORS_PER_BUS> = Vec::new();
    let keep = |driver: SensorDriver, sensors: &mut Vec<SensorHandle, MAX_SENSORS_PER_BUS>| {
        info!("{side:?}: found {}", driver.name());
        // capacity covers every known kind; push cannot fail
        let _ = sensors.push(SensorHandle::new(driver));
    };

    if let Some(s) = Bme280::probe(bus, delay, config, filter, side) {
        keep(SensorDriver::Bme280(s), &mut sensors);
    }
    if let Some(s) = Ens16x::probe(bus, delay, filter, side) {
        keep(SensorDriver::Ens16x(s), &mut sensors);
    }
    if let Some(s) = Sgp40::probe(bus, delay, config, filter, side, now_ms) {
        keep(SensorDriver::Sgp40(s), &mut sensors);
    }

    if sensors.is_empty() {
        warn!("{side:?}: no sensors found");
    }
    sensors
}
