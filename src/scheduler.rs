//! Cooperative sensor scheduler.
//!
//! One tick per update period drives every sensor on a bus. Periodic
//! sensors are read unconditionally; two-phase (delayed-response) sensors
//! walk a strict issue -> delay -> read sequence tracked in [`AsyncState`].
//! The settling delay is enforced here, not in the drivers: a driver `read`
//! is only ever invoked once its declared delay has elapsed since the
//! matching `issue`.
//!
//! Ordering across distinct sensors is unspecified (they are independent);
//! no two transactions overlap because the whole tick runs on one bus
//! handle. A failed read changes nothing — the sensor's previously
//! published value stays in place and the next tick retries.

use embedded_hal::i2c::I2c;
use log::debug;

use crate::fusion::EnvironmentalFilter;
use crate::sensors::{Capability, SensorHandle};

/// Ambient conditions handed to drivers that need on-device compensation
/// inputs, already resolved with their fallbacks.
#[derive(Debug, Clone, Copy)]
pub struct SensorCtx {
    pub comp_temperature_c: f32,
    pub comp_humidity_pct: f32,
}

/// Two-phase sequencing state. At most one measurement is outstanding per
/// sensor; re-issue before the read is structurally impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    Idle,
    Issued { at_ms: u64 },
    ResultReady,
}

impl AsyncState {
    /// Whether an outstanding measurement has settled and may be read.
    pub fn read_due(&self, now_ms: u64, delay_ms: u32) -> bool {
        match self {
            Self::Issued { at_ms } => now_ms >= at_ms.saturating_add(u64::from(delay_ms)),
            Self::ResultReady => true,
            Self::Idle => false,
        }
    }
}

/// Run one scheduler tick over every sensor on a bus side.
pub fn tick_side<B: I2c>(
    bus: &mut B,
    sensors: &mut [SensorHandle],
    filter: &mut EnvironmentalFilter,
    ctx: &SensorCtx,
    now_ms: u64,
) {
    for handle in sensors {
        match handle.driver.capability() {
            Capability::Periodic => handle.driver.read(bus, filter, ctx),

            Capability::DelayedResponse { delay_ms } => {
                if handle.state.read_due(now_ms, delay_ms) {
                    handle.state = AsyncState::ResultReady;
                }
                if handle.state == AsyncState::ResultReady {
                    handle.driver.read(bus, filter, ctx);
                    handle.state = AsyncState::Idle;
                }
                if handle.state == AsyncState::Idle {
                    if handle.driver.issue(bus, ctx) {
                        handle.state = AsyncState::Issued { at_ms: now_ms };
                    } else {
                        // skip this update cycle and hope it is temporary
                        debug!(
                            "{}: measurement issue failed, skipping cycle",
                            handle.driver.name()
                        );
                    }
                }
            }
        }
    }
}
