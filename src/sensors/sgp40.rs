//! SGP40 VOC sensor — raw signal only, indexing happens host-side.
//!
//! Two-phase device: a measurement command starts the heater ramp and the
//! result is fetched after a mandatory settling delay. The scheduler owns
//! that sequencing; this driver only exposes `issue` and `read` plus the
//! declared delay.
//!
//! Commands are big-endian 16-bit words; arguments and responses carry a
//! CRC-8 (init 0xFF) per 16-bit word.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::bus::I2cDevice;
use crate::config::SystemConfig;
use crate::fusion::{EnvironmentalFilter, Side, SourceId};
use crate::reading::VocIndex;
use crate::scheduler::SensorCtx;
use crate::sensors::gas_index::{AlgorithmKind, CalibrationBlob, GasIndex};

const ADDRESS: u8 = 0x59;
const CRC_INIT: u8 = 0xFF;

const CMD_SELF_TEST: u16 = 0x280E; // any mode, does not change mode
const CMD_MEASURE_RAW: u16 = 0x260F; // enters measure mode
const CMD_HEATER_OFF: u16 = 0x3615; // returns to idle mode

const SELF_TEST_DELAY_MS: u32 = 320; // datasheet maximum
const SELF_TEST_PASS: u8 = 0xD4;
const SELF_TEST_FAIL: u8 = 0x4B;

/// Minimum wait between issuing a measurement and reading it back.
pub const MEASURE_DELAY_MS: u32 = 320;

pub struct Sgp40 {
    dev: I2cDevice,
    gas_index: GasIndex,
    side: Side,
    src: SourceId,
}

impl Sgp40 {
    /// Presence check (heater-off doubles as a cheap ping) followed by the
    /// on-chip self-test. A present-but-failing device is left unused.
    pub fn probe<B: I2c, D: DelayNs>(
        bus: &mut B,
        delay: &mut D,
        config: &SystemConfig,
        filter: &mut EnvironmentalFilter,
        side: Side,
        now_ms: u64,
    ) -> Option<Self> {
        let dev = I2cDevice::new("SGP40", ADDRESS).ok()?;
        dev.command(bus, CMD_HEATER_OFF).ok()?;

        dev.command(bus, CMD_SELF_TEST).ok()?;
        delay.delay_ms(SELF_TEST_DELAY_MS);
        let mut response = [0u16; 1];
        dev.read_words(bus, CRC_INIT, &mut response)?;
        match (response[0] >> 8) as u8 {
            SELF_TEST_PASS => {}
            SELF_TEST_FAIL => {
                warn!("SGP40: found, but self-test failed");
                return None;
            }
            code => {
                warn!("SGP40: unexpected self-test response 0x{code:02x}");
                return None;
            }
        }

        info!("SGP40: self-test passed");
        let gas_index = GasIndex::new(
            AlgorithmKind::Voc,
            config.voc_gating,
            u64::from(config.checkpoint_interval_secs) * 1000,
            now_ms,
        );
        Some(Self {
            dev,
            gas_index,
            side,
            src: filter.register(side),
        })
    }

    pub fn name(&self) -> &'static str {
        "SGP40"
    }

    /// Start a measurement, compensated with the current fused ambient
    /// conditions. Returns `false` when the command could not be issued —
    /// the scheduler skips this cycle and tries again next tick.
    pub fn issue<B: I2c>(&mut self, bus: &mut B, ctx: &SensorCtx) -> bool {
        let rh_ticks = to_tick(ctx.comp_humidity_pct, 0.0, 100.0);
        let t_ticks = to_tick(ctx.comp_temperature_c, -45.0, 130.0);
        self.dev
            .command_args(bus, CMD_MEASURE_RAW, &[rh_ticks, t_ticks], CRC_INIT)
            .is_ok()
    }

    /// Fetch the raw signal (valid only [`MEASURE_DELAY_MS`] after a
    /// successful [`issue`](Self::issue)) and run it through the index
    /// engine. Index 0 means the engine is still warming up; it never
    /// overwrites a previously published index.
    pub fn read<B: I2c>(&mut self, bus: &mut B, filter: &mut EnvironmentalFilter) {
        let mut words = [0u16; 1];
        if self.dev.read_words(bus, CRC_INIT, &mut words).is_none() {
            debug!("SGP40: measurement read back failed");
            return;
        }

        let index = self.gas_index.process(words[0]);
        if index == 0 {
            return;
        }
        filter.set_voc_index(self.side, self.src, VocIndex::new(index));
    }

    /// Warm-start the index engine from a persisted blob.
    pub fn restore_calibration(&mut self, blob: &CalibrationBlob, now_ms: u64) {
        if self.gas_index.restore(blob, now_ms) {
            info!("SGP40: calibration restored");
        } else {
            info!("SGP40: no saved calibration, cold start");
        }
    }

    /// Due-once-per-interval calibration snapshot for persistence.
    pub fn checkpoint(&mut self, now_ms: u64) -> Option<CalibrationBlob> {
        self.gas_index.checkpoint(now_ms)
    }
}

/// Map a physical value onto the device's u16 tick scale over [min, max].
fn to_tick(n: f32, min: f32, max: f32) -> u16 {
    ((n.clamp(min, max) - min) / (max - min) * 65535.0) as u16
}
