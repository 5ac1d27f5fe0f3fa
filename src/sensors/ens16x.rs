//! ENS160/ENS161 metal-oxide gas sensor with on-chip air-quality indexing.
//!
//! The interesting parts of this device are procedural, not numeric:
//!
//! - a mode state machine (`Reset -> Idle -> Operational`) whose transitions
//!   are acknowledged through a busy flag in the status register;
//! - a rolling checksum (MISR, poly 0x1D with MSB-conditional XOR feedback)
//!   the device accumulates over every data register it serves *except* the
//!   checksum register itself. The driver mirrors the accumulator locally
//!   and cross-checks after each logical read; a mismatch drops the reading
//!   and resyncs the mirror to the device's value;
//! - a nested handshake for firmware-version queries through the
//!   general-purpose result registers.
//!
//! Every busy poll is bounded. The device normally switches modes within a
//! few milliseconds; running out of the attempt budget is a protocol
//! violation and the probe slot is abandoned for the session.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::bus::I2cDevice;
use crate::error::{ProtocolError, Result};
use crate::fusion::{EnvironmentalFilter, Side, SourceId};
use crate::reading::VocIndex;
use crate::scheduler::SensorCtx;

const ADDRESSES: [u8; 2] = [0x52, 0x53];

const REG_PART_ID: u8 = 0x00; // 16 bits
const REG_OPMODE: u8 = 0x10;
const REG_COMMAND: u8 = 0x12;
const REG_TEMP_IN: u8 = 0x13; // u16 temp + u16 rh compensation block
const REG_DEVICE_STATUS: u8 = 0x20;
const REG_DATA_AQ_500: u8 = 0x26; // extended AQI, range [0, 500]
const REG_DATA_MISR: u8 = 0x38;
const REG_GPR_READ4: u8 = 0x4C;

const OPMODE_IDLE: u8 = 0x01;
const OPMODE_OPERATIONAL: u8 = 0x02;
const OPMODE_RESET: u8 = 0xF0;

// commands execute in Idle mode only
const CMD_GET_APP_VERSION: u8 = 0x0E;
const CMD_CLEAR_GPR: u8 = 0xCC;

const PART_ID_ENS160: u16 = 0x0160;
const PART_ID_ENS161: u16 = 0x0161;

/// Mode transitions complete within a few ms; without this settle the very
/// first checksum read after an OPMODE write can fail.
const MODE_SETTLE_MS: u32 = 2;

/// Attempt budget for any status poll. 50 attempts x 2 ms dwarfs the
/// device's observed transition latency.
const POLL_BUDGET: u32 = 50;
const POLL_DELAY_MS: u32 = 2;

/// Device status register.
#[derive(Debug, Clone, Copy)]
struct Status(u8);

impl Status {
    const VALIDITY_INVALID: u8 = 3;

    fn new_gpr(self) -> bool {
        self.0 & 0x01 != 0
    }

    fn new_data(self) -> bool {
        self.0 & 0x02 != 0
    }

    fn validity(self) -> u8 {
        (self.0 >> 2) & 0x03
    }

    /// High while an OPMODE change is still running.
    fn busy(self) -> bool {
        self.0 & 0x80 != 0
    }
}

/// Local mirror of the device's rolling checksum register.
#[derive(Debug, Clone, Copy, Default)]
struct Misr {
    expected: u8,
}

impl Misr {
    const POLY: u8 = 0x1D; // x^8+x^4+x^3+x^2+1, x^8 implicit

    fn update(&mut self, data: &[u8]) {
        for &b in data {
            self.expected = Self::apply(self.expected, b);
        }
    }

    fn apply(miso: u8, data: u8) -> u8 {
        let xor = (miso << 1) ^ data;
        if miso & 0x80 == 0 {
            xor
        } else {
            xor ^ Self::POLY
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Ens160,
    Ens161,
}

pub struct Ens16x {
    dev: I2cDevice,
    variant: Variant,
    misr: Misr,
    side: Side,
    src: SourceId,
}

impl Ens16x {
    /// Probe both strap addresses; first identified device wins.
    pub fn probe<B: I2c, D: DelayNs>(
        bus: &mut B,
        delay: &mut D,
        filter: &mut EnvironmentalFilter,
        side: Side,
    ) -> Option<Self> {
        for address in ADDRESSES {
            let dev = I2cDevice::new("ENS16x", address).ok()?;
            let mut sensor = Self {
                dev,
                variant: Variant::Ens160,
                misr: Misr::default(),
                side,
                src: SourceId::UNREGISTERED,
            };
            match sensor.setup(bus, delay) {
                Ok(()) => {
                    sensor.src = filter.register(side);
                    return Some(sensor);
                }
                Err(e) => debug!("ENS16x [0x{address:02x}]: probe failed: {e}"),
            }
        }
        None
    }

    pub fn name(&self) -> &'static str {
        "ENS16x"
    }

    fn setup<B: I2c, D: DelayNs>(&mut self, bus: &mut B, delay: &mut D) -> Result<()> {
        self.mode(bus, delay, OPMODE_RESET, true)?;
        self.mode(bus, delay, OPMODE_IDLE, false)?;

        let part_id = self
            .read_data_verified::<B, 2>(bus, REG_PART_ID)
            .ok_or(ProtocolError::UnrecognizedDevice)?;
        self.variant = match u16::from_le_bytes(part_id) {
            PART_ID_ENS160 => Variant::Ens160,
            PART_ID_ENS161 => Variant::Ens161,
            other => {
                warn!("ENS16x: unrecognized part id 0x{other:04x}");
                return Err(ProtocolError::UnrecognizedDevice.into());
            }
        };

        let version = self.read_app_version(bus, delay)?;
        info!(
            "ENS16x: found {:?} fw {}.{}.{}",
            self.variant, version[0], version[1], version[2]
        );

        self.mode(bus, delay, OPMODE_OPERATIONAL, false)
    }

    /// One periodic tick: refresh compensation inputs, then pull the indexed
    /// air quality through the checksum-verified path. Every early return
    /// keeps the previously published value.
    pub fn read<B: I2c>(&mut self, bus: &mut B, filter: &mut EnvironmentalFilter, ctx: &SensorCtx) {
        // device wants Kelvin x64 / %RH x512
        let t_ticks = ((ctx.comp_temperature_c + 273.15).max(0.0) * 64.0) as u16;
        let h_ticks = (ctx.comp_humidity_pct.clamp(0.0, 100.0) * 512.0) as u16;
        let mut comp = [0u8; 4];
        comp[..2].copy_from_slice(&t_ticks.to_le_bytes());
        comp[2..].copy_from_slice(&h_ticks.to_le_bytes());
        if self.dev.write_reg(bus, REG_TEMP_IN, &comp).is_err() {
            return;
        }

        let Some(status) = self.status(bus) else {
            debug!("ENS16x: failed to fetch status");
            return;
        };
        if !status.new_data() {
            return; // nothing fresh to read
        }
        if status.validity() == Status::VALIDITY_INVALID {
            warn!("ENS16x: data flagged invalid, skipping read");
            return;
        }

        let Some(raw) = self.read_data_verified::<B, 2>(bus, REG_DATA_AQ_500) else {
            debug!("ENS16x: air-quality read discarded");
            return;
        };
        let aqi = u16::from_le_bytes(raw);
        if aqi > VocIndex::MAX {
            warn!("ENS16x: air quality {aqi} out of protocol range");
        }
        filter.set_voc_index(self.side, self.src, VocIndex::clamped(aqi));
    }

    /// Write an OPMODE and wait (bounded) for the busy flag to clear.
    fn mode<B: I2c, D: DelayNs>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        opmode: u8,
        quiet: bool,
    ) -> Result<()> {
        if let Err(e) = self.dev.write_reg(bus, REG_OPMODE, &[opmode]) {
            if !quiet {
                warn!("ENS16x: failed to request mode 0x{opmode:02x}: {e}");
            }
            return Err(e.into());
        }
        delay.delay_ms(MODE_SETTLE_MS);

        // a reset does not clear the device-side MISR; resync from hardware
        // while we know no data read is in flight
        let mut actual = [0u8; 1];
        self.dev.read_reg(bus, REG_DATA_MISR, &mut actual)?;
        self.misr.expected = actual[0];

        self.status_await(bus, delay, |s| !s.busy())
    }

    fn read_app_version<B: I2c, D: DelayNs>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
    ) -> Result<[u8; 3]> {
        // clear the GPR region first so the new-GPR flag is meaningful
        self.dev.write_reg(bus, REG_COMMAND, &[CMD_CLEAR_GPR])?;
        self.dev.write_reg(bus, REG_COMMAND, &[CMD_GET_APP_VERSION])?;
        self.status_await(bus, delay, Status::new_gpr)?;
        self.read_data_verified::<B, 3>(bus, REG_GPR_READ4)
            .ok_or_else(|| ProtocolError::UnrecognizedDevice.into())
    }

    fn status<B: I2c>(&mut self, bus: &mut B) -> Option<Status> {
        self.read_data_verified::<B, 1>(bus, REG_DEVICE_STATUS)
            .map(|b| Status(b[0]))
    }

    /// Poll the status register until `accept` passes, up to the attempt
    /// budget. Exhaustion is a definite protocol violation, never a hang.
    fn status_await<B: I2c, D: DelayNs>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        accept: impl Fn(Status) -> bool,
    ) -> Result<()> {
        for _ in 0..POLL_BUDGET {
            match self.status(bus) {
                Some(s) if accept(s) => return Ok(()),
                Some(_) => {}
                None => return Err(ProtocolError::UnrecognizedDevice.into()),
            }
            delay.delay_ms(POLL_DELAY_MS);
        }
        warn!("ENS16x: status poll budget exhausted");
        Err(ProtocolError::PollBudgetExhausted.into())
    }

    /// Data-register read that feeds the local MISR mirror.
    fn read_data<B: I2c, const N: usize>(&mut self, bus: &mut B, reg: u8) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        self.dev.read_reg(bus, reg, &mut out).ok()?;
        self.misr.update(&out);
        Some(out)
    }

    /// Data read plus an independent checksum cross-check. On mismatch the
    /// reading is discarded and the mirror resyncs to the device's value.
    fn read_data_verified<B: I2c, const N: usize>(
        &mut self,
        bus: &mut B,
        reg: u8,
    ) -> Option<[u8; N]> {
        let out = self.read_data::<B, N>(bus, reg)?;

        let mut actual = [0u8; 1];
        self.dev.read_reg(bus, REG_DATA_MISR, &mut actual).ok()?;
        if self.misr.expected != actual[0] {
            warn!(
                "ENS16x: checksum mismatch, expected=0x{:02x} actual=0x{:02x}",
                self.misr.expected, actual[0]
            );
            self.misr.expected = actual[0];
            return None;
        }
        Some(out)
    }
}
