//! BME280 combined pressure/humidity/temperature sensor.
//!
//! Periodic capability: the device free-runs in normal mode and every tick
//! is a burst read of the shadowed measurement registers, compensated with
//! the factory trim coefficients (datasheet integer math, t_fine shared
//! between channels).

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, warn};

use crate::bus::I2cDevice;
use crate::config::SystemConfig;
use crate::fusion::{EnvironmentalFilter, Side, SourceId};
use crate::reading::{Celsius, Pascals, RelHumidity};

/// LSB is strap-selectable on the module; this layout straps it low.
const ADDRESS: u8 = 0x76;

const CHIP_ID: u8 = 0x60;

const REG_CALIB_TP: u8 = 0x88; // dig_T1..dig_P9 + dig_H1 (26 bytes)
const REG_CHIP_ID: u8 = 0xD0;
const REG_RESET: u8 = 0xE0;
const REG_CALIB_H: u8 = 0xE1; // dig_H2..dig_H6 (7 bytes)
const REG_CTRL_HUM: u8 = 0xF2;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7; // press[3] temp[3] hum[2]

const RESET_WORD: u8 = 0xB6;
const MODE_NORMAL: u8 = 0b11;
const STANDBY_250_MS: u8 = 0b011;
const STARTUP_DELAY_MS: u32 = 2;

/// Raw sample value a disabled/not-yet-sampled channel reports.
const SAMPLE_SKIPPED_20BIT: u32 = 0x8_0000;

/// Factory trim coefficients.
#[derive(Debug, Clone, Copy)]
struct Calibration {
    t1: u16,
    t2: i16,
    t3: i16,
    p1: u16,
    p2: i16,
    p3: i16,
    p4: i16,
    p5: i16,
    p6: i16,
    p7: i16,
    p8: i16,
    p9: i16,
    h1: u8,
    h2: i16,
    h3: u8,
    h4: i16,
    h5: i16,
    h6: i8,
}

impl Calibration {
    fn parse(tp: &[u8; 26], h: &[u8; 7]) -> Self {
        let u = |i: usize, b: &[u8]| u16::from_le_bytes([b[i], b[i + 1]]);
        let s = |i: usize, b: &[u8]| i16::from_le_bytes([b[i], b[i + 1]]);
        Self {
            t1: u(0, tp),
            t2: s(2, tp),
            t3: s(4, tp),
            p1: u(6, tp),
            p2: s(8, tp),
            p3: s(10, tp),
            p4: s(12, tp),
            p5: s(14, tp),
            p6: s(16, tp),
            p7: s(18, tp),
            p8: s(20, tp),
            p9: s(22, tp),
            h1: tp[25],
            h2: s(0, h),
            h3: h[2],
            // H4/H5 interleave a shared nibble at 0xE5
            h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            h6: h[6] as i8,
        }
    }

    /// Returns (temperature in 0.01 degC, t_fine for the other channels).
    fn compensate_temperature(&self, adc_t: i32) -> (i32, i32) {
        let var1 = (((adc_t >> 3) - (i32::from(self.t1) << 1)) * i32::from(self.t2)) >> 11;
        let d = (adc_t >> 4) - i32::from(self.t1);
        let var2 = (((d * d) >> 12) * i32::from(self.t3)) >> 14;
        let t_fine = var1 + var2;
        ((t_fine * 5 + 128) >> 8, t_fine)
    }

    /// Pressure in Pa as Q24.8, or `None` when the divisor degenerates.
    fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> Option<u32> {
        let mut var1 = i64::from(t_fine) - 128_000;
        let mut var2 = var1 * var1 * i64::from(self.p6);
        var2 += (var1 * i64::from(self.p5)) << 17;
        var2 += i64::from(self.p4) << 35;
        var1 = ((var1 * var1 * i64::from(self.p3)) >> 8) + ((var1 * i64::from(self.p2)) << 12);
        var1 = (((1i64 << 47) + var1) * i64::from(self.p1)) >> 33;
        if var1 == 0 {
            return None;
        }
        let mut p = 1_048_576 - i64::from(adc_p);
        p = (((p << 31) - var2) * 3125) / var1;
        let var1 = (i64::from(self.p9) * (p >> 13) * (p >> 13)) >> 25;
        let var2 = (i64::from(self.p8) * p) >> 19;
        p = ((p + var1 + var2) >> 8) + (i64::from(self.p7) << 4);
        Some(p as u32)
    }

    /// Relative humidity in %RH as Q22.10.
    fn compensate_humidity(&self, adc_h: i32, t_fine: i32) -> u32 {
        let v = t_fine - 76_800;
        let mut x = (adc_h << 14) - (i32::from(self.h4) << 20) - (i32::from(self.h5) * v);
        x = (x + 16_384) >> 15;
        let y = (((((v * i32::from(self.h6)) >> 10)
            * (((v * i32::from(self.h3)) >> 11) + 32_768))
            >> 10)
            + 2_097_152)
            * i32::from(self.h2)
            + 8_192;
        let mut h = x * (y >> 14);
        h -= ((((h >> 15) * (h >> 15)) >> 7) * i32::from(self.h1)) >> 4;
        h = h.clamp(0, 419_430_400);
        (h >> 12) as u32
    }
}

pub struct Bme280 {
    dev: I2cDevice,
    calib: Calibration,
    side: Side,
    src: SourceId,
}

impl Bme280 {
    /// Identify and start a BME280 on `bus`. `None` means nothing (or
    /// something else) answered at the address — not an error during a
    /// probe sweep.
    pub fn probe<B: I2c, D: DelayNs>(
        bus: &mut B,
        delay: &mut D,
        config: &SystemConfig,
        filter: &mut EnvironmentalFilter,
        side: Side,
    ) -> Option<Self> {
        let dev = I2cDevice::new("BME280", ADDRESS).ok()?;

        let mut id = [0u8; 1];
        dev.read_reg(bus, REG_CHIP_ID, &mut id).ok()?;
        if id[0] != CHIP_ID {
            // occupied by a different part (a BME68x answers here too)
            debug!("BME280: chip id 0x{:02x} is not ours", id[0]);
            return None;
        }

        if dev.write_reg(bus, REG_RESET, &[RESET_WORD]).is_err() {
            return None;
        }
        delay.delay_ms(STARTUP_DELAY_MS);

        let mut tp = [0u8; 26];
        let mut h = [0u8; 7];
        dev.read_reg(bus, REG_CALIB_TP, &mut tp).ok()?;
        dev.read_reg(bus, REG_CALIB_H, &mut h).ok()?;
        let calib = Calibration::parse(&tp, &h);

        let osr = config.bme280_oversampling.bits();
        let ctrl_hum = osr;
        let ctrl_meas = (osr << 5) | (osr << 2) | MODE_NORMAL;
        let cfg = (STANDBY_250_MS << 5) | (config.bme280_filter.bits() << 2);
        // ctrl_hum only latches once ctrl_meas is written after it
        dev.write_reg(bus, REG_CTRL_HUM, &[ctrl_hum]).ok()?;
        dev.write_reg(bus, REG_CONFIG, &[cfg]).ok()?;
        dev.write_reg(bus, REG_CTRL_MEAS, &[ctrl_meas]).ok()?;

        Some(Self {
            dev,
            calib,
            side,
            src: filter.register(side),
        })
    }

    pub fn name(&self) -> &'static str {
        "BME280"
    }

    /// One periodic tick: burst-read the measurement shadow and publish
    /// every channel. Any failure keeps the previously published values.
    pub fn read<B: I2c>(&mut self, bus: &mut B, filter: &mut EnvironmentalFilter) {
        let mut raw = [0u8; 8];
        if self.dev.read_reg(bus, REG_DATA, &mut raw).is_err() {
            debug!("BME280: burst read failed, keeping previous values");
            return;
        }

        let adc_p =
            (u32::from(raw[0]) << 12) | (u32::from(raw[1]) << 4) | (u32::from(raw[2]) >> 4);
        let adc_t =
            (u32::from(raw[3]) << 12) | (u32::from(raw[4]) << 4) | (u32::from(raw[5]) >> 4);
        let adc_h = (u32::from(raw[6]) << 8) | u32::from(raw[7]);

        if adc_t == SAMPLE_SKIPPED_20BIT {
            debug!("BME280: no sample ready");
            return;
        }

        let (t_centi, t_fine) = self.calib.compensate_temperature(adc_t as i32);
        match i16::try_from(t_centi) {
            Ok(c) => filter.set_temperature(self.side, self.src, Celsius::from_centi(c)),
            Err(_) => warn!("BME280: temperature out of representable range"),
        }

        if adc_p != SAMPLE_SKIPPED_20BIT {
            if let Some(p_q24_8) = self.calib.compensate_pressure(adc_p as i32, t_fine) {
                let deci_pa = ((u64::from(p_q24_8) * 10) >> 8) as u32;
                filter.set_pressure(self.side, self.src, Pascals::from_deci(deci_pa));
            }
        }

        let h_q22_10 = self.calib.compensate_humidity(adc_h as i32, t_fine);
        let centi = ((u64::from(h_q22_10) * 100) / 1024) as u16;
        filter.set_humidity(self.side, self.src, RelHumidity::from_centi(centi));
    }
}
