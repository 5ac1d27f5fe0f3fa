//! Host MCU die-temperature source.
//!
//! The MCU's internal sensor measures the Vbe of a biased bipolar diode:
//! typically 0.706 V at 27 degC with a slope of -1.721 mV per degree. Not a
//! precision instrument, but always present — it registers as an ordinary
//! (last-priority) fusion candidate on both sides so a sensorless build
//! still reports a temperature.

use log::debug;

use crate::app::ports::AdcPort;
use crate::fusion::{EnvironmentalFilter, Side, SourceId};
use crate::reading::{Celsius, Reading};

const V_REF: f32 = 3.3;
const V_BE_AT_27C: f32 = 0.706;
const SLOPE_V_PER_C: f32 = 0.001721;

pub struct McuTempSensor {
    intake_src: SourceId,
    exhaust_src: SourceId,
    last: Reading<Celsius>,
}

impl McuTempSensor {
    /// Register on both sides. Call after bus probing so the die sensor
    /// stays the lowest-priority candidate.
    pub fn new(filter: &mut EnvironmentalFilter) -> Self {
        Self {
            intake_src: filter.register(Side::Intake),
            exhaust_src: filter.register(Side::Exhaust),
            last: Reading::NotKnown,
        }
    }

    pub fn name(&self) -> &'static str {
        "MCU Temperature"
    }

    /// One periodic tick. A failed ADC read keeps the previous value.
    pub fn read<A: AdcPort>(&mut self, adc: &mut A, filter: &mut EnvironmentalFilter) {
        match adc.sample() {
            Ok(raw) => {
                let reading = convert(raw);
                if reading.is_known() {
                    self.last = reading;
                }
            }
            Err(_) => debug!("MCU temperature: ADC read failed, keeping previous value"),
        }
        filter.set_temperature(Side::Intake, self.intake_src, self.last);
        filter.set_temperature(Side::Exhaust, self.exhaust_src, self.last);
    }

    /// Latest value, also exposed standalone in the fused snapshot.
    pub fn last(&self) -> Reading<Celsius> {
        self.last
    }
}

/// 12-bit ADC sample -> degrees. The sample is first widened to 16 bits
/// (shift-or fold, exact for 8..=16 bit sources) and scaled against Vref.
fn convert(raw12: u16) -> Reading<Celsius> {
    let raw16 = (raw12 << 4) | (raw12 >> 8);
    let volts = f32::from(raw16) * (V_REF / 65_535.0);
    let deg_c = 27.0 - (volts - V_BE_AT_27C) / SLOPE_V_PER_C;
    Celsius::from_degrees(deg_c)
}
