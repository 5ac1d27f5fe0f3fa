//! Session context — the sensing core's single owner of state.
//!
//! [`SensingService`] is constructed once at session start and threaded
//! through the main loop; there are no module-level globals. It owns both
//! bus handles, every identified sensor, the environmental filter, the fan
//! policy, and the storage handle for calibration persistence.
//!
//! Each [`tick`](SensingService::tick):
//! 1. schedules every sensor on both buses (issue/read sequencing included),
//! 2. reads the host die-temperature source,
//! 3. fuses everything into a fresh [`FusedSnapshot`] (wholesale replace),
//! 4. persists any due calibration checkpoints,
//! 5. re-evaluates the fan policy against the new snapshot.
//!
//! The snapshot accessor returns a copy, so consumers (BLE reporting, UI —
//! all out of scope here) can never observe a half-updated view.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use heapless::Vec;
use log::{info, warn};

use crate::app::ports::{AdcPort, StorageError, StoragePort};
use crate::config::SystemConfig;
use crate::control::fan_policy::{FanPolicy, FanPolicyParams, ThermalLimit};
use crate::error::{Error, Result};
use crate::fusion::{EnvironmentalFilter, FusedSnapshot, Side};
use crate::scheduler::{self, SensorCtx};
use crate::sensors::gas_index::CalibrationBlob;
use crate::sensors::mcu_temp::McuTempSensor;
use crate::sensors::{probe_bus, SensorHandle, MAX_SENSORS_PER_BUS};

/// Storage key for a side's VOC calibration blob.
fn calibration_key(side: Side) -> &'static str {
    match side {
        Side::Intake => "voc-cal-intake",
        Side::Exhaust => "voc-cal-exhaust",
    }
}

pub struct SensingService<B, A, S> {
    config: SystemConfig,
    intake_bus: B,
    exhaust_bus: B,
    adc: A,
    storage: S,
    intake_sensors: Vec<SensorHandle, MAX_SENSORS_PER_BUS>,
    exhaust_sensors: Vec<SensorHandle, MAX_SENSORS_PER_BUS>,
    mcu_temp: McuTempSensor,
    filter: EnvironmentalFilter,
    policy: FanPolicy,
    thermal: ThermalLimit,
    snapshot: FusedSnapshot,
    fan_power: f32,
}

impl<B: I2c, A: AdcPort, S: StoragePort> SensingService<B, A, S> {
    /// Probe both buses, restore persisted calibration, and assemble the
    /// session. Zero sensors anywhere is a degraded-but-valid session; an
    /// invalid configuration is not.
    pub fn new(
        config: SystemConfig,
        mut intake_bus: B,
        mut exhaust_bus: B,
        adc: A,
        storage: S,
        delay: &mut impl DelayNs,
        now_ms: u64,
    ) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        let mut filter = EnvironmentalFilter::new();

        info!("intake bus: probing sensors");
        let mut intake_sensors = probe_bus(
            &mut intake_bus,
            delay,
            &config,
            &mut filter,
            Side::Intake,
            now_ms,
        );
        info!("exhaust bus: probing sensors");
        let mut exhaust_sensors = probe_bus(
            &mut exhaust_bus,
            delay,
            &config,
            &mut filter,
            Side::Exhaust,
            now_ms,
        );

        // the die sensor registers last: it is the fallback of last resort
        let mcu_temp = McuTempSensor::new(&mut filter);

        restore_calibration(&storage, Side::Intake, &mut intake_sensors, now_ms);
        restore_calibration(&storage, Side::Exhaust, &mut exhaust_sensors, now_ms);

        let policy = FanPolicy::new(FanPolicyParams::from_config(&config));
        let thermal = ThermalLimit::from_config(&config);

        Ok(Self {
            config,
            intake_bus,
            exhaust_bus,
            adc,
            storage,
            intake_sensors,
            exhaust_sensors,
            mcu_temp,
            filter,
            policy,
            thermal,
            snapshot: FusedSnapshot::NOT_KNOWN,
            fan_power: 0.0,
        })
    }

    /// One cooperative scheduler tick. `now_ms` is the session-monotonic
    /// clock; the caller ticks at `config.sensor_update_period_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        let Self {
            intake_bus,
            exhaust_bus,
            adc,
            storage,
            intake_sensors,
            exhaust_sensors,
            mcu_temp,
            filter,
            policy,
            thermal,
            snapshot,
            fan_power,
            ..
        } = self;

        let (t, h) = filter.compensation(Side::Intake);
        let ctx = SensorCtx {
            comp_temperature_c: t,
            comp_humidity_pct: h,
        };
        scheduler::tick_side(intake_bus, intake_sensors, filter, &ctx, now_ms);

        let (t, h) = filter.compensation(Side::Exhaust);
        let ctx = SensorCtx {
            comp_temperature_c: t,
            comp_humidity_pct: h,
        };
        scheduler::tick_side(exhaust_bus, exhaust_sensors, filter, &ctx, now_ms);

        mcu_temp.read(adc, filter);

        *snapshot = filter.fuse(mcu_temp.last());

        checkpoint_side(storage, Side::Intake, intake_sensors, now_ms);
        checkpoint_side(storage, Side::Exhaust, exhaust_sensors, now_ms);

        let environmental = policy.evaluate(snapshot, now_ms);
        let coefficient = thermal.coefficient(snapshot.exhaust.temperature);
        *fan_power = environmental * coefficient;
    }

    /// Latest fused view of the environment, as one coherent copy.
    pub fn snapshot(&self) -> FusedSnapshot {
        self.snapshot
    }

    /// Current fan power fraction in [0, 1].
    pub fn fan_power(&self) -> f32 {
        self.fan_power
    }

    pub fn sensor_count(&self, side: Side) -> usize {
        match side {
            Side::Intake => self.intake_sensors.len(),
            Side::Exhaust => self.exhaust_sensors.len(),
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }
}

/// Load each calibrated sensor's blob exactly once, at session start.
fn restore_calibration<S: StoragePort>(
    storage: &S,
    side: Side,
    sensors: &mut Vec<SensorHandle, MAX_SENSORS_PER_BUS>,
    now_ms: u64,
) {
    for handle in sensors.iter_mut() {
        if !handle.driver.has_calibration() {
            continue;
        }
        let key = calibration_key(side);
        let mut buf = [0u8; CalibrationBlob::SIZE];
        match storage.load(key, &mut buf) {
            Ok(n) => match CalibrationBlob::from_bytes(&buf[..n]) {
                Ok(blob) => handle.driver.restore_calibration(&blob, now_ms),
                Err(_) => warn!("{key}: malformed calibration blob, cold start"),
            },
            Err(StorageError::NotFound) => {
                info!("{key}: no saved calibration, cold start");
            }
            Err(e) => warn!("{key}: calibration load failed: {e}"),
        }
    }
}

/// Persist any calibration state whose checkpoint interval has elapsed.
fn checkpoint_side<S: StoragePort>(
    storage: &mut S,
    side: Side,
    sensors: &mut Vec<SensorHandle, MAX_SENSORS_PER_BUS>,
    now_ms: u64,
) {
    for handle in sensors.iter_mut() {
        if let Some(blob) = handle.driver.checkpoint(now_ms) {
            let key = calibration_key(side);
            match storage.store(key, &blob.to_bytes()) {
                Ok(()) => info!("{key}: calibration checkpoint saved"),
                Err(e) => warn!("{key}: calibration checkpoint failed: {e}"),
            }
        }
    }
}
