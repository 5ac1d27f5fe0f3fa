//! End-to-end pipeline tests.

use airscrub::app::ports::StoragePort;
use airscrub::app::service::SensingService;
use airscrub::config::SystemConfig;
use airscrub::fusion::Side;
use airscrub::reading::{Celsius, Reading, VocIndex};

use crate::mock_hw::{Bme280Sim, Ens16xSim, MockBus, NullDelay, SharedStorage, Sgp40Sim, SimAdc};

const BME280_ADDR: u8 = 0x76;
const ENS16X_ADDR: u8 = 0x52;
const SGP40_ADDR: u8 = 0x59;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

type Service = SensingService<MockBus, SimAdc, SharedStorage>;

fn service(intake: MockBus, exhaust: MockBus, storage: SharedStorage, adc: SimAdc) -> Service {
    SensingService::new(
        SystemConfig::default(),
        intake,
        exhaust,
        adc,
        storage,
        &mut NullDelay,
        0,
    )
    .expect("default config is valid")
}

#[test]
fn probe_keeps_identified_sensors_only() {
    let mut intake = MockBus::new();
    intake.attach(BME280_ADDR, Bme280Sim::new());
    intake.attach(ENS16X_ADDR, Ens16xSim::new(0x0160, 130));
    intake.attach(SGP40_ADDR, Sgp40Sim::new(30_000));
    let exhaust = MockBus::new(); // nothing responds here

    let svc = service(intake, exhaust, SharedStorage::new(), SimAdc::new());
    assert_eq!(svc.sensor_count(Side::Intake), 3);
    assert_eq!(svc.sensor_count(Side::Exhaust), 0);
}

#[test]
fn unrecognized_part_id_abandons_the_slot() {
    let mut intake = MockBus::new();
    intake.attach(ENS16X_ADDR, Ens16xSim::new(0xBEEF, 130));

    let svc = service(intake, MockBus::new(), SharedStorage::new(), SimAdc::new());
    assert_eq!(svc.sensor_count(Side::Intake), 0);
}

#[test]
fn stuck_mode_change_abandons_the_slot() {
    let mut intake = MockBus::new();
    let ens = Ens16xSim::new(0x0160, 130);
    ens.borrow_mut().stuck_busy = true;
    intake.attach(ENS16X_ADDR, ens);

    // the bounded status poll runs out of attempts instead of hanging, and
    // the device is treated as absent for the whole session
    let svc = service(intake, MockBus::new(), SharedStorage::new(), SimAdc::new());
    assert_eq!(svc.sensor_count(Side::Intake), 0);
}

#[test]
fn snapshot_fuses_every_kind() {
    let mut intake = MockBus::new();
    intake.attach(BME280_ADDR, Bme280Sim::new());
    intake.attach(ENS16X_ADDR, Ens16xSim::new(0x0160, 130));
    intake.attach(SGP40_ADDR, Sgp40Sim::new(30_000));

    let mut svc = service(intake, MockBus::new(), SharedStorage::new(), SimAdc::new());
    svc.tick(0);
    let snap = svc.snapshot();

    // BME280 wins the intake temperature slot (datasheet raw -> 25.08 C)
    assert_eq!(snap.intake.temperature, Celsius::from_centi(2508));
    let hum = snap.intake.humidity.value().expect("humidity known").centi();
    assert!((4000..=7000).contains(&hum), "humidity {hum}");
    let press = snap.intake.pressure.value().expect("pressure known").deci();
    assert!((900_000..=1_100_000).contains(&press), "pressure {press}");

    // ENS16x is the first VOC candidate
    assert_eq!(snap.intake.voc_index, VocIndex::new(130));

    // nothing on the exhaust bus: the die sensor is the fallback
    let exhaust_t = snap.exhaust.temperature.value().expect("fallback").degrees();
    assert!((26.0..=28.0).contains(&exhaust_t), "exhaust temp {exhaust_t}");
    assert_eq!(snap.exhaust.voc_index, Reading::NotKnown);
    assert!(snap.mcu_temperature.is_known());

    // exhaust VOC unknown -> policy undecidable -> fan off
    assert_eq!(svc.fan_power(), 0.0);
}

#[test]
fn two_phase_read_waits_out_the_settling_delay() {
    let mut intake = MockBus::new();
    let sgp = Sgp40Sim::new(30_000);
    intake.attach(SGP40_ADDR, sgp.clone());

    let mut svc = service(intake, MockBus::new(), SharedStorage::new(), SimAdc::new());

    svc.tick(0);
    assert_eq!(sgp.borrow().measures_issued, 1);
    assert_eq!(sgp.borrow().measure_reads, 0);

    // settling window (320 ms) still open: no read, no re-issue
    svc.tick(100);
    assert_eq!(sgp.borrow().measures_issued, 1);
    assert_eq!(sgp.borrow().measure_reads, 0);

    // next full tick: read, then immediately start the next measurement
    svc.tick(1000);
    assert_eq!(sgp.borrow().measure_reads, 1);
    assert_eq!(sgp.borrow().measures_issued, 2);
}

#[test]
fn transient_failure_retains_previous_value() {
    let mut intake = MockBus::new();
    let bme = Bme280Sim::new();
    intake.attach(BME280_ADDR, bme.clone());

    let mut svc = service(intake, MockBus::new(), SharedStorage::new(), SimAdc::new());
    svc.tick(0);
    assert_eq!(svc.snapshot().intake.temperature, Celsius::from_centi(2508));

    // bus starts NACKing: stale-but-valid, nothing raised to fusion
    bme.borrow_mut().nack = true;
    svc.tick(1000);
    assert_eq!(svc.snapshot().intake.temperature, Celsius::from_centi(2508));

    // recovery with new raw data updates normally
    bme.borrow_mut().nack = false;
    bme.borrow_mut().set_raw(510_000, 415_148, 30_000);
    svc.tick(2000);
    assert_eq!(svc.snapshot().intake.temperature, Celsius::from_centi(2198));
}

#[test]
fn checksum_mismatch_drops_reading_then_recovers() {
    let mut intake = MockBus::new();
    let ens = Ens16xSim::new(0x0160, 130);
    intake.attach(ENS16X_ADDR, ens.clone());

    let mut svc = service(intake, MockBus::new(), SharedStorage::new(), SimAdc::new());
    svc.tick(0);
    assert_eq!(svc.snapshot().intake.voc_index, VocIndex::new(130));

    // desync the device-side accumulator for one byte: the tick's reading
    // must be discarded, and the driver resynchronizes
    {
        let mut ens = ens.borrow_mut();
        ens.set_aqi(200);
        ens.skip_misr_once = true;
    }
    svc.tick(1000);
    assert_eq!(svc.snapshot().intake.voc_index, VocIndex::new(130));

    svc.tick(2000);
    assert_eq!(svc.snapshot().intake.voc_index, VocIndex::new(200));
}

#[test]
fn bare_buses_fuse_to_not_known() {
    let adc = SimAdc::new();
    adc.fail.set(true);
    let mut svc = service(MockBus::new(), MockBus::new(), SharedStorage::new(), adc);
    svc.tick(0);

    let snap = svc.snapshot();
    assert_eq!(snap.intake.temperature, Reading::NotKnown);
    assert_eq!(snap.intake.voc_index, Reading::NotKnown);
    assert_eq!(snap.exhaust.temperature, Reading::NotKnown);
    assert_eq!(snap.mcu_temperature, Reading::NotKnown);
    assert_eq!(svc.fan_power(), 0.0);
}

#[test]
fn fan_policy_fires_then_cools_down() {
    let mut intake = MockBus::new();
    let ens_in = Ens16xSim::new(0x0160, 130);
    intake.attach(ENS16X_ADDR, ens_in.clone());

    let mut exhaust = MockBus::new();
    let ens_ex = Ens16xSim::new(0x0161, 80);
    exhaust.attach(ENS16X_ADDR, ens_ex.clone());

    let mut svc = service(intake, exhaust, SharedStorage::new(), SimAdc::new());

    // max(130, 80) >= 125: filter
    svc.tick(0);
    assert_eq!(svc.fan_power(), 1.0);

    // air cleans up, but we're inside the cooldown window
    ens_in.borrow_mut().set_aqi(100);
    ens_ex.borrow_mut().set_aqi(95);
    svc.tick(1000);
    assert_eq!(svc.fan_power(), 1.0);

    // cooldown (15 min) expired, improvement 5 < 25: stop
    svc.tick(16 * 60 * 1000);
    assert_eq!(svc.fan_power(), 0.0);
}

#[test]
fn hot_exhaust_derates_fan_power() {
    let mut intake = MockBus::new();
    intake.attach(ENS16X_ADDR, Ens16xSim::new(0x0160, 300));

    let mut exhaust = MockBus::new();
    let bme = Bme280Sim::new();
    // raw chosen to land mid-band (~54.8 C) between thermal_min and max
    bme.borrow_mut().set_raw(615_000, 415_148, 30_000);
    exhaust.attach(BME280_ADDR, bme);
    exhaust.attach(ENS16X_ADDR, Ens16xSim::new(0x0161, 80));

    let mut svc = service(intake, exhaust, SharedStorage::new(), SimAdc::new());
    svc.tick(0);

    // policy says filter, thermal limiter scales it down
    let fan = svc.fan_power();
    assert!(fan > 0.3 && fan < 0.7, "derated fan power {fan}");
}

#[test]
fn calibration_checkpoints_and_restores_across_sessions() {
    let storage = SharedStorage::new();

    {
        let mut intake = MockBus::new();
        intake.attach(SGP40_ADDR, Sgp40Sim::new(30_000));
        let mut svc = service(intake, MockBus::new(), storage.clone(), SimAdc::new());

        svc.tick(0);
        svc.tick(1000);
        // no checkpoint before the interval elapses
        let mut buf = [0u8; 8];
        assert!(storage.load("voc-cal-intake", &mut buf).is_err());

        svc.tick(DAY_MS + 1000);
        let n = storage
            .load("voc-cal-intake", &mut buf)
            .expect("checkpoint written");
        assert_eq!(n, 8);
        assert_ne!(buf, [0u8; 8], "a genuine save is never the all-zero pair");
    }

    // new session, same storage: the engine warm-starts and skips the
    // cold-start blackout entirely
    let mut intake = MockBus::new();
    intake.attach(SGP40_ADDR, Sgp40Sim::new(30_000));
    let mut svc = service(intake, MockBus::new(), storage, SimAdc::new());

    svc.tick(0);
    svc.tick(1000);
    let voc = svc.snapshot().intake.voc_index;
    assert!(voc.is_known(), "restored engine should publish immediately");
}

#[test]
fn cold_start_engine_stays_silent_through_blackout() {
    let mut intake = MockBus::new();
    intake.attach(SGP40_ADDR, Sgp40Sim::new(30_000));
    let mut svc = service(intake, MockBus::new(), SharedStorage::new(), SimAdc::new());

    // a couple of samples are nowhere near the warmup count
    for t in 0..4u64 {
        svc.tick(t * 1000);
    }
    assert_eq!(svc.snapshot().intake.voc_index, Reading::NotKnown);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = SystemConfig {
        voc_passive_max: 0,
        ..Default::default()
    };
    let result: Result<Service, _> = SensingService::new(
        config,
        MockBus::new(),
        MockBus::new(),
        SimAdc::new(),
        SharedStorage::new(),
        &mut NullDelay,
        0,
    );
    assert!(result.is_err());
}
