//! Mock hardware for integration tests.
//!
//! A scripted I2C bus serving register-level simulations of the supported
//! devices, plus shared-handle storage/ADC adapters. Device simulations are
//! held behind `Rc<RefCell<..>>` so tests keep a handle for injecting
//! values and faults after the service has taken ownership of the bus.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};

use airscrub::adapters::storage::MemStorage;
use airscrub::app::ports::{AdcError, AdcPort, StorageError, StoragePort};

// ───────────────────────────────────────────────────────────────
// Bus plumbing
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MockI2cError;

impl embedded_hal::i2c::Error for MockI2cError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

pub trait SimDevice {
    fn nacked(&self) -> bool {
        false
    }
    fn on_write(&mut self, bytes: &[u8]);
    fn on_read(&mut self, buf: &mut [u8]);
}

pub struct MockBus {
    devices: Vec<(u8, Rc<RefCell<dyn SimDevice>>)>,
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    pub fn attach(&mut self, address: u8, device: Rc<RefCell<dyn SimDevice>>) {
        self.devices.push((address, device));
    }
}

impl ErrorType for MockBus {
    type Error = MockI2cError;
}

impl I2c<SevenBitAddress> for MockBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), MockI2cError> {
        let device = self
            .devices
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, d)| d.clone())
            .ok_or(MockI2cError)?;
        let mut device = device.borrow_mut();
        if device.nacked() {
            return Err(MockI2cError);
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => device.on_write(bytes),
                Operation::Read(buf) => device.on_read(buf),
            }
        }
        Ok(())
    }
}

/// Probe-time settle waits become no-ops on the host.
pub struct NullDelay;

impl DelayNs for NullDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ───────────────────────────────────────────────────────────────
// BME280 simulation
// ───────────────────────────────────────────────────────────────

pub struct Bme280Sim {
    regs: [u8; 256],
    ptr: u8,
    pub nack: bool,
}

impl Bme280Sim {
    /// Datasheet worked-example trim, raw values near 25 degC / 1 atm.
    pub fn new() -> Rc<RefCell<Self>> {
        let mut regs = [0u8; 256];
        regs[0xD0] = 0x60; // chip id

        let tp: [(usize, i32); 12] = [
            (0x88, 27_504), // T1 (u16)
            (0x8A, 26_435), // T2
            (0x8C, -1_000), // T3
            (0x8E, 36_477), // P1 (u16)
            (0x90, -10_685),
            (0x92, 3_024),
            (0x94, 2_855),
            (0x96, 140),
            (0x98, -7),
            (0x9A, 15_500),
            (0x9C, -14_600),
            (0x9E, 6_000),
        ];
        for (addr, value) in tp {
            let bytes = (value as i16).to_le_bytes();
            regs[addr] = bytes[0];
            regs[addr + 1] = bytes[1];
        }
        regs[0xA1] = 75; // H1
        regs[0xE1] = 0x6D; // H2 = 365
        regs[0xE2] = 0x01;
        regs[0xE3] = 0; // H3
        regs[0xE4] = 0x13; // H4 = 310 (with low nibble of 0xE5)
        regs[0xE5] = 0x26; // H5 = 50 (with high nibble)
        regs[0xE6] = 0x03;
        regs[0xE7] = 30; // H6

        let mut sim = Self {
            regs,
            ptr: 0,
            nack: false,
        };
        sim.set_raw(519_888, 415_148, 30_000);
        Rc::new(RefCell::new(sim))
    }

    /// Load the measurement shadow registers (20/20/16-bit raw values).
    pub fn set_raw(&mut self, adc_t: u32, adc_p: u32, adc_h: u16) {
        self.regs[0xF7] = (adc_p >> 12) as u8;
        self.regs[0xF8] = (adc_p >> 4) as u8;
        self.regs[0xF9] = ((adc_p & 0xF) << 4) as u8;
        self.regs[0xFA] = (adc_t >> 12) as u8;
        self.regs[0xFB] = (adc_t >> 4) as u8;
        self.regs[0xFC] = ((adc_t & 0xF) << 4) as u8;
        self.regs[0xFD] = (adc_h >> 8) as u8;
        self.regs[0xFE] = adc_h as u8;
    }
}

impl SimDevice for Bme280Sim {
    fn nacked(&self) -> bool {
        self.nack
    }

    fn on_write(&mut self, bytes: &[u8]) {
        self.ptr = bytes[0];
        for (i, b) in bytes[1..].iter().enumerate() {
            self.regs[self.ptr as usize + i] = *b;
        }
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.regs[self.ptr as usize];
            self.ptr = self.ptr.wrapping_add(1);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ENS16x simulation
// ───────────────────────────────────────────────────────────────

const ENS_REG_OPMODE: u8 = 0x10;
const ENS_REG_COMMAND: u8 = 0x12;
const ENS_REG_STATUS: u8 = 0x20;
const ENS_REG_AQI: u8 = 0x26;
const ENS_REG_MISR: u8 = 0x38;
const ENS_REG_GPR_READ4: u8 = 0x4C;

pub struct Ens16xSim {
    regs: [u8; 0x60],
    ptr: u8,
    misr: u8,
    mode: u8,
    /// Status reads left before the busy flag clears after a mode change.
    busy_polls: u8,
    new_gpr: bool,
    /// Skip the device-side MISR update for one data byte, desyncing the
    /// accumulators the way a corrupted transfer would.
    pub skip_misr_once: bool,
    /// Report the busy flag forever, simulating a mode change that never
    /// completes its handshake.
    pub stuck_busy: bool,
    pub nack: bool,
}

impl Ens16xSim {
    pub fn new(part_id: u16, aqi: u16) -> Rc<RefCell<Self>> {
        let mut regs = [0u8; 0x60];
        regs[0] = part_id as u8;
        regs[1] = (part_id >> 8) as u8;
        regs[ENS_REG_AQI as usize] = aqi as u8;
        regs[ENS_REG_AQI as usize + 1] = (aqi >> 8) as u8;
        Rc::new(RefCell::new(Self {
            regs,
            ptr: 0,
            misr: 0,
            mode: 0,
            busy_polls: 0,
            new_gpr: false,
            skip_misr_once: false,
            stuck_busy: false,
            nack: false,
        }))
    }

    pub fn set_aqi(&mut self, aqi: u16) {
        self.regs[ENS_REG_AQI as usize] = aqi as u8;
        self.regs[ENS_REG_AQI as usize + 1] = (aqi >> 8) as u8;
    }

    fn status_byte(&self) -> u8 {
        let mut s = 0u8;
        if self.new_gpr {
            s |= 0x01;
        }
        if self.mode == 0x02 {
            s |= 0x02; // new_data whenever operational
        }
        if self.stuck_busy || self.busy_polls > 0 {
            s |= 0x80; // opmode change still running
        }
        s
    }

    fn misr_apply(miso: u8, data: u8) -> u8 {
        let xor = (miso << 1) ^ data;
        if miso & 0x80 == 0 {
            xor
        } else {
            xor ^ 0x1D
        }
    }
}

impl SimDevice for Ens16xSim {
    fn nacked(&self) -> bool {
        self.nack
    }

    fn on_write(&mut self, bytes: &[u8]) {
        let reg = bytes[0];
        self.ptr = reg;
        match (reg, bytes.get(1)) {
            (ENS_REG_OPMODE, Some(&mode)) => {
                self.mode = mode;
                self.busy_polls = 2;
            }
            (ENS_REG_COMMAND, Some(&0xCC)) => {
                // ClearGPR
                for r in &mut self.regs[0x48..0x50] {
                    *r = 0;
                }
                self.new_gpr = false;
            }
            (ENS_REG_COMMAND, Some(&0x0E)) => {
                // GetAppVersion
                self.regs[ENS_REG_GPR_READ4 as usize] = 7;
                self.regs[ENS_REG_GPR_READ4 as usize + 1] = 2;
                self.regs[ENS_REG_GPR_READ4 as usize + 2] = 1;
                self.new_gpr = true;
            }
            _ => {
                for (i, b) in bytes[1..].iter().enumerate() {
                    self.regs[reg as usize + i] = *b;
                }
            }
        }
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            let reg = self.ptr;
            let value = if reg == ENS_REG_STATUS {
                let s = self.status_byte();
                self.busy_polls = self.busy_polls.saturating_sub(1);
                s
            } else if reg == ENS_REG_MISR {
                self.misr
            } else {
                self.regs[reg as usize]
            };
            *b = value;

            // every served byte feeds the rolling checksum except the
            // checksum register itself
            if reg != ENS_REG_MISR {
                if self.skip_misr_once {
                    self.skip_misr_once = false;
                } else {
                    self.misr = Self::misr_apply(self.misr, value);
                }
            }
            self.ptr = self.ptr.wrapping_add(1);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// SGP40 simulation
// ───────────────────────────────────────────────────────────────

pub struct Sgp40Sim {
    pub raw: u16,
    pending: Vec<u8>,
    pub measures_issued: u32,
    pub measure_reads: u32,
    pending_is_measurement: bool,
    pub self_test_ok: bool,
    pub nack: bool,
}

impl Sgp40Sim {
    pub fn new(raw: u16) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            raw,
            pending: Vec::new(),
            measures_issued: 0,
            measure_reads: 0,
            pending_is_measurement: false,
            self_test_ok: true,
            nack: false,
        }))
    }

    fn word_with_crc(word: u16) -> Vec<u8> {
        let bytes = word.to_be_bytes();
        vec![bytes[0], bytes[1], crc8_sensirion(&bytes)]
    }
}

fn crc8_sensirion(data: &[u8]) -> u8 {
    let mut crc = 0xFFu8;
    for &x in data {
        crc ^= x;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

impl SimDevice for Sgp40Sim {
    fn nacked(&self) -> bool {
        self.nack
    }

    fn on_write(&mut self, bytes: &[u8]) {
        if bytes.len() < 2 {
            return;
        }
        let cmd = u16::from_be_bytes([bytes[0], bytes[1]]);
        match cmd {
            0x3615 => {
                // heater off: ack only
                self.pending.clear();
                self.pending_is_measurement = false;
            }
            0x280E => {
                let code = if self.self_test_ok { 0xD4_00 } else { 0x4B_00 };
                self.pending = Self::word_with_crc(code);
                self.pending_is_measurement = false;
            }
            0x260F => {
                self.measures_issued += 1;
                self.pending = Self::word_with_crc(self.raw);
                self.pending_is_measurement = true;
            }
            _ => {}
        }
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        if self.pending_is_measurement {
            self.measure_reads += 1;
        }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.pending.get(i).copied().unwrap_or(0);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ADC + storage adapters
// ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SimAdc {
    pub value: Rc<Cell<u16>>,
    pub fail: Rc<Cell<bool>>,
}

impl SimAdc {
    /// Defaults to a sample reading ~27 degC on the die sensor scale.
    pub fn new() -> Self {
        Self {
            value: Rc::new(Cell::new(876)),
            fail: Rc::new(Cell::new(false)),
        }
    }
}

impl AdcPort for SimAdc {
    fn sample(&mut self) -> Result<u16, AdcError> {
        if self.fail.get() {
            return Err(AdcError::ReadFailed);
        }
        Ok(self.value.get())
    }
}

/// Storage handle tests can keep after the service takes ownership.
#[derive(Clone, Default)]
pub struct SharedStorage(pub Rc<RefCell<MemStorage>>);

impl SharedStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for SharedStorage {
    fn load(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.0.borrow().load(key, buf)
    }

    fn store(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.0.borrow_mut().store(key, data)
    }
}
