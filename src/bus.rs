//! I2C transaction layer.
//!
//! [`I2cDevice`] is a thin value type (name + address) whose operations run
//! over any [`embedded_hal::i2c::I2c`] handle passed in per call — drivers
//! never own a bus, so two drivers on one bus can never overlap transactions.
//!
//! Two wire dialects are covered:
//! - register-addressed devices: `write_reg` / `read_reg` /
//!   `read_reg_verified` (payload + trailing CRC-8 byte);
//! - Sensirion-style command devices: big-endian 16-bit commands, arguments
//!   and responses carried as 16-bit words each followed by a CRC-8 byte.
//!
//! Verified reads return `Option`: a checksum mismatch (or the underlying
//! transfer failing) is logged and yields `None`, never a hard error — the
//! caller keeps its previous value and retries on its next tick.

use embedded_hal::i2c::{I2c, Operation};
use log::{debug, warn};

use crate::crc::{crc8, Crc8};
use crate::error::{Error, Result, TransferError};

/// I2C reserves addresses whose top/bottom three bits are all 0 or all 1
/// (general call, CBUS, 10-bit addressing, ...). No transaction may be
/// attempted against them.
pub const fn address_reserved(addr: u8) -> bool {
    const MASK: u8 = 0b111_1000;
    let masked = addr & MASK;
    masked == 0 || masked == MASK
}

/// One addressed device on a bus.
#[derive(Debug, Clone, Copy)]
pub struct I2cDevice {
    name: &'static str,
    address: u8,
}

impl I2cDevice {
    /// Reserved addresses are rejected here, before any transaction exists.
    pub fn new(name: &'static str, address: u8) -> Result<Self> {
        if address_reserved(address) {
            return Err(Error::Config("reserved I2C address"));
        }
        Ok(Self { name, address })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn xfer_err<E: embedded_hal::i2c::Error>(&self, what: &str, e: E) -> TransferError {
        let err = TransferError::from_i2c(e.kind());
        debug!("{} [0x{:02x}]: {} failed: {}", self.name, self.address, what, err);
        err
    }

    // ── register-addressed dialect ────────────────────────────

    /// Write `payload` to `reg`. Single transaction, never retried.
    pub fn write_reg<B: I2c>(
        &self,
        bus: &mut B,
        reg: u8,
        payload: &[u8],
    ) -> core::result::Result<(), TransferError> {
        let mut buf = [0u8; 8];
        buf[0] = reg;
        buf[1..=payload.len()].copy_from_slice(payload);
        bus.write(self.address, &buf[..=payload.len()])
            .map_err(|e| self.xfer_err("register write", e))
    }

    /// Read `out.len()` bytes starting at `reg`.
    pub fn read_reg<B: I2c>(
        &self,
        bus: &mut B,
        reg: u8,
        out: &mut [u8],
    ) -> core::result::Result<(), TransferError> {
        bus.write_read(self.address, &[reg], out)
            .map_err(|e| self.xfer_err("register read", e))
    }

    /// Read an `N`-byte payload plus one trailing CRC byte from `reg`;
    /// return the payload only when the checksum matches.
    pub fn read_reg_verified<B: I2c, const N: usize>(
        &self,
        bus: &mut B,
        reg: u8,
        init: Crc8,
    ) -> Option<[u8; N]> {
        let mut payload = [0u8; N];
        let mut checksum = [0u8; 1];
        let reg_buf = [reg];
        // consecutive reads continue the same transfer without re-addressing
        let mut ops = [
            Operation::Write(&reg_buf),
            Operation::Read(&mut payload),
            Operation::Read(&mut checksum),
        ];
        if let Err(e) = bus.transaction(self.address, &mut ops) {
            self.xfer_err("verified read", e);
            return None;
        }
        if crc8(&payload, init) != checksum[0] {
            warn!(
                "{} [0x{:02x}]: checksum mismatch on reg 0x{:02x}",
                self.name, self.address, reg
            );
            return None;
        }
        Some(payload)
    }

    // ── Sensirion command dialect ─────────────────────────────

    /// Issue a bare big-endian 16-bit command.
    pub fn command<B: I2c>(
        &self,
        bus: &mut B,
        cmd: u16,
    ) -> core::result::Result<(), TransferError> {
        bus.write(self.address, &cmd.to_be_bytes())
            .map_err(|e| self.xfer_err("command", e))
    }

    /// Issue a command with word arguments, each followed by its CRC.
    pub fn command_args<B: I2c>(
        &self,
        bus: &mut B,
        cmd: u16,
        args: &[u16],
        init: Crc8,
    ) -> core::result::Result<(), TransferError> {
        let mut buf = [0u8; 2 + 3 * 2];
        buf[..2].copy_from_slice(&cmd.to_be_bytes());
        let mut len = 2;
        for arg in args {
            let word = arg.to_be_bytes();
            buf[len..len + 2].copy_from_slice(&word);
            buf[len + 2] = crc8(&word, init);
            len += 3;
        }
        bus.write(self.address, &buf[..len])
            .map_err(|e| self.xfer_err("command", e))
    }

    /// Read `out.len()` response words, each carried as two bytes plus a CRC
    /// byte. Any word failing its checksum voids the whole response.
    pub fn read_words<B: I2c>(&self, bus: &mut B, init: Crc8, out: &mut [u16]) -> Option<()> {
        debug_assert!(out.len() <= 3);
        let mut raw = [0u8; 3 * 3];
        let raw = &mut raw[..out.len() * 3];
        if let Err(e) = bus.read(self.address, raw) {
            self.xfer_err("word read", e);
            return None;
        }
        for (i, chunk) in raw.chunks_exact(3).enumerate() {
            if crc8(&chunk[..2], init) != chunk[2] {
                warn!(
                    "{} [0x{:02x}]: checksum mismatch on response word {}",
                    self.name, self.address, i
                );
                return None;
            }
            out[i] = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Some(())
    }
}
