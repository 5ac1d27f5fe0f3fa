//! Port traits — the boundary between the sensing core and its collaborators.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SensingService (domain)
//! ```
//!
//! The I2C buses already have their seam (`embedded_hal::i2c::I2c`); these
//! cover the remaining collaborators: the ADC channel feeding the host
//! die-temperature source, and the persisted key-value store holding
//! calibration blobs and configuration. The service consumes them via
//! generics, so the whole core runs against mock adapters in tests.

use core::fmt;

// ───────────────────────────────────────────────────────────────
// ADC port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One raw analog sample channel (12-bit left-compact, 0..=4095).
pub trait AdcPort {
    fn sample(&mut self) -> Result<u16, AdcError>;
}

/// Errors from [`AdcPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcError {
    /// Conversion failed or timed out.
    ReadFailed,
}

impl fmt::Display for AdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "ADC read failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// The core reads each calibration key once at startup and writes it only
/// from the owning sensor's checkpoint; implementations never see
/// concurrent writers for a key.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn load(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn store(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
