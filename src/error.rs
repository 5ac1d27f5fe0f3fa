//! Unified error types for the airscrub sensing core.
//!
//! One `Error` enum that every subsystem converts into, so the session
//! bootstrap handles failures uniformly. Everything is `Copy`: errors move
//! through probe results and tick paths without allocation.
//!
//! None of these ever cross into the fusion or policy layers: acquisition
//! failures are absorbed at the driver boundary (stale-value retention) and
//! absence of data travels only as [`Reading::NotKnown`](crate::reading::Reading).

use core::fmt;

use embedded_hal::i2c::ErrorKind;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the sensing core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bus transaction failed (NACK, timeout, short transfer).
    Transfer(TransferError),
    /// A device violated its wire protocol.
    Protocol(ProtocolError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer(e) => write!(f, "transfer: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus transfer errors (the transient-I/O class)
// ---------------------------------------------------------------------------

/// A failed bus transaction. Transient by definition: never escalated and
/// never retried internally — the owning driver keeps its previous value and
/// tries again on its next scheduled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// Device did not acknowledge its address or a data byte.
    Nack,
    /// Transaction did not complete in time.
    Timeout,
    /// Fewer bytes transferred than requested.
    ShortTransfer,
    /// Bus-level fault (arbitration loss, line stuck, controller error).
    Bus,
}

impl TransferError {
    /// Classify an `embedded-hal` I2C error into our taxonomy.
    pub fn from_i2c(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            _ => Self::Bus,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => write!(f, "no acknowledge"),
            Self::Timeout => write!(f, "timeout"),
            Self::ShortTransfer => write!(f, "short transfer"),
            Self::Bus => write!(f, "bus fault"),
        }
    }
}

impl From<TransferError> for Error {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// A device misbehaved beyond transient noise. The probe slot is abandoned
/// for the rest of the session; the device is treated as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Identity/part register returned a value no supported variant uses.
    UnrecognizedDevice,
    /// A bounded status poll ran out of attempts (e.g. a mode change that
    /// never completed its handshake).
    PollBudgetExhausted,
    /// Device reported a failed power-on self-test.
    SelfTestFailed,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedDevice => write!(f, "unrecognized device"),
            Self::PollBudgetExhausted => write!(f, "status poll budget exhausted"),
            Self::SelfTestFailed => write!(f, "self-test failed"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
