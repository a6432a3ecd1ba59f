// Licensed under the Apache-2.0 license

use core::fmt;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

use crate::i2c::common::ConfigurationError;

/// Bus phase in which a NACK ended the transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NackPhase {
    Address,
    /// Data byte rejected after `offset` bytes of the transaction were
    /// handed to the controller.
    Data { offset: usize },
}

/// Error type for every bus operation.
///
/// An error always means the transaction did not complete and the bus was
/// left idle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum I2cError {
    /// No divider keeps both SCL half-periods in hardware range.
    UnsupportedFrequency,
    /// A polling loop or completion wait ran past its deadline.
    Timeout,
    /// Rejected by the target; `retries` counts the address retries spent.
    Nack { phase: NackPhase, retries: u8 },
    /// Data NACK mid-write; carries the number of bytes acknowledged.
    ShortWrite(usize),
    /// Fewer bytes received than requested.
    ShortRead(usize),
    /// Controller aborted the autonomous run.
    Abort,
    /// Bus lock not acquired within the caller's budget.
    BusBusy,
    /// Empty transaction, zero-length message, over-long message, or
    /// inconsistent start/direction flags.
    InvalidTransaction,
    /// SDA still held low after the recovery pulse budget.
    BusRecoveryFailed,
    /// Handle refers to a closed or reopened bus.
    InvalidHandle,
    /// Operation not available in the bus's current role.
    WrongRole,
    Config(ConfigurationError),
}

impl From<ConfigurationError> for I2cError {
    fn from(err: ConfigurationError) -> Self {
        Self::Config(err)
    }
}

impl embedded_hal::i2c::Error for I2cError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Nack {
                phase: NackPhase::Address,
                ..
            } => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Self::Nack {
                phase: NackPhase::Data { .. },
                ..
            }
            | Self::ShortWrite(_) => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            Self::Abort => ErrorKind::ArbitrationLoss,
            Self::BusRecoveryFailed => ErrorKind::Bus,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for I2cError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFrequency => write!(f, "unsupported bus frequency"),
            Self::Timeout => write!(f, "bus operation timed out"),
            Self::Nack {
                phase: NackPhase::Address,
                retries,
            } => write!(f, "address not acknowledged after {retries} retries"),
            Self::Nack {
                phase: NackPhase::Data { offset },
                ..
            } => write!(f, "data not acknowledged at byte {offset}"),
            Self::ShortWrite(n) => write!(f, "write stopped after {n} bytes"),
            Self::ShortRead(n) => write!(f, "read stopped after {n} bytes"),
            Self::Abort => write!(f, "transfer aborted by controller"),
            Self::BusBusy => write!(f, "bus busy"),
            Self::InvalidTransaction => write!(f, "invalid transaction"),
            Self::BusRecoveryFailed => write!(f, "bus recovery failed"),
            Self::InvalidHandle => write!(f, "stale bus handle"),
            Self::WrongRole => write!(f, "operation not valid for bus role"),
            Self::Config(err) => write!(f, "invalid configuration: {err:?}"),
        }
    }
}
