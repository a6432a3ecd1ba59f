// Licensed under the Apache-2.0 license

//! # I2C Register Interface Traits
//!
//! Composable traits describing what the driver needs from a controller's
//! register block. Each trait exposes named fields rather than raw words, so
//! engines never repeat bit-shift arithmetic and can be exercised against a
//! mock.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! I2cRegisters (foundation: control, timing, FIFO, interrupts)
//!     ├── ManualCommands (one bus command at a time)
//!     ├── AutoSequencer (autonomous per-message run)
//!     └── RegisterInterface (all of the above, blanket implemented)
//! ```

use bitflags::bitflags;
use embedded_hal::i2c::NoAcknowledgeSource;

use crate::i2c::common::{AddressWidth, Role};
use crate::i2c::message::{Direction, StartKind};
use crate::i2c::timing::TimingProfile;

/// Transmit and receive FIFO depth.
pub const FIFO_DEPTH: u8 = 16;

bitflags! {
    /// Interrupt sources, used for the raw status, clear, and mask registers.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct IrqSet: u16 {
        /// Manual command finished.
        const MANUAL_DONE = 1 << 0;
        /// Autonomous run for the current message finished.
        const AUTO_DONE = 1 << 1;
        /// Transmit FIFO at or below its threshold. Level triggered.
        const TX_ALMOST_EMPTY = 1 << 2;
        /// Receive FIFO above its threshold. Level triggered.
        const RX_ALMOST_FULL = 1 << 3;
        /// Own slave address seen on the bus.
        const ADDRESS_MATCH = 1 << 4;
        const NO_ACK = 1 << 5;
        const ABORT = 1 << 6;
        const OVERRUN = 1 << 7;
        const UNDERRUN = 1 << 8;
        const STOP_DETECTED = 1 << 9;
    }
}

impl IrqSet {
    /// Sources cleared by writing the clear register; FIFO level sources
    /// follow the FIFO state instead.
    pub const LATCHED: Self = Self::MANUAL_DONE
        .union(Self::AUTO_DONE)
        .union(Self::ADDRESS_MATCH)
        .union(Self::NO_ACK)
        .union(Self::ABORT)
        .union(Self::OVERRUN)
        .union(Self::UNDERRUN)
        .union(Self::STOP_DETECTED);
}

/// Decoded status register.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// A transfer is in progress on the bus.
    pub busy: bool,
    /// Bytes waiting in the transmit FIFO.
    pub tx_level: u8,
    /// Bytes waiting in the receive FIFO.
    pub rx_level: u8,
    /// In slave role: the external master addressed us for a read.
    pub slave_transmit: bool,
}

/// One manual-mode bus command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    RepeatedStart,
    Stop,
    Send(u8),
    /// Clock in one byte, answering ACK when `ack` is set.
    Receive { ack: bool },
}

/// Parameters of one autonomous message run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AutoSetup {
    pub address: u16,
    pub width: AddressWidth,
    pub direction: Direction,
    pub length: u16,
    pub start: StartKind,
    /// Generate a stop once `length` bytes have moved.
    pub stop: bool,
    /// Acknowledge the final read byte; the next run continues the read.
    pub ack_last: bool,
    /// A data NACK is reported but does not halt the run.
    pub ignore_nack: bool,
}

/// Foundation register access shared by every mode.
pub trait I2cRegisters {
    fn set_enabled(&mut self, enabled: bool);
    fn soft_reset(&mut self);
    fn set_role(&mut self, role: Role);
    fn program_timing(&mut self, timing: &TimingProfile);
    fn set_own_address(&mut self, address: u16, width: AddressWidth);
    /// Interrupt thresholds for [`IrqSet::TX_ALMOST_EMPTY`] and
    /// [`IrqSet::RX_ALMOST_FULL`], in FIFO entries.
    fn set_fifo_thresholds(&mut self, tx: u8, rx: u8);

    fn status(&self) -> Status;
    /// Why the last [`IrqSet::NO_ACK`] was raised.
    fn nack_source(&self) -> NoAcknowledgeSource;

    fn raw_interrupts(&self) -> IrqSet;
    fn clear_interrupts(&mut self, sources: IrqSet);
    fn set_interrupt_mask(&mut self, sources: IrqSet);
    fn interrupt_mask(&self) -> IrqSet;

    fn write_data(&mut self, byte: u8);
    fn read_data(&mut self) -> u8;

    /// Raw sources that are also unmasked.
    fn pending_interrupts(&self) -> IrqSet {
        self.raw_interrupts() & self.interrupt_mask()
    }

    fn unmask_interrupts(&mut self, sources: IrqSet) {
        let mask = self.interrupt_mask() | sources;
        self.set_interrupt_mask(mask);
    }

    fn mask_interrupts(&mut self, sources: IrqSet) {
        let mask = self.interrupt_mask() - sources;
        self.set_interrupt_mask(mask);
    }
}

/// Software-sequenced bus commands.
///
/// Completion of each command is reported through
/// [`IrqSet::MANUAL_DONE`] in the raw interrupt status.
pub trait ManualCommands: I2cRegisters {
    fn issue(&mut self, command: Command);
}

/// Autonomous message sequencing.
pub trait AutoSequencer: I2cRegisters {
    fn configure_auto(&mut self, setup: &AutoSetup);
    fn set_auto_run(&mut self, run: bool);
}

/// Full register interface needed by a bus instance.
pub trait RegisterInterface: ManualCommands + AutoSequencer {}

impl<T: ManualCommands + AutoSequencer> RegisterInterface for T {}
