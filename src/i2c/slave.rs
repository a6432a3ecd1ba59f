// Licensed under the Apache-2.0 license

//! Slave-mode register responder.
//!
//! Exposes a 256-byte register file to an external master. The first byte
//! of a write selects the register index; following bytes are stored with
//! auto-increment. Reads stream from the current index.
//!
//! Runs entirely in interrupt context. Thread-side access to the register
//! file goes through the bus, which masks the vector around the access.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::i2c::trace::{Trace, TraceKind};
use crate::i2c::traits::{I2cRegisters, IrqSet, FIFO_DEPTH};

pub const REGISTER_COUNT: usize = 256;

/// Sources the responder always listens to. TX almost-empty is added only
/// while the master is reading.
pub const SLAVE_SOURCES: IrqSet = IrqSet::ADDRESS_MATCH
    .union(IrqSet::RX_ALMOST_FULL)
    .union(IrqSet::STOP_DETECTED)
    .union(IrqSet::OVERRUN)
    .union(IrqSet::UNDERRUN);

/// Register image served to the external master.
#[derive(Clone, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(transparent)]
pub struct SlaveRegisterFile([u8; REGISTER_COUNT]);

impl SlaveRegisterFile {
    pub const fn new() -> Self {
        Self([0; REGISTER_COUNT])
    }

    /// Loads an image; shorter images leave the tail zeroed.
    pub fn from_image(image: &[u8]) -> Self {
        let mut file = Self::new();
        for (slot, byte) in file.0.iter_mut().zip(image) {
            *slot = *byte;
        }
        file
    }

    /// Reinterprets exactly [`REGISTER_COUNT`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Self::read_from_bytes(bytes).ok()
    }

    pub fn get(&self, index: u8) -> u8 {
        self.0.get(usize::from(index)).copied().unwrap_or_default()
    }

    pub fn set(&mut self, index: u8, value: u8) {
        if let Some(slot) = self.0.get_mut(usize::from(index)) {
            *slot = value;
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Default for SlaveRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlaveState {
    Idle,
    AwaitingRegisterIndex,
    ReceivingData(u8),
    TransmittingData(u8),
}

/// Non-fatal conditions seen by the responder.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SlaveStats {
    pub overruns: u32,
    pub underruns: u32,
    /// Bytes that arrived with no transfer in progress.
    pub stray_bytes: u32,
}

#[derive(Debug)]
pub struct SlaveResponder {
    file: SlaveRegisterFile,
    state: SlaveState,
    /// Index the next read starts from.
    cursor: u8,
    stats: SlaveStats,
}

impl SlaveResponder {
    pub fn new(file: SlaveRegisterFile) -> Self {
        Self {
            file,
            state: SlaveState::Idle,
            cursor: 0,
            stats: SlaveStats::default(),
        }
    }

    pub fn state(&self) -> SlaveState {
        self.state
    }

    pub fn stats(&self) -> SlaveStats {
        self.stats
    }

    pub fn file(&self) -> &SlaveRegisterFile {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut SlaveRegisterFile {
        &mut self.file
    }

    /// Enables the responder's interrupt sources.
    pub fn arm<R: I2cRegisters>(&mut self, regs: &mut R) {
        self.state = SlaveState::Idle;
        regs.set_fifo_thresholds(FIFO_DEPTH / 2, 0);
        regs.clear_interrupts(IrqSet::LATCHED);
        regs.set_interrupt_mask(SLAVE_SOURCES);
    }

    /// Interrupt handler body.
    pub fn service<R: I2cRegisters>(&mut self, regs: &mut R, trace: &mut Trace) {
        let pending = regs.pending_interrupts();

        if pending.contains(IrqSet::ADDRESS_MATCH) {
            regs.clear_interrupts(IrqSet::ADDRESS_MATCH);
            if regs.status().slave_transmit {
                self.state = SlaveState::TransmittingData(self.cursor);
                regs.unmask_interrupts(IrqSet::TX_ALMOST_EMPTY);
                self.transmit(regs, trace);
            } else {
                self.state = SlaveState::AwaitingRegisterIndex;
            }
        }
        if pending.contains(IrqSet::RX_ALMOST_FULL) {
            while regs.status().rx_level > 0 {
                let byte = regs.read_data();
                self.receive(byte, trace);
            }
        }
        // The master has finished reading once a stop is pending.
        if pending.contains(IrqSet::TX_ALMOST_EMPTY) && !pending.contains(IrqSet::STOP_DETECTED) {
            self.transmit(regs, trace);
        }
        if pending.contains(IrqSet::OVERRUN) {
            regs.clear_interrupts(IrqSet::OVERRUN);
            self.stats.overruns = self.stats.overruns.wrapping_add(1);
        }
        if pending.contains(IrqSet::UNDERRUN) {
            regs.clear_interrupts(IrqSet::UNDERRUN);
            self.stats.underruns = self.stats.underruns.wrapping_add(1);
        }
        if pending.contains(IrqSet::STOP_DETECTED) {
            regs.clear_interrupts(IrqSet::STOP_DETECTED);
            regs.mask_interrupts(IrqSet::TX_ALMOST_EMPTY);
            self.state = SlaveState::Idle;
        }
    }

    fn receive(&mut self, byte: u8, trace: &mut Trace) {
        trace.record(TraceKind::ReceiveByte, u32::from(byte));
        match self.state {
            SlaveState::AwaitingRegisterIndex => {
                self.cursor = byte;
                self.state = SlaveState::ReceivingData(byte);
            }
            SlaveState::ReceivingData(index) => {
                self.file.set(index, byte);
                let next = index.wrapping_add(1);
                self.cursor = next;
                self.state = SlaveState::ReceivingData(next);
            }
            SlaveState::Idle | SlaveState::TransmittingData(_) => {
                self.stats.stray_bytes = self.stats.stray_bytes.wrapping_add(1);
            }
        }
    }

    fn transmit<R: I2cRegisters>(&mut self, regs: &mut R, trace: &mut Trace) {
        let SlaveState::TransmittingData(index) = self.state else {
            regs.mask_interrupts(IrqSet::TX_ALMOST_EMPTY);
            return;
        };
        let byte = self.file.get(index);
        regs.write_data(byte);
        trace.record(TraceKind::SendByte, u32::from(byte));
        let next = index.wrapping_add(1);
        self.cursor = next;
        self.state = SlaveState::TransmittingData(next);
    }
}
