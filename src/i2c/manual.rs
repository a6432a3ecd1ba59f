// Licensed under the Apache-2.0 license

//! Software-sequenced master transfers.
//!
//! Every bus action is one command written to the controller followed by a
//! poll of [`IrqSet::MANUAL_DONE`], bounded by a per-command deadline.
//!
//! ```text
//! Idle -> Started -> AddressSent -> ByteInFlight* -> Stopped
//!              \______________ timeout ______________/-> Unknown
//! ```

use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU32;

use crate::i2c::common::AddressWidth;
use crate::i2c::error::{I2cError, NackPhase};
use crate::i2c::message::{Buffer, Direction, Message, MessageFlags, StartKind};
use crate::i2c::timing::{TimingPlan, MASTER_CODE};
use crate::i2c::trace::{Trace, TraceKind};
use crate::i2c::traits::{Command, IrqSet, ManualCommands};
use crate::platform::{Deadline, Monotonic};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Started,
    AddressSent,
    ByteInFlight,
    Stopped,
    /// A command timed out; only a stop is meaningful from here.
    Unknown,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ack {
    Ack,
    Nack,
}

/// Framing the coordinator chose for one message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Framing {
    pub start: StartKind,
    pub stop: bool,
    /// The next message continues this read without a start, so the final
    /// byte is acknowledged too.
    pub ack_last: bool,
}

impl Framing {
    pub const fn new(start: StartKind, stop: bool) -> Self {
        Self {
            start,
            stop,
            ack_last: false,
        }
    }
}

/// Address retry policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u8,
    pub pause: MicrosDurationU32,
    /// Set for speeds above the negotiation ceiling; every retry then
    /// repeats the master-code handshake before readdressing.
    pub negotiate: Option<TimingPlan>,
}

pub struct ManualEngine<'a, R, M: ?Sized, D> {
    regs: &'a mut R,
    clock: &'a M,
    delay: &'a mut D,
    trace: &'a mut Trace,
    command_timeout: MicrosDurationU32,
    state: TransferState,
}

impl<'a, R, M, D> ManualEngine<'a, R, M, D>
where
    R: ManualCommands,
    M: Monotonic + ?Sized,
    D: DelayNs,
{
    pub fn new(
        regs: &'a mut R,
        clock: &'a M,
        delay: &'a mut D,
        trace: &'a mut Trace,
        command_timeout: MicrosDurationU32,
    ) -> Self {
        Self {
            regs,
            clock,
            delay,
            trace,
            command_timeout,
            state: TransferState::Idle,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Picks up a bus an earlier transaction left owned without a stop.
    pub fn assume_owned(&mut self) {
        self.state = TransferState::ByteInFlight;
    }

    pub fn start(&mut self) -> Result<(), I2cError> {
        self.execute(Command::Start)?;
        self.trace.record(TraceKind::Start, 0);
        self.state = TransferState::Started;
        Ok(())
    }

    pub fn repeated_start(&mut self) -> Result<(), I2cError> {
        self.execute(Command::RepeatedStart)?;
        self.trace.record(TraceKind::Restart, 0);
        self.state = TransferState::Started;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), I2cError> {
        self.execute(Command::Stop)?;
        self.trace.record(TraceKind::Stop, 0);
        self.state = TransferState::Stopped;
        Ok(())
    }

    pub fn send_byte(&mut self, byte: u8) -> Result<Ack, I2cError> {
        let ack = self.transmit(byte)?;
        self.trace.record(TraceKind::SendByte, u32::from(byte));
        self.state = TransferState::ByteInFlight;
        Ok(ack)
    }

    pub fn read_byte(&mut self, ack_next: bool) -> Result<u8, I2cError> {
        self.execute(Command::Receive { ack: ack_next })?;
        let byte = self.regs.read_data();
        self.trace.record(TraceKind::ReceiveByte, u32::from(byte));
        self.state = TransferState::ByteInFlight;
        Ok(byte)
    }

    /// Addresses `address` after a start or repeated start.
    ///
    /// Ten-bit reads select the target with a write header, then issue a
    /// repeated start and resend the header with the read bit.
    pub fn send_address(
        &mut self,
        address: u16,
        direction: Direction,
        width: AddressWidth,
    ) -> Result<Ack, I2cError> {
        self.trace.record(TraceKind::SendAddress, u32::from(address));
        let ack = match width {
            AddressWidth::SevenBit => self.transmit(seven_bit_header(address, direction))?,
            AddressWidth::TenBit => {
                let [header, low] = ten_bit_header(address);
                if self.transmit(header)? == Ack::Nack || self.transmit(low)? == Ack::Nack {
                    Ack::Nack
                } else if direction == Direction::Read {
                    self.repeated_start()?;
                    self.transmit(header | Direction::Read.rw_bit())?
                } else {
                    Ack::Ack
                }
            }
        };
        self.state = TransferState::AddressSent;
        Ok(ack)
    }

    /// Sends the address, retrying NACKs with stop, pause, start.
    ///
    /// Under a negotiated plan the retry start is the master-code handshake
    /// followed by a repeated start. On exhaustion the bus is stopped and the
    /// error reports how many retries were spent.
    pub fn address_with_retry(
        &mut self,
        address: u16,
        direction: Direction,
        width: AddressWidth,
        policy: RetryPolicy,
    ) -> Result<(), I2cError> {
        let mut retries = 0;
        while self.send_address(address, direction, width)? == Ack::Nack {
            self.stop()?;
            if retries == policy.retries {
                self.trace.record(TraceKind::Error, u32::from(retries));
                return Err(I2cError::Nack {
                    phase: NackPhase::Address,
                    retries,
                });
            }
            retries += 1;
            self.delay.delay_us(policy.pause.ticks());
            match &policy.negotiate {
                Some(plan) => {
                    self.negotiate(plan)?;
                    self.repeated_start()?;
                }
                None => self.start()?,
            }
        }
        Ok(())
    }

    /// Speed negotiation: master code at the ceiling rate, then switch to
    /// the target profile. The next message must open with a repeated start.
    pub fn negotiate(&mut self, plan: &TimingPlan) -> Result<(), I2cError> {
        if let TimingPlan::Negotiated { ceiling, target } = plan {
            self.regs.program_timing(ceiling);
            self.start()?;
            // The NACK that follows the master code is expected.
            self.transmit(MASTER_CODE)?;
            self.regs.program_timing(target);
        }
        Ok(())
    }

    /// Runs one message and returns the number of bytes moved.
    pub fn run_message(
        &mut self,
        message: &mut Message<'_>,
        framing: Framing,
        policy: RetryPolicy,
    ) -> Result<usize, I2cError> {
        let address = message.address();
        let width = message.width();
        let direction = message.direction();
        let ignore_nack = message.flags().contains(MessageFlags::IGNORE_NACK);

        match framing.start {
            StartKind::Start => self.start()?,
            StartKind::RepeatedStart => self.repeated_start()?,
            StartKind::None => {}
        }
        if framing.start != StartKind::None {
            self.address_with_retry(address, direction, width, policy)?;
        }

        let mut count = 0;
        match message.buffer_mut() {
            Buffer::Write(bytes) => {
                for &byte in bytes.iter() {
                    if self.send_byte(byte)? == Ack::Nack && !ignore_nack {
                        self.stop()?;
                        self.trace.record(TraceKind::Error, count as u32);
                        return Err(I2cError::ShortWrite(count));
                    }
                    count += 1;
                }
            }
            Buffer::Read(buffer) => {
                let len = buffer.len();
                for (index, slot) in buffer.iter_mut().enumerate() {
                    *slot = self.read_byte(framing.ack_last || index + 1 < len)?;
                    count += 1;
                }
            }
        }

        if framing.stop {
            self.stop()?;
        }
        Ok(count)
    }

    fn transmit(&mut self, byte: u8) -> Result<Ack, I2cError> {
        self.execute(Command::Send(byte))?;
        if self.regs.raw_interrupts().contains(IrqSet::NO_ACK) {
            self.regs.clear_interrupts(IrqSet::NO_ACK);
            Ok(Ack::Nack)
        } else {
            Ok(Ack::Ack)
        }
    }

    fn execute(&mut self, command: Command) -> Result<(), I2cError> {
        self.regs
            .clear_interrupts(IrqSet::MANUAL_DONE | IrqSet::NO_ACK);
        self.regs.issue(command);
        let deadline = Deadline::after(self.clock, self.command_timeout);
        loop {
            match self.poll_done() {
                Ok(()) => return Ok(()),
                Err(nb::Error::Other(err)) => return Err(err),
                Err(nb::Error::WouldBlock) => {}
            }
            if deadline.expired(self.clock) {
                self.state = TransferState::Unknown;
                self.trace.record(TraceKind::Error, self.regs.raw_interrupts().bits().into());
                return Err(I2cError::Timeout);
            }
            self.clock.relax();
        }
    }

    fn poll_done(&mut self) -> nb::Result<(), I2cError> {
        let raw = self.regs.raw_interrupts();
        if raw.contains(IrqSet::ABORT) {
            self.regs.clear_interrupts(IrqSet::ABORT);
            return Err(nb::Error::Other(I2cError::Abort));
        }
        if raw.contains(IrqSet::MANUAL_DONE) {
            self.regs.clear_interrupts(IrqSet::MANUAL_DONE);
            return Ok(());
        }
        Err(nb::Error::WouldBlock)
    }
}

/// Single address byte with the R/W bit in bit 0.
pub fn seven_bit_header(address: u16, direction: Direction) -> u8 {
    (((address & 0x7F) as u8) << 1) | direction.rw_bit()
}

/// `11110 A9 A8 0` followed by the low eight address bits.
pub fn ten_bit_header(address: u16) -> [u8; 2] {
    let high = ((address >> 8) & 0x3) as u8;
    [0xF0 | (high << 1), (address & 0xFF) as u8]
}
