// Licensed under the Apache-2.0 license

//! Interrupt-driven master transfers.
//!
//! The controller sequences one message at a time on its own. The job keeps
//! a cursor over the transaction and is advanced only by [`AutoJob::service`],
//! which runs in the bus's interrupt handler.

use core::ptr::NonNull;

use embedded_hal::i2c::NoAcknowledgeSource;
use heapless::Vec;

use crate::i2c::error::{I2cError, NackPhase};
use crate::i2c::manual::Framing;
use crate::i2c::message::{Buffer, Direction, Message, MessageFlags, StartKind};
use crate::i2c::trace::{Trace, TraceKind};
use crate::i2c::traits::{AutoSequencer, AutoSetup, IrqSet};

/// Messages the sequencer can chain in one job.
pub const MAX_AUTO_MESSAGES: usize = 8;

/// Sources every job listens to; one FIFO source is added per message.
const JOB_SOURCES: IrqSet = IrqSet::AUTO_DONE.union(IrqSet::NO_ACK).union(IrqSet::ABORT);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Complete,
    Nack {
        source: NoAcknowledgeSource,
        offset: usize,
    },
    Abort,
    /// The controller finished a message early.
    Short {
        direction: Direction,
        transferred: usize,
    },
}

impl JobOutcome {
    pub fn into_result(self, transferred: usize, retries: u8) -> Result<usize, I2cError> {
        match self {
            Self::Complete => Ok(transferred),
            Self::Nack {
                source: NoAcknowledgeSource::Address,
                ..
            } => Err(I2cError::Nack {
                phase: NackPhase::Address,
                retries,
            }),
            Self::Nack { offset, .. } => Err(I2cError::Nack {
                phase: NackPhase::Data { offset },
                retries,
            }),
            Self::Abort => Err(I2cError::Abort),
            Self::Short {
                direction: Direction::Write,
                transferred,
            } => Err(I2cError::ShortWrite(transferred)),
            Self::Short {
                direction: Direction::Read,
                transferred,
            } => Err(I2cError::ShortRead(transferred)),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Segment {
    data: NonNull<u8>,
    len: usize,
    setup: AutoSetup,
}

// SAFETY: a segment only points into a caller buffer that outlives the job;
// see `AutoJob::new`.
unsafe impl Send for Segment {}

#[derive(Debug)]
pub struct AutoJob {
    segments: Vec<Segment, MAX_AUTO_MESSAGES>,
    index: usize,
    /// Bytes moved for the current message.
    moved: usize,
    /// Bytes of finished messages.
    transferred: usize,
    outcome: Option<JobOutcome>,
}

impl AutoJob {
    /// Builds a job over `messages`, one framing per message.
    ///
    /// # Safety
    ///
    /// The job keeps raw pointers into every message buffer. The caller must
    /// keep the buffers alive and untouched until the job has been taken
    /// back from interrupt context and dropped.
    pub unsafe fn new(messages: &mut [Message<'_>], framings: &[Framing]) -> Result<Self, I2cError> {
        if messages.len() != framings.len() {
            return Err(I2cError::InvalidTransaction);
        }
        let mut segments = Vec::new();
        for (message, framing) in messages.iter_mut().zip(framings) {
            let setup = AutoSetup {
                address: message.address(),
                width: message.width(),
                direction: message.direction(),
                length: u16::try_from(message.len())
                    .map_err(|_| I2cError::InvalidTransaction)?,
                start: framing.start,
                stop: framing.stop,
                ack_last: framing.ack_last,
                ignore_nack: message.flags().contains(MessageFlags::IGNORE_NACK),
            };
            let (data, len) = match message.buffer_mut() {
                Buffer::Write(bytes) => (NonNull::from(*bytes).cast::<u8>(), bytes.len()),
                Buffer::Read(buffer) => (NonNull::from(&mut **buffer).cast::<u8>(), buffer.len()),
            };
            segments
                .push(Segment { data, len, setup })
                .map_err(|_| I2cError::InvalidTransaction)?;
        }
        Ok(Self {
            segments,
            index: 0,
            moved: 0,
            transferred: 0,
            outcome: None,
        })
    }

    pub fn total_len(&self) -> usize {
        self.segments.iter().map(|segment| segment.len).sum()
    }

    /// Bytes moved so far, finished messages and the current one.
    pub fn transferred(&self) -> usize {
        self.transferred + self.moved
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        self.outcome
    }

    /// Whether the first message never got past its address phase.
    pub fn failed_at_first_address(&self) -> bool {
        self.index == 0
            && matches!(
                self.outcome,
                Some(JobOutcome::Nack {
                    source: NoAcknowledgeSource::Address,
                    ..
                })
            )
    }

    /// Programs the first message and starts the run.
    pub fn start<R: AutoSequencer>(&mut self, regs: &mut R) {
        self.launch(regs);
    }

    /// Resets the cursor for another attempt. The first message opens with
    /// `start` this time.
    pub fn rewind(&mut self, start: StartKind) {
        if let Some(first) = self.segments.first_mut() {
            first.setup.start = start;
        }
        self.index = 0;
        self.moved = 0;
        self.transferred = 0;
        self.outcome = None;
    }

    /// Stops the run and masks every source. Used on timeout and teardown.
    pub fn cancel<R: AutoSequencer>(&mut self, regs: &mut R) {
        regs.set_auto_run(false);
        regs.set_interrupt_mask(IrqSet::empty());
        regs.clear_interrupts(IrqSet::LATCHED);
    }

    /// Interrupt handler body. Returns `true` when the waiting caller should
    /// be signalled.
    pub fn service<R: AutoSequencer>(&mut self, regs: &mut R, trace: &mut Trace) -> bool {
        if self.outcome.is_some() {
            regs.set_interrupt_mask(IrqSet::empty());
            return false;
        }
        let mut pending = regs.pending_interrupts();

        if pending.contains(IrqSet::NO_ACK) {
            let source = regs.nack_source();
            let tolerated = source == NoAcknowledgeSource::Data
                && self.current().is_some_and(|segment| segment.setup.ignore_nack);
            if !tolerated {
                let outcome = JobOutcome::Nack {
                    source,
                    offset: self.transferred(),
                };
                return self.fail(regs, trace, IrqSet::NO_ACK, outcome);
            }
            regs.clear_interrupts(IrqSet::NO_ACK);
            trace.record(TraceKind::Error, self.transferred() as u32);
            pending.remove(IrqSet::NO_ACK);
        }
        if pending.contains(IrqSet::ABORT) {
            return self.fail(regs, trace, IrqSet::ABORT, JobOutcome::Abort);
        }
        if pending.contains(IrqSet::TX_ALMOST_EMPTY) {
            self.feed(regs, trace);
        }
        if pending.contains(IrqSet::RX_ALMOST_FULL) {
            self.drain(regs, trace);
        }
        if pending.contains(IrqSet::AUTO_DONE) {
            regs.clear_interrupts(IrqSet::AUTO_DONE);
            return self.finish_message(regs, trace);
        }
        false
    }

    fn current(&self) -> Option<Segment> {
        self.segments.get(self.index).copied()
    }

    fn launch<R: AutoSequencer>(&mut self, regs: &mut R) {
        let Some(segment) = self.current() else {
            return;
        };
        let fifo = match segment.setup.direction {
            Direction::Write => IrqSet::TX_ALMOST_EMPTY,
            Direction::Read => IrqSet::RX_ALMOST_FULL,
        };
        regs.configure_auto(&segment.setup);
        regs.set_interrupt_mask(JOB_SOURCES | fifo);
        regs.set_auto_run(true);
    }

    /// Pushes one byte of the current write.
    fn feed<R: AutoSequencer>(&mut self, regs: &mut R, trace: &mut Trace) {
        match self.current() {
            Some(segment)
                if segment.setup.direction == Direction::Write && self.moved < segment.len =>
            {
                // SAFETY: `moved < len`, and the buffer outlives the job.
                let byte = unsafe { segment.data.as_ptr().add(self.moved).read() };
                regs.write_data(byte);
                trace.record(TraceKind::SendByte, u32::from(byte));
                self.moved += 1;
                if self.moved == segment.len {
                    regs.mask_interrupts(IrqSet::TX_ALMOST_EMPTY);
                }
            }
            _ => regs.mask_interrupts(IrqSet::TX_ALMOST_EMPTY),
        }
    }

    /// Pops one byte into the current read.
    fn drain<R: AutoSequencer>(&mut self, regs: &mut R, trace: &mut Trace) {
        let byte = regs.read_data();
        match self.current() {
            Some(segment)
                if segment.setup.direction == Direction::Read && self.moved < segment.len =>
            {
                // SAFETY: `moved < len`; read segments come from `&mut` buffers.
                unsafe { segment.data.as_ptr().add(self.moved).write(byte) };
                trace.record(TraceKind::ReceiveByte, u32::from(byte));
                self.moved += 1;
            }
            _ => trace.record(TraceKind::Error, u32::from(byte)),
        }
    }

    fn finish_message<R: AutoSequencer>(&mut self, regs: &mut R, trace: &mut Trace) -> bool {
        let Some(segment) = self.current() else {
            return false;
        };
        if segment.setup.direction == Direction::Read {
            while self.moved < segment.len && regs.status().rx_level > 0 {
                self.drain(regs, trace);
            }
        }
        trace.record(TraceKind::AutoDone, self.moved as u32);

        if self.moved < segment.len {
            let outcome = JobOutcome::Short {
                direction: segment.setup.direction,
                transferred: self.transferred(),
            };
            return self.fail(regs, trace, IrqSet::empty(), outcome);
        }

        self.transferred += self.moved;
        self.moved = 0;
        self.index += 1;
        if self.index < self.segments.len() {
            self.launch(regs);
            return false;
        }
        regs.set_auto_run(false);
        regs.set_interrupt_mask(IrqSet::empty());
        self.outcome = Some(JobOutcome::Complete);
        true
    }

    fn fail<R: AutoSequencer>(
        &mut self,
        regs: &mut R,
        trace: &mut Trace,
        source: IrqSet,
        outcome: JobOutcome,
    ) -> bool {
        regs.set_auto_run(false);
        regs.set_interrupt_mask(IrqSet::empty());
        regs.clear_interrupts(source);
        trace.record(TraceKind::Error, u32::from(regs.raw_interrupts().bits()));
        self.outcome = Some(outcome);
        true
    }
}
