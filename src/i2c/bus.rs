// Licensed under the Apache-2.0 license

//! One controller instance and its transaction coordinator.
//!
//! Thread-side state (configuration, session, retry delay) sits behind the
//! FIFO-fair bus lock. The register block, the engine currently driven from
//! interrupt context and the trace live in an [`IrqShared`] slot; the thread
//! side borrows them only while the bus vector is masked.
//!
//! Framing rules applied per message:
//!
//! | Position                               | Start issued      |
//! |----------------------------------------|-------------------|
//! | first, bus idle                        | start             |
//! | first, read continuing a held bus      | repeated start    |
//! | first, `NO_START` continuing held bus  | none              |
//! | after a message flagged `STOP`         | start             |
//! | later, flagged `NO_START`              | none              |
//! | later                                  | repeated start    |
//!
//! The last message ends with a stop unless the transaction is a lone
//! one-byte register select, which leaves the bus held for the read that
//! follows.

use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;
use fugit::{HertzU32, MicrosDurationU32};
use heapless::Vec;

use crate::i2c::auto::{AutoJob, JobOutcome, MAX_AUTO_MESSAGES};
use crate::i2c::common::{AddressWidth, BusConfig, Role, TransferMode};
use crate::i2c::error::I2cError;
use crate::i2c::manual::{Framing, ManualEngine, RetryPolicy, TransferState};
use crate::i2c::message::{Direction, Message, MessageFlags, StartKind, Transaction};
#[cfg(feature = "i2c_target")]
use crate::i2c::slave::{SlaveRegisterFile, SlaveResponder, SlaveStats};
use crate::i2c::system_setup::{BusPins, I2cSystemSetup};
use crate::i2c::timing::TimingPlan;
use crate::i2c::trace::{Trace, TraceEvent, TraceKind, TRACE_DEPTH};
use crate::i2c::traits::{I2cRegisters, IrqSet, ManualCommands};
use crate::platform::{Board, BusResources, ClockControl, Deadline, InterruptController, Monotonic, Vector};
use crate::sync::{BusLock, Completion, IrqShared};

const NO_VECTOR: u32 = u32::MAX;

/// Target a register-select left the bus owned by.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct HeldBus {
    address: u16,
    width: AddressWidth,
}

impl HeldBus {
    fn of(message: &Message<'_>) -> Self {
        Self {
            address: message.address(),
            width: message.width(),
        }
    }

    /// A read restarts on the held bus; a `NO_START` write appends to it.
    fn continued_by(&self, message: &Message<'_>) -> bool {
        let no_start = message.flags().contains(MessageFlags::NO_START);
        message.address() == self.address
            && message.width() == self.width
            && matches!(
                (message.direction(), no_start),
                (Direction::Read, false) | (Direction::Write, true)
            )
    }
}

/// How a transaction meets the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Entry {
    Idle,
    /// Carry on from a held bus.
    Resume,
    /// Issue the deferred stop, then start fresh.
    Release,
}

impl Entry {
    fn for_transaction(held: Option<HeldBus>, tx: &Transaction<'_, '_>) -> Result<Self, I2cError> {
        let first = tx.messages().first().ok_or(I2cError::InvalidTransaction)?;
        let resume = held.is_some_and(|held| held.continued_by(first));
        if !resume && first.flags().contains(MessageFlags::NO_START) {
            return Err(I2cError::InvalidTransaction);
        }
        Ok(match (held, resume) {
            (_, true) => Self::Resume,
            (Some(_), false) => Self::Release,
            (None, false) => Self::Idle,
        })
    }
}

fn framing(messages: &[Message<'_>], index: usize, entry: Entry, register_select: bool) -> Framing {
    let current = messages.get(index);
    let no_start = current.is_some_and(|m| m.flags().contains(MessageFlags::NO_START));
    let start = match index.checked_sub(1).and_then(|previous| messages.get(previous)) {
        None if entry == Entry::Resume && no_start => StartKind::None,
        None if entry == Entry::Resume => StartKind::RepeatedStart,
        None => StartKind::Start,
        Some(previous) if previous.flags().contains(MessageFlags::STOP) => StartKind::Start,
        Some(_) if no_start => StartKind::None,
        Some(_) => StartKind::RepeatedStart,
    };
    let last = index + 1 == messages.len();
    let stop = (last && !register_select)
        || current.is_some_and(|m| m.flags().contains(MessageFlags::STOP));
    let ack_last = !stop
        && current.is_some_and(|m| m.direction() == Direction::Read)
        && messages.get(index + 1).is_some_and(|next| {
            next.direction() == Direction::Read && next.flags().contains(MessageFlags::NO_START)
        });
    Framing {
        start,
        stop,
        ack_last,
    }
}

/// End (exclusive) of the auto-mode run beginning at `start`: runs break
/// after a `STOP` message and at the sequencer's chaining limit.
fn run_end(messages: &[Message<'_>], start: usize) -> usize {
    let mut end = start + 1;
    while end < messages.len() && end - start < MAX_AUTO_MESSAGES {
        if messages
            .get(end - 1)
            .is_some_and(|m| m.flags().contains(MessageFlags::STOP))
        {
            break;
        }
        end += 1;
    }
    end
}

fn run_manual<R, M, D>(
    engine: &mut ManualEngine<'_, R, M, D>,
    tx: &mut Transaction<'_, '_>,
    entry: Entry,
    plan: &TimingPlan,
    policy: RetryPolicy,
) -> Result<usize, I2cError>
where
    R: ManualCommands,
    M: Monotonic + ?Sized,
    D: DelayNs,
{
    match entry {
        Entry::Release => engine.stop()?,
        Entry::Resume => engine.assume_owned(),
        Entry::Idle => {}
    }
    let register_select = tx.is_register_select();
    let mut count = 0;
    for index in 0..tx.len() {
        let mut framing = framing(tx.messages(), index, entry, register_select);
        if framing.start == StartKind::Start && plan.is_negotiated() {
            engine.negotiate(plan)?;
            framing.start = StartKind::RepeatedStart;
        }
        let message = tx
            .messages_mut()
            .get_mut(index)
            .ok_or(I2cError::InvalidTransaction)?;
        count += engine.run_message(message, framing, policy)?;
    }
    Ok(count)
}

/// Programs everything a configuration determines and leaves the
/// controller enabled with all sources masked.
fn configure_controller<R: I2cRegisters>(regs: &mut R, config: &BusConfig, plan: &TimingPlan) {
    regs.set_enabled(false);
    regs.set_role(config.role);
    match config.role {
        Role::Master => regs.program_timing(plan.idle()),
        Role::Slave => {
            regs.program_timing(plan.target());
            regs.set_own_address(config.address, config.address_width);
        }
    }
    regs.set_fifo_thresholds(0, 0);
    regs.clear_interrupts(IrqSet::LATCHED);
    regs.set_interrupt_mask(IrqSet::empty());
    regs.set_enabled(true);
}

#[derive(Debug, Default)]
pub(crate) struct MasterSession {
    held: Option<HeldBus>,
}

#[cfg(feature = "i2c_target")]
#[derive(Debug, Default)]
pub(crate) struct SlaveSession;

/// Role-specific thread-side state. Exactly one engine family is reachable
/// per open bus.
#[derive(Debug)]
pub(crate) enum Session {
    Master(MasterSession),
    #[cfg(feature = "i2c_target")]
    Slave(SlaveSession),
}

impl Session {
    fn for_role(role: Role) -> Result<Self, I2cError> {
        match role {
            Role::Master => Ok(Self::Master(MasterSession::default())),
            #[cfg(feature = "i2c_target")]
            Role::Slave => Ok(Self::Slave(SlaveSession)),
            #[cfg(not(feature = "i2c_target"))]
            Role::Slave => Err(I2cError::WrongRole),
        }
    }
}

struct OpenBus<B: Board> {
    refs: u32,
    config: BusConfig,
    plan: TimingPlan,
    session: Session,
    delay: B::Delay,
    pins: BusPins,
}

impl<B: Board> OpenBus<B> {
    fn master(&mut self) -> Result<&mut MasterSession, I2cError> {
        match &mut self.session {
            Session::Master(master) => Ok(master),
            #[cfg(feature = "i2c_target")]
            Session::Slave(_) => Err(I2cError::WrongRole),
        }
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.config.retry_count,
            pause: self.config.retry_pause(),
            negotiate: Some(self.plan).filter(TimingPlan::is_negotiated),
        }
    }
}

struct Control<B: Board> {
    /// Bumped on every teardown so stale handles are rejected.
    generation: u16,
    open: Option<OpenBus<B>>,
}

impl<B: Board> Control<B> {
    fn get(&mut self, generation: u16) -> Result<&mut OpenBus<B>, I2cError> {
        if self.generation != generation {
            return Err(I2cError::InvalidHandle);
        }
        self.open.as_mut().ok_or(I2cError::InvalidHandle)
    }
}

enum Engine {
    Idle,
    Auto(AutoJob),
    #[cfg(feature = "i2c_target")]
    Slave(SlaveResponder),
}

struct Shared<R> {
    generation: u16,
    regs: R,
    engine: Engine,
    trace: Trace,
}

impl<R: I2cRegisters> Shared<R> {
    /// Re-enables the responder after the controller was reprogrammed.
    #[cfg(feature = "i2c_target")]
    fn rearm(&mut self) {
        if let Engine::Slave(responder) = &mut self.engine {
            responder.arm(&mut self.regs);
        }
    }

    #[cfg(not(feature = "i2c_target"))]
    fn rearm(&mut self) {}
}

pub(crate) struct Bus<B: Board> {
    control: BusLock<Control<B>>,
    shared: IrqShared<Shared<B::Registers>>,
    done: Completion,
    vector: AtomicU32,
}

impl<B: Board> Bus<B> {
    pub(crate) fn new() -> Self {
        Self {
            control: BusLock::new(Control {
                generation: 0,
                open: None,
            }),
            shared: IrqShared::new(),
            done: Completion::new(),
            vector: AtomicU32::new(NO_VECTOR),
        }
    }

    pub(crate) fn vector(&self) -> Option<Vector> {
        Vector::try_from(self.vector.load(Ordering::Acquire)).ok()
    }

    /// Brings the instance up, or adds a reference when already open.
    /// Returns the handle generation and the reference count.
    pub(crate) fn open(
        &self,
        board: &B,
        config: BusConfig,
        resources: BusResources<B::Registers, B::Delay>,
    ) -> Result<(u16, u32), I2cError> {
        let mut control = self.control.lock();
        let generation = control.generation;
        if let Some(open) = control.open.as_mut() {
            open.refs += 1;
            return Ok((generation, open.refs));
        }

        let session = Session::for_role(config.role)?;
        let pins = BusPins {
            scl: resources.scl,
            sda: resources.sda,
            clock: resources.clock,
            vector: resources.vector,
        };
        I2cSystemSetup::bring_up(board, &pins);
        let plan = match TimingPlan::for_frequency(board.rate(pins.clock), config.frequency) {
            Ok(plan) => plan,
            Err(err) => {
                I2cSystemSetup::tear_down(board, &pins);
                return Err(err);
            }
        };

        let mut regs = resources.registers;
        configure_controller(&mut regs, &config, &plan);
        self.shared.install(Some(Shared {
            generation,
            regs,
            engine: Engine::Idle,
            trace: Trace::new(),
        }));
        control.open = Some(OpenBus {
            refs: 1,
            config,
            plan,
            session,
            delay: resources.delay,
            pins,
        });
        self.vector.store(u32::from(pins.vector), Ordering::Release);
        InterruptController::enable(board, pins.vector);
        Ok((generation, 1))
    }

    /// Drops a reference. At zero the deferred stop is issued, the
    /// controller disabled and the board resources released. Returns the
    /// remaining reference count.
    pub(crate) fn close(&self, board: &B, generation: u16) -> Result<u32, I2cError> {
        let mut control = self.control.lock();
        let open = control.get(generation)?;
        open.refs -= 1;
        if open.refs > 0 {
            return Ok(open.refs);
        }
        if open.master().is_ok_and(|master| master.held.is_some()) {
            // Best effort; the controller is disabled either way.
            let _ = self.manual_step(board, generation, open, |engine| {
                engine.assume_owned();
                engine.stop()
            });
        }
        let pins = open.pins;

        self.vector.store(NO_VECTOR, Ordering::Release);
        InterruptController::disable(board, pins.vector);
        if let Some(mut shared) = self.shared.lend(board) {
            if let Engine::Auto(job) = &mut shared.engine {
                job.cancel(&mut shared.regs);
            }
            shared.regs.set_interrupt_mask(IrqSet::empty());
            shared.regs.set_enabled(false);
        }
        self.shared.install(None);
        I2cSystemSetup::tear_down(board, &pins);

        control.open = None;
        control.generation = control.generation.wrapping_add(1);
        Ok(0)
    }

    /// Runs `tx` and returns the number of bytes moved, which equals
    /// [`Transaction::total_len`] on success.
    pub(crate) fn transfer(
        &self,
        board: &B,
        generation: u16,
        tx: &mut Transaction<'_, '_>,
        mode: TransferMode,
        budget: Option<MicrosDurationU32>,
    ) -> Result<usize, I2cError> {
        let mut control = match budget {
            Some(budget) => self
                .control
                .lock_until(board, Deadline::after(board, budget))
                .ok_or(I2cError::BusBusy)?,
            None => self.control.lock(),
        };
        let open = control.get(generation)?;
        let held = open.master()?.held;
        let entry = Entry::for_transaction(held, tx)?;

        let result = match mode {
            TransferMode::Manual => self.transfer_manual(board, generation, open, tx, entry),
            TransferMode::Auto => self.transfer_auto(board, generation, open, tx, entry),
        };

        let master = open.master()?;
        master.held = match result {
            Ok(_) if tx.is_register_select() => tx.messages().first().map(HeldBus::of),
            _ => None,
        };
        result
    }

    fn transfer_manual(
        &self,
        board: &B,
        generation: u16,
        open: &mut OpenBus<B>,
        tx: &mut Transaction<'_, '_>,
        entry: Entry,
    ) -> Result<usize, I2cError> {
        let plan = open.plan;
        let policy = open.policy();
        self.manual_step(board, generation, open, |engine| {
            let result = run_manual(engine, tx, entry, &plan, policy);
            if result.is_err()
                && !matches!(engine.state(), TransferState::Idle | TransferState::Stopped)
            {
                let _ = engine.stop();
            }
            result
        })
    }

    fn transfer_auto(
        &self,
        board: &B,
        generation: u16,
        open: &mut OpenBus<B>,
        tx: &mut Transaction<'_, '_>,
        entry: Entry,
    ) -> Result<usize, I2cError> {
        if entry == Entry::Release {
            self.manual_step(board, generation, open, |engine| {
                engine.assume_owned();
                engine.stop()
            })?;
        }
        let register_select = tx.is_register_select();
        let mut count = 0;
        let mut start = 0;
        while start < tx.len() {
            let end = run_end(tx.messages(), start);
            let mut framings: Vec<Framing, MAX_AUTO_MESSAGES> = Vec::new();
            for index in start..end {
                framings
                    .push(framing(tx.messages(), index, entry, register_select))
                    .map_err(|_| I2cError::InvalidTransaction)?;
            }
            let messages = tx
                .messages_mut()
                .get_mut(start..end)
                .ok_or(I2cError::InvalidTransaction)?;
            count += self.run_auto(board, generation, open, messages, &mut framings)?;
            start = end;
        }
        Ok(count)
    }

    /// One auto-mode job with first-address retries. Returns the bytes moved.
    fn run_auto(
        &self,
        board: &B,
        generation: u16,
        open: &mut OpenBus<B>,
        messages: &mut [Message<'_>],
        framings: &mut [Framing],
    ) -> Result<usize, I2cError> {
        let plan = open.plan;
        let config = open.config;
        let budget = config.completion_timeout(messages.iter().map(Message::len).sum());

        let mut negotiate = false;
        if let Some(first) = framings.first_mut() {
            if first.start == StartKind::Start && plan.is_negotiated() {
                negotiate = true;
                first.start = StartKind::RepeatedStart;
            }
        }

        // SAFETY: every exit below either never installs the job or takes it
        // back from the shared cell, so it is dropped before `messages`.
        let mut job = unsafe { AutoJob::new(messages, framings) }?;
        let mut retries = 0;
        loop {
            if negotiate {
                self.manual_step(board, generation, open, |engine| engine.negotiate(&plan))?;
            }
            job = self.run_job(board, generation, job, budget)?;
            match job.outcome() {
                Some(JobOutcome::Complete) => return Ok(job.transferred()),
                Some(_) if job.failed_at_first_address() && retries < config.retry_count => {
                    retries += 1;
                    self.masked(board, generation, |shared| {
                        shared.trace.record(TraceKind::Error, u32::from(retries));
                    })?;
                    open.delay.delay_us(config.retry_pause().ticks());
                    // The controller stopped on the NACK; the retry opens fresh.
                    negotiate = plan.is_negotiated();
                    job.rewind(if negotiate {
                        StartKind::RepeatedStart
                    } else {
                        StartKind::Start
                    });
                }
                Some(outcome @ JobOutcome::Nack { .. }) => {
                    return outcome.into_result(job.transferred(), retries);
                }
                outcome => {
                    let _ = self.manual_step(board, generation, open, |engine| {
                        engine.assume_owned();
                        engine.stop()
                    });
                    return match outcome {
                        Some(outcome) => outcome.into_result(job.transferred(), retries),
                        None => Err(I2cError::Timeout),
                    };
                }
            }
        }
    }

    /// Hands `job` to interrupt context, waits for its signal and takes it
    /// back. A job without an outcome timed out and has been cancelled.
    fn run_job(
        &self,
        board: &B,
        generation: u16,
        job: AutoJob,
        budget: MicrosDurationU32,
    ) -> Result<AutoJob, I2cError> {
        self.done.reset();
        self.masked(board, generation, move |shared| {
            let mut job = job;
            job.start(&mut shared.regs);
            shared.engine = Engine::Auto(job);
        })?;

        // A late signal is still honoured: the job's outcome decides.
        let _ = self.done.wait(board, Deadline::after(board, budget));

        self.masked(board, generation, |shared| {
            match core::mem::replace(&mut shared.engine, Engine::Idle) {
                Engine::Auto(mut job) => {
                    if job.outcome().is_none() {
                        job.cancel(&mut shared.regs);
                        let raw = shared.regs.raw_interrupts().bits();
                        shared.trace.record(TraceKind::Error, u32::from(raw));
                    }
                    Ok(job)
                }
                other => {
                    shared.engine = other;
                    Err(I2cError::Timeout)
                }
            }
        })?
    }

    /// Reprograms timing for `frequency`. A held bus is released first.
    /// Returns the frequency actually achieved.
    pub(crate) fn set_frequency(
        &self,
        board: &B,
        generation: u16,
        frequency: HertzU32,
    ) -> Result<HertzU32, I2cError> {
        let mut control = self.control.lock();
        let open = control.get(generation)?;
        let config = open.config.with_frequency(frequency)?;
        let plan = TimingPlan::for_frequency(board.rate(open.pins.clock), frequency)?;
        self.release_held(board, generation, open)?;
        self.masked(board, generation, |shared| {
            configure_controller(&mut shared.regs, &config, &plan);
            shared.rearm();
        })?;
        open.config = config;
        open.plan = plan;
        Ok(plan.target().actual)
    }

    /// Replaces the target address (master) or own address (slave).
    pub(crate) fn set_address(
        &self,
        board: &B,
        generation: u16,
        address: u16,
        width: AddressWidth,
    ) -> Result<(), I2cError> {
        let mut control = self.control.lock();
        let open = control.get(generation)?;
        let config = open.config.with_address(address, width)?;
        if config.role == Role::Slave {
            self.masked(board, generation, |shared| {
                shared.regs.set_own_address(address, width);
            })?;
        }
        open.config = config;
        Ok(())
    }

    pub(crate) fn config(&self, board: &B, generation: u16) -> Result<BusConfig, I2cError> {
        let mut control = self.control.lock();
        Ok(control.get(generation)?.config)
    }

    /// GPIO bus recovery followed by a full controller re-initialization.
    /// The controller is reprogrammed even when recovery fails.
    pub(crate) fn reset(&self, board: &B, generation: u16) -> Result<(), I2cError> {
        let mut control = self.control.lock();
        let open = control.get(generation)?;
        if let Ok(master) = open.master() {
            master.held = None;
        }
        let config = open.config;
        let plan = open.plan;
        let pins = open.pins;
        let delay = &mut open.delay;
        self.masked(board, generation, |shared| {
            shared.regs.set_enabled(false);
            let recovered = I2cSystemSetup::recover_bus(board, &pins, delay);
            shared.regs.soft_reset();
            configure_controller(&mut shared.regs, &config, &plan);
            shared.rearm();
            if recovered.is_err() {
                shared.trace.record(TraceKind::Error, 0);
            }
            recovered
        })?
    }

    #[cfg(feature = "i2c_target")]
    pub(crate) fn register_slave(
        &self,
        board: &B,
        generation: u16,
        file: SlaveRegisterFile,
    ) -> Result<(), I2cError> {
        let mut control = self.control.lock();
        let open = control.get(generation)?;
        let Session::Slave(_) = &open.session else {
            return Err(I2cError::WrongRole);
        };
        self.masked(board, generation, |shared| {
            let mut responder = SlaveResponder::new(file);
            responder.arm(&mut shared.regs);
            shared.engine = Engine::Slave(responder);
        })
    }

    /// Runs `f` on the responder with the vector masked. Does not take the
    /// bus lock.
    #[cfg(feature = "i2c_target")]
    pub(crate) fn with_responder<T>(
        &self,
        board: &B,
        generation: u16,
        f: impl FnOnce(&mut SlaveResponder) -> T,
    ) -> Result<T, I2cError> {
        self.masked(board, generation, |shared| match &mut shared.engine {
            Engine::Slave(responder) => Ok(f(responder)),
            _ => Err(I2cError::WrongRole),
        })?
    }

    #[cfg(feature = "i2c_target")]
    pub(crate) fn slave_stats(&self, board: &B, generation: u16) -> Result<SlaveStats, I2cError> {
        self.with_responder(board, generation, |responder| responder.stats())
    }

    pub(crate) fn trace(
        &self,
        board: &B,
        generation: u16,
    ) -> Result<Vec<TraceEvent, TRACE_DEPTH>, I2cError> {
        self.masked(board, generation, |shared| shared.trace.snapshot())
    }

    pub(crate) fn clear_trace(&self, board: &B, generation: u16) -> Result<(), I2cError> {
        self.masked(board, generation, |shared| shared.trace.clear())
    }

    /// Interrupt handler body for this instance.
    pub(crate) fn on_interrupt(&self) {
        let finished = self.shared.with(|shared| {
            let Shared {
                regs,
                engine,
                trace,
                ..
            } = shared;
            match engine {
                Engine::Auto(job) => job.service(regs, trace),
                #[cfg(feature = "i2c_target")]
                Engine::Slave(responder) => {
                    responder.service(regs, trace);
                    false
                }
                Engine::Idle => {
                    regs.set_interrupt_mask(IrqSet::empty());
                    regs.clear_interrupts(IrqSet::LATCHED);
                    false
                }
            }
        });
        if finished == Some(true) {
            self.done.signal();
        }
    }

    fn release_held(&self, board: &B, generation: u16, open: &mut OpenBus<B>) -> Result<(), I2cError> {
        let Ok(master) = open.master() else {
            return Ok(());
        };
        if master.held.take().is_none() {
            return Ok(());
        }
        self.manual_step(board, generation, open, |engine| {
            engine.assume_owned();
            engine.stop()
        })
    }

    /// Builds a manual engine over the shared registers and runs `step`.
    fn manual_step<T>(
        &self,
        board: &B,
        generation: u16,
        open: &mut OpenBus<B>,
        step: impl FnOnce(&mut ManualEngine<'_, B::Registers, B, B::Delay>) -> Result<T, I2cError>,
    ) -> Result<T, I2cError> {
        let timeout = open.config.command_timeout();
        let delay = &mut open.delay;
        self.masked(board, generation, |shared| {
            let mut engine =
                ManualEngine::new(&mut shared.regs, board, delay, &mut shared.trace, timeout);
            step(&mut engine)
        })?
    }

    /// Thread-side access to the shared state with the vector masked.
    fn masked<T>(
        &self,
        board: &B,
        generation: u16,
        f: impl FnOnce(&mut Shared<B::Registers>) -> T,
    ) -> Result<T, I2cError> {
        let vector = self.vector().ok_or(I2cError::InvalidHandle)?;
        InterruptController::disable(board, vector);
        let mut shared = self.shared.lend(board).ok_or(I2cError::InvalidHandle)?;
        let result = if shared.generation == generation {
            Ok(f(&mut shared))
        } else {
            Err(I2cError::InvalidHandle)
        };
        self.shared.restore(shared);
        // A bus closed meanwhile must stay masked.
        if result.is_ok() {
            InterruptController::enable(board, vector);
        }
        result
    }
}

impl<B: Board> Default for Bus<B> {
    fn default() -> Self {
        Self::new()
    }
}
