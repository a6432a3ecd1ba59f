// Licensed under the Apache-2.0 license

//! Board collaborators consumed by the I2C driver.
//!
//! The driver never touches pin-mux, clock or interrupt controller registers
//! directly. A board support package implements the traits below once and
//! hands an instance to [`crate::i2c::Registry`].
//!
//! All methods take `&self`: the same board object is shared between every
//! bus instance and between thread and interrupt context, so implementations
//! are expected to be thin wrappers around memory-mapped registers.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use fugit::{HertzU32, MicrosDurationU32, MicrosDurationU64};

use crate::i2c::traits::RegisterInterface;

/// Microsecond timestamp from the board's free-running timer.
pub type Instant = fugit::TimerInstantU64<1_000_000>;

pub type PinId = u16;
pub type ClockGate = u16;
pub type Vector = u16;

/// Function a bus pin is muxed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PinFunction {
    /// Routed to the I2C peripheral.
    I2c,
    /// Plain GPIO, driven open-drain by software.
    GpioOutput,
    /// Plain GPIO, input only.
    GpioInput,
}

pub trait Gpio {
    fn configure_function(&self, pin: PinId, function: PinFunction);
    fn write(&self, pin: PinId, state: PinState);
    fn read(&self, pin: PinId) -> PinState;
}

pub trait ClockControl {
    fn enable(&self, gate: ClockGate);
    fn disable(&self, gate: ClockGate);
    /// Current input clock rate behind `gate`.
    fn rate(&self, gate: ClockGate) -> HertzU32;
}

/// Interrupt controller operations by vector number.
///
/// `attach` binds the vector to the registry's dispatcher; the board's
/// vector table is expected to call [`crate::i2c::Registry::on_interrupt`]
/// with the same number.
pub trait InterruptController {
    fn attach(&self, vector: Vector);
    fn detach(&self, vector: Vector);
    fn enable(&self, vector: Vector);
    fn disable(&self, vector: Vector);
}

/// Monotonic time source used for every bounded wait in the driver.
pub trait Monotonic {
    fn now(&self) -> Instant;

    /// Called on every iteration of a polling loop.
    ///
    /// Bare-metal boards can keep the default spin hint; an RTOS port
    /// overrides this to yield to the scheduler.
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

/// Everything a bus instance needs from the board.
pub trait Board: Gpio + ClockControl + InterruptController + Monotonic {
    /// Register block of one controller instance.
    type Registers: RegisterInterface + Send;
    /// Busy-wait delay used for retry pacing and bus recovery.
    type Delay: DelayNs + Send;
}

/// Per-instance hardware handed over at open time.
pub struct BusResources<R, D> {
    pub registers: R,
    pub delay: D,
    pub vector: Vector,
    pub clock: ClockGate,
    pub scl: PinId,
    pub sda: PinId,
}

/// Point in time after which a bounded wait gives up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after<M: Monotonic + ?Sized>(clock: &M, budget: MicrosDurationU32) -> Self {
        let budget = MicrosDurationU64::micros(u64::from(budget.ticks()));
        Self(clock.now() + budget)
    }

    pub fn expired<M: Monotonic + ?Sized>(&self, clock: &M) -> bool {
        clock.now() >= self.0
    }
}
