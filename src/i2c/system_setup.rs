// Licensed under the Apache-2.0 license

//! I2C System Setup Helper
//!
//! Board-level steps around a bus instance: clock gating, pin muxing,
//! interrupt vector binding and the GPIO bus-recovery procedure. Keeps the
//! coordinator free of platform sequencing.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;

use crate::i2c::error::I2cError;
use crate::platform::{ClockControl, ClockGate, Gpio, InterruptController, PinFunction, PinId, Vector};

/// SCL pulses attempted before recovery is declared failed.
pub const RECOVERY_PULSES: usize = 10;

/// Half SCL period used while bit-banging, roughly 100 kHz.
const RECOVERY_HALF_PERIOD_US: u32 = 5;

/// Pins and vector owned by one bus instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusPins {
    pub scl: PinId,
    pub sda: PinId,
    pub clock: ClockGate,
    pub vector: Vector,
}

/// Helper for I2C system control operations
pub struct I2cSystemSetup;

impl I2cSystemSetup {
    /// Ungates the peripheral clock, routes both pins to the controller and
    /// binds the vector. The vector stays disabled until the caller enables
    /// it.
    pub fn bring_up<P>(platform: &P, pins: &BusPins)
    where
        P: Gpio + ClockControl + InterruptController + ?Sized,
    {
        ClockControl::enable(platform, pins.clock);
        platform.configure_function(pins.scl, PinFunction::I2c);
        platform.configure_function(pins.sda, PinFunction::I2c);
        platform.attach(pins.vector);
    }

    /// Reverse of [`Self::bring_up`]; pins are left as GPIO inputs.
    pub fn tear_down<P>(platform: &P, pins: &BusPins)
    where
        P: Gpio + ClockControl + InterruptController + ?Sized,
    {
        InterruptController::disable(platform, pins.vector);
        platform.detach(pins.vector);
        platform.configure_function(pins.scl, PinFunction::GpioInput);
        platform.configure_function(pins.sda, PinFunction::GpioInput);
        ClockControl::disable(platform, pins.clock);
    }

    /// Manual bus recovery.
    ///
    /// With SCL muxed as GPIO output and SDA as input, SCL is pulsed until
    /// the target releases SDA, at most [`RECOVERY_PULSES`] times. A
    /// start/stop handshake on SDA then resets target state machines. An
    /// idle bus gets the handshake only. Both pins are routed back to the
    /// controller on every path.
    pub fn recover_bus<P, D>(platform: &P, pins: &BusPins, delay: &mut D) -> Result<(), I2cError>
    where
        P: Gpio + ?Sized,
        D: DelayNs,
    {
        platform.configure_function(pins.scl, PinFunction::GpioOutput);
        platform.configure_function(pins.sda, PinFunction::GpioInput);

        let result = Self::release_sda(platform, pins, delay);
        if result.is_ok() {
            // SCL is high here: SDA falling then rising is start then stop.
            platform.configure_function(pins.sda, PinFunction::GpioOutput);
            platform.write(pins.sda, PinState::Low);
            delay.delay_us(RECOVERY_HALF_PERIOD_US);
            platform.write(pins.sda, PinState::High);
            delay.delay_us(RECOVERY_HALF_PERIOD_US);
        }

        platform.configure_function(pins.scl, PinFunction::I2c);
        platform.configure_function(pins.sda, PinFunction::I2c);
        result
    }

    fn release_sda<P, D>(platform: &P, pins: &BusPins, delay: &mut D) -> Result<(), I2cError>
    where
        P: Gpio + ?Sized,
        D: DelayNs,
    {
        if platform.read(pins.sda) == PinState::High {
            return Ok(());
        }
        for _ in 0..RECOVERY_PULSES {
            platform.write(pins.scl, PinState::Low);
            delay.delay_us(RECOVERY_HALF_PERIOD_US);
            platform.write(pins.scl, PinState::High);
            delay.delay_us(RECOVERY_HALF_PERIOD_US);
            if platform.read(pins.sda) == PinState::High {
                return Ok(());
            }
        }
        Err(I2cError::BusRecoveryFailed)
    }
}
