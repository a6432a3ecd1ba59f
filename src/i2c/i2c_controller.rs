// Licensed under the Apache-2.0 license

//! embedded-hal front end for an open bus.
//!
//! [`I2cController`] borrows a [`Registry`] and a [`BusHandle`] and
//! implements [`embedded_hal::i2c::I2c`] for both 7-bit and 10-bit
//! addresses, so generic device drivers can run on top of the coordinator.
//! Adjacent operations of the same direction are merged without a restart
//! and every transaction ends with a stop, as embedded-hal requires.

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress, TenBitAddress};
use heapless::Vec;

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::TransferMode;
use crate::i2c::error::I2cError;
use crate::i2c::message::{Direction, Message, MessageFlags, Transaction};
use crate::i2c::registry::{BusHandle, Registry};
use crate::platform::Board;

/// Operations accepted in one embedded-hal transaction.
pub const MAX_OPERATIONS: usize = 16;

pub struct I2cController<'r, B: Board, L: Logger = NoOpLogger, const N: usize = 4> {
    registry: &'r Registry<B, L, N>,
    handle: BusHandle,
    mode: TransferMode,
}

impl<'r, B: Board, L: Logger, const N: usize> I2cController<'r, B, L, N> {
    /// Uses the transfer mode the bus was configured with.
    pub fn new(registry: &'r Registry<B, L, N>, handle: BusHandle) -> Result<Self, I2cError> {
        let mode = registry.config(handle)?.transfer_mode;
        Ok(Self {
            registry,
            handle,
            mode,
        })
    }

    #[must_use]
    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn handle(&self) -> BusHandle {
        self.handle
    }

    fn run(
        &mut self,
        address: u16,
        width: MessageFlags,
        operations: &mut [Operation<'_>],
    ) -> Result<(), I2cError> {
        let mut messages: Vec<Message<'_>, MAX_OPERATIONS> = Vec::new();
        let mut previous: Option<Direction> = None;
        for operation in operations.iter_mut() {
            let message = match operation {
                Operation::Write(bytes) => Message::write(address, bytes),
                Operation::Read(buffer) => Message::read(address, buffer),
            };
            let mut flags = width;
            if previous == Some(message.direction()) {
                flags |= MessageFlags::NO_START;
            }
            previous = Some(message.direction());
            messages
                .push(message.with_flags(flags))
                .map_err(|_| I2cError::InvalidTransaction)?;
        }
        if let Some(last) = messages.pop() {
            let flags = last.flags() | MessageFlags::STOP;
            messages
                .push(last.with_flags(flags))
                .map_err(|_| I2cError::InvalidTransaction)?;
        }

        let mut tx = Transaction::new(&mut messages)?;
        self.registry
            .transfer(self.handle, &mut tx, self.mode)
            .map(drop)
    }
}

impl<B: Board, L: Logger, const N: usize> ErrorType for I2cController<'_, B, L, N> {
    type Error = I2cError;
}

impl<B: Board, L: Logger, const N: usize> I2c<SevenBitAddress> for I2cController<'_, B, L, N> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.run(u16::from(address), MessageFlags::empty(), operations)
    }
}

impl<B: Board, L: Logger, const N: usize> I2c<TenBitAddress> for I2cController<'_, B, L, N> {
    fn transaction(
        &mut self,
        address: TenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.run(address, MessageFlags::TEN_BIT, operations)
    }
}
