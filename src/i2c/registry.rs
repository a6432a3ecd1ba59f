// Licensed under the Apache-2.0 license

//! # Bus Registry
//!
//! Owns every bus instance of a board and hands out [`BusHandle`]s.
//!
//! The registry is created once by platform-init code and shared by
//! reference; there are no process-wide driver tables. Each slot holds one
//! controller instance, addressed by a bus id in `0..N`. Handles carry a
//! generation counter so a handle kept across `close` is rejected rather
//! than silently addressing a re-opened bus.
//!
//! ## Interrupt dispatch
//!
//! Every open bus records the vector it was given in [`BusResources`]. The
//! board's vector table calls [`Registry::on_interrupt`] with the vector
//! number; the registry routes it to the owning instance only.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry: Registry<MyBoard> = Registry::new(board, NoOpLogger);
//!
//! let config = BusConfig::builder()
//!     .frequency(400_000.Hz())
//!     .address(0x50)
//!     .build()?;
//! let bus = registry.open(0, config, resources)?;
//!
//! let mut value = [0u8; 2];
//! registry.write_read(bus, &[0x10], &mut value)?;
//!
//! // from the vector table
//! registry.on_interrupt(vector);
//! ```

use fugit::{HertzU32, MicrosDurationU32};
use heapless::Vec;

use crate::common::{Logger, NoOpLogger};
use crate::i2c::bus::Bus;
use crate::i2c::common::{AddressWidth, BusConfig, TransferMode};
use crate::i2c::error::I2cError;
use crate::i2c::message::{Message, MessageFlags, Transaction};
#[cfg(feature = "i2c_target")]
use crate::i2c::slave::{SlaveRegisterFile, SlaveStats};
use crate::i2c::trace::{TraceEvent, TRACE_DEPTH};
use crate::platform::{Board, BusResources, Vector};

/// Reference to an open bus instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BusHandle {
    index: u8,
    generation: u16,
}

impl BusHandle {
    pub fn bus_id(&self) -> usize {
        usize::from(self.index)
    }
}

pub struct Registry<B: Board, L: Logger = NoOpLogger, const N: usize = 4> {
    board: B,
    logger: L,
    buses: [Bus<B>; N],
}

impl<B: Board, L: Logger, const N: usize> Registry<B, L, N> {
    pub fn new(board: B, logger: L) -> Self {
        Self {
            board,
            logger,
            buses: core::array::from_fn(|_| Bus::new()),
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    /// Opens bus `bus_id`, or adds a reference if it is already open.
    ///
    /// The first open claims the pins, ungates the clock, programs timing
    /// for `config` and unmasks the bus vector. A second open keeps the
    /// running configuration and drops `resources`.
    ///
    /// # Arguments
    ///
    /// * `bus_id` - Slot index, `0..N`
    /// * `config` - Validated bus configuration
    /// * `resources` - Register block, delay, vector, clock gate and pins
    ///
    /// # Returns
    ///
    /// * `Result<BusHandle, I2cError>` - Handle for the open instance;
    ///   `InvalidHandle` for an unknown slot, `UnsupportedFrequency` when no
    ///   divider reaches the requested rate
    pub fn open(
        &self,
        bus_id: usize,
        config: BusConfig,
        resources: BusResources<B::Registers, B::Delay>,
    ) -> Result<BusHandle, I2cError> {
        let index = u8::try_from(bus_id).map_err(|_| I2cError::InvalidHandle)?;
        let bus = self.buses.get(bus_id).ok_or(I2cError::InvalidHandle)?;
        match bus.open(&self.board, config, resources) {
            Ok((generation, refs)) => {
                self.logger
                    .debug(format_args!("i2c{bus_id}: open (refs {refs})"));
                Ok(BusHandle { index, generation })
            }
            Err(err) => {
                self.logger
                    .error(format_args!("i2c{bus_id}: open failed: {err}"));
                Err(err)
            }
        }
    }

    /// Drops a reference; the instance is torn down at zero.
    ///
    /// Teardown issues a deferred stop if a register select left the bus
    /// held, disables the controller and releases the board resources. The
    /// handle is stale afterwards.
    pub fn close(&self, handle: BusHandle) -> Result<(), I2cError> {
        let refs = self.bus(handle)?.close(&self.board, handle.generation)?;
        if refs == 0 {
            self.logger
                .debug(format_args!("i2c{}: closed", handle.index));
        }
        Ok(())
    }

    /// Reprograms SCL timing. A held bus is released first.
    ///
    /// # Arguments
    ///
    /// * `handle` - Open bus
    /// * `frequency` - Requested SCL rate
    ///
    /// # Returns
    ///
    /// * `Result<HertzU32, I2cError>` - The SCL frequency actually achieved
    pub fn set_frequency(
        &self,
        handle: BusHandle,
        frequency: HertzU32,
    ) -> Result<HertzU32, I2cError> {
        let actual = self
            .bus(handle)?
            .set_frequency(&self.board, handle.generation, frequency)
            .inspect_err(|err| self.log_failure(handle, "set_frequency", err))?;
        self.logger.debug(format_args!(
            "i2c{}: {} Hz requested, {} Hz programmed",
            handle.index,
            frequency.raw(),
            actual.raw()
        ));
        Ok(actual)
    }

    /// Target address used by [`Self::write`], [`Self::read`] and
    /// [`Self::write_read`]; own address when the bus is a slave.
    pub fn set_address(
        &self,
        handle: BusHandle,
        address: u16,
        width: AddressWidth,
    ) -> Result<(), I2cError> {
        self.bus(handle)?
            .set_address(&self.board, handle.generation, address, width)
    }

    pub fn config(&self, handle: BusHandle) -> Result<BusConfig, I2cError> {
        self.bus(handle)?.config(&self.board, handle.generation)
    }

    /// Runs a transaction, waiting as long as needed for the bus.
    ///
    /// A transaction made of a single one-byte write is a register select:
    /// it ends without a stop and the next transaction to the same target
    /// continues with a repeated start.
    ///
    /// # Arguments
    ///
    /// * `handle` - Open master bus
    /// * `tx` - Messages to run in order
    /// * `mode` - Byte-by-byte or interrupt-driven engine
    ///
    /// # Returns
    ///
    /// * `Result<usize, I2cError>` - Bytes transferred, equal to
    ///   [`Transaction::total_len`] on success
    pub fn transfer(
        &self,
        handle: BusHandle,
        tx: &mut Transaction<'_, '_>,
        mode: TransferMode,
    ) -> Result<usize, I2cError> {
        self.bus(handle)?
            .transfer(&self.board, handle.generation, tx, mode, None)
            .inspect_err(|err| self.log_failure(handle, "transfer", err))
    }

    /// Like [`Self::transfer`], failing with [`I2cError::BusBusy`] when the
    /// bus cannot be acquired within `budget`.
    pub fn transfer_within(
        &self,
        handle: BusHandle,
        tx: &mut Transaction<'_, '_>,
        mode: TransferMode,
        budget: MicrosDurationU32,
    ) -> Result<usize, I2cError> {
        self.bus(handle)?
            .transfer(&self.board, handle.generation, tx, mode, Some(budget))
            .inspect_err(|err| self.log_failure(handle, "transfer", err))
    }

    /// Writes `bytes` to the configured target address.
    pub fn write(&self, handle: BusHandle, bytes: &[u8]) -> Result<usize, I2cError> {
        let config = self.config(handle)?;
        let mut messages = [Message::write(config.address, bytes).with_flags(width_flags(&config))];
        self.run_configured(handle, &config, &mut messages)
    }

    pub fn read(&self, handle: BusHandle, buffer: &mut [u8]) -> Result<usize, I2cError> {
        let config = self.config(handle)?;
        let mut messages = [Message::read(config.address, buffer).with_flags(width_flags(&config))];
        self.run_configured(handle, &config, &mut messages)
    }

    /// Write followed by a read under one bus acquisition, joined by a
    /// repeated start.
    ///
    /// # Arguments
    ///
    /// * `handle` - Open master bus
    /// * `bytes` - Bytes written first, usually a register index
    /// * `buffer` - Filled by the read
    ///
    /// # Returns
    ///
    /// * `Result<usize, I2cError>` - Total bytes written and read
    pub fn write_read(
        &self,
        handle: BusHandle,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<usize, I2cError> {
        let config = self.config(handle)?;
        let flags = width_flags(&config);
        let mut messages = [
            Message::write(config.address, bytes).with_flags(flags),
            Message::read(config.address, buffer).with_flags(flags),
        ];
        self.run_configured(handle, &config, &mut messages)
    }

    /// GPIO bus recovery and controller re-initialization.
    ///
    /// Clocks SCL until the target releases SDA, then generates a stop by
    /// hand. The controller is reprogrammed even when recovery fails.
    ///
    /// # Returns
    ///
    /// * `Result<(), I2cError>` - `BusRecoveryFailed` when SDA stayed low
    pub fn bus_reset(&self, handle: BusHandle) -> Result<(), I2cError> {
        let result = self.bus(handle)?.reset(&self.board, handle.generation);
        match &result {
            Ok(()) => self
                .logger
                .debug(format_args!("i2c{}: bus reset", handle.index)),
            Err(err) => self.log_failure(handle, "bus_reset", err),
        }
        result
    }

    /// Installs the register file served to external masters.
    #[cfg(feature = "i2c_target")]
    pub fn register_slave(
        &self,
        handle: BusHandle,
        file: SlaveRegisterFile,
    ) -> Result<(), I2cError> {
        self.bus(handle)?
            .register_slave(&self.board, handle.generation, file)
            .inspect_err(|err| self.log_failure(handle, "register_slave", err))
    }

    /// Reads one slave register. Masks the bus vector briefly; never waits
    /// for the bus lock.
    ///
    /// # Returns
    ///
    /// * `Result<u8, I2cError>` - Register value; `WrongRole` when no
    ///   register file is installed
    #[cfg(feature = "i2c_target")]
    pub fn slave_register(&self, handle: BusHandle, index: u8) -> Result<u8, I2cError> {
        self.bus(handle)?
            .with_responder(&self.board, handle.generation, |responder| {
                responder.file().get(index)
            })
    }

    #[cfg(feature = "i2c_target")]
    pub fn set_slave_register(
        &self,
        handle: BusHandle,
        index: u8,
        value: u8,
    ) -> Result<(), I2cError> {
        self.bus(handle)?
            .with_responder(&self.board, handle.generation, |responder| {
                responder.file_mut().set(index, value);
            })
    }

    /// Copy of the whole register file.
    #[cfg(feature = "i2c_target")]
    pub fn slave_registers(&self, handle: BusHandle) -> Result<SlaveRegisterFile, I2cError> {
        self.bus(handle)?
            .with_responder(&self.board, handle.generation, |responder| {
                responder.file().clone()
            })
    }

    #[cfg(feature = "i2c_target")]
    pub fn slave_stats(&self, handle: BusHandle) -> Result<SlaveStats, I2cError> {
        self.bus(handle)?.slave_stats(&self.board, handle.generation)
    }

    /// Recent protocol events, oldest first.
    pub fn trace(&self, handle: BusHandle) -> Result<Vec<TraceEvent, TRACE_DEPTH>, I2cError> {
        self.bus(handle)?.trace(&self.board, handle.generation)
    }

    pub fn clear_trace(&self, handle: BusHandle) -> Result<(), I2cError> {
        self.bus(handle)?.clear_trace(&self.board, handle.generation)
    }

    /// Entry point for the board's vector table.
    pub fn on_interrupt(&self, vector: Vector) {
        for bus in self.buses.iter() {
            if bus.vector() == Some(vector) {
                bus.on_interrupt();
            }
        }
    }

    fn bus(&self, handle: BusHandle) -> Result<&Bus<B>, I2cError> {
        self.buses
            .get(handle.bus_id())
            .ok_or(I2cError::InvalidHandle)
    }

    fn run_configured(
        &self,
        handle: BusHandle,
        config: &BusConfig,
        messages: &mut [Message<'_>],
    ) -> Result<usize, I2cError> {
        let mut tx = Transaction::new(messages)?;
        self.transfer(handle, &mut tx, config.transfer_mode)
    }

    fn log_failure(&self, handle: BusHandle, operation: &str, err: &I2cError) {
        self.logger.error(format_args!(
            "i2c{}: {operation} failed: {err}",
            handle.index
        ));
    }
}

fn width_flags(config: &BusConfig) -> MessageFlags {
    match config.address_width {
        AddressWidth::SevenBit => MessageFlags::empty(),
        AddressWidth::TenBit => MessageFlags::TEN_BIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::common::{BusConfigBuilder, Role};
    use crate::i2c::error::NackPhase;
    use crate::i2c::mock::{BusEvent, MockBoard, MockRegisters, VECTOR};
    use crate::i2c::trace::TraceKind;
    use crate::i2c::traits::{Command, IrqSet};
    use core::fmt;
    use fugit::RateExtU32;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<std::vec::Vec<std::string::String>>,
    }

    impl Logger for RecordingLogger {
        fn debug(&self, args: fmt::Arguments<'_>) {
            self.lines.lock().unwrap().push(std::format!("D {args}"));
        }

        fn error(&self, args: fmt::Arguments<'_>) {
            self.lines.lock().unwrap().push(std::format!("E {args}"));
        }
    }

    type TestRegistry = Registry<MockBoard, NoOpLogger, 2>;

    fn registry() -> TestRegistry {
        Registry::new(MockBoard::new(), NoOpLogger)
    }

    fn master(mode: TransferMode) -> BusConfig {
        BusConfigBuilder::new()
            .frequency(400_000.Hz())
            .address(0x50)
            .transfer_mode(mode)
            .build()
            .unwrap()
    }

    /// Runs `body` while a second thread plays the interrupt controller,
    /// dispatching the bus vector whenever it is enabled.
    fn with_isr<R>(registry: &TestRegistry, body: impl FnOnce() -> R) -> R {
        let stop = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !stop.load(Ordering::SeqCst) {
                    if registry.board().vector_enabled(VECTOR) {
                        registry.on_interrupt(VECTOR);
                    }
                    std::thread::yield_now();
                }
            });
            let result = body();
            stop.store(true, Ordering::SeqCst);
            result
        })
    }

    #[test]
    fn test_open_master_write_then_read() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        {
            let mut model = regs.model();
            model.registers[0x10] = 0xAB;
            model.registers[0x11] = 0xCD;
        }
        let bus = registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
        let mut buffer = [0u8; 2];
        let mut messages = [
            Message::write(0x50, &[0x10]),
            Message::read(0x50, &mut buffer),
        ];
        let mut tx = Transaction::new(&mut messages).unwrap();
        assert_eq!(registry.transfer(bus, &mut tx, TransferMode::Manual), Ok(3));
        drop(tx);
        assert_eq!(buffer, [0xAB, 0xCD]);
    }

    #[test]
    fn test_open_master_every_address_nacked() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        regs.model().nack_addresses = usize::MAX;
        let bus = registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
        let mut buffer = [0u8; 2];
        assert_eq!(
            registry.write_read(bus, &[0x10], &mut buffer),
            Err(I2cError::Nack {
                phase: NackPhase::Address,
                retries: 3
            })
        );
    }

    #[test]
    fn test_open_is_reference_counted() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        let first = registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
        let second = registry
            .open(0, master(TransferMode::Auto), registry.board().resources(&regs))
            .unwrap();
        assert_eq!(first, second);
        // the running configuration is kept
        assert_eq!(
            registry.config(first).unwrap().transfer_mode,
            TransferMode::Manual
        );

        registry.close(first).unwrap();
        registry.write(second, &[0x01, 0x02]).unwrap();
        assert!(registry.board().vector_enabled(VECTOR));

        registry.close(second).unwrap();
        assert!(!registry.board().vector_enabled(VECTOR));
        assert!(registry.board().state().enabled_clocks.is_empty());
        assert_eq!(registry.close(second), Err(I2cError::InvalidHandle));

        let reopened = registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
        assert_ne!(reopened, first);
        assert_eq!(registry.write(first, &[0x01]), Err(I2cError::InvalidHandle));
    }

    #[test]
    fn test_open_rejects_unknown_bus_and_bad_frequency() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        assert_eq!(
            registry.open(5, master(TransferMode::Manual), registry.board().resources(&regs)),
            Err(I2cError::InvalidHandle)
        );

        let too_slow = BusConfigBuilder::new().frequency(100.Hz()).build().unwrap();
        assert_eq!(
            registry.open(0, too_slow, registry.board().resources(&regs)),
            Err(I2cError::UnsupportedFrequency)
        );
        assert!(registry.board().state().enabled_clocks.is_empty());
        assert!(registry.board().state().attached.is_empty());
        // the slot is still free
        registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
    }

    #[test]
    fn test_auto_mode_two_message_job() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        regs.model().registers[0x13] = 0xEE;
        let bus = registry
            .open(0, master(TransferMode::Auto), registry.board().resources(&regs))
            .unwrap();

        let mut buffer = [0u8; 4];
        let result = with_isr(&registry, || {
            let mut messages = [
                Message::write(0x50, &[0x10, 1, 2, 3]),
                Message::read(0x50, &mut buffer),
            ];
            let mut tx = Transaction::new(&mut messages).unwrap();
            registry.transfer(bus, &mut tx, TransferMode::Auto)
        });
        assert_eq!(result, Ok(8));
        assert_eq!(buffer[0], 0xEE);

        let moved: u32 = registry
            .trace(bus)
            .unwrap()
            .iter()
            .filter(|event| event.kind == TraceKind::AutoDone)
            .map(|event| event.value)
            .sum();
        assert_eq!(moved, 8);
        let model = regs.model();
        assert_eq!(model.tx_pushes, 4);
        assert_eq!(model.rx_pops, 4);
        assert_eq!(model.auto_done_count, 2);
        assert_eq!(model.mask, IrqSet::empty());
    }

    #[test]
    fn test_auto_mode_retries_address_nack() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        regs.model().nack_addresses = 2;
        let bus = registry
            .open(0, master(TransferMode::Auto), registry.board().resources(&regs))
            .unwrap();
        let result = with_isr(&registry, || registry.write(bus, &[0x30, 0x99]));
        assert_eq!(result, Ok(2));
        assert_eq!(regs.model().registers[0x30], 0x99);
        let starts = regs
            .bus_log()
            .iter()
            .filter(|e| **e == BusEvent::Start)
            .count();
        assert_eq!(starts, 3);
    }

    #[test]
    fn test_auto_mode_ignore_nack_write() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        regs.model().nack_data_after = Some(1);
        let bus = registry
            .open(0, master(TransferMode::Auto), registry.board().resources(&regs))
            .unwrap();
        let result = with_isr(&registry, || {
            let mut messages =
                [Message::write(0x50, &[0x10, 1, 2]).with_flags(MessageFlags::IGNORE_NACK)];
            let mut tx = Transaction::new(&mut messages).unwrap();
            registry.transfer(bus, &mut tx, TransferMode::Auto)
        });
        assert_eq!(result, Ok(3));

        // without the flag the same write fails on the second byte
        let result = with_isr(&registry, || registry.write(bus, &[0x10, 1, 2]));
        assert_eq!(
            result,
            Err(I2cError::Nack {
                phase: NackPhase::Data { offset: 2 },
                retries: 0
            })
        );
    }

    #[test]
    fn test_auto_mode_fast_plus_retry_renegotiates() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        regs.model().nack_addresses = 1;
        let config = BusConfigBuilder::from(master(TransferMode::Auto))
            .frequency(1_000_000.Hz())
            .build()
            .unwrap();
        let bus = registry
            .open(0, config, registry.board().resources(&regs))
            .unwrap();
        let result = with_isr(&registry, || registry.write(bus, &[0x10, 0x22]));
        assert_eq!(result, Ok(2));
        let codes = regs
            .bus_log()
            .iter()
            .filter(|e| **e == BusEvent::Address(0x0F))
            .count();
        assert_eq!(codes, 2);
    }

    #[test]
    fn test_manual_fast_plus_retry_renegotiates() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        regs.model().nack_addresses = 1;
        let config = BusConfigBuilder::from(master(TransferMode::Manual))
            .frequency(1_000_000.Hz())
            .build()
            .unwrap();
        let bus = registry
            .open(0, config, registry.board().resources(&regs))
            .unwrap();
        assert_eq!(registry.write(bus, &[0x10, 0x22]), Ok(2));
        let log = regs.bus_log();
        let retry = log.iter().position(|e| *e == BusEvent::Stop).unwrap();
        assert_eq!(
            log.get(retry + 1..retry + 4),
            Some(
                &[
                    BusEvent::Start,
                    BusEvent::Address(0x0F),
                    BusEvent::Restart
                ][..]
            )
        );
    }

    #[test]
    fn test_auto_mode_times_out_without_interrupts() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        let config = BusConfigBuilder::from(master(TransferMode::Auto))
            .timeout(MicrosDurationU32::millis(5))
            .build()
            .unwrap();
        let bus = registry
            .open(0, config, registry.board().resources(&regs))
            .unwrap();
        // nobody services the vector
        assert_eq!(registry.write(bus, &[0x01]), Err(I2cError::Timeout));
        assert_eq!(regs.model().mask, IrqSet::empty());
        assert_eq!(regs.commands().last(), Some(&Command::Stop));
    }

    #[test]
    fn test_ten_bit_convenience_write() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x2A5);
        let bus = registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
        registry.set_address(bus, 0x2A5, AddressWidth::TenBit).unwrap();
        registry.write(bus, &[0x05, 0x11]).unwrap();
        assert_eq!(regs.model().registers[0x05], 0x11);
        assert_eq!(regs.bus_log().get(1), Some(&BusEvent::Address(0xF4)));
    }

    #[test]
    #[cfg(feature = "i2c_target")]
    fn test_slave_register_file_served_from_interrupt() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        let config = BusConfigBuilder::new()
            .role(Role::Slave)
            .address(0x42)
            .build()
            .unwrap();
        let bus = registry
            .open(1, config, registry.board().resources(&regs))
            .unwrap();
        assert_eq!(registry.slave_register(bus, 0), Err(I2cError::WrongRole));

        registry
            .register_slave(bus, SlaveRegisterFile::from_image(&[0, 1, 2, 3]))
            .unwrap();
        regs.master_write(&[0x10, 0x99]);
        registry.on_interrupt(VECTOR);
        regs.master_stop();
        registry.on_interrupt(VECTOR);
        assert_eq!(registry.slave_register(bus, 0x10), Ok(0x99));

        registry.set_slave_register(bus, 0x02, 0x77).unwrap();
        regs.master_write(&[0x02]);
        registry.on_interrupt(VECTOR);
        regs.master_stop();
        registry.on_interrupt(VECTOR);
        regs.master_read();
        registry.on_interrupt(VECTOR);
        assert_eq!(regs.model().slave_sent.first(), Some(&0x77));
        assert_eq!(registry.slave_registers(bus).unwrap().get(3), 3);
        assert_eq!(registry.slave_stats(bus).unwrap().overruns, 0);
    }

    #[test]
    #[cfg(feature = "i2c_target")]
    fn test_master_bus_rejects_slave_registration() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        let bus = registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
        assert_eq!(
            registry.register_slave(bus, SlaveRegisterFile::new()),
            Err(I2cError::WrongRole)
        );
    }

    #[test]
    #[cfg(feature = "i2c_target")]
    fn test_interrupts_for_other_vectors_are_ignored() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        let config = BusConfigBuilder::new().role(Role::Slave).build().unwrap();
        let bus = registry
            .open(0, config, registry.board().resources(&regs))
            .unwrap();
        registry.register_slave(bus, SlaveRegisterFile::new()).unwrap();
        regs.master_write(&[0x01, 0x55]);
        registry.on_interrupt(VECTOR + 1);
        assert_eq!(registry.slave_register(bus, 0x01), Ok(0));
    }

    #[test]
    fn test_trace_records_manual_transfer() {
        let registry = registry();
        let regs = MockRegisters::with_device(0x50);
        let bus = registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
        registry.write(bus, &[0x10, 0x20]).unwrap();
        let kinds: std::vec::Vec<TraceKind> =
            registry.trace(bus).unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TraceKind::Start,
                TraceKind::SendAddress,
                TraceKind::SendByte,
                TraceKind::SendByte,
                TraceKind::Stop
            ]
        );
        registry.clear_trace(bus).unwrap();
        assert!(registry.trace(bus).unwrap().is_empty());
    }

    #[test]
    fn test_failures_are_logged() {
        let registry: Registry<MockBoard, RecordingLogger, 1> =
            Registry::new(MockBoard::new(), RecordingLogger::default());
        let regs = MockRegisters::with_device(0x50);
        regs.model().nack_addresses = usize::MAX;
        let bus = registry
            .open(0, master(TransferMode::Manual), registry.board().resources(&regs))
            .unwrap();
        let _ = registry.write(bus, &[0x01]);
        let lines = registry.logger.lines.lock().unwrap();
        assert!(lines.first().unwrap().starts_with("D i2c0: open"));
        assert!(lines.last().unwrap().starts_with("E i2c0: transfer failed"));
    }
}
