// Licensed under the Apache-2.0 license

//! Simulated controller and board used by the unit tests.
//!
//! `MockRegisters` models the controller together with one target device
//! holding a 256-byte register file: the first byte written after the
//! address selects the register pointer, later bytes store with
//! auto-increment, and reads stream from the pointer. Both the manual
//! command path and the autonomous sequencer drive the same device model.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use embedded_hal::i2c::NoAcknowledgeSource;
use fugit::HertzU32;

use crate::i2c::common::{AddressWidth, Role};
use crate::i2c::manual::{seven_bit_header, ten_bit_header};
use crate::i2c::message::{Direction, StartKind};
use crate::i2c::timing::TimingProfile;
use crate::i2c::traits::{
    AutoSequencer, AutoSetup, Command, I2cRegisters, IrqSet, ManualCommands, Status,
};
use crate::platform::{
    Board, BusResources, ClockControl, ClockGate, Gpio, Instant, InterruptController, Monotonic,
    PinFunction, PinId, Vector,
};

pub const SCL: PinId = 4;
pub const SDA: PinId = 5;
pub const VECTOR: Vector = 40;
pub const CLOCK_GATE: ClockGate = 3;
pub const INPUT_HZ: u32 = 40_000_000;

/// What the device saw on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    Restart,
    Stop,
    Address(u8),
    Data(u8),
    Read(u8),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Address,
    TenBitLow { high: u16 },
    Writing { first: bool },
    Reading,
    Ignoring,
}

#[derive(Debug)]
pub struct Model {
    // target device
    pub device_address: u16,
    pub registers: [u8; 256],
    pub pointer: u8,
    /// Address phases still to be NACKed.
    pub nack_addresses: usize,
    /// NACK every data byte after this many were accepted.
    pub nack_data_after: Option<usize>,
    /// Never complete manual commands.
    pub stall: bool,
    /// Never finish autonomous runs.
    pub stall_auto: bool,
    phase: Phase,
    ten_bit_selected: bool,
    data_accepted: usize,

    // controller
    pub enabled: bool,
    pub role: Role,
    pub own_address: Option<(u16, AddressWidth)>,
    pub thresholds: (u8, u8),
    pub timing_history: Vec<TimingProfile>,
    pub raw: IrqSet,
    pub mask: IrqSet,
    pub rx_fifo: VecDeque<u8>,
    pub nack_source: NoAcknowledgeSource,
    pub soft_resets: usize,
    auto_setup: Option<AutoSetup>,
    auto_running: bool,
    auto_moved: usize,

    // logs and counters
    pub commands: Vec<Command>,
    pub bus_log: Vec<BusEvent>,
    pub tx_pushes: usize,
    pub rx_pops: usize,
    pub auto_done_count: usize,

    // slave role
    pub slave_transmit: bool,
    slave_tx_active: bool,
    pub slave_sent: Vec<u8>,
}

impl Model {
    fn new(device_address: u16) -> Self {
        Self {
            device_address,
            registers: [0; 256],
            pointer: 0,
            nack_addresses: 0,
            nack_data_after: None,
            stall: false,
            stall_auto: false,
            phase: Phase::Idle,
            ten_bit_selected: false,
            data_accepted: 0,
            enabled: false,
            role: Role::Master,
            own_address: None,
            thresholds: (0, 0),
            timing_history: Vec::new(),
            raw: IrqSet::empty(),
            mask: IrqSet::empty(),
            rx_fifo: VecDeque::new(),
            nack_source: NoAcknowledgeSource::Unknown,
            soft_resets: 0,
            auto_setup: None,
            auto_running: false,
            auto_moved: 0,
            commands: Vec::new(),
            bus_log: Vec::new(),
            tx_pushes: 0,
            rx_pops: 0,
            auto_done_count: 0,
            slave_transmit: false,
            slave_tx_active: false,
            slave_sent: Vec::new(),
        }
    }

    fn take_address_nack(&mut self) -> bool {
        if self.nack_addresses > 0 {
            self.nack_addresses -= 1;
            true
        } else {
            false
        }
    }

    fn address_nack(&mut self) -> bool {
        self.phase = Phase::Ignoring;
        self.nack_source = NoAcknowledgeSource::Address;
        false
    }

    fn selected(&mut self, direction: Direction) -> bool {
        self.data_accepted = 0;
        self.phase = match direction {
            Direction::Write => Phase::Writing { first: true },
            Direction::Read => Phase::Reading,
        };
        true
    }

    /// One byte after a start; returns the ACK.
    fn address_byte(&mut self, byte: u8) -> bool {
        self.bus_log.push(BusEvent::Address(byte));
        let direction = if byte & 1 == 1 {
            Direction::Read
        } else {
            Direction::Write
        };
        if byte & 0xF8 == 0xF0 {
            let high = u16::from((byte >> 1) & 0x3);
            if self.device_address >> 8 != high || self.device_address <= 0x7F {
                return self.address_nack();
            }
            if direction == Direction::Read {
                return if self.ten_bit_selected {
                    self.selected(Direction::Read)
                } else {
                    self.address_nack()
                };
            }
            if self.take_address_nack() {
                return self.address_nack();
            }
            self.phase = Phase::TenBitLow { high };
            return true;
        }
        if u16::from(byte >> 1) != self.device_address || self.take_address_nack() {
            return self.address_nack();
        }
        self.selected(direction)
    }

    fn data_byte(&mut self, byte: u8) -> bool {
        match self.phase {
            Phase::Address => self.address_byte(byte),
            Phase::TenBitLow { high } => {
                self.bus_log.push(BusEvent::Data(byte));
                if (high << 8) | u16::from(byte) == self.device_address {
                    self.ten_bit_selected = true;
                    self.selected(Direction::Write)
                } else {
                    self.address_nack()
                }
            }
            Phase::Writing { first } => {
                self.bus_log.push(BusEvent::Data(byte));
                if self
                    .nack_data_after
                    .is_some_and(|limit| self.data_accepted >= limit)
                {
                    self.nack_source = NoAcknowledgeSource::Data;
                    return false;
                }
                self.data_accepted += 1;
                if first {
                    self.pointer = byte;
                    self.phase = Phase::Writing { first: false };
                } else {
                    self.registers[usize::from(self.pointer)] = byte;
                    self.pointer = self.pointer.wrapping_add(1);
                }
                true
            }
            Phase::Idle | Phase::Reading | Phase::Ignoring => {
                self.bus_log.push(BusEvent::Data(byte));
                self.nack_source = NoAcknowledgeSource::Unknown;
                false
            }
        }
    }

    fn next_read(&mut self) -> u8 {
        if self.phase != Phase::Reading {
            return 0xFF;
        }
        let byte = self.registers[usize::from(self.pointer)];
        self.pointer = self.pointer.wrapping_add(1);
        self.bus_log.push(BusEvent::Read(byte));
        byte
    }

    fn start(&mut self, kind: StartKind) {
        match kind {
            StartKind::Start => {
                self.bus_log.push(BusEvent::Start);
                self.ten_bit_selected = false;
                self.phase = Phase::Address;
            }
            StartKind::RepeatedStart => {
                self.bus_log.push(BusEvent::Restart);
                self.phase = Phase::Address;
            }
            StartKind::None => {}
        }
    }

    fn stop(&mut self) {
        self.bus_log.push(BusEvent::Stop);
        self.phase = Phase::Idle;
        self.ten_bit_selected = false;
    }

    fn complete_auto(&mut self) {
        let Some(setup) = self.auto_setup else {
            return;
        };
        self.auto_running = false;
        if self.stall_auto {
            return;
        }
        if setup.stop {
            self.stop();
        }
        self.raw |= IrqSet::AUTO_DONE;
        self.auto_done_count += 1;
    }

    fn auto_nack(&mut self) {
        self.raw |= IrqSet::NO_ACK;
        self.auto_running = false;
        self.stop();
    }

    fn run_auto(&mut self) {
        let Some(setup) = self.auto_setup else {
            return;
        };
        self.auto_running = true;
        self.auto_moved = 0;
        self.start(setup.start);
        if setup.start != StartKind::None {
            let acked = match setup.width {
                AddressWidth::SevenBit => {
                    self.address_byte(seven_bit_header(setup.address, setup.direction))
                }
                AddressWidth::TenBit => {
                    let [header, low] = ten_bit_header(setup.address);
                    let mut acked = self.address_byte(header) && self.data_byte(low);
                    if acked && setup.direction == Direction::Read {
                        self.start(StartKind::RepeatedStart);
                        acked = self.address_byte(header | 1);
                    }
                    acked
                }
            };
            if !acked {
                self.auto_nack();
                return;
            }
        }
        if setup.direction == Direction::Read {
            for _ in 0..setup.length {
                let byte = self.next_read();
                self.rx_fifo.push_back(byte);
            }
        }
    }

    fn auto_direction(&self) -> Option<Direction> {
        self.auto_setup
            .filter(|_| self.auto_running)
            .map(|setup| setup.direction)
    }

    fn level_sources(&self) -> IrqSet {
        let mut sources = IrqSet::empty();
        let feeding = match self.auto_setup {
            Some(setup) if self.auto_running && setup.direction == Direction::Write => {
                self.auto_moved < usize::from(setup.length)
            }
            _ => false,
        };
        if feeding || (self.role == Role::Slave && self.slave_tx_active) {
            sources |= IrqSet::TX_ALMOST_EMPTY;
        }
        if !self.rx_fifo.is_empty() {
            sources |= IrqSet::RX_ALMOST_FULL;
        }
        sources
    }
}

/// Register block handle; clones share one model.
#[derive(Clone, Debug)]
pub struct MockRegisters {
    model: Arc<Mutex<Model>>,
}

impl MockRegisters {
    pub fn with_device(device_address: u16) -> Self {
        Self {
            model: Arc::new(Mutex::new(Model::new(device_address))),
        }
    }

    pub fn model(&self) -> MutexGuard<'_, Model> {
        self.model.lock().unwrap()
    }

    pub fn bus_log(&self) -> Vec<BusEvent> {
        self.model().bus_log.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.model().commands.clone()
    }

    /// External master writes `bytes` to us in slave role.
    pub fn master_write(&self, bytes: &[u8]) {
        let mut model = self.model();
        model.slave_transmit = false;
        model.slave_tx_active = false;
        model.raw |= IrqSet::ADDRESS_MATCH;
        model.rx_fifo.extend(bytes.iter().copied());
    }

    /// External master addresses us for a read.
    pub fn master_read(&self) {
        let mut model = self.model();
        model.slave_transmit = true;
        model.slave_tx_active = true;
        model.raw |= IrqSet::ADDRESS_MATCH;
    }

    pub fn master_stop(&self) {
        let mut model = self.model();
        model.slave_tx_active = false;
        model.raw |= IrqSet::STOP_DETECTED;
    }
}

impl I2cRegisters for MockRegisters {
    fn set_enabled(&mut self, enabled: bool) {
        self.model().enabled = enabled;
    }

    fn soft_reset(&mut self) {
        let mut model = self.model();
        model.soft_resets += 1;
        model.raw = IrqSet::empty();
        model.mask = IrqSet::empty();
        model.rx_fifo.clear();
        model.phase = Phase::Idle;
        model.auto_running = false;
        model.auto_setup = None;
    }

    fn set_role(&mut self, role: Role) {
        self.model().role = role;
    }

    fn program_timing(&mut self, timing: &TimingProfile) {
        self.model().timing_history.push(*timing);
    }

    fn set_own_address(&mut self, address: u16, width: AddressWidth) {
        self.model().own_address = Some((address, width));
    }

    fn set_fifo_thresholds(&mut self, tx: u8, rx: u8) {
        self.model().thresholds = (tx, rx);
    }

    fn status(&self) -> Status {
        let model = self.model();
        Status {
            busy: model.auto_running,
            tx_level: 0,
            rx_level: u8::try_from(model.rx_fifo.len()).unwrap_or(u8::MAX),
            slave_transmit: model.slave_transmit,
        }
    }

    fn nack_source(&self) -> NoAcknowledgeSource {
        self.model().nack_source
    }

    fn raw_interrupts(&self) -> IrqSet {
        let model = self.model();
        model.raw | model.level_sources()
    }

    fn clear_interrupts(&mut self, sources: IrqSet) {
        self.model().raw.remove(sources & IrqSet::LATCHED);
    }

    fn set_interrupt_mask(&mut self, sources: IrqSet) {
        self.model().mask = sources;
    }

    fn interrupt_mask(&self) -> IrqSet {
        self.model().mask
    }

    fn write_data(&mut self, byte: u8) {
        let mut model = self.model();
        if model.role == Role::Slave {
            model.slave_sent.push(byte);
            return;
        }
        if model.auto_direction() != Some(Direction::Write) {
            return;
        }
        model.tx_pushes += 1;
        if !model.data_byte(byte) {
            let tolerated = model.nack_source == NoAcknowledgeSource::Data
                && model.auto_setup.is_some_and(|setup| setup.ignore_nack);
            if !tolerated {
                model.auto_nack();
                return;
            }
            model.raw |= IrqSet::NO_ACK;
        }
        model.auto_moved += 1;
        let length = model.auto_setup.map_or(0, |setup| usize::from(setup.length));
        if model.auto_moved == length {
            model.complete_auto();
        }
    }

    fn read_data(&mut self) -> u8 {
        let mut model = self.model();
        let byte = model.rx_fifo.pop_front().unwrap_or(0);
        if model.auto_direction() == Some(Direction::Read) {
            model.rx_pops += 1;
            model.auto_moved += 1;
            let length = model.auto_setup.map_or(0, |setup| usize::from(setup.length));
            if model.auto_moved == length {
                model.complete_auto();
            }
        }
        byte
    }
}

impl ManualCommands for MockRegisters {
    fn issue(&mut self, command: Command) {
        let mut model = self.model();
        model.commands.push(command);
        let acked = match command {
            Command::Start => {
                model.start(StartKind::Start);
                true
            }
            Command::RepeatedStart => {
                model.start(StartKind::RepeatedStart);
                true
            }
            Command::Stop => {
                model.stop();
                true
            }
            Command::Send(byte) => model.data_byte(byte),
            Command::Receive { .. } => {
                let byte = model.next_read();
                model.rx_fifo.push_back(byte);
                true
            }
        };
        if !acked {
            model.raw |= IrqSet::NO_ACK;
        }
        if !model.stall {
            model.raw |= IrqSet::MANUAL_DONE;
        }
    }
}

impl AutoSequencer for MockRegisters {
    fn configure_auto(&mut self, setup: &AutoSetup) {
        self.model().auto_setup = Some(*setup);
    }

    fn set_auto_run(&mut self, run: bool) {
        let mut model = self.model();
        if run {
            model.run_auto();
        } else {
            model.auto_running = false;
        }
    }
}

/// Wall-clock time source for tests.
#[derive(Debug)]
pub struct StdClock {
    origin: std::time::Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Monotonic for StdClock {
    fn now(&self) -> Instant {
        let micros = u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX);
        Instant::from_ticks(micros)
    }

    fn relax(&self) {
        std::thread::yield_now();
    }
}

/// Records requested delays without sleeping.
#[derive(Clone, Debug, Default)]
pub struct MockDelay {
    total_ns: Arc<AtomicU64>,
}

impl MockDelay {
    pub fn total_us(&self) -> u64 {
        self.total_ns.load(Ordering::SeqCst) / 1_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.fetch_add(u64::from(ns), Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct BoardState {
    pub functions: HashMap<PinId, PinFunction>,
    pub pin_writes: Vec<(PinId, PinState)>,
    /// SDA reads low until SCL has risen this many times.
    pub sda_stuck_pulses: usize,
    pub enabled_clocks: HashSet<ClockGate>,
    pub attached: HashSet<Vector>,
    pub enabled_vectors: HashSet<Vector>,
}

#[derive(Debug)]
pub struct MockBoard {
    clock: StdClock,
    pub input_hz: AtomicU32,
    pub state: Mutex<BoardState>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            clock: StdClock::new(),
            input_hz: AtomicU32::new(INPUT_HZ),
            state: Mutex::new(BoardState::default()),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap()
    }

    pub fn vector_enabled(&self, vector: Vector) -> bool {
        self.state().enabled_vectors.contains(&vector)
    }

    pub fn resources(&self, registers: &MockRegisters) -> BusResources<MockRegisters, MockDelay> {
        BusResources {
            registers: registers.clone(),
            delay: MockDelay::default(),
            vector: VECTOR,
            clock: CLOCK_GATE,
            scl: SCL,
            sda: SDA,
        }
    }
}

impl Gpio for MockBoard {
    fn configure_function(&self, pin: PinId, function: PinFunction) {
        self.state().functions.insert(pin, function);
    }

    fn write(&self, pin: PinId, state: PinState) {
        let mut board = self.state();
        board.pin_writes.push((pin, state));
        if pin == SCL && state == PinState::High && board.sda_stuck_pulses > 0 {
            board.sda_stuck_pulses -= 1;
        }
    }

    fn read(&self, pin: PinId) -> PinState {
        if pin == SDA && self.state().sda_stuck_pulses > 0 {
            PinState::Low
        } else {
            PinState::High
        }
    }
}

impl ClockControl for MockBoard {
    fn enable(&self, gate: ClockGate) {
        self.state().enabled_clocks.insert(gate);
    }

    fn disable(&self, gate: ClockGate) {
        self.state().enabled_clocks.remove(&gate);
    }

    fn rate(&self, _gate: ClockGate) -> HertzU32 {
        HertzU32::from_raw(self.input_hz.load(Ordering::SeqCst))
    }
}

impl InterruptController for MockBoard {
    fn attach(&self, vector: Vector) {
        self.state().attached.insert(vector);
    }

    fn detach(&self, vector: Vector) {
        self.state().attached.remove(&vector);
    }

    fn enable(&self, vector: Vector) {
        self.state().enabled_vectors.insert(vector);
    }

    fn disable(&self, vector: Vector) {
        self.state().enabled_vectors.remove(&vector);
    }
}

impl Monotonic for MockBoard {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn relax(&self) {
        self.clock.relax();
    }
}

impl Board for MockBoard {
    type Registers = MockRegisters;
    type Delay = MockDelay;
}
