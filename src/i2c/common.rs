// Licensed under the Apache-2.0 license

//! Common types and configuration shared by the I2C driver modules.

use fugit::{HertzU32, MicrosDurationU32, RateExtU32};

/// Upper bound of the standard speed class.
pub const STANDARD_MODE_MAX_HZ: u32 = 100_000;
/// Upper bound of the fast speed class, and the fastest rate the controller
/// can start a transfer at without a speed negotiation.
pub const FAST_MODE_MAX_HZ: u32 = 400_000;

pub const DEFAULT_RETRY_COUNT: u8 = 3;
pub const DEFAULT_TIMEOUT_MS: u32 = 500;

/// Bit periods per byte on the wire, ACK included.
const BITS_PER_BYTE: u32 = 9;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressWidth {
    SevenBit,
    TenBit,
}

impl AddressWidth {
    pub const fn max_address(self) -> u16 {
        match self {
            Self::SevenBit => 0x7F,
            Self::TenBit => 0x3FF,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpeedClass {
    /// Up to 100 kHz.
    Standard,
    /// Up to 400 kHz.
    Fast,
    /// Above 400 kHz; needs a speed negotiation before every transfer.
    FastPlus,
}

impl SpeedClass {
    pub fn from_frequency(frequency: HertzU32) -> Self {
        let hz = frequency.raw();
        if hz <= STANDARD_MODE_MAX_HZ {
            Self::Standard
        } else if hz <= FAST_MODE_MAX_HZ {
            Self::Fast
        } else {
            Self::FastPlus
        }
    }
}

/// How the controller sequences a master transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// Software issues and polls one bus command at a time.
    Manual,
    /// The controller runs each message autonomously; the interrupt handler
    /// feeds and drains the FIFOs.
    Auto,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    AddressOutOfRange,
    ZeroFrequency,
    ZeroTimeout,
}

/// Per-open bus configuration.
///
/// Never mutated in place: frequency and address changes build a new value
/// and swap it in while the bus lock is held.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub role: Role,
    /// Own address in slave role, default target address in master role.
    pub address: u16,
    pub address_width: AddressWidth,
    pub frequency: HertzU32,
    pub retry_count: u8,
    pub timeout: MicrosDurationU32,
    /// Mode used by the convenience `read`/`write`/`write_read` calls.
    pub transfer_mode: TransferMode,
}

impl BusConfig {
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::new()
    }

    pub fn speed_class(&self) -> SpeedClass {
        SpeedClass::from_frequency(self.frequency)
    }

    /// Time for one byte on the wire, doubled for margin.
    pub fn byte_time(&self) -> MicrosDurationU32 {
        let hz = self.frequency.raw().max(1);
        let micros = (BITS_PER_BYTE * 1_000_000).div_ceil(hz);
        MicrosDurationU32::micros(micros.saturating_mul(2))
    }

    /// Bound for a single manual-mode command.
    pub fn command_timeout(&self) -> MicrosDurationU32 {
        MicrosDurationU32::micros(self.byte_time().ticks().saturating_mul(10))
    }

    /// Bound for an auto-mode job moving `bytes` bytes.
    pub fn completion_timeout(&self, bytes: usize) -> MicrosDurationU32 {
        let bytes = u32::try_from(bytes).unwrap_or(u32::MAX);
        let transfer = self.byte_time().ticks().saturating_mul(bytes);
        MicrosDurationU32::micros(self.timeout.ticks().saturating_add(transfer))
    }

    /// Pause between address retries.
    pub fn retry_pause(&self) -> MicrosDurationU32 {
        MicrosDurationU32::micros(self.timeout.ticks() / 2)
    }

    /// Copy of this configuration running at `frequency`.
    pub fn with_frequency(&self, frequency: HertzU32) -> Result<Self, ConfigurationError> {
        BusConfigBuilder::from(*self).frequency(frequency).build()
    }

    /// Copy of this configuration using a different address.
    pub fn with_address(
        &self,
        address: u16,
        width: AddressWidth,
    ) -> Result<Self, ConfigurationError> {
        BusConfigBuilder::from(*self)
            .address(address)
            .address_width(width)
            .build()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            role: Role::Master,
            address: 0,
            address_width: AddressWidth::SevenBit,
            frequency: STANDARD_MODE_MAX_HZ.Hz(),
            retry_count: DEFAULT_RETRY_COUNT,
            timeout: MicrosDurationU32::millis(DEFAULT_TIMEOUT_MS),
            transfer_mode: TransferMode::Manual,
        }
    }
}

pub struct BusConfigBuilder {
    config: BusConfig,
}

impl Default for BusConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BusConfig> for BusConfigBuilder {
    fn from(config: BusConfig) -> Self {
        Self { config }
    }
}

impl BusConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
        }
    }
    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.config.role = role;
        self
    }
    #[must_use]
    pub fn address(mut self, address: u16) -> Self {
        self.config.address = address;
        self
    }
    #[must_use]
    pub fn address_width(mut self, width: AddressWidth) -> Self {
        self.config.address_width = width;
        self
    }
    #[must_use]
    pub fn frequency(mut self, frequency: HertzU32) -> Self {
        self.config.frequency = frequency;
        self
    }
    #[must_use]
    pub fn retry_count(mut self, count: u8) -> Self {
        self.config.retry_count = count;
        self
    }
    #[must_use]
    pub fn timeout(mut self, timeout: MicrosDurationU32) -> Self {
        self.config.timeout = timeout;
        self
    }
    #[must_use]
    pub fn transfer_mode(mut self, mode: TransferMode) -> Self {
        self.config.transfer_mode = mode;
        self
    }

    pub fn build(self) -> Result<BusConfig, ConfigurationError> {
        let config = self.config;
        if config.address > config.address_width.max_address() {
            return Err(ConfigurationError::AddressOutOfRange);
        }
        if config.frequency.raw() == 0 {
            return Err(ConfigurationError::ZeroFrequency);
        }
        if config.timeout.ticks() == 0 {
            return Err(ConfigurationError::ZeroTimeout);
        }
        Ok(config)
    }
}
