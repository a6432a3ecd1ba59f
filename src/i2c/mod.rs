// Licensed under the Apache-2.0 license

//! I2C bus controller driver core.
//!
//! The layers, bottom up:
//!
//! - [`traits`]: register-level access a board supplies per controller.
//! - [`timing`]: SCL divider and phase computation.
//! - [`manual`] and [`auto`]: byte-by-byte and interrupt-driven transfer
//!   engines.
//! - [`slave`]: register-file responder for the slave role.
//! - [`registry`]: owns the bus instances, serializes transactions and
//!   dispatches interrupts.
//! - [`i2c_controller`]: embedded-hal front end over an open bus.
//!
//! Everything is `no_std` and allocation free.

pub mod auto;
mod bus;
pub mod common;
pub mod error;
pub mod i2c_controller;
pub mod manual;
pub mod message;
#[cfg(test)]
pub(crate) mod mock;
pub mod registry;
#[cfg(feature = "i2c_target")]
pub mod slave;
pub mod system_setup;
pub mod timing;
pub mod trace;
pub mod traits;

pub use common::{AddressWidth, BusConfig, BusConfigBuilder, Role, TransferMode};
pub use error::{I2cError, NackPhase};
pub use i2c_controller::I2cController;
pub use message::{Message, MessageFlags, Transaction};
pub use registry::{BusHandle, Registry};
#[cfg(feature = "i2c_target")]
pub use slave::{SlaveRegisterFile, SlaveStats};
