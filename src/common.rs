// Licensed under the Apache-2.0 license

//! Crate-wide helpers shared by the driver modules.

use core::fmt;

/// Sink for driver diagnostics.
///
/// Drivers are generic over a `Logger` so a board can route messages to a
/// UART console, a RTT channel, or nowhere at all. Methods are only called
/// from thread context; interrupt handlers record into the per-bus trace
/// buffer instead.
pub trait Logger {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    #[inline(always)]
    fn debug(&self, _args: fmt::Arguments<'_>) {}

    #[inline(always)]
    fn error(&self, _args: fmt::Arguments<'_>) {}
}
