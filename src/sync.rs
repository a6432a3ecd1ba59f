// Licensed under the Apache-2.0 license

//! Synchronization shared between thread and interrupt context.
//!
//! - [`BusLock`]: FIFO-fair bus lock over [`spin::mutex::TicketMutex`] with
//!   an optional acquisition budget.
//! - [`IrqShared`]: state owned jointly by a thread and one interrupt
//!   vector, kept in an `embassy-sync` critical-section mutex. The thread
//!   side lends the state out while the vector is masked; the handler side
//!   only sees it when it is not on loan.
//! - [`Completion`]: `embassy-sync` signal awaited with a deadline.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use spin::mutex::{TicketMutex, TicketMutexGuard};

use crate::platform::{Deadline, Monotonic};

/// Bus lock. Unbudgeted waiters are served in arrival order.
pub struct BusLock<T> {
    inner: TicketMutex<T>,
}

impl<T> BusLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: TicketMutex::new(value),
        }
    }

    /// Blocks until the lock is held.
    pub fn lock(&self) -> TicketMutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Polls for the lock until `deadline`. Returns `None` when the budget
    /// ran out. A budgeted caller never takes a ticket, so giving up
    /// leaves the queue untouched.
    pub fn lock_until<M: Monotonic + ?Sized>(
        &self,
        clock: &M,
        deadline: Deadline,
    ) -> Option<TicketMutexGuard<'_, T>> {
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return Some(guard);
            }
            if deadline.expired(clock) {
                return None;
            }
            clock.relax();
        }
    }
}

enum Slot<T> {
    Vacant,
    Ready(T),
    OnLoan,
}

/// State owned jointly by a thread and one interrupt vector.
pub struct IrqShared<T> {
    slot: Mutex<CriticalSectionRawMutex, RefCell<Slot<T>>>,
}

impl<T> IrqShared<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(Slot::Vacant)),
        }
    }

    /// Installs `value`, or empties the slot with `None`.
    pub fn install(&self, value: Option<T>) {
        let slot = value.map_or(Slot::Vacant, Slot::Ready);
        self.slot.lock(|cell| *cell.borrow_mut() = slot);
    }

    /// Takes the state out for thread-side use. Waits while another thread
    /// has it on loan; `None` when the slot is vacant.
    pub fn lend<M: Monotonic + ?Sized>(&self, clock: &M) -> Option<T> {
        loop {
            let taken = self.slot.lock(|cell| {
                let mut slot = cell.borrow_mut();
                match core::mem::replace(&mut *slot, Slot::OnLoan) {
                    Slot::Ready(value) => Some(Some(value)),
                    Slot::Vacant => {
                        *slot = Slot::Vacant;
                        Some(None)
                    }
                    Slot::OnLoan => None,
                }
            });
            match taken {
                Some(value) => return value,
                None => clock.relax(),
            }
        }
    }

    /// Hands lent state back.
    pub fn restore(&self, value: T) {
        self.install(Some(value));
    }

    /// Interrupt-side access. Runs `f` inside the critical section, and only
    /// when the state is present and not on loan.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.slot.lock(|cell| match &mut *cell.borrow_mut() {
            Slot::Ready(value) => Some(f(value)),
            Slot::Vacant | Slot::OnLoan => None,
        })
    }
}

impl<T> Default for IrqShared<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion raised from interrupt context.
pub struct Completion {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    pub fn signal(&self) {
        self.signal.signal(());
    }

    pub fn reset(&self) {
        self.signal.reset();
    }

    /// Waits for a signal, consuming it. Returns `false` on timeout.
    pub fn wait<M: Monotonic + ?Sized>(&self, clock: &M, deadline: Deadline) -> bool {
        loop {
            if self.signal.try_take().is_some() {
                return true;
            }
            if deadline.expired(clock) {
                return self.signal.try_take().is_some();
            }
            clock.relax();
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
