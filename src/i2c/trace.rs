// Licensed under the Apache-2.0 license

//! Per-bus transfer trace.
//!
//! A fixed ring of the most recent protocol events, written from both the
//! manual engine and the interrupt handler. Cheap enough to leave enabled.

use heapless::{Deque, Vec};

pub const TRACE_DEPTH: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TraceKind {
    Start,
    Restart,
    Stop,
    /// `value` is the target address.
    SendAddress,
    SendByte,
    ReceiveByte,
    /// `value` is the number of bytes moved by the finished message.
    AutoDone,
    /// `value` is the raw interrupt status or a retry count.
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    pub kind: TraceKind,
    pub value: u32,
}

#[derive(Debug, Default)]
pub struct Trace {
    events: Deque<TraceEvent, TRACE_DEPTH>,
}

impl Trace {
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
        }
    }

    /// Appends an event, dropping the oldest one when full.
    pub fn record(&mut self, kind: TraceKind, value: u32) {
        if self.events.is_full() {
            self.events.pop_front();
        }
        // Cannot fail: a slot was just freed.
        let _ = self.events.push_back(TraceEvent { kind, value });
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<TraceEvent, TRACE_DEPTH> {
        self.events.iter().copied().collect()
    }
}
