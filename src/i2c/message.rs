// Licensed under the Apache-2.0 license

//! Messages and transactions.

use bitflags::bitflags;

use crate::i2c::common::AddressWidth;
use crate::i2c::error::I2cError;

/// Longest message the controller's length field can express.
pub const MAX_MESSAGE_LEN: usize = 0xFFFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

impl Direction {
    /// R/W bit of an address byte.
    pub const fn rw_bit(self) -> u8 {
        match self {
            Self::Write => 0,
            Self::Read => 1,
        }
    }
}

/// Condition issued in front of a message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartKind {
    Start,
    RepeatedStart,
    /// Continue the previous message without a new address phase.
    None,
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct MessageFlags: u8 {
        /// Keep writing when a data byte is not acknowledged.
        const IGNORE_NACK = 1 << 0;
        /// Continue the previous message: no start and no address.
        const NO_START = 1 << 1;
        const TEN_BIT = 1 << 2;
        /// Issue a stop after this message even if more follow.
        const STOP = 1 << 3;
    }
}

#[derive(Debug)]
pub enum Buffer<'a> {
    Write(&'a [u8]),
    Read(&'a mut [u8]),
}

/// One transfer unit with a caller-owned buffer.
#[derive(Debug)]
pub struct Message<'a> {
    address: u16,
    flags: MessageFlags,
    buffer: Buffer<'a>,
}

impl<'a> Message<'a> {
    pub fn write(address: u16, bytes: &'a [u8]) -> Self {
        Self {
            address,
            flags: MessageFlags::empty(),
            buffer: Buffer::Write(bytes),
        }
    }

    pub fn read(address: u16, buffer: &'a mut [u8]) -> Self {
        Self {
            address,
            flags: MessageFlags::empty(),
            buffer: Buffer::Read(buffer),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    pub fn width(&self) -> AddressWidth {
        if self.flags.contains(MessageFlags::TEN_BIT) {
            AddressWidth::TenBit
        } else {
            AddressWidth::SevenBit
        }
    }

    pub fn direction(&self) -> Direction {
        match self.buffer {
            Buffer::Write(_) => Direction::Write,
            Buffer::Read(_) => Direction::Read,
        }
    }

    pub fn len(&self) -> usize {
        match &self.buffer {
            Buffer::Write(bytes) => bytes.len(),
            Buffer::Read(buffer) => buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffer(&self) -> &Buffer<'a> {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer<'a> {
        &mut self.buffer
    }

    /// Same target, so a later message may continue this one.
    fn continues(&self, previous: &Message<'_>) -> bool {
        self.address == previous.address
            && self.width() == previous.width()
            && self.direction() == previous.direction()
    }
}

/// Ordered, validated sequence of messages run under one bus acquisition.
#[derive(Debug)]
pub struct Transaction<'t, 'b> {
    messages: &'t mut [Message<'b>],
}

impl<'t, 'b> Transaction<'t, 'b> {
    /// Checks lengths, addresses and continuation flags.
    ///
    /// A leading [`MessageFlags::NO_START`] is accepted here; whether it can
    /// continue the bus state is decided when the transaction runs.
    pub fn new(messages: &'t mut [Message<'b>]) -> Result<Self, I2cError> {
        if messages.is_empty() {
            return Err(I2cError::InvalidTransaction);
        }
        let mut previous: Option<&Message<'b>> = None;
        for message in messages.iter() {
            if message.is_empty() || message.len() > MAX_MESSAGE_LEN {
                return Err(I2cError::InvalidTransaction);
            }
            if message.address > message.width().max_address() {
                return Err(I2cError::InvalidTransaction);
            }
            if let Some(previous) = previous {
                if message.flags.contains(MessageFlags::NO_START)
                    && (!message.continues(previous)
                        || previous.flags.contains(MessageFlags::STOP))
                {
                    return Err(I2cError::InvalidTransaction);
                }
            }
            previous = Some(message);
        }
        Ok(Self { messages })
    }

    pub fn messages(&self) -> &[Message<'b>] {
        &*self.messages
    }

    pub fn messages_mut(&mut self) -> &mut [Message<'b>] {
        &mut *self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn total_len(&self) -> usize {
        self.messages.iter().map(Message::len).sum()
    }

    /// A lone one-byte write: the register-select half of a write-then-read.
    pub fn is_register_select(&self) -> bool {
        match &*self.messages {
            [only] => {
                only.direction() == Direction::Write
                    && only.len() == 1
                    && !only.flags.contains(MessageFlags::STOP)
            }
            _ => false,
        }
    }
}
