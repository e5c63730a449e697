// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripherals::register_file::RegisterFile;
use crate::SimResult;
use std::any::Any;
use std::collections::VecDeque;

pub const MAILBOX_WORDS: u32 = 256;
pub const CMD_TRIGGER: u32 = 0x2C;
pub const WRITE_FIFO: u32 = 0x34;
pub const READ_FIFO: u32 = 0x38;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MailboxTrigger: u32 {
        const FLUSH_WRITE_FIFO = 1 << 1;
        const FLUSH_READ_FIFO = 1 << 2;
    }
}

/// Inter-processor mailbox: a word register file plus two byte FIFOs.
///
/// The write FIFO collects bytes firmware sends to the host; the read FIFO
/// holds bytes the host queued for firmware.
#[derive(Debug, serde::Serialize)]
pub struct Mailbox {
    regs: RegisterFile,
    write_fifo: VecDeque<u8>,
    read_fifo: VecDeque<u8>,
    flush_count: u64,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            regs: RegisterFile::new(MAILBOX_WORDS * 4),
            write_fifo: VecDeque::new(),
            read_fifo: VecDeque::new(),
            flush_count: 0,
        }
    }

    /// Queue a byte for firmware to pop from READ_FIFO.
    pub fn push_read_fifo(&mut self, byte: u8) {
        self.read_fifo.push_back(byte);
    }

    /// Bytes firmware has pushed through WRITE_FIFO, oldest first.
    pub fn write_fifo(&self) -> Vec<u8> {
        self.write_fifo.iter().copied().collect()
    }

    pub fn read_fifo_len(&self) -> usize {
        self.read_fifo.len()
    }

    pub fn preload_register(&mut self, offset: u32, value: u32) {
        self.regs.set(offset, value);
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    fn flush(&mut self) {
        self.write_fifo.clear();
        self.read_fifo.clear();
        self.flush_count += 1;
        tracing::debug!("Mailbox: FIFOs flushed");
    }
}

impl crate::Peripheral for Mailbox {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        match offset {
            WRITE_FIFO => Ok(0),
            READ_FIFO => Ok(self.read_fifo.pop_front().map(u32::from).unwrap_or(0)),
            _ => crate::Peripheral::read(&mut self.regs, offset),
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            WRITE_FIFO => {
                self.write_fifo.push_back(value as u8);
                Ok(())
            }
            READ_FIFO => {
                tracing::warn!("Mailbox: ignoring write of {:#x} to READ_FIFO", value);
                Ok(())
            }
            CMD_TRIGGER => {
                let trigger = MailboxTrigger::from_bits_retain(value);
                if trigger.intersects(MailboxTrigger::all()) {
                    self.flush();
                }
                self.regs
                    .set(CMD_TRIGGER, (trigger - MailboxTrigger::all()).bits());
                Ok(())
            }
            _ => crate::Peripheral::write(&mut self.regs, offset, value),
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Peripheral;

    #[test]
    fn test_fifos() {
        let mut mbox = Mailbox::new();
        for b in [0x101, 0x02, 0x03] {
            mbox.write(WRITE_FIFO, b).unwrap();
        }
        assert_eq!(mbox.write_fifo(), vec![0x01, 0x02, 0x03]);
        assert_eq!(mbox.read(WRITE_FIFO).unwrap(), 0);

        mbox.push_read_fifo(0xAB);
        mbox.write(READ_FIFO, 0x55).unwrap();
        assert_eq!(mbox.read_fifo_len(), 1);
        assert_eq!(mbox.read(READ_FIFO).unwrap(), 0xAB);
        assert_eq!(mbox.read(READ_FIFO).unwrap(), 0);
    }

    #[test]
    fn test_flush_empties_both_and_self_clears() {
        let mut mbox = Mailbox::new();
        mbox.write(WRITE_FIFO, 1).unwrap();
        mbox.push_read_fifo(2);
        mbox.write(CMD_TRIGGER, MailboxTrigger::FLUSH_READ_FIFO.bits() | 0x1)
            .unwrap();

        assert!(mbox.write_fifo().is_empty());
        assert_eq!(mbox.read_fifo_len(), 0);
        assert_eq!(mbox.read(CMD_TRIGGER).unwrap(), 0x1);
        assert_eq!(mbox.flush_count(), 1);

        mbox.write(CMD_TRIGGER, 0x1).unwrap();
        assert_eq!(mbox.flush_count(), 1);
    }

    #[test]
    fn test_register_file_behaviour() {
        let mut mbox = Mailbox::new();
        mbox.preload_register(0x08, 0xCAFE);
        assert_eq!(mbox.read(0x08).unwrap(), 0xCAFE);
        mbox.write(0x3FC, 7).unwrap();
        assert_eq!(mbox.read(0x3FC).unwrap(), 7);
        assert!(mbox.write(0x400, 1).is_err());
        assert!(mbox.read(0x400).is_err());

        mbox.reset();
        assert_eq!(mbox.read(0x08).unwrap(), 0);
    }
}
