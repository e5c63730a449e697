// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Serial NVRAM behind an I2C master command FIFO.

use crate::{SimResult, SimulationError};
use std::any::Any;
use std::collections::VecDeque;

pub const TFR_CMD: u32 = 0x00;
pub const RX_DATA: u32 = 0x04;
pub const CTRL: u32 = 0x08;
pub const ISER: u32 = 0x0C;
pub const ISR: u32 = 0x10;
pub const STATUS: u32 = 0x14;
pub const TFR_CMD_FIFO_LVL: u32 = 0x18;
pub const RX_DATA_FIFO_LVL: u32 = 0x1C;
pub const SCL_LOW: u32 = 0x20;
pub const SCL_HIGH: u32 = 0x24;
pub const SDA_HOLD: u32 = 0x28;

pub const NVRAM_SIZE: usize = 1024;
pub const DEVICE_WRITE: u8 = 0xDC;
pub const DEVICE_READ: u8 = 0xDD;

bitflags::bitflags! {
    /// Control bits of a TFR_CMD word; bits [7:0] carry the payload byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransferCmd: u32 {
        const STOP = 1 << 8;
        const START = 1 << 9;
    }
}

impl TransferCmd {
    /// Pack a command word the way firmware writes it to TFR_CMD.
    pub fn word(self, byte: u8) -> u32 {
        self.bits() | byte as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NvramState {
    Idle,
    AddressHigh,
    AddressLow,
    WriteData,
    ReadData,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
struct TimingRegs {
    ctrl: u32,
    iser: u32,
    isr: u32,
    scl_low: u32,
    scl_high: u32,
    sda_hold: u32,
}

#[derive(Debug, serde::Serialize)]
pub struct Nvram {
    state: NvramState,
    address: u16,
    #[serde(skip)]
    commands: VecDeque<u32>,
    rx: VecDeque<u8>,
    #[serde(skip)]
    store: Box<[u8; NVRAM_SIZE]>,
    regs: TimingRegs,
    commands_processed: u64,
}

impl Default for Nvram {
    fn default() -> Self {
        Self::new()
    }
}

impl Nvram {
    pub fn new() -> Self {
        Self {
            state: NvramState::Idle,
            address: 0,
            commands: VecDeque::new(),
            rx: VecDeque::new(),
            store: Box::new([0; NVRAM_SIZE]),
            regs: TimingRegs::default(),
            commands_processed: 0,
        }
    }

    /// Copy `bytes` into the backing store starting at `addr`, wrapping at
    /// the end of the device.
    pub fn preload(&mut self, addr: u16, bytes: &[u8]) {
        let mut at = addr as usize % NVRAM_SIZE;
        for &b in bytes {
            self.store[at] = b;
            at = (at + 1) % NVRAM_SIZE;
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.store[..]
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn state(&self) -> NvramState {
        self.state
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands_processed
    }

    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    fn advance(&mut self) {
        self.address = (self.address + 1) % NVRAM_SIZE as u16;
    }

    fn drain(&mut self) {
        while let Some(word) = self.commands.pop_front() {
            self.process(word);
        }
    }

    fn process(&mut self, word: u32) {
        let cmd = TransferCmd::from_bits_truncate(word);
        let byte = (word & 0xFF) as u8;
        let start = cmd.contains(TransferCmd::START);
        let prev = self.state;

        self.state = match (self.state, start, byte) {
            (NvramState::Idle, true, DEVICE_WRITE) => NvramState::AddressHigh,
            (NvramState::Idle, true, DEVICE_READ) => NvramState::ReadData,
            (NvramState::Idle, _, _) => {
                tracing::warn!("NVRAM: NACK for command {:#05x} while idle", word);
                NvramState::Idle
            }
            (NvramState::AddressHigh, _, b) => {
                self.address = ((b & 0x3) as u16) << 8;
                NvramState::AddressLow
            }
            (NvramState::AddressLow, _, b) => {
                self.address |= b as u16;
                NvramState::WriteData
            }
            (NvramState::WriteData | NvramState::ReadData, true, DEVICE_WRITE) => {
                NvramState::AddressHigh
            }
            (NvramState::WriteData | NvramState::ReadData, true, DEVICE_READ) => {
                NvramState::ReadData
            }
            (NvramState::WriteData, _, b) => {
                self.store[self.address as usize] = b;
                self.advance();
                NvramState::WriteData
            }
            (NvramState::ReadData, _, _) => {
                self.rx.push_back(self.store[self.address as usize]);
                self.advance();
                NvramState::ReadData
            }
        };

        if cmd.contains(TransferCmd::STOP) {
            self.state = NvramState::Idle;
        }
        if self.state != prev {
            tracing::debug!("NVRAM: {:?} -> {:?}", prev, self.state);
        }
        self.commands_processed += 1;
    }
}

impl crate::Peripheral for Nvram {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        match offset {
            TFR_CMD => Err(SimulationError::protocol("NVRAM TFR_CMD is write-only")),
            RX_DATA => self
                .rx
                .pop_front()
                .map(u32::from)
                .ok_or_else(|| SimulationError::protocol("NVRAM RX_DATA read with empty FIFO")),
            CTRL => Ok(self.regs.ctrl),
            ISER => Ok(self.regs.iser),
            ISR => Ok(self.regs.isr),
            // Commands drain synchronously: never busy, command FIFO always empty.
            STATUS | TFR_CMD_FIFO_LVL => Ok(0),
            RX_DATA_FIFO_LVL => Ok(self.rx.len() as u32),
            SCL_LOW => Ok(self.regs.scl_low),
            SCL_HIGH => Ok(self.regs.scl_high),
            SDA_HOLD => Ok(self.regs.sda_hold),
            _ => Err(SimulationError::protocol(format!(
                "no NVRAM register at offset {:#x}",
                offset
            ))),
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            TFR_CMD => {
                self.commands.push_back(value);
                self.drain();
            }
            RX_DATA => return Err(SimulationError::protocol("NVRAM RX_DATA is read-only")),
            CTRL => self.regs.ctrl = value,
            ISER => self.regs.iser = value,
            ISR => self.regs.isr = value,
            STATUS | TFR_CMD_FIFO_LVL | RX_DATA_FIFO_LVL => {
                tracing::warn!("NVRAM: ignoring write to read-only offset {:#x}", offset);
            }
            SCL_LOW => self.regs.scl_low = value,
            SCL_HIGH => self.regs.scl_high = value,
            SDA_HOLD => self.regs.sda_hold = value,
            _ => {
                return Err(SimulationError::protocol(format!(
                    "no NVRAM register at offset {:#x}",
                    offset
                )))
            }
        }
        Ok(())
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

    fn cmd(nvram: &mut Nvram, flags: TransferCmd, byte: u8) {
        nvram.write(TFR_CMD, flags.word(byte)).unwrap();
    }

    fn set_address(nvram: &mut Nvram, addr: u16) {
        cmd(nvram, TransferCmd::START, DEVICE_WRITE);
        cmd(nvram, TransferCmd::empty(), (addr >> 8) as u8);
        cmd(nvram, TransferCmd::empty(), addr as u8);
    }

    #[test]
    fn test_write_then_random_read() {
        let mut nvram = Nvram::new();
        set_address(&mut nvram, 0x123);
        assert_eq!(nvram.state(), NvramState::WriteData);
        cmd(&mut nvram, TransferCmd::empty(), 0xAA);
        cmd(&mut nvram, TransferCmd::STOP, 0xBB);
        assert_eq!(nvram.state(), NvramState::Idle);
        assert_eq!(&nvram.contents()[0x123..0x125], &[0xAA, 0xBB]);

        set_address(&mut nvram, 0x123);
        cmd(&mut nvram, TransferCmd::START, DEVICE_READ);
        cmd(&mut nvram, TransferCmd::empty(), 0);
        cmd(&mut nvram, TransferCmd::STOP, 0);
        assert_eq!(nvram.read(RX_DATA_FIFO_LVL).unwrap(), 2);
        assert_eq!(nvram.read(RX_DATA).unwrap(), 0xAA);
        assert_eq!(nvram.read(RX_DATA).unwrap(), 0xBB);
        assert!(nvram.read(RX_DATA).is_err());
        assert_eq!(nvram.commands_processed(), 11);
    }

    #[test]
    fn test_address_is_ten_bits_and_wraps() {
        let mut nvram = Nvram::new();
        set_address(&mut nvram, 0x3FF);
        cmd(&mut nvram, TransferCmd::empty(), 1);
        cmd(&mut nvram, TransferCmd::STOP, 2);
        assert_eq!(nvram.contents()[0x3FF], 1);
        assert_eq!(nvram.contents()[0], 2);
        assert_eq!(nvram.address(), 1);

        // Upper bits of the high address byte are dropped.
        set_address(&mut nvram, 0xFF10);
        assert_eq!(nvram.address(), 0x310);
    }

    #[test]
    fn test_idle_nack_stays_idle() {
        let mut nvram = Nvram::new();
        cmd(&mut nvram, TransferCmd::empty(), DEVICE_WRITE);
        assert_eq!(nvram.state(), NvramState::Idle);
        cmd(&mut nvram, TransferCmd::START, 0xA0);
        assert_eq!(nvram.state(), NvramState::Idle);
        assert!(nvram.contents().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_from_preloaded_store() {
        let mut nvram = Nvram::new();
        nvram.preload(0x10, b"pfr");
        set_address(&mut nvram, 0x10);
        cmd(&mut nvram, TransferCmd::START, DEVICE_READ);
        for _ in 0..3 {
            cmd(&mut nvram, TransferCmd::empty(), 0);
        }
        let bytes: Vec<u8> = (0..3).map(|_| nvram.read(RX_DATA).unwrap() as u8).collect();
        assert_eq!(bytes, b"pfr");
    }

    #[test]
    fn test_register_access_rules() {
        let mut nvram = Nvram::new();
        assert!(nvram.read(TFR_CMD).is_err());
        assert!(nvram.write(RX_DATA, 1).is_err());
        nvram.write(SCL_LOW, 0x40).unwrap();
        nvram.write(CTRL, 0x1).unwrap();
        assert_eq!(nvram.read(SCL_LOW).unwrap(), 0x40);
        assert_eq!(nvram.read(CTRL).unwrap(), 0x1);
        assert_eq!(nvram.read(STATUS).unwrap(), 0);
        assert_eq!(nvram.read(TFR_CMD_FIFO_LVL).unwrap(), 0);
        assert!(nvram.read(0x2C).is_err());
    }

    #[test]
    fn test_reset_clears_store_and_fifo() {
        let mut nvram = Nvram::new();
        nvram.preload(0, &[1, 2, 3]);
        cmd(&mut nvram, TransferCmd::START, DEVICE_READ);
        cmd(&mut nvram, TransferCmd::empty(), 0);
        nvram.reset();
        assert_eq!(nvram.state(), NvramState::Idle);
        assert_eq!(nvram.rx_len(), 0);
        assert!(nvram.contents().iter().all(|&b| b == 0));
    }
}
