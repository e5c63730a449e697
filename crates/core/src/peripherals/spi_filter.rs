// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! SPI flash controller, write-enable maps and the memory-mapped flash window.
//!
//! All three views share the BMC and PCH flash images. Which image the
//! controller and the window address is chosen by the GPIO
//! `SPI_MASTER_BMC_PCHN` output bit.

use crate::memory::{FlashDevice, SharedFlash};
use crate::peripherals::gpio::GpioState;
use crate::{SimResult, SimulationError};
use std::any::Any;
use std::sync::Arc;

pub const CONTROL: u32 = 0x00;
pub const CLK_BAUD: u32 = 0x04;
pub const CS_DELAY: u32 = 0x08;
pub const READ_CAPTURE: u32 = 0x0C;
pub const PROTOCOLS: u32 = 0x10;
pub const READ_INSTR: u32 = 0x14;
pub const WRITE_INSTR: u32 = 0x18;
pub const CMD_SETTING: u32 = 0x1C;
pub const CMD_CTRL: u32 = 0x20;
pub const CMD_ADDRESS: u32 = 0x24;
pub const WRITE_DATA0: u32 = 0x28;
pub const WRITE_DATA1: u32 = 0x2C;
pub const READ_DATA0: u32 = 0x30;
pub const READ_DATA1: u32 = 0x34;

const REG_COUNT: usize = (READ_DATA1 / 4 + 1) as usize;

pub const CMD_START: u32 = 1;

pub const OP_SECTOR_ERASE_4K: u8 = 0x20;
pub const OP_SECTOR_ERASE_64K: u8 = 0xD8;
pub const OP_WRITE_ENABLE: u8 = 0x06;
pub const OP_WRITE_DISABLE: u8 = 0x04;
pub const OP_READ_STATUS: u8 = 0x05;
pub const OP_READ_ID: u8 = 0x9F;

pub const SECTOR_4K: usize = 0x1000;
pub const SECTOR_64K: usize = 0x1_0000;

/// JEDEC id returned by `OP_READ_ID`, manufacturer byte lowest.
pub const JEDEC_ID: u32 = 0x0019_40EF;

bitflags::bitflags! {
    /// Flash device status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FlashStatus: u8 {
        const WIP = 0x01;
        const WEL = 0x02;
        const BP0 = 0x04;
        const BP1 = 0x08;
        const BP2 = 0x10;
        const BP3 = 0x20;
        const TB = 0x40;
        const SRWD = 0x80;
    }
}

/// Generic serial flash interface controller.
#[derive(Debug, serde::Serialize)]
pub struct SpiController {
    regs: [u32; REG_COUNT],
    #[serde(skip)]
    status: [FlashStatus; 2],
    erase_4k_count: u64,
    erase_64k_count: u64,
    #[serde(skip)]
    flash: SharedFlash,
    #[serde(skip)]
    gpio: Arc<GpioState>,
}

impl SpiController {
    pub fn new(flash: SharedFlash, gpio: Arc<GpioState>) -> Self {
        Self {
            regs: [0; REG_COUNT],
            status: [FlashStatus::empty(); 2],
            erase_4k_count: 0,
            erase_64k_count: 0,
            flash,
            gpio,
        }
    }

    pub fn erase_4k_count(&self) -> u64 {
        self.erase_4k_count
    }

    pub fn erase_64k_count(&self) -> u64 {
        self.erase_64k_count
    }

    pub fn status(&self, device: FlashDevice) -> FlashStatus {
        self.status[device.index()]
    }

    fn reg(&self, offset: u32) -> u32 {
        self.regs[(offset / 4) as usize]
    }

    fn set_reg(&mut self, offset: u32, value: u32) {
        self.regs[(offset / 4) as usize] = value;
    }

    fn erase(&mut self, device: FlashDevice, len: usize) -> SimResult<()> {
        let addr = self.reg(CMD_ADDRESS) as usize;
        if !self.flash.lock().image_mut(device).erase(addr, len) {
            return Err(SimulationError::protocol(format!(
                "{:#x} byte erase at {:#x} is outside the {:?} flash",
                len, addr, device
            )));
        }
        self.status[device.index()].remove(FlashStatus::WEL);
        tracing::info!("SPI: erased {:#x} bytes at {:#x} of {:?} flash", len, addr, device);
        Ok(())
    }

    fn execute(&mut self) -> SimResult<()> {
        let opcode = (self.reg(CMD_SETTING) & 0xFF) as u8;
        let device = self.gpio.selected_flash();
        let status = &mut self.status[device.index()];

        match opcode {
            OP_SECTOR_ERASE_4K => {
                self.erase(device, SECTOR_4K)?;
                self.erase_4k_count += 1;
            }
            OP_SECTOR_ERASE_64K => {
                self.erase(device, SECTOR_64K)?;
                self.erase_64k_count += 1;
            }
            OP_WRITE_ENABLE => status.insert(FlashStatus::WEL),
            OP_WRITE_DISABLE => status.remove(FlashStatus::WEL),
            OP_READ_STATUS => {
                let bits = status.bits() as u32;
                self.set_reg(READ_DATA0, bits);
            }
            OP_READ_ID => self.set_reg(READ_DATA0, JEDEC_ID),
            other => {
                tracing::debug!("SPI: opcode {:#04x} has no effect on {:?} flash", other, device);
            }
        }
        Ok(())
    }
}

impl crate::Peripheral for SpiController {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        match offset {
            CMD_CTRL => Ok(0),
            o if o <= READ_DATA1 => Ok(self.reg(o)),
            _ => Err(SimulationError::protocol(format!(
                "no SPI controller register at offset {:#x}",
                offset
            ))),
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            CMD_CTRL => {
                if value & CMD_START != 0 {
                    self.execute()?;
                }
            }
            READ_DATA0 | READ_DATA1 => {
                tracing::warn!("SPI: ignoring write to read-only offset {:#x}", offset);
            }
            o if o <= READ_DATA1 => self.set_reg(o, value),
            _ => {
                return Err(SimulationError::protocol(format!(
                    "no SPI controller register at offset {:#x}",
                    offset
                )))
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.regs = [0; REG_COUNT];
        self.status = [FlashStatus::empty(); 2];
        self.erase_4k_count = 0;
        self.erase_64k_count = 0;
        self.flash.lock().reset();
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

/// Per-page write permission bitmap: one bit per 4 KB flash page.
///
/// Firmware programs it to describe which pages the host may write; the
/// bits are recorded, not enforced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WriteEnableMap {
    device: FlashDevice,
    #[serde(skip)]
    words: Vec<u32>,
}

impl WriteEnableMap {
    pub fn new(device: FlashDevice, span: u32) -> Self {
        Self {
            device,
            words: vec![0; (span / 4) as usize],
        }
    }

    pub fn device(&self) -> FlashDevice {
        self.device
    }

    pub fn is_page_writable(&self, flash_offset: usize) -> bool {
        let page = flash_offset / SECTOR_4K;
        self.words
            .get(page / 32)
            .is_some_and(|w| w & (1 << (page % 32)) != 0)
    }

    #[track_caller]
    fn word(&mut self, offset: u32) -> SimResult<&mut u32> {
        let span = self.words.len() * 4;
        self.words.get_mut((offset / 4) as usize).ok_or_else(|| {
            SimulationError::protocol(format!(
                "offset {:#x} outside {:#x} byte write-enable map",
                offset, span
            ))
        })
    }
}

impl crate::Peripheral for WriteEnableMap {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        Ok(*self.word(offset)?)
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        *self.word(offset)? = value;
        Ok(())
    }

    fn reset(&mut self) {
        self.words.fill(0);
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        let writable = self.words.iter().map(|w| w.count_ones()).sum::<u32>();
        serde_json::json!({
            "device": self.device,
            "writable_pages": writable,
        })
    }
}

/// Memory-mapped view of the selected flash image.
///
/// Reads return little-endian words; writes program with NOR semantics.
#[derive(Debug)]
pub struct FlashWindow {
    flash: SharedFlash,
    gpio: Arc<GpioState>,
}

impl FlashWindow {
    pub fn new(flash: SharedFlash, gpio: Arc<GpioState>) -> Self {
        Self { flash, gpio }
    }
}

impl crate::Peripheral for FlashWindow {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        let device = self.gpio.selected_flash();
        self.flash
            .lock()
            .image(device)
            .read_u32(offset as usize)
            .ok_or_else(|| {
                SimulationError::protocol(format!(
                    "flash window read at {:#x} beyond the {:?} image",
                    offset, device
                ))
            })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        let device = self.gpio.selected_flash();
        if !self
            .flash
            .lock()
            .image_mut(device)
            .program_u32(offset as usize, value)
        {
            return Err(SimulationError::protocol(format!(
                "flash window write at {:#x} beyond the {:?} image",
                offset, device
            )));
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({ "selected": self.gpio.selected_flash() })
    }
}
