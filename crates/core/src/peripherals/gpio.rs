// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::memory::FlashDevice;
use crate::{Peripheral, SimResult, SimulationError};
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const GPO_1: u32 = 0x00;
pub const GPI_1: u32 = 0x04;

bitflags::bitflags! {
    /// Named bits of the GPO_1 output word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Gpo1: u32 {
        const RST_SRST_BMC_N = 1 << 0;
        const RST_RSMRST_N = 1 << 1;
        const FM_PFR_PCH_MASTER_SEL = 1 << 2;
        const FM_PFR_BMC_MASTER_SEL = 1 << 3;
        /// Set: the SPI controller drives the BMC flash. Clear: the PCH flash.
        const SPI_MASTER_BMC_PCHN = 1 << 6;
    }
}

/// GPIO words shared with the peripherals that sample them.
#[derive(Debug, Default)]
pub struct GpioState {
    gpo: AtomicU32,
    gpi: AtomicU32,
}

impl GpioState {
    pub fn gpo(&self) -> u32 {
        self.gpo.load(Ordering::SeqCst)
    }

    pub fn set_gpo(&self, value: u32) {
        self.gpo.store(value, Ordering::SeqCst);
    }

    pub fn gpi(&self) -> u32 {
        self.gpi.load(Ordering::SeqCst)
    }

    /// Drive the input pins, as board-level logic would.
    pub fn set_inputs(&self, value: u32) {
        self.gpi.store(value, Ordering::SeqCst);
    }

    /// Flash currently routed to the SPI controller.
    pub fn selected_flash(&self) -> FlashDevice {
        if Gpo1::from_bits_retain(self.gpo()).contains(Gpo1::SPI_MASTER_BMC_PCHN) {
            FlashDevice::Bmc
        } else {
            FlashDevice::Pch
        }
    }

    pub fn reset(&self) {
        self.gpo.store(0, Ordering::SeqCst);
        self.gpi.store(0, Ordering::SeqCst);
    }
}

/// General purpose output/input block.
#[derive(Debug, Clone)]
pub struct Gpio {
    pub state: Arc<GpioState>,
}

impl Gpio {
    pub fn new(state: Arc<GpioState>) -> Self {
        Self { state }
    }
}

impl Peripheral for Gpio {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        match offset {
            GPO_1 => Ok(self.state.gpo()),
            GPI_1 => Ok(self.state.gpi()),
            _ => Err(SimulationError::protocol(format!(
                "no GPIO register at offset {:#x}",
                offset
            ))),
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            GPO_1 => {
                let old = self.state.gpo();
                if (old ^ value) & Gpo1::SPI_MASTER_BMC_PCHN.bits() != 0 {
                    tracing::debug!(
                        "SPI master now drives {:?} flash",
                        if value & Gpo1::SPI_MASTER_BMC_PCHN.bits() != 0 {
                            FlashDevice::Bmc
                        } else {
                            FlashDevice::Pch
                        }
                    );
                }
                self.state.set_gpo(value);
                Ok(())
            }
            GPI_1 => {
                tracing::warn!("Ignoring write of {:#x} to read-only GPI_1", value);
                Ok(())
            }
            _ => Err(SimulationError::protocol(format!(
                "no GPIO register at offset {:#x}",
                offset
            ))),
        }
    }

    fn reset(&mut self) {
        self.state.reset();
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "gpo_1": self.state.gpo(),
            "gpi_1": self.state.gpi(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpo_round_trip_and_selector() {
        let state = Arc::new(GpioState::default());
        let mut gpio = Gpio::new(state.clone());
        assert_eq!(state.selected_flash(), FlashDevice::Pch);

        gpio.write(GPO_1, Gpo1::SPI_MASTER_BMC_PCHN.bits() | 0x1).unwrap();
        assert_eq!(gpio.read(GPO_1).unwrap(), 0x41);
        assert_eq!(state.selected_flash(), FlashDevice::Bmc);
    }

    #[test]
    fn test_gpi_is_driven_externally() {
        let state = Arc::new(GpioState::default());
        let mut gpio = Gpio::new(state.clone());
        state.set_inputs(0b1010);
        gpio.write(GPI_1, 0xFFFF).unwrap();
        assert_eq!(gpio.read(GPI_1).unwrap(), 0b1010);
    }

    #[test]
    fn test_unknown_offset_is_fault() {
        let mut gpio = Gpio::new(Arc::default());
        assert!(matches!(
            gpio.read(0x08),
            Err(SimulationError::Protocol { .. })
        ));
    }

    #[test]
    fn test_reset_clears_both_words() {
        let state = Arc::new(GpioState::default());
        let mut gpio = Gpio::new(state.clone());
        gpio.write(GPO_1, 0xFF).unwrap();
        state.set_inputs(1);
        gpio.reset();
        assert_eq!(state.gpo(), 0);
        assert_eq!(state.gpi(), 0);
    }
}
