// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{SimResult, SimulationError};
use std::any::Any;

pub const CONTROL: u32 = 0x00;
pub const WATCHDOG: u32 = 0x04;
pub const CONFIG_SEL: u32 = 0x08;
pub const BUSY: u32 = 0x0C;
pub const RECONFIG_REASON: u32 = 0x10;
pub const CURRENT_IMAGE: u32 = 0x1C;

/// Reason code left behind by a reconfiguration into the primary image.
pub const REASON_PRIMARY_RECONFIG: u32 = 0b010 << 13;
pub const DEFAULT_BUSY_POLLS: u32 = 1;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        const TRIGGER_RECONFIG = 1 << 0;
        const RESET_WATCHDOG = 1 << 1;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigSel: u32 {
        const OVERWRITE = 1 << 0;
        /// Set: CFM1 (non-primary). Clear: CFM0 (primary).
        const SELECT = 1 << 1;
    }
}

/// Configuration flash image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum ConfigImage {
    #[default]
    Cfm0,
    Cfm1,
}

impl ConfigImage {
    fn from_select(sel: ConfigSel) -> Self {
        if sel.contains(ConfigSel::SELECT) {
            Self::Cfm1
        } else {
            Self::Cfm0
        }
    }
}

/// Dual-image reconfiguration controller.
///
/// A trigger records which image would boot next and why; no code switch
/// happens.
#[derive(Debug, serde::Serialize)]
pub struct DualConfig {
    watchdog: u32,
    config_sel: u32,
    reason: u32,
    active_image: ConfigImage,
    busy_polls: u32,
    busy_remaining: u32,
    reconfigurations: u64,
    watchdog_resets: u64,
}

impl Default for DualConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DualConfig {
    pub fn new() -> Self {
        Self::with_busy_polls(DEFAULT_BUSY_POLLS)
    }

    /// `polls` reads of BUSY return 1 after each command write.
    pub fn with_busy_polls(polls: u32) -> Self {
        Self {
            watchdog: 0,
            config_sel: 0,
            reason: 0,
            active_image: ConfigImage::Cfm0,
            busy_polls: polls,
            busy_remaining: 0,
            reconfigurations: 0,
            watchdog_resets: 0,
        }
    }

    pub fn reason(&self) -> u32 {
        self.reason
    }

    pub fn active_image(&self) -> ConfigImage {
        self.active_image
    }

    pub fn reconfigurations(&self) -> u64 {
        self.reconfigurations
    }

    pub fn watchdog_resets(&self) -> u64 {
        self.watchdog_resets
    }

    pub fn is_busy(&self) -> bool {
        self.busy_remaining > 0
    }

    #[track_caller]
    fn begin_command(&mut self, register: &str) -> SimResult<()> {
        if self.is_busy() {
            return Err(SimulationError::protocol(format!(
                "dual config {} written while busy",
                register
            )));
        }
        self.busy_remaining = self.busy_polls;
        Ok(())
    }

    fn trigger(&mut self) {
        let target = ConfigImage::from_select(ConfigSel::from_bits_truncate(self.config_sel));
        self.reason = match target {
            ConfigImage::Cfm1 => 0,
            ConfigImage::Cfm0 => REASON_PRIMARY_RECONFIG,
        };
        self.active_image = target;
        self.reconfigurations += 1;
        tracing::info!(
            "Dual config: reconfiguration into {:?} (reason {:#x})",
            target,
            self.reason
        );
    }
}

impl crate::Peripheral for DualConfig {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        match offset {
            CONTROL => Ok(0),
            WATCHDOG => Ok(self.watchdog),
            CONFIG_SEL => Ok(self.config_sel),
            BUSY => {
                let busy = self.is_busy();
                self.busy_remaining = self.busy_remaining.saturating_sub(1);
                Ok(busy as u32)
            }
            RECONFIG_REASON => Ok(self.reason),
            CURRENT_IMAGE => Ok((self.active_image == ConfigImage::Cfm1) as u32),
            _ => Err(SimulationError::protocol(format!(
                "no dual config register at offset {:#x}",
                offset
            ))),
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            CONTROL => {
                self.begin_command("CONTROL")?;
                let ctrl = Control::from_bits_truncate(value);
                if ctrl.contains(Control::RESET_WATCHDOG) {
                    self.watchdog_resets += 1;
                    tracing::trace!("Dual config: watchdog reset");
                }
                if ctrl.contains(Control::TRIGGER_RECONFIG) {
                    self.trigger();
                }
            }
            WATCHDOG => self.watchdog = value,
            CONFIG_SEL => {
                self.begin_command("CONFIG_SEL")?;
                self.config_sel = value & ConfigSel::all().bits();
            }
            BUSY | RECONFIG_REASON | CURRENT_IMAGE => {
                tracing::warn!(
                    "Dual config: ignoring write to read-only offset {:#x}",
                    offset
                );
            }
            _ => {
                return Err(SimulationError::protocol(format!(
                    "no dual config register at offset {:#x}",
                    offset
                )))
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        *self = Self::with_busy_polls(self.busy_polls);
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

    fn wait_idle(dc: &mut DualConfig) {
        while dc.read(BUSY).unwrap() != 0 {}
    }

    #[test]
    fn test_reconfig_into_secondary_clears_reason() {
        let mut dc = DualConfig::new();
        dc.write(CONFIG_SEL, (ConfigSel::SELECT | ConfigSel::OVERWRITE).bits())
            .unwrap();
        wait_idle(&mut dc);
        dc.write(CONTROL, Control::TRIGGER_RECONFIG.bits()).unwrap();
        wait_idle(&mut dc);

        assert_eq!(dc.read(RECONFIG_REASON).unwrap(), 0);
        assert_eq!(dc.read(CURRENT_IMAGE).unwrap(), 1);
        assert_eq!(dc.reconfigurations(), 1);
    }

    #[test]
    fn test_reconfig_into_primary_records_reason() {
        let mut dc = DualConfig::new();
        dc.write(CONTROL, Control::TRIGGER_RECONFIG.bits()).unwrap();
        assert_eq!(dc.read(RECONFIG_REASON).unwrap(), 0x4000);
        assert_eq!(dc.active_image(), ConfigImage::Cfm0);
    }

    #[test]
    fn test_busy_protocol() {
        let mut dc = DualConfig::with_busy_polls(2);
        assert_eq!(dc.read(BUSY).unwrap(), 0);
        dc.write(CONFIG_SEL, 0).unwrap();
        assert!(matches!(
            dc.write(CONTROL, Control::TRIGGER_RECONFIG.bits()),
            Err(SimulationError::Protocol { .. })
        ));
        assert_eq!(dc.read(BUSY).unwrap(), 1);
        assert_eq!(dc.read(BUSY).unwrap(), 1);
        assert_eq!(dc.read(BUSY).unwrap(), 0);
        dc.write(CONTROL, Control::RESET_WATCHDOG.bits()).unwrap();
        assert_eq!(dc.watchdog_resets(), 1);
        assert_eq!(dc.reconfigurations(), 0);
    }

    #[test]
    fn test_watchdog_is_plain_and_reset_restores_defaults() {
        let mut dc = DualConfig::new();
        dc.write(WATCHDOG, 0x1234).unwrap();
        assert_eq!(dc.read(WATCHDOG).unwrap(), 0x1234);
        assert_eq!(dc.read(CONTROL).unwrap(), 0);
        dc.write(CONFIG_SEL, ConfigSel::SELECT.bits()).unwrap();
        wait_idle(&mut dc);
        dc.write(CONTROL, Control::TRIGGER_RECONFIG.bits()).unwrap();

        dc.reset();
        assert_eq!(dc.read(WATCHDOG).unwrap(), 0);
        assert_eq!(dc.read(CURRENT_IMAGE).unwrap(), 0);
        assert_eq!(dc.read(BUSY).unwrap(), 0);
        assert_eq!(dc.reconfigurations(), 0);
    }
}
