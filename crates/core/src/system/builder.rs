// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::address_map::layout;
use crate::bus::SystemBus;
use crate::clock::{Clock, WallClock};
use crate::memory::{FlashDevice, FlashDevices, SharedFlash};
use crate::peripherals::crypto::CryptoEngine;
use crate::peripherals::dual_config::DualConfig;
use crate::peripherals::gpio::{Gpio, GpioState};
use crate::peripherals::mailbox::Mailbox;
use crate::peripherals::nvram::Nvram;
use crate::peripherals::spi_filter::{FlashWindow, SpiController, WriteEnableMap};
use crate::peripherals::timer::TimerBank;
use crate::FaultPolicy;
use pfrsim_config::PlatformManifest;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// State shared between peripherals that tests drive directly.
#[derive(Debug, Clone)]
pub struct PlatformHandles {
    pub gpio: Arc<GpioState>,
    pub flash: SharedFlash,
    pub clock: Arc<dyn Clock>,
}

/// A fully mapped PFR platform.
#[derive(Debug)]
pub struct Platform {
    pub bus: SystemBus,
    pub handles: PlatformHandles,
}

/// Assembles the standard PFR peripheral set at the fixed memory map.
///
/// Settings come from a [`PlatformManifest`]; explicit builder calls take
/// precedence over the manifest.
#[derive(Debug, Default)]
pub struct PlatformBuilder {
    manifest: PlatformManifest,
    clock: Option<Arc<dyn Clock>>,
    fault_policy: Option<FaultPolicy>,
    flash_sizes: Option<(usize, usize)>,
}

impl PlatformBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manifest(manifest: PlatformManifest) -> Self {
        Self {
            manifest,
            ..Self::default()
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = Some(policy);
        self
    }

    /// Override the flash image sizes in bytes.
    pub fn flash_sizes(mut self, bmc: usize, pch: usize) -> Self {
        self.flash_sizes = Some((bmc, pch));
        self
    }

    pub fn build(self) -> anyhow::Result<Platform> {
        let manifest = self.manifest;
        let (bmc_size, pch_size) = match self.flash_sizes {
            Some(sizes) => sizes,
            None => (manifest.bmc_flash_bytes()?, manifest.pch_flash_bytes()?),
        };
        let window = layout::FLASH_WINDOW.span as usize;
        if bmc_size > window || pch_size > window {
            anyhow::bail!(
                "flash images ({:#x}, {:#x} bytes) exceed the {:#x} byte flash window",
                bmc_size,
                pch_size,
                window
            );
        }

        let policy = self
            .fault_policy
            .unwrap_or_else(|| manifest.resolved_fault_policy());
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(WallClock::new()) as Arc<dyn Clock>);
        let gpio = Arc::new(GpioState::default());
        let flash = SharedFlash::new(FlashDevices::new(bmc_size, pch_size));

        let mut bus = SystemBus::with_fault_policy(policy);
        bus.add_peripheral(
            layout::GPIO_NAME,
            layout::GPIO,
            Box::new(Gpio::new(gpio.clone())),
        )?;
        bus.add_peripheral(
            layout::TIMER_BANK_NAME,
            layout::TIMER_BANK,
            Box::new(TimerBank::with_tick(
                clock.clone(),
                Duration::from_millis(manifest.timer.tick_ms),
            )),
        )?;
        bus.add_peripheral(
            layout::DUAL_CONFIG_NAME,
            layout::DUAL_CONFIG,
            Box::new(DualConfig::with_busy_polls(manifest.dual_config.busy_polls)),
        )?;
        bus.add_peripheral(
            layout::CRYPTO_NAME,
            layout::CRYPTO,
            Box::new(CryptoEngine::with_done_latency(
                manifest.crypto.done_latency_reads,
            )),
        )?;
        bus.add_peripheral(layout::NVRAM_NAME, layout::NVRAM, Box::new(Nvram::new()))?;
        bus.add_peripheral(
            layout::SPI_CONTROLLER_NAME,
            layout::SPI_CONTROLLER,
            Box::new(SpiController::new(flash.clone(), gpio.clone())),
        )?;
        bus.add_peripheral(
            layout::MAILBOX_NAME,
            layout::MAILBOX,
            Box::new(Mailbox::new()),
        )?;
        bus.add_peripheral(
            layout::BMC_WRITE_ENABLE_NAME,
            layout::BMC_WRITE_ENABLE,
            Box::new(WriteEnableMap::new(
                FlashDevice::Bmc,
                layout::BMC_WRITE_ENABLE.span,
            )),
        )?;
        bus.add_peripheral(
            layout::PCH_WRITE_ENABLE_NAME,
            layout::PCH_WRITE_ENABLE,
            Box::new(WriteEnableMap::new(
                FlashDevice::Pch,
                layout::PCH_WRITE_ENABLE.span,
            )),
        )?;
        bus.add_peripheral(
            layout::FLASH_WINDOW_NAME,
            layout::FLASH_WINDOW,
            Box::new(FlashWindow::new(flash.clone(), gpio.clone())),
        )?;

        info!(
            "Platform '{}' ready: {} peripherals, fault policy {:?}",
            manifest.name,
            bus.peripherals.len(),
            policy
        );

        Ok(Platform {
            bus,
            handles: PlatformHandles { gpio, flash, clock },
        })
    }
}

/// Builds the platform bus from a manifest path, or from defaults when no
/// path is given.
pub fn build_system_bus(manifest_path: Option<&Path>) -> anyhow::Result<SystemBus> {
    let builder = if let Some(path) = manifest_path {
        info!("Loading platform manifest: {:?}", path);
        PlatformBuilder::from_manifest(PlatformManifest::from_file(path)?)
    } else {
        info!("Using default platform configuration");
        PlatformBuilder::new()
    };
    Ok(builder.build()?.bus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::peripherals::crypto::CryptoEngine;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn test_default_platform_maps_every_block() {
        let platform = PlatformBuilder::new()
            .fault_policy(FaultPolicy::Error)
            .flash_sizes(MIB, MIB)
            .build()
            .unwrap();
        let bus = &platform.bus;
        assert_eq!(bus.peripherals.len(), 10);
        assert_eq!(bus.owner_of(0x1300), Some(layout::CRYPTO_NAME));
        assert_eq!(bus.owner_of(0x0400_0000), Some(layout::FLASH_WINDOW_NAME));
        assert_eq!(bus.owner_of(0x0800_0000), None);
        assert_eq!(bus.fault_policy(), FaultPolicy::Error);
        assert!(bus.peripheral::<CryptoEngine>(layout::CRYPTO_NAME).is_some());
    }

    #[test]
    fn test_manifest_settings_reach_peripherals() {
        let manifest = PlatformManifest::from_yaml(
            r#"
schema_version: "1.0"
name: "small"
fault_policy: error
flash:
  bmc_size: "1MiB"
  pch_size: "2MiB"
crypto:
  done_latency_reads: 3
"#,
        )
        .unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut platform = PlatformBuilder::from_manifest(manifest)
            .clock(clock)
            .build()
            .unwrap();

        let flash = platform.handles.flash.lock();
        assert_eq!(flash.image(FlashDevice::Bmc).len(), MIB);
        assert_eq!(flash.image(FlashDevice::Pch).len(), 2 * MIB);
        drop(flash);

        let bus = &mut platform.bus;
        bus.write(layout::CRYPTO.base + 0x08, 0).unwrap();
        bus.write(layout::CRYPTO.base, 0x2).unwrap();
        assert_eq!(bus.read(layout::CRYPTO.base).unwrap(), 0);
        assert_eq!(bus.read(layout::CRYPTO.base).unwrap(), 0);
        assert_eq!(bus.read(layout::CRYPTO.base).unwrap(), 0x100);
    }

    #[test]
    fn test_oversized_flash_rejected() {
        let err = PlatformBuilder::new()
            .flash_sizes(128 * MIB, MIB)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exceed"));
    }
}
