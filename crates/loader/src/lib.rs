// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, Context, Result};
use pfrsim_core::memory::{FlashDevice, SharedFlash};
use pfrsim_core::peripherals::nvram::{Nvram, NVRAM_SIZE};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read image file: {:?}", path))
}

/// Copy a raw flash image from `path` into `device` at `offset`.
///
/// Bytes are written directly, replacing whatever the image held. Returns
/// the number of bytes loaded.
pub fn load_flash_image(
    flash: &SharedFlash,
    device: FlashDevice,
    offset: usize,
    path: &Path,
) -> Result<usize> {
    let bytes = read_image(path)?;
    load_flash_bytes(flash, device, offset, &bytes)
        .with_context(|| format!("Failed to load {:?} into {:?} flash", path, device))?;
    info!(
        "Loaded {} bytes from {:?} into {:?} flash at {:#x}",
        bytes.len(),
        path,
        device,
        offset
    );
    Ok(bytes.len())
}

pub fn load_flash_bytes(
    flash: &SharedFlash,
    device: FlashDevice,
    offset: usize,
    bytes: &[u8],
) -> Result<()> {
    let mut devices = flash.lock();
    let image = devices.image_mut(device);
    let size = image.len();
    if !image.load(offset, bytes) {
        return Err(anyhow!(
            "{} bytes at {:#x} do not fit in the {:#x} byte image",
            bytes.len(),
            offset,
            size
        ));
    }
    debug!("Flash {:?}: wrote {:#x}..{:#x}", device, offset, offset + bytes.len());
    Ok(())
}

/// Preload the NVRAM store from `path`, starting at `addr`.
pub fn load_nvram(nvram: &mut Nvram, addr: u16, path: &Path) -> Result<usize> {
    let bytes = read_image(path)?;
    let start = addr as usize;
    if start >= NVRAM_SIZE || bytes.len() > NVRAM_SIZE - start {
        return Err(anyhow!(
            "NVRAM image {:?} ({} bytes at {:#x}) exceeds the {} byte device",
            path,
            bytes.len(),
            addr,
            NVRAM_SIZE
        ));
    }
    nvram.preload(addr, &bytes);
    info!("Loaded {} bytes from {:?} into NVRAM at {:#x}", bytes.len(), path, addr);
    Ok(bytes.len())
}
