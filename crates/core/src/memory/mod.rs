// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Value of every byte of an erased NOR flash.
pub const ERASED_BYTE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashDevice {
    Bmc,
    Pch,
}

impl FlashDevice {
    pub fn index(self) -> usize {
        match self {
            Self::Bmc => 0,
            Self::Pch => 1,
        }
    }
}

/// A flat NOR flash image.
#[derive(Debug, Clone)]
pub struct FlashImage {
    data: Vec<u8>,
}

impl FlashImage {
    /// A fully erased image of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![ERASED_BYTE; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn span(&self, offset: usize, len: usize) -> Option<std::ops::Range<usize>> {
        let end = offset.checked_add(len)?;
        (end <= self.data.len()).then_some(offset..end)
    }

    pub fn read(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.span(offset, len).map(|r| &self.data[r])
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.read(offset, 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Program a little-endian word. Programming can only clear bits.
    pub fn program_u32(&mut self, offset: usize, value: u32) -> bool {
        let Some(range) = self.span(offset, 4) else {
            return false;
        };
        for (byte, new) in self.data[range].iter_mut().zip(value.to_le_bytes()) {
            *byte &= new;
        }
        true
    }

    /// Fill `[offset, offset + len)` with the erased pattern.
    pub fn erase(&mut self, offset: usize, len: usize) -> bool {
        let Some(range) = self.span(offset, len) else {
            return false;
        };
        self.data[range].fill(ERASED_BYTE);
        true
    }

    /// Overwrite bytes directly, bypassing programming rules. Used for preloading.
    pub fn load(&mut self, offset: usize, bytes: &[u8]) -> bool {
        let Some(range) = self.span(offset, bytes.len()) else {
            return false;
        };
        self.data[range].copy_from_slice(bytes);
        true
    }

    pub fn is_erased(&self, offset: usize, len: usize) -> bool {
        self.read(offset, len)
            .is_some_and(|bytes| bytes.iter().all(|b| *b == ERASED_BYTE))
    }

    pub fn reset(&mut self) {
        self.data.fill(ERASED_BYTE);
    }
}

/// The BMC and PCH flash images managed by the platform.
#[derive(Debug)]
pub struct FlashDevices {
    images: [FlashImage; 2],
}

impl FlashDevices {
    pub fn new(bmc_size: usize, pch_size: usize) -> Self {
        Self {
            images: [FlashImage::new(bmc_size), FlashImage::new(pch_size)],
        }
    }

    pub fn image(&self, device: FlashDevice) -> &FlashImage {
        &self.images[device.index()]
    }

    pub fn image_mut(&mut self, device: FlashDevice) -> &mut FlashImage {
        &mut self.images[device.index()]
    }

    pub fn reset(&mut self) {
        for image in &mut self.images {
            image.reset();
        }
    }
}

/// Flash devices shared by the SPI controller, the flash window and tests.
#[derive(Debug, Clone)]
pub struct SharedFlash(Arc<Mutex<FlashDevices>>);

impl SharedFlash {
    pub fn new(devices: FlashDevices) -> Self {
        Self(Arc::new(Mutex::new(devices)))
    }

    pub fn lock(&self) -> MutexGuard<'_, FlashDevices> {
        // A poisoned lock still guards valid bytes.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
