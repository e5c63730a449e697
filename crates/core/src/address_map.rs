// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::collections::BTreeMap;

/// A `(base, span)` window of the bus owned by one peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct AddressRange {
    pub base: u32,
    pub span: u32,
}

impl AddressRange {
    pub const fn new(base: u32, span: u32) -> Self {
        Self { base, span }
    }

    /// Exclusive end, widened so a range touching the top of the bus is representable.
    pub fn end(&self) -> u64 {
        self.base as u64 + self.span as u64
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && (addr as u64) < self.end()
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        (self.base as u64) < other.end() && (other.base as u64) < self.end()
    }
}

/// Why a range could not be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeConflict {
    /// The range covers no addresses.
    Empty,
    /// The range overlaps space already owned by this slot.
    Overlaps(usize),
}

/// Sorted index from address to the slot of its owning peripheral.
#[derive(Debug, Default, Clone)]
pub struct AddressMap {
    index: BTreeMap<u32, (AddressRange, usize)>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `range` for `slot`.
    ///
    /// Empty ranges are refused, so every key in the index owns at least one
    /// address and ranges stay pairwise disjoint.
    pub fn insert(&mut self, range: AddressRange, slot: usize) -> Result<(), RangeConflict> {
        if range.span == 0 {
            return Err(RangeConflict::Empty);
        }
        if let Some((_, owner)) = self.index.get(&range.base) {
            return Err(RangeConflict::Overlaps(*owner));
        }
        // Only the nearest range below and the first one above can collide.
        let below = self.index.range(..range.base).next_back();
        let above = self.index.range(range.base..).next();
        for (_, (existing, owner)) in below.into_iter().chain(above) {
            if existing.overlaps(&range) {
                return Err(RangeConflict::Overlaps(*owner));
            }
        }
        self.index.insert(range.base, (range, slot));
        Ok(())
    }

    pub fn lookup(&self, addr: u32) -> Option<usize> {
        let (_, (range, slot)) = self.index.range(..=addr).next_back()?;
        range.contains(addr).then_some(*slot)
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Fixed memory map of the simulated PFR platform.
pub mod layout {
    use super::AddressRange;

    pub const GPIO: AddressRange = AddressRange::new(0x0000_1000, 0x10);
    pub const TIMER_BANK: AddressRange = AddressRange::new(0x0000_1100, 0x10);
    pub const DUAL_CONFIG: AddressRange = AddressRange::new(0x0000_1200, 0x20);
    pub const CRYPTO: AddressRange = AddressRange::new(0x0000_1300, 0x40);
    pub const NVRAM: AddressRange = AddressRange::new(0x0000_1400, 0x40);
    pub const SPI_CONTROLLER: AddressRange = AddressRange::new(0x0000_1500, 0x40);
    pub const MAILBOX: AddressRange = AddressRange::new(0x0000_2000, 0x400);
    /// One bit per 4KiB page of a 64MiB device.
    pub const BMC_WRITE_ENABLE: AddressRange = AddressRange::new(0x0000_3000, 0x800);
    pub const PCH_WRITE_ENABLE: AddressRange = AddressRange::new(0x0000_3800, 0x800);
    pub const FLASH_WINDOW: AddressRange = AddressRange::new(0x0400_0000, 0x0400_0000);

    pub const GPIO_NAME: &str = "gpio";
    pub const TIMER_BANK_NAME: &str = "timer_bank";
    pub const DUAL_CONFIG_NAME: &str = "dual_config";
    pub const CRYPTO_NAME: &str = "crypto";
    pub const NVRAM_NAME: &str = "rfnvram";
    pub const SPI_CONTROLLER_NAME: &str = "spi_controller";
    pub const MAILBOX_NAME: &str = "mailbox";
    pub const BMC_WRITE_ENABLE_NAME: &str = "bmc_we";
    pub const PCH_WRITE_ENABLE_NAME: &str = "pch_we";
    pub const FLASH_WINDOW_NAME: &str = "flash_window";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_hits_owning_range_only() {
        let mut map = AddressMap::new();
        map.insert(AddressRange::new(0x1000, 0x10), 0).unwrap();
        map.insert(AddressRange::new(0x2000, 0x100), 1).unwrap();

        assert_eq!(map.lookup(0x1000), Some(0));
        assert_eq!(map.lookup(0x100C), Some(0));
        assert_eq!(map.lookup(0x1010), None);
        assert_eq!(map.lookup(0x0FFC), None);
        assert_eq!(map.lookup(0x20FC), Some(1));
        assert_eq!(map.lookup(0x2100), None);
    }

    #[test]
    fn test_overlap_rejected() {
        let mut map = AddressMap::new();
        map.insert(AddressRange::new(0x1000, 0x100), 0).unwrap();
        assert_eq!(
            map.insert(AddressRange::new(0x10F0, 0x20), 1),
            Err(RangeConflict::Overlaps(0))
        );
        assert_eq!(
            map.insert(AddressRange::new(0x0F00, 0x101), 2),
            Err(RangeConflict::Overlaps(0))
        );
        // Touching is fine.
        map.insert(AddressRange::new(0x1100, 0x10), 3).unwrap();
        map.insert(AddressRange::new(0x0F00, 0x100), 4).unwrap();
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_empty_range_cannot_displace_owner() {
        let mut map = AddressMap::new();
        map.insert(AddressRange::new(0x1000, 0x100), 0).unwrap();

        assert_eq!(
            map.insert(AddressRange::new(0x1000, 0), 1),
            Err(RangeConflict::Empty)
        );
        assert_eq!(
            map.insert(AddressRange::new(0x3000, 0), 2),
            Err(RangeConflict::Empty)
        );
        assert_eq!(map.lookup(0x1004), Some(0));
        assert_eq!(map.len(), 1);

        // Nothing empty sits in the index to mask a later overlap.
        assert_eq!(
            map.insert(AddressRange::new(0x0F80, 0x100), 3),
            Err(RangeConflict::Overlaps(0))
        );
    }

    #[test]
    fn test_same_base_rejected() {
        let mut map = AddressMap::new();
        map.insert(AddressRange::new(0x1000, 0x10), 0).unwrap();
        assert_eq!(
            map.insert(AddressRange::new(0x1000, 0x400), 1),
            Err(RangeConflict::Overlaps(0))
        );
        assert_eq!(map.lookup(0x1200), None);
    }

    #[test]
    fn test_range_at_top_of_bus() {
        let range = AddressRange::new(0xFFFF_FF00, 0x100);
        assert!(range.contains(0xFFFF_FFFC));
        assert!(!range.contains(0xFFFF_FEFC));
        assert_eq!(range.end(), 0x1_0000_0000);
    }

    #[test]
    fn test_platform_layout_is_disjoint() {
        let ranges = [
            layout::GPIO,
            layout::TIMER_BANK,
            layout::DUAL_CONFIG,
            layout::CRYPTO,
            layout::NVRAM,
            layout::SPI_CONTROLLER,
            layout::MAILBOX,
            layout::BMC_WRITE_ENABLE,
            layout::PCH_WRITE_ENABLE,
            layout::FLASH_WINDOW,
        ];
        let mut map = AddressMap::new();
        for (slot, range) in ranges.iter().enumerate() {
            map.insert(*range, slot).unwrap();
        }
    }
}
