// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::address_map::{AddressMap, AddressRange, RangeConflict};
use crate::snapshot::BusSnapshot;
use crate::{
    AccessKind, BusObserver, FaultLocation, FaultPolicy, Peripheral, SimResult, SimulationError,
};
use std::sync::Arc;

pub struct PeripheralEntry {
    pub name: String,
    pub range: AddressRange,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    pub fn new(name: impl Into<String>, range: AddressRange, dev: Box<dyn Peripheral>) -> Self {
        Self {
            name: name.into(),
            range,
            dev,
        }
    }

    pub fn owns(&self, addr: u32) -> bool {
        self.range.contains(addr)
    }
}

impl std::fmt::Debug for PeripheralEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralEntry")
            .field("name", &self.name)
            .field("base", &format_args!("{:#010x}", self.range.base))
            .field("span", &format_args!("{:#x}", self.range.span))
            .finish()
    }
}

/// Word-level bus routing firmware accesses to the owning peripheral.
///
/// The bus and everything mounted on it form one exclusively-owned
/// resource; a multi-threaded host should wrap the whole `SystemBus` in a
/// single mutex rather than sharing individual peripherals.
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
    observers: Vec<Arc<dyn BusObserver>>,
    index: AddressMap,
    fault_policy: FaultPolicy,
    fault_after: Option<u64>,
    accesses: u64,
}

impl std::fmt::Debug for SystemBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemBus")
            .field("peripherals", &self.peripherals)
            .field("observers", &self.observers.len())
            .field("fault_policy", &self.fault_policy)
            .field("accesses", &self.accesses)
            .finish()
    }
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    /// An empty bus with the default (abort) fault policy.
    pub fn new() -> Self {
        Self {
            peripherals: Vec::new(),
            observers: Vec::new(),
            index: AddressMap::new(),
            fault_policy: FaultPolicy::default(),
            fault_after: None,
            accesses: 0,
        }
    }

    pub fn with_fault_policy(fault_policy: FaultPolicy) -> Self {
        Self {
            fault_policy,
            ..Self::new()
        }
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }

    pub fn set_fault_policy(&mut self, policy: FaultPolicy) {
        self.fault_policy = policy;
    }

    /// Mount a peripheral. Fails if its range overlaps an existing one.
    pub fn add_peripheral(
        &mut self,
        name: impl Into<String>,
        range: AddressRange,
        dev: Box<dyn Peripheral>,
    ) -> SimResult<()> {
        let entry = PeripheralEntry::new(name, range, dev);
        let slot = self.peripherals.len();
        if let Err(conflict) = self.index.insert(range, slot) {
            return Err(self.range_error(&entry.name, range, conflict));
        }
        tracing::debug!(
            "Mapped '{}' at {:#010x}..{:#010x}",
            entry.name,
            range.base,
            range.end()
        );
        self.peripherals.push(entry);
        Ok(())
    }

    /// Rebuild the address index after `peripherals` was edited directly.
    pub fn refresh_peripheral_index(&mut self) -> SimResult<()> {
        self.index.clear();
        for (slot, p) in self.peripherals.iter().enumerate() {
            if let Err(conflict) = self.index.insert(p.range, slot) {
                return Err(self.range_error(&p.name, p.range, conflict));
            }
        }
        Ok(())
    }

    fn range_error(
        &self,
        name: &str,
        range: AddressRange,
        conflict: RangeConflict,
    ) -> SimulationError {
        match conflict {
            RangeConflict::Empty => SimulationError::EmptyRange {
                name: name.to_string(),
                base: range.base,
            },
            RangeConflict::Overlaps(owner) => SimulationError::OverlappingRange {
                name: name.to_string(),
                base: range.base,
                span: range.span,
                other: self.peripherals[owner].name.clone(),
            },
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn BusObserver>) {
        self.observers.push(observer);
    }

    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }

    /// Make the access following `accesses` further accesses fault.
    ///
    /// `inject_fault_after(0)` faults the very next access. The injection is
    /// one-shot.
    pub fn inject_fault_after(&mut self, accesses: u64) {
        self.fault_after = Some(accesses);
    }

    pub fn clear_injected_fault(&mut self) {
        self.fault_after = None;
    }

    /// Total accesses dispatched since construction, including faulting ones.
    pub fn access_count(&self) -> u64 {
        self.accesses
    }

    /// Name of the peripheral owning `addr`, if any.
    pub fn owner_of(&self, addr: u32) -> Option<&str> {
        self.index
            .lookup(addr)
            .and_then(|slot| self.peripherals.get(slot))
            .map(|p| p.name.as_str())
    }

    #[track_caller]
    pub fn read(&mut self, addr: u32) -> SimResult<u32> {
        let at = FaultLocation::caller();
        for observer in &self.observers {
            observer.on_access(AccessKind::Read, addr, 0);
        }
        let result = self
            .route(addr, at)
            .and_then(|(entry, offset)| entry.dev.read(offset));
        match result {
            Ok(value) => {
                tracing::trace!("Bus read {:#010x} -> {:#010x}", addr, value);
                Ok(value)
            }
            Err(e) => Err(self.raise(e)),
        }
    }

    #[track_caller]
    pub fn write(&mut self, addr: u32, value: u32) -> SimResult<()> {
        let at = FaultLocation::caller();
        for observer in &self.observers {
            observer.on_access(AccessKind::Write, addr, value);
        }
        tracing::trace!("Bus write {:#010x} <- {:#010x}", addr, value);
        let result = self
            .route(addr, at)
            .and_then(|(entry, offset)| entry.dev.write(offset, value));
        result.map_err(|e| self.raise(e))
    }

    /// Reset every peripheral to its power-up state.
    ///
    /// Observers and the fault policy are kept; a pending injected fault is
    /// dropped.
    pub fn reset(&mut self) {
        for p in &mut self.peripherals {
            p.dev.reset();
        }
        self.fault_after = None;
        tracing::debug!("Bus reset ({} peripherals)", self.peripherals.len());
    }

    pub fn peripheral<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn peripheral_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }

    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            peripherals: self
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
        }
    }

    fn route(
        &mut self,
        addr: u32,
        at: FaultLocation,
    ) -> SimResult<(&mut PeripheralEntry, u32)> {
        self.accesses += 1;

        match self.fault_after {
            Some(0) => {
                self.fault_after = None;
                return Err(SimulationError::InjectedFault { addr, at });
            }
            Some(n) => self.fault_after = Some(n - 1),
            None => {}
        }

        if addr & 3 != 0 {
            return Err(SimulationError::Unaligned { addr, at });
        }

        let entry = self
            .index
            .lookup(addr)
            .and_then(|slot| self.peripherals.get_mut(slot))
            .ok_or(SimulationError::UnmappedAddress { addr, at })?;
        let offset = addr - entry.range.base;
        Ok((entry, offset))
    }

    fn raise(&self, err: SimulationError) -> SimulationError {
        match self.fault_policy {
            FaultPolicy::Abort => {
                tracing::error!("Unrecoverable simulation fault: {}", err);
                std::process::abort();
            }
            FaultPolicy::Error => {
                tracing::debug!("Simulation fault raised to caller: {}", err);
                err
            }
        }
    }
}
