// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{AccessKind, BusObserver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counts bus traffic, in total and per address.
#[derive(Debug, Default)]
pub struct BusMetrics {
    read_count: AtomicU64,
    write_count: AtomicU64,
    accesses_by_addr: Mutex<HashMap<u32, u64>>,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.read_count.store(0, Ordering::SeqCst);
        self.write_count.store(0, Ordering::SeqCst);
        if let Ok(mut m) = self.accesses_by_addr.lock() {
            m.clear();
        }
    }

    pub fn get_reads(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    pub fn get_writes(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    pub fn get_accesses(&self, addr: u32) -> u64 {
        self.accesses_by_addr
            .lock()
            .ok()
            .and_then(|m| m.get(&addr).copied())
            .unwrap_or(0)
    }
}

impl BusObserver for BusMetrics {
    fn on_access(&self, kind: AccessKind, addr: u32, _value: u32) {
        match kind {
            AccessKind::Read => self.read_count.fetch_add(1, Ordering::SeqCst),
            AccessKind::Write => self.write_count.fetch_add(1, Ordering::SeqCst),
        };
        if let Ok(mut m) = self.accesses_by_addr.lock() {
            *m.entry(addr).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BusAccess {
    pub kind: AccessKind,
    pub addr: u32,
    pub value: u32,
}

/// Records every access in order, for tests that assert on bus traffic.
#[derive(Debug, Default)]
pub struct AccessTrace {
    accesses: Mutex<Vec<BusAccess>>,
}

impl AccessTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accesses(&self) -> Vec<BusAccess> {
        self.accesses
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut v) = self.accesses.lock() {
            v.clear();
        }
    }
}

impl BusObserver for AccessTrace {
    fn on_access(&self, kind: AccessKind, addr: u32, value: u32) {
        if let Ok(mut v) = self.accesses.lock() {
            v.push(BusAccess { kind, addr, value });
        }
    }
}
