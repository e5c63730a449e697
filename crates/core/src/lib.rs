// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register-level peripheral simulation for PFR boot firmware.
//!
//! Firmware-facing code talks to a [`bus::SystemBus`] with 32-bit word loads
//! and stores. The bus routes each access to the [`Peripheral`] owning the
//! address, and every fault is reported through the configured
//! [`FaultPolicy`].

pub mod address_map;
pub mod bus;
pub mod clock;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod snapshot;
pub mod system;

use std::any::Any;
use std::fmt;
use std::panic::Location;

pub use pfrsim_config::FaultPolicy;

/// Source position a fault was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultLocation {
    pub file: &'static str,
    pub line: u32,
}

impl FaultLocation {
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
        }
    }
}

impl fmt::Display for FaultLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("protocol violation: {message} ({at})")]
    Protocol { message: String, at: FaultLocation },
    #[error("undefined handler for address {addr:#010x} ({at})")]
    UnmappedAddress { addr: u32, at: FaultLocation },
    #[error("unaligned word access at {addr:#010x} ({at})")]
    Unaligned { addr: u32, at: FaultLocation },
    #[error("injected fault on access to {addr:#010x} ({at})")]
    InjectedFault { addr: u32, at: FaultLocation },
    #[error("address range {base:#010x}+{span:#x} of '{name}' overlaps '{other}'")]
    OverlappingRange {
        name: String,
        base: u32,
        span: u32,
        other: String,
    },
    #[error("address range of '{name}' at {base:#010x} is empty")]
    EmptyRange { name: String, base: u32 },
}

impl SimulationError {
    /// A register access that is illegal in the peripheral's current state.
    #[track_caller]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            at: FaultLocation::caller(),
        }
    }

    pub fn location(&self) -> Option<FaultLocation> {
        match self {
            Self::Protocol { at, .. }
            | Self::UnmappedAddress { at, .. }
            | Self::Unaligned { at, .. }
            | Self::InjectedFault { at, .. } => Some(*at),
            Self::OverlappingRange { .. } | Self::EmptyRange { .. } => None,
        }
    }
}

pub type SimResult<T> = Result<T, SimulationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

/// Trait for observing bus traffic.
///
/// Observers run before the access is dispatched, so they also see accesses
/// that go on to fault. Read accesses report a value of `0`.
pub trait BusObserver: std::fmt::Debug + Send + Sync {
    fn on_access(&self, kind: AccessKind, addr: u32, value: u32);
}

/// Trait representing a memory-mapped peripheral.
///
/// Offsets are relative to the peripheral's base address and always word
/// aligned; the bus rejects unaligned accesses before they get here.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&mut self, offset: u32) -> SimResult<u32>;
    fn write(&mut self, offset: u32, value: u32) -> SimResult<()>;
    /// Return to the power-up state.
    fn reset(&mut self);
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
