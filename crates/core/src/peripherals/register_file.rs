// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{SimResult, SimulationError};
use std::any::Any;
use std::collections::BTreeMap;

/// A plain block of read/write words with no side effects.
///
/// Storage is sparse; unwritten words read as zero.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegisterFile {
    span: u32,
    values: BTreeMap<u32, u32>, // mapping offset to value
}

impl RegisterFile {
    pub fn new(span: u32) -> Self {
        Self {
            span,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, offset: u32) -> u32 {
        self.values.get(&offset).copied().unwrap_or(0)
    }

    pub fn set(&mut self, offset: u32, value: u32) {
        if value == 0 {
            self.values.remove(&offset);
        } else {
            self.values.insert(offset, value);
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    #[track_caller]
    fn check(&self, offset: u32) -> SimResult<()> {
        if offset >= self.span {
            return Err(SimulationError::protocol(format!(
                "register offset {:#x} outside {:#x} byte register file",
                offset, self.span
            )));
        }
        Ok(())
    }
}

impl crate::Peripheral for RegisterFile {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        self.check(offset)?;
        Ok(self.get(offset))
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        self.check(offset)?;
        self.set(offset, value);
        Ok(())
    }

    fn reset(&mut self) {
        self.clear();
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
