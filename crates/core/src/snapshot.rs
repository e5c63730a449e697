// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Register-level state of every peripheral on a bus, keyed by peripheral name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BusSnapshot {
    pub peripherals: BTreeMap<String, serde_json::Value>,
}

impl BusSnapshot {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.peripherals.get(name)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
