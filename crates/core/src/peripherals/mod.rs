// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod crypto;
pub mod dual_config;
pub mod gpio;
pub mod mailbox;
pub mod nvram;
pub mod register_file;
pub mod spi_filter;
pub mod timer;
