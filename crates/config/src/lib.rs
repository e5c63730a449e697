// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Environment variable consulted by [`FaultPolicy::from_env`].
pub const FAULT_POLICY_ENV: &str = "PFRSIM_FAULT_POLICY";

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

/// How the bus reports an unrecoverable fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Log the fault and abort the process.
    #[default]
    Abort,
    /// Hand the fault back to the caller as an error value.
    #[serde(alias = "raise", alias = "catch")]
    Error,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported fault policy '{0}'; supported: abort, error")]
pub struct UnknownFaultPolicy(pub String);

impl FromStr for FaultPolicy {
    type Err = UnknownFaultPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" | "panic" | "crash" => Ok(Self::Abort),
            "error" | "raise" | "catch" => Ok(Self::Error),
            _ => Err(UnknownFaultPolicy(value.to_string())),
        }
    }
}

impl FaultPolicy {
    /// Reads the policy from `PFRSIM_FAULT_POLICY`.
    ///
    /// An unset variable selects the default (`Abort`). An unrecognised
    /// value is logged and also falls back to `Abort`.
    pub fn from_env() -> Self {
        match std::env::var(FAULT_POLICY_ENV) {
            Ok(raw) => raw.parse().unwrap_or_else(|e: UnknownFaultPolicy| {
                tracing::warn!("{}; falling back to abort", e);
                Self::Abort
            }),
            Err(_) => Self::Abort,
        }
    }
}

fn default_flash_size() -> String {
    "64MiB".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FlashConfig {
    #[serde(default = "default_flash_size")]
    pub bmc_size: String, // e.g. "64MiB"
    #[serde(default = "default_flash_size")]
    pub pch_size: String,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            bmc_size: default_flash_size(),
            pch_size: default_flash_size(),
        }
    }
}

fn default_done_latency_reads() -> u32 {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CryptoConfig {
    /// Status reads required in the done state before DONE becomes visible.
    #[serde(default = "default_done_latency_reads")]
    pub done_latency_reads: u32,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            done_latency_reads: default_done_latency_reads(),
        }
    }
}

fn default_tick_ms() -> u64 {
    20
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TimerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_busy_polls() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DualConfigConfig {
    /// Reads of the busy register that report busy after each command.
    #[serde(default = "default_busy_polls")]
    pub busy_polls: u32,
}

impl Default for DualConfigConfig {
    fn default() -> Self {
        Self {
            busy_polls: default_busy_polls(),
        }
    }
}

/// Top-level description of a simulated PFR platform.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PlatformManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    /// When absent the policy comes from the environment.
    #[serde(default)]
    pub fault_policy: Option<FaultPolicy>,
    #[serde(default)]
    pub flash: FlashConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub dual_config: DualConfigConfig,
}

impl Default for PlatformManifest {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "pfr-platform".to_string(),
            fault_policy: None,
            flash: FlashConfig::default(),
            crypto: CryptoConfig::default(),
            timer: TimerConfig::default(),
            dual_config: DualConfigConfig::default(),
        }
    }
}

impl PlatformManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read platform manifest at {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Platform Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        for (label, size) in [
            ("flash.bmc_size", &self.flash.bmc_size),
            ("flash.pch_size", &self.flash.pch_size),
        ] {
            let bytes = parse_size(size).with_context(|| format!("Invalid '{}'", label))?;
            if bytes == 0 || bytes % 0x1_0000 != 0 {
                anyhow::bail!(
                    "'{}' must be a non-zero multiple of 64KiB, got {} bytes",
                    label,
                    bytes
                );
            }
            if bytes > MAX_FLASH_SIZE {
                anyhow::bail!(
                    "'{}' exceeds the {} byte flash window, got {} bytes",
                    label,
                    MAX_FLASH_SIZE,
                    bytes
                );
            }
        }

        if self.timer.tick_ms == 0 {
            anyhow::bail!("'timer.tick_ms' must be greater than zero");
        }

        Ok(())
    }

    /// The manifest's policy, or the environment's when the manifest is silent.
    pub fn resolved_fault_policy(&self) -> FaultPolicy {
        self.fault_policy.unwrap_or_else(FaultPolicy::from_env)
    }

    pub fn bmc_flash_bytes(&self) -> Result<usize> {
        Ok(parse_size(&self.flash.bmc_size)? as usize)
    }

    pub fn pch_flash_bytes(&self) -> Result<usize> {
        Ok(parse_size(&self.flash.pch_size)? as usize)
    }
}

/// Largest flash image the memory-mapped window can expose.
pub const MAX_FLASH_SIZE: u64 = 64 * 1024 * 1024;

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
