use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::Path};

/// Host configuration: the MCU parameters and per-stepper bindings the
/// core needs but never reads from a file itself (spec.md §1 names
/// "configuration loading" as an external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mcu: McuConfig,

    #[serde(default)]
    pub steppers: Vec<StepperConfig>,
}

/// Global MCU clock parameters, shared by every stepper's
/// [`stepcore::StepperCompressor::set_time`] call and by the
/// synchronizer's move-queue depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McuConfig {
    /// MCU clock frequency in Hz.
    #[serde(default = "default_freq")]
    pub freq: f64,

    /// Offset (seconds) between the host's print-time clock and the MCU's.
    #[serde(default)]
    pub time_offset: f64,

    /// Depth of the MCU's fixed-capacity move queue (spec.md §3/§4.7).
    #[serde(default = "default_move_queue_depth")]
    pub move_queue_depth: usize,
}

impl Default for McuConfig {
    fn default() -> Self {
        Self {
            freq: default_freq(),
            time_offset: 0.0,
            move_queue_depth: default_move_queue_depth(),
        }
    }
}

/// Per-stepper binding: the oid and wire tags the host needs to address
/// one [`stepcore::StepperCompressor`] (spec.md §4.6 `alloc`/`fill`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepperConfig {
    /// The MCU object id this stepper's commands are addressed to.
    pub oid: u32,

    /// Per-step tolerance (spec.md §3 `max_error`).
    #[serde(default = "default_max_error")]
    pub max_error: u32,

    /// Flips the logical step direction before it reaches the wire
    /// (spec.md §4.6 `set_invert_sdir`).
    #[serde(default)]
    pub invert_sdir: bool,
}

fn default_freq() -> f64 {
    16_000_000.0
}

fn default_move_queue_depth() -> usize {
    8
}

fn default_max_error() -> u32 {
    25
}

impl Config {
    /// Load configuration from a file, auto-detecting TOML or JSON format
    /// from its extension (falling back to trying both).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let extension = path.extension().and_then(|s| s.to_str());
        match extension {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content).or_else(|_| Self::from_json(&content)),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config as TOML")
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse config as JSON")
    }

    /// Validate the configuration: at least one stepper, no duplicate
    /// oids, and MCU parameters the core's clock arithmetic can use.
    pub fn validate(&self) -> Result<()> {
        if self.steppers.is_empty() {
            anyhow::bail!("at least one stepper must be configured");
        }
        if self.mcu.freq <= 0.0 {
            anyhow::bail!("mcu.freq must be positive");
        }
        if self.mcu.move_queue_depth == 0 {
            anyhow::bail!("mcu.move_queue_depth must be at least 1");
        }

        let mut seen = HashSet::new();
        for stepper in &self.steppers {
            if !seen.insert(stepper.oid) {
                anyhow::bail!("duplicate stepper oid {}", stepper.oid);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml() {
        let toml = r#"
[mcu]
freq = 16000000.0
time_offset = 0.0
move_queue_depth = 16

[[steppers]]
oid = 1
max_error = 25

[[steppers]]
oid = 2
max_error = 25
invert_sdir = true
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.mcu.move_queue_depth, 16);
        assert_eq!(config.steppers.len(), 2);
        assert!(config.steppers[1].invert_sdir);
    }

    #[test]
    fn parses_json() {
        let json = r#"{
            "mcu": { "freq": 16000000.0, "move_queue_depth": 8 },
            "steppers": [{ "oid": 1, "max_error": 25 }]
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.steppers[0].oid, 1);
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_toml("[[steppers]]\noid = 1\n").unwrap();
        assert_eq!(config.mcu.move_queue_depth, 8);
        assert_eq!(config.steppers[0].max_error, 25);
    }

    #[test]
    fn rejects_empty_steppers() {
        let config = Config::from_toml("").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_oids() {
        let toml = r#"
[[steppers]]
oid = 1
[[steppers]]
oid = 1
"#;
        let config = Config::from_toml(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
