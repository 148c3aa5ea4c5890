use crate::config::Config;
use crate::transport::LoggingTransport;
use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use std::{collections::HashMap, fs, path::PathBuf};
use stepcore::Synchronizer;

#[derive(Args)]
pub struct ReplayArgs {
    /// Path to the configuration file (TOML or JSON).
    pub config: PathBuf,

    /// Path to a JSON trace of step events, e.g.
    /// `[{"oid": 1, "sdir": 1, "print_time": 0.0, "step_time": 0.001}]`.
    pub trace: PathBuf,
}

/// One requested step, as the upstream planner would hand it to
/// `StepperCompressor::append` (spec.md §6).
#[derive(Debug, Deserialize)]
struct StepEvent {
    oid: u32,
    sdir: i32,
    print_time: f64,
    step_time: f64,
}

impl ReplayArgs {
    pub fn run(&self) -> Result<()> {
        tracing_subscriber::fmt::init();

        let config = Config::from_file(&self.config)?;
        config.validate()?;

        let trace = fs::read_to_string(&self.trace)
            .with_context(|| format!("failed to read trace {}", self.trace.display()))?;
        let events: Vec<StepEvent> =
            serde_json::from_str(&trace).context("failed to parse trace as JSON")?;

        let mut sync = Synchronizer::new(config.mcu.move_queue_depth, LoggingTransport::default());
        let mut handles = HashMap::new();
        for stepper in &config.steppers {
            let idx = sync.add_stepper(stepper.oid, stepper.max_error);
            sync.stepper_mut(idx).set_invert_sdir(stepper.invert_sdir);
            handles.insert(stepper.oid, idx);
        }
        sync.set_time(config.mcu.time_offset, config.mcu.freq);

        for event in &events {
            let idx = *handles.get(&event.oid).with_context(|| {
                format!("trace references unconfigured stepper oid {}", event.oid)
            })?;
            sync.stepper_mut(idx)
                .append(event.sdir, event.print_time, event.step_time)?;
        }
        for idx in handles.values() {
            sync.stepper_mut(*idx).commit()?;
        }
        sync.flush(u64::MAX)?;

        let transport = sync.into_sink();
        tracing::info!(commands = transport.commands.len(), "replay complete");
        for command in &transport.commands {
            println!("{command:?}");
        }

        Ok(())
    }
}
