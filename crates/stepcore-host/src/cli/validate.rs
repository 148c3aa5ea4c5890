use crate::config::Config;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the configuration file (TOML or JSON).
    pub config: PathBuf,
}

impl ValidateArgs {
    pub fn run(&self) -> Result<()> {
        tracing_subscriber::fmt::init();

        let config = Config::from_file(&self.config)?;
        config.validate()?;

        println!(
            "{} is valid: {} stepper(s), mcu_freq={}",
            self.config.display(),
            config.steppers.len(),
            config.mcu.freq
        );
        Ok(())
    }
}
