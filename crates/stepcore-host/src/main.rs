use anyhow::Result;
use clap::{Parser, Subcommand};
use stepcore_host::cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Replay(args) => args.run(),
        Command::Validate(args) => args.run(),
    }
}

#[derive(Parser)]
#[command(name = "stepcore-host", about = "Stepper pulse compression host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Feed a step-time trace through the compression core and print the
    /// resulting wire commands.
    Replay(cli::replay::ReplayArgs),
    /// Load and validate a configuration file.
    Validate(cli::validate::ValidateArgs),
}
