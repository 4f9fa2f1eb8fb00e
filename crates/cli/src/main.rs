//! ROLESYNC CLI - Command-line interface for ROLESYNC
//!
//! Usage:
//!   rolesync policy check --role <role>   - Show a role's permissions
//!   rolesync policy roles                 - List all roles
//!   rolesync config show [--env <env>]    - Print the resolved configuration
//!   rolesync config validate              - Validate configuration layers
//!   rolesync simulate [--seconds <n>]     - Run an in-memory simulation

use clap::{Parser, Subcommand};
use cli::commands::{ConfigCommand, PolicyCommand, SimulateCommand};

#[derive(Parser)]
#[command(name = "rolesync")]
#[command(about = "ROLESYNC - Role-scoped data synchronization for a bakery")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect role permissions
    Policy(PolicyCommand),
    /// Show or validate configuration
    Config(ConfigCommand),
    /// Run all role facades against an in-memory store
    Simulate(SimulateCommand),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Policy(cmd) => cmd.run(),
        Commands::Config(cmd) => cmd.run(),
        Commands::Simulate(cmd) => cmd.run(),
    }
}
