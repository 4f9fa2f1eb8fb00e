//! CLI Commands

pub mod config;
pub mod policy;
pub mod simulate;

pub use config::{ConfigCommand, ConfigSource};
pub use policy::PolicyCommand;
pub use simulate::SimulateCommand;
