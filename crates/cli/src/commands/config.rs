//! rolesync config command

use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;
use shared::{ConfigLoader, Environment, SyncConfig};

/// Where configuration layers come from
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigSource {
    /// Environment defaults to start from (development, production, test).
    /// Falls back to ROLESYNC_ENV.
    #[arg(short, long)]
    pub env: Option<Environment>,

    /// YAML file overriding the environment defaults
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// JSON preference blob applied last; skipped if missing
    #[arg(short, long)]
    pub prefs: Option<PathBuf>,
}

impl ConfigSource {
    pub fn environment(&self) -> Environment {
        self.env.unwrap_or_else(Environment::from_env)
    }

    pub fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new(self.environment());
        if let Some(file) = &self.file {
            loader = loader.with_file(file);
        }
        if let Some(prefs) = &self.prefs {
            loader = loader.with_preferences(prefs);
        }
        loader
    }

    pub fn load(&self) -> anyhow::Result<SyncConfig> {
        Ok(self.loader().load()?)
    }
}

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Print the resolved configuration
    Show {
        #[command(flatten)]
        source: ConfigSource,
        /// Print as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Check that the configuration layers resolve to a valid config
    Validate {
        #[command(flatten)]
        source: ConfigSource,
    },
}

impl ConfigCommand {
    pub fn run(&self) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::Show { source, json } => {
                let config = source.load()?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    print!("{}", config.to_yaml()?);
                }
            }
            ConfigSubcommand::Validate { source } => match source.load() {
                Ok(config) => {
                    println!(
                        "{} configuration valid ({:?}, heartbeat {}ms)",
                        style("✓").green(),
                        config.environment,
                        config.heartbeat_ms
                    );
                }
                Err(e) => {
                    println!("{} {}", style("✗").red(), e);
                    return Err(e);
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_source_applies_file_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "heartbeatMs: 250").unwrap();

        let source = ConfigSource {
            env: Some(Environment::Production),
            file: Some(file.path().to_path_buf()),
            prefs: None,
        };
        let config = source.load().unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.heartbeat_ms, 250);
    }

    #[test]
    fn test_source_rejects_invalid_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "heartbeatMs: 5000").unwrap();

        let source = ConfigSource {
            env: Some(Environment::Development),
            file: Some(file.path().to_path_buf()),
            prefs: None,
        };

        let err = source.load().unwrap_err();
        assert!(err.to_string().contains("heartbeatMs"));
    }

    #[test]
    fn test_missing_preferences_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigSource {
            env: Some(Environment::Test),
            file: None,
            prefs: Some(dir.path().join("absent.json")),
        };

        assert_eq!(source.load().unwrap(), SyncConfig::defaults(Environment::Test));
    }
}
