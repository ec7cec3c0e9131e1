use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use courier_core::app::DispatcherConfig;
use serde::Deserialize;

/// Outbox dispatcher demo over an in-memory outbox table.
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
pub struct Args {
    /// TOML file with a `[dispatcher]` table
    #[arg(short, long, value_name = "FILE", env = "COURIER_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "COURIER_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Seconds between cycles
    #[arg(long, env = "COURIER_POLL_INTERVAL")]
    pub poll_interval: Option<f64>,

    #[arg(long, env = "COURIER_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Records of one batch handled concurrently
    #[arg(long, env = "COURIER_MAX_IN_FLIGHT")]
    pub max_in_flight: Option<usize>,

    /// Service name stamped on outgoing messages
    #[arg(long, env = "COURIER_SOURCE")]
    pub source: Option<String>,

    #[arg(
        short,
        long,
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        env = "COURIER_LOG_LEVEL"
    )]
    pub log_level: String,

    #[arg(
        long,
        default_value = "pretty",
        value_parser = ["json", "pretty"],
        env = "COURIER_LOG_FORMAT"
    )]
    pub log_format: String,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    dispatcher: DispatcherConfig,
}

fn load_file(path: &Path) -> Result<DispatcherConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let file: FileConfig =
        toml::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))?;
    Ok(file.dispatcher)
}

impl Args {
    /// defaults -> file -> flags/env
    pub fn dispatcher_config(&self) -> Result<DispatcherConfig> {
        let mut config = match &self.config {
            Some(path) => load_file(path)?,
            None => DispatcherConfig::default(),
        };

        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.max_in_flight = max_in_flight;
        }
        if let Some(source) = &self.source {
            config.source = Some(source.clone());
        }

        config.validate().context("invalid dispatcher configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from(["courier", "--batch-size", "5", "--source", "auth_service"]);
        let config = args.dispatcher_config().unwrap();

        assert_eq!(config.batch_size, 5);
        assert_eq!(config.source.as_deref(), Some("auth_service"));
        assert_eq!(config.max_retries, DispatcherConfig::default().max_retries);
    }

    #[test]
    fn file_table_is_optional_and_partial() {
        let file: FileConfig = toml::from_str(
            r#"
            [dispatcher]
            batch_size = 50
            poll_interval_secs = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(file.dispatcher.batch_size, 50);
        assert_eq!(file.dispatcher.poll_interval_secs, 0.5);
        assert_eq!(file.dispatcher.max_in_flight, 1);

        let empty: FileConfig = toml::from_str("").unwrap();
        assert_eq!(empty.dispatcher, DispatcherConfig::default());
    }

    #[test]
    fn invalid_override_is_reported() {
        let args = Args::parse_from(["courier", "--batch-size", "0"]);
        assert!(args.dispatcher_config().is_err());
    }
}
