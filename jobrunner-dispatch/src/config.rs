use std::path::{Path, PathBuf};

use clap::Parser;
use envconfig::Envconfig;
use jobrunner_core::Settings;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(about = "Dispatches batches of queued jobs to the execution endpoint")]
pub struct Cli {
    /// Path to the shared jobrunner settings file.
    #[arg(long = "config-file")]
    pub config_file: PathBuf,

    /// Log at debug level.
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3202")]
    pub port: u16,

    #[envconfig(default = "100")]
    pub idle_sleep_ms: u64,

    #[envconfig(default = "1000")]
    pub cache_ttl_ms: u64,

    pub runner_id: Option<String>, // Defaults to a UUID
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub runner_id: String,
    /// Sleep when idle or saturated, so a quiet cluster costs ~10
    /// wakeups a second.
    pub idle_sleep_ms: u64,
    pub cache_ttl_ms: u64,
}

impl Config {
    pub fn to_app_config(self) -> AppConfig {
        AppConfig {
            host: self.host,
            port: self.port,
            runner_id: self
                .runner_id
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            idle_sleep_ms: self.idle_sleep_ms,
            cache_ttl_ms: self.cache_ttl_ms,
        }
    }
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_config_file_and_verbose() {
        let cli = Cli::parse_from([
            "jobrunner-dispatch",
            "--config-file",
            "/etc/jobrunner.json",
            "--verbose",
        ]);
        assert_eq!(cli.config_file, PathBuf::from("/etc/jobrunner.json"));
        assert!(cli.verbose);
    }

    #[test]
    fn defaults_are_sane() {
        let config = Config::init_from_hashmap(&Default::default()).unwrap();
        let app = config.to_app_config();
        assert_eq!(app.idle_sleep_ms, 100);
        assert_eq!(app.cache_ttl_ms, 1000);
        assert!(Uuid::parse_str(&app.runner_id).is_ok());
    }
}
