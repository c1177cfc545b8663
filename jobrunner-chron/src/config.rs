use std::path::{Path, PathBuf};

use clap::Parser;
use envconfig::Envconfig;
use jobrunner_core::Settings;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(about = "Periodically reclaims expired job claims across every queue partition")]
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

    #[envconfig(from = "BIND_PORT", default = "3201")]
    pub port: u16,

    #[envconfig(default = "1")]
    pub cycle_interval_secs: u64,

    #[envconfig(default = "300")]
    pub lock_ttl_secs: i64,

    // A week: abandoned jobs older than this lose their data for good
    #[envconfig(default = "604800")]
    pub prune_ttl_secs: i64,

    #[envconfig(default = "500")]
    pub reclaim_batch: usize,

    #[envconfig(default = "5")]
    pub script_pause_ms: u64,

    pub chron_id: Option<String>, // Defaults to a UUID
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub chron_id: String,
    pub cycle_interval_secs: u64,
    pub lock_ttl_secs: i64,
    pub prune_ttl_secs: i64,
    pub reclaim_batch: usize,
    pub script_pause_ms: u64,
}

impl Config {
    pub fn to_app_config(self) -> AppConfig {
        AppConfig {
            host: self.host,
            port: self.port,
            chron_id: self
                .chron_id
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            cycle_interval_secs: self.cycle_interval_secs,
            lock_ttl_secs: self.lock_ttl_secs,
            prune_ttl_secs: self.prune_ttl_secs,
            reclaim_batch: self.reclaim_batch,
            script_pause_ms: self.script_pause_ms,
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
        let cli = Cli::parse_from(["jobrunner-chron", "--config-file", "/etc/jobrunner.json", "-v"]);
        assert_eq!(cli.config_file, PathBuf::from("/etc/jobrunner.json"));
        assert!(cli.verbose);
    }

    #[test]
    fn chron_id_defaults_to_a_uuid() {
        let config = Config {
            host: "::".to_string(),
            port: 3201,
            cycle_interval_secs: 1,
            lock_ttl_secs: 300,
            prune_ttl_secs: 604800,
            reclaim_batch: 500,
            script_pause_ms: 5,
            chron_id: None,
        };
        let app = config.to_app_config();
        assert!(Uuid::parse_str(&app.chron_id).is_ok());
    }
}
