//! Server configuration.
//!
//! Loaded once at startup from an optional `switchboard.toml` plus
//! `SWITCHBOARD_*` environment overrides. Any change requires a restart.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Switchboard server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Authoritative store URL (postgres:// or sqlite://).
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Seconds between snapshot reloads.
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
    /// Default epsilon for numeric equality in conditions.
    #[serde(default = "default_eval_epsilon")]
    pub eval_epsilon: f64,
    /// Capacity of the evaluation record queue; records beyond it drop.
    #[serde(default = "default_recorder_queue_size")]
    pub recorder_queue_size: usize,
}

fn default_listen_addr() -> String {
    "0.0.0.0:18000".to_string()
}

fn default_database_url() -> String {
    "sqlite://switchboard.db?mode=rwc".to_string()
}

fn default_reload_interval_secs() -> u64 {
    30
}

fn default_eval_epsilon() -> f64 {
    1e-6
}

fn default_recorder_queue_size() -> usize {
    65_536
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_url: default_database_url(),
            reload_interval_secs: default_reload_interval_secs(),
            eval_epsilon: default_eval_epsilon(),
            recorder_queue_size: default_recorder_queue_size(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `switchboard.toml` (optional) and the
    /// `SWITCHBOARD_*` environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("switchboard").required(false))
            .add_source(config::Environment::with_prefix("SWITCHBOARD"))
            .build()?
            .try_deserialize()
    }

    /// Reload interval as a duration.
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }
}
