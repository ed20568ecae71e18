//! Process-wide configuration, loaded via the `config` crate from
//! environment variables.

use serde::Deserialize;

/// Top-level configuration for every subcommand that talks to Postgres or
/// NATS.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// PostgreSQL connection URL backing the run and node-execution stores.
    pub database_url: String,

    /// NATS connection URL backing both the work queue and the event bus.
    pub nats_url: String,

    /// Label prefixing resource names (stream names, consumer names),
    /// useful for running multiple environments against one NATS cluster.
    #[serde(default = "default_stage")]
    pub stage: String,

    /// Submission API tuning.
    #[serde(default)]
    pub submission: SubmissionConfig,
}

fn default_stage() -> String {
    "dev".to_string()
}

/// Submission API and retention tuning, all independently overridable.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// Maximum accepted size of a submit request's `payload` field.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Retention window for completed run records, in days.
    #[serde(default = "default_run_retention_days")]
    pub run_retention_days: i64,

    /// Retention window for per-node execution records, in days.
    #[serde(default = "default_node_retention_days")]
    pub node_retention_days: i64,

    /// Upper bound on queue delayed-delivery, in seconds.
    #[serde(default = "default_max_queue_delay_secs")]
    pub max_queue_delay_secs: u64,
}

fn default_max_payload_bytes() -> usize {
    256 * 1024
}

fn default_run_retention_days() -> i64 {
    30
}

fn default_node_retention_days() -> i64 {
    7
}

fn default_max_queue_delay_secs() -> u64 {
    15 * 60
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            run_retention_days: default_run_retention_days(),
            node_retention_days: default_node_retention_days(),
            max_queue_delay_secs: default_max_queue_delay_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
