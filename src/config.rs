//! Configuration management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cognition::{GoalConfig, LearningConfig, PlannerConfig};
use crate::oracle::OllamaConfig;

/// Cognitive loop configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub learning: LearningConfig,
    pub goals: GoalConfig,
    pub planner: PlannerConfig,

    /// Ollama server and model used as the oracle
    pub ollama: OllamaConfig,

    /// Caller-side limit on a single oracle round trip
    pub oracle_timeout: Duration,

    /// Give the oracle one chance to fix a response without JSON
    pub repair_malformed_json: bool,

    /// Simulated hours that pass per cycle (lesson and goal decay)
    pub decay_hours_per_cycle: f64,

    /// SQLite database path for checkpoints
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            learning: LearningConfig::default(),
            goals: GoalConfig::default(),
            planner: PlannerConfig::default(),
            ollama: OllamaConfig::default(),
            oracle_timeout: Duration::from_secs(60),
            repair_malformed_json: true,
            decay_hours_per_cycle: 0.5,
            db_path: default_db_path(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.ollama.ollama_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("COGNITION_MODEL") {
            config.ollama.model = model;
        }
        if let Ok(path) = std::env::var("COGNITION_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(secs) = env_parse::<u64>("COGNITION_ORACLE_TIMEOUT") {
            config.oracle_timeout = Duration::from_secs(secs);
        }

        if let Some(v) = env_parse("COGNITION_MAX_GOALS") {
            config.goals.max_goals = v;
        }
        if let Some(v) = env_parse("COGNITION_GENERATION_INTERVAL") {
            config.goals.generation_interval = v;
        }
        if let Some(v) = env_parse("COGNITION_EXTRACTION_INTERVAL") {
            config.learning.extraction_interval = v;
        }
        if let Some(v) = env_parse("COGNITION_MAX_ACTIVE_PLANS") {
            config.planner.max_active_plans = v;
        }
        if let Some(v) = env_parse("COGNITION_MAX_REPLANS") {
            config.planner.max_replans = v;
        }
        if let Some(v) = env_parse::<f64>("COGNITION_DECAY_HOURS") {
            if v.is_finite() && v >= 0.0 {
                config.decay_hours_per_cycle = v;
            }
        }

        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cognitive-loop")
        .join("checkpoints.db")
}
