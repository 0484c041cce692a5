use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default dynamic session TTL: 5 minutes.
const DEFAULT_SESSION_TTL_MS: u64 = 300_000;

/// Default session-expiry sweep cadence: 60 seconds.
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;

/// Default heartbeat staleness threshold: 90 seconds.
///
/// Devices heartbeat every 20-30 seconds, so this tolerates two or three
/// missed beats before a device is flipped offline.
const DEFAULT_OFFLINE_THRESHOLD_MS: u64 = 90_000;

/// Default device offline sweep cadence: 30 seconds.
const DEFAULT_OFFLINE_SWEEP_INTERVAL_MS: u64 = 30_000;

/// Default free-mode trial duration: 10 minutes.
const DEFAULT_FREE_TRIAL_DURATION_MS: u64 = 600_000;

/// Default free-mode cooldown window after a trial ends: 1 hour.
const DEFAULT_FREE_COOLDOWN_MS: u64 = 3_600_000;

/// Default generated access code length.
const DEFAULT_CODE_LENGTH: usize = 6;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub session_ttl: Duration,
    pub cleanup_interval: Duration,
    pub offline_threshold: Duration,
    pub offline_sweep_interval: Duration,
    pub free_trial_duration: Duration,
    pub free_cooldown: Duration,
    pub code_length: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let database_url = vars
            .get("DATABASE_URL")
            .cloned()
            .unwrap_or_else(|| "sqlite:matchmaker.db?mode=rwc".to_string());

        let session_ttl = millis_var(vars, "SESSION_TTL_MS", DEFAULT_SESSION_TTL_MS)?;
        let cleanup_interval = millis_var(vars, "CLEANUP_INTERVAL_MS", DEFAULT_CLEANUP_INTERVAL_MS)?;
        let offline_threshold =
            millis_var(vars, "OFFLINE_THRESHOLD_MS", DEFAULT_OFFLINE_THRESHOLD_MS)?;
        let offline_sweep_interval = millis_var(
            vars,
            "OFFLINE_SWEEP_INTERVAL_MS",
            DEFAULT_OFFLINE_SWEEP_INTERVAL_MS,
        )?;
        let free_trial_duration = millis_var(
            vars,
            "FREE_TRIAL_DURATION_MS",
            DEFAULT_FREE_TRIAL_DURATION_MS,
        )?;
        let free_cooldown = millis_var(vars, "FREE_COOLDOWN_MS", DEFAULT_FREE_COOLDOWN_MS)?;

        let code_length = match vars.get("CODE_LENGTH") {
            Some(raw) => raw.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                var: "CODE_LENGTH".to_string(),
                value: raw.clone(),
            })?,
            None => DEFAULT_CODE_LENGTH,
        };

        Ok(Config {
            bind_address,
            database_url,
            session_ttl,
            cleanup_interval,
            offline_threshold,
            offline_sweep_interval,
            free_trial_duration,
            free_cooldown,
            code_length,
        })
    }
}

/// Parse a millisecond duration variable with a default.
fn millis_var(
    vars: &HashMap<String, String>,
    var: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    let ms = match vars.get(var) {
        Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw.clone(),
        })?,
        None => default_ms,
    };
    Ok(Duration::from_millis(ms))
}
