use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::autosave::AutosavePolicy;
use crate::utils::retry::RetryConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub autosave_debounce_secs: u64,
    pub autosave_max_wait_secs: u64,
    pub autosave_force_save_kib: u64,
    pub autosave_retry_attempts: usize,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env_name = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env_name)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let api_base_url = settings
            .get_string("api.base_url")
            .or_else(|_| env::var("API_BASE_URL"))
            .unwrap_or_else(|_| "http://localhost:8081".to_string());

        let request_timeout_secs = read_u64(
            &settings,
            "api.request_timeout_secs",
            "API_REQUEST_TIMEOUT_SECS",
            10,
        );
        let autosave_debounce_secs = read_u64(
            &settings,
            "autosave.debounce_secs",
            "AUTOSAVE_DEBOUNCE_SECS",
            2,
        );
        let autosave_max_wait_secs = read_u64(
            &settings,
            "autosave.max_wait_secs",
            "AUTOSAVE_MAX_WAIT_SECS",
            10,
        );
        let autosave_force_save_kib = read_u64(
            &settings,
            "autosave.force_save_kib",
            "AUTOSAVE_FORCE_SAVE_KIB",
            256,
        );
        let autosave_retry_attempts = read_u64(
            &settings,
            "autosave.retry_attempts",
            "AUTOSAVE_RETRY_ATTEMPTS",
            3,
        ) as usize;

        Ok(Config {
            api_base_url,
            request_timeout_secs,
            autosave_debounce_secs,
            autosave_max_wait_secs,
            autosave_force_save_kib,
            autosave_retry_attempts,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn autosave_policy(&self) -> AutosavePolicy {
        AutosavePolicy {
            debounce: Duration::from_secs(self.autosave_debounce_secs),
            max_wait: Duration::from_secs(self.autosave_max_wait_secs),
            force_save_bytes: self.autosave_force_save_kib as usize * 1024,
        }
    }

    pub fn autosave_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.autosave_retry_attempts,
            ..RetryConfig::default()
        }
    }
}

fn read_u64(settings: &config::Config, key: &str, env_key: &str, default: u64) -> u64 {
    settings
        .get_int(key)
        .ok()
        .and_then(|v| u64::try_from(v).ok())
        .or_else(|| env_parse(env_key))
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
