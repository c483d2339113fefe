//! Application-level configuration loading, including the default strategy bonus rules.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::{BonusRulesEntity, ComboRuleEntity, PatternRuleEntity};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BINGO_STRATEGY_CONFIG_PATH";

const DEFAULT_INTERMISSION_SECONDS: u32 = 10;
const DEFAULT_TRANSITION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SSE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    bonus_rules: BonusRulesEntity,
    intermission_seconds: u32,
    transition_timeout: Duration,
    sse_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        patterns = app_config.bonus_rules.patterns.len(),
                        intermission_seconds = app_config.intermission_seconds,
                        "loaded strategy defaults from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Bonus rules applied to games that do not carry their own.
    pub fn default_bonus_rules(&self) -> &BonusRulesEntity {
        &self.bonus_rules
    }

    /// Intermission used when a game leaves it unset.
    pub fn intermission_seconds(&self) -> u32 {
        self.intermission_seconds
    }

    /// Upper bound for a single automation transition (round start/finish, champion).
    pub fn transition_timeout(&self) -> Duration {
        self.transition_timeout
    }

    /// Capacity of the public SSE broadcast channel.
    pub fn sse_capacity(&self) -> usize {
        self.sse_capacity
    }

    /// Override the transition timeout.
    pub fn with_transition_timeout(mut self, timeout: Duration) -> Self {
        self.transition_timeout = timeout;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bonus_rules: default_bonus_rules(),
            intermission_seconds: DEFAULT_INTERMISSION_SECONDS,
            transition_timeout: Duration::from_millis(DEFAULT_TRANSITION_TIMEOUT_MS),
            sse_capacity: DEFAULT_SSE_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    bonus_rules: Option<BonusRulesEntity>,
    #[serde(default)]
    intermission_seconds: Option<u32>,
    #[serde(default)]
    transition_timeout_ms: Option<u64>,
    #[serde(default)]
    sse_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            bonus_rules: value.bonus_rules.unwrap_or(defaults.bonus_rules),
            intermission_seconds: value
                .intermission_seconds
                .unwrap_or(defaults.intermission_seconds),
            transition_timeout: value
                .transition_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.transition_timeout),
            sse_capacity: value
                .sse_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.sse_capacity),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in bonus rules shipped with the binary.
fn default_bonus_rules() -> BonusRulesEntity {
    let mut patterns = IndexMap::new();
    patterns.insert(
        "fourCorners".to_owned(),
        PatternRuleEntity {
            points: 5,
            label: Some("Four Corners".to_owned()),
        },
    );
    patterns.insert(
        "x".to_owned(),
        PatternRuleEntity {
            points: 15,
            label: Some("X Pattern".to_owned()),
        },
    );

    BonusRulesEntity {
        patterns,
        combo: Some(ComboRuleEntity {
            points: 10,
            window: Some(1),
            label: Some("Back-to-back".to_owned()),
        }),
    }
}
