//! fleetscale.toml configuration parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::EvictionOrder;

/// Environment variable that overrides `provider.auth_token`.
pub const AUTH_TOKEN_ENV: &str = "FLEETSCALE_AUTH_TOKEN";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no [[fleet]] entries configured")]
    NoFleets,

    #[error("duplicate fleet name: {0}")]
    DuplicateFleet(String),

    #[error("fleet {fleet}: {reason}")]
    InvalidFleet { fleet: String, reason: String },

    #[error("invalid cost-capped policy: {0}")]
    InvalidBudget(String),

    #[error("invalid provider config: {0}")]
    InvalidProvider(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetscaleConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub policies: PoliciesConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default, rename = "fleet")]
    pub fleets: Vec<FleetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Seconds between autoscale ticks. Zero disables the ticker.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Decision records kept per fleet; older ones are pruned on write.
    /// Zero keeps everything.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            tick_interval_secs: default_tick_interval(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoliciesConfig {
    /// Policy used by the ticker when a fleet doesn't name its own.
    #[serde(default = "default_policy")]
    pub default: String,
    /// Registering `cost-capped` requires a budget, so it is opt-in.
    pub cost_capped: Option<CostCappedConfig>,
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            default: default_policy(),
            cost_capped: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostCappedConfig {
    pub daily_budget: f64,
    #[serde(default = "default_cost_per_server_hour")]
    pub cost_per_server_hour: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Volatile in-process fleet.
    #[default]
    Memory,
    /// Simulated fleet persisted in the state store.
    Local,
    /// OpenStack Nova compute API.
    Openstack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    pub endpoint: Option<String>,
    pub auth_token: Option<String>,
    /// Per-call timeout. Unset means calls may block indefinitely.
    pub timeout_secs: Option<u64>,
    /// Attempts per call, including the first. 1 disables retry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            endpoint: None,
            auth_token: None,
            timeout_secs: None,
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub name: String,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_flavor")]
    pub flavor: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default)]
    pub eviction: EvictionOrder,
    /// Overrides `policies.default` for this fleet's ticks.
    pub default_policy: Option<String>,
}

impl FleetConfig {
    /// A fleet with default naming, flavor, and image.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            name_prefix: default_name_prefix(),
            flavor: default_flavor(),
            image: default_image(),
            eviction: EvictionOrder::default(),
            default_policy: None,
        }
    }
}

impl FleetscaleConfig {
    /// Read, parse, apply environment overrides, and validate.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: FleetscaleConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(AUTH_TOKEN_ENV) {
            self.provider.auth_token = Some(token);
        }
    }

    /// Check everything the core relies on before it is invoked.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fleets.is_empty() {
            return Err(ConfigError::NoFleets);
        }

        let mut seen = HashSet::new();
        for fleet in &self.fleets {
            if fleet.name.trim().is_empty() {
                return Err(ConfigError::InvalidFleet {
                    fleet: fleet.name.clone(),
                    reason: "name must not be empty".to_string(),
                });
            }
            if fleet.name_prefix.trim().is_empty() {
                return Err(ConfigError::InvalidFleet {
                    fleet: fleet.name.clone(),
                    reason: "name_prefix must not be empty".to_string(),
                });
            }
            if !seen.insert(fleet.name.as_str()) {
                return Err(ConfigError::DuplicateFleet(fleet.name.clone()));
            }
        }

        if let Some(capped) = &self.policies.cost_capped {
            if !(capped.daily_budget.is_finite() && capped.daily_budget > 0.0) {
                return Err(ConfigError::InvalidBudget(format!(
                    "daily_budget must be positive, got {}",
                    capped.daily_budget
                )));
            }
            if !(capped.cost_per_server_hour.is_finite() && capped.cost_per_server_hour > 0.0) {
                return Err(ConfigError::InvalidBudget(format!(
                    "cost_per_server_hour must be positive, got {}",
                    capped.cost_per_server_hour
                )));
            }
        }

        if self.provider.max_attempts == 0 {
            return Err(ConfigError::InvalidProvider(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.provider.kind == ProviderKind::Openstack {
            if self.provider.endpoint.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::InvalidProvider(
                    "openstack provider requires an endpoint".to_string(),
                ));
            }
            if self.provider.auth_token.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::InvalidProvider(format!(
                    "openstack provider requires auth_token (or {AUTH_TOKEN_ENV})"
                )));
            }
        }

        Ok(())
    }

    /// Scaffold a single-fleet config backed by the in-memory provider.
    pub fn scaffold(fleet: &str) -> Self {
        FleetscaleConfig {
            server: ServerConfig::default(),
            policies: PoliciesConfig {
                default: default_policy(),
                cost_capped: Some(CostCappedConfig {
                    daily_budget: 100.0,
                    cost_per_server_hour: default_cost_per_server_hour(),
                }),
            },
            provider: ProviderConfig::default(),
            fleets: vec![FleetConfig::named(fleet)],
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/fleetscale")
}

fn default_tick_interval() -> u64 {
    30
}

fn default_history_limit() -> usize {
    1000
}

fn default_policy() -> String {
    "cost-conscious".to_string()
}

fn default_cost_per_server_hour() -> f64 {
    1.0
}

fn default_max_attempts() -> u32 {
    1
}

fn default_base_backoff_ms() -> u64 {
    200
}

fn default_name_prefix() -> String {
    "game-server".to_string()
}

fn default_flavor() -> String {
    "m1.medium".to_string()
}

fn default_image() -> String {
    "game-server-image".to_string()
}
