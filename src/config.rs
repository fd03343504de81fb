//! Application-level configuration loading: API tokens, finalizer cadence and league rules.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LEAGUE_AUCTION_CONFIG_PATH";

const DEFAULT_FINALIZER_INTERVAL_SECS: u64 = 30;
const DEFAULT_INCOMPLETE_AMOUNT: i64 = 1000;
const DEFAULT_MAX_TRANSFERS_PER_SEASON: u32 = 2;

/// Role granted to the bearer of an API token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    /// Super administrator.
    Admin,
    /// Committee member running auctions and transfers.
    CommitteeAdmin,
    /// Team manager acting on behalf of one team.
    Team {
        /// Identifier of the team the token belongs to.
        team_id: String,
    },
    /// External scheduler allowed to trigger finalization sweeps.
    Scheduler,
}

/// Authenticated caller resolved from an API token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Principal {
    /// Display name used in audit records.
    pub name: String,
    /// Granted role.
    #[serde(flatten)]
    pub role: Role,
}

impl Principal {
    /// Whether the principal may run committee operations.
    pub fn is_committee(&self) -> bool {
        matches!(self.role, Role::Admin | Role::CommitteeAdmin)
    }

    /// Team identifier when the principal is a team manager.
    pub fn team_id(&self) -> Option<&str> {
        match &self.role {
            Role::Team { team_id } => Some(team_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    tokens: Vec<(String, Principal)>,
    /// Whether the background auto-finalizer runs.
    pub finalizer_enabled: bool,
    /// Delay between two auto-finalizer sweeps.
    pub finalizer_interval: Duration,
    /// Price charged to incomplete teams when no regular allocation happened.
    pub incomplete_default_amount: i64,
    /// Maximum number of transfer operations a team may perform per season.
    pub max_transfers_per_season: u32,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        tokens = app_config.tokens.len(),
                        "loaded application config"
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

    /// Parse a configuration document.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Resolve the principal owning `token`.
    pub fn principal_for(&self, token: &str) -> Option<&Principal> {
        self.tokens
            .iter()
            .find(|(candidate, _)| candidate == token)
            .map(|(_, principal)| principal)
    }

    /// Register an extra token, mostly useful for tests and local runs.
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.push((token.into(), principal));
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    tokens: Vec<RawToken>,
    #[serde(default)]
    finalizer: RawFinalizer,
    #[serde(default)]
    auction: RawAuction,
    #[serde(default)]
    transfers: RawTransfers,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    token: String,
    #[serde(flatten)]
    principal: Principal,
}

#[derive(Debug, Deserialize)]
struct RawFinalizer {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_interval")]
    interval_secs: u64,
}

impl Default for RawFinalizer {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_FINALIZER_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAuction {
    #[serde(default = "default_incomplete_amount")]
    incomplete_default_amount: i64,
}

impl Default for RawAuction {
    fn default() -> Self {
        Self {
            incomplete_default_amount: DEFAULT_INCOMPLETE_AMOUNT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTransfers {
    #[serde(default = "default_max_transfers")]
    max_per_season: u32,
}

impl Default for RawTransfers {
    fn default() -> Self {
        Self {
            max_per_season: DEFAULT_MAX_TRANSFERS_PER_SEASON,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    DEFAULT_FINALIZER_INTERVAL_SECS
}

fn default_incomplete_amount() -> i64 {
    DEFAULT_INCOMPLETE_AMOUNT
}

fn default_max_transfers() -> u32 {
    DEFAULT_MAX_TRANSFERS_PER_SEASON
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            tokens: value
                .tokens
                .into_iter()
                .map(|raw| (raw.token, raw.principal))
                .collect(),
            finalizer_enabled: value.finalizer.enabled,
            finalizer_interval: Duration::from_secs(value.finalizer.interval_secs.max(1)),
            incomplete_default_amount: value.auction.incomplete_default_amount,
            max_transfers_per_season: value.transfers.max_per_season,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert!(config.finalizer_enabled);
        assert_eq!(config.finalizer_interval, Duration::from_secs(30));
        assert_eq!(config.incomplete_default_amount, 1000);
        assert_eq!(config.max_transfers_per_season, 2);
        assert!(config.principal_for("anything").is_none());
    }

    #[test]
    fn tokens_resolve_to_principals() {
        let config = AppConfig::from_json(
            r#"{
                "tokens": [
                    {"token": "c0ffee", "name": "committee", "role": "committee_admin"},
                    {"token": "t1", "name": "Blue FC", "role": "team", "team_id": "SSPSLT0001"}
                ],
                "finalizer": {"enabled": false, "interval_secs": 10},
                "transfers": {"max_per_season": 3}
            }"#,
        )
        .unwrap();

        let committee = config.principal_for("c0ffee").unwrap();
        assert!(committee.is_committee());
        assert_eq!(committee.team_id(), None);

        let team = config.principal_for("t1").unwrap();
        assert!(!team.is_committee());
        assert_eq!(team.team_id(), Some("SSPSLT0001"));

        assert!(!config.finalizer_enabled);
        assert_eq!(config.finalizer_interval, Duration::from_secs(10));
        assert_eq!(config.max_transfers_per_season, 3);
    }

    #[test]
    fn invalid_role_is_rejected() {
        assert!(AppConfig::from_json(r#"{"tokens":[{"token":"x","name":"x","role":"root"}]}"#).is_err());
    }
}
