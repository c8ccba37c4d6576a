//! Application-level configuration loading: lease TTL, voice rules and the premium guild list.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::{dao::models::GuildId, services::policy::VoiceRules};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "AUTOMUTE_SYNC_CONFIG_PATH";
/// Lease TTL used when the configuration does not set one.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(5);

/// Immutable runtime configuration shared across the application.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Lifetime of a game state lease; writes after it elapses fail.
    #[serde(rename = "lease_ttl_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub lease_ttl: Duration,
    /// Rules applied to every guild without an override.
    pub voice_rules: VoiceRules,
    /// Per-guild rule overrides.
    pub guild_voice_rules: HashMap<GuildId, VoiceRules>,
    /// Guilds whose enforcement requests are tagged premium.
    pub premium_guilds: Vec<GuildId>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lease_ttl: DEFAULT_LEASE_TTL,
            voice_rules: VoiceRules::default(),
            guild_voice_rules: HashMap::new(),
            premium_guilds: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        lease_ttl_ms = config.lease_ttl.as_millis() as u64,
                        overrides = config.guild_voice_rules.len(),
                        premium = config.premium_guilds.len(),
                        "loaded configuration"
                    );
                    config
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

    /// Parse a configuration document. A zero TTL is replaced by [`DEFAULT_LEASE_TTL`].
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(contents)?;
        if config.lease_ttl.is_zero() {
            config.lease_ttl = DEFAULT_LEASE_TTL;
        }
        Ok(config)
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
    use crate::services::policy::VoiceRule;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn full_document_is_parsed() {
        let config = AppConfig::from_json(
            r#"{
                "lease_ttl_ms": 2500,
                "voice_rules": {"lobby": {"alive": {"mute": true}}},
                "guild_voice_rules": {"141": {"discussion": {"dead": {"mute": true, "deaf": true}}}},
                "premium_guilds": ["141", "242"]
            }"#,
        )
        .unwrap();

        assert_eq!(config.lease_ttl, Duration::from_millis(2500));
        assert_eq!(config.voice_rules.lobby.alive, VoiceRule { mute: true, deaf: false });
        // Sections left out of an override fall back to empty rules, not the defaults.
        let guild_rules = &config.guild_voice_rules[&GuildId::from("141")];
        assert_eq!(guild_rules.discussion.dead, VoiceRule { mute: true, deaf: true });
        assert_eq!(guild_rules.tasks.alive, VoiceRule::default());
        assert_eq!(config.premium_guilds, vec!["141".into(), "242".into()]);
    }

    #[test]
    fn zero_ttl_falls_back_to_default() {
        let config = AppConfig::from_json(r#"{"lease_ttl_ms": 0}"#).unwrap();
        assert_eq!(config.lease_ttl, DEFAULT_LEASE_TTL);
    }

    #[test]
    fn invalid_document_is_rejected() {
        assert!(AppConfig::from_json(r#"{"lease_ttl_ms": "soon"}"#).is_err());
    }
}
