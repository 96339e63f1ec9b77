use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub census: CensusConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("DELEGATED_VOTING_CONFIG")
            .unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("DELEGATED_VOTING_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        assert!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        self.cache.ensure_bounds()?;
        self.census.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub results_max_capacity: u64,
    pub results_ttl_seconds: u64,
    pub sessions_max_capacity: u64,
    pub sessions_ttl_seconds: u64,
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.results_max_capacity >= 10,
            "Results cache capacity must be at least 10"
        );
        // Results are polled; a long TTL would hide fresh ballots.
        assert!(
            self.results_ttl_seconds <= 60,
            "Results cache TTL cannot exceed one minute"
        );
        assert!(
            self.sessions_max_capacity >= 100,
            "Session store capacity must be at least 100"
        );
        assert!(
            (60..=86_400).contains(&self.sessions_ttl_seconds),
            "Session TTL must be between one minute and one day"
        );
        Ok(())
    }

    pub fn results_ttl(&self) -> Duration {
        Duration::from_secs(self.results_ttl_seconds)
    }

    pub fn sessions_ttl(&self) -> Duration {
        Duration::from_secs(self.sessions_ttl_seconds)
    }
}

/// Census matching rules shared by the authorization gate, the tally and the admin forms.
#[derive(Debug, Clone, Deserialize)]
pub struct CensusConfig {
    #[serde(default = "CensusConfig::default_user_global_id_prefix")]
    pub user_global_id_prefix: String,
    #[serde(default = "CensusConfig::default_phone_prefixes")]
    pub phone_prefixes: Vec<String>,
    #[serde(default = "CensusConfig::default_phone_pattern")]
    pub phone_pattern: String,
    /// Zero means authorizations never expire
    #[serde(default = "CensusConfig::default_authorization_expiration_days")]
    pub authorization_expiration_days: u32,
    #[serde(default = "CensusConfig::default_locale")]
    pub default_locale: String,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            user_global_id_prefix: Self::default_user_global_id_prefix(),
            phone_prefixes: Self::default_phone_prefixes(),
            phone_pattern: Self::default_phone_pattern(),
            authorization_expiration_days: Self::default_authorization_expiration_days(),
            default_locale: Self::default_locale(),
        }
    }
}

impl CensusConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.user_global_id_prefix.ends_with('/'),
            "User global id prefix must end with '/'"
        );
        assert!(
            !self.default_locale.is_empty(),
            "Default locale must be specified"
        );
        self.phone_regex()?;
        Ok(())
    }

    pub fn phone_regex(&self) -> Result<Regex> {
        Regex::new(&self.phone_pattern)
            .with_context(|| format!("Invalid census phone pattern {}", self.phone_pattern))
    }

    pub fn authorization_expiration(&self) -> Option<chrono::Duration> {
        if self.authorization_expiration_days == 0 {
            return None;
        }
        Some(chrono::Duration::days(i64::from(
            self.authorization_expiration_days,
        )))
    }

    fn default_user_global_id_prefix() -> String {
        "gid://decidim/Decidim::User/".to_string()
    }

    fn default_phone_prefixes() -> Vec<String> {
        vec!["+34".to_string(), "0034".to_string(), "34".to_string()]
    }

    fn default_phone_pattern() -> String {
        r"^\d{6,15}$".to_string()
    }

    const fn default_authorization_expiration_days() -> u32 {
        90
    }

    fn default_locale() -> String {
        "en".to_string()
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn census_defaults_are_valid() {
        let census = CensusConfig::default();
        assert!(census.ensure_bounds().is_ok());
        assert_eq!(
            census.authorization_expiration(),
            Some(chrono::Duration::days(90))
        );
        assert!(census.phone_regex().unwrap().is_match("666666666"));
    }

    #[test]
    fn zero_expiration_disables_expiry() {
        let census = CensusConfig {
            authorization_expiration_days: 0,
            ..CensusConfig::default()
        };
        assert!(census.authorization_expiration().is_none());
    }

    #[test]
    fn invalid_phone_pattern_is_rejected() {
        let census = CensusConfig {
            phone_pattern: "([".to_string(),
            ..CensusConfig::default()
        };
        assert!(census.phone_regex().is_err());
    }
}
