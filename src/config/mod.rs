//! Configuration module - environment variable parsing

mod tuning;

pub use tuning::MatchConfig;

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, `*` for any
    pub client_origins: Vec<String>,
    /// Player cap for each match
    pub max_players_per_match: usize,
    /// Fixed seed for new matches, random when unset
    pub match_seed: Option<u64>,
    /// Rules and tuning handed to every new match
    pub match_config: MatchConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Hosting platforms hand us PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            client_origins,

            max_players_per_match: parse_var(&lookup, "MAX_PLAYERS_PER_MATCH")?
                .unwrap_or(4usize)
                .max(1),

            match_seed: parse_var(&lookup, "MATCH_SEED")?,

            match_config: MatchConfig::default().with_overrides(&lookup)?,
        })
    }

    /// True when any origin is accepted
    pub fn allows_any_origin(&self) -> bool {
        self.client_origins.is_empty() || self.client_origins.iter().any(|o| o == "*")
    }
}

/// Parse an optional variable. Present but unparseable is an error.
pub(crate) fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_players_per_match, 4);
        assert!(config.match_seed.is_none());
        assert!(config.allows_any_origin());
    }

    #[test]
    fn test_port_wins_over_server_addr() {
        let config =
            Config::from_lookup(lookup(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:7000")])).unwrap();
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn test_origins_split() {
        let config = Config::from_lookup(lookup(&[(
            "CLIENT_ORIGIN",
            "http://a.test, http://b.test",
        )]))
        .unwrap();
        assert_eq!(config.client_origins, vec!["http://a.test", "http://b.test"]);
        assert!(!config.allows_any_origin());
    }

    #[test]
    fn test_bad_values_are_errors() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("SERVER_ADDR", "nope")])),
            Err(ConfigError::InvalidAddress)
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("MATCH_SEED", "abc")])),
            Err(ConfigError::Invalid { key: "MATCH_SEED", .. })
        ));
    }

    #[test]
    fn test_seed_and_player_cap() {
        let config =
            Config::from_lookup(lookup(&[("MATCH_SEED", "42"), ("MAX_PLAYERS_PER_MATCH", "0")])).unwrap();
        assert_eq!(config.match_seed, Some(42));
        assert_eq!(config.max_players_per_match, 1);
    }
}
