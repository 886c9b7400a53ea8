use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_PREFIX: &str = "!";
const DEFAULT_YTDLP: &str = "yt-dlp";
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("expected {0} in the environment")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{0} is set but {1} is not")]
    Incomplete(&'static str, &'static str),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub discord_token: String,
    pub command_prefix: String,
    pub ytdlp_path: String,
    pub spotify: Option<SpotifyCredentials>,
    pub soundcloud_client_id: Option<String>,
    pub poll_interval: Duration,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        let discord_token = var("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let spotify = match (var("SPOTIFY_CLIENT_ID"), var("SPOTIFY_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyCredentials { client_id, client_secret }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Incomplete("SPOTIFY_CLIENT_ID", "SPOTIFY_CLIENT_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Incomplete("SPOTIFY_CLIENT_SECRET", "SPOTIFY_CLIENT_ID")),
        };

        let poll_interval = match var("POLL_INTERVAL_MS") {
            Some(value) => match value.parse::<u64>() {
                Ok(millis) if millis > 0 => Duration::from_millis(millis),
                _ => return Err(ConfigError::Invalid { name: "POLL_INTERVAL_MS", value }),
            },
            None => Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        };

        Ok(Self {
            discord_token,
            command_prefix: var("COMMAND_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            ytdlp_path: var("YTDLP_PATH").unwrap_or_else(|| DEFAULT_YTDLP.to_string()),
            spotify,
            soundcloud_client_id: var("SOUNDCLOUD_CLIENT_ID"),
            poll_interval,
            log_dir: var("LOG_DIR").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_only_need_a_token() {
        let config = config(&[("DISCORD_TOKEN", "token")]).unwrap();

        assert_eq!(config.discord_token, "token");
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert_eq!(config.spotify, None);
        assert_eq!(config.soundcloud_client_id, None);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn token_is_required() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("DISCORD_TOKEN")));
        assert_eq!(config(&[("DISCORD_TOKEN", "  ")]), Err(ConfigError::Missing("DISCORD_TOKEN")));
    }

    #[test]
    fn spotify_needs_both_credentials() {
        let partial = config(&[("DISCORD_TOKEN", "t"), ("SPOTIFY_CLIENT_ID", "id")]);
        assert_eq!(partial, Err(ConfigError::Incomplete("SPOTIFY_CLIENT_ID", "SPOTIFY_CLIENT_SECRET")));

        let full = config(&[
            ("DISCORD_TOKEN", "t"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        assert_eq!(
            full.spotify,
            Some(SpotifyCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            })
        );
    }

    #[test]
    fn poll_interval_must_be_positive_millis() {
        let custom = config(&[("DISCORD_TOKEN", "t"), ("POLL_INTERVAL_MS", "250")]).unwrap();
        assert_eq!(custom.poll_interval, Duration::from_millis(250));

        for bad in ["0", "fast", "-3"] {
            assert_eq!(
                config(&[("DISCORD_TOKEN", "t"), ("POLL_INTERVAL_MS", bad)]),
                Err(ConfigError::Invalid {
                    name: "POLL_INTERVAL_MS",
                    value: bad.to_string(),
                })
            );
        }
    }
}
