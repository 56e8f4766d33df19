//! Application-level configuration read from the environment at startup.

use std::{env, time::Duration};

use tracing::{info, warn};

/// Default bound port when neither `PORT` nor `SERVER_PORT` is set.
const DEFAULT_PORT: u16 = 8080;
/// Default minimum number of tracks accepted by `startGame`.
const DEFAULT_MIN_TRACKS: usize = 1;
/// Default cooldown after the official search API reports quota exhaustion.
const DEFAULT_SEARCH_COOLDOWN: Duration = Duration::from_secs(6 * 60 * 60);

/// Client credentials for the catalog provider requiring OAuth.
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Port the HTTP listener binds to.
    pub port: u16,
    /// Allowed CORS origins; empty means permissive.
    pub allowed_origins: Vec<String>,
    /// Catalog credentials for playlist enumeration, when configured.
    pub spotify_credentials: Option<SpotifyCredentials>,
    /// API key for the official video-site search API.
    pub youtube_api_key: Option<String>,
    /// Endpoint of the identity collaborator verifying bearer tokens.
    pub token_verify_url: Option<String>,
    /// Minimum number of tracks a game may start with.
    pub min_tracks: usize,
    /// Optional cap on the number of rounds per game.
    pub round_limit: Option<usize>,
    /// How long the official search API stays suppressed after a quota failure.
    pub search_cooldown: Duration,
}

impl AppConfig {
    /// Load the configuration from the environment, logging what was found.
    pub fn load() -> Self {
        let port = env::var("PORT")
            .or_else(|_| env::var("SERVER_PORT"))
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let spotify_credentials = match (
            env::var("SPOTIFY_CLIENT_ID").ok(),
            env::var("SPOTIFY_CLIENT_SECRET").ok(),
        ) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyCredentials {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            _ => {
                warn!("incomplete Spotify credentials; catalog provider disabled");
                None
            }
        };

        let youtube_api_key = env::var("YOUTUBE_API_KEY").ok();
        if youtube_api_key.is_none() {
            info!("no YouTube API key; official search fallback disabled");
        }

        let token_verify_url = env::var("TOKEN_VERIFY_URL").ok();
        if token_verify_url.is_none() {
            info!("no token verifier endpoint; all members join unauthenticated");
        }

        let min_tracks = parse_env("MIN_TRACKS").unwrap_or(DEFAULT_MIN_TRACKS);
        let round_limit = parse_env("ROUND_LIMIT");
        let search_cooldown = parse_env("SEARCH_COOLDOWN_SECS")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SEARCH_COOLDOWN);

        info!(
            port,
            origins = allowed_origins.len(),
            min_tracks,
            "configuration loaded"
        );

        Self {
            port,
            allowed_origins,
            spotify_credentials,
            youtube_api_key,
            token_verify_url,
            min_tracks,
            round_limit,
            search_cooldown,
        }
    }

    /// Number of rounds a pool of `pool_len` tracks can run.
    pub fn effective_round_count(&self, pool_len: usize) -> usize {
        match self.round_limit {
            Some(limit) => pool_len.min(limit),
            None => pool_len,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: Vec::new(),
            spotify_credentials: None,
            youtube_api_key: None,
            token_verify_url: None,
            min_tracks: DEFAULT_MIN_TRACKS,
            round_limit: None,
            search_cooldown: DEFAULT_SEARCH_COOLDOWN,
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &str) -> Option<T> {
    match env::var(var) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(var, value = %raw, "ignoring unparseable environment value");
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_count_defaults_to_pool_length() {
        let config = AppConfig::default();
        assert_eq!(config.effective_round_count(7), 7);
    }

    #[test]
    fn round_limit_caps_pool_length() {
        let config = AppConfig {
            round_limit: Some(20),
            ..AppConfig::default()
        };
        assert_eq!(config.effective_round_count(50), 20);
        assert_eq!(config.effective_round_count(5), 5);
    }
}
