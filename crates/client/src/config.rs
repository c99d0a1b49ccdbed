//! Client configuration read from the environment.

use std::path::PathBuf;

use anyhow::Context;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_CACHE_TTL_SECS: i64 = 30;
const DEFAULT_SESSION_FILE: &str = "fleetops-session.json";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub cache_ttl: chrono::Duration,
    pub session_path: PathBuf,
}

impl ClientConfig {
    /// `FLEETOPS_API_URL`, `FLEETOPS_API_TOKEN`, `FLEETOPS_CACHE_TTL_SECS`,
    /// `FLEETOPS_SESSION_PATH`.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = std::env::var("FLEETOPS_API_URL").unwrap_or_else(|_| {
            tracing::info!(default = DEFAULT_API_URL, "FLEETOPS_API_URL not set");
            DEFAULT_API_URL.to_string()
        });

        let token = std::env::var("FLEETOPS_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let cache_ttl = match std::env::var("FLEETOPS_CACHE_TTL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("FLEETOPS_CACHE_TTL_SECS is not a number: {raw}"))?,
            Err(_) => DEFAULT_CACHE_TTL_SECS,
        };

        let session_path = std::env::var("FLEETOPS_SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join(DEFAULT_SESSION_FILE));

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            cache_ttl: chrono::Duration::seconds(cache_ttl.max(0)),
            session_path,
        })
    }

    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: None,
            cache_ttl: chrono::Duration::seconds(DEFAULT_CACHE_TTL_SECS),
            session_path: std::env::temp_dir().join(DEFAULT_SESSION_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_dropped() {
        let config = ClientConfig::new("http://localhost:8080/");
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.cache_ttl.num_seconds(), DEFAULT_CACHE_TTL_SECS);
    }
}
