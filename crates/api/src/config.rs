//! Startup configuration read from the environment.

use std::net::SocketAddr;

use anyhow::Context;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Load demo sites, items and machines at startup.
    pub seed_demo: bool,
}

impl ApiConfig {
    /// `FLEETOPS_BIND_ADDR`, `JWT_SECRET`, `FLEETOPS_SEED_DEMO`.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("FLEETOPS_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("FLEETOPS_BIND_ADDR is not a socket address: {bind_addr}"))?;

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_SECRET.to_string()
        });

        let seed_demo = std::env::var("FLEETOPS_SEED_DEMO")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        Ok(Self {
            bind_addr,
            jwt_secret,
            seed_demo,
        })
    }

    /// In-process configuration for tests and embedding.
    pub fn local(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            seed_demo: false,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("YES"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
