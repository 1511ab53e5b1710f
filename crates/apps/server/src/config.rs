use std::env;
use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TOPOMAP_ADDR `{0}`")]
    Addr(String),
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub token_ttl_days: i64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup("TOPOMAP_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = raw.parse().map_err(|_| ConfigError::Addr(raw.clone()))?;
        let token_ttl_days = lookup("TOPOMAP_TOKEN_TTL_DAYS")
            .and_then(|v| v.parse().ok())
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_TOKEN_TTL_DAYS);
        Ok(Self {
            addr,
            token_ttl_days,
        })
    }

    pub fn token_ttl_ms(&self) -> i64 {
        self.token_ttl_days * 24 * 60 * 60 * 1_000
    }
}

#[cfg(test)]
mod tests {
    use super::ServerConfig;

    #[test]
    fn defaults_and_overrides() {
        let cfg = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.addr.to_string(), "127.0.0.1:5000");
        assert_eq!(cfg.token_ttl_days, 30);

        let cfg = ServerConfig::from_lookup(|key| match key {
            "TOPOMAP_ADDR" => Some("0.0.0.0:8080".to_string()),
            "TOPOMAP_TOKEN_TTL_DAYS" => Some("-3".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.addr.port(), 8080);
        assert_eq!(cfg.token_ttl_days, 30);
        assert_eq!(cfg.token_ttl_ms(), 30 * 86_400_000);

        assert!(ServerConfig::from_lookup(|_| Some("nowhere".to_string())).is_err());
    }
}
