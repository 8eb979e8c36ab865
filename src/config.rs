use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::store::DEFAULT_HISTORY_LIMIT;

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub history_limit: i64,
    pub store_timeout: Duration,
    /// Also push booking-linked messages to participants outside the room.
    pub booking_dual_delivery: bool,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            db_path: PathBuf::from(home_dir).join(".roomhy").join("chat.db"),
            history_limit: DEFAULT_HISTORY_LIMIT,
            store_timeout: Duration::from_millis(5000),
            booking_dual_delivery: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("ROOMHY_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("Invalid ROOMHY_BIND_ADDR: {addr}"))?;
        }
        if let Some(path) = lookup("ROOMHY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(limit) = lookup("ROOMHY_HISTORY_LIMIT") {
            config.history_limit = limit
                .parse::<i64>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("Invalid ROOMHY_HISTORY_LIMIT: {limit}"))?;
        }
        if let Some(ms) = lookup("ROOMHY_STORE_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("Invalid ROOMHY_STORE_TIMEOUT_MS: {ms}"))?;
            config.store_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(flag) = lookup("ROOMHY_BOOKING_DUAL_DELIVERY") {
            config.booking_dual_delivery = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => anyhow::bail!("Invalid ROOMHY_BOOKING_DUAL_DELIVERY: {other}"),
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert!(config.booking_dual_delivery);
        assert!(config.db_path.ends_with(".roomhy/chat.db"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ROOMHY_BIND_ADDR", "127.0.0.1:8080"),
            ("ROOMHY_DB_PATH", "/tmp/chat.db"),
            ("ROOMHY_HISTORY_LIMIT", "25"),
            ("ROOMHY_STORE_TIMEOUT_MS", "250"),
            ("ROOMHY_BOOKING_DUAL_DELIVERY", "off"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("/tmp/chat.db"));
        assert_eq!(config.history_limit, 25);
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert!(!config.booking_dual_delivery);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("ROOMHY_BIND_ADDR", "nowhere")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ROOMHY_HISTORY_LIMIT", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ROOMHY_BOOKING_DUAL_DELIVERY", "maybe")])).is_err());
    }
}
