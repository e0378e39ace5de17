//! Runtime configuration, read from environment variables with defaults.
use std::env;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// sled database directory
    pub db_path: String,
    /// Address the webhook server listens on
    pub bind_addr: SocketAddr,
    /// Shared secret for webhook signatures. Unsigned webhooks are accepted when unset.
    pub webhook_secret: Option<String>,
    /// Sender id stamped on automated notifications. The oldest admin account when unset.
    pub system_sender: Option<String>,
    /// Currency recorded on new transactions
    pub currency: String,
    /// Default tracing filter when `RUST_LOG` is not set
    pub log_filter: String,
    /// Account created on first start when no admin exists
    pub admin_username: String,
    pub admin_email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "don_records.db".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            webhook_secret: None,
            system_sender: None,
            currency: "USD".to_string(),
            log_filter: "info".to_string(),
            admin_username: "admin".to_string(),
            admin_email: "admin@donrecords.local".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let bind_addr = match lookup("DON_RECORDS_BIND") {
            Some(addr) => addr
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid DON_RECORDS_BIND {addr:?}: {e}"))?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            db_path: lookup("DON_RECORDS_DB_PATH").unwrap_or(defaults.db_path),
            bind_addr,
            webhook_secret: lookup("DON_RECORDS_WEBHOOK_SECRET").filter(|s| !s.is_empty()),
            system_sender: lookup("DON_RECORDS_SYSTEM_SENDER").filter(|s| !s.is_empty()),
            currency: lookup("DON_RECORDS_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or(defaults.currency),
            log_filter: lookup("DON_RECORDS_LOG").unwrap_or(defaults.log_filter),
            admin_username: lookup("DON_RECORDS_ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_email: lookup("DON_RECORDS_ADMIN_EMAIL").unwrap_or(defaults.admin_email),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn reads_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DON_RECORDS_BIND", "0.0.0.0:9000"),
            ("DON_RECORDS_WEBHOOK_SECRET", "s3cret"),
            ("DON_RECORDS_CURRENCY", "kes"),
            ("DON_RECORDS_SYSTEM_SENDER", "user1ops"),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.currency, "KES");
        assert_eq!(config.system_sender.as_deref(), Some("user1ops"));
    }

    #[test]
    fn empty_secret_means_unsigned() {
        let config = Config::from_lookup(|k| {
            (k == "DON_RECORDS_WEBHOOK_SECRET").then(String::new)
        })
        .unwrap();
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn bad_bind_address_is_an_error() {
        let res = Config::from_lookup(|k| (k == "DON_RECORDS_BIND").then(|| "nope".to_string()));
        assert!(res.is_err());
    }
}
