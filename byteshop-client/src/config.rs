//! Client configuration.

use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::wallet::WalletNetwork;
use crate::{DEFAULT_PURCHASE_DESCRIPTION, DEFAULT_WALLET_URL};

/// Request timeout when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid URL in {var}: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Known Byte Shop deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEnvironment {
    Localhost,
    Staging,
    Production,
}

impl ServerEnvironment {
    pub const ALL: [ServerEnvironment; 3] = [
        ServerEnvironment::Localhost,
        ServerEnvironment::Staging,
        ServerEnvironment::Production,
    ];

    pub fn url(&self) -> &'static str {
        match self {
            ServerEnvironment::Localhost => "http://localhost:3002",
            ServerEnvironment::Staging => "https://staging-byte-shop.babbage.systems",
            ServerEnvironment::Production => "https://byte-shop.babbage.systems",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEnvironment::Localhost => "localhost",
            ServerEnvironment::Staging => "staging",
            ServerEnvironment::Production => "production",
        }
    }

    /// Shop that matches the wallet's network.
    pub fn for_network(network: WalletNetwork) -> Self {
        match network {
            WalletNetwork::Testnet => ServerEnvironment::Staging,
            WalletNetwork::Mainnet => ServerEnvironment::Production,
        }
    }
}

/// Byte Shop client configuration.
#[derive(Clone, Debug)]
pub struct ByteShopConfig {
    /// Shop URL. When unset it is picked from the wallet's network.
    pub server_url: Option<Url>,
    /// Description attached to the funding action and the payment.
    pub description: String,
    /// Per-request timeout for shop and wallet calls.
    pub request_timeout: Duration,
    /// Local wallet service.
    pub wallet_url: String,
    /// Hex secret key used to sign shop requests. Ephemeral when unset.
    pub identity_key: Option<String>,
}

impl Default for ByteShopConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            description: DEFAULT_PURCHASE_DESCRIPTION.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            wallet_url: DEFAULT_WALLET_URL.to_string(),
            identity_key: None,
        }
    }
}

impl ByteShopConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = non_empty(lookup("BYTESHOP_SERVER_URL")) {
            config.server_url = Some(parse_url("BYTESHOP_SERVER_URL", &raw)?);
        }

        if let Some(description) = non_empty(lookup("BYTESHOP_DESCRIPTION")) {
            config.description = description;
        }

        if let Some(raw) = non_empty(lookup("BYTESHOP_TIMEOUT_SECS")) {
            let secs: u64 = raw
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    var: "BYTESHOP_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = non_empty(lookup("BYTESHOP_WALLET_URL")) {
            config.wallet_url = parse_url("BYTESHOP_WALLET_URL", &raw)?.to_string();
        }

        config.identity_key = non_empty(lookup("BYTESHOP_IDENTITY_KEY"));

        Ok(config)
    }

    /// Pin the shop URL.
    pub fn with_server_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.server_url = Some(parse_url("server_url", raw)?);
        Ok(self)
    }

    pub fn with_wallet_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.wallet_url = parse_url("wallet_url", raw)?.to_string();
        Ok(self)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        var,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            var,
            reason: format!("unsupported scheme {}", other),
        }),
    }
}
