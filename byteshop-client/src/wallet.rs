//! Wallet capability
//!
//! The purchase flow never holds key material. It asks a wallet to derive the one-time
//! payment key and to build, sign and broadcast the funding action.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::key_derivation::KeyDerivationRequest;
use crate::transport::endpoint_url;
use crate::types::{ActionResult, ResponseStatus};

/// Errors raised by a wallet implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The wallet could not be reached
    #[error("Wallet unavailable: {0}")]
    Unavailable(String),

    /// The wallet answered with an error status
    #[error("Wallet rejected request ({code}): {description}")]
    Rejected { code: String, description: String },

    /// The wallet answered with something that is not the expected shape
    #[error("Invalid wallet response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        WalletError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::InvalidResponse(e.to_string())
    }
}

/// Network the wallet operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WalletNetwork {
    #[default]
    Mainnet,
    Testnet,
}

impl WalletNetwork {
    /// Interpret a wallet's network name; only `"testnet"` is a test network
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("testnet") {
            WalletNetwork::Testnet
        } else {
            WalletNetwork::Mainnet
        }
    }
}

/// One output of a funding action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingOutput {
    /// Hex locking script
    pub script: String,
    pub satoshis: u64,
}

/// Request to build and broadcast a funding action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateActionRequest {
    pub description: String,
    pub outputs: Vec<FundingOutput>,
}

/// Wallet operations used by the purchase flow
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Derive a public key (hex) for the given protocol, key id and counterparty
    async fn derive_public_key(&self, request: &KeyDerivationRequest) -> Result<String, WalletError>;

    /// Build, sign and broadcast an action
    ///
    /// A wallet-side refusal may come back either as `Err(Rejected)` or as an
    /// `ActionResult` whose status is `error`; callers handle both.
    async fn create_action(&self, request: &CreateActionRequest) -> Result<ActionResult, WalletError>;

    /// Network the wallet is connected to
    async fn network(&self) -> Result<WalletNetwork, WalletError>;
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NetworkResponse {
    network: Option<String>,
}

/// Wallet reached over its local JSON API
#[derive(Debug, Clone)]
pub struct HttpWallet {
    base_url: String,
    client: reqwest::Client,
}

impl HttpWallet {
    /// Connect to the wallet service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, path: &str, body: Option<Value>) -> Result<Value, WalletError> {
        let url = endpoint_url(&self.base_url, path)
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;

        tracing::debug!(url = %url, "calling wallet");

        let request = match body {
            Some(body) => self.client.post(url).json(&body),
            None => self.client.get(url),
        };
        let value = read_response(request.send().await?).await?;
        if ResponseStatus::of(&value).is_error() {
            return Err(rejection(&value));
        }
        Ok(value)
    }
}

/// Read a wallet response body
///
/// A non-success HTTP status only gets through when it carries a structured
/// `status: "error"` body; anything else means the wallet is not usable.
async fn read_response(response: reqwest::Response) -> Result<Value, WalletError> {
    let status = response.status();
    let text = response.text().await?;
    let parsed = serde_json::from_str::<Value>(&text);

    if !status.is_success() {
        return match parsed {
            Ok(value) if ResponseStatus::of(&value).is_error() => Ok(value),
            _ => {
                tracing::debug!(status = status.as_u16(), "wallet failed without structured error");
                Err(WalletError::Unavailable(format!(
                    "wallet returned HTTP {}",
                    status.as_u16()
                )))
            }
        };
    }
    parsed.map_err(|e| WalletError::InvalidResponse(format!("wallet response is not JSON: {}", e)))
}

/// Turn a `status: "error"` body into a rejection with fallback code and description
fn rejection(value: &Value) -> WalletError {
    let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
    WalletError::Rejected {
        code: field("code").unwrap_or_else(|| crate::error::UNKNOWN_ERROR.to_string()),
        description: field("description")
            .unwrap_or_else(|| crate::error::DEFAULT_ERROR_DESCRIPTION.to_string()),
    }
}

#[async_trait]
impl Wallet for HttpWallet {
    async fn derive_public_key(&self, request: &KeyDerivationRequest) -> Result<String, WalletError> {
        let value = self
            .call("/v1/getPublicKey", Some(serde_json::to_value(request)?))
            .await?;
        let response: PublicKeyResponse = serde_json::from_value(value)?;
        response
            .public_key
            .ok_or_else(|| WalletError::InvalidResponse("missing publicKey".into()))
    }

    async fn create_action(&self, request: &CreateActionRequest) -> Result<ActionResult, WalletError> {
        // Structured error bodies are returned as-is so the caller sees the wallet's own status
        let url = endpoint_url(&self.base_url, "/v1/createAction")
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;
        tracing::debug!(url = %url, "calling wallet");
        let response = self.client.post(url).json(request).send().await?;
        let value = read_response(response).await?;
        if !value.is_object() {
            return Err(WalletError::InvalidResponse("action result is not an object".into()));
        }
        Ok(ActionResult::from_value(value))
    }

    async fn network(&self) -> Result<WalletNetwork, WalletError> {
        let value = self.call("/v1/getNetwork", None).await?;
        let response: NetworkResponse = serde_json::from_value(value)?;
        let name = response
            .network
            .ok_or_else(|| WalletError::InvalidResponse("missing network".into()))?;
        Ok(WalletNetwork::from_name(&name))
    }
}
