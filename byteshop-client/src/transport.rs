//! Authenticated RPC to the shop
//!
//! The flow only needs "POST this JSON to that path, signed as me, give me the JSON
//! back". [`AuthenticatedTransport`] is that seam; [`HttpTransport`] implements it
//! over HTTPS with a pluggable [`RequestSigner`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::entropy::EntropySource;
use crate::types::ResponseStatus;

/// Header carrying the caller's identity key (compressed, hex)
pub const HEADER_IDENTITY_KEY: &str = "x-byteshop-identity-key";

/// Header carrying the per-request nonce (base64)
pub const HEADER_NONCE: &str = "x-byteshop-nonce";

/// Header carrying the DER signature (hex)
pub const HEADER_SIGNATURE: &str = "x-byteshop-signature";

/// Random bytes in a request nonce
const NONCE_BYTES: usize = 32;

/// Errors below the level of a structured shop response
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request could not be sent or the response not read
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success status without a structured error body
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Request or response body was not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Signing the request failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// Base URL and path do not form a valid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        TransportError::InvalidUrl(e.to_string())
    }
}

/// Signed request/response channel to a shop
#[async_trait]
pub trait AuthenticatedTransport: Send + Sync {
    /// POST `body` to `base_url + path`, authenticated, and return the JSON response
    async fn post_signed(
        &self,
        base_url: &str,
        path: &str,
        body: Value,
    ) -> Result<Value, TransportError>;
}

/// Produces authentication headers for a request
pub trait RequestSigner: Send + Sync {
    /// Headers to attach to a request to `path` with the serialized `body`
    fn sign(&self, path: &str, body: &[u8]) -> Result<Vec<(String, String)>, TransportError>;
}

/// Signs requests with a secp256k1 identity key
///
/// Signature = ECDSA over `SHA256(nonce || path || body)`.
pub struct IdentityKeySigner {
    secret_key: SecretKey,
    identity_key: PublicKey,
    entropy: Arc<dyn EntropySource>,
}

impl IdentityKeySigner {
    /// Use an existing identity key given as 32-byte hex
    pub fn from_hex(secret_key_hex: &str, entropy: Arc<dyn EntropySource>) -> Result<Self, TransportError> {
        let bytes = hex::decode(secret_key_hex.trim())
            .map_err(|e| TransportError::Signing(format!("Invalid identity key hex: {}", e)))?;
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| TransportError::Signing(format!("Invalid identity key: {}", e)))?;
        Ok(Self::from_secret_key(secret_key, entropy))
    }

    /// Generate a throwaway identity for this process
    pub fn ephemeral(entropy: Arc<dyn EntropySource>) -> Self {
        let secret_key = loop {
            let mut bytes = [0u8; 32];
            entropy.fill(&mut bytes);
            // Out-of-range scalars are astronomically rare; draw again
            if let Ok(key) = SecretKey::from_slice(&bytes) {
                break key;
            }
        };
        Self::from_secret_key(secret_key, entropy)
    }

    fn from_secret_key(secret_key: SecretKey, entropy: Arc<dyn EntropySource>) -> Self {
        let identity_key = PublicKey::from_secret_key(SECP256K1, &secret_key);
        Self {
            secret_key,
            identity_key,
            entropy,
        }
    }

    /// Compressed identity key as hex
    pub fn identity_key(&self) -> String {
        hex::encode(self.identity_key.serialize())
    }

    /// Digest that gets signed
    pub fn signing_digest(nonce: &str, path: &str, body: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(nonce.as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(body);
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for IdentityKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeySigner")
            .field("identity_key", &self.identity_key())
            // Never print the secret key
            .finish_non_exhaustive()
    }
}

impl RequestSigner for IdentityKeySigner {
    fn sign(&self, path: &str, body: &[u8]) -> Result<Vec<(String, String)>, TransportError> {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        self.entropy.fill(&mut nonce_bytes);
        let nonce = STANDARD.encode(nonce_bytes);

        let digest = Self::signing_digest(&nonce, path, body);
        let message = Message::from_digest(digest);
        let signature = SECP256K1.sign_ecdsa(&message, &self.secret_key);

        Ok(vec![
            (HEADER_IDENTITY_KEY.to_string(), self.identity_key()),
            (HEADER_NONCE.to_string(), nonce),
            (
                HEADER_SIGNATURE.to_string(),
                hex::encode(signature.serialize_der()),
            ),
        ])
    }
}

/// HTTPS transport with JSON bodies
pub struct HttpTransport<S> {
    client: reqwest::Client,
    signer: S,
}

impl<S: RequestSigner> HttpTransport<S> {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(signer: S, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, signer })
    }
}

/// Join a base URL and an absolute path without doubling the slash
pub fn endpoint_url(base_url: &str, path: &str) -> Result<url::Url, TransportError> {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(url::Url::parse(&format!("{}/{}", base, path))?)
}

#[async_trait]
impl<S: RequestSigner> AuthenticatedTransport for HttpTransport<S> {
    async fn post_signed(
        &self,
        base_url: &str,
        path: &str,
        body: Value,
    ) -> Result<Value, TransportError> {
        let url = endpoint_url(base_url, path)?;
        let payload = serde_json::to_vec(&body)?;
        let headers = self.signer.sign(path, &payload)?;

        tracing::debug!(url = %url, bytes = payload.len(), "sending signed request");

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let parsed = serde_json::from_str::<Value>(&text);
        if status.is_success() {
            return parsed.map_err(|e| {
                TransportError::Serialization(format!("Response is not JSON: {}", e))
            });
        }

        // Structured shop errors arrive with 4xx/5xx too; keep code and description
        match parsed {
            Ok(value) if ResponseStatus::of(&value).is_error() => Ok(value),
            _ => {
                tracing::debug!(status = status.as_u16(), "request failed without structured error");
                Err(TransportError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::SeededEntropy;
    use secp256k1::ecdsa::Signature;

    fn signer() -> IdentityKeySigner {
        IdentityKeySigner::ephemeral(Arc::new(SeededEntropy::from_seed(5)))
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> &'a str {
        headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_signature_verifies() {
        let signer = signer();
        let body = br#"{"numberOfBytes":14,"cool":false}"#;
        let headers = signer.sign("/invoice", body).unwrap();

        let identity = header(&headers, HEADER_IDENTITY_KEY);
        assert_eq!(identity, signer.identity_key());

        let nonce = header(&headers, HEADER_NONCE);
        let digest = IdentityKeySigner::signing_digest(nonce, "/invoice", body);
        let signature =
            Signature::from_der(&hex::decode(header(&headers, HEADER_SIGNATURE)).unwrap()).unwrap();
        let key = PublicKey::from_slice(&hex::decode(identity).unwrap()).unwrap();

        assert!(SECP256K1
            .verify_ecdsa(&Message::from_digest(digest), &signature, &key)
            .is_ok());
    }

    #[test]
    fn test_nonce_changes_per_request() {
        let signer = signer();
        let a = signer.sign("/pay", b"{}").unwrap();
        let b = signer.sign("/pay", b"{}").unwrap();
        assert_ne!(header(&a, HEADER_NONCE), header(&b, HEADER_NONCE));
    }

    #[test]
    fn test_from_hex() {
        let entropy: Arc<dyn EntropySource> = Arc::new(SeededEntropy::from_seed(1));
        let key = format!("{:064x}", 1);
        let signer = IdentityKeySigner::from_hex(&key, entropy.clone()).unwrap();
        assert_eq!(
            signer.identity_key(),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );

        assert!(IdentityKeySigner::from_hex("zz", entropy.clone()).is_err());
        assert!(IdentityKeySigner::from_hex(&"00".repeat(32), entropy).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = signer();
        let debug = format!("{:?}", signer);
        assert!(debug.contains(&signer.identity_key()));
        assert!(!debug.contains(&hex::encode(signer.secret_key.secret_bytes())));
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("http://localhost:3002", "/invoice").unwrap().as_str(),
            "http://localhost:3002/invoice"
        );
        assert_eq!(
            endpoint_url("https://byte-shop.babbage.systems/", "/pay").unwrap().as_str(),
            "https://byte-shop.babbage.systems/pay"
        );
        assert!(endpoint_url("not a url", "/pay").is_err());
    }
}
