//! One-time payment key identifiers
//!
//! Each purchase pays to a fresh key that the wallet derives from:
//! 1. a fixed protocol identifier shared with the shop,
//! 2. a key identifier built from two independent random nonces,
//! 3. the shop's identity key as counterparty.
//!
//! The shop re-derives the same key from the nonces it receives in `/pay`, so the
//! nonces travel in clear; their only job is to keep the triple from ever repeating.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::entropy::EntropySource;

/// Security level of the payment protocol
pub const PAYMENT_SECURITY_LEVEL: u8 = 2;

/// Protocol name the shop derives payment keys under
pub const PAYMENT_PROTOCOL_NAME: &str = "3241645161d8";

/// Random bytes per derivation nonce
pub const DERIVATION_NONCE_BYTES: usize = 10;

/// Protocol identifier, serialized as `[securityLevel, "name"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolId(pub u8, pub String);

impl ProtocolId {
    /// The identifier used for Byte Shop payments
    pub fn payment() -> Self {
        Self(PAYMENT_SECURITY_LEVEL, PAYMENT_PROTOCOL_NAME.to_string())
    }

    pub fn security_level(&self) -> u8 {
        self.0
    }

    pub fn name(&self) -> &str {
        &self.1
    }
}

/// Derivation prefix and suffix for one payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationNonces {
    prefix: String,
    suffix: String,
}

impl DerivationNonces {
    /// Draw a fresh prefix and suffix from `entropy`
    pub fn generate(entropy: &dyn EntropySource) -> Self {
        Self {
            prefix: random_nonce(entropy),
            suffix: random_nonce(entropy),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Key identifier handed to the wallet: `"{prefix} {suffix}"`
    pub fn key_id(&self) -> String {
        format!("{} {}", self.prefix, self.suffix)
    }
}

fn random_nonce(entropy: &dyn EntropySource) -> String {
    let mut bytes = [0u8; DERIVATION_NONCE_BYTES];
    entropy.fill(&mut bytes);
    STANDARD.encode(bytes)
}

/// Parameters of a wallet key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivationRequest {
    #[serde(rename = "protocolID")]
    pub protocol_id: ProtocolId,
    #[serde(rename = "keyID")]
    pub key_id: String,
    pub counterparty: String,
}

impl KeyDerivationRequest {
    /// Derivation of the one-time key paying `counterparty`
    pub fn for_payment(nonces: &DerivationNonces, counterparty: impl Into<String>) -> Self {
        Self {
            protocol_id: ProtocolId::payment(),
            key_id: nonces.key_id(),
            counterparty: counterparty.into(),
        }
    }
}
