//! Locking scripts for funding outputs

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// OP_DUP
const OP_DUP: u8 = 0x76;
/// OP_HASH160
const OP_HASH160: u8 = 0xa9;
/// OP_EQUALVERIFY
const OP_EQUALVERIFY: u8 = 0x88;
/// OP_CHECKSIG
const OP_CHECKSIG: u8 = 0xac;
/// Push of the 20-byte public key hash
const PUSH_20: u8 = 0x14;

/// Errors raised while building a locking script
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The key is not valid hex
    #[error("Invalid public key encoding: {0}")]
    InvalidEncoding(String),

    /// The bytes are not a point on secp256k1
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

impl From<hex::FromHexError> for ScriptError {
    fn from(e: hex::FromHexError) -> Self {
        ScriptError::InvalidEncoding(e.to_string())
    }
}

/// Builds the script that locks a funding output to a public key
pub trait LockingScriptBuilder: Send + Sync {
    /// Hex-encoded locking script paying `public_key` (hex, compressed or not)
    fn pay_to_public_key(&self, public_key: &str) -> Result<String, ScriptError>;
}

/// Pay-to-public-key-hash scripts
///
/// `OP_DUP OP_HASH160 <RIPEMD160(SHA256(pubkey))> OP_EQUALVERIFY OP_CHECKSIG`
///
/// The key is hashed in the encoding it was given, so a compressed key yields the
/// compressed-key address, the same as the wallet's own address derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct P2pkhScriptBuilder;

impl P2pkhScriptBuilder {
    /// Raw script bytes for a public key
    pub fn script_bytes(public_key: &str) -> Result<Vec<u8>, ScriptError> {
        let key_bytes = hex::decode(public_key.trim())?;
        secp256k1::PublicKey::from_slice(&key_bytes)
            .map_err(|e| ScriptError::InvalidPublicKey(e.to_string()))?;

        let mut script = Vec::with_capacity(25);
        script.push(OP_DUP);
        script.push(OP_HASH160);
        script.push(PUSH_20);
        script.extend_from_slice(&hash160(&key_bytes));
        script.push(OP_EQUALVERIFY);
        script.push(OP_CHECKSIG);
        Ok(script)
    }
}

impl LockingScriptBuilder for P2pkhScriptBuilder {
    fn pay_to_public_key(&self, public_key: &str) -> Result<String, ScriptError> {
        Self::script_bytes(public_key).map(hex::encode)
    }
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let digest = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}
