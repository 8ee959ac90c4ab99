//! # byteshop-client: invoice → pay flow for buying storage bytes
//!
//! This crate implements the purchase core of the Byte Shop storefront. A caller asks
//! for a number of bytes (optionally "cool" bytes, which require a certificate), the
//! server answers with a priced invoice, and the client pays it with a one-time key
//! derived by the user's wallet before redeeming the bytes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use byteshop_client::{ByteShopClient, ByteShopConfig, PurchaseRequest};
//!
//! let client = ByteShopClient::connect(ByteShopConfig::from_env()?)?;
//! let result = client.purchase(PurchaseRequest::new(14, false)).await?;
//! println!("{} ({})", result.bytes, result.note);
//! ```
//!
//! ## Purchase Flow
//!
//! ```text
//! caller ──► InvoiceRequester ──POST /invoice──► server
//!                 │ amount, identityKey, orderID
//!                 ▼
//!            PaymentSubmitter
//!                 │ 1. derivation prefix/suffix (10 random bytes each)
//!                 │ 2. wallet.derive_public_key(protocol, "prefix suffix", payee)
//!                 │ 3. P2PKH locking script for the derived key
//!                 │ 4. wallet.create_action(one output)
//!                 │ 5. POST /pay {orderID, transaction, description}
//!                 ▼
//!            PurchaseResult { bytes, note }
//! ```
//!
//! Every capability the flow touches is a trait so front ends and tests can swap it:
//!
//! | Capability              | Trait                   | Production implementation |
//! |-------------------------|-------------------------|---------------------------|
//! | Signed RPC to the shop  | `AuthenticatedTransport`| `HttpTransport`           |
//! | Key derivation/actions  | `Wallet`                | `HttpWallet`              |
//! | Locking scripts         | `LockingScriptBuilder`  | `P2pkhScriptBuilder`      |
//! | Randomness              | `EntropySource`         | `OsEntropy`               |
//!
//! There is no retry anywhere in the flow. Once the wallet has broadcast the funding
//! action the payment is committed; a failing `/pay` call is reported, never replayed.

pub mod client;
pub mod config;
pub mod entropy;
pub mod error;
pub mod invoice;
pub mod key_derivation;
pub mod pay;
pub mod script;
pub mod stage;
pub mod transport;
pub mod types;
pub mod wallet;

pub use client::ByteShopClient;
pub use config::{ByteShopConfig, ConfigError, ServerEnvironment};
pub use entropy::{EntropySource, OsEntropy, SeededEntropy};
pub use error::{PurchaseError, Result};
pub use invoice::InvoiceRequester;
pub use key_derivation::{DerivationNonces, KeyDerivationRequest, ProtocolId};
pub use pay::{PaymentSubmitter, PaymentTarget};
pub use script::{LockingScriptBuilder, P2pkhScriptBuilder, ScriptError};
pub use stage::PurchaseStage;
pub use transport::{
    AuthenticatedTransport, HttpTransport, IdentityKeySigner, RequestSigner, TransportError,
};
pub use types::{
    ActionResult, Invoice, OutputDescriptor, PurchaseRequest, PurchaseResult, ResponseStatus,
};
pub use wallet::{CreateActionRequest, FundingOutput, HttpWallet, Wallet, WalletError, WalletNetwork};

/// Smallest number of bytes the shop sells.
pub const MIN_NUMBER_OF_BYTES: u64 = 10;

/// Description attached to the wallet action and the `/pay` submission by default.
pub const DEFAULT_PURCHASE_DESCRIPTION: &str = "Buy with Byteshop UI";

/// Where users obtain the certificate required for cool bytes.
pub const COOLCERT_URL: &str = "https://coolcert-ui.babbage.systems";

/// Default endpoint of the local wallet service.
pub const DEFAULT_WALLET_URL: &str = "http://localhost:3301";

/// Invoice endpoint path.
pub const INVOICE_PATH: &str = "/invoice";

/// Payment redemption endpoint path.
pub const PAY_PATH: &str = "/pay";
