//! Payment and redemption step
//!
//! Pays an invoice with a one-time key and trades the resulting transaction for the
//! purchased bytes. After the wallet has broadcast the action the funds are committed;
//! a failure from `/pay` past that point is reported and logged, never retried.

use serde_json::Value;

use crate::entropy::EntropySource;
use crate::error::{PurchaseError, Result};
use crate::key_derivation::{DerivationNonces, KeyDerivationRequest};
use crate::script::LockingScriptBuilder;
use crate::transport::AuthenticatedTransport;
use crate::types::{OutputDescriptor, PayResponse, PaymentSubmission, PurchaseResult, ResponseStatus};
use crate::wallet::{CreateActionRequest, FundingOutput, Wallet};
use crate::PAY_PATH;

/// Everything `submit` needs to know about the order being paid
#[derive(Debug, Clone, Copy)]
pub struct PaymentTarget<'a> {
    pub server_url: &'a str,
    pub description: &'a str,
    pub order_id: &'a str,
    pub payee_identity_key: &'a str,
    pub amount_satoshis: u64,
}

/// Pays an invoice and redeems the bytes
pub struct PaymentSubmitter<'a> {
    transport: &'a dyn AuthenticatedTransport,
    wallet: &'a dyn Wallet,
    scripts: &'a dyn LockingScriptBuilder,
    entropy: &'a dyn EntropySource,
}

impl<'a> PaymentSubmitter<'a> {
    pub fn new(
        transport: &'a dyn AuthenticatedTransport,
        wallet: &'a dyn Wallet,
        scripts: &'a dyn LockingScriptBuilder,
        entropy: &'a dyn EntropySource,
    ) -> Self {
        Self {
            transport,
            wallet,
            scripts,
            entropy,
        }
    }

    /// Pay `target` and return the redeemed bytes
    pub async fn submit(&self, target: PaymentTarget<'_>) -> Result<PurchaseResult> {
        let nonces = DerivationNonces::generate(self.entropy);
        let derivation = KeyDerivationRequest::for_payment(&nonces, target.payee_identity_key);

        tracing::debug!(
            order_id = target.order_id,
            key_id = %derivation.key_id,
            "deriving payment key"
        );
        let derived_key = self.wallet.derive_public_key(&derivation).await?;
        let script = self.scripts.pay_to_public_key(&derived_key)?;

        tracing::info!(
            order_id = target.order_id,
            amount = target.amount_satoshis,
            "creating funding action"
        );
        let action = self
            .wallet
            .create_action(&CreateActionRequest {
                description: target.description.to_string(),
                outputs: vec![FundingOutput {
                    script,
                    satoshis: target.amount_satoshis,
                }],
            })
            .await?;

        if action.status().is_error() {
            let err = PurchaseError::wallet(
                action.code().map(str::to_string),
                action.description().map(str::to_string),
            );
            tracing::info!(order_id = target.order_id, code = err.code(), "wallet declined funding action");
            return Err(err);
        }

        let mut transaction = action.into_fields();
        let output = OutputDescriptor {
            vout: 0,
            satoshis: target.amount_satoshis,
            derivation_prefix: nonces.prefix().to_string(),
            derivation_suffix: nonces.suffix().to_string(),
        };
        let outputs = serde_json::to_value(vec![output]).map_err(|e| PurchaseError::Transport {
            description: e.to_string(),
        })?;
        transaction.insert("outputs".to_string(), outputs);

        let submission = PaymentSubmission {
            order_id: target.order_id.to_string(),
            transaction,
            description: target.description.to_string(),
        };
        let body = serde_json::to_value(&submission).map_err(|e| PurchaseError::Transport {
            description: e.to_string(),
        })?;

        let response = match self
            .transport
            .post_signed(target.server_url, PAY_PATH, body)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    order_id = target.order_id,
                    error = %e,
                    "funding action broadcast but redemption request failed"
                );
                return Err(e.into());
            }
        };

        let result = parse_redemption(response).inspect_err(|e| {
            tracing::warn!(
                order_id = target.order_id,
                code = e.code(),
                "funding action broadcast but redemption was refused"
            );
        })?;

        tracing::info!(order_id = target.order_id, "bytes redeemed");
        Ok(result)
    }
}

/// Reduce a `/pay` response to `{bytes, note}` or the error it describes
pub(crate) fn parse_redemption(response: Value) -> Result<PurchaseResult> {
    if ResponseStatus::of(&response).is_error() {
        let field = |name: &str| response.get(name).and_then(Value::as_str).map(str::to_string);
        return Err(PurchaseError::server(field("code"), field("description")));
    }

    let response: PayResponse = serde_json::from_value(response)
        .map_err(|e| PurchaseError::invalid_response(format!("malformed payment response: {}", e)))?;
    let bytes = response
        .bytes
        .ok_or_else(|| PurchaseError::invalid_response("payment response is missing bytes"))?;

    Ok(PurchaseResult {
        bytes,
        note: response.note.unwrap_or_default(),
    })
}
