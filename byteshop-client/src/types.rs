//! Request, response and result types of the purchase flow

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PurchaseError, Result, ERR_MISSING_NUMBER_OF_BYTES};

/// Status field shared by shop and wallet responses
///
/// Only `"error"` is an error; any other value (or none) counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Success,
    Error,
}

impl ResponseStatus {
    /// Read the `status` field of a JSON response
    pub fn of(value: &Value) -> Self {
        match value.get("status").and_then(Value::as_str) {
            Some("error") => ResponseStatus::Error,
            _ => ResponseStatus::Success,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResponseStatus::Error)
    }
}

/// What the caller wants to buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Bytes to buy; zero means the parameter is absent
    pub number_of_bytes: u64,
    /// Request cool bytes (requires a certificate)
    pub cool: bool,
}

impl PurchaseRequest {
    pub fn new(number_of_bytes: u64, cool: bool) -> Self {
        Self {
            number_of_bytes,
            cool,
        }
    }

    /// Local check done before anything leaves the process
    pub fn validate(&self) -> Result<()> {
        if self.number_of_bytes == 0 {
            tracing::debug!(code = ERR_MISSING_NUMBER_OF_BYTES, "rejecting purchase without byte count");
            return Err(PurchaseError::MissingParameter("numberOfBytes"));
        }
        Ok(())
    }
}

/// Body of `POST /invoice`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InvoiceRequestBody {
    pub number_of_bytes: u64,
    pub cool: bool,
}

/// Success response of `POST /invoice` as sent by the shop
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InvoiceResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "identityKey")]
    pub identity_key: Option<String>,
    pub amount: Option<u64>,
    #[serde(rename = "orderID")]
    pub order_id: Option<String>,
    #[serde(rename = "publicURL", default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "coolcertURL", default)]
    pub coolcert_url: Option<String>,
}

/// Priced order returned by the shop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Opaque order identifier
    pub order_id: String,
    /// Identity key of the shop, counterparty of the payment key derivation
    pub payee_identity_key: String,
    /// Price in satoshis, exactly as quoted
    pub amount_satoshis: u64,
    /// Where the purchased bytes will be served
    pub delivery_url: String,
    /// Human readable message from the shop
    pub message: String,
    pub status: ResponseStatus,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub cool_certificate_url: Option<String>,
}

impl Invoice {
    pub(crate) fn from_response(response: InvoiceResponse) -> Result<Self> {
        let order_id = response
            .order_id
            .ok_or_else(|| PurchaseError::invalid_response("invoice is missing orderID"))?;
        let payee_identity_key = response
            .identity_key
            .ok_or_else(|| PurchaseError::invalid_response("invoice is missing identityKey"))?;
        let amount_satoshis = response
            .amount
            .ok_or_else(|| PurchaseError::invalid_response("invoice is missing amount"))?;

        let status = match response.status.as_deref() {
            Some("error") => ResponseStatus::Error,
            _ => ResponseStatus::Success,
        };

        Ok(Self {
            order_id,
            payee_identity_key,
            amount_satoshis,
            delivery_url: response.public_url.unwrap_or_default(),
            message: response.message.unwrap_or_default(),
            status,
            error_code: response.code,
            error_description: response.description,
            cool_certificate_url: response.coolcert_url,
        })
    }
}

/// Result of a wallet `createAction` call
///
/// The wallet decides which transaction fields it returns; they are kept verbatim so
/// they can be forwarded to the shop untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionResult(Map<String, Value>);

impl ActionResult {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; anything but an object becomes an empty result
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }

    pub fn status(&self) -> ResponseStatus {
        match self.0.get("status").and_then(Value::as_str) {
            Some("error") => ResponseStatus::Error,
            _ => ResponseStatus::Success,
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.0.get("code").and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.0.get("description").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

/// Output descriptor that lets the shop re-derive the payment key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDescriptor {
    pub vout: u32,
    pub satoshis: u64,
    pub derivation_prefix: String,
    pub derivation_suffix: String,
}

/// Body of `POST /pay`
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PaymentSubmission {
    #[serde(rename = "orderID")]
    pub order_id: String,
    pub transaction: Map<String, Value>,
    pub description: String,
}

/// Success response of `POST /pay`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PayResponse {
    pub bytes: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// What the caller gets once the bytes are redeemed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResult {
    /// Opaque credential for the purchased bytes
    pub bytes: String,
    /// Note from the shop
    pub note: String,
}
