//! Error types for the purchase flow

use thiserror::Error;

use crate::script::ScriptError;
use crate::transport::TransportError;
use crate::wallet::WalletError;

/// Result type for purchase operations
pub type Result<T> = std::result::Result<T, PurchaseError>;

/// Code reported when no byte count was given
pub const ERR_MISSING_NUMBER_OF_BYTES: &str = "ERR_MISSING_NUMBER_OF_BYTES";

/// Code the server uses when cool bytes are requested without a certificate
pub const ERR_NOT_COOL_ENOUGH: &str = "ERR_NOT_COOL_ENOUGH";

/// Code reported for failures below the structured server response
pub const ERR_TRANSPORT: &str = "ERR_TRANSPORT";

/// Code reported when a response does not have the expected shape
pub const ERR_INVALID_RESPONSE: &str = "ERR_INVALID_RESPONSE";

/// Code reported when the wallet could not be reached at all
pub const ERR_WALLET_UNAVAILABLE: &str = "ERR_WALLET_UNAVAILABLE";

/// Code reported when the wallet hands back a key that is not a valid public key
pub const ERR_INVALID_DERIVED_KEY: &str = "ERR_INVALID_DERIVED_KEY";

/// Fallback code for error responses that carry none
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// Fallback description for error responses that carry none
pub const DEFAULT_ERROR_DESCRIPTION: &str = "Error";

/// Errors that end a purchase attempt
///
/// Each variant is scoped to one attempt; none of them is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// A required parameter was absent (checked locally, nothing was sent)
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// The server wants a cool-bytes certificate first
    #[error("{description} (get a certificate at {certificate_url})")]
    NotCoolEnough {
        certificate_url: String,
        description: String,
    },

    /// Network or signing failure before a structured response was obtained
    #[error("Transport error: {description}")]
    Transport { description: String },

    /// The wallet declined to derive a key or build the funding action
    #[error("Wallet error ({code}): {description}")]
    Wallet { code: String, description: String },

    /// The server answered with an error status (or an unusable response)
    #[error("Server error ({code}): {description}")]
    Server { code: String, description: String },
}

impl PurchaseError {
    /// Stable error code for front ends
    pub fn code(&self) -> &str {
        match self {
            PurchaseError::MissingParameter(_) => ERR_MISSING_NUMBER_OF_BYTES,
            PurchaseError::NotCoolEnough { .. } => ERR_NOT_COOL_ENOUGH,
            PurchaseError::Transport { .. } => ERR_TRANSPORT,
            PurchaseError::Wallet { code, .. } => code,
            PurchaseError::Server { code, .. } => code,
        }
    }

    /// Remediation URL when the failure is a missing cool-bytes certificate
    pub fn certificate_url(&self) -> Option<&str> {
        match self {
            PurchaseError::NotCoolEnough {
                certificate_url, ..
            } => Some(certificate_url),
            _ => None,
        }
    }

    /// Check whether the caller should offer the certificate URL
    pub fn is_not_cool_enough(&self) -> bool {
        matches!(self, PurchaseError::NotCoolEnough { .. })
    }

    /// Build a server error from the optional fields of an error response
    pub(crate) fn server(code: Option<String>, description: Option<String>) -> Self {
        PurchaseError::Server {
            code: code.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            description: description.unwrap_or_else(|| DEFAULT_ERROR_DESCRIPTION.to_string()),
        }
    }

    /// Build a wallet error from the optional fields of a wallet response
    pub(crate) fn wallet(code: Option<String>, description: Option<String>) -> Self {
        PurchaseError::Wallet {
            code: code.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            description: description.unwrap_or_else(|| DEFAULT_ERROR_DESCRIPTION.to_string()),
        }
    }

    pub(crate) fn invalid_response(description: impl Into<String>) -> Self {
        PurchaseError::Server {
            code: ERR_INVALID_RESPONSE.to_string(),
            description: description.into(),
        }
    }
}

impl From<TransportError> for PurchaseError {
    fn from(e: TransportError) -> Self {
        PurchaseError::Transport {
            description: e.to_string(),
        }
    }
}

impl From<WalletError> for PurchaseError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::Rejected { code, description } => PurchaseError::Wallet { code, description },
            other => PurchaseError::Wallet {
                code: ERR_WALLET_UNAVAILABLE.to_string(),
                description: other.to_string(),
            },
        }
    }
}

impl From<ScriptError> for PurchaseError {
    fn from(e: ScriptError) -> Self {
        PurchaseError::Wallet {
            code: ERR_INVALID_DERIVED_KEY.to_string(),
            description: e.to_string(),
        }
    }
}
