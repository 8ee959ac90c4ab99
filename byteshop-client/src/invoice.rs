//! Invoice request step

use serde_json::Value;

use crate::error::{PurchaseError, Result, ERR_NOT_COOL_ENOUGH};
use crate::transport::AuthenticatedTransport;
use crate::types::{Invoice, InvoiceRequestBody, InvoiceResponse, PurchaseRequest, ResponseStatus};
use crate::{COOLCERT_URL, INVOICE_PATH};

/// Asks the shop to price an order
pub struct InvoiceRequester<'a> {
    transport: &'a dyn AuthenticatedTransport,
}

impl<'a> InvoiceRequester<'a> {
    pub fn new(transport: &'a dyn AuthenticatedTransport) -> Self {
        Self { transport }
    }

    /// Request an invoice for `number_of_bytes` bytes
    ///
    /// A zero byte count fails locally. Otherwise exactly one `/invoice` call is made;
    /// nothing is retried.
    pub async fn request(&self, server_url: &str, number_of_bytes: u64, cool: bool) -> Result<Invoice> {
        PurchaseRequest::new(number_of_bytes, cool).validate()?;

        tracing::info!(number_of_bytes, cool, server = server_url, "requesting invoice");

        let body = serde_json::to_value(InvoiceRequestBody {
            number_of_bytes,
            cool,
        })
        .map_err(|e| PurchaseError::Transport {
            description: e.to_string(),
        })?;
        let response = self
            .transport
            .post_signed(server_url, INVOICE_PATH, body)
            .await?;

        parse_invoice(response)
    }
}

/// Map an `/invoice` response to an invoice or the purchase error it describes
pub(crate) fn parse_invoice(response: Value) -> Result<Invoice> {
    if ResponseStatus::of(&response).is_error() {
        return Err(invoice_error(&response));
    }

    let response: InvoiceResponse = serde_json::from_value(response)
        .map_err(|e| PurchaseError::invalid_response(format!("malformed invoice: {}", e)))?;
    let invoice = Invoice::from_response(response)?;
    tracing::info!(
        order_id = %invoice.order_id,
        amount = invoice.amount_satoshis,
        "invoice received"
    );
    Ok(invoice)
}

/// Error fields are read on their own; the rest of an error body is never interpreted
fn invoice_error(response: &Value) -> PurchaseError {
    let field = |name: &str| response.get(name).and_then(Value::as_str).map(str::to_string);

    if field("code").as_deref() == Some(ERR_NOT_COOL_ENOUGH) {
        let certificate_url = field("coolcertURL").unwrap_or_else(|| COOLCERT_URL.to_string());
        tracing::info!(certificate_url = %certificate_url, "cool bytes need a certificate");
        return PurchaseError::NotCoolEnough {
            certificate_url,
            description: field("description")
                .unwrap_or_else(|| "You are not cool enough".to_string()),
        };
    }

    let err = PurchaseError::server(field("code"), field("description"));
    tracing::info!(code = err.code(), "invoice rejected");
    err
}
