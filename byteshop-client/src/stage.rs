//! Progress of a single purchase

use serde::{Deserialize, Serialize};

/// Where a purchase currently is
///
/// ```text
/// Idle → Invoicing → InvoiceFailed
///                  → Invoiced → Paying → PayFailed
///                                      → Paid
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PurchaseStage {
    #[default]
    Idle,
    Invoicing,
    InvoiceFailed { code: String },
    Invoiced { order_id: String, amount_satoshis: u64 },
    Paying { order_id: String },
    PayFailed { order_id: String, code: String },
    Paid { order_id: String },
}

impl PurchaseStage {
    /// No further transition follows
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseStage::InvoiceFailed { .. }
                | PurchaseStage::PayFailed { .. }
                | PurchaseStage::Paid { .. }
        )
    }

    /// A request is in flight (a front end shows a spinner)
    pub fn is_loading(&self) -> bool {
        matches!(self, PurchaseStage::Invoicing | PurchaseStage::Paying { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PurchaseStage::Idle => "idle",
            PurchaseStage::Invoicing => "invoicing",
            PurchaseStage::InvoiceFailed { .. } => "invoice_failed",
            PurchaseStage::Invoiced { .. } => "invoiced",
            PurchaseStage::Paying { .. } => "paying",
            PurchaseStage::PayFailed { .. } => "pay_failed",
            PurchaseStage::Paid { .. } => "paid",
        }
    }
}

impl std::fmt::Display for PurchaseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(!PurchaseStage::Idle.is_terminal());
        assert!(!PurchaseStage::Invoicing.is_terminal());
        assert!(PurchaseStage::Paid { order_id: "o1".into() }.is_terminal());
        assert!(PurchaseStage::InvoiceFailed { code: "X".into() }.is_terminal());
    }

    #[test]
    fn test_loading() {
        assert!(PurchaseStage::Invoicing.is_loading());
        assert!(PurchaseStage::Paying { order_id: "o1".into() }.is_loading());
        assert!(!PurchaseStage::Idle.is_loading());
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(PurchaseStage::Invoiced {
            order_id: "o1".into(),
            amount_satoshis: 1400,
        })
        .unwrap();
        assert_eq!(json["stage"], "invoiced");
        assert_eq!(json["amount_satoshis"], 1400);
    }
}
