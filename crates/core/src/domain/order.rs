use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
    Paid,
    PartiallyRefunded,
    Refunded,
    Pending,
    Other,
}

impl FinancialStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub variant_id: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub discounted_unit_price: Decimal,
    pub quantity: u32,
}

/// A refunded portion of one line item. Amounts are attributed to the
/// order carrying the refund record, not re-dated to the original sale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundLinePortion {
    pub variant_id: String,
    pub quantity: u32,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub total: Decimal,
    #[serde(default)]
    pub line_items: Vec<RefundLinePortion>,
}

/// One order as fetched from the commerce platform, immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub total: Decimal,
    pub subtotal: Decimal,
    pub total_discounts: Decimal,
    pub financial_status: FinancialStatus,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub refunds: Vec<RefundRecord>,
}

impl OrderRecord {
    /// Total refunded across all refund records on this order.
    pub fn refunded_total(&self) -> Decimal {
        self.refunds.iter().map(|refund| refund.total).sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{FinancialStatus, OrderRecord, RefundRecord};

    #[test]
    fn refunded_total_sums_all_refund_records() {
        let order = OrderRecord {
            id: "ord-1".to_string(),
            created_at: Utc::now(),
            total: Decimal::new(10_000, 2),
            subtotal: Decimal::new(9_500, 2),
            total_discounts: Decimal::ZERO,
            financial_status: FinancialStatus::PartiallyRefunded,
            line_items: vec![],
            refunds: vec![
                RefundRecord { total: Decimal::new(1_000, 2), line_items: vec![] },
                RefundRecord { total: Decimal::new(500, 2), line_items: vec![] },
            ],
        };

        assert_eq!(order.refunded_total(), Decimal::new(1_500, 2));
    }

    #[test]
    fn orders_deserialize_from_platform_export() {
        let json = r#"{
            "id": "ord-9",
            "created_at": "2026-07-01T12:00:00Z",
            "total": "49.00",
            "subtotal": "47.50",
            "total_discounts": "1.50",
            "financial_status": "paid",
            "line_items": [{
                "variant_id": "v-1",
                "sku": "SKU-1",
                "unit_price": "25.00",
                "discounted_unit_price": "23.75",
                "quantity": 2
            }]
        }"#;

        let order: OrderRecord = serde_json::from_str(json).expect("parse order");
        assert!(order.financial_status.is_paid());
        assert_eq!(order.line_items.len(), 1);
        assert!(order.refunds.is_empty());
    }
}
