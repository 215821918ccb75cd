use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A billable row owned by exactly one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: i32,
    pub invoice_id: i32,
    pub description: String,
    pub quantity: i32,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: i32,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct LineItemUpdate {
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub rate: Option<Decimal>,
}

impl LineItemUpdate {
    /// Applies the edit. The caller is responsible for recomputing `amount`.
    pub fn apply(self, item: &mut LineItem) {
        if let Some(description) = self.description {
            item.description = description;
        }
        if let Some(quantity) = self.quantity {
            item.quantity = quantity;
        }
        if let Some(rate) = self.rate {
            item.rate = rate;
        }
    }
}
