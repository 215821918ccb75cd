use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Dashboard figures aggregated over every stored invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStats {
    pub total_invoices: usize,
    pub total_revenue: Decimal,
    pub pending_invoices: usize,
    pub overdue_invoices: usize,
}
