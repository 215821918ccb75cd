use rust_decimal::Decimal;

use super::to_cents;
use crate::models::{Invoice, InvoiceStats, InvoiceStatus};

/// Aggregates dashboard figures. `sent` invoices count as pending.
pub fn summarize<'a, I>(invoices: I) -> InvoiceStats
where
    I: IntoIterator<Item = &'a Invoice>,
{
    let mut stats = InvoiceStats {
        total_invoices: 0,
        total_revenue: Decimal::ZERO,
        pending_invoices: 0,
        overdue_invoices: 0,
    };

    for invoice in invoices {
        stats.total_invoices += 1;
        match invoice.status {
            InvoiceStatus::Paid => {
                stats.total_revenue = stats.total_revenue.saturating_add(invoice.total)
            }
            InvoiceStatus::Sent => stats.pending_invoices += 1,
            InvoiceStatus::Overdue => stats.overdue_invoices += 1,
            InvoiceStatus::Draft => {}
        }
    }

    stats.total_revenue = to_cents(stats.total_revenue);
    stats
}
