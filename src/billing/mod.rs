//! Invoice arithmetic shared by every storage backend.
//!
//! Nothing in here touches storage: backends feed in the rows they hold and
//! persist whatever comes back.

mod numbering;
mod stats;
mod totals;

pub use numbering::{INVOICE_PREFIX, format_invoice_number, next_invoice_number, parse_sequence};
pub use stats::summarize;
pub use totals::{
    AmountOverflow, Billable, InvoiceTotals, MAX_AMOUNT, compute_totals, line_amount, to_cents,
};
