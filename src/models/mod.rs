mod client;
mod invoice;
mod line_item;
mod stats;

pub use client::{Client, ClientUpdate, NewClient};
pub use invoice::{Invoice, InvoiceStatus, InvoiceUpdate, InvoiceWithLineItems, NewInvoice};
pub use line_item::{LineItem, LineItemUpdate, NewLineItem};
pub use stats::InvoiceStats;
