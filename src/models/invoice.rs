use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::LineItem;

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown invoice status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Stored invoice header.
///
/// Client fields are a copy taken when the invoice is written, so later edits
/// or deletion of the client leave the invoice untouched. `subtotal`,
/// `tax_amount` and `total` are derived from the line items and always hold
/// two decimal places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i32,
    pub invoice_number: String,
    pub client_id: Option<i32>,
    pub client_name: String,
    pub client_email: String,
    pub client_address: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invoice header as submitted for creation.
///
/// When `invoice_number` is `None` the store assigns the next sequential number.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_number: Option<String>,
    pub client_id: Option<i32>,
    pub client_name: String,
    pub client_email: String,
    pub client_address: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
    pub tax_rate: Decimal,
    pub notes: Option<String>,
}

/// Partial invoice edit. Totals are never taken from the caller.
///
/// Optional invoice fields use a nested `Option`: the outer `None` leaves the
/// field alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct InvoiceUpdate {
    pub invoice_number: Option<String>,
    pub client_id: Option<i32>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_address: Option<Option<String>>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<Option<NaiveDate>>,
    pub status: Option<InvoiceStatus>,
    pub tax_rate: Option<Decimal>,
    pub notes: Option<Option<String>>,
}

impl InvoiceUpdate {
    pub fn apply(self, invoice: &mut Invoice) {
        if let Some(number) = self.invoice_number {
            invoice.invoice_number = number;
        }
        if let Some(client_id) = self.client_id {
            invoice.client_id = Some(client_id);
        }
        if let Some(name) = self.client_name {
            invoice.client_name = name;
        }
        if let Some(email) = self.client_email {
            invoice.client_email = email;
        }
        if let Some(address) = self.client_address {
            invoice.client_address = address;
        }
        if let Some(issue_date) = self.issue_date {
            invoice.issue_date = issue_date;
        }
        if let Some(due_date) = self.due_date {
            invoice.due_date = due_date;
        }
        if let Some(status) = self.status {
            invoice.status = status;
        }
        if let Some(tax_rate) = self.tax_rate {
            invoice.tax_rate = tax_rate;
        }
        if let Some(notes) = self.notes {
            invoice.notes = notes;
        }
    }
}

/// Invoice together with its line items, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceWithLineItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub line_items: Vec<LineItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert!("void".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&InvoiceStatus::Overdue).unwrap();
        assert_eq!(json, "\"overdue\"");
    }
}
