//! Request bodies accepted by the HTTP API.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use validator::{Validate, ValidationError};

use crate::billing::MAX_AMOUNT;
use crate::models::{ClientUpdate, InvoiceStatus, LineItemUpdate, NewClient, NewLineItem};

fn unit_rate(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > MAX_AMOUNT {
        return Err(ValidationError::new("unit_rate"));
    }
    Ok(())
}

fn percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percentage"));
    }
    Ok(())
}

/// Blank optional text is stored as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Tells a missing key (`None`) apart from an explicit `null` (`Some(None)`).
/// Pair with `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub address: Option<String>,
}

impl From<CreateClientRequest> for NewClient {
    fn from(req: CreateClientRequest) -> Self {
        NewClient {
            name: req.name,
            email: req.email,
            address: non_blank(req.address),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    /// `null` or blank clears the stored address.
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
}

impl From<UpdateClientRequest> for ClientUpdate {
    fn from(req: UpdateClientRequest) -> Self {
        ClientUpdate {
            name: req.name,
            email: req.email,
            address: req.address.map(non_blank),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(custom(function = "unit_rate"))]
    pub rate: Decimal,
}

impl From<LineItemRequest> for NewLineItem {
    fn from(req: LineItemRequest) -> Self {
        NewLineItem {
            description: req.description,
            quantity: req.quantity,
            rate: req.rate,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLineItemRequest {
    #[validate(length(min = 1))]
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: Option<i32>,
    #[validate(custom(function = "unit_rate"))]
    pub rate: Option<Decimal>,
}

impl From<UpdateLineItemRequest> for LineItemUpdate {
    fn from(req: UpdateLineItemRequest) -> Self {
        LineItemUpdate {
            description: req.description,
            quantity: req.quantity,
            rate: req.rate,
        }
    }
}

/// Invoice creation body. Client details may be omitted when `client_id`
/// points at a stored client; they are then copied from it.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1))]
    pub invoice_number: Option<String>,
    pub client_id: Option<i32>,
    #[validate(length(min = 1))]
    pub client_name: Option<String>,
    #[validate(email)]
    pub client_email: Option<String>,
    pub client_address: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    #[validate(custom(function = "percentage"))]
    pub tax_rate: Decimal,
    pub notes: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub line_items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    #[validate(length(min = 1))]
    pub invoice_number: Option<String>,
    pub client_id: Option<i32>,
    #[validate(length(min = 1))]
    pub client_name: Option<String>,
    #[validate(email)]
    pub client_email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub client_address: Option<Option<String>>,
    pub issue_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    pub status: Option<InvoiceStatus>,
    #[validate(custom(function = "percentage"))]
    pub tax_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    /// When present, replaces every line item of the invoice. Validated
    /// item by item in the handler.
    pub line_items: Option<Vec<LineItemRequest>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
}

pub(crate) fn into_line_items(items: Vec<LineItemRequest>) -> Vec<NewLineItem> {
    items.into_iter().map(NewLineItem::from).collect()
}
