use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use validator::Validate;

use super::dto::{
    CreateInvoiceRequest, ListInvoicesQuery, UpdateInvoiceRequest, into_line_items, non_blank,
};
use super::extract::ValidJson;
use super::{ApiError, AppState};
use crate::models::{
    Client, Invoice, InvoiceStats, InvoiceUpdate, InvoiceWithLineItems, NewInvoice,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextNumberResponse {
    pub invoice_number: String,
}

async fn known_client(state: &AppState, id: i32) -> Result<Client, ApiError> {
    state
        .storage
        .get_client(id)
        .await?
        .ok_or_else(|| ApiError::Unprocessable(format!("client {id} does not exist")))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    let mut invoices = state.storage.get_invoices().await?;
    if let Some(status) = query.status {
        invoices.retain(|invoice| invoice.status == status);
    }
    Ok(Json(invoices))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<InvoiceWithLineItems>, ApiError> {
    state
        .storage
        .get_invoice_with_line_items(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("invoice", id))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceWithLineItems>), ApiError> {

    let client = match body.client_id {
        Some(id) => Some(known_client(&state, id).await?),
        None => None,
    };

    let (client_name, client_email, client_address) = match client {
        Some(client) => (
            body.client_name.unwrap_or(client.name),
            body.client_email.unwrap_or(client.email),
            non_blank(body.client_address).or(client.address),
        ),
        None => match (body.client_name, body.client_email) {
            (Some(name), Some(email)) => (name, email, non_blank(body.client_address)),
            _ => {
                return Err(ApiError::Unprocessable(
                    "clientName and clientEmail are required without clientId".to_string(),
                ));
            }
        },
    };

    let invoice = NewInvoice {
        invoice_number: body.invoice_number,
        client_id: body.client_id,
        client_name,
        client_email,
        client_address,
        issue_date: body.issue_date.unwrap_or_else(|| Utc::now().date_naive()),
        due_date: body.due_date,
        status: body.status,
        tax_rate: body.tax_rate,
        notes: non_blank(body.notes),
    };

    let created = state
        .storage
        .create_invoice(invoice, into_line_items(body.line_items))
        .await?;
    info!(
        invoice = %created.invoice.invoice_number,
        total = %created.invoice.total,
        "invoice created"
    );

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ValidJson(body): ValidJson<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceWithLineItems>, ApiError> {
    if let Some(items) = &body.line_items {
        for item in items {
            item.validate()?;
        }
    }

    let mut update = InvoiceUpdate {
        invoice_number: body.invoice_number,
        client_id: body.client_id,
        client_name: body.client_name,
        client_email: body.client_email,
        client_address: body.client_address.map(non_blank),
        issue_date: body.issue_date,
        due_date: body.due_date,
        status: body.status,
        tax_rate: body.tax_rate,
        notes: body.notes.map(non_blank),
    };

    if let Some(client_id) = update.client_id {
        let client = known_client(&state, client_id).await?;
        update.client_name = update.client_name.or(Some(client.name));
        update.client_email = update.client_email.or(Some(client.email));
        update.client_address = update.client_address.or(Some(client.address));
    }

    state
        .storage
        .update_invoice(id, update, body.line_items.map(into_line_items))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("invoice", id))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    if state.storage.delete_invoice(id).await? {
        info!(invoice_id = id, "invoice deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("invoice", id))
    }
}

pub async fn next_invoice_number(
    State(state): State<AppState>,
) -> Result<Json<NextNumberResponse>, ApiError> {
    let invoice_number = state.storage.next_invoice_number().await?;
    Ok(Json(NextNumberResponse { invoice_number }))
}

pub async fn invoice_stats(State(state): State<AppState>) -> Result<Json<InvoiceStats>, ApiError> {
    Ok(Json(state.storage.get_invoice_stats().await?))
}
