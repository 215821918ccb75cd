use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use super::dto::{LineItemRequest, UpdateLineItemRequest};
use super::extract::ValidJson;
use super::{ApiError, AppState};
use crate::models::LineItem;

pub async fn list_line_items(
    State(state): State<AppState>,
    Path(invoice_id): Path<i32>,
) -> Result<Json<Vec<LineItem>>, ApiError> {
    if state.storage.get_invoice(invoice_id).await?.is_none() {
        return Err(ApiError::not_found("invoice", invoice_id));
    }
    Ok(Json(
        state.storage.get_line_items_by_invoice(invoice_id).await?,
    ))
}

pub async fn create_line_item(
    State(state): State<AppState>,
    Path(invoice_id): Path<i32>,
    ValidJson(body): ValidJson<LineItemRequest>,
) -> Result<(StatusCode, Json<LineItem>), ApiError> {
    let item = state
        .storage
        .create_line_item(invoice_id, body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_line_item(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ValidJson(body): ValidJson<UpdateLineItemRequest>,
) -> Result<Json<LineItem>, ApiError> {
    state
        .storage
        .update_line_item(id, body.into())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("line item", id))
}

pub async fn delete_line_item(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    if state.storage.delete_line_item(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("line item", id))
    }
}

/// Removes every line item of an invoice, leaving it with zero totals.
pub async fn clear_line_items(
    State(state): State<AppState>,
    Path(invoice_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    if state.storage.get_invoice(invoice_id).await?.is_none() {
        return Err(ApiError::not_found("invoice", invoice_id));
    }
    let removed = state
        .storage
        .delete_line_items_by_invoice(invoice_id)
        .await?;
    info!(invoice_id, removed, "line items cleared");

    Ok(StatusCode::NO_CONTENT)
}
