use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use super::dto::{CreateClientRequest, UpdateClientRequest};
use super::extract::ValidJson;
use super::{ApiError, AppState};
use crate::models::Client;

pub async fn list_clients(State(state): State<AppState>) -> Result<Json<Vec<Client>>, ApiError> {
    Ok(Json(state.storage.get_clients().await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Client>, ApiError> {
    state
        .storage
        .get_client(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("client", id))
}

pub async fn create_client(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
    let client = state.storage.create_client(body.into()).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ValidJson(body): ValidJson<UpdateClientRequest>,
) -> Result<Json<Client>, ApiError> {
    state
        .storage
        .update_client(id, body.into())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("client", id))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    if state.storage.delete_client(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("client", id))
    }
}
