//! HTTP surface: translates requests into [`Storage`] calls.

use std::sync::Arc;

use axum::{
    Json, Router,
    response::IntoResponse,
    routing::{get, put},
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Storage;

mod clients;
pub mod dto;
mod error;
mod extract;
mod invoices;
mod line_items;

pub use error::ApiError;
pub use extract::ValidJson;

/// Shared handler state. The storage backend is injected here; handlers never
/// reach for a global store.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

/// Liveness check.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/{id}",
            get(clients::get_client)
                .put(clients::update_client)
                .delete(clients::delete_client),
        )
        .route(
            "/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route("/invoices/next-number", get(invoices::next_invoice_number))
        .route(
            "/invoices/{id}",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route(
            "/invoices/{id}/line-items",
            get(line_items::list_line_items)
                .post(line_items::create_line_item)
                .delete(line_items::clear_line_items),
        )
        .route(
            "/line-items/{id}",
            put(line_items::update_line_item).delete(line_items::delete_line_item),
        )
        .route("/stats", get(invoices::invoice_stats))
}

/// Builds the full application router around the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
