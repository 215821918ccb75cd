//! Storage capability and its backends.
//!
//! Request handlers only ever see `Arc<dyn Storage>`; which backend sits behind
//! it is decided once at startup by [`init`].

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::billing::AmountOverflow;
use crate::config::{Config, StorageKind};
use crate::models::{
    Client, ClientUpdate, Invoice, InvoiceStats, InvoiceUpdate, InvoiceWithLineItems, LineItem,
    LineItemUpdate, NewClient, NewInvoice, NewLineItem,
};

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::PgStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invoice number {0} is already in use")]
    DuplicateInvoiceNumber(String),

    #[error("invoice {0} does not exist")]
    UnknownInvoice(i32),

    #[error(transparent)]
    AmountOutOfRange(#[from] AmountOverflow),

    #[error("storage backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Backend(anyhow::Error::new(err))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Everything the API needs from a store.
///
/// Lookups report absence with `None` (or `false` for deletes) rather than an
/// error. Any operation that changes line items or an invoice's tax rate leaves
/// the invoice's subtotal, tax amount and total recomputed. A change whose
/// amounts would leave the storable range fails with
/// [`StorageError::AmountOutOfRange`] and leaves the store untouched.
#[async_trait]
pub trait Storage: Send + Sync {
    // Client operations
    async fn get_clients(&self) -> StorageResult<Vec<Client>>;
    async fn get_client(&self, id: i32) -> StorageResult<Option<Client>>;
    async fn create_client(&self, client: NewClient) -> StorageResult<Client>;
    async fn update_client(&self, id: i32, update: ClientUpdate) -> StorageResult<Option<Client>>;
    async fn delete_client(&self, id: i32) -> StorageResult<bool>;

    // Invoice operations
    async fn get_invoices(&self) -> StorageResult<Vec<Invoice>>;
    async fn get_invoice(&self, id: i32) -> StorageResult<Option<Invoice>>;
    async fn get_invoice_with_line_items(
        &self,
        id: i32,
    ) -> StorageResult<Option<InvoiceWithLineItems>>;

    /// Stores an invoice and its line items in one step. A missing invoice
    /// number is filled with [`Storage::next_invoice_number`] under the same
    /// critical section as the insert.
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        line_items: Vec<NewLineItem>,
    ) -> StorageResult<InvoiceWithLineItems>;

    /// Edits the header; `Some(line_items)` replaces every existing item.
    async fn update_invoice(
        &self,
        id: i32,
        update: InvoiceUpdate,
        line_items: Option<Vec<NewLineItem>>,
    ) -> StorageResult<Option<InvoiceWithLineItems>>;

    /// Removes the invoice and all of its line items.
    async fn delete_invoice(&self, id: i32) -> StorageResult<bool>;

    // Line item operations
    async fn get_line_items_by_invoice(&self, invoice_id: i32) -> StorageResult<Vec<LineItem>>;
    async fn create_line_item(&self, invoice_id: i32, item: NewLineItem)
    -> StorageResult<LineItem>;
    async fn update_line_item(
        &self,
        id: i32,
        update: LineItemUpdate,
    ) -> StorageResult<Option<LineItem>>;
    async fn delete_line_item(&self, id: i32) -> StorageResult<bool>;
    async fn delete_line_items_by_invoice(&self, invoice_id: i32) -> StorageResult<usize>;

    // Derived data
    async fn next_invoice_number(&self) -> StorageResult<String>;
    async fn get_invoice_stats(&self) -> StorageResult<InvoiceStats>;
}

/// Builds the configured storage backend.
pub async fn init(config: &Config) -> Result<Arc<dyn Storage>> {
    match config.storage {
        StorageKind::Memory => {
            info!("using in-memory storage; data is lost on shutdown");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageKind::Postgres => init_postgres(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn init_postgres(config: &Config) -> Result<Arc<dyn Storage>> {
    use anyhow::Context;

    let url = config
        .database_url()
        .context("DATABASE_URL must be set when STORAGE=postgres")?;
    let storage = PgStorage::connect(url, config.max_connections).await?;
    storage.migrate().await?;
    info!("connected to postgres storage");

    Ok(Arc::new(storage))
}

#[cfg(not(feature = "postgres"))]
async fn init_postgres(_config: &Config) -> Result<Arc<dyn Storage>> {
    anyhow::bail!("postgres storage requested but this binary was built without the `postgres` feature")
}
