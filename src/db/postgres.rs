use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, info};

use super::{Storage, StorageError, StorageResult};
use crate::billing::{self, compute_totals, line_amount};
use crate::models::{
    Client, ClientUpdate, Invoice, InvoiceStats, InvoiceUpdate, InvoiceWithLineItems, LineItem,
    LineItemUpdate, NewClient, NewInvoice, NewLineItem,
};

/// Advisory lock key serializing invoice numbering with insertion.
const INVOICE_NUMBER_LOCK: i64 = 0x494e_565f_4e55_4d;

const INVOICE_COLUMNS: &str = "id, invoice_number, client_id, client_name, client_email, \
     client_address, issue_date, due_date, status, subtotal, tax_rate, tax_amount, total, \
     notes, created_at, updated_at";

#[derive(FromRow)]
struct ClientRow {
    id: i32,
    name: String,
    email: String,
    address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            name: row.name,
            email: row.email,
            address: row.address,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    id: i32,
    invoice_number: String,
    client_id: Option<i32>,
    client_name: String,
    client_email: String,
    client_address: Option<String>,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    status: String,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    total: Decimal,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StorageError;

    fn try_from(row: InvoiceRow) -> StorageResult<Self> {
        let status = row
            .status
            .parse()
            .map_err(|e| StorageError::Backend(anyhow::Error::new(e)))?;

        Ok(Invoice {
            id: row.id,
            invoice_number: row.invoice_number,
            client_id: row.client_id,
            client_name: row.client_name,
            client_email: row.client_email,
            client_address: row.client_address,
            issue_date: row.issue_date,
            due_date: row.due_date,
            status,
            subtotal: row.subtotal,
            tax_rate: row.tax_rate,
            tax_amount: row.tax_amount,
            total: row.total,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct LineItemRow {
    id: i32,
    invoice_id: i32,
    description: String,
    quantity: i32,
    rate: Decimal,
    amount: Decimal,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        LineItem {
            id: row.id,
            invoice_id: row.invoice_id,
            description: row.description,
            quantity: row.quantity,
            rate: row.rate,
            amount: row.amount,
        }
    }
}

/// PostgreSQL-backed store with the same semantics as `MemoryStorage`.
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Applies the embedded migrations under `migrations/`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }
}

async fn fetch_invoice(conn: &mut PgConnection, id: i32) -> StorageResult<Option<Invoice>> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1");
    sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Invoice::try_from)
        .transpose()
}

async fn fetch_line_items(conn: &mut PgConnection, invoice_id: i32) -> StorageResult<Vec<LineItem>> {
    let rows = sqlx::query_as::<_, LineItemRow>(
        "SELECT id, invoice_id, description, quantity, rate, amount \
         FROM line_items WHERE invoice_id = $1 ORDER BY id ASC",
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(LineItem::from).collect())
}

async fn insert_line_item(
    conn: &mut PgConnection,
    invoice_id: i32,
    item: &NewLineItem,
) -> StorageResult<LineItem> {
    let amount = line_amount(item.quantity, item.rate)?;
    let row = sqlx::query_as::<_, LineItemRow>(
        r#"
        INSERT INTO line_items (invoice_id, description, quantity, rate, amount)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, invoice_id, description, quantity, rate, amount
        "#,
    )
    .bind(invoice_id)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.rate)
    .bind(amount)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}

/// Recomputes and stores the derived totals of one invoice.
async fn refresh_totals(conn: &mut PgConnection, invoice_id: i32) -> StorageResult<()> {
    let tax_rate: Option<Decimal> =
        sqlx::query_scalar("SELECT tax_rate FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(invoice_id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some(tax_rate) = tax_rate else {
        return Ok(());
    };

    let items = fetch_line_items(conn, invoice_id).await?;
    let totals = compute_totals(&items, tax_rate)?;
    sqlx::query(
        r#"
        UPDATE invoices
        SET subtotal = $1, tax_amount = $2, total = $3, updated_at = now()
        WHERE id = $4
        "#,
    )
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.total)
    .bind(invoice_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn lock_numbering(conn: &mut PgConnection) -> StorageResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(INVOICE_NUMBER_LOCK)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn number_taken(conn: &mut PgConnection, number: &str, except: i32) -> StorageResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM invoices WHERE invoice_number = $1 AND id <> $2)",
    )
    .bind(number)
    .bind(except)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

async fn next_number(conn: &mut PgConnection) -> StorageResult<String> {
    let numbers: Vec<String> =
        sqlx::query_scalar("SELECT invoice_number FROM invoices WHERE invoice_number LIKE 'INV-%'")
            .fetch_all(&mut *conn)
            .await?;
    Ok(billing::next_invoice_number(numbers.iter().map(String::as_str)))
}

#[async_trait]
impl Storage for PgStorage {
    async fn get_clients(&self) -> StorageResult<Vec<Client>> {
        let rows = sqlx::query_as::<_, ClientRow>(
            "SELECT id, name, email, address, created_at FROM clients ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Client::from).collect())
    }

    async fn get_client(&self, id: i32) -> StorageResult<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, name, email, address, created_at FROM clients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Client::from))
    }

    async fn create_client(&self, client: NewClient) -> StorageResult<Client> {
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            INSERT INTO clients (name, email, address)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, address, created_at
            "#,
        )
        .bind(client.name)
        .bind(client.email)
        .bind(client.address)
        .fetch_one(&self.pool)
        .await?;
        debug!(client_id = row.id, "client created");

        Ok(row.into())
    }

    async fn update_client(&self, id: i32, update: ClientUpdate) -> StorageResult<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            UPDATE clients
            SET name = COALESCE($1, name),
                email = COALESCE($2, email),
                address = CASE WHEN $3 THEN $4 ELSE address END
            WHERE id = $5
            RETURNING id, name, email, address, created_at
            "#,
        )
        .bind(update.name)
        .bind(update.email)
        .bind(update.address.is_some())
        .bind(update.address.flatten())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Client::from))
    }

    async fn delete_client(&self, id: i32) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_invoices(&self) -> StorageResult<Vec<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY id DESC");
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn get_invoice(&self, id: i32) -> StorageResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        fetch_invoice(&mut conn, id).await
    }

    async fn get_invoice_with_line_items(
        &self,
        id: i32,
    ) -> StorageResult<Option<InvoiceWithLineItems>> {
        let mut conn = self.pool.acquire().await?;
        let Some(invoice) = fetch_invoice(&mut conn, id).await? else {
            return Ok(None);
        };
        let line_items = fetch_line_items(&mut conn, id).await?;

        Ok(Some(InvoiceWithLineItems {
            invoice,
            line_items,
        }))
    }

    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        line_items: Vec<NewLineItem>,
    ) -> StorageResult<InvoiceWithLineItems> {
        let mut tx = self.pool.begin().await?;
        lock_numbering(&mut tx).await?;

        let invoice_number = match invoice.invoice_number {
            Some(number) => {
                if number_taken(&mut tx, &number, 0).await? {
                    return Err(StorageError::DuplicateInvoiceNumber(number));
                }
                number
            }
            None => next_number(&mut tx).await?,
        };

        let totals = compute_totals(&line_items, invoice.tax_rate)?;
        let sql = format!(
            r#"
            INSERT INTO invoices (invoice_number, client_id, client_name, client_email,
                client_address, issue_date, due_date, status, subtotal, tax_rate,
                tax_amount, total, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(&invoice_number)
            .bind(invoice.client_id)
            .bind(invoice.client_name)
            .bind(invoice.client_email)
            .bind(invoice.client_address)
            .bind(invoice.issue_date)
            .bind(invoice.due_date)
            .bind(invoice.status.as_str())
            .bind(totals.subtotal)
            .bind(invoice.tax_rate)
            .bind(totals.tax_amount)
            .bind(totals.total)
            .bind(invoice.notes)
            .fetch_one(&mut *tx)
            .await?;
        let record = Invoice::try_from(row)?;

        let mut items = Vec::with_capacity(line_items.len());
        for item in &line_items {
            items.push(insert_line_item(&mut tx, record.id, item).await?);
        }
        tx.commit().await?;

        info!(
            invoice_id = record.id,
            invoice_number = %record.invoice_number,
            total = %record.total,
            "invoice created"
        );

        Ok(InvoiceWithLineItems {
            invoice: record,
            line_items: items,
        })
    }

    async fn update_invoice(
        &self,
        id: i32,
        update: InvoiceUpdate,
        line_items: Option<Vec<NewLineItem>>,
    ) -> StorageResult<Option<InvoiceWithLineItems>> {
        let mut tx = self.pool.begin().await?;
        if update.invoice_number.is_some() {
            lock_numbering(&mut tx).await?;
        }

        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 FOR UPDATE");
        let Some(row) = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let mut invoice = Invoice::try_from(row)?;

        if let Some(number) = &update.invoice_number
            && number_taken(&mut tx, number, id).await?
        {
            return Err(StorageError::DuplicateInvoiceNumber(number.clone()));
        }
        update.apply(&mut invoice);

        sqlx::query(
            r#"
            UPDATE invoices
            SET invoice_number = $1, client_id = $2, client_name = $3, client_email = $4,
                client_address = $5, issue_date = $6, due_date = $7, status = $8,
                tax_rate = $9, notes = $10
            WHERE id = $11
            "#,
        )
        .bind(&invoice.invoice_number)
        .bind(invoice.client_id)
        .bind(&invoice.client_name)
        .bind(&invoice.client_email)
        .bind(&invoice.client_address)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.status.as_str())
        .bind(invoice.tax_rate)
        .bind(&invoice.notes)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(items) = line_items {
            sqlx::query("DELETE FROM line_items WHERE invoice_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for item in &items {
                insert_line_item(&mut tx, id, item).await?;
            }
        }

        refresh_totals(&mut tx, id).await?;
        let invoice = fetch_invoice(&mut tx, id).await?;
        let line_items = fetch_line_items(&mut tx, id).await?;
        tx.commit().await?;

        Ok(invoice.map(|invoice| InvoiceWithLineItems {
            invoice,
            line_items,
        }))
    }

    async fn delete_invoice(&self, id: i32) -> StorageResult<bool> {
        // line_items rows go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(invoice_id = id, "invoice deleted");
        }
        Ok(deleted)
    }

    async fn get_line_items_by_invoice(&self, invoice_id: i32) -> StorageResult<Vec<LineItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_line_items(&mut conn, invoice_id).await
    }

    async fn create_line_item(
        &self,
        invoice_id: i32,
        item: NewLineItem,
    ) -> StorageResult<LineItem> {
        let mut tx = self.pool.begin().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM invoices WHERE id = $1)")
            .bind(invoice_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(StorageError::UnknownInvoice(invoice_id));
        }

        let record = insert_line_item(&mut tx, invoice_id, &item).await?;
        refresh_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;

        Ok(record)
    }

    async fn update_line_item(
        &self,
        id: i32,
        update: LineItemUpdate,
    ) -> StorageResult<Option<LineItem>> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = sqlx::query_as::<_, LineItemRow>(
            "SELECT id, invoice_id, description, quantity, rate, amount \
             FROM line_items WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let mut item = LineItem::from(row);
        update.apply(&mut item);
        item.amount = line_amount(item.quantity, item.rate)?;

        sqlx::query(
            "UPDATE line_items SET description = $1, quantity = $2, rate = $3, amount = $4 \
             WHERE id = $5",
        )
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.rate)
        .bind(item.amount)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        refresh_totals(&mut tx, item.invoice_id).await?;
        tx.commit().await?;

        Ok(Some(item))
    }

    async fn delete_line_item(&self, id: i32) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;
        let invoice_id: Option<i32> =
            sqlx::query_scalar("DELETE FROM line_items WHERE id = $1 RETURNING invoice_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(invoice_id) = invoice_id else {
            return Ok(false);
        };

        refresh_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn delete_line_items_by_invoice(&self, invoice_id: i32) -> StorageResult<usize> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM line_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await?;
        refresh_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;

        Ok(result.rows_affected() as usize)
    }

    async fn next_invoice_number(&self) -> StorageResult<String> {
        let mut conn = self.pool.acquire().await?;
        next_number(&mut conn).await
    }

    async fn get_invoice_stats(&self) -> StorageResult<InvoiceStats> {
        let invoices = self.get_invoices().await?;
        Ok(billing::summarize(&invoices))
    }
}
