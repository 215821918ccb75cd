use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{Storage, StorageError, StorageResult};
use crate::billing::{self, Billable, InvoiceTotals, compute_totals, line_amount};
use crate::models::{
    Client, ClientUpdate, Invoice, InvoiceStats, InvoiceUpdate, InvoiceWithLineItems, LineItem,
    LineItemUpdate, NewClient, NewInvoice, NewLineItem,
};

#[derive(Default)]
struct Tables {
    clients: BTreeMap<i32, Client>,
    invoices: BTreeMap<i32, Invoice>,
    line_items: BTreeMap<i32, LineItem>,
    last_client_id: i32,
    last_invoice_id: i32,
    last_line_item_id: i32,
}

fn next_id(last: &mut i32) -> i32 {
    *last += 1;
    *last
}

/// Pairs each new item with its stored amount, before anything is written.
fn priced(items: Vec<NewLineItem>) -> StorageResult<Vec<(NewLineItem, Decimal)>> {
    items
        .into_iter()
        .map(|item| -> StorageResult<(NewLineItem, Decimal)> {
            let amount = line_amount(item.quantity, item.rate)?;
            Ok((item, amount))
        })
        .collect()
}

impl Tables {
    fn items_of(&self, invoice_id: i32) -> Vec<LineItem> {
        self.line_items
            .values()
            .filter(|item| item.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    fn with_line_items(&self, invoice_id: i32) -> Option<InvoiceWithLineItems> {
        self.invoices
            .get(&invoice_id)
            .map(|invoice| InvoiceWithLineItems {
                invoice: invoice.clone(),
                line_items: self.items_of(invoice_id),
            })
    }

    fn number_taken(&self, number: &str, except: Option<i32>) -> bool {
        self.invoices
            .values()
            .any(|invoice| invoice.invoice_number == number && Some(invoice.id) != except)
    }

    fn next_number(&self) -> String {
        billing::next_invoice_number(
            self.invoices
                .values()
                .map(|invoice| invoice.invoice_number.as_str()),
        )
    }

    fn insert_line_item(
        &mut self,
        invoice_id: i32,
        item: NewLineItem,
        amount: Decimal,
    ) -> LineItem {
        let id = next_id(&mut self.last_line_item_id);
        let record = LineItem {
            id,
            invoice_id,
            amount,
            description: item.description,
            quantity: item.quantity,
            rate: item.rate,
        };
        self.line_items.insert(id, record.clone());
        record
    }

    /// Totals `invoice_id` would have if `items` were its line items.
    /// `None` when the invoice does not exist.
    fn totals_for<T: Billable>(
        &self,
        invoice_id: i32,
        items: &[T],
    ) -> StorageResult<Option<InvoiceTotals>> {
        let Some(invoice) = self.invoices.get(&invoice_id) else {
            return Ok(None);
        };
        Ok(Some(compute_totals(items, invoice.tax_rate)?))
    }

    fn set_totals(&mut self, invoice_id: i32, totals: Option<InvoiceTotals>, now: DateTime<Utc>) {
        if let (Some(totals), Some(invoice)) = (totals, self.invoices.get_mut(&invoice_id)) {
            totals.apply_to(invoice);
            invoice.updated_at = now;
        }
    }

    fn remove_items_of(&mut self, invoice_id: i32) -> usize {
        let before = self.line_items.len();
        self.line_items.retain(|_, item| item.invoice_id != invoice_id);
        before - self.line_items.len()
    }
}

/// Process-local store. Every operation runs under one lock acquisition, so
/// numbering and insertion of an invoice can never interleave with another
/// writer. Amounts are computed before the tables are touched; a rejected
/// change leaves nothing behind.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| StorageError::Backend(anyhow!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| StorageError::Backend(anyhow!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_clients(&self) -> StorageResult<Vec<Client>> {
        Ok(self.read()?.clients.values().cloned().collect())
    }

    async fn get_client(&self, id: i32) -> StorageResult<Option<Client>> {
        Ok(self.read()?.clients.get(&id).cloned())
    }

    async fn create_client(&self, client: NewClient) -> StorageResult<Client> {
        let mut tables = self.write()?;
        let id = next_id(&mut tables.last_client_id);
        let record = Client {
            id,
            name: client.name,
            email: client.email,
            address: client.address,
            created_at: Utc::now(),
        };
        tables.clients.insert(id, record.clone());
        debug!(client_id = id, "client created");

        Ok(record)
    }

    async fn update_client(&self, id: i32, update: ClientUpdate) -> StorageResult<Option<Client>> {
        let mut tables = self.write()?;
        Ok(tables.clients.get_mut(&id).map(|client| {
            update.apply(client);
            client.clone()
        }))
    }

    async fn delete_client(&self, id: i32) -> StorageResult<bool> {
        let removed = self.write()?.clients.remove(&id).is_some();
        if removed {
            debug!(client_id = id, "client deleted");
        }
        Ok(removed)
    }

    async fn get_invoices(&self) -> StorageResult<Vec<Invoice>> {
        Ok(self.read()?.invoices.values().rev().cloned().collect())
    }

    async fn get_invoice(&self, id: i32) -> StorageResult<Option<Invoice>> {
        Ok(self.read()?.invoices.get(&id).cloned())
    }

    async fn get_invoice_with_line_items(
        &self,
        id: i32,
    ) -> StorageResult<Option<InvoiceWithLineItems>> {
        Ok(self.read()?.with_line_items(id))
    }

    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        line_items: Vec<NewLineItem>,
    ) -> StorageResult<InvoiceWithLineItems> {
        let totals = compute_totals(&line_items, invoice.tax_rate)?;
        let line_items = priced(line_items)?;
        let mut tables = self.write()?;

        let invoice_number = match invoice.invoice_number {
            Some(number) if tables.number_taken(&number, None) => {
                return Err(StorageError::DuplicateInvoiceNumber(number));
            }
            Some(number) => number,
            None => tables.next_number(),
        };

        let id = next_id(&mut tables.last_invoice_id);
        let now = Utc::now();
        let record = Invoice {
            id,
            invoice_number,
            client_id: invoice.client_id,
            client_name: invoice.client_name,
            client_email: invoice.client_email,
            client_address: invoice.client_address,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            status: invoice.status,
            subtotal: totals.subtotal,
            tax_rate: invoice.tax_rate,
            tax_amount: totals.tax_amount,
            total: totals.total,
            notes: invoice.notes,
            created_at: now,
            updated_at: now,
        };
        tables.invoices.insert(id, record.clone());

        let items = line_items
            .into_iter()
            .map(|(item, amount)| tables.insert_line_item(id, item, amount))
            .collect();

        info!(
            invoice_id = id,
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
        let mut tables = self.write()?;
        let Some(mut invoice) = tables.invoices.get(&id).cloned() else {
            return Ok(None);
        };

        if let Some(number) = &update.invoice_number
            && tables.number_taken(number, Some(id))
        {
            return Err(StorageError::DuplicateInvoiceNumber(number.clone()));
        }

        update.apply(&mut invoice);
        let totals = match &line_items {
            Some(items) => compute_totals(items, invoice.tax_rate)?,
            None => compute_totals(&tables.items_of(id), invoice.tax_rate)?,
        };
        let line_items = line_items.map(priced).transpose()?;

        totals.apply_to(&mut invoice);
        invoice.updated_at = Utc::now();
        tables.invoices.insert(id, invoice);

        if let Some(items) = line_items {
            let removed = tables.remove_items_of(id);
            debug!(invoice_id = id, removed, added = items.len(), "replacing line items");
            for (item, amount) in items {
                tables.insert_line_item(id, item, amount);
            }
        }

        Ok(tables.with_line_items(id))
    }

    async fn delete_invoice(&self, id: i32) -> StorageResult<bool> {
        let mut tables = self.write()?;
        if tables.invoices.remove(&id).is_none() {
            return Ok(false);
        }
        let removed = tables.remove_items_of(id);
        info!(invoice_id = id, line_items = removed, "invoice deleted");

        Ok(true)
    }

    async fn get_line_items_by_invoice(&self, invoice_id: i32) -> StorageResult<Vec<LineItem>> {
        Ok(self.read()?.items_of(invoice_id))
    }

    async fn create_line_item(
        &self,
        invoice_id: i32,
        item: NewLineItem,
    ) -> StorageResult<LineItem> {
        let amount = line_amount(item.quantity, item.rate)?;
        let mut tables = self.write()?;
        if !tables.invoices.contains_key(&invoice_id) {
            return Err(StorageError::UnknownInvoice(invoice_id));
        }

        let mut rows: Vec<(i32, Decimal)> = tables
            .items_of(invoice_id)
            .iter()
            .map(|existing| (existing.quantity, existing.rate))
            .collect();
        rows.push((item.quantity, item.rate));
        let totals = tables.totals_for(invoice_id, &rows)?;

        let record = tables.insert_line_item(invoice_id, item, amount);
        tables.set_totals(invoice_id, totals, Utc::now());

        Ok(record)
    }

    async fn update_line_item(
        &self,
        id: i32,
        update: LineItemUpdate,
    ) -> StorageResult<Option<LineItem>> {
        let mut tables = self.write()?;
        let Some(mut record) = tables.line_items.get(&id).cloned() else {
            return Ok(None);
        };

        update.apply(&mut record);
        record.amount = line_amount(record.quantity, record.rate)?;
        let items: Vec<LineItem> = tables
            .items_of(record.invoice_id)
            .into_iter()
            .map(|existing| if existing.id == id { record.clone() } else { existing })
            .collect();
        let totals = tables.totals_for(record.invoice_id, &items)?;

        tables.line_items.insert(id, record.clone());
        tables.set_totals(record.invoice_id, totals, Utc::now());

        Ok(Some(record))
    }

    async fn delete_line_item(&self, id: i32) -> StorageResult<bool> {
        let mut tables = self.write()?;
        let Some(invoice_id) = tables.line_items.get(&id).map(|item| item.invoice_id) else {
            return Ok(false);
        };
        let remaining: Vec<LineItem> = tables
            .items_of(invoice_id)
            .into_iter()
            .filter(|item| item.id != id)
            .collect();
        let totals = tables.totals_for(invoice_id, &remaining)?;

        tables.line_items.remove(&id);
        tables.set_totals(invoice_id, totals, Utc::now());

        Ok(true)
    }

    async fn delete_line_items_by_invoice(&self, invoice_id: i32) -> StorageResult<usize> {
        let mut tables = self.write()?;
        let totals = tables.totals_for::<LineItem>(invoice_id, &[])?;
        let removed = tables.remove_items_of(invoice_id);
        tables.set_totals(invoice_id, totals, Utc::now());

        Ok(removed)
    }

    async fn next_invoice_number(&self) -> StorageResult<String> {
        Ok(self.read()?.next_number())
    }

    async fn get_invoice_stats(&self) -> StorageResult<InvoiceStats> {
        Ok(billing::summarize(self.read()?.invoices.values()))
    }
}
