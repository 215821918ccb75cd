//! Storage tests against a live PostgreSQL database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test --features postgres -- --ignored`.
//! Each test starts by clearing the tables, so point it at a scratch database.

#![cfg(feature = "postgres")]

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use invoice_server::db::{PgStorage, Storage};
use invoice_server::models::{InvoiceStatus, InvoiceUpdate, NewInvoice, NewLineItem};

async fn storage() -> PgStorage {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let storage = PgStorage::connect(&url, 5).await.expect("connect");
    storage.migrate().await.expect("migrate");
    for invoice in storage.get_invoices().await.unwrap() {
        storage.delete_invoice(invoice.id).await.unwrap();
    }
    storage
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn new_invoice(number: Option<&str>, status: InvoiceStatus) -> NewInvoice {
    NewInvoice {
        invoice_number: number.map(str::to_string),
        client_id: None,
        client_name: "Acme Corp".to_string(),
        client_email: "billing@acme.test".to_string(),
        client_address: None,
        issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        due_date: None,
        status,
        tax_rate: dec("10"),
        notes: None,
    }
}

fn item(quantity: i32, rate: &str) -> NewLineItem {
    NewLineItem {
        description: "Work".to_string(),
        quantity,
        rate: dec(rate),
    }
}

#[tokio::test]
#[ignore]
async fn create_and_number_invoices() {
    let store = storage().await;

    let first = store
        .create_invoice(
            new_invoice(None, InvoiceStatus::Draft),
            vec![item(2, "100.00"), item(1, "50.50")],
        )
        .await
        .unwrap();
    assert_eq!(first.invoice.invoice_number, "INV-001");
    assert_eq!(first.invoice.total.to_string(), "275.55");

    store
        .create_invoice(new_invoice(Some("INV-010"), InvoiceStatus::Sent), vec![])
        .await
        .unwrap();
    assert_eq!(store.next_invoice_number().await.unwrap(), "INV-011");

    let err = store
        .create_invoice(new_invoice(Some("INV-010"), InvoiceStatus::Sent), vec![])
        .await;
    assert!(err.is_err());
}

#[tokio::test]
#[ignore]
async fn updates_recompute_and_delete_cascades() {
    let store = storage().await;
    let created = store
        .create_invoice(new_invoice(None, InvoiceStatus::Draft), vec![item(1, "100")])
        .await
        .unwrap();
    let id = created.invoice.id;

    let updated = store
        .update_invoice(
            id,
            InvoiceUpdate {
                tax_rate: Some(dec("0")),
                status: Some(InvoiceStatus::Paid),
                ..InvoiceUpdate::default()
            },
            None,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.invoice.total.to_string(), "100.00");

    let stats = store.get_invoice_stats().await.unwrap();
    assert_eq!(stats.total_revenue.to_string(), "100.00");

    assert!(store.delete_invoice(id).await.unwrap());
    assert!(store.get_line_items_by_invoice(id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn oversized_amounts_roll_back() {
    let store = storage().await;
    let created = store
        .create_invoice(new_invoice(None, InvoiceStatus::Draft), vec![item(1, "100")])
        .await
        .unwrap();
    let id = created.invoice.id;

    let err = store
        .create_line_item(id, item(2, "79228162514264337593543950335"))
        .await;
    assert!(err.is_err());

    let stored = store.get_invoice_with_line_items(id).await.unwrap().unwrap();
    assert_eq!(stored.line_items.len(), 1);
    assert_eq!(stored.invoice.total.to_string(), "110.00");
}
