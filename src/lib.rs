//! Invoicing backend: clients, invoices with line items, sequential invoice
//! numbers and revenue stats, served over a JSON HTTP API.

pub mod api;
pub mod billing;
pub mod config;
pub mod db;
pub mod models;
pub mod telemetry;
