//! filings-core: ingestion of regulator financial statements and exchange
//! quotes into a local SQLite store.
//!
//! Pipeline: source → statement_decoder → reconciler → classifier →
//! orchestrator (stream) → importer → store.

pub mod classifier;
pub mod config;
pub mod dedup;
pub mod error;
pub mod importer;
pub mod model;
pub mod months;
pub mod orchestrator;
pub mod quote;
pub mod reconciler;
pub mod source;
pub mod statement_decoder;
pub mod store;
pub mod text;
pub mod types;
