//! SQLite persistence gateway.
//!
//! RULE: Only the store talks to the database.
//! The importer and the runner call store methods; they never execute SQL directly.
//!
//! One `FilingStore` is one gateway lifetime: the "already cleared" set and
//! the company-name cache live here and are never shared between instances.

mod company;
mod hash;
mod quote;
mod schema;
mod statement;

pub use schema::{TableSpec, MANAGED_TABLES, SCHEMA_VERSION};
pub use statement::SaveOutcome;

use crate::{
    error::IngestResult,
    model::Company,
    types::{Cnpj, FiscalYear},
};
use rusqlite::Connection;
use std::{collections::HashSet, time::Duration};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FilingStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
    /// Keys whose previous rows were already replaced during this run.
    cleared: HashSet<(Cnpj, FiscalYear)>,
    /// (folded name, company), sorted. Dropped whenever a company row is inserted.
    company_cache: Option<Vec<(String, Company)>>,
}

impl FilingStore {
    pub fn open(path: &str) -> IngestResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.busy_timeout(BUSY_TIMEOUT)?;
        log::debug!("opened store at {path}");
        Ok(Self::with_connection(conn, Some(path.to_string())))
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> IngestResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn, None))
    }

    fn with_connection(conn: Connection, path: Option<String>) -> Self {
        Self {
            conn,
            path,
            cleared: HashSet::new(),
            company_cache: None,
        }
    }

    /// Reopen a new gateway on the same database.
    /// For in-memory databases, this returns a new, empty database.
    pub fn reopen(&self) -> IngestResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Begin a new import run on this connection: the next write for any
    /// (cnpj, year) replaces what is stored again.
    pub fn start_run(&mut self) {
        if !self.cleared.is_empty() {
            log::debug!("start_run: forgetting {} cleared keys", self.cleared.len());
        }
        self.cleared.clear();
    }
}
