use super::FilingStore;
use crate::error::IngestResult;
use rusqlite::{params, OptionalExtension};

/// Version every managed table is expected at. Bump it when any DDL changes:
/// mismatching tables are dropped and recreated empty.
pub const SCHEMA_VERSION: i64 = 17;

/// A table whose DDL is versioned in `tabelas`.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name:    &'static str,
    pub version: i64,
    pub up:      &'static str,
    pub down:    &'static str,
}

pub const MANAGED_TABLES: [TableSpec; 4] = [
    TableSpec {
        name:    "empresas",
        version: SCHEMA_VERSION,
        up:      include_str!("../../../migrations/001_empresas.sql"),
        down:    "DROP TABLE IF EXISTS empresas;",
    },
    TableSpec {
        name:    "contas",
        version: SCHEMA_VERSION,
        up:      include_str!("../../../migrations/002_contas.sql"),
        down:    "DROP TABLE IF EXISTS contas;",
    },
    TableSpec {
        name:    "hashes",
        version: SCHEMA_VERSION,
        up:      include_str!("../../../migrations/003_hashes.sql"),
        down:    "DROP TABLE IF EXISTS hashes;",
    },
    TableSpec {
        name:    "ativos",
        version: SCHEMA_VERSION,
        up:      include_str!("../../../migrations/004_ativos.sql"),
        down:    "DROP TABLE IF EXISTS ativos;",
    },
];

impl FilingStore {
    // ── Schema ─────────────────────────────────────────────────

    /// Bring every managed table to `SCHEMA_VERSION`.
    pub fn migrate(&self) -> IngestResult<()> {
        self.migrate_tables(&MANAGED_TABLES)?;
        Ok(())
    }

    /// Drop and recreate each table whose stored version differs from the
    /// `TableSpec`. No data is carried over. Returns the names recreated.
    pub fn migrate_tables(&self, tables: &[TableSpec]) -> IngestResult<Vec<&'static str>> {
        self.conn
            .execute_batch(include_str!("../../../migrations/000_tabelas.sql"))?;

        let mut recreated = Vec::new();
        for table in tables {
            let stored = self.table_version(table.name)?;
            if stored == Some(table.version) {
                continue;
            }
            log::info!(
                "recreating table {} (stored v{}, expected v{})",
                table.name,
                stored.unwrap_or(0),
                table.version
            );
            self.conn.execute_batch(table.down)?;
            self.conn.execute_batch(table.up)?;
            self.conn.execute(
                "INSERT OR REPLACE INTO tabelas (nome, versao) VALUES (?1, ?2)",
                params![table.name, table.version],
            )?;
            recreated.push(table.name);
        }
        Ok(recreated)
    }

    pub fn table_version(&self, name: &str) -> IngestResult<Option<i64>> {
        let version = self
            .conn
            .query_row(
                "SELECT versao FROM tabelas WHERE nome = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }
}
