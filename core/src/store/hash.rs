use super::FilingStore;
use crate::{error::IngestResult, types::FileHash};
use rusqlite::params;

impl FilingStore {
    // ── Processed files ────────────────────────────────────────

    pub fn hashes(&self) -> IngestResult<Vec<FileHash>> {
        let mut stmt = self.conn.prepare("SELECT hash FROM hashes ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Record a fully imported file. Returns `false` if it was already known.
    pub fn save_hash(&self, hash: &str) -> IngestResult<bool> {
        let n = self
            .conn
            .execute("INSERT OR IGNORE INTO hashes (hash) VALUES (?1)", params![hash])?;
        Ok(n > 0)
    }
}
