use super::FilingStore;
use crate::{
    error::IngestResult,
    model::{Money, Quote},
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

const DATE_FMT: &str = "%Y-%m-%d";

impl FilingStore {
    // ── Quotes ─────────────────────────────────────────────────

    /// Upsert quotes in one transaction. Returns the number written.
    pub fn save_quotes(&mut self, quotes: &[Quote]) -> IngestResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO ativos (codigo, data, abertura, maxima, minima, encerramento, moeda, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(codigo, data) DO UPDATE SET
                    abertura     = excluded.abertura,
                    maxima       = excluded.maxima,
                    minima       = excluded.minima,
                    encerramento = excluded.encerramento,
                    moeda        = excluded.moeda,
                    volume       = excluded.volume",
            )?;
            for q in quotes {
                stmt.execute(params![
                    q.code,
                    q.date.format(DATE_FMT).to_string(),
                    q.open.value,
                    q.high.value,
                    q.low.value,
                    q.close.value,
                    q.close.currency,
                    q.volume,
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("saved {} quotes", quotes.len());
        Ok(quotes.len())
    }

    pub fn quote(&self, code: &str, date: NaiveDate) -> IngestResult<Option<Quote>> {
        let quote = self
            .conn
            .query_row(
                "SELECT abertura, maxima, minima, encerramento, moeda, volume
                 FROM ativos WHERE codigo = ?1 AND data = ?2",
                params![code, date.format(DATE_FMT).to_string()],
                |row| {
                    let currency: String = row.get(4)?;
                    Ok(Quote {
                        code:   code.to_string(),
                        date,
                        open:   Money::new(row.get(0)?, 1, currency.clone()),
                        high:   Money::new(row.get(1)?, 1, currency.clone()),
                        low:    Money::new(row.get(2)?, 1, currency.clone()),
                        close:  Money::new(row.get(3)?, 1, currency),
                        volume: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(quote)
    }
}
