use super::FilingStore;
use crate::{
    error::{IngestError, IngestResult},
    model::{AccountGroup, CanonicalAccount, Company, FinancialStatement, Money},
    types::FiscalYear,
};
use rusqlite::{params, ErrorCode, OptionalExtension};

/// What one `save_statement` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub statement_id: i64,
    /// Previously stored rows for the key were deleted first.
    pub replaced:     bool,
    pub inserted:     usize,
    /// Accounts skipped because the same key was already in the statement.
    pub duplicates:   usize,
}

impl FilingStore {
    // ── Statements ─────────────────────────────────────────────

    /// Persist one statement atomically.
    ///
    /// The first write for a (cnpj, year) in this run replaces whatever was
    /// stored for it; later writes in the same run add accounts to it.
    /// Duplicate accounts are skipped with a warning. Any other failure
    /// rolls the whole statement back.
    pub fn save_statement(&mut self, statement: &FinancialStatement) -> IngestResult<SaveOutcome> {
        let cnpj = &statement.company.cnpj;
        let key = (cnpj.clone(), statement.year);
        let first_touch = !self.cleared.contains(&key);

        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM empresas WHERE cnpj = ?1 AND ano = ?2",
                params![cnpj, statement.year],
                |row| row.get(0),
            )
            .optional()?;

        let mut replaced = false;
        let reuse = match existing {
            Some(id) if first_touch => {
                tx.execute("DELETE FROM contas WHERE id_empresa = ?1", params![id])?;
                tx.execute("DELETE FROM empresas WHERE id = ?1", params![id])?;
                replaced = true;
                None
            }
            other => other,
        };

        let created = reuse.is_none();
        let statement_id = match reuse {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO empresas (cnpj, nome, ano) VALUES (?1, ?2, ?3)",
                    params![cnpj, statement.company.name, statement.year],
                )?;
                tx.last_insert_rowid()
            }
        };

        let mut inserted = 0;
        let mut duplicates = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO contas (
                    id_empresa, codigo, descr, grupo, consolidado,
                    data_ini_exerc, data_fim_exerc, meses, valor, escala, moeda
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            )?;
            for acc in &statement.accounts {
                let result = stmt.execute(params![
                    statement_id,
                    acc.code,
                    acc.description,
                    acc.group.code(),
                    acc.consolidated,
                    acc.period_start,
                    acc.period_end,
                    acc.months,
                    acc.amount.value,
                    acc.amount.scale,
                    acc.amount.currency,
                ]);
                match result {
                    Ok(_) => inserted += 1,
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        let dup = IngestError::DuplicateAccount {
                            statement_id,
                            code: acc.code.clone(),
                        };
                        log::warn!("{dup} ({} {})", cnpj, statement.year);
                        duplicates += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tx.commit()?;

        self.cleared.insert(key);
        if created {
            self.company_cache = None;
        }

        log::debug!(
            "saved cnpj={cnpj} year={} id={statement_id} accounts={inserted} duplicates={duplicates}",
            statement.year
        );
        Ok(SaveOutcome { statement_id, replaced, inserted, duplicates })
    }

    /// Load a statement by cnpj, falling back to the company name, with its
    /// accounts ordered by code.
    pub fn load_statement(
        &self,
        cnpj_or_name: &str,
        year: FiscalYear,
    ) -> IngestResult<Option<FinancialStatement>> {
        let by = |column: &str| {
            self.conn
                .query_row(
                    &format!("SELECT id, cnpj, nome FROM empresas WHERE {column} = ?1 AND ano = ?2"),
                    params![cnpj_or_name, year],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
                )
                .optional()
        };

        let found = match by("cnpj")? {
            Some(row) => Some(row),
            None => by("nome")?,
        };
        let Some((id, cnpj, name)) = found else {
            return Ok(None);
        };

        let accounts = self.accounts_for(id)?;
        let period_start = accounts
            .iter()
            .map(|a| a.period_start.as_str())
            .filter(|s| !s.is_empty())
            .min()
            .unwrap_or_default()
            .to_string();

        Ok(Some(FinancialStatement {
            company: Company { cnpj, name },
            year,
            period_start,
            accounts,
        }))
    }

    fn accounts_for(&self, statement_id: i64) -> IngestResult<Vec<CanonicalAccount>> {
        let mut stmt = self.conn.prepare(
            "SELECT codigo, descr, grupo, consolidado, data_ini_exerc, data_fim_exerc,
                    meses, valor, escala, moeda
             FROM contas WHERE id_empresa = ?1
             ORDER BY codigo, consolidado DESC, data_fim_exerc DESC, data_ini_exerc",
        )?;
        let rows = stmt.query_map(params![statement_id], |row| {
            Ok(CanonicalAccount {
                code:         row.get(0)?,
                description:  row.get(1)?,
                group:        AccountGroup::from_code(&row.get::<_, String>(2)?),
                consolidated: row.get::<_, i32>(3)? != 0,
                period_start: row.get(4)?,
                period_end:   row.get(5)?,
                months:       row.get(6)?,
                period_order: None,
                amount:       Money::new(
                    row.get(7)?,
                    row.get(8)?,
                    row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                ),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Number of account rows stored for (cnpj, year).
    pub fn account_count(&self, cnpj: &str, year: FiscalYear) -> IngestResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM contas c JOIN empresas e ON c.id_empresa = e.id
             WHERE e.cnpj = ?1 AND e.ano = ?2",
            params![cnpj, year],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}
