use super::FilingStore;
use crate::{error::IngestResult, model::Company, text::fold_name};

impl FilingStore {
    // ── Companies ──────────────────────────────────────────────

    /// Distinct (cnpj, name) pairs, ordered by accent-free name.
    pub fn companies(&mut self) -> IngestResult<Vec<Company>> {
        Ok(self.company_cache()?.iter().map(|(_, c)| c.clone()).collect())
    }

    /// Companies whose name starts with `prefix`, ignoring accents and case.
    pub fn search_companies(&mut self, prefix: &str) -> IngestResult<Vec<Company>> {
        let key = fold_name(prefix.trim());
        Ok(self
            .company_cache()?
            .iter()
            .filter(|(folded, _)| folded.starts_with(&key))
            .map(|(_, c)| c.clone())
            .collect())
    }

    fn company_cache(&mut self) -> IngestResult<&[(String, Company)]> {
        if self.company_cache.is_none() {
            let list = self.load_companies()?;
            log::debug!("company cache loaded: {} entries", list.len());
            self.company_cache = Some(list);
        }
        Ok(self.company_cache.as_deref().unwrap_or_default())
    }

    fn load_companies(&self) -> IngestResult<Vec<(String, Company)>> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT cnpj, nome FROM empresas")?;
        let rows = stmt.query_map([], |row| {
            Ok(Company {
                cnpj: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut list = rows
            .map(|r| r.map(|c| (fold_name(&c.name), c)))
            .collect::<Result<Vec<_>, _>>()?;
        list.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cnpj.cmp(&b.1.cnpj)));
        Ok(list)
    }
}
