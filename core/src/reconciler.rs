//! Version reconciliation.
//!
//! The regulator re-publishes corrected filings inside the same archive with
//! a higher document version. Only groups whose next version is absent from
//! the file survive.

use crate::{
    statement_decoder::RawStatementFragment,
    types::{Cnpj, FiscalYear},
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub cnpj:    Cnpj,
    pub year:    FiscalYear,
    pub version: i32,
}

impl GroupKey {
    fn next_version(&self) -> GroupKey {
        GroupKey {
            cnpj:    self.cnpj.clone(),
            year:    self.year,
            version: self.version + 1,
        }
    }
}

/// Collects every fragment of one source file, grouped by
/// (company, fiscal year, document version).
#[derive(Debug, Default)]
pub struct VersionReconciler {
    groups: BTreeMap<GroupKey, Vec<RawStatementFragment>>,
    fragments: usize,
}

impl VersionReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: RawStatementFragment) {
        let key = GroupKey {
            cnpj:    fragment.cnpj.clone(),
            year:    fragment.year,
            version: fragment.version,
        };
        self.groups.entry(key).or_default().push(fragment);
        self.fragments += 1;
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Consume the file's groups, dropping those superseded by `version + 1`.
    /// Output is ordered by key.
    pub fn finish(self) -> Vec<(GroupKey, Vec<RawStatementFragment>)> {
        let superseded: Vec<bool> = self
            .groups
            .keys()
            .map(|k| self.groups.contains_key(&k.next_version()))
            .collect();

        self.groups
            .into_iter()
            .zip(superseded)
            .filter_map(|((key, frags), stale)| {
                if stale {
                    log::trace!("cnpj={} year={} version={} superseded", key.cnpj, key.year, key.version);
                    None
                } else if frags.is_empty() {
                    None
                } else {
                    Some((key, frags))
                }
            })
            .collect()
    }
}
