//! Account classification and statement assembly.

use crate::{
    error::IngestError,
    model::{AccountGroup, CanonicalAccount, Company, FinancialStatement, Money, PeriodOrder},
    reconciler::GroupKey,
    statement_decoder::RawStatementFragment,
};
use std::collections::BTreeMap;

const GROUP_PATTERNS: [(&str, AccountGroup); 5] = [
    ("Balanço Patrimonial Ativo", AccountGroup::Bpa),
    ("Balanço Patrimonial Passivo", AccountGroup::Bpp),
    ("Fluxo de Caixa", AccountGroup::Dfc),
    ("Demonstração do Resultado", AccountGroup::Dre),
    ("Valor Adicionado", AccountGroup::Dva),
];

/// Map a free-text GRUPO_DFP label to its statement group. Case-sensitive.
pub fn classify_group(label: &str) -> AccountGroup {
    GROUP_PATTERNS
        .iter()
        .find(|(pattern, _)| label.contains(pattern))
        .map(|(_, group)| group.clone())
        .unwrap_or_else(|| AccountGroup::Unclassified(label.to_string()))
}

/// Only quarterly and yearly figures are kept.
pub fn is_standard_period(months: u32) -> bool {
    months == 3 || months == 12
}

pub fn to_account(fragment: &RawStatementFragment) -> CanonicalAccount {
    CanonicalAccount {
        code:         fragment.account_code.clone(),
        description:  fragment.description.clone(),
        consolidated: fragment.is_consolidated(),
        group:        classify_group(&fragment.group_label),
        period_start: fragment.period_start.clone(),
        period_end:   fragment.period_end.clone(),
        months:       fragment.months,
        period_order: PeriodOrder::parse(&fragment.period_order),
        amount:       Money::new(fragment.value, fragment.scale, fragment.currency.clone()),
    }
}

/// Turn the surviving groups of one file into statements, one per
/// (company, year). Groups with no valid account produce nothing; statements
/// that still break the invariants come back as `InvalidStatement`.
pub fn assemble(
    groups: Vec<(GroupKey, Vec<RawStatementFragment>)>,
) -> Vec<Result<FinancialStatement, IngestError>> {
    let mut out = Vec::new();

    for (key, fragments) in groups {
        let Some(first) = fragments.first() else { continue };
        let company = Company {
            cnpj: first.cnpj.clone(),
            name: first.company_name.clone(),
        };

        // A file holds one fiscal year per group, but keep the split explicit
        // so the year always comes from the account's own period end.
        let mut by_year: BTreeMap<i32, Vec<CanonicalAccount>> = BTreeMap::new();
        for fragment in &fragments {
            if !is_standard_period(fragment.months) {
                log::trace!(
                    "cnpj={} code={} skipping {}-month period",
                    fragment.cnpj, fragment.account_code, fragment.months
                );
                continue;
            }
            let account = to_account(fragment);
            if account.is_valid() {
                by_year.entry(fragment.year).or_default().push(account);
            } else {
                log::trace!("cnpj={} code={} invalid account", fragment.cnpj, fragment.account_code);
            }
        }

        for (year, accounts) in by_year {
            let period_start = accounts
                .iter()
                .map(|a| a.period_start.as_str())
                .filter(|s| !s.is_empty())
                .min()
                .unwrap_or_default()
                .to_string();
            let statement = FinancialStatement {
                company: company.clone(),
                year,
                period_start,
                accounts,
            };
            if statement.is_valid() {
                out.push(Ok(statement));
            } else {
                log::debug!("cnpj={} year={} version={} invalid statement", key.cnpj, year, key.version);
                out.push(Err(IngestError::InvalidStatement {
                    cnpj: company.cnpj.clone(),
                    year,
                }));
            }
        }
    }

    out
}
