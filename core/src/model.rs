//! Canonical accounting model: what the pipeline produces and the store keeps.

use crate::types::{Cnpj, FiscalYear, CNPJ_LEN, DATE_LEN};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A monetary amount as published: `value` expressed in units of `scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub value:    f64,
    pub scale:    i64,
    pub currency: String,
}

impl Money {
    pub fn new(value: f64, scale: i64, currency: impl Into<String>) -> Self {
        Self { value, scale, currency: currency.into() }
    }

    /// Amount with the scale applied.
    pub fn total(&self) -> f64 {
        self.value * self.scale as f64
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.total())
    }
}

/// Statement group an account belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountGroup {
    /// Balance sheet, assets.
    Bpa,
    /// Balance sheet, liabilities and equity.
    Bpp,
    /// Cash flow statement.
    Dfc,
    /// Income statement.
    Dre,
    /// Value-added statement.
    Dva,
    /// Label that matched no known statement; kept verbatim.
    Unclassified(String),
}

impl AccountGroup {
    /// Text persisted in `contas.grupo`.
    pub fn code(&self) -> &str {
        match self {
            AccountGroup::Bpa => "BPA",
            AccountGroup::Bpp => "BPP",
            AccountGroup::Dfc => "DFC",
            AccountGroup::Dre => "DRE",
            AccountGroup::Dva => "DVA",
            AccountGroup::Unclassified(label) => label,
        }
    }

    /// Inverse of `code()`, used when reading rows back.
    pub fn from_code(code: &str) -> Self {
        match code {
            "BPA" => AccountGroup::Bpa,
            "BPP" => AccountGroup::Bpp,
            "DFC" => AccountGroup::Dfc,
            "DRE" => AccountGroup::Dre,
            "DVA" => AccountGroup::Dva,
            other => AccountGroup::Unclassified(other.to_string()),
        }
    }
}

/// Which fiscal year of a filing a line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodOrder {
    Last,
    Penultimate,
}

impl PeriodOrder {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "ÚLTIMO" | "ULTIMO" => Some(PeriodOrder::Last),
            "PENÚLTIMO" | "PENULTIMO" => Some(PeriodOrder::Penultimate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub cnpj: Cnpj,
    pub name: String,
}

/// One validated account line of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAccount {
    pub code:         String,
    pub description:  String,
    pub consolidated: bool,
    pub group:        AccountGroup,
    /// Empty for balance-sheet lines, which only report a period end.
    pub period_start: String,
    pub period_end:   String,
    pub months:       u32,
    /// Not persisted; `None` for accounts read back from the store.
    pub period_order: Option<PeriodOrder>,
    pub amount:       Money,
}

impl CanonicalAccount {
    /// Penultimate-period lines are only trusted for fiscal years ending in
    /// 2009: the regulator publishes no earlier history on its own.
    pub fn is_valid(&self) -> bool {
        !self.code.is_empty()
            && !self.description.is_empty()
            && self.period_end.len() == DATE_LEN
            && match self.period_order {
                Some(PeriodOrder::Last) => true,
                Some(PeriodOrder::Penultimate) => self.period_end.starts_with("2009"),
                None => false,
            }
    }
}

/// A company's disclosure for one fiscal year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub company:      Company,
    pub year:         FiscalYear,
    pub period_start: String,
    pub accounts:     Vec<CanonicalAccount>,
}

impl FinancialStatement {
    pub fn is_valid(&self) -> bool {
        self.company.cnpj.chars().count() == CNPJ_LEN
            && !self.company.name.is_empty()
            && (2000..2221).contains(&self.year)
            && !self.accounts.is_empty()
    }
}

/// One exchange trading record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub code:   String,
    pub date:   NaiveDate,
    pub open:   Money,
    pub high:   Money,
    pub low:    Money,
    pub close:  Money,
    pub volume: f64,
}

impl Quote {
    pub fn is_valid(&self) -> bool {
        let currency = &self.open.currency;
        !self.code.trim().is_empty()
            && [&self.high, &self.low, &self.close]
                .iter()
                .all(|m| &m.currency == currency)
    }
}
