//! Decoder for the regulator's semicolon-delimited statement files (DFP/ITR).
//!
//! Column order differs between files, so every file starts with a header
//! record that is turned into a `HeaderIndex` before any data record is read.

use crate::{
    error::{IngestError, IngestResult},
    months::months,
    types::{Cnpj, FiscalYear},
};
use csv::StringRecord;
use std::io::Read;

pub const SEPARATOR: u8 = b';';

/// Record reader for one statement file. Quotes are not special in these
/// files, and rows may be shorter than the header.
pub fn statement_reader<R: Read>(rdr: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(SEPARATOR)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(rdr)
}

/// Minimum number of columns a data line must have.
pub const REQUIRED_COLUMNS: usize = 11;

/// Column label → position, resolved from one file's header line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderIndex {
    pub cnpj:         Option<usize>,
    pub company_name: Option<usize>,
    /// Absent from balance-sheet files.
    pub period_start: Option<usize>,
    pub period_end:   Option<usize>,
    pub version:      Option<usize>,
    pub account_code: Option<usize>,
    pub description:  Option<usize>,
    pub group_label:  Option<usize>,
    pub period_order: Option<usize>,
    pub value:        Option<usize>,
    pub scale:        Option<usize>,
    pub currency:     Option<usize>,
}

impl HeaderIndex {
    /// Match the known labels against the header tokens. Unknown tokens are
    /// ignored and unmatched labels stay `None`.
    pub fn from_header(headers: &StringRecord) -> Self {
        let mut idx = HeaderIndex::default();
        for (i, token) in headers.iter().enumerate() {
            let slot = match token.trim_start_matches('\u{feff}').trim() {
                "CNPJ_CIA"     => &mut idx.cnpj,
                "DENOM_CIA"    => &mut idx.company_name,
                "DT_INI_EXERC" => &mut idx.period_start,
                "DT_FIM_EXERC" => &mut idx.period_end,
                "VERSAO"       => &mut idx.version,
                "CD_CONTA"     => &mut idx.account_code,
                "DS_CONTA"     => &mut idx.description,
                "GRUPO_DFP"    => &mut idx.group_label,
                "ORDEM_EXERC"  => &mut idx.period_order,
                "VL_CONTA"     => &mut idx.value,
                "ESCALA_MOEDA" => &mut idx.scale,
                "MOEDA"        => &mut idx.currency,
                _ => continue,
            };
            *slot = Some(i);
        }
        idx
    }
}

/// One decoded data line, before reconciliation and classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatementFragment {
    pub cnpj:         Cnpj,
    pub company_name: String,
    pub year:         FiscalYear,
    pub period_start: String,
    pub period_end:   String,
    pub version:      i32,
    pub account_code: String,
    pub description:  String,
    pub group_label:  String,
    pub period_order: String,
    pub months:       u32,
    pub value:        f64,
    pub scale:        i64,
    pub currency:     String,
}

impl RawStatementFragment {
    pub fn is_consolidated(&self) -> bool {
        self.group_label.contains("onsolidado")
    }
}

/// Decode one data record with an already resolved header.
pub fn decode_fragment(record: &StringRecord, header: &HeaderIndex) -> IngestResult<RawStatementFragment> {
    if record.len() < REQUIRED_COLUMNS {
        return Err(IngestError::MissingFields {
            expected: REQUIRED_COLUMNS,
            found: record.len(),
        });
    }

    let field = |pos: Option<usize>| {
        pos.and_then(|i| record.get(i))
            .ok_or(IngestError::MissingFields {
                expected: pos.map_or(REQUIRED_COLUMNS, |i| i + 1),
                found: record.len(),
            })
    };

    // Balance-sheet files have no start column.
    let period_start = header
        .period_start
        .and_then(|i| record.get(i))
        .unwrap_or_default();
    let period_end = field(header.period_end)?;
    let accrued = months(period_start, period_end)?;

    let raw_value = field(header.value)?;
    let value: f64 = raw_value
        .trim()
        .parse()
        .map_err(|_| IngestError::InvalidValue(raw_value.to_string()))?;

    let raw_version = field(header.version)?;
    let version: i32 = raw_version
        .trim()
        .parse()
        .map_err(|_| IngestError::InvalidValue(raw_version.to_string()))?;

    let year: FiscalYear = period_end
        .get(0..4)
        .and_then(|y| y.parse().ok())
        .ok_or_else(|| IngestError::InvalidDate(period_end.to_string()))?;

    Ok(RawStatementFragment {
        cnpj:         field(header.cnpj)?.to_string(),
        company_name: field(header.company_name)?.to_string(),
        year,
        period_start: period_start.to_string(),
        period_end:   period_end.to_string(),
        version,
        account_code: field(header.account_code)?.to_string(),
        description:  field(header.description)?.to_string(),
        group_label:  field(header.group_label)?.to_string(),
        period_order: field(header.period_order)?.to_string(),
        months:       accrued,
        value,
        scale:        scale(field(header.scale)?),
        currency:     currency(field(header.currency)?),
    })
}

/// Per-file decoder: the first record fed in becomes the header.
#[derive(Debug, Default)]
pub struct StatementDecoder {
    header: Option<HeaderIndex>,
}

impl StatementDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> Option<&HeaderIndex> {
        self.header.as_ref()
    }

    /// Returns `Err(HeaderRead)` for the first record of the file.
    pub fn decode_line(&mut self, record: &StringRecord) -> IngestResult<RawStatementFragment> {
        match &self.header {
            Some(header) => decode_fragment(record, header),
            None => {
                self.header = Some(HeaderIndex::from_header(record));
                Err(IngestError::HeaderRead)
            }
        }
    }
}

/// ESCALA_MOEDA label → multiplier.
pub fn scale(label: &str) -> i64 {
    match label.trim().to_uppercase().as_str() {
        "UNIDADE" | "UNIT" => 1,
        "MIL" | "THOUSAND" => 1_000,
        "MILHÃO" | "MILHAO" | "MILLION" => 1_000_000,
        _ => 1,
    }
}

/// MOEDA label → currency symbol.
pub fn currency(label: &str) -> String {
    match label.trim().to_uppercase().as_str() {
        "REAL" => "R$".to_string(),
        _ => label.to_string(),
    }
}
