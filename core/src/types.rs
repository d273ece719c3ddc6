//! Shared primitive types used across the ingestion pipeline.

/// Company tax id in the masked `00.000.000/0000-00` form.
pub type Cnpj = String;

/// A fiscal year, taken from the first four digits of the period-end date.
pub type FiscalYear = i32;

/// Hex digest identifying the content of one source file.
pub type FileHash = String;

/// Length of a masked CNPJ, e.g. `17.836.901/0001-10`.
pub const CNPJ_LEN: usize = 18;

/// Length of a `YYYY-MM-DD` date.
pub const DATE_LEN: usize = 10;
