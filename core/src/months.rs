//! Accrued months between a period start and a period end.
//!
//! Called once per statement line, so it works on raw bytes and never
//! allocates.

use crate::{
    error::{IngestError, IngestResult},
    types::DATE_LEN,
};

/// Number of months covered by `start ..= end`, both `YYYY-MM-DD`.
///
/// An empty `start` means a balance-sheet line (period end only), which by
/// convention covers 12 months.
pub fn months(start: &str, end: &str) -> IngestResult<u32> {
    if end.len() != DATE_LEN || (!start.is_empty() && start.len() != DATE_LEN) {
        return Err(invalid(start, end));
    }
    if start.is_empty() {
        return Ok(12);
    }

    let (s, e) = (start.as_bytes(), end.as_bytes());
    let year_start = digits(&s[0..4]);
    let month_start = digits(&s[5..7]);
    let year_end = digits(&e[0..4]);
    let month_end = digits(&e[5..7]);

    if year_start == 0 || month_start == 0 || year_end == 0 || month_end == 0 {
        return Err(invalid(start, end));
    }

    let total = if year_end != year_start {
        (year_end - year_start) * 12 - month_start + month_end + 1
    } else {
        month_end - month_start + 1
    };

    if total <= 0 {
        return Err(invalid(start, end));
    }
    Ok(total as u32)
}

/// Parses ASCII digits; any non-digit makes the whole field 0.
fn digits(b: &[u8]) -> i32 {
    let mut n = 0i32;
    for &c in b {
        if !c.is_ascii_digit() {
            return 0;
        }
        n = n * 10 + (c - b'0') as i32;
    }
    n
}

#[cold]
fn invalid(start: &str, end: &str) -> IngestError {
    IngestError::InvalidDate(format!("{start}..{end}"))
}
