//! Decoder for the exchange's fixed-width historical quote file (COTAHIST).
//!
//! Layout (1-based positions, inclusive):
//!
//!   TIPREG  N(02)       01 - 02   record type, "01" = quote
//!   DATA    N(08)       03 - 10   trade date, AAAAMMDD
//!   CODBDI  X(02)       11 - 12   "02" standard lot, "12" real-estate fund
//!   CODNEG  X(12)       13 - 24   instrument code
//!   TPMERC  N(03)       25 - 27   "010" spot, "020" fractional
//!   PREABE  (11)V99     57 - 69   open
//!   PREMAX  (11)V99     70 - 82   high
//!   PREMIN  (11)V99     83 - 95   low
//!   PREULT  (11)V99    109 - 121  close
//!   VOLTOT  (16)V99    171 - 188  traded volume

use crate::{
    error::{IngestError, IngestResult},
    model::{Money, Quote},
    text::decode_text,
};
use chrono::NaiveDate;
use std::ops::Range;

pub const LINE_LEN: usize = 245;

const RECORD_TYPE: Range<usize> = 0..2;
const DATE: Range<usize> = 2..10;
const BDI: Range<usize> = 10..12;
const CODE: Range<usize> = 12..24;
const MARKET: Range<usize> = 24..27;
const PRICES: [Range<usize>; 5] = [
    56..69,   // open
    69..82,   // high
    82..95,   // low
    108..121, // close
    170..188, // volume
];

const CURRENCY: &str = "R$";

/// Decode one transcoded line. `Ok(None)` means the record is valid but not
/// one we keep (other record types, BDI codes or markets).
pub fn decode_quote_line(line: &str) -> IngestResult<Option<Quote>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_ascii() && line.len() == LINE_LEN {
        return decode_fixed(line.as_bytes());
    }

    // Accented names in free-text columns take more than one byte once
    // transcoded. None of the columns read here can hold them.
    let chars = line.chars().count();
    if chars != LINE_LEN {
        return Err(IngestError::MalformedLine { expected: LINE_LEN, found: chars });
    }
    let narrowed: String = line.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect();
    decode_fixed(narrowed.as_bytes())
}

fn decode_fixed(b: &[u8]) -> IngestResult<Option<Quote>> {
    if &b[RECORD_TYPE] != b"01" {
        return Ok(None);
    }
    if !matches!(&b[BDI], b"02" | b"12") {
        return Ok(None);
    }
    if !matches!(&b[MARKET], b"010" | b"020") {
        return Ok(None);
    }

    let code = ascii(&b[CODE]).trim().to_string();
    if code.is_empty() {
        return Err(IngestError::InvalidValue("blank instrument code".into()));
    }

    let raw_date = ascii(&b[DATE]);
    let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d")
        .map_err(|_| IngestError::InvalidDate(raw_date.to_string()))?;

    let mut vals = [0f64; 5];
    for (val, range) in vals.iter_mut().zip(PRICES) {
        let raw = ascii(&b[range]);
        let n: u64 = raw
            .parse()
            .map_err(|_| IngestError::InvalidNumber(raw.to_string()))?;
        *val = n as f64 / 100.0;
    }

    Ok(Some(Quote {
        code,
        date,
        open:   Money::new(vals[0], 1, CURRENCY),
        high:   Money::new(vals[1], 1, CURRENCY),
        low:    Money::new(vals[2], 1, CURRENCY),
        close:  Money::new(vals[3], 1, CURRENCY),
        volume: vals[4],
    }))
}

/// Slices come from an ASCII-only buffer; anything else reads as empty and
/// fails the parse that follows.
fn ascii(b: &[u8]) -> &str {
    std::str::from_utf8(b).unwrap_or("")
}

/// Outcome of decoding a whole quote file.
#[derive(Debug, Default)]
pub struct QuoteBatch {
    pub quotes:   Vec<Quote>,
    pub filtered: usize,
    pub failed:   usize,
}

/// Transcode and decode every line of a quote file. Bad lines are logged and
/// skipped.
pub fn decode_quote_file(bytes: &[u8]) -> QuoteBatch {
    let text = decode_text(bytes);
    let mut batch = QuoteBatch::default();
    for (n, line) in text.lines().enumerate() {
        match decode_quote_line(line) {
            Ok(Some(q)) => batch.quotes.push(q),
            Ok(None) => batch.filtered += 1,
            Err(e) => {
                log::trace!("quote line {}: {e}", n + 1);
                batch.failed += 1;
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a 245-column line with the given fields in place.
    fn line(tipreg: &str, bdi: &str, code: &str, market: &str, open: &str) -> String {
        let mut l = vec![b' '; LINE_LEN];
        let mut put = |range: Range<usize>, s: &str| {
            l[range.start..range.start + s.len()].copy_from_slice(s.as_bytes());
        };
        put(RECORD_TYPE, tipreg);
        put(DATE, "20210503");
        put(BDI, bdi);
        put(CODE, code);
        put(MARKET, market);
        put(PRICES[0].clone(), open);
        put(PRICES[1].clone(), "0000000012500");
        put(PRICES[2].clone(), "0000000012000");
        put(PRICES[3].clone(), "0000000012400");
        put(PRICES[4].clone(), "000000000001234500");
        String::from_utf8(l).unwrap()
    }

    #[test]
    fn decodes_spot_quote() {
        let q = decode_quote_line(&line("01", "02", "PETR4", "010", "0000000012345"))
            .unwrap()
            .unwrap();
        assert_eq!(q.code, "PETR4");
        assert_eq!(q.date, NaiveDate::from_ymd_opt(2021, 5, 3).unwrap());
        assert_eq!(q.open.value, 123.45);
        assert_eq!(q.high.value, 125.0);
        assert_eq!(q.close.value, 124.0);
        assert_eq!(q.volume, 12345.0);
        assert!(q.is_valid());
    }

    #[test]
    fn other_record_types_are_filtered() {
        let out = decode_quote_line(&line("02", "02", "PETR4", "010", "0000000012345")).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn other_bdi_and_markets_are_filtered() {
        assert!(decode_quote_line(&line("01", "96", "PETR4", "010", "0000000012345")).unwrap().is_none());
        assert!(decode_quote_line(&line("01", "12", "HGLG11", "070", "0000000012345")).unwrap().is_none());
        assert!(decode_quote_line(&line("01", "12", "HGLG11", "020", "0000000012345")).unwrap().is_some());
    }

    #[test]
    fn wrong_length_is_malformed() {
        let err = decode_quote_line("01short").unwrap_err();
        assert!(matches!(err, IngestError::MalformedLine { expected: 245, found: 7 }));
    }

    #[test]
    fn multibyte_line_of_full_byte_length_is_malformed() {
        let mut l = line("01", "02", "PETR4", "010", "0000000012345");
        // Two name columns become one two-byte character.
        l.replace_range(27..29, "É");
        assert_eq!(l.len(), LINE_LEN);
        let err = decode_quote_line(&l).unwrap_err();
        assert!(matches!(err, IngestError::MalformedLine { expected: 245, found: 244 }));
    }

    #[test]
    fn bad_numbers_and_dates_fail() {
        let l = line("01", "02", "PETR4", "010", "00000000123X5");
        assert!(matches!(decode_quote_line(&l), Err(IngestError::InvalidNumber(_))));

        let l = line("01", "02", "PETR4", "010", "0000000012345").replacen("20210503", "20211303", 1);
        assert!(matches!(decode_quote_line(&l), Err(IngestError::InvalidDate(_))));
    }

    #[test]
    fn accented_free_text_keeps_columns() {
        let mut l = line("01", "02", "PETR4", "010", "0000000012345");
        // NOMRES column (28..39) carries the company short name.
        l.replace_range(33..34, "Á");
        assert_eq!(l.chars().count(), LINE_LEN);
        assert!(l.len() > LINE_LEN);
        let q = decode_quote_line(&l).unwrap().unwrap();
        assert_eq!(q.open.value, 123.45);
    }

    #[test]
    fn file_decoding_counts_outcomes() {
        let mut text = String::from("00COTAHIST.2021BOVESPA\n");
        text.push_str(&line("01", "02", "PETR4", "010", "0000000012345"));
        text.push('\n');
        text.push_str(&line("01", "02", "VALE3", "010", "0000000050000"));
        text.push_str("\r\n");
        text.push_str(&line("99", "02", "", "010", "0000000000000"));
        let batch = decode_quote_file(text.as_bytes());
        assert_eq!(batch.quotes.len(), 2);
        assert_eq!(batch.filtered, 1);
        assert_eq!(batch.failed, 1, "the short header line is malformed");
    }
}
