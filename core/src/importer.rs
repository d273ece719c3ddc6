//! Wiring between the orchestrator (producer) and the store (consumer).
//!
//! The store drains the result stream on the calling thread while the
//! orchestrator downloads and decodes on its own thread.

use crate::{
    dedup::DedupTracker,
    error::{IngestError, IngestResult},
    orchestrator::{CancelToken, ImportHandle, ImportItem, ImportOrchestrator, ImportRequest},
    quote::decode_quote_file,
    source::{statement_archive_url, statement_filters, ArchiveMember, ArchiveSource},
    store::FilingStore,
    types::FiscalYear,
};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Member-name fragment of the exchange's quote files.
const QUOTE_FILTER: &str = "COTAHIST";

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Quarterly (ITR) instead of annual (DFP) filings.
    pub quarterly: bool,
    /// Upper bound for importing one year.
    pub deadline:  Option<Duration>,
    pub cancel:    CancelToken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub year:             FiscalYear,
    pub files_seen:       usize,
    pub files_skipped:    usize,
    pub lines_decoded:    usize,
    pub statements_saved: usize,
    /// Error items received on the stream (invalid statements, unreadable files).
    pub errors:           usize,
    pub hashes_recorded:  usize,
}

/// Import one year's statement archive into `store`.
///
/// Fails with the download error if the archive cannot be fetched, with the
/// store error if a statement cannot be saved, and with `Cancelled` or
/// `DeadlineExceeded` if the import was stopped. Statements saved before a
/// failure stay committed.
pub fn import_year<S: ArchiveSource + 'static>(
    store: &mut FilingStore,
    source: S,
    url_base: &str,
    year: FiscalYear,
    options: &ImportOptions,
) -> IngestResult<ImportReport> {
    let request = ImportRequest {
        year,
        url: statement_archive_url(url_base, year, options.quarterly),
        filters: statement_filters(),
    };

    let tracker = DedupTracker::new(store.hashes()?);
    log::debug!("year={year} {} known file hashes", tracker.len());

    let mut orchestrator = ImportOrchestrator::new(source, tracker).with_cancel(options.cancel.clone());
    if let Some(limit) = options.deadline {
        orchestrator = orchestrator.with_deadline(Instant::now() + limit);
    }

    let handle = orchestrator.spawn(request)?;
    let mut report = ImportReport { year, ..ImportReport::default() };
    let drained = drain(store, &handle, &mut report);
    let outcome = handle.join()?;

    report.files_seen = outcome.stats.files_seen;
    report.files_skipped = outcome.stats.files_skipped;
    report.lines_decoded = outcome.stats.lines_decoded;

    // A store failure closed the stream early; that is the real cause.
    drained?;
    outcome.result?;
    Ok(report)
}

fn drain(store: &mut FilingStore, handle: &ImportHandle, report: &mut ImportReport) -> IngestResult<()> {
    for item in handle.iter() {
        match item {
            ImportItem::Statement(statement) => {
                store.save_statement(&statement)?;
                report.statements_saved += 1;
            }
            ImportItem::Error(e) => {
                log::warn!("year={} {e}", report.year);
                report.errors += 1;
            }
            ImportItem::FileHash(hash) => match store.save_hash(&hash) {
                Ok(_) => report.hashes_recorded += 1,
                Err(e) => log::error!("year={} could not record file hash {hash}: {e}", report.year),
            },
        }
    }
    Ok(())
}

/// Import several years, newest first as given. A failed year does not stop
/// the others; cancellation does.
pub fn import_years<S: ArchiveSource + Clone + 'static>(
    store: &mut FilingStore,
    source: &S,
    url_base: &str,
    years: &[FiscalYear],
    options: &ImportOptions,
) -> Vec<(FiscalYear, IngestResult<ImportReport>)> {
    let mut results = Vec::with_capacity(years.len());
    for &year in years {
        if options.cancel.is_cancelled() {
            log::info!("import cancelled before year={year}");
            break;
        }
        let result = import_year(store, source.clone(), url_base, year, options);
        if let Err(e) = &result {
            log::error!("year={year} failed: {e}");
        }
        results.push((year, result));
    }
    results
}

// ── Quotes ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuoteReport {
    pub files_seen:     usize,
    pub files_skipped:  usize,
    pub quotes_saved:   usize,
    pub lines_filtered: usize,
    pub lines_failed:   usize,
}

/// Import one quote archive. Files already imported are skipped.
pub fn import_quotes<S: ArchiveSource>(
    store: &mut FilingStore,
    source: &S,
    url: &str,
) -> IngestResult<QuoteReport> {
    let members = source.fetch(url, &[QUOTE_FILTER.to_string()])?;
    let result = save_quote_members(store, &members);

    let leftover = source.cleanup(&members);
    if !leftover.is_empty() {
        log::warn!("could not remove {} extracted quote files", leftover.len());
    }
    result
}

fn save_quote_members(store: &mut FilingStore, members: &[ArchiveMember]) -> IngestResult<QuoteReport> {
    let mut tracker = DedupTracker::new(store.hashes()?);
    let mut report = QuoteReport::default();

    for member in members {
        report.files_seen += 1;
        if tracker.is_known(&member.hash) {
            log::warn!("quote file {} already processed, skipping", member.path.display());
            report.files_skipped += 1;
            continue;
        }

        let bytes = std::fs::read(&member.path).map_err(IngestError::Io)?;
        let batch = decode_quote_file(&bytes);
        report.quotes_saved += store.save_quotes(&batch.quotes)?;
        report.lines_filtered += batch.filtered;
        report.lines_failed += batch.failed;

        store.save_hash(&member.hash)?;
        tracker.record(&member.hash);
        log::info!(
            "quote file {}: {} quotes, {} filtered, {} failed",
            member.path.display(),
            batch.quotes.len(),
            batch.filtered,
            batch.failed
        );
    }
    Ok(report)
}
