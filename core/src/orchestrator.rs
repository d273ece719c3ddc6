//! Import orchestrator: the single producer of the pipeline.
//!
//! FLOW (one instance per import invocation):
//!   Idle → Downloading → Decoding(file) → Streaming → … → Done | Failed
//!
//! RULES:
//!   - Files are decoded one at a time, in archive order, on one thread.
//!   - Everything produced goes onto one ordered stream. A file's statements
//!     are always followed by that file's hash marker.
//!   - Line-level decode errors are logged and skipped.
//!   - Cancellation is honoured between files; the deadline is also checked
//!     while a file is being decoded.

use crate::{
    classifier::assemble,
    dedup::DedupTracker,
    error::{IngestError, IngestResult},
    model::FinancialStatement,
    reconciler::VersionReconciler,
    source::{ArchiveMember, ArchiveSource},
    statement_decoder::{statement_reader, StatementDecoder},
    text::decode_text,
    types::{FileHash, FiscalYear},
};
use csv::StringRecord;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

/// Lines decoded between two deadline checks.
const DEADLINE_CHECK_EVERY: usize = 4096;

/// One message on the result stream.
#[derive(Debug)]
pub enum ImportItem {
    Statement(FinancialStatement),
    Error(IngestError),
    /// The file with this hash has been fully streamed.
    FileHash(FileHash),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    Downloading,
    Decoding { file: PathBuf },
    Streaming,
    Done,
    Failed,
}

/// Shared flag a caller flips to stop an import after the current file.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub year:    FiscalYear,
    pub url:     String,
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub files_seen:         usize,
    pub files_skipped:      usize,
    pub lines_decoded:      usize,
    pub lines_failed:       usize,
    pub statements:         usize,
    pub invalid_statements: usize,
}

pub struct ImportOrchestrator<S: ArchiveSource> {
    source:   S,
    tracker:  DedupTracker,
    phase:    ImportPhase,
    cancel:   CancelToken,
    deadline: Option<Instant>,
    stats:    ImportStats,
}

impl<S: ArchiveSource> ImportOrchestrator<S> {
    pub fn new(source: S, tracker: DedupTracker) -> Self {
        Self {
            source,
            tracker,
            phase:    ImportPhase::Idle,
            cancel:   CancelToken::new(),
            deadline: None,
            stats:    ImportStats::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn phase(&self) -> &ImportPhase {
        &self.phase
    }

    pub fn stats(&self) -> &ImportStats {
        &self.stats
    }

    pub fn tracker(&self) -> &DedupTracker {
        &self.tracker
    }

    fn set_phase(&mut self, phase: ImportPhase) {
        log::trace!("import phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn check_deadline(&self) -> IngestResult<()> {
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(IngestError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Run the whole import on the calling thread, pushing results onto `tx`.
    ///
    /// Returns `DownloadFailed` when the archive cannot be fetched, and
    /// `Cancelled`/`DeadlineExceeded` when stopped early. Items already sent
    /// stay valid in every case.
    pub fn run(&mut self, request: &ImportRequest, tx: &Sender<ImportItem>) -> IngestResult<()> {
        self.set_phase(ImportPhase::Downloading);
        let members = match self.source.fetch(&request.url, &request.filters) {
            Ok(m) => m,
            Err(e) => {
                log::error!("year={} download failed: {e}", request.year);
                self.set_phase(ImportPhase::Failed);
                return Err(e);
            }
        };
        log::info!("year={} archive has {} member files", request.year, members.len());

        let result = self.process_members(request.year, &members, tx);

        let leftover = self.source.cleanup(&members);
        if !leftover.is_empty() {
            log::warn!("year={} could not remove {} extracted files", request.year, leftover.len());
        }

        match &result {
            Ok(()) => {
                self.set_phase(ImportPhase::Done);
                log::info!(
                    "year={} done: {} files ({} skipped), {} lines, {} statements",
                    request.year,
                    self.stats.files_seen,
                    self.stats.files_skipped,
                    self.stats.lines_decoded,
                    self.stats.statements
                );
            }
            Err(e) => {
                self.set_phase(ImportPhase::Failed);
                log::warn!("year={} stopped: {e}", request.year);
            }
        }
        result
    }

    fn process_members(
        &mut self,
        year: FiscalYear,
        members: &[ArchiveMember],
        tx: &Sender<ImportItem>,
    ) -> IngestResult<()> {
        for member in members {
            if self.cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            self.check_deadline()?;
            self.stats.files_seen += 1;

            let name = file_name(&member.path);
            if self.tracker.is_known(&member.hash) {
                log::warn!("year={year} file={name} already processed, skipping");
                self.stats.files_skipped += 1;
                continue;
            }

            self.set_phase(ImportPhase::Decoding { file: member.path.clone() });
            let results = match self.decode_file(&member.path) {
                Ok(r) => r,
                Err(IngestError::Io(e)) => {
                    log::error!("year={year} file={name} unreadable: {e}");
                    send(tx, ImportItem::Error(IngestError::Io(e)))?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.set_phase(ImportPhase::Streaming);
            for result in results {
                let item = match result {
                    Ok(statement) => {
                        self.stats.statements += 1;
                        ImportItem::Statement(statement)
                    }
                    Err(e) => {
                        self.stats.invalid_statements += 1;
                        ImportItem::Error(e)
                    }
                };
                send(tx, item)?;
            }
            send(tx, ImportItem::FileHash(member.hash.clone()))?;
            self.tracker.record(&member.hash);
        }
        Ok(())
    }

    /// Decode, reconcile and classify one file.
    fn decode_file(&mut self, path: &Path) -> IngestResult<Vec<IngestResult<FinancialStatement>>> {
        let bytes = std::fs::read(path)?;
        let text = decode_text(&bytes);

        let mut decoder = StatementDecoder::new();
        let mut reconciler = VersionReconciler::new();
        let mut reader = statement_reader(text.as_bytes());
        let mut record = StringRecord::new();

        let mut n = 0usize;
        loop {
            if n % DEADLINE_CHECK_EVERY == 0 {
                self.check_deadline()?;
            }
            n += 1;
            match reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    log::trace!("file={} record {n}: {e}", file_name(path));
                    self.stats.lines_failed += 1;
                    continue;
                }
            }
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            match decoder.decode_line(&record) {
                Ok(fragment) => reconciler.push(fragment),
                Err(IngestError::HeaderRead) => {}
                Err(e) if e.is_line_level() => {
                    let line = record.position().map_or(n as u64, |p| p.line());
                    log::trace!("file={} line {line}: {e}", file_name(path));
                    self.stats.lines_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.stats.lines_decoded += reconciler.fragment_count();
        log::debug!(
            "file={} fragments={} groups={}",
            file_name(path),
            reconciler.fragment_count(),
            reconciler.group_count()
        );
        Ok(assemble(reconciler.finish()))
    }
}

impl<S: ArchiveSource + 'static> ImportOrchestrator<S> {
    /// Run the import on its own thread. The caller drains the returned
    /// handle's stream, then joins it.
    pub fn spawn(mut self, request: ImportRequest) -> IngestResult<ImportHandle> {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(format!("import-{}", request.year))
            .spawn(move || {
                let result = self.run(&request, &tx);
                drop(tx);
                ImportOutcome {
                    result,
                    stats: self.stats,
                    phase: self.phase,
                }
            })?;
        Ok(ImportHandle { rx, worker })
    }
}

/// Final state of a spawned import.
#[derive(Debug)]
pub struct ImportOutcome {
    pub result: IngestResult<()>,
    pub stats:  ImportStats,
    pub phase:  ImportPhase,
}

/// Consumer side of a spawned import.
pub struct ImportHandle {
    rx:     Receiver<ImportItem>,
    worker: JoinHandle<ImportOutcome>,
}

impl ImportHandle {
    /// Blocks for the next item; `None` once the producer has finished.
    pub fn recv(&self) -> Option<ImportItem> {
        self.rx.recv().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = ImportItem> + '_ {
        self.rx.iter()
    }

    /// Close the stream and wait for the producer. Items not yet received
    /// are discarded.
    pub fn join(self) -> IngestResult<ImportOutcome> {
        drop(self.rx);
        self.worker.join().map_err(|_| IngestError::WorkerPanicked)
    }
}

/// A closed stream means the consumer went away; stop producing.
fn send(tx: &Sender<ImportItem>, item: ImportItem) -> IngestResult<()> {
    tx.send(item).map_err(|_| IngestError::Cancelled)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
