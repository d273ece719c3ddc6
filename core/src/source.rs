//! Download/decompress collaborator.
//!
//! An `ArchiveSource` turns an archive URL into local member files, each
//! tagged with its content hash. The orchestrator only depends on the trait.

use crate::{
    dedup::file_hash,
    error::{IngestError, IngestResult},
    types::FileHash,
};
use chrono::NaiveDate;
use std::{
    fs,
    io::{Cursor, Read},
    path::{Path, PathBuf},
    time::Duration,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(600);

pub const DEFAULT_STATEMENT_BASE_URL: &str = "https://dados.cvm.gov.br/dados/CIA_ABERTA/DOC";
pub const DEFAULT_QUOTE_BASE_URL: &str = "https://bvmf.bmfbovespa.com.br/InstDados/SerHist";

/// One extracted file of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub path: PathBuf,
    pub hash: FileHash,
}

pub trait ArchiveSource: Send {
    /// Fetch `url` and return the members whose name contains any of
    /// `filters` (case-insensitive). An empty filter list keeps everything.
    fn fetch(&self, url: &str, filters: &[String]) -> IngestResult<Vec<ArchiveMember>>;

    /// Remove fetched files. Returns the paths that could not be removed.
    fn cleanup(&self, members: &[ArchiveMember]) -> Vec<PathBuf>;
}

/// Annual (DFP) or quarterly (ITR) statement archive for `year`.
pub fn statement_archive_url(base: &str, year: i32, quarterly: bool) -> String {
    let kind = if quarterly { "ITR" } else { "DFP" };
    format!(
        "{}/{kind}/DADOS/{}_cia_aberta_{year}.zip",
        base.trim_end_matches('/'),
        kind.to_lowercase()
    )
}

/// Daily quote archive for `date`.
pub fn quote_archive_url(base: &str, date: NaiveDate) -> String {
    format!("{}/COTAHIST_D{}.ZIP", base.trim_end_matches('/'), date.format("%d%m%Y"))
}

/// Member-name fragments of the statement files we import.
pub fn statement_filters() -> Vec<String> {
    let kinds = ["BPA", "BPP", "DFC_MD", "DFC_MI", "DRE", "DVA"];
    let mut filters = Vec::with_capacity(kinds.len() * 4);
    for kind in kinds {
        for prefix in ["dfp", "itr"] {
            filters.push(format!("{prefix}_cia_aberta_{kind}_con"));
            filters.push(format!("{prefix}_cia_aberta_{kind}_ind"));
        }
    }
    filters
}

pub fn matches_filter(name: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let name = name.to_lowercase();
    filters.iter().any(|f| name.contains(&f.to_lowercase()))
}

fn download_failed(what: &str, e: impl std::fmt::Display) -> IngestError {
    IngestError::DownloadFailed(format!("{what}: {e}"))
}

fn remove_all(members: &[ArchiveMember]) -> Vec<PathBuf> {
    members
        .iter()
        .filter(|m| fs::remove_file(&m.path).is_err())
        .map(|m| m.path.clone())
        .collect()
}

// ── Zip archives ───────────────────────────────────────────────

/// Downloads (or reads) a zip archive and extracts matching members into
/// `data_dir`.
#[derive(Debug, Clone)]
pub struct ZipArchiveSource {
    pub data_dir: PathBuf,
}

impl ZipArchiveSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn read_archive(&self, url: &str) -> IngestResult<Vec<u8>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            log::info!("downloading {url}");
            let client = reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .map_err(|e| download_failed(url, e))?;
            let body = client
                .get(url)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes())
                .map_err(|e| download_failed(url, e))?;
            Ok(body.to_vec())
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            fs::read(path).map_err(|e| download_failed(path, e))
        }
    }

    fn extract(
        &self,
        archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>,
        url: &str,
        filters: &[String],
        members: &mut Vec<ArchiveMember>,
    ) -> IngestResult<()> {
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| download_failed(url, e))?;
            if entry.is_dir() || !matches_filter(entry.name(), filters) {
                continue;
            }
            // Reject entries that would land outside data_dir.
            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                return Err(IngestError::DownloadFailed(format!(
                    "{}: illegal file path",
                    entry.name()
                )));
            };

            // The declared size is not trusted for preallocation.
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| download_failed(entry.name(), e))?;

            let path = self.data_dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| download_failed("data dir", e))?;
            }
            fs::write(&path, &content).map_err(|e| download_failed(&path.display().to_string(), e))?;

            log::debug!("extracted {}", path.display());
            members.push(ArchiveMember { path, hash: file_hash(&content) });
        }
        Ok(())
    }
}

impl ArchiveSource for ZipArchiveSource {
    fn fetch(&self, url: &str, filters: &[String]) -> IngestResult<Vec<ArchiveMember>> {
        let bytes = self.read_archive(url)?;
        fs::create_dir_all(&self.data_dir).map_err(|e| download_failed("data dir", e))?;

        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| download_failed(url, e))?;
        let mut members = Vec::new();

        // A half-extracted archive leaves nothing behind.
        if let Err(e) = self.extract(&mut archive, url, filters, &mut members) {
            let leftover = remove_all(&members);
            if !leftover.is_empty() {
                log::warn!("could not remove {} partially extracted files", leftover.len());
            }
            return Err(e);
        }
        Ok(members)
    }

    fn cleanup(&self, members: &[ArchiveMember]) -> Vec<PathBuf> {
        remove_all(members)
    }
}

// ── Pre-extracted directories ──────────────────────────────────

/// Serves files already sitting in a directory. The URL is ignored and the
/// files are never deleted.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    pub dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArchiveSource for DirectorySource {
    fn fetch(&self, url: &str, filters: &[String]) -> IngestResult<Vec<ArchiveMember>> {
        log::debug!("serving {} from {}", url, self.dir.display());
        let dir = fs::read_dir(&self.dir)
            .map_err(|e| download_failed(&self.dir.display().to_string(), e))?;

        let mut paths: Vec<PathBuf> = dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| matches_filter(n, filters))
            })
            .collect();
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let content =
                    fs::read(&path).map_err(|e| download_failed(&path.display().to_string(), e))?;
                Ok(ArchiveMember { hash: file_hash(&content), path })
            })
            .collect()
    }

    fn cleanup(&self, _members: &[ArchiveMember]) -> Vec<PathBuf> {
        Vec::new()
    }
}
