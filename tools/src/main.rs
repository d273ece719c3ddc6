//! filings-runner: headless importer for regulator filings and exchange quotes.
//!
//! Usage:
//!   filings-runner --db filings.db                      # full history, newest first
//!   filings-runner --db filings.db --year 2020 --quarterly
//!   filings-runner --db filings.db --year 2020 --from-dir ./extracted
//!   filings-runner --db filings.db --quotes COTAHIST_D03052021.ZIP
//!   filings-runner --db filings.db --quotes 2021-05-03          # daily archive by date
//!   filings-runner --db filings.db --report 33.000.167/0001-01 --year 2020
//!   filings-runner --db filings.db --search petro

use anyhow::{bail, Result};
use filings_core::{
    config::IngestConfig,
    importer::{import_quotes, import_years, ImportOptions, ImportReport},
    source::{quote_archive_url, ArchiveSource, DirectorySource, ZipArchiveSource},
    store::FilingStore,
    types::FiscalYear,
};
use chrono::NaiveDate;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut cfg = match str_arg(&args, "--config") {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };
    if let Some(db) = str_arg(&args, "--db") {
        cfg.db_path = db.to_string();
    }
    if let Some(dir) = str_arg(&args, "--data-dir") {
        cfg.data_dir = dir.to_string();
    }
    if args.iter().any(|a| a == "--quarterly") {
        cfg.quarterly = true;
    }
    let year: Option<FiscalYear> = str_arg(&args, "--year").and_then(|y| y.parse().ok());

    let mut store = FilingStore::open(&cfg.db_path)?;
    store.migrate()?;

    if let Some(key) = str_arg(&args, "--report") {
        let Some(year) = year else {
            bail!("--report needs --year");
        };
        return print_report(&store, key, year);
    }

    if let Some(prefix) = str_arg(&args, "--search") {
        for company in store.search_companies(prefix)? {
            println!("{}  {}", company.cnpj, company.name);
        }
        return Ok(());
    }

    if let Some(target) = str_arg(&args, "--quotes") {
        let url = match NaiveDate::parse_from_str(target, "%Y-%m-%d") {
            Ok(date) => quote_archive_url(&cfg.quote_base_url, date),
            Err(_) => target.to_string(),
        };
        log::info!("importing quotes from {url}");
        let source = ZipArchiveSource::new(&cfg.data_dir);
        let report = import_quotes(&mut store, &source, &url)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("filings-runner");
    println!("  db:         {}", cfg.db_path);
    println!("  data_dir:   {}", cfg.data_dir);
    println!("  quarterly:  {}", cfg.quarterly);
    println!("  timeout:    {}s per year", cfg.timeout_secs);
    println!();

    let years = cfg.years(year);
    if let (Some(oldest), Some(newest)) = (years.last(), years.first()) {
        log::info!("importing {} years ({oldest}..={newest})", years.len());
    }
    let options = ImportOptions {
        quarterly: cfg.quarterly,
        deadline:  Some(cfg.timeout()),
        ..ImportOptions::default()
    };

    let results = match str_arg(&args, "--from-dir") {
        Some(dir) => run_years(&mut store, &DirectorySource::new(dir), &cfg, &years, &options),
        None => run_years(
            &mut store,
            &ZipArchiveSource::new(&cfg.data_dir),
            &cfg,
            &years,
            &options,
        ),
    };

    let failed = print_summary(&results);
    if !results.is_empty() && failed == results.len() {
        bail!("every requested year failed");
    }
    Ok(())
}

fn run_years<S: ArchiveSource + Clone + 'static>(
    store: &mut FilingStore,
    source: &S,
    cfg: &IngestConfig,
    years: &[FiscalYear],
    options: &ImportOptions,
) -> Vec<(FiscalYear, Result<ImportReport, String>)> {
    import_years(store, source, &cfg.statement_base_url, years, options)
        .into_iter()
        .map(|(year, r)| (year, r.map_err(|e| e.to_string())))
        .collect()
}

/// Returns the number of failed years.
fn print_summary(results: &[(FiscalYear, Result<ImportReport, String>)]) -> usize {
    println!("=== Import summary ===");
    let mut failed = 0;
    for (year, result) in results {
        match result {
            Ok(r) => println!(
                "  {year}: {} files ({} skipped), {} lines, {} statements, {} errors",
                r.files_seen, r.files_skipped, r.lines_decoded, r.statements_saved, r.errors
            ),
            Err(e) => {
                failed += 1;
                println!("  {year}: FAILED ({e})");
            }
        }
    }
    failed
}

fn print_report(store: &FilingStore, key: &str, year: FiscalYear) -> Result<()> {
    match store.load_statement(key, year)? {
        Some(statement) => println!("{}", serde_json::to_string_pretty(&statement)?),
        None => bail!("no statement for {key} in {year}"),
    }
    Ok(())
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
