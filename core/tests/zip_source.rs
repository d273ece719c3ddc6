//! Zip archives read from the local filesystem: extraction, filtering,
//! cleanup, and a full year imported through the archive URL layout.

use filings_core::{
    dedup::file_hash,
    importer::{import_year, ImportOptions},
    source::{statement_archive_url, statement_filters, ArchiveSource, ZipArchiveSource},
    store::FilingStore,
};
use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};
use zip::write::FileOptions;

const DRE: &str = "CNPJ_CIA;DT_REFER;VERSAO;DENOM_CIA;CD_CVM;GRUPO_DFP;MOEDA;ESCALA_MOEDA;ORDEM_EXERC;DT_INI_EXERC;DT_FIM_EXERC;CD_CONTA;DS_CONTA;VL_CONTA;ST_CONTA_FIXA
11.222.333/0001-81;2020-12-31;1;ACME S.A.;1023;DF Consolidado - Demonstração do Resultado;REAL;MIL;ÚLTIMO;2020-01-01;2020-12-31;3.01;Receita;10;S
";

fn scratch(name: &str) -> PathBuf {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = std::env::temp_dir().join(format!("filings-zip-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn write_zip(path: &Path, members: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in members {
        zip.start_file(*name, FileOptions::default()).expect("start member");
        zip.write_all(body.as_bytes()).expect("write member");
    }
    let bytes = zip.finish().expect("finish zip").into_inner();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create archive dir");
    }
    fs::write(path, bytes).expect("write archive");
}

#[test]
fn extracts_matching_members_and_cleans_up() {
    let dir = scratch("extract");
    let archive = dir.join("dfp_cia_aberta_2020.zip");
    write_zip(
        &archive,
        &[
            ("dfp_cia_aberta_DRE_con_2020.csv", DRE),
            ("dfp_cia_aberta_2020.csv", "index file"),
        ],
    );

    let source = ZipArchiveSource::new(dir.join("out"));
    let members = source
        .fetch(archive.to_str().expect("utf-8 path"), &statement_filters())
        .expect("fetch");

    assert_eq!(members.len(), 1);
    assert!(members[0].path.exists());
    assert_eq!(members[0].hash, file_hash(DRE.as_bytes()));

    assert!(source.cleanup(&members).is_empty());
    assert!(!members[0].path.exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unreadable_archive_is_a_download_failure() {
    let dir = scratch("corrupt");
    let archive = dir.join("broken.zip");
    fs::write(&archive, b"not a zip").expect("write");

    let source = ZipArchiveSource::new(dir.join("out"));
    let err = source.fetch(archive.to_str().expect("utf-8 path"), &[]).unwrap_err();
    assert!(matches!(err, filings_core::error::IngestError::DownloadFailed(_)), "got {err:?}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn failed_extraction_removes_members_already_written() {
    let dir = scratch("partial");
    let archive = dir.join("dfp_cia_aberta_2020.zip");
    write_zip(
        &archive,
        &[
            ("dfp_cia_aberta_DRE_con_2020.csv", DRE),
            ("../dfp_cia_aberta_DRE_ind_2020.csv", DRE),
        ],
    );

    let out = dir.join("out");
    let source = ZipArchiveSource::new(&out);
    let err = source
        .fetch(archive.to_str().expect("utf-8 path"), &statement_filters())
        .unwrap_err();

    assert!(matches!(err, filings_core::error::IngestError::DownloadFailed(_)), "got {err:?}");
    assert!(!out.join("dfp_cia_aberta_DRE_con_2020.csv").exists());
    assert!(!dir.join("dfp_cia_aberta_DRE_ind_2020.csv").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn imports_a_year_from_the_archive_layout() {
    let dir = scratch("year");
    let base = dir.join("mirror");
    let base = base.to_str().expect("utf-8 path");
    let url = statement_archive_url(base, 2020, false);
    write_zip(Path::new(&url), &[("dfp_cia_aberta_DRE_con_2020.csv", DRE)]);

    let mut store = FilingStore::in_memory().expect("store");
    store.migrate().expect("migrate");
    let source = ZipArchiveSource::new(dir.join("work"));

    let report = import_year(&mut store, source, base, 2020, &ImportOptions::default()).expect("import");
    assert_eq!(report.statements_saved, 1);
    assert_eq!(report.hashes_recorded, 1);
    assert!(store.load_statement("11.222.333/0001-81", 2020).expect("load").is_some());
    assert!(
        !dir.join("work").join("dfp_cia_aberta_DRE_con_2020.csv").exists(),
        "extracted files are removed after the import"
    );

    let _ = fs::remove_dir_all(&dir);
}
