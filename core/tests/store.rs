//! Persistence gateway: replace-on-first-touch, duplicate tolerance,
//! destructive migrations and company search.

use filings_core::{
    error::IngestError,
    model::{AccountGroup, CanonicalAccount, Company, FinancialStatement, Money, PeriodOrder},
    store::{FilingStore, TableSpec, MANAGED_TABLES, SCHEMA_VERSION},
};
use std::fs;

const ACME: &str = "11.222.333/0001-81";

/// `contas` with a trigger that fails any insert of account 9.99 with a
/// plain SQL error (not a constraint violation).
const CONTAS_REJECTING_999: &str = concat!(
    include_str!("../../migrations/002_contas.sql"),
    "
CREATE TRIGGER contas_reject_999 BEFORE INSERT ON contas
WHEN NEW.codigo = '9.99'
BEGIN
    SELECT json(NEW.descr);
END;
"
);

fn build_store() -> FilingStore {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = FilingStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn account(code: &str, description: &str) -> CanonicalAccount {
    CanonicalAccount {
        code:         code.into(),
        description:  description.into(),
        consolidated: true,
        group:        AccountGroup::Dre,
        period_start: "2020-01-01".into(),
        period_end:   "2020-12-31".into(),
        months:       12,
        period_order: Some(PeriodOrder::Last),
        amount:       Money::new(100.0, 1000, "R$"),
    }
}

fn statement(cnpj: &str, name: &str, codes: &[&str]) -> FinancialStatement {
    FinancialStatement {
        company:      Company { cnpj: cnpj.into(), name: name.into() },
        year:         2020,
        period_start: "2020-01-01".into(),
        accounts:     codes.iter().map(|c| account(c, &format!("Conta {c}"))).collect(),
    }
}

#[test]
fn second_write_in_a_new_run_replaces_the_first() {
    let mut store = build_store();

    let first = store.save_statement(&statement(ACME, "ACME S.A.", &["3.01", "3.02"])).expect("first save");
    assert!(!first.replaced);
    assert_eq!(first.inserted, 2);

    store.start_run();
    let second = store.save_statement(&statement(ACME, "ACME S.A.", &["3.03"])).expect("second save");
    assert!(second.replaced, "first touch of the key in the new run clears old rows");

    let st = store.load_statement(ACME, 2020).expect("load").expect("stored");
    let codes: Vec<&str> = st.accounts.iter().map(|a| a.code.as_str()).collect();
    assert_eq!(codes, vec!["3.03"], "only the second statement's accounts remain");
}

#[test]
fn writes_within_one_run_accumulate() {
    let mut store = build_store();

    let a = store.save_statement(&statement(ACME, "ACME S.A.", &["1", "1.01"])).expect("bpa");
    let b = store.save_statement(&statement(ACME, "ACME S.A.", &["3.01"])).expect("dre");

    assert_eq!(a.statement_id, b.statement_id);
    assert!(!b.replaced);
    assert_eq!(store.account_count(ACME, 2020).expect("count"), 3);
}

#[test]
fn reopened_database_replaces_on_first_write() {
    let dir = std::env::temp_dir().join(format!("filings-store-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create dir");
    let path = dir.join("filings.db");
    let path = path.to_str().expect("utf-8 path");

    let mut first = FilingStore::open(path).expect("open");
    first.migrate().expect("migrate");
    first.save_statement(&statement(ACME, "ACME S.A.", &["3.01", "3.02"])).expect("save");

    let mut store = first.reopen().expect("reopen");
    assert_eq!(store.path(), Some(path));
    drop(first);
    assert!(store.migrate_tables(&MANAGED_TABLES).expect("migrate").is_empty(), "schema is current");
    assert_eq!(store.account_count(ACME, 2020).expect("count"), 2, "data survives reopening");

    store.save_statement(&statement(ACME, "ACME S.A.", &["3.09"])).expect("save again");
    assert_eq!(store.account_count(ACME, 2020).expect("count"), 1);

    drop(store);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn duplicate_accounts_are_skipped() {
    let mut store = build_store();
    let outcome = store
        .save_statement(&statement(ACME, "ACME S.A.", &["3.01", "3.01", "3.02"]))
        .expect("duplicates are not fatal");

    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.duplicates, 1);
    assert_eq!(store.account_count(ACME, 2020).expect("count"), 2);
}

#[test]
fn balance_sheet_duplicates_without_start_date_collide() {
    let mut store = build_store();
    let mut st = statement(ACME, "ACME S.A.", &["1", "1"]);
    for acc in &mut st.accounts {
        acc.period_start.clear();
        acc.group = AccountGroup::Bpa;
    }
    let outcome = store.save_statement(&st).expect("save");
    assert_eq!(outcome.duplicates, 1);
}

#[test]
fn failed_statement_rolls_back_and_keeps_previous_rows() {
    let mut store = build_store();
    let rejecting = [TableSpec { version: SCHEMA_VERSION + 1, up: CONTAS_REJECTING_999, ..MANAGED_TABLES[1] }];
    store.migrate_tables(&rejecting).expect("install rejecting contas");

    store.save_statement(&statement(ACME, "ACME S.A.", &["3.01"])).expect("first save");
    store.start_run();

    let err = store
        .save_statement(&statement(ACME, "ACME S.A.", &["3.02", "9.99"]))
        .unwrap_err();
    assert!(matches!(err, IngestError::Store(_)), "got {err:?}");

    // The first-touch delete was rolled back with the rest of the statement.
    let st = store.load_statement(ACME, 2020).expect("load").expect("old rows kept");
    let codes: Vec<&str> = st.accounts.iter().map(|a| a.code.as_str()).collect();
    assert_eq!(codes, vec!["3.01"]);
    assert_eq!(store.companies().expect("companies").len(), 1);

    // The key was not marked cleared, so the next write still replaces.
    let retry = store.save_statement(&statement(ACME, "ACME S.A.", &["3.03"])).expect("retry");
    assert!(retry.replaced);
    assert_eq!(store.account_count(ACME, 2020).expect("count"), 1);
}

#[test]
fn load_falls_back_to_name_and_orders_by_code() {
    let mut store = build_store();
    store
        .save_statement(&statement(ACME, "ACME S.A.", &["3.01", "1", "2.01"]))
        .expect("save");

    let st = store.load_statement("ACME S.A.", 2020).expect("load").expect("found by name");
    assert_eq!(st.company.cnpj, ACME);
    let codes: Vec<&str> = st.accounts.iter().map(|a| a.code.as_str()).collect();
    assert_eq!(codes, vec!["1", "2.01", "3.01"]);
    assert_eq!(st.accounts[0].group, AccountGroup::Dre);
    assert_eq!(st.accounts[0].amount.total(), 100_000.0);
    assert_eq!(st.accounts[0].period_order, None);

    assert!(store.load_statement(ACME, 2019).expect("load").is_none());
    assert!(store.load_statement("NOBODY", 2020).expect("load").is_none());
}

#[test]
fn version_mismatch_recreates_table_empty() {
    let mut store = build_store();
    store.save_statement(&statement(ACME, "ACME S.A.", &["3.01"])).expect("save");
    assert_eq!(store.table_version("contas").expect("version"), Some(SCHEMA_VERSION));

    let bumped = [TableSpec { version: SCHEMA_VERSION + 1, ..MANAGED_TABLES[1] }];
    let recreated = store.migrate_tables(&bumped).expect("migrate");

    assert_eq!(recreated, vec!["contas"]);
    assert_eq!(store.table_version("contas").expect("version"), Some(SCHEMA_VERSION + 1));
    assert_eq!(store.account_count(ACME, 2020).expect("count"), 0, "no data carried over");
    assert_eq!(store.companies().expect("companies").len(), 1, "other tables untouched");
}

#[test]
fn search_ignores_accents_and_case() {
    let mut store = build_store();
    store.save_statement(&statement("33.000.167/0001-01", "PETRÓLEO BRASILEIRO S.A. - PETROBRAS", &["1"])).expect("save");
    store.save_statement(&statement("10.629.105/0001-68", "PETRO RIO S.A.", &["1"])).expect("save");
    store.save_statement(&statement("33.592.510/0001-54", "VALE S.A.", &["1"])).expect("save");

    let names = |v: Vec<Company>| v.into_iter().map(|c| c.name).collect::<Vec<_>>();

    assert_eq!(
        names(store.search_companies("petró").expect("search")),
        vec!["PETRO RIO S.A.", "PETRÓLEO BRASILEIRO S.A. - PETROBRAS"]
    );
    assert_eq!(names(store.search_companies("petrol").expect("search")).len(), 1);
    assert_eq!(names(store.search_companies("Vale").expect("search")), vec!["VALE S.A."]);
    assert!(store.search_companies("xyz").expect("search").is_empty());

    // The cache is refreshed when a new company arrives.
    store.save_statement(&statement("34.274.233/0001-02", "Petrobras Distribuidora", &["1"])).expect("save");
    assert_eq!(store.search_companies("PETRO").expect("search").len(), 3);
    assert_eq!(store.companies().expect("companies").len(), 4);
}

#[test]
fn hashes_are_recorded_once() {
    let store = build_store();
    assert!(store.save_hash("abc").expect("save"));
    assert!(!store.save_hash("abc").expect("save again"));
    assert!(store.save_hash("def").expect("save"));
    assert_eq!(store.hashes().expect("hashes"), vec!["abc".to_string(), "def".to_string()]);
}
