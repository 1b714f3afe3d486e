use std::path::Path;

use rusqlite::Connection;
use rusty_quality::report::{ReportSink, TextReport, write_csv};
use rusty_quality::{
    BatchOptions, ConfigError, RuleSource, Status, StoreLocation, load_registry, run_batch,
};

fn build_store(dir: &Path) -> StoreLocation {
    let path = dir.join("warehouse.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gdp (year INTEGER, gdp REAL);
         INSERT INTO gdp VALUES (2000, 10.0), (2001, 11.0), (2002, 12.0), (2003, 13.0);
         CREATE TABLE co2 (year INTEGER, value REAL);
         INSERT INTO co2 VALUES (2000, 1.0), (2001, 2.0), (2003, 3.0), (2004, 4.0);
         CREATE TABLE prices (year INTEGER, value REAL);
         INSERT INTO prices VALUES (2001, 1.0), (2001, 2.0), (2003, 2.0), (2003, 5.0);",
    )
    .unwrap();
    StoreLocation::from_path(&path).unwrap()
}

#[test]
fn sqlite_store_with_rule_file() {
    let dir = tempfile::tempdir().unwrap();
    let location = build_store(dir.path());
    let rules = dir.path().join("rules.yaml");
    std::fs::write(&rules, "gdp:\n  value_columns: [gdp]\n").unwrap();

    let registry = load_registry(Some(&RuleSource::File(rules))).unwrap();
    let batch = run_batch(&location, &registry, &BatchOptions::default()).unwrap();

    let names: Vec<_> = batch.results.iter().map(|r| r.dataset.as_str()).collect();
    assert_eq!(names, vec!["co2", "gdp", "prices"]);

    let co2 = &batch.results[0];
    assert_eq!(co2.status, Status::Ok);
    assert_eq!(co2.warnings.len(), 1);
    assert!(co2.warnings[0].contains("2002"));

    let gdp = &batch.results[1];
    assert_eq!(gdp.status, Status::Ok);
    assert!(gdp.warnings.is_empty());

    let prices = &batch.results[2];
    assert_eq!(prices.status, Status::Error);
    assert_eq!(prices.error.matches("2001").count(), 1);
    assert_eq!(prices.error.matches("2003").count(), 1);

    let mut csv = Vec::new();
    write_csv(&batch.results, &mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 4);

    let mut report = TextReport::new(Vec::new());
    report.render(&batch.results).unwrap();
    let text = String::from_utf8(report.into_inner()).unwrap();
    assert_eq!(text.split('\x0c').count(), 3);
}

#[test]
fn directory_store_isolates_a_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "year,value\n2000,1\n2001,2\n2002,3\n").unwrap();
    std::fs::write(dir.path().join("b.json"), "[{\"year\": 2000,").unwrap();
    std::fs::write(dir.path().join("c.csv"), "year,value\n2000,1\n2001,\n2002,3\n").unwrap();

    let location = StoreLocation::from_path(dir.path()).unwrap();
    let batch = run_batch(
        &location,
        &load_registry(None).unwrap(),
        &BatchOptions {
            workers: 2,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(batch.results.len(), 3);
    assert_eq!(batch.results[0].status, Status::Ok);
    assert_eq!(batch.results[1].status, Status::Error);
    assert!(batch.results[1].error.contains("load failed"));
    assert_eq!(batch.results[2].status, Status::Ok);
    assert_eq!(batch.results[2].warnings, vec!["[c] missing values: value=1".to_string()]);
    assert_eq!(batch.error_count(), 1);
}

#[test]
fn files_sharing_a_stem_are_each_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("gdp.csv"), "year,value\n2000,1\n2001,2\n").unwrap();
    std::fs::write(dir.path().join("gdp.json"), "[{\"year\": 2000,").unwrap();

    let location = StoreLocation::from_path(dir.path()).unwrap();
    let batch = run_batch(&location, &load_registry(None).unwrap(), &BatchOptions::default()).unwrap();

    let names: Vec<_> = batch.results.iter().map(|r| r.dataset.as_str()).collect();
    assert_eq!(names, vec!["gdp.csv", "gdp.json"]);
    assert_eq!(batch.results[0].status, Status::Ok);
    assert_eq!(batch.results[1].status, Status::Error);
    assert!(batch.results[1].error.starts_with("[gdp.json] load failed"));
}

#[test]
fn malformed_rules_abort_before_any_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let rules = dir.path().join("rules.yml");
    std::fs::write(&rules, "gdp:\n  value_columns: [gdp]\n  colour: blue\n").unwrap();

    let err = load_registry(Some(&RuleSource::File(rules))).unwrap_err();
    assert!(matches!(err, ConfigError::Yaml(_)));
}
