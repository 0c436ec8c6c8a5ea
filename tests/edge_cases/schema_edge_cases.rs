//! Edge case tests for schemas, configuration and connections

use crate::common::{sample_data, CliTestRunner};
use batchdiff::BatchDiffError;
use std::fs;

#[test]
fn test_missing_source_table() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().target_sql(sample_data::simple_users()).unwrap();
    runner.fixture().source_sql("CREATE TABLE other (id INTEGER);").unwrap();

    let error = runner.expect_failure(&["--tables", "users"]);
    assert!(error.is_setup_error());
    assert_eq!(error.to_string(), "[users] Table not found in source");
}

#[test]
fn test_missing_target_table() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().source_sql(sample_data::simple_users()).unwrap();
    runner.fixture().target_sql("CREATE TABLE other (id INTEGER);").unwrap();

    let error = runner.expect_failure(&["--tables", "users"]);
    assert!(error.to_string().contains("Table users not found in target"));
}

#[test]
fn test_missing_target_column() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().source_sql(&sample_data::users_table(3)).unwrap();
    runner.fixture().target_sql(sample_data::simple_users()).unwrap();

    let error = runner.expect_failure(&["--tables", "users"]);
    assert_eq!(error.to_string(), "[users] Columns missing in target: score");
}

#[test]
fn test_extra_target_column_is_ignored() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().source_sql(sample_data::simple_users()).unwrap();
    runner
        .fixture()
        .target_sql(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR, synced BOOLEAN DEFAULT true);
             INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b');",
        )
        .unwrap();

    runner.expect_identical(&["--tables", "users"]);
}

#[test]
fn test_nullable_key_needs_opt_in() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE loose (id INTEGER, name VARCHAR);
                 INSERT INTO loose VALUES (1, 'a'), (2, 'b');";
    runner.fixture().both_sql(table).unwrap();

    let error = runner.expect_failure(&["--tables", "loose"]);
    assert!(matches!(error, BatchDiffError::Schema { .. }));
    assert!(error.to_string().contains("nullable"));

    runner.expect_identical(&["--tables", "loose", "--no-null-check"]);
}

#[test]
fn test_missing_key_column() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().both_sql(sample_data::simple_users()).unwrap();

    let error = runner.expect_failure(&["--tables", "users", "--key", "uuid", "--strategy", "by_id"]);
    assert_eq!(error.to_string(), "[users] Key column uuid not found in source");
}

#[test]
fn test_schema_error_in_second_table_runs_no_batch() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().both_sql(sample_data::simple_users()).unwrap();
    let sql_log = runner.fixture().path_arg("statements.sql");

    let error = runner.expect_failure(&[
        "--tables", "users,ghosts",
        "--record-sql-file", &sql_log,
    ]);
    assert!(error.is_setup_error());

    let recorded = runner.fixture().read_file("statements.sql").unwrap();
    assert!(!recorded.contains("FROM users WHERE"));
}

#[test]
fn test_non_integer_bounds_for_by_id() {
    let runner = CliTestRunner::new().unwrap();
    runner
        .fixture()
        .both_sql(
            "CREATE TABLE codes (id VARCHAR PRIMARY KEY);
             INSERT INTO codes VALUES ('a'), ('b');",
        )
        .unwrap();

    let error = runner.expect_failure(&["--tables", "codes", "--strategy", "by_id"]);
    assert!(error.to_string().contains("Invalid integer key bound"));
}

#[test]
fn test_broken_diff_program_is_fatal() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().both_sql(sample_data::simple_users()).unwrap();

    let error = runner.expect_failure(&[
        "--tables", "users",
        "--diff-command", "/nonexistent/diff-program",
    ]);
    assert!(matches!(error, BatchDiffError::Diff { .. }));
}

#[test]
fn test_invalid_extraction_filter_is_fatal() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().both_sql(sample_data::simple_users()).unwrap();

    let error = runner.expect_failure(&["--tables", "users", "--where-target", "no_such_column = 1"]);
    assert!(matches!(error, BatchDiffError::Query { .. }));
}

#[test]
fn test_same_database_for_both_sides() {
    let runner = CliTestRunner::new().unwrap();
    runner
        .fixture()
        .source_sql(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR);
             INSERT INTO users VALUES (1, 'a'), (2, 'b');
             CREATE TABLE users_backup AS SELECT * FROM users;
             UPDATE users_backup SET name = 'z' WHERE id = 2;",
        )
        .unwrap();
    let source = runner.fixture().source_path().to_string_lossy().into_owned();

    use batchdiff::cli::Cli;
    use batchdiff::commands::execute;
    use clap::Parser;

    let cli = Cli::try_parse_from([
        "batchdiff",
        "--src", source.as_str(),
        "--target", source.as_str(),
        "--tables", "users",
        "--table-mapping", "<TABLE>_backup",
        "--no-null-check",
        "--no-progress",
    ])
    .unwrap();
    let summary = execute(&cli).unwrap();
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(summary.report.discrepancies, 1);
}

#[test]
fn test_init_statements_with_env_substitution() {
    let runner = CliTestRunner::new().unwrap();
    let archive = runner.fixture().root().join("archive.duckdb");
    {
        let connection = duckdb::Connection::open(&archive).unwrap();
        connection.execute_batch(sample_data::simple_users()).unwrap();
    }
    runner.fixture().source_sql(sample_data::simple_users()).unwrap();
    runner.fixture().target_sql("SELECT 1;").unwrap();

    std::env::set_var("BATCHDIFF_TEST_ARCHIVE", archive.to_string_lossy().as_ref());
    runner.expect_identical(&[
        "--tables", "users",
        "--target-init", "ATTACH '{BATCHDIFF_TEST_ARCHIVE}' AS archive (READ_ONLY); USE archive;",
    ]);

    assert!(fs::metadata(&archive).is_ok());
}

#[test]
fn test_unknown_env_var_in_init_is_rejected() {
    let runner = CliTestRunner::new().unwrap();
    runner.fixture().both_sql(sample_data::simple_users()).unwrap();

    let error = runner.expect_failure(&[
        "--tables", "users",
        "--src-init", "SET threads = {BATCHDIFF_TEST_NOT_SET_ANYWHERE}",
    ]);
    assert!(error.is_setup_error());
}
