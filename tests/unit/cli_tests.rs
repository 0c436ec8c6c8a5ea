//! Unit tests for CLI argument parsing and validation

use batchdiff::cli::Cli;
use batchdiff::config::CompareOptions;
use batchdiff::StrategyKind;
use clap::Parser;

fn parse(extra: &[&str]) -> Cli {
    let mut args = vec!["batchdiff", "--src", "a.duckdb", "--target", "b.duckdb"];
    args.extend(extra);
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn test_cli_defaults() {
    let cli = parse(&["--tables", "users"]);
    assert_eq!(cli.src, "a.duckdb");
    assert_eq!(cli.target, "b.duckdb");
    assert_eq!(cli.tables, "users");
    assert_eq!(cli.table_mapping, "<TABLE>");
    assert_eq!(cli.strategy, "one_shot");
    assert_eq!(cli.key, "id");
    assert_eq!(cli.order_by, "id");
    assert_eq!(cli.parallel, 4);
    assert!(cli.batch_size.is_none());
    assert!(cli.recheck_for_errors.is_none());
    assert!(!cli.no_null_check);
    assert!(!cli.json);
    assert!(!cli.verbose);
}

#[test]
fn test_cli_all_options() {
    let cli = parse(&[
        "--tables", "users,orders",
        "--table-mapping", "backup.<TABLE>",
        "--strategy", "by_id",
        "--batch-size", "5000",
        "--key", "user_id",
        "--key-start", "10",
        "--key-stop", "900",
        "--order-by", "user_id",
        "--columns", "user_id,name",
        "--where-source", "deleted_at IS NULL",
        "--where-target", "active",
        "--no-null-check",
        "--recheck-for-errors", "30",
        "--parallel", "8",
        "--diff-command", "/usr/bin/diff",
        "--extract-result-to-file", "/tmp/<TABLE>.txt",
        "--record-sql-file", "/tmp/sql.log",
        "--json",
        "-v",
    ]);

    assert_eq!(cli.batch_size, Some(5000));
    assert_eq!(cli.key_start.as_deref(), Some("10"));
    assert_eq!(cli.recheck_for_errors, Some(30));
    assert_eq!(cli.parallel, 8);
    assert!(cli.no_null_check);
    assert!(cli.json);
    assert!(cli.verbose);

    let options = CompareOptions::from_cli(&cli).unwrap();
    assert_eq!(options.tables, vec!["users", "orders"]);
    assert_eq!(options.strategy, StrategyKind::ById);
    assert_eq!(options.target_table("orders"), "backup.orders");
    assert_eq!(options.columns, Some(vec!["user_id".to_string(), "name".to_string()]));
    assert_eq!(options.where_source.as_deref(), Some("deleted_at IS NULL"));
    assert_eq!(options.workers, 8);
}

#[test]
fn test_cli_timestamp_options() {
    let cli = parse(&[
        "--tables", "events",
        "--strategy", "by_timestamp",
        "--key", "created_at",
        "--key-start", "now - 86400",
        "--limit-to-the-past-minutes", "15",
    ]);
    let options = CompareOptions::from_cli(&cli).unwrap();
    assert_eq!(options.strategy, StrategyKind::ByTimestamp);
    assert_eq!(options.key_start.as_deref(), Some("now - 86400"));
    assert_eq!(options.limit_to_the_past_minutes, Some(15));
}

#[test]
fn test_cli_requires_connections_and_tables() {
    assert!(Cli::try_parse_from(["batchdiff", "--tables", "users"]).is_err());
    assert!(Cli::try_parse_from(["batchdiff", "--src", "a", "--target", "b"]).is_err());
}

#[test]
fn test_cli_rejects_zero_batch_size() {
    let result = Cli::try_parse_from([
        "batchdiff", "--src", "a", "--target", "b", "--tables", "t", "--batch-size", "0",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_cli_rejects_unknown_strategy_at_startup() {
    let cli = parse(&["--tables", "users", "--strategy", "by_hash"]);
    let err = CompareOptions::from_cli(&cli).unwrap_err();
    assert!(err.to_string().contains("Unknown strategy: by_hash"));
}
