//! Edge case tests for data-related scenarios

use crate::common::assertions::assert_result_lines;
use crate::common::CliTestRunner;

#[test]
fn test_null_differs_from_empty_string() {
    let runner = CliTestRunner::new().unwrap();
    runner
        .fixture()
        .source_sql(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body VARCHAR);
             INSERT INTO notes VALUES (1, NULL), (2, '');",
        )
        .unwrap();
    runner
        .fixture()
        .target_sql(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body VARCHAR);
             INSERT INTO notes VALUES (1, ''), (2, '');",
        )
        .unwrap();
    let results = runner.fixture().path_arg("<TABLE>.txt");

    runner.expect_differences(&["--tables", "notes", "--extract-result-to-file", &results]);
    assert_result_lines(&runner.fixture().read_file("notes.txt").unwrap(), &["changed: 1"]);
}

#[test]
fn test_literal_backslash_n_is_not_null() {
    let runner = CliTestRunner::new().unwrap();
    runner
        .fixture()
        .source_sql(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body VARCHAR);
             INSERT INTO notes VALUES (1, NULL);",
        )
        .unwrap();
    runner
        .fixture()
        .target_sql(
            r"CREATE TABLE notes (id INTEGER PRIMARY KEY, body VARCHAR);
              INSERT INTO notes VALUES (1, '\N');",
        )
        .unwrap();

    runner.expect_differences(&["--tables", "notes"]);
}

#[test]
fn test_embedded_tabs_and_newlines() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE notes (id INTEGER PRIMARY KEY, body VARCHAR);
                 INSERT INTO notes VALUES (1, concat('a', chr(9), 'b')), (2, concat('line', chr(10), 'break'));";
    runner.fixture().both_sql(table).unwrap();

    let summary = runner.expect_identical(&["--tables", "notes"]);
    assert_eq!(summary.stats.lines, 2);
}

#[test]
fn test_tab_inside_value_does_not_shift_columns() {
    let runner = CliTestRunner::new().unwrap();
    runner
        .fixture()
        .source_sql(
            "CREATE TABLE pairs (id INTEGER PRIMARY KEY, a VARCHAR, b VARCHAR);
             INSERT INTO pairs VALUES (1, concat('x', chr(9), 'y'), 'z');",
        )
        .unwrap();
    runner
        .fixture()
        .target_sql(
            "CREATE TABLE pairs (id INTEGER PRIMARY KEY, a VARCHAR, b VARCHAR);
             INSERT INTO pairs VALUES (1, 'x', concat('y', chr(9), 'z'));",
        )
        .unwrap();

    runner.expect_differences(&["--tables", "pairs"]);
}

#[test]
fn test_unicode_values() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE cities (id INTEGER PRIMARY KEY, name VARCHAR);
                 INSERT INTO cities VALUES (1, 'Café'), (2, '北京'), (3, '🚀');";
    runner.fixture().both_sql(table).unwrap();

    runner.expect_identical(&["--tables", "cities"]);
}

#[test]
fn test_various_column_types() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE mixed (
                    id BIGINT PRIMARY KEY,
                    flag BOOLEAN,
                    price DECIMAL(10, 2),
                    ratio DOUBLE,
                    born DATE,
                    seen TIMESTAMP,
                    tod TIME,
                    raw BLOB
                 );
                 INSERT INTO mixed VALUES
                    (1, true, 19.99, 0.25, DATE '2020-02-29', TIMESTAMP '2024-01-01 10:00:00.123456', TIME '12:30:00', '\\xAA'::BLOB),
                    (2, NULL, NULL, NULL, NULL, NULL, NULL, NULL);";
    runner.fixture().both_sql(table).unwrap();

    runner.expect_identical(&["--tables", "mixed"]);

    runner
        .fixture()
        .target_sql("UPDATE mixed SET seen = TIMESTAMP '2024-01-01 10:00:00.123457' WHERE id = 1;")
        .unwrap();
    runner.expect_differences(&["--tables", "mixed"]);
}

#[test]
fn test_text_keys() {
    let runner = CliTestRunner::new().unwrap();
    runner
        .fixture()
        .source_sql(
            "CREATE TABLE codes (code VARCHAR PRIMARY KEY, label VARCHAR);
             INSERT INTO codes VALUES ('a', '1'), ('b', '2'), ('c', '3');",
        )
        .unwrap();
    runner
        .fixture()
        .target_sql(
            "CREATE TABLE codes (code VARCHAR PRIMARY KEY, label VARCHAR);
             INSERT INTO codes VALUES ('a', '1'), ('b', 'x'), ('d', '4');",
        )
        .unwrap();
    let results = runner.fixture().path_arg("<TABLE>.txt");

    runner.expect_differences(&[
        "--tables", "codes",
        "--key", "code",
        "--order-by", "code",
        "--recheck-for-errors", "0",
        "--extract-result-to-file", &results,
    ]);
    assert_result_lines(
        &runner.fixture().read_file("codes.txt").unwrap(),
        &["changed: b", "only_in_source: c", "only_in_target: d"],
    );
}

#[test]
fn test_integer_arrays() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE test1 (id INTEGER PRIMARY KEY, val INTEGER[]);
                 INSERT INTO test1 VALUES (1, [1, 2, 3]), (2, []);";
    runner.fixture().both_sql(table).unwrap();

    runner.expect_identical(&["--tables", "test1"]);

    runner
        .fixture()
        .source_sql("UPDATE test1 SET val = [1] WHERE id = 1;")
        .unwrap();
    let results = runner.fixture().path_arg("<TABLE>.txt");
    runner.expect_differences(&["--tables", "test1", "--extract-result-to-file", &results]);
    assert_result_lines(&runner.fixture().read_file("test1.txt").unwrap(), &["changed: 1"]);
}

#[test]
fn test_text_arrays() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE test1 (id INTEGER PRIMARY KEY, val VARCHAR[]);
                 INSERT INTO test1 VALUES (1, ['a', 'b']), (2, []);";
    runner.fixture().both_sql(table).unwrap();

    runner.expect_identical(&["--tables", "test1"]);

    runner
        .fixture()
        .source_sql("UPDATE test1 SET val = ['1'] WHERE id = 1;")
        .unwrap();
    runner.expect_differences(&["--tables", "test1"]);
}

#[test]
fn test_text_arrays_with_non_printable_chars() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE test1 (id INTEGER PRIMARY KEY, val VARCHAR[]);
                 INSERT INTO test1 VALUES
                    (1, [concat('line', chr(10), 'break', chr(9), 'tab'), '---\na: 12\n']),
                    (2, []);";
    runner.fixture().both_sql(table).unwrap();

    let summary = runner.expect_identical(&["--tables", "test1"]);
    assert_eq!(summary.stats.lines, 2);

    runner
        .fixture()
        .source_sql("UPDATE test1 SET val = [concat('other', chr(13), 'file')] WHERE id = 1;")
        .unwrap();
    runner.expect_differences(&["--tables", "test1"]);
}

#[test]
fn test_one_changed_array_element_flags_one_row() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE tagged (id INTEGER PRIMARY KEY, val INTEGER[]);";
    runner
        .fixture()
        .source_sql(&format!(
            "{} INSERT INTO tagged VALUES (1, [1, 2, 3]), (2, []), (3, [7]);",
            table
        ))
        .unwrap();
    runner
        .fixture()
        .target_sql(&format!(
            "{} INSERT INTO tagged VALUES (1, [1, 2, 3]), (2, []), (3, [8]);",
            table
        ))
        .unwrap();
    let results = runner.fixture().path_arg("<TABLE>.txt");

    runner.expect_differences(&["--tables", "tagged", "--extract-result-to-file", &results]);
    assert_result_lines(&runner.fixture().read_file("tagged.txt").unwrap(), &["changed: 3"]);
}

#[test]
fn test_struct_and_map_columns() {
    let runner = CliTestRunner::new().unwrap();
    let table = "CREATE TABLE shapes (id INTEGER PRIMARY KEY, point STRUCT(x INTEGER, y INTEGER), attrs MAP(VARCHAR, INTEGER));
                 INSERT INTO shapes VALUES
                    (1, {'x': 1, 'y': 2}, MAP {'a': 1}),
                    (2, {'x': 3, 'y': 4}, MAP {'b': 2});";
    runner.fixture().both_sql(table).unwrap();

    runner.expect_identical(&["--tables", "shapes"]);

    runner
        .fixture()
        .target_sql("UPDATE shapes SET point = {'x': 3, 'y': 5} WHERE id = 2;")
        .unwrap();
    let results = runner.fixture().path_arg("<TABLE>.txt");
    runner.expect_differences(&["--tables", "shapes", "--extract-result-to-file", &results]);
    assert_result_lines(&runner.fixture().read_file("shapes.txt").unwrap(), &["changed: 2"]);
}
