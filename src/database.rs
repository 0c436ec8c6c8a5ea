//! Query backend: column introspection and ordered line extraction
//!
//! Each side of a comparison is a DuckDB database. Init statements can attach
//! any database DuckDB knows how to read (PostgreSQL, MySQL, SQLite...) so the
//! comparison itself only ever talks SQL to DuckDB.

use crate::error::{BatchDiffError, Result};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use indexmap::IndexMap;
use std::env;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Marker used for SQL NULL in extracted lines
pub const NULL_MARKER: &str = "\\N";

/// Column metadata needed to validate a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub nullable: bool,
    /// Type name as reported by `information_schema.columns`
    pub data_type: String,
}

impl ColumnInfo {
    /// Nested and enumerated values have no per-row scalar reading in the
    /// driver and are extracted as their VARCHAR cast instead
    pub fn needs_text_cast(&self) -> bool {
        let data_type = self.data_type.trim().to_uppercase();
        data_type.ends_with(']')
            || ["STRUCT", "MAP", "UNION", "ENUM", "UUID", "INTERVAL", "BIT"]
                .iter()
                .any(|prefix| data_type.starts_with(prefix))
    }
}

/// Capability set the comparison core needs from a database
pub trait Database: Send + Sync {
    /// Label used in logs ("source", "target")
    fn label(&self) -> &str;

    /// Columns of `table` in ordinal order, keyed by name. Empty when the
    /// table does not exist.
    fn columns(&self, table: &str) -> Result<IndexMap<String, ColumnInfo>>;

    /// Run `sql` and render every row as one tab-separated line
    fn query_lines(&self, sql: &str) -> Result<Vec<String>>;

    /// Run `sql` and return the first column of the first row, `None` for
    /// NULL or no rows
    fn query_scalar(&self, sql: &str) -> Result<Option<String>>;
}

/// Appends every executed statement to a file, one per line
#[derive(Debug)]
pub struct SqlRecorder {
    file: Mutex<File>,
}

impl SqlRecorder {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn record(&self, sql: &str) -> Result<()> {
        let line = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// [`Database`] backed by a DuckDB instance
pub struct DuckDbDatabase {
    label: String,
    connection: Mutex<Connection>,
    session_statements: Vec<String>,
    recorder: Option<Arc<SqlRecorder>>,
}

impl DuckDbDatabase {
    /// Open `path` (`:memory:` for an in-memory database) and run the init
    /// statements, with `{ENV_VAR}` placeholders substituted.
    pub fn open(label: impl Into<String>, path: &str, init: Option<&str>) -> Result<Self> {
        let label = label.into();
        let connection = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path).map_err(|e| {
                BatchDiffError::query(format!("Failed to open {} database '{}': {}", label, path, e))
            })?
        };

        let mut session_statements = Vec::new();
        if let Some(init) = init {
            let init = substitute_env_vars(init)?;
            connection.execute_batch(&init).map_err(|e| {
                BatchDiffError::query(format!("Init statements failed on {}: {}", label, e))
            })?;
            session_statements = session_scoped(&init);
        }

        log::debug!("Opened {} database: {}", label, path);
        Ok(Self {
            label,
            connection: Mutex::new(connection),
            session_statements,
            recorder: None,
        })
    }

    /// Wrap an existing connection
    pub fn from_connection(label: impl Into<String>, connection: Connection) -> Self {
        Self {
            label: label.into(),
            connection: Mutex::new(connection),
            session_statements: Vec::new(),
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<SqlRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// A second handle on the same DuckDB instance, for when both sides live
    /// in one database file. `init` runs on the new handle only.
    pub fn share(&self, label: impl Into<String>, init: Option<&str>) -> Result<Self> {
        let label = label.into();
        let connection = self.connection()?;
        let mut session_statements = self.session_statements.clone();
        if let Some(init) = init {
            let init = substitute_env_vars(init)?;
            connection.execute_batch(&init).map_err(|e| {
                BatchDiffError::query(format!("Init statements failed on {}: {}", label, e))
            })?;
            session_statements.extend(session_scoped(&init));
        }
        Ok(Self {
            label,
            connection: Mutex::new(connection),
            session_statements,
            recorder: self.recorder.clone(),
        })
    }

    /// Fresh connection on the shared instance so queries run concurrently
    fn connection(&self) -> Result<Connection> {
        let base = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let connection = base.try_clone()?;
        for statement in &self.session_statements {
            connection.execute_batch(statement)?;
        }
        Ok(connection)
    }

    fn record(&self, sql: &str) -> Result<()> {
        log::debug!("Running toward {}: {}", self.label, sql);
        match &self.recorder {
            Some(recorder) => recorder.record(sql),
            None => Ok(()),
        }
    }

    fn query_error(&self, sql: &str, error: duckdb::Error) -> BatchDiffError {
        BatchDiffError::query(format!("{} query '{}' failed: {}", self.label, sql, error))
    }
}

impl Database for DuckDbDatabase {
    fn label(&self) -> &str {
        &self.label
    }

    fn columns(&self, table: &str) -> Result<IndexMap<String, ColumnInfo>> {
        let filter = match table.rsplit_once('.') {
            Some((schema, name)) => format!(
                "table_schema = {} AND table_name = {}",
                quote_literal(schema),
                quote_literal(name)
            ),
            None => format!("table_name = {}", quote_literal(table)),
        };
        let sql = format!(
            "SELECT column_name, is_nullable, data_type FROM information_schema.columns \
             WHERE table_catalog = current_database() AND {} ORDER BY ordinal_position",
            filter
        );
        self.record(&sql)?;

        let connection = self.connection()?;
        let mut stmt = connection
            .prepare(&sql)
            .map_err(|e| self.query_error(&sql, e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get::<_, String>(0)?,
                    nullable: row.get::<_, String>(1)? != "NO",
                    data_type: row.get::<_, String>(2)?,
                })
            })
            .map_err(|e| self.query_error(&sql, e))?;

        let mut columns = IndexMap::new();
        for row in rows {
            let column = row.map_err(|e| self.query_error(&sql, e))?;
            columns.insert(column.name.clone(), column);
        }
        Ok(columns)
    }

    fn query_lines(&self, sql: &str) -> Result<Vec<String>> {
        self.record(sql)?;

        let connection = self.connection()?;
        let mut stmt = connection.prepare(sql).map_err(|e| self.query_error(sql, e))?;
        let mut rows = stmt.query([]).map_err(|e| self.query_error(sql, e))?;

        let mut lines = Vec::new();
        let mut column_count = None;
        while let Some(row) = rows.next().map_err(|e| self.query_error(sql, e))? {
            let count = *column_count.get_or_insert_with(|| row.as_ref().column_count());
            let mut fields = Vec::with_capacity(count);
            for i in 0..count {
                let value = row.get_ref(i).map_err(|e| self.query_error(sql, e))?;
                fields.push(render_value(value));
            }
            lines.push(fields.join("\t"));
        }
        Ok(lines)
    }

    fn query_scalar(&self, sql: &str) -> Result<Option<String>> {
        self.record(sql)?;

        let connection = self.connection()?;
        let mut stmt = connection.prepare(sql).map_err(|e| self.query_error(sql, e))?;
        let mut rows = stmt.query([]).map_err(|e| self.query_error(sql, e))?;

        match rows.next().map_err(|e| self.query_error(sql, e))? {
            Some(row) => match row.get_ref(0).map_err(|e| self.query_error(sql, e))? {
                ValueRef::Null => Ok(None),
                value => Ok(Some(render_value(value))),
            },
            None => Ok(None),
        }
    }
}

/// Render one value in PostgreSQL COPY text style: `\N` for NULL, with
/// backslash, tab and line breaks escaped.
pub fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => NULL_MARKER.to_string(),
        ValueRef::Boolean(b) => (if b { "t" } else { "f" }).to_string(),
        ValueRef::TinyInt(i) => i.to_string(),
        ValueRef::SmallInt(i) => i.to_string(),
        ValueRef::Int(i) => i.to_string(),
        ValueRef::BigInt(i) => i.to_string(),
        ValueRef::HugeInt(i) => i.to_string(),
        ValueRef::UTinyInt(i) => i.to_string(),
        ValueRef::USmallInt(i) => i.to_string(),
        ValueRef::UInt(i) => i.to_string(),
        ValueRef::UBigInt(i) => i.to_string(),
        ValueRef::Float(f) => f.to_string(),
        ValueRef::Double(f) => f.to_string(),
        ValueRef::Decimal(d) => d.to_string(),
        ValueRef::Text(s) => escape_text(&String::from_utf8_lossy(s)),
        ValueRef::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("\\\\x{}", hex)
        }
        ValueRef::Date32(days) => chrono::NaiveDate::from_num_days_from_ce_opt(days + 719_163)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| days.to_string()),
        ValueRef::Time64(unit, t) => {
            let micros = to_micros(unit, t);
            chrono::NaiveTime::from_num_seconds_from_midnight_opt(
                (micros / 1_000_000) as u32,
                ((micros % 1_000_000) * 1_000) as u32,
            )
            .map(|t| t.format("%H:%M:%S%.f").to_string())
            .unwrap_or_else(|| t.to_string())
        }
        ValueRef::Timestamp(unit, ts) => chrono::DateTime::from_timestamp_micros(to_micros(unit, ts))
            .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
            .unwrap_or_else(|| ts.to_string()),
        // nested types are cast to VARCHAR in the select list, see ColumnInfo::needs_text_cast
        other => escape_text(&format!("{:?}", other)),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Inverse of the COPY text escaping of a single field
pub fn unescape_text(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => unescaped.push('\t'),
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Quote a SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Statements that only affect the connection they run on and must be
/// replayed on every cloned connection
fn session_scoped(init: &str) -> Vec<String> {
    init.split(';')
        .map(str::trim)
        .filter(|s| {
            let upper = s.to_uppercase();
            upper.starts_with("USE ") || upper.starts_with("SET ")
        })
        .map(|s| format!("{};", s))
        .collect()
}

/// Substitute `{VAR_NAME}` placeholders with environment variables
pub fn substitute_env_vars(text: &str) -> Result<String> {
    let mut result = text.to_string();

    let mut start = 0;
    while let Some(open_pos) = result[start..].find('{') {
        let open_pos = start + open_pos;
        if let Some(close_pos) = result[open_pos..].find('}') {
            let close_pos = open_pos + close_pos;
            let var_name = &result[open_pos + 1..close_pos];

            let var_value = env::var(var_name).map_err(|_| {
                BatchDiffError::invalid_input(format!(
                    "Environment variable '{}' not found",
                    var_name
                ))
            })?;

            result.replace_range(open_pos..=close_pos, &var_value);
            start = open_pos + var_value.len();
        } else {
            start = open_pos + 1;
        }
    }

    Ok(result)
}
