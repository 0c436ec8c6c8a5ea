//! Batch planning: split a table's key space into ordered, non-overlapping
//! ranges

use crate::database::{quote_literal, unescape_text, Database, NULL_MARKER};
use crate::error::{BatchDiffError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of key values per `by_id` batch
pub const DEFAULT_ID_BATCH_SIZE: u64 = 1000;

/// Default number of days per `by_timestamp` batch
pub const DEFAULT_TIMESTAMP_BATCH_DAYS: u64 = 1;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Closed set of batching strategies, selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    OneShot,
    ById,
    ByTimestamp,
}

impl StrategyKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "one_shot" => Ok(Self::OneShot),
            "by_id" => Ok(Self::ById),
            "by_timestamp" => Ok(Self::ByTimestamp),
            _ => Err(BatchDiffError::config(format!(
                "Unknown strategy: {}. Use 'one_shot', 'by_id' or 'by_timestamp'",
                s
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OneShot => "one_shot",
            Self::ById => "by_id",
            Self::ByTimestamp => "by_timestamp",
        }
    }

    pub fn default_batch_size(&self) -> u64 {
        match self {
            Self::OneShot => 0,
            Self::ById => DEFAULT_ID_BATCH_SIZE,
            Self::ByTimestamp => DEFAULT_TIMESTAMP_BATCH_DAYS,
        }
    }

    /// Factory for the strategy implementation
    pub fn strategy(&self) -> Box<dyn BatchStrategy> {
        match self {
            Self::OneShot => Box::new(OneShot),
            Self::ById => Box::new(ById),
            Self::ByTimestamp => Box::new(ByTimestamp),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row selection of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPredicate {
    /// Every row (`1 = 1`)
    All,
    /// `column >= lo AND column < hi`
    IntRange { column: String, lo: i64, hi: i64 },
    /// Same with quoted timestamp literals, optionally capped by `before`
    TimestampRange {
        column: String,
        lo: NaiveDateTime,
        hi: NaiveDateTime,
        before: Option<NaiveDateTime>,
    },
    /// `column IN (...)`, used to recheck a handful of rows. Keys are in
    /// extracted form: COPY-escaped, with `\N` standing for NULL.
    KeyIn { column: String, keys: Vec<String> },
}

impl BatchPredicate {
    pub fn to_sql(&self) -> String {
        match self {
            Self::All => "1 = 1".to_string(),
            Self::IntRange { column, lo, hi } => {
                format!("{} >= {} AND {} < {}", column, lo, column, hi)
            }
            Self::TimestampRange {
                column,
                lo,
                hi,
                before,
            } => {
                let mut sql = format!(
                    "{} >= '{}' AND {} < '{}'",
                    column,
                    format_timestamp(lo),
                    column,
                    format_timestamp(hi)
                );
                if let Some(before) = before {
                    sql.push_str(&format!(" AND {} < '{}'", column, format_timestamp(before)));
                }
                sql
            }
            Self::KeyIn { column, keys } => {
                let has_null = keys.iter().any(|k| k == NULL_MARKER);
                let values: Vec<String> = keys
                    .iter()
                    .filter(|k| k.as_str() != NULL_MARKER)
                    .map(|k| unescape_text(k))
                    .collect();
                let numeric = values.iter().all(|v| v.parse::<i64>().is_ok());
                let values: Vec<String> = values
                    .iter()
                    .map(|v| if numeric { v.clone() } else { quote_literal(v) })
                    .collect();

                match (values.is_empty(), has_null) {
                    (false, false) => format!("{} IN ({})", column, values.join(", ")),
                    (true, true) => format!("{} IS NULL", column),
                    (false, true) => format!(
                        "({} IN ({}) OR {} IS NULL)",
                        column,
                        values.join(", "),
                        column
                    ),
                    (true, false) => "1 = 0".to_string(),
                }
            }
        }
    }
}

/// A named, read-only unit of comparison work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub name: String,
    pub predicate: BatchPredicate,
}

impl Batch {
    pub fn new(name: impl Into<String>, predicate: BatchPredicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    /// Narrow follow-up batch selecting only `keys`
    pub fn recheck(&self, column: &str, keys: Vec<String>) -> Self {
        Self::new(
            format!("{}_recheck", self.name),
            BatchPredicate::KeyIn {
                column: column.to_string(),
                keys,
            },
        )
    }

    pub fn where_clause(&self) -> String {
        self.predicate.to_sql()
    }
}

/// Everything a strategy needs to plan one table
pub struct BatchContext<'a> {
    pub table: &'a str,
    pub target_table: &'a str,
    pub key: &'a str,
    pub batch_size: Option<u64>,
    pub key_start: Option<&'a str>,
    pub key_stop: Option<&'a str>,
    pub limit_to_the_past_minutes: Option<u64>,
    /// Reference time for `now - N` bounds, captured once per plan
    pub now: NaiveDateTime,
    pub source: &'a dyn Database,
    pub target: &'a dyn Database,
}

impl BatchContext<'_> {
    fn batch_size(&self, kind: StrategyKind) -> Result<u64> {
        match self.batch_size.unwrap_or_else(|| kind.default_batch_size()) {
            0 => Err(BatchDiffError::config("Batch size must be greater than 0")),
            size => Ok(size),
        }
    }

    fn all_rows(&self) -> Vec<Batch> {
        log::info!("[{}] No rows on either side, comparing in one batch", self.table);
        vec![Batch::new(format!("{}_all", self.table), BatchPredicate::All)]
    }
}

/// Produces the ordered batch sequence of one table
pub trait BatchStrategy: Send + Sync {
    fn produce_batches(&self, ctx: &BatchContext<'_>) -> Result<Vec<Batch>>;
}

/// Whole table in one batch
pub struct OneShot;

impl BatchStrategy for OneShot {
    fn produce_batches(&self, _ctx: &BatchContext<'_>) -> Result<Vec<Batch>> {
        Ok(vec![Batch::new("full", BatchPredicate::All)])
    }
}

/// Half-open ranges over an integer key
pub struct ById;

impl BatchStrategy for ById {
    fn produce_batches(&self, ctx: &BatchContext<'_>) -> Result<Vec<Batch>> {
        let batch_size = ctx.batch_size(StrategyKind::ById)?;
        walk(&IntDomain, ctx, batch_size)
    }
}

/// Half-open ranges over a timestamp key, `batch_size` in days
pub struct ByTimestamp;

impl BatchStrategy for ByTimestamp {
    fn produce_batches(&self, ctx: &BatchContext<'_>) -> Result<Vec<Batch>> {
        let days = ctx.batch_size(StrategyKind::ByTimestamp)?;
        let before = match ctx.limit_to_the_past_minutes {
            Some(minutes) => Some(
                ctx.now
                    .checked_sub_signed(minutes_delta(minutes)?)
                    .ok_or_else(|| BatchDiffError::config("limit_to_the_past_minutes too large"))?,
            ),
            None => None,
        };
        let domain = TimestampDomain {
            now: ctx.now,
            before,
        };
        walk(&domain, ctx, days)
    }
}

/// Arithmetic and rendering of one key type
trait KeyDomain: Sync {
    type Key: Copy + PartialOrd + fmt::Display + Send;

    fn parse_bound(&self, raw: &str) -> Result<Option<Self::Key>>;

    /// `key + batch_size`, `None` once the key type overflows
    fn step(&self, key: Self::Key, batch_size: u64) -> Option<Self::Key>;

    /// Smallest key strictly greater than `key`
    fn successor(&self, key: Self::Key) -> Option<Self::Key>;

    fn predicate(&self, column: &str, lo: Self::Key, hi: Self::Key) -> BatchPredicate;
}

struct IntDomain;

impl KeyDomain for IntDomain {
    type Key = i64;

    fn parse_bound(&self, raw: &str) -> Result<Option<i64>> {
        let raw = raw.trim();
        if raw.is_empty() || raw == NULL_MARKER {
            return Ok(None);
        }
        raw.parse::<i64>()
            .map(Some)
            .map_err(|_| BatchDiffError::config(format!("Invalid integer key bound: {}", raw)))
    }

    fn step(&self, key: i64, batch_size: u64) -> Option<i64> {
        i64::try_from(batch_size)
            .ok()
            .and_then(|size| key.checked_add(size))
    }

    fn successor(&self, key: i64) -> Option<i64> {
        key.checked_add(1)
    }

    fn predicate(&self, column: &str, lo: i64, hi: i64) -> BatchPredicate {
        BatchPredicate::IntRange {
            column: column.to_string(),
            lo,
            hi,
        }
    }
}

struct TimestampDomain {
    now: NaiveDateTime,
    before: Option<NaiveDateTime>,
}

impl KeyDomain for TimestampDomain {
    type Key = NaiveDateTime;

    fn parse_bound(&self, raw: &str) -> Result<Option<NaiveDateTime>> {
        parse_timestamp(raw, self.now)
    }

    fn step(&self, key: NaiveDateTime, days: u64) -> Option<NaiveDateTime> {
        let seconds = i64::try_from(days).ok()?.checked_mul(24 * 3600)?;
        key.checked_add_signed(Duration::try_seconds(seconds)?)
    }

    fn successor(&self, key: NaiveDateTime) -> Option<NaiveDateTime> {
        key.checked_add_signed(Duration::microseconds(1))
    }

    fn predicate(&self, column: &str, lo: NaiveDateTime, hi: NaiveDateTime) -> BatchPredicate {
        BatchPredicate::TimestampRange {
            column: column.to_string(),
            lo,
            hi,
            before: self.before,
        }
    }
}

#[derive(Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

impl Extreme {
    fn function(&self) -> &'static str {
        match self {
            Extreme::Min => "min",
            Extreme::Max => "max",
        }
    }
}

/// min or max of the key over both sides, widening when they disagree
fn compute_bound<D: KeyDomain>(
    domain: &D,
    ctx: &BatchContext<'_>,
    extreme: Extreme,
) -> Result<Option<D::Key>> {
    log::info!(
        "[{}] Computing {} key, key: {}",
        ctx.table,
        extreme.function(),
        ctx.key
    );
    let side = |db: &dyn Database, table: &str| -> Result<Option<D::Key>> {
        let sql = format!("SELECT {}({}) AS k FROM {}", extreme.function(), ctx.key, table);
        match db.query_scalar(&sql)? {
            Some(raw) => domain.parse_bound(&raw),
            None => Ok(None),
        }
    };

    let (source, target) = rayon::join(
        || side(ctx.source, ctx.table),
        || side(ctx.target, ctx.target_table),
    );

    Ok(match (source?, target?) {
        (Some(s), Some(t)) => Some(match extreme {
            Extreme::Min if t < s => t,
            Extreme::Max if t > s => t,
            _ => s,
        }),
        (s, t) => s.or(t),
    })
}

fn resolve_bound<D: KeyDomain>(
    domain: &D,
    ctx: &BatchContext<'_>,
    explicit: Option<&str>,
    extreme: Extreme,
) -> Result<(Option<D::Key>, bool)> {
    if let Some(raw) = explicit {
        if let Some(key) = domain.parse_bound(raw)? {
            return Ok((Some(key), true));
        }
    }
    Ok((compute_bound(domain, ctx, extreme)?, false))
}

/// Walk from start to stop (inclusive) in steps of `batch_size`
fn walk<D: KeyDomain>(domain: &D, ctx: &BatchContext<'_>, batch_size: u64) -> Result<Vec<Batch>> {
    let (start, stop) = rayon::join(
        || resolve_bound(domain, ctx, ctx.key_start, Extreme::Min),
        || resolve_bound(domain, ctx, ctx.key_stop, Extreme::Max),
    );
    let (start, _) = start?;
    let (stop, explicit_stop) = stop?;

    let (start, stop) = match (start, stop) {
        (Some(start), Some(stop)) => (start, stop),
        _ => return Ok(ctx.all_rows()),
    };
    log::info!("[{}] Key range: {} - {}", ctx.table, start, stop);

    let end = if explicit_stop {
        domain.successor(stop)
    } else {
        None
    };

    let mut batches = Vec::new();
    let mut current = start;
    while current <= stop {
        let next = domain.step(current, batch_size);
        let hi = match (next, end) {
            (Some(next), Some(end)) if end < next => end,
            (Some(next), _) => next,
            (None, Some(end)) => end,
            (None, None) => domain.successor(stop).unwrap_or(stop),
        };
        batches.push(Batch::new(
            format!("{}_{}", ctx.table, current),
            domain.predicate(ctx.key, current, hi),
        ));
        match next {
            Some(next) => current = next,
            None => break,
        }
    }

    Ok(batches)
}

fn minutes_delta(minutes: u64) -> Result<Duration> {
    i64::try_from(minutes)
        .ok()
        .and_then(|m| m.checked_mul(60))
        .and_then(Duration::try_seconds)
        .ok_or_else(|| BatchDiffError::config("limit_to_the_past_minutes too large"))
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp bound: ISO-8601 text, `now`, or `now - <seconds>`.
/// `\N` and empty text mean "no bound".
pub fn parse_timestamp(raw: &str, now: NaiveDateTime) -> Result<Option<NaiveDateTime>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NULL_MARKER {
        return Ok(None);
    }

    if let Some(rest) = raw.strip_prefix("now") {
        let rest = rest.trim();
        if rest.is_empty() {
            return Ok(Some(now));
        }
        let seconds = rest
            .strip_prefix('-')
            .map(str::trim)
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                BatchDiffError::config(format!("Invalid relative timestamp: {}", raw))
            })?;
        return Duration::try_seconds(seconds)
            .and_then(|delta| now.checked_sub_signed(delta))
            .map(Some)
            .ok_or_else(|| BatchDiffError::config(format!("Timestamp out of range: {}", raw)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.naive_utc()));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(ts));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Ok(Some(dt.naive_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0));
    }

    Err(BatchDiffError::config(format!("Invalid timestamp bound: {}", raw)))
}
