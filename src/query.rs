//! ==============================================================================
//! query.rs - read-path statement builder
//! ==============================================================================
//!
//! purpose:
//!     turns an optional [start, end] window and a limit into a parameterized
//!     SELECT. filter values are only ever bound, never spliced into the SQL.
//!
//! ```text
//! SELECT <columns> FROM <table>
//! [WHERE recTime >= ?] [AND recTime <= ?]
//! ORDER BY recTime DESC LIMIT ?
//! ```
//!
//! relationships:
//!     - used by: store.rs (MySqlStore::fetch), handlers.rs (ReadFilter)
//!
//! ==============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Columns returned by every read, in order.
pub const SELECT_COLUMNS: &str =
    "id, location, recTime, temp, rH, VOC, NOx, pmass1, pmass25, pmass4, pmass10, HCHO, CO2, indoorTd";

/// Columns written by an insert, in bind order.
pub const INSERT_COLUMNS: &str =
    "location, recTime, temp, rH, VOC, NOx, pmass1, pmass25, pmass4, pmass10, HCHO, CO2, indoorTd";

pub const DEFAULT_HISTORY_LIMIT: i64 = 15_000;
pub const DEFAULT_LATEST_LIMIT: i64 = 1;

/// Which read endpoint is asking. Decides the default limit and tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Historical,
    Latest,
}

impl ReadKind {
    pub fn default_limit(self) -> i64 {
        match self {
            ReadKind::Historical => DEFAULT_HISTORY_LIMIT,
            ReadKind::Latest => DEFAULT_LATEST_LIMIT,
        }
    }

    pub fn annotates(self) -> bool {
        matches!(self, ReadKind::Historical)
    }
}

/// Resolve a requested limit: positive values are kept, anything else falls
/// back to `default`.
pub fn resolve_limit(requested: Option<i64>, default: i64) -> i64 {
    match requested {
        Some(n) if n > 0 => n,
        _ => default,
    }
}

/// Inclusive time window plus row cap.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl ReadFilter {
    pub fn new(
        kind: ReadKind,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        requested_limit: Option<i64>,
    ) -> Self {
        Self {
            start,
            end,
            limit: resolve_limit(requested_limit, kind.default_limit()),
        }
    }

    /// The most recent `limit` rows, no window.
    #[cfg(test)]
    pub(crate) fn latest(limit: i64) -> Self {
        Self::new(ReadKind::Latest, None, None, Some(limit))
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *at >= s) && self.end.map_or(true, |e| *at <= e)
    }
}

/// A value bound to a `?` placeholder, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Timestamp(DateTime<Utc>),
    Limit(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

/// Build the read statement for `table`. The table name must already be a
/// validated identifier (see `config::validate_identifier`).
pub fn build_select(table: &str, filter: &ReadFilter) -> SelectStatement {
    let mut sql = format!("SELECT {} FROM {}", SELECT_COLUMNS, table);
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(start) = filter.start {
        conditions.push("recTime >= ?");
        binds.push(BindValue::Timestamp(start));
    }
    if let Some(end) = filter.end {
        conditions.push("recTime <= ?");
        binds.push(BindValue::Timestamp(end));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY recTime DESC LIMIT ?");
    binds.push(BindValue::Limit(filter.limit));

    SelectStatement { sql, binds }
}

pub fn build_insert(table: &str) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        table, INSERT_COLUMNS
    )
}

/// Parse a date bound as sent by clients.
///
/// Accepts RFC3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` (both read as
/// UTC) and a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    /// The filter part of the statement, empty when unbounded.
    fn where_clause(stmt: &SelectStatement) -> &str {
        match (stmt.sql.find(" WHERE "), stmt.sql.find(" ORDER BY ")) {
            (Some(w), Some(o)) => &stmt.sql[w + 1..o],
            _ => "",
        }
    }

    #[test]
    fn unbounded_query_has_no_where() {
        let stmt = build_select("IAQ_SEN55", &ReadFilter::new(ReadKind::Historical, None, None, None));
        assert_eq!(
            stmt.sql,
            "SELECT id, location, recTime, temp, rH, VOC, NOx, pmass1, pmass25, pmass4, pmass10, HCHO, CO2, indoorTd \
             FROM IAQ_SEN55 ORDER BY recTime DESC LIMIT ?"
        );
        assert_eq!(where_clause(&stmt), "");
        assert_eq!(stmt.binds, vec![BindValue::Limit(15_000)]);
    }

    #[test]
    fn start_only_adds_one_comparison() {
        let stmt = build_select("t", &ReadFilter::new(ReadKind::Historical, Some(at(1)), None, Some(10)));
        assert_eq!(where_clause(&stmt), "WHERE recTime >= ?");
        assert!(!stmt.sql.contains("<="));
        assert_eq!(stmt.binds, vec![BindValue::Timestamp(at(1)), BindValue::Limit(10)]);
    }

    #[test]
    fn end_only_adds_one_comparison() {
        let stmt = build_select("t", &ReadFilter::new(ReadKind::Historical, None, Some(at(2)), None));
        assert_eq!(where_clause(&stmt), "WHERE recTime <= ?");
        assert_eq!(stmt.binds, vec![BindValue::Timestamp(at(2)), BindValue::Limit(15_000)]);
    }

    #[test]
    fn both_bounds_joined_with_and() {
        let stmt = build_select(
            "t",
            &ReadFilter::new(ReadKind::Historical, Some(at(1)), Some(at(2)), Some(5)),
        );
        assert_eq!(where_clause(&stmt), "WHERE recTime >= ? AND recTime <= ?");
        assert!(stmt.sql.ends_with("ORDER BY recTime DESC LIMIT ?"));
        assert_eq!(
            stmt.binds,
            vec![
                BindValue::Timestamp(at(1)),
                BindValue::Timestamp(at(2)),
                BindValue::Limit(5)
            ]
        );
    }

    #[test]
    fn limits_fall_back_per_endpoint() {
        assert_eq!(ReadFilter::new(ReadKind::Historical, None, None, Some(0)).limit, 15_000);
        assert_eq!(ReadFilter::new(ReadKind::Historical, None, None, Some(-4)).limit, 15_000);
        assert_eq!(ReadFilter::new(ReadKind::Historical, None, None, Some(20)).limit, 20);
        assert_eq!(ReadFilter::new(ReadKind::Latest, None, None, None).limit, 1);
        assert_eq!(ReadFilter::new(ReadKind::Latest, None, None, Some(0)).limit, 1);
        assert_eq!(ReadFilter::latest(3).limit, 3);
    }

    #[test]
    fn only_historical_reads_are_tagged() {
        assert!(ReadKind::Historical.annotates());
        assert!(!ReadKind::Latest.annotates());
    }

    #[test]
    fn window_is_inclusive() {
        let f = ReadFilter::new(ReadKind::Historical, Some(at(1)), Some(at(3)), None);
        assert!(f.contains(&at(1)));
        assert!(f.contains(&at(2)));
        assert!(f.contains(&at(3)));
        assert!(!f.contains(&at(0)));
        assert!(!f.contains(&at(4)));
    }

    #[test]
    fn hostile_bounds_never_reach_the_sql() {
        // only parsed timestamps are bound, the raw text is gone by now
        assert_eq!(parse_timestamp("2024-01-01' OR 1=1 --"), None);
    }

    #[test]
    fn insert_has_one_placeholder_per_column() {
        let sql = build_insert("IAQ_SEN55");
        let columns = INSERT_COLUMNS.split(", ").count();
        assert_eq!(sql.matches('?').count(), columns);
        assert!(sql.starts_with("INSERT INTO IAQ_SEN55 (location, recTime, temp"));
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 13, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T13:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T15:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 13:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T13:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("last tuesday"), None);
    }
}
