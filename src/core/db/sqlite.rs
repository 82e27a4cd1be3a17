/// SQLite Driver Module
///
/// The built-in [`Driver`] backed by `rusqlite`. Connections behave like a
/// DB-API driver: a data-modifying statement (INSERT, UPDATE, DELETE,
/// REPLACE) opens a transaction when none is active, and its changes are not
/// persisted until `commit`. Everything else, DDL and PRAGMAs included, runs
/// in autocommit mode.

use super::driver::{ConnectParams, Driver, DriverConnection, ResultSet};
use crate::core::{DbError, Result, Value};
use crate::core::value::{DATETIME_FORMAT, DATE_FORMAT};
use crate::sql::PlaceholderStyle;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Batch, Connection, OpenFlags, ToSql};
use std::collections::VecDeque;
use tracing::debug;

const DEFINITION_QUERY: &str =
    "SELECT sql FROM sqlite_master WHERE name = ? AND sql IS NOT NULL ORDER BY type";

/// Opens SQLite databases. `ConnectParams::database` is the file path or
/// `:memory:`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DriverConnection>> {
        let path = params
            .database
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| DbError::Credentials("no database given".to_string()))?;

        let encoding = sqlite_encoding(&params.charset)?;

        let conn = Connection::open_with_flags(path, OpenFlags::default())
            .map_err(|e| DbError::Credentials(format!("cannot open {}: {}", path, e)))?;

        // Opening is lazy; touch the file so unreadable or non-database
        // files fail here rather than on the first query.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| DbError::Credentials(format!("cannot read {}: {}", path, e)))?;

        if let Some(encoding) = encoding {
            conn.execute_batch(&format!("PRAGMA encoding = '{}'", encoding))?;
        }

        debug!(path, "Opened SQLite connection");
        Ok(Box::new(SqliteConnection {
            conn,
            pending: VecDeque::new(),
        }))
    }
}

/// Maps a charset name onto `PRAGMA encoding`. `None` means the UTF-8 default.
fn sqlite_encoding(charset: &str) -> Result<Option<&'static str>> {
    let normalized = charset.to_ascii_uppercase().replace(['-', '_'], "");
    match normalized.as_str() {
        "UTF8" => Ok(None),
        "UTF16" => Ok(Some("UTF-16")),
        "UTF16LE" => Ok(Some("UTF-16le")),
        "UTF16BE" => Ok(Some("UTF-16be")),
        _ => Err(DbError::Config(format!("unsupported SQLite charset: {}", charset))),
    }
}

/// True for statements that must run inside an implicit transaction.
///
/// Only DML qualifies; `WITH` counts when the statement writes. Statements
/// SQLite refuses inside a transaction (VACUUM, `PRAGMA journal_mode`,
/// ATTACH) never do.
fn opens_transaction(sql: &str, readonly: bool) -> bool {
    let keyword: String = skip_comments(sql)
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    match keyword.as_str() {
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" => true,
        "WITH" => !readonly,
        _ => false,
    }
}

/// Strips leading whitespace and `--` / `/* */` comments.
fn skip_comments(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start();
        if let Some(rest) = sql.strip_prefix("--") {
            sql = rest.find('\n').map_or("", |i| &rest[i + 1..]);
        } else if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.find("*/").map_or("", |i| &rest[i + 2..]);
        } else {
            return sql;
        }
    }
}

pub struct SqliteConnection {
    conn: Connection,
    pending: VecDeque<ResultSet>,
}

impl SqliteConnection {
    /// Opens a transaction before the first data-modifying statement, like DB-API drivers do.
    fn begin_if_needed(&self, sql: &str, readonly: bool) -> Result<()> {
        if opens_transaction(sql, readonly) && self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Runs every statement in `sql`, collecting one result set per statement that has columns.
    fn run(&self, sql: &str, params: &[Value]) -> Result<VecDeque<ResultSet>> {
        let mut results = VecDeque::new();
        let mut batch = Batch::new(&self.conn, sql);
        while let Some(mut stmt) = batch.next()? {
            let text = stmt.expanded_sql().unwrap_or_default();
            self.begin_if_needed(&text, stmt.readonly())?;

            // Numbered placeholders make parameter_count the highest index
            // used, so each statement binds exactly the prefix it refers to.
            let wanted = stmt.parameter_count();
            if wanted > params.len() {
                return Err(DbError::ParameterMismatch {
                    placeholders: wanted,
                    params: params.len(),
                });
            }
            for (i, value) in params.iter().take(wanted).enumerate() {
                stmt.raw_bind_parameter(i + 1, value)?;
            }

            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();
            let mut rows = Vec::new();
            let mut cursor = stmt.raw_query();
            while let Some(row) = cursor.next()? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(Value::from(row.get_ref(i)?));
                }
                rows.push(values);
            }

            if width > 0 {
                results.push_back(ResultSet { columns, rows });
            }
        }

        Ok(results)
    }
}

impl DriverConnection for SqliteConnection {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        self.pending.clear();
        self.pending = self.run(sql, params)?;
        Ok(())
    }

    fn fetch_all(&mut self) -> Result<ResultSet> {
        Ok(match self.pending.front_mut() {
            Some(set) => ResultSet {
                columns: set.columns.clone(),
                rows: std::mem::take(&mut set.rows),
            },
            None => ResultSet::default(),
        })
    }

    fn next_set(&mut self) -> Result<bool> {
        self.pending.pop_front();
        Ok(!self.pending.is_empty())
    }

    fn discard_results(&mut self) {
        self.pending.clear();
    }

    fn execute_batch(&mut self, sql: &str, param_sets: &[Vec<Value>]) -> Result<()> {
        self.pending.clear();
        let mut stmt = self.conn.prepare_cached(sql)?;
        self.begin_if_needed(sql, stmt.readonly())?;
        for params in param_sets {
            stmt.execute(params_from_iter(params.iter()))?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let SqliteConnection { conn, .. } = *self;
        conn.close().map_err(|(_, e)| DbError::Driver(e))
    }

    fn definition_query(&self) -> &str {
        DEFINITION_QUERY
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Date(d) => ToSqlOutput::Owned(rusqlite::types::Value::Text(d.format(DATE_FORMAT).to_string())),
            Value::DateTime(dt) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(dt.format(DATETIME_FORMAT).to_string()))
            }
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Box<dyn DriverConnection> {
        let params = ConnectParams {
            database: Some(":memory:".to_string()),
            ..ConnectParams::default()
        };
        SqliteDriver.connect(&params).unwrap()
    }

    #[test]
    fn test_missing_database_is_a_credentials_error() {
        match SqliteDriver.connect(&ConnectParams::default()) {
            Err(DbError::Credentials(msg)) => assert!(msg.contains("no database")),
            _ => panic!("Expected Credentials error"),
        }
    }

    #[test]
    fn test_unopenable_path_is_a_credentials_error() {
        let params = ConnectParams {
            database: Some("/nonexistent/path/database.db".to_string()),
            ..ConnectParams::default()
        };
        assert!(matches!(SqliteDriver.connect(&params), Err(DbError::Credentials(_))));
    }

    #[test]
    fn test_unknown_charset() {
        let params = ConnectParams {
            database: Some(":memory:".to_string()),
            charset: "latin1".to_string(),
            ..ConnectParams::default()
        };
        assert!(matches!(SqliteDriver.connect(&params), Err(DbError::Config(_))));
        assert_eq!(sqlite_encoding("utf_8").unwrap(), None);
        assert_eq!(sqlite_encoding("UTF-16le").unwrap(), Some("UTF-16le"));
    }

    #[test]
    fn test_multiple_result_sets() {
        let mut conn = memory();
        conn.execute(
            "CREATE TABLE t (id INTEGER, name TEXT);
             INSERT INTO t VALUES (1, 'a'), (2, 'b');
             SELECT id FROM t ORDER BY id;
             SELECT name FROM t ORDER BY id DESC;",
            &[],
        )
        .unwrap();

        let first = conn.fetch_all().unwrap();
        assert_eq!(first.columns, vec!["id"]);
        assert_eq!(first.rows, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);

        assert!(conn.next_set().unwrap());
        let second = conn.fetch_all().unwrap();
        assert_eq!(second.rows[0], vec![Value::from("b")]);

        assert!(!conn.next_set().unwrap());
        assert_eq!(conn.fetch_all().unwrap(), ResultSet::default());
    }

    #[test]
    fn test_numbered_params_across_statements() {
        let mut conn = memory();
        conn.execute("CREATE TABLE t (a INTEGER, b TEXT)", &[]).unwrap();
        conn.execute(
            "INSERT INTO t VALUES (?1, NULL); UPDATE t SET b = ?2 WHERE a = ?1",
            &[Value::Int(4), Value::from("four")],
        )
        .unwrap();
        conn.execute("SELECT a, b FROM t", &[]).unwrap();
        assert_eq!(conn.fetch_all().unwrap().rows, vec![vec![Value::Int(4), Value::from("four")]]);
    }

    #[test]
    fn test_writes_open_a_transaction() {
        let mut conn = memory();
        conn.execute("CREATE TABLE t (a INTEGER)", &[]).unwrap();
        conn.execute_batch("INSERT INTO t VALUES (?1)", &[vec![Value::Int(1)], vec![Value::Int(2)]])
            .unwrap();
        conn.commit().unwrap();
        conn.execute("SELECT count(*) AS n FROM t", &[]).unwrap();
        assert_eq!(conn.fetch_all().unwrap().rows[0][0], Value::Int(2));
        conn.close().unwrap();
    }

    #[test]
    fn test_value_mapping() {
        let mut conn = memory();
        conn.execute(
            "SELECT ?1 AS flag, ?2 AS day, ?3 AS data, ?4 AS empty",
            &[
                Value::Bool(true),
                Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
                Value::Blob(vec![1, 2]),
                Value::Null,
            ],
        )
        .unwrap();
        let set = conn.fetch_all().unwrap();
        assert_eq!(
            set.rows[0],
            vec![Value::Int(1), Value::from("2024-05-01"), Value::Blob(vec![1, 2]), Value::Null]
        );
    }

    #[test]
    fn test_only_dml_opens_a_transaction() {
        assert!(opens_transaction("INSERT INTO t VALUES (1)", false));
        assert!(opens_transaction("  update t SET a = 1", false));
        assert!(opens_transaction("-- note\nDELETE FROM t", false));
        assert!(opens_transaction("/* bulk */ REPLACE INTO t VALUES (1)", false));
        assert!(opens_transaction("WITH x AS (SELECT 1) INSERT INTO t SELECT * FROM x", false));
        assert!(!opens_transaction("WITH x AS (SELECT 1) SELECT * FROM x", true));
        assert!(!opens_transaction("VACUUM", false));
        assert!(!opens_transaction("PRAGMA journal_mode = WAL", false));
        assert!(!opens_transaction("ATTACH DATABASE ':memory:' AS aux", false));
        assert!(!opens_transaction("CREATE TABLE t (a INTEGER)", false));
    }

    #[test]
    fn test_vacuum_after_committed_writes() {
        let mut conn = memory();
        conn.execute("CREATE TABLE t (a INTEGER)", &[]).unwrap();
        conn.execute("INSERT INTO t VALUES (?1)", &[Value::Int(1)]).unwrap();
        assert!(matches!(conn.execute("VACUUM", &[]), Err(DbError::Driver(_))));
        conn.commit().unwrap();
        conn.execute("VACUUM", &[]).unwrap();
    }
}
