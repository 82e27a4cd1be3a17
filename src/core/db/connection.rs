/// Connection Management Module
///
/// This module provides [`Database`], the client that owns one driver
/// connection and exposes query, statement, procedure and batch execution
/// on top of it. The connection lives exactly as long as the client: it is
/// opened on construction and committed and released by `close` or, failing
/// that, by `Drop`.

use super::driver::{Driver, DriverConnection};
use super::query::Response;
use super::sqlite::SqliteDriver;
use crate::config::{self, ClientSettings, ConnectOptions};
use crate::core::{DbError, Result, Value};
use crate::debug_sql::PreparedStatement;
use crate::sql::{count_placeholders, translate_placeholders};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Lifecycle of a [`Database`] client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection open, operations allowed
    Connected,
    /// Committed and released; every operation fails with `DbError::Closed`
    Closed,
}

/// Options for [`Database::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Commit after the statement ran
    pub commit: bool,
    /// Send empty string parameters as NULL
    pub convert_blanks_to_nulls: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            commit: false,
            convert_blanks_to_nulls: true,
        }
    }
}

impl ExecuteOptions {
    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn convert_blanks_to_nulls(mut self, convert: bool) -> Self {
        self.convert_blanks_to_nulls = convert;
        self
    }
}

/// Options for [`Database::call_procedure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcedureOptions {
    pub commit: bool,
    pub convert_blanks_to_nulls: bool,
    /// Wait budget for pending result sets; `None` uses `ClientSettings::procedure_timeout`
    pub timeout: Option<Duration>,
}

impl Default for ProcedureOptions {
    fn default() -> Self {
        ProcedureOptions {
            commit: false,
            convert_blanks_to_nulls: true,
            timeout: None,
        }
    }
}

impl ProcedureOptions {
    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn convert_blanks_to_nulls(mut self, convert: bool) -> Self {
        self.convert_blanks_to_nulls = convert;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for [`Database::execute_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Send every parameter set in a single driver call instead of chunks
    pub fast: bool,
    pub commit: bool,
    pub convert_blanks_to_nulls: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            fast: false,
            commit: false,
            convert_blanks_to_nulls: true,
        }
    }
}

impl BatchOptions {
    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn convert_blanks_to_nulls(mut self, convert: bool) -> Self {
        self.convert_blanks_to_nulls = convert;
        self
    }
}

/// A client owning one database connection.
///
/// One client is meant for one caller at a time; every operation takes
/// `&mut self` and blocks until the driver returns.
///
/// # Examples
///
/// ```
/// use dbkit::{values, ConnectOptions, Database, ExecuteOptions};
///
/// let mut db = Database::connect(ConnectOptions::new().database(":memory:"))?;
/// db.execute("CREATE TABLE t (id INTEGER, name TEXT)", &[], ExecuteOptions::default())?;
/// db.execute("INSERT INTO t VALUES (?, ?)", &values![1, "one"], ExecuteOptions::default().commit(true))?;
///
/// let response = db.query("SELECT name FROM t WHERE id = ?", &values![1])?;
/// assert_eq!(response[0].get("name").and_then(|v| v.as_str()), Some("one"));
/// db.close()?;
/// # Ok::<(), dbkit::DbError>(())
/// ```
pub struct Database {
    conn: Option<Box<dyn DriverConnection>>,
    settings: ClientSettings,
    driver: String,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("driver", &self.driver)
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Database {
    /// Opens a SQLite connection with default client settings.
    pub fn connect(options: ConnectOptions) -> Result<Self> {
        Self::connect_with(&SqliteDriver, options, ClientSettings::default())
    }

    /// Opens a SQLite connection from `DBHOST`, `DBUSER`, `DBPASSWD` and `DATABASE`.
    pub fn from_env() -> Result<Self> {
        Self::connect(ConnectOptions::from_env())
    }

    /// Opens the `[section]` connection of a connections file.
    ///
    /// Environment values are the base, the section overrides them and
    /// `overrides` wins over both. Client settings come from the section.
    pub fn from_config<P: AsRef<Path>>(path: P, section: &str, overrides: ConnectOptions) -> Result<Self> {
        let (options, settings) = config::resolve_section(path, section)?;
        Self::connect_with(&SqliteDriver, options.layer(overrides), settings)
    }

    /// Like [`Database::from_config`], reading the default connections file.
    pub fn from_default_config(section: &str, overrides: ConnectOptions) -> Result<Self> {
        let path = config::default_connections_path()
            .ok_or_else(|| DbError::Config("no config directory on this platform".to_string()))?;
        Self::from_config(path, section, overrides)
    }

    /// Opens a connection through any driver.
    ///
    /// # Errors
    ///
    /// Connect failures come back as `DbError::Credentials` (or
    /// `DbError::Config` for parameters the driver cannot interpret), never
    /// as the raw driver error.
    pub fn connect_with(driver: &dyn Driver, options: ConnectOptions, settings: ClientSettings) -> Result<Self> {
        if settings.batch_size == 0 {
            return Err(DbError::Config("batch_size must be at least 1".to_string()));
        }

        let params = options.into_params();
        debug!(driver = driver.name(), params = ?params, "Connecting");
        let conn = driver.connect(&params).map_err(|e| match e {
            DbError::Credentials(_) | DbError::Config(_) => e,
            other => DbError::Credentials(other.to_string()),
        })?;
        info!(driver = driver.name(), database = ?params.database, "Connected");

        Ok(Database {
            conn: Some(conn),
            settings,
            driver: driver.name().to_string(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        if self.conn.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Closed
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn conn(&mut self) -> Result<&mut dyn DriverConnection> {
        match self.conn.as_mut() {
            Some(conn) => Ok(conn.as_mut()),
            None => Err(DbError::Closed),
        }
    }

    /// Runs a query and returns every row of its first result set.
    ///
    /// `?` markers in `sql` are replaced by the driver's placeholders when
    /// `params` is non-empty. Nothing is committed.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Response> {
        let conn = self.conn()?;
        let native = native_sql(conn, sql, params)?;
        trace_statement(sql, params);

        conn.execute(&native, params)?;
        let fetched = conn.fetch_all();
        conn.discard_results();
        let set = fetched?;

        debug!(rows = set.rows.len(), "Query finished");
        Ok(Response::new(set.columns, set.rows))
    }

    /// Runs a statement whose results are not needed (INSERT, UPDATE, DDL, ...).
    pub fn execute(&mut self, sql: &str, params: &[Value], options: ExecuteOptions) -> Result<()> {
        let params = blanks_to_nulls(params, options.convert_blanks_to_nulls);
        let conn = self.conn()?;
        let native = native_sql(conn, sql, &params)?;
        trace_statement(sql, &params);

        conn.execute(&native, &params)?;
        if options.commit {
            conn.commit()?;
            debug!("Committed");
        }
        Ok(())
    }

    /// Runs a procedure call and waits for its pending result sets.
    ///
    /// After the call the driver is polled for further result sets every
    /// `ClientSettings::poll_interval`. The wait is cut short once the
    /// accumulated sleep reaches the timeout; that is logged but not an
    /// error, so a procedure still running on the server looks the same as
    /// a finished one to the caller.
    pub fn call_procedure(&mut self, code: &str, params: &[Value], options: ProcedureOptions) -> Result<()> {
        let poll_interval = self.settings.poll_interval;
        let timeout = options.timeout.unwrap_or(self.settings.procedure_timeout);
        let params = blanks_to_nulls(params, options.convert_blanks_to_nulls);

        let conn = self.conn()?;
        let native = native_sql(conn, code, &params)?;
        trace_statement(code, &params);
        conn.execute(&native, &params)?;

        let mut waited = Duration::ZERO;
        loop {
            let more = match conn.next_set() {
                Ok(more) => more,
                Err(e) => {
                    conn.discard_results();
                    return Err(e);
                }
            };
            if !more {
                break;
            }
            if waited >= timeout {
                warn!(?timeout, "Gave up waiting for procedure result sets");
                break;
            }
            thread::sleep(poll_interval);
            waited += poll_interval;
        }
        conn.discard_results();

        if options.commit {
            conn.commit()?;
            debug!("Committed");
        }
        Ok(())
    }

    /// Runs one statement template once per parameter set.
    ///
    /// Every set is bound through the driver's parameter binding; no value
    /// is ever spliced into the SQL text. Unless `fast` is set, sets are sent
    /// in chunks of `ClientSettings::batch_size`. A failing chunk aborts the
    /// call and leaves earlier chunks to whatever the driver's transaction
    /// does with them.
    pub fn execute_many(&mut self, sql: &str, param_sets: &[Vec<Value>], options: BatchOptions) -> Result<()> {
        let placeholders = count_placeholders(sql);
        if let Some(short) = param_sets.iter().find(|set| set.len() < placeholders) {
            return Err(DbError::ParameterMismatch {
                placeholders,
                params: short.len(),
            });
        }

        let param_sets: Cow<'_, [Vec<Value>]> = if options.convert_blanks_to_nulls {
            Cow::Owned(
                param_sets
                    .iter()
                    .map(|set| blanks_to_nulls(set, true).into_owned())
                    .collect(),
            )
        } else {
            Cow::Borrowed(param_sets)
        };
        let chunk_size = if options.fast {
            param_sets.len().max(1)
        } else {
            self.settings.batch_size
        };

        let conn = self.conn()?;
        let native = translate_placeholders(sql, placeholders, conn.placeholder_style())?;
        for chunk in param_sets.chunks(chunk_size) {
            debug!(statements = chunk.len(), "Sending batch");
            conn.execute_batch(&native, chunk)?;
        }

        if options.commit {
            conn.commit()?;
            debug!("Committed");
        }
        Ok(())
    }

    /// Returns the source text of a stored procedure (or, on SQLite, of any
    /// schema object) by name. Empty when nothing matches.
    pub fn procedure_definition(&mut self, name: &str) -> Result<String> {
        let template = self.conn()?.definition_query().to_string();
        let response = self.query(&template, &[Value::from(name)])?;

        let mut definition = String::new();
        for row in &response {
            match row.value(0) {
                Some(Value::Text(text)) => definition.push_str(text),
                Some(Value::Null) | None => {}
                Some(other) => definition.push_str(&other.to_string()),
            }
        }
        Ok(definition)
    }

    /// Commits the open transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.conn()?.commit()
    }

    /// Renders `sql` with `params` inlined, blanks shown as NULL. For reading only.
    pub fn debug_sql(sql: &str, params: &[Value]) -> Result<String> {
        PreparedStatement::new(sql, params, true).map(PreparedStatement::into_sql)
    }

    /// Commits and releases the connection.
    ///
    /// The connection is released even when the commit fails; the commit
    /// error is returned in that case. Closing an already closed client does
    /// nothing.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let committed = conn.commit();
        let closed = conn.close();
        info!(driver = %self.driver, "Connection closed");
        committed.and(closed)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.conn.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close connection on drop");
            }
        }
    }
}

/// Translates `?` markers unless there is nothing to bind.
fn native_sql(conn: &dyn DriverConnection, sql: &str, params: &[Value]) -> Result<String> {
    if params.is_empty() {
        Ok(sql.to_string())
    } else {
        translate_placeholders(sql, params.len(), conn.placeholder_style())
    }
}

fn blanks_to_nulls(params: &[Value], convert: bool) -> Cow<'_, [Value]> {
    if convert && params.iter().any(Value::is_blank) {
        Cow::Owned(
            params
                .iter()
                .map(|v| if v.is_blank() { Value::Null } else { v.clone() })
                .collect(),
        )
    } else {
        Cow::Borrowed(params)
    }
}

fn trace_statement(sql: &str, params: &[Value]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        match PreparedStatement::new(sql, params, false) {
            Ok(stmt) => trace!(statement = %stmt, "Executing"),
            Err(_) => trace!(sql, params = params.len(), "Executing"),
        }
    }
}
