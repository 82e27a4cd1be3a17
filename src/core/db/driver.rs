/// Driver Boundary Module
///
/// dbkit never talks to a database itself. Everything goes through the
/// small capability set defined here, which a concrete driver (SQLite is
/// built in, see `sqlite.rs`) implements.

use crate::core::{Result, Value};
use crate::sql::PlaceholderStyle;

/// Resolved parameters handed to [`Driver::connect`].
///
/// Which fields matter is up to the driver; SQLite only looks at
/// `database` and `charset`.
#[derive(Clone, PartialEq)]
pub struct ConnectParams {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub charset: String,
}

impl Default for ConnectParams {
    fn default() -> Self {
        ConnectParams {
            server: None,
            port: None,
            database: None,
            username: None,
            password: None,
            charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

pub const DEFAULT_CHARSET: &str = "UTF-8";

// Hand-written so passwords never reach a log line
impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("charset", &self.charset)
            .finish()
    }
}

/// One fetched result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Opens connections.
pub trait Driver {
    /// Short engine name used in log output.
    fn name(&self) -> &str;

    /// Opens a connection.
    ///
    /// Any failure here is reported as `DbError::Credentials` so callers can
    /// tell a configuration problem apart from a failing statement.
    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DriverConnection>>;
}

/// An open connection together with its single result cursor.
///
/// `execute` replaces whatever the cursor held before. Result sets produced
/// by the statement are then read with `fetch_all`, and `next_set` moves on
/// to the following one, mirroring the DB-API cursor model.
pub trait DriverConnection {
    /// The native placeholder syntax `?`-templates are translated into.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Runs `sql` (already translated) with `params` bound positionally.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()>;

    /// Drains the rows of the current result set.
    ///
    /// Returns an empty set when the last statement produced none.
    fn fetch_all(&mut self) -> Result<ResultSet>;

    /// Skips to the next result set; `false` when none is left.
    fn next_set(&mut self) -> Result<bool>;

    /// Drops every pending result set.
    fn discard_results(&mut self);

    /// Runs `sql` once per parameter set as a single driver call.
    ///
    /// The default just loops over [`DriverConnection::execute`]; drivers
    /// that can reuse a prepared statement should override it.
    fn execute_batch(&mut self, sql: &str, param_sets: &[Vec<Value>]) -> Result<()> {
        for params in param_sets {
            self.execute(sql, params)?;
        }
        self.discard_results();
        Ok(())
    }

    /// Commits the open transaction, if any.
    fn commit(&mut self) -> Result<()>;

    /// Releases the connection without committing.
    fn close(self: Box<Self>) -> Result<()>;

    /// A `?`-template with one marker that returns the source text of the
    /// named procedure in its first column, possibly split across rows.
    fn definition_query(&self) -> &str;
}
