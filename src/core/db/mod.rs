/// Database Module
///
/// This module provides the database layer of dbkit, organized into
/// focused submodules.
///
/// ## Architecture
///
/// - **Driver Boundary** (`driver.rs`): The capability set every database driver implements
/// - **SQLite Driver** (`sqlite.rs`): The built-in driver, backed by rusqlite
/// - **Connection Management** (`connection.rs`): The `Database` client and its lifecycle
/// - **Query Results** (`query.rs`): `Row` and `Response` containers
///
/// ## Error Handling
///
/// All database operations use the standardized `DbError` type. Driver
/// errors are passed through unmodified.
pub mod connection;
pub mod driver;
pub mod query;
pub mod sqlite;

pub use connection::*;
pub use driver::*;
pub use query::*;
pub use sqlite::*;
