//! dbkit: a thin convenience layer over SQL drivers.
//!
//! SQL is written with `?` markers and translated to the driver's own
//! placeholder syntax, results come back as [`Response`]s of [`Row`]s with
//! name and position access, and [`PreparedStatement`] renders a template
//! with its values inlined for logs and debugging.

// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod debug_sql;
pub mod sql;

pub use crate::config::{ClientSettings, ConnectOptions};
pub use crate::core::db::{
    BatchOptions, ConnectParams, ConnectionState, Database, Driver, DriverConnection, ExecuteOptions,
    ProcedureOptions, Response, ResultSet, Row, SqliteDriver,
};
pub use crate::core::{DbError, Result, Value};
pub use crate::debug_sql::PreparedStatement;
pub use crate::sql::PlaceholderStyle;
