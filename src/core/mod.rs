/// Core Module for dbkit
///
/// This module contains the shared building blocks of the crate: the
/// error type, the driver-neutral value type, and the database layer.

pub mod db;
pub mod error;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{DbError, Result};
pub use value::Value;
