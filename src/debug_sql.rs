//! Debug SQL rendering.
//!
//! [`PreparedStatement`] inlines parameter values into a `?`-template so the
//! finished statement can be read in a log or pasted into a console.
//!
//! **Never execute the output.** Values are substituted as text with no
//! validation beyond quote doubling, so rendered statements are not safe
//! against SQL injection. Execution always goes through the driver's
//! parameter binding (see [`crate::Database`]).

use crate::core::{DbError, Result, Value};
use crate::sql::{count_placeholders, PLACEHOLDER};
use std::fmt;

/// A `?`-template with its parameters rendered in place.
///
/// ```
/// use dbkit::{values, PreparedStatement};
///
/// let stmt = PreparedStatement::new("SELECT * FROM t WHERE name = ? AND n = ?", &values!["O'Brien", 3], true).unwrap();
/// assert_eq!(stmt.sql(), "SELECT * FROM t WHERE name = 'O''Brien' AND n = 3");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    sql: String,
}

impl PreparedStatement {
    /// Renders `sql` with `params` inlined.
    ///
    /// With an empty parameter list the template is returned unchanged.
    /// When `convert_blanks_to_nulls` is set, empty strings render as `NULL`
    /// instead of `''`.
    ///
    /// # Errors
    ///
    /// `DbError::ParameterMismatch` if the template has more `?` than `params`.
    pub fn new(sql: &str, params: &[Value], convert_blanks_to_nulls: bool) -> Result<Self> {
        if params.is_empty() {
            return Ok(PreparedStatement { sql: sql.to_string() });
        }

        let mut rendered = String::with_capacity(sql.len());
        let mut remaining = params.iter();
        for c in sql.chars() {
            if c != PLACEHOLDER {
                rendered.push(c);
                continue;
            }
            let value = remaining.next().ok_or_else(|| DbError::ParameterMismatch {
                placeholders: count_placeholders(sql),
                params: params.len(),
            })?;
            push_literal(&mut rendered, value, convert_blanks_to_nulls);
        }

        Ok(PreparedStatement { sql: rendered })
    }

    /// The finished statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn into_sql(self) -> String {
        self.sql
    }
}

impl fmt::Display for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Renders one value as a SQL literal.
///
/// NaN and infinite floats have no SQL literal and render as `NULL`.
pub fn sql_literal(value: &Value, convert_blanks_to_nulls: bool) -> String {
    let mut out = String::new();
    push_literal(&mut out, value, convert_blanks_to_nulls);
    out
}

fn push_literal(out: &mut String, value: &Value, convert_blanks_to_nulls: bool) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Text(s) if s.is_empty() => {
            out.push_str(if convert_blanks_to_nulls { "NULL" } else { "''" });
        }
        Value::Text(s) => push_quoted(out, s),
        Value::Bool(b) => out.push(if *b { '1' } else { '0' }),
        Value::Float(f) if !f.is_finite() => out.push_str("NULL"),
        Value::Int(_) | Value::Float(_) => out.push_str(&value.to_string()),
        Value::Date(_) | Value::DateTime(_) => push_quoted(out, &value.to_string()),
        Value::Blob(bytes) => {
            out.push_str("X'");
            for b in bytes {
                out.push_str(&format!("{b:02X}"));
            }
            out.push('\'');
        }
    }
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('\'');
    out.push_str(&s.replace('\'', "''"));
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values;
    use chrono::NaiveDate;

    #[test]
    fn test_quotes_are_doubled() {
        let stmt = PreparedStatement::new("INSERT INTO t VALUES (?)", &values!["it's 'quoted'"], true).unwrap();
        insta::assert_snapshot!(stmt.sql(), @"INSERT INTO t VALUES ('it''s ''quoted''')");
    }

    #[test]
    fn test_blank_to_null() {
        let on = PreparedStatement::new("SELECT ?", &values![""], true).unwrap();
        assert_eq!(on.sql(), "SELECT NULL");

        let off = PreparedStatement::new("SELECT ?", &values![""], false).unwrap();
        assert_eq!(off.sql(), "SELECT ''");
    }

    #[test]
    fn test_non_text_values() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let params = values![None::<i64>, true, 1.5, -7, day, vec![0xDE_u8, 0xAD]];
        let stmt = PreparedStatement::new("VALUES (?, ?, ?, ?, ?, ?)", &params, true).unwrap();
        insta::assert_snapshot!(stmt.sql(), @"VALUES (NULL, 1, 1.5, -7, '2024-02-29', X'DEAD')");
    }

    #[test]
    fn test_empty_params_leave_template_alone() {
        let stmt = PreparedStatement::new("SELECT ? FROM t", &[], true).unwrap();
        assert_eq!(stmt.to_string(), "SELECT ? FROM t");
    }

    #[test]
    fn test_too_few_params() {
        let err = PreparedStatement::new("SELECT ?, ?", &values![1], true).unwrap_err();
        match err {
            DbError::ParameterMismatch { placeholders, params } => {
                assert_eq!(placeholders, 2);
                assert_eq!(params, 1);
            }
            _ => panic!("Expected ParameterMismatch"),
        }
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(sql_literal(&Value::from("a'b"), true), "'a''b'");
        assert_eq!(sql_literal(&Value::from(""), false), "''");
    }

    #[test]
    fn test_non_finite_floats_render_as_null() {
        let stmt = PreparedStatement::new(
            "INSERT INTO m VALUES (?, ?, ?, ?)",
            &values![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.5],
            true,
        )
        .unwrap();
        insta::assert_snapshot!(stmt.sql(), @"INSERT INTO m VALUES (NULL, NULL, NULL, 1.5)");
    }
}
