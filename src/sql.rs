use crate::core::{DbError, Result};

/// Placeholder Translation
///
/// SQL templates handed to dbkit use a bare `?` for every parameter. Drivers
/// want their own positional syntax, so templates are rewritten here before
/// they reach the driver. Parameter values are never touched; binding them
/// safely is the driver's job.

/// The character that marks a parameter in a dbkit SQL template.
pub const PLACEHOLDER: char = '?';

/// Native positional placeholder syntax of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `%s` for every parameter (pyformat drivers such as pymssql)
    Format,
    /// `?1`, `?2`, ... (SQLite)
    Numbered,
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,
}

impl PlaceholderStyle {
    /// Writes the native token for the parameter at `index` (zero based).
    fn write_token(self, out: &mut String, index: usize) {
        match self {
            PlaceholderStyle::Format => out.push_str("%s"),
            PlaceholderStyle::Numbered => out.push_str(&format!("?{}", index + 1)),
            PlaceholderStyle::Dollar => out.push_str(&format!("${}", index + 1)),
        }
    }
}

/// Counts the placeholder markers in a template.
///
/// There is no escaping, so every `?` counts, including ones inside string
/// literals or comments.
pub fn count_placeholders(sql: &str) -> usize {
    sql.chars().filter(|&c| c == PLACEHOLDER).count()
}

/// Rewrites every `?` in `sql` into the native token of `style`.
///
/// # Arguments
///
/// * `sql` - Template using `?` markers
/// * `param_count` - How many parameters will be bound alongside
/// * `style` - The driver's placeholder syntax
///
/// # Errors
///
/// Returns `DbError::ParameterMismatch` when the template holds more markers
/// than `param_count`. Surplus parameters are left for the driver to reject.
///
/// # Examples
///
/// ```
/// use dbkit::sql::{translate_placeholders, PlaceholderStyle};
///
/// let sql = translate_placeholders("SELECT * FROM t WHERE a = ? AND b = ?", 2, PlaceholderStyle::Dollar).unwrap();
/// assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
/// ```
pub fn translate_placeholders(sql: &str, param_count: usize, style: PlaceholderStyle) -> Result<String> {
    let placeholders = count_placeholders(sql);
    if placeholders > param_count {
        return Err(DbError::ParameterMismatch {
            placeholders,
            params: param_count,
        });
    }

    let mut out = String::with_capacity(sql.len() + placeholders * 2);
    let mut index = 0;
    for c in sql.chars() {
        if c == PLACEHOLDER {
            style.write_token(&mut out, index);
            index += 1;
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_style() {
        let sql = translate_placeholders("INSERT INTO t VALUES (?, ?)", 2, PlaceholderStyle::Format).unwrap();
        assert_eq!(sql, "INSERT INTO t VALUES (%s, %s)");
    }

    #[test]
    fn test_numbered_style() {
        let sql = translate_placeholders("UPDATE t SET a = ? WHERE id = ?", 2, PlaceholderStyle::Numbered).unwrap();
        assert_eq!(sql, "UPDATE t SET a = ?1 WHERE id = ?2");
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let sql = "SELECT 1";
        assert_eq!(translate_placeholders(sql, 0, PlaceholderStyle::Dollar).unwrap(), sql);
    }

    #[test]
    fn test_marker_inside_literal_is_still_a_marker() {
        let sql = translate_placeholders("SELECT '?' , ?", 2, PlaceholderStyle::Numbered).unwrap();
        assert_eq!(sql, "SELECT '?1' , ?2");
    }

    #[test]
    fn test_too_few_params() {
        match translate_placeholders("SELECT ?, ?, ?", 2, PlaceholderStyle::Format) {
            Err(DbError::ParameterMismatch { placeholders, params }) => {
                assert_eq!(placeholders, 3);
                assert_eq!(params, 2);
            }
            other => panic!("Expected ParameterMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_surplus_params_are_left_to_driver() {
        assert!(translate_placeholders("SELECT ?", 3, PlaceholderStyle::Format).is_ok());
    }

    #[test]
    fn test_multibyte_text_is_preserved() {
        let sql = translate_placeholders("SELECT 'héllo ✓', ?", 1, PlaceholderStyle::Dollar).unwrap();
        assert_eq!(sql, "SELECT 'héllo ✓', $1");
    }
}
