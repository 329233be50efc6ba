//! SQL identifier validation for interpolated table names.
//!
//! Step outputs and sources come from workflow definitions, so every name
//! that lands in a CREATE/SELECT has to pass through here first.

use raglite_core::errors::StepError;

/// A valid identifier: `[A-Za-z_][A-Za-z0-9_]*`, optionally qualified with
/// a single `alias.` prefix of the same shape.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut parts = name.splitn(2, '.');
    let first = match parts.next() {
        Some(p) => p,
        None => return false,
    };
    match parts.next() {
        Some(second) => is_bare_ident(first) && is_bare_ident(second),
        None => is_bare_ident(first),
    }
}

fn is_bare_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a table name coming from a workflow definition.
pub fn require_table_name(name: &str) -> Result<&str, StepError> {
    if is_valid_table_name(name) {
        Ok(name)
    } else {
        Err(StepError::InvalidConfig {
            operation: "table".to_string(),
            message: format!("invalid table name {name:?}"),
        })
    }
}

/// Validate a bare column name.
pub fn require_column_name(name: &str) -> Result<&str, StepError> {
    if is_bare_ident(name) {
        Ok(name)
    } else {
        Err(StepError::InvalidConfig {
            operation: "column".to_string(),
            message: format!("invalid column name {name:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_qualified_names() {
        assert!(is_valid_table_name("chunks"));
        assert!(is_valid_table_name("_run_meta"));
        assert!(is_valid_table_name("corpus.raw_files"));
    }

    #[test]
    fn rejects_injection_shapes() {
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("chunks; DROP TABLE chunks"));
        assert!(!is_valid_table_name("a.b.c"));
        assert!(!is_valid_table_name("1table"));
        assert!(!is_valid_table_name("ta ble"));
    }
}
