//! Run-parameter substitution for predicates and projections.
//!
//! Workflow expressions reference run parameters as `:name`. Values are
//! substituted as literals: numbers raw, everything else single-quoted.
//! SQLite named parameters cannot be used here because predicates land
//! inside CREATE TABLE ... AS SELECT statements built from definitions.

use std::collections::BTreeMap;

use raglite_core::errors::StepError;

/// Substitute every `:name` occurrence. Unknown names are an error; a
/// literal `::` (SQL cast syntax) is left alone.
pub fn substitute(
    expr: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, StepError> {
    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;
    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        if rest.starts_with("::") {
            out.push_str("::");
            rest = &rest[2..];
            continue;
        }
        let name_len = rest[1..]
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len() - 1);
        if name_len == 0 {
            out.push(':');
            rest = &rest[1..];
            continue;
        }
        let name = &rest[1..1 + name_len];
        match params.get(name) {
            Some(value) => out.push_str(&sql_literal(value)),
            None => {
                return Err(StepError::UnknownParameter {
                    name: name.to_string(),
                })
            }
        }
        rest = &rest[1 + name_len..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Render a parameter value as a SQL literal. Integers and floats pass
/// through raw (LIMIT and arithmetic need them untyped); everything else
/// is quoted with doubled single quotes.
pub fn sql_literal(value: &str) -> String {
    if value.parse::<i64>().is_ok() || value.parse::<f64>().is_ok() {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_numbers_raw() {
        let out = substitute("LIMIT :top_k", &params(&[("top_k", "10")])).unwrap();
        assert_eq!(out, "LIMIT 10");
    }

    #[test]
    fn quotes_strings() {
        let out = substitute("name = :who", &params(&[("who", "o'brien")])).unwrap();
        assert_eq!(out, "name = 'o''brien'");
    }

    #[test]
    fn unknown_parameter_errors() {
        let err = substitute("x = :missing", &params(&[])).unwrap_err();
        assert!(matches!(err, StepError::UnknownParameter { .. }));
    }

    #[test]
    fn double_colon_cast_passes_through() {
        let out = substitute("value::TEXT", &params(&[])).unwrap();
        assert_eq!(out, "value::TEXT");
    }

    #[test]
    fn multiple_occurrences() {
        let out = substitute(
            "score >= :min AND score <= :min + 1",
            &params(&[("min", "0.5")]),
        )
        .unwrap();
        assert_eq!(out, "score >= 0.5 AND score <= 0.5 + 1");
    }

    #[test]
    fn bare_colon_is_kept() {
        let out = substitute("a : b", &params(&[])).unwrap();
        assert_eq!(out, "a : b");
    }
}
