//! Parameter and result-selector template rendering.
//!
//! Templates are JSON trees. Rendering walks the tree and resolves string
//! leaves against a scope document:
//!
//! - A string that is exactly a path (`"$.emailAddress"`) substitutes the
//!   raw value at that path, preserving its JSON type.
//! - A string that is exactly one `{{ expr }}` yields the typed result of
//!   the expression.
//! - `{{ expr }}` occurrences inside longer strings interpolate as text
//!   (`"profile#{{ $.context.userId }}"` renders to `"profile#42"`).
//!
//! `expr` is a path, or `path + <int>` evaluated as checked exact-integer
//! addition -- no floating point. Parameters render against the run context;
//! result selectors render against a step's raw result.

use serde_json::Value;
use thiserror::Error;

use crate::path::{JsonPath, PathError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from parsing or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// A referenced path is absent from the scope document.
    #[error("unresolved reference '{0}'")]
    Missing(String),

    /// An arithmetic expression addressed a non-integer value.
    #[error("expected an integer at '{0}'")]
    NotAnInteger(String),

    /// Exact-integer addition overflowed.
    #[error("integer overflow evaluating '{0}'")]
    Overflow(String),

    /// A `{{` with no matching `}}`.
    #[error("unterminated expression in '{0}'")]
    Unterminated(String),
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render a template tree against a scope document.
pub fn render(template: &Value, scope: &Value) -> Result<Value, TemplateError> {
    match template {
        Value::String(s) => render_string(s, scope),
        Value::Array(items) => {
            let rendered = items
                .iter()
                .map(|item| render(item, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(rendered))
        }
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                rendered.insert(key.clone(), render(value, scope)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

/// Check a template tree for malformed paths and expressions without a
/// scope. Used at definition-load time so template errors are load-time
/// failures, never run-time ones.
pub fn validate(template: &Value) -> Result<(), TemplateError> {
    match template {
        Value::String(s) => validate_string(s),
        Value::Array(items) => items.iter().try_for_each(validate),
        Value::Object(map) => map.values().try_for_each(validate),
        _ => Ok(()),
    }
}

/// Convert a JSON value to a display string for text interpolation.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // For objects/arrays, return compact JSON
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// String rendering
// ---------------------------------------------------------------------------

fn is_path(s: &str) -> bool {
    s == "$" || s.starts_with("$.") || s.starts_with("$[")
}

fn is_single_expression(s: &str) -> bool {
    s.starts_with("{{") && s.ends_with("}}") && s.matches("{{").count() == 1
}

fn render_string(s: &str, scope: &Value) -> Result<Value, TemplateError> {
    if is_path(s) {
        let path = JsonPath::parse(s)?;
        return path
            .read(scope)
            .cloned()
            .ok_or_else(|| TemplateError::Missing(s.to_string()));
    }

    if is_single_expression(s) {
        let inner = &s[2..s.len() - 2];
        return eval_expression(inner.trim(), scope);
    }

    // Interpolate each {{ expr }} occurrence as text.
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Unterminated(s.to_string()))?;
        let value = eval_expression(after[..end].trim(), scope)?;
        result.push_str(&value_to_string(&value));
        rest = &after[end + 2..];
    }
    result.push_str(rest);
    Ok(Value::String(result))
}

fn validate_string(s: &str) -> Result<(), TemplateError> {
    if is_path(s) {
        JsonPath::parse(s)?;
        return Ok(());
    }
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Unterminated(s.to_string()))?;
        parse_expression(after[..end].trim())?;
        rest = &after[end + 2..];
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn parse_expression(expr: &str) -> Result<(JsonPath, Option<i64>), TemplateError> {
    match expr.split_once('+') {
        Some((lhs, rhs)) => {
            let path = JsonPath::parse(lhs.trim())?;
            let addend: i64 = rhs
                .trim()
                .parse()
                .map_err(|_| TemplateError::NotAnInteger(expr.to_string()))?;
            Ok((path, Some(addend)))
        }
        None => Ok((JsonPath::parse(expr)?, None)),
    }
}

fn eval_expression(expr: &str, scope: &Value) -> Result<Value, TemplateError> {
    let (path, addend) = parse_expression(expr)?;
    let value = path
        .read(scope)
        .ok_or_else(|| TemplateError::Missing(expr.to_string()))?;

    match addend {
        None => Ok(value.clone()),
        Some(n) => {
            let base = value
                .as_i64()
                .ok_or_else(|| TemplateError::NotAnInteger(expr.to_string()))?;
            let sum = base
                .checked_add(n)
                .ok_or_else(|| TemplateError::Overflow(expr.to_string()))?;
            Ok(Value::Number(sum.into()))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Value {
        json!({
            "firstName": "A",
            "emailAddress": "a@b.com",
            "item": { "lastId": 41 },
            "context": { "userId": 42, "previousUserId": 41 },
        })
    }

    // -----------------------------------------------------------------------
    // Raw path substitution
    // -----------------------------------------------------------------------

    #[test]
    fn test_raw_path_preserves_type() {
        let rendered = render(&json!("$.item.lastId"), &scope()).unwrap();
        assert_eq!(rendered, json!(41));
    }

    #[test]
    fn test_raw_path_string_value() {
        let rendered = render(&json!("$.emailAddress"), &scope()).unwrap();
        assert_eq!(rendered, json!("a@b.com"));
    }

    #[test]
    fn test_missing_raw_path_is_an_error() {
        let err = render(&json!("$.absent"), &scope()).unwrap_err();
        assert!(matches!(err, TemplateError::Missing(_)));
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    #[test]
    fn test_single_expression_keeps_type() {
        let rendered = render(&json!("{{ $.context.userId }}"), &scope()).unwrap();
        assert_eq!(rendered, json!(42));
    }

    #[test]
    fn test_exact_integer_increment() {
        let rendered = render(&json!("{{ $.item.lastId + 1 }}"), &scope()).unwrap();
        assert_eq!(rendered, json!(42));
    }

    #[test]
    fn test_increment_rejects_non_integer() {
        let err = render(&json!("{{ $.firstName + 1 }}"), &scope()).unwrap_err();
        assert!(matches!(err, TemplateError::NotAnInteger(_)));
    }

    #[test]
    fn test_increment_overflow_is_checked() {
        let scope = json!({ "n": i64::MAX });
        let err = render(&json!("{{ $.n + 1 }}"), &scope).unwrap_err();
        assert!(matches!(err, TemplateError::Overflow(_)));
    }

    // -----------------------------------------------------------------------
    // Text interpolation
    // -----------------------------------------------------------------------

    #[test]
    fn test_interpolation_into_text() {
        let rendered = render(&json!("profile#{{ $.context.userId }}"), &scope()).unwrap();
        assert_eq!(rendered, json!("profile#42"));
    }

    #[test]
    fn test_multiple_interpolations() {
        let rendered = render(
            &json!("{{ $.firstName }} <{{ $.emailAddress }}>"),
            &scope(),
        )
        .unwrap();
        assert_eq!(rendered, json!("A <a@b.com>"));
    }

    #[test]
    fn test_plain_string_passes_through() {
        let rendered = render(&json!("error creating user"), &scope()).unwrap();
        assert_eq!(rendered, json!("error creating user"));
    }

    #[test]
    fn test_unterminated_expression_is_an_error() {
        let err = render(&json!("oops {{ $.firstName"), &scope()).unwrap_err();
        assert!(matches!(err, TemplateError::Unterminated(_)));
    }

    // -----------------------------------------------------------------------
    // Tree rendering
    // -----------------------------------------------------------------------

    #[test]
    fn test_renders_nested_objects_and_arrays() {
        let template = json!({
            "username": "{{ $.context.userId }}",
            "attributes": [
                { "name": "email", "value": "$.emailAddress" },
                { "name": "email_verified", "value": "true" },
            ],
        });
        let rendered = render(&template, &scope()).unwrap();
        assert_eq!(
            rendered,
            json!({
                "username": 42,
                "attributes": [
                    { "name": "email", "value": "a@b.com" },
                    { "name": "email_verified", "value": "true" },
                ],
            })
        );
    }

    #[test]
    fn test_non_string_leaves_pass_through() {
        let template = json!({ "statusCode": 200, "ok": true, "note": null });
        let rendered = render(&template, &scope()).unwrap();
        assert_eq!(rendered, template);
    }

    // -----------------------------------------------------------------------
    // Validation (scope-free)
    // -----------------------------------------------------------------------

    #[test]
    fn test_validate_accepts_well_formed_templates() {
        let template = json!({
            "key": "profile#{{ $.context.userId }}",
            "raw": "$.item.lastId",
            "sum": "{{ $.item.lastId + 1 }}",
        });
        assert!(validate(&template).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_path() {
        let err = validate(&json!("$.a..b")).unwrap_err();
        assert!(matches!(err, TemplateError::Path(_)));
    }

    #[test]
    fn test_validate_rejects_unterminated() {
        let err = validate(&json!("x {{ $.a")).unwrap_err();
        assert!(matches!(err, TemplateError::Unterminated(_)));
    }
}
