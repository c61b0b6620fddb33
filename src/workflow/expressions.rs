//! Expression evaluation for `${{ }}` syntax
//!
//! Supports:
//! - ${{ headers.X-Region }}
//! - ${{ metadata.source }}
//! - ${{ parameters.batch.size }}
//! - ${{ payload.order.items.0.sku }}
//! - ${{ flow.id }}, ${{ flow.correlation_id }}
//!
//! Conditions compare operands with `==`, `!=`, `>`, `<`, `>=`, `<=` and
//! combine comparisons with `&&` and `||` (`&&` binds tighter).

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::context::FlowExecutionContext;
use super::target::ConditionType;

static EXPRESSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{\s*([^}]+)\s*\}\}").unwrap());

static INDEX_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

/// Errors that can occur during expression evaluation
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Invalid expression syntax: {0}")]
    InvalidSyntax(String),

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// Values an expression can read
#[derive(Debug, Clone, Copy)]
pub struct ExpressionScope<'a> {
    pub payload: &'a Value,
    pub headers: &'a HashMap<String, String>,
    pub metadata: &'a HashMap<String, String>,
    pub parameters: &'a HashMap<String, Value>,
    pub flow_id: &'a str,
    pub execution_id: &'a str,
    pub correlation_id: &'a str,
}

impl<'a> From<&'a FlowExecutionContext> for ExpressionScope<'a> {
    fn from(ctx: &'a FlowExecutionContext) -> Self {
        Self {
            payload: &ctx.payload,
            headers: &ctx.headers,
            metadata: &ctx.metadata,
            parameters: &ctx.parameters,
            flow_id: &ctx.flow_id,
            execution_id: &ctx.execution_id,
            correlation_id: &ctx.correlation_id,
        }
    }
}

/// Evaluate all expressions in a string
pub fn evaluate(input: &str, scope: &ExpressionScope<'_>) -> Result<String, ExpressionError> {
    let mut result = input.to_string();

    for cap in EXPRESSION_REGEX.captures_iter(input) {
        let (Some(full_match), Some(expr)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = resolve(expr.as_str().trim(), scope)?;
        result = result.replace(full_match.as_str(), &value_to_string(&value));
    }

    Ok(result)
}

/// Resolve a single expression (without the ${{ }} wrapper)
///
/// Missing keys in a known scope resolve to null; unknown scopes are errors.
pub fn resolve(expr: &str, scope: &ExpressionScope<'_>) -> Result<Value, ExpressionError> {
    let expr = expr.trim();
    let (root, rest) = match expr.split_once('.') {
        Some((root, rest)) => (root, Some(rest)),
        None => (expr, None),
    };

    match (root, rest) {
        ("payload", None) => Ok(scope.payload.clone()),
        ("payload", Some(path)) => Ok(lookup_path(scope.payload, path).cloned().unwrap_or(Value::Null)),

        ("headers", Some(name)) => Ok(find_ignore_case(scope.headers, name)
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null)),

        ("metadata", Some(name)) => Ok(find_ignore_case(scope.metadata, name)
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null)),

        ("parameters", Some(path)) => {
            let (key, nested) = match path.split_once('.') {
                Some((key, nested)) => (key, Some(nested)),
                None => (path, None),
            };
            let value = scope.parameters.get(key);
            Ok(match (value, nested) {
                (Some(v), None) => v.clone(),
                (Some(v), Some(nested)) => lookup_path(v, nested).cloned().unwrap_or(Value::Null),
                (None, _) => Value::Null,
            })
        }

        ("flow", Some("id")) => Ok(Value::String(scope.flow_id.to_string())),
        ("flow", Some("execution_id")) => Ok(Value::String(scope.execution_id.to_string())),
        ("flow", Some("correlation_id")) => Ok(Value::String(scope.correlation_id.to_string())),

        ("headers" | "metadata" | "parameters" | "flow", None) => Err(
            ExpressionError::InvalidSyntax(format!("{} expressions need a key, got: {}", root, expr)),
        ),

        _ => Err(ExpressionError::UnknownVariable(expr.to_string())),
    }
}

fn find_ignore_case<'m>(map: &'m HashMap<String, String>, key: &str) -> Option<&'m String> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Walk a dotted path (`a.b.0`, `a.b[0]`) into a JSON value
pub fn lookup_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let normalized = INDEX_REGEX.replace_all(path, ".$1");
    let mut current = value;

    for segment in normalized.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a value the way it appears in interpolated text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let lower = s.to_lowercase();
            !s.is_empty() && lower != "false" && lower != "0" && lower != "null" && lower != "none"
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Check if a condition expression evaluates to true
pub fn evaluate_condition(
    condition: &str,
    scope: &ExpressionScope<'_>,
) -> Result<bool, ExpressionError> {
    let condition = condition.trim();
    if condition.is_empty() {
        return Err(ExpressionError::InvalidSyntax("empty condition".to_string()));
    }

    for disjunct in split_top_level(condition, "||") {
        let mut all = true;
        for conjunct in split_top_level(disjunct, "&&") {
            if !evaluate_comparison(conjunct.trim(), scope)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

fn evaluate_comparison(expr: &str, scope: &ExpressionScope<'_>) -> Result<bool, ExpressionError> {
    if expr.is_empty() {
        return Err(ExpressionError::InvalidSyntax(
            "dangling && or || in condition".to_string(),
        ));
    }

    let Some((index, op)) = find_operator(expr) else {
        return match expr {
            "always()" | "true" => Ok(true),
            "false" => Ok(false),
            _ => Ok(is_truthy(&operand(expr, scope)?)),
        };
    };

    let left = operand(expr[..index].trim(), scope)?;
    let right = operand(expr[index + op.len()..].trim(), scope)?;

    match op {
        "==" => Ok(loosely_equal(&left, &right)),
        "!=" => Ok(!loosely_equal(&left, &right)),
        _ => {
            let (Some(l), Some(r)) = (as_number(&left), as_number(&right)) else {
                return Err(ExpressionError::InvalidSyntax(format!(
                    "'{}' compares non-numeric operands",
                    expr
                )));
            };
            Ok(match op {
                ">" => l > r,
                "<" => l < r,
                ">=" => l >= r,
                _ => l <= r,
            })
        }
    }
}

/// Turn one side of a comparison into a value
fn operand(text: &str, scope: &ExpressionScope<'_>) -> Result<Value, ExpressionError> {
    if text.is_empty() {
        return Err(ExpressionError::InvalidSyntax("missing operand".to_string()));
    }

    if let Some(cap) = EXPRESSION_REGEX.captures(text) {
        if let (Some(whole), Some(expr)) = (cap.get(0), cap.get(1)) {
            if whole.as_str().len() == text.len() {
                return resolve(expr.as_str().trim(), scope);
            }
        }
        return Ok(Value::String(evaluate(text, scope)?));
    }

    let unquoted = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .or_else(|| text.strip_prefix('"').and_then(|t| t.strip_suffix('"')));
    if let Some(s) = unquoted {
        return Ok(Value::String(s.to_string()));
    }

    Ok(match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l == r;
    }
    value_to_string(left) == value_to_string(right)
}

/// Byte ranges of `${{ }}` blocks and quoted strings, skipped when scanning
fn protected_ranges(input: &str) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = EXPRESSION_REGEX
        .find_iter(input)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut quote: Option<(char, usize)> = None;
    for (i, c) in input.char_indices() {
        if ranges.iter().any(|(s, e)| i >= *s && i < *e) {
            continue;
        }
        match quote {
            Some((q, start)) if c == q => {
                ranges.push((start, i + 1));
                quote = None;
            }
            None if c == '\'' || c == '"' => quote = Some((c, i)),
            _ => {}
        }
    }
    ranges
}

fn split_top_level<'s>(input: &'s str, separator: &str) -> Vec<&'s str> {
    let protected = protected_ranges(input);
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < input.len() {
        let in_protected = protected.iter().any(|(s, e)| i >= *s && i < *e);
        if !in_protected && input[i..].starts_with(separator) {
            parts.push(&input[start..i]);
            i += separator.len();
            start = i;
        } else {
            i += input[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        }
    }
    parts.push(&input[start..]);
    parts
}

fn find_operator(input: &str) -> Option<(usize, &'static str)> {
    let protected = protected_ranges(input);
    let mut i = 0;

    while i < input.len() {
        let in_protected = protected.iter().any(|(s, e)| i >= *s && i < *e);
        if !in_protected {
            if let Some(op) = OPERATORS.iter().find(|op| input[i..].starts_with(**op)) {
                return Some((i, op));
            }
        }
        i += input[i..].chars().next().map(char::len_utf8).unwrap_or(1);
    }
    None
}

fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decide whether a target's routing condition admits the current payload
pub fn evaluate_routing(
    condition_type: ConditionType,
    condition: Option<&str>,
    scope: &ExpressionScope<'_>,
) -> Result<bool, ExpressionError> {
    let condition = condition.map(str::trim).unwrap_or_default();
    if condition_type == ConditionType::Always {
        return Ok(true);
    }
    if condition.is_empty() {
        return Err(ExpressionError::InvalidSyntax(format!(
            "{:?} routing requires a condition",
            condition_type
        )));
    }

    match condition_type {
        ConditionType::Always => Ok(true),

        ConditionType::Expression => evaluate_condition(condition, scope),

        ConditionType::HeaderMatch => match condition.split_once('=') {
            Some((name, expected)) => Ok(find_ignore_case(scope.headers, name.trim())
                .map(|actual| actual == expected.trim())
                .unwrap_or(false)),
            None => Ok(find_ignore_case(scope.headers, condition).is_some()),
        },

        ConditionType::ContentContains => Ok(payload_text(scope.payload).contains(condition)),

        ConditionType::Regex => {
            let regex = Regex::new(condition).map_err(|e| ExpressionError::InvalidRegex {
                pattern: condition.to_string(),
                message: e.to_string(),
            })?;
            Ok(regex.is_match(&payload_text(scope.payload)))
        }

        ConditionType::JsonPath => {
            let (path, comparison) = match find_operator(condition) {
                Some((index, op)) if op == "==" || op == "!=" => (
                    condition[..index].trim(),
                    Some((op, condition[index + op.len()..].trim())),
                ),
                Some((_, op)) => {
                    return Err(ExpressionError::InvalidSyntax(format!(
                        "JSON path conditions support == and !=, got {}",
                        op
                    )))
                }
                None => (condition, None),
            };

            let path = path
                .strip_prefix('$')
                .ok_or_else(|| ExpressionError::InvalidSyntax(format!("'{}' must start with $", path)))?;
            let found = lookup_path(scope.payload, path).cloned().unwrap_or(Value::Null);

            match comparison {
                None => Ok(is_truthy(&found)),
                Some((op, expected)) => {
                    let equal = loosely_equal(&found, &operand(expected, scope)?);
                    Ok(if op == "==" { equal } else { !equal })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_context() -> FlowExecutionContext {
        FlowExecutionContext::new(
            "orders",
            json!({
                "order": { "id": 42, "total": 150.5, "region": "EU", "items": [{"sku": "A-1"}] },
                "priority": "high"
            }),
        )
        .with_header("X-Region", "EU")
        .with_header("X-Tenant", "acme")
        .with_parameter("limit", 100)
        .with_correlation_id("corr-9")
    }

    #[test]
    fn test_evaluate_interpolation() {
        let ctx = test_context();
        let scope = ExpressionScope::from(&ctx);
        let result = evaluate(
            "${{ flow.id }}/${{ payload.order.id }}?tenant=${{ headers.x-tenant }}",
            &scope,
        )
        .unwrap();
        assert_eq!(result, "orders/42?tenant=acme");
    }

    #[test]
    fn test_resolve_paths() {
        let ctx = test_context();
        let scope = ExpressionScope::from(&ctx);
        assert_eq!(resolve("payload.order.items[0].sku", &scope).unwrap(), json!("A-1"));
        assert_eq!(resolve("payload.order.items.0.sku", &scope).unwrap(), json!("A-1"));
        assert_eq!(resolve("payload.missing", &scope).unwrap(), Value::Null);
        assert_eq!(resolve("flow.correlation_id", &scope).unwrap(), json!("corr-9"));
        assert!(matches!(
            resolve("secrets.TOKEN", &scope),
            Err(ExpressionError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_condition_equality() {
        let ctx = test_context();
        let scope = ExpressionScope::from(&ctx);
        assert!(evaluate_condition("${{ headers.X-Region }} == 'EU'", &scope).unwrap());
        assert!(!evaluate_condition("${{ headers.X-Region }} == 'US'", &scope).unwrap());
        assert!(evaluate_condition("${{ headers.X-Region }} != 'US'", &scope).unwrap());
        assert!(evaluate_condition("${{ payload.order.id }} == 42", &scope).unwrap());
    }

    #[test]
    fn test_condition_numeric_and_logic() {
        let ctx = test_context();
        let scope = ExpressionScope::from(&ctx);
        assert!(evaluate_condition("${{ payload.order.total }} > 100", &scope).unwrap());
        assert!(evaluate_condition("${{ parameters.limit }} <= 100", &scope).unwrap());
        assert!(evaluate_condition(
            "${{ payload.order.total }} < 10 || ${{ payload.priority }} == 'high'",
            &scope
        )
        .unwrap());
        assert!(!evaluate_condition(
            "${{ payload.order.total }} > 100 && ${{ headers.X-Region }} == 'US'",
            &scope
        )
        .unwrap());
        assert!(evaluate_condition("${{ payload.priority }} > 3", &scope).is_err());
    }

    #[test]
    fn test_quoted_operators_are_literal() {
        let ctx = FlowExecutionContext::new("f", json!({"note": "a || b"}));
        let scope = ExpressionScope::from(&ctx);
        assert!(evaluate_condition("${{ payload.note }} == 'a || b'", &scope).unwrap());
    }

    #[test]
    fn test_truthiness() {
        let ctx = test_context();
        let scope = ExpressionScope::from(&ctx);
        assert!(evaluate_condition("${{ payload.priority }}", &scope).unwrap());
        assert!(!evaluate_condition("${{ payload.missing }}", &scope).unwrap());
        assert!(evaluate_condition("always()", &scope).unwrap());
    }

    #[test]
    fn test_routing_condition_types() {
        let ctx = test_context();
        let scope = ExpressionScope::from(&ctx);

        assert!(evaluate_routing(ConditionType::Always, None, &scope).unwrap());
        assert!(evaluate_routing(ConditionType::HeaderMatch, Some("x-region=EU"), &scope).unwrap());
        assert!(!evaluate_routing(ConditionType::HeaderMatch, Some("X-Region=US"), &scope).unwrap());
        assert!(evaluate_routing(ConditionType::HeaderMatch, Some("X-Tenant"), &scope).unwrap());
        assert!(evaluate_routing(ConditionType::ContentContains, Some("A-1"), &scope).unwrap());
        assert!(evaluate_routing(ConditionType::Regex, Some(r#""sku":"A-\d""#), &scope).unwrap());
        assert!(evaluate_routing(ConditionType::JsonPath, Some("$.order.region == 'EU'"), &scope).unwrap());
        assert!(evaluate_routing(ConditionType::JsonPath, Some("$.order.items"), &scope).unwrap());
        assert!(!evaluate_routing(ConditionType::JsonPath, Some("$.order.coupon"), &scope).unwrap());
    }

    #[test]
    fn test_routing_errors() {
        let ctx = test_context();
        let scope = ExpressionScope::from(&ctx);
        assert!(matches!(
            evaluate_routing(ConditionType::Regex, Some("(unclosed"), &scope),
            Err(ExpressionError::InvalidRegex { .. })
        ));
        assert!(evaluate_routing(ConditionType::Expression, None, &scope).is_err());
        assert!(evaluate_routing(ConditionType::JsonPath, Some("order.id"), &scope).is_err());
    }
}
