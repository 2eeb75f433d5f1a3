//! Filter Executor
//!
//! Evaluates a `FilterNode` tree against in-memory `Memory` rows, or
//! translates a supported subset of it into a parameterized SQL `WHERE`
//! clause for pushdown.

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::filter::{ComparisonOp, FilterNode, FilterValue, LogicalOp, Operator};
use crate::memory::{JsonValue, Memory};

/// In-memory evaluator.
pub struct Executor;

impl Executor {
    /// Filters `rows`, keeping those that satisfy `node`.
    pub fn execute<'a>(node: &FilterNode, rows: &'a [Memory]) -> Vec<&'a Memory> {
        rows.iter().filter(|row| Self::eval(node, row)).collect()
    }

    fn eval(node: &FilterNode, memory: &Memory) -> bool {
        match node.operator {
            Operator::Logical(LogicalOp::And) => node.children.iter().all(|c| Self::eval(c, memory)),
            Operator::Logical(LogicalOp::Or) => node.children.iter().any(|c| Self::eval(c, memory)),
            Operator::Logical(LogicalOp::Not) => {
                node.children.first().map(|c| !Self::eval(c, memory)).unwrap_or(true)
            }
            Operator::Comparison(op) => Self::eval_comparison(op, node, memory),
            Operator::Temporal(op) => Self::eval_temporal(op, node, memory),
            Operator::Spatial(_) => false,
            Operator::Semantic(_) => false,
        }
    }

    fn eval_comparison(op: ComparisonOp, node: &FilterNode, memory: &Memory) -> bool {
        let actual = resolve_field(memory, &node.field);
        match op {
            ComparisonOp::Eq => values_equal(&node.value, actual.as_ref()),
            ComparisonOp::Ne => !values_equal(&node.value, actual.as_ref()),
            ComparisonOp::Gt | ComparisonOp::Lt | ComparisonOp::Ge | ComparisonOp::Le => {
                match (actual.as_ref().and_then(JsonValue::as_f64), node.value.as_f64()) {
                    (Some(a), Some(b)) => match op {
                        ComparisonOp::Gt => a > b,
                        ComparisonOp::Lt => a < b,
                        ComparisonOp::Ge => a >= b,
                        ComparisonOp::Le => a <= b,
                        _ => unreachable!(),
                    },
                    _ => false,
                }
            }
            ComparisonOp::Contains | ComparisonOp::StartsWith | ComparisonOp::EndsWith => {
                match (actual.as_ref().and_then(JsonValue::as_str_coerced), node.value.as_str_coerced()) {
                    (Some(a), Some(b)) => match op {
                        ComparisonOp::Contains => a.contains(&b),
                        ComparisonOp::StartsWith => a.starts_with(&b),
                        ComparisonOp::EndsWith => a.ends_with(&b),
                        _ => unreachable!(),
                    },
                    _ => false,
                }
            }
            ComparisonOp::Like => match actual.as_ref().and_then(JsonValue::as_str_coerced) {
                Some(a) => match node.value.as_str_coerced() {
                    Some(pattern) => like_regex(&pattern).map(|re| re.is_match(&a)).unwrap_or(false),
                    None => false,
                },
                None => false,
            },
            ComparisonOp::Regex => match actual.as_ref().and_then(JsonValue::as_str_coerced) {
                Some(a) => match node.value.as_str_coerced().and_then(|p| Regex::new(&p).ok()) {
                    Some(re) => re.is_match(&a),
                    None => false,
                },
                None => false,
            },
            ComparisonOp::In | ComparisonOp::NotIn => {
                let membership = match node.value.as_array() {
                    Some(items) => items.iter().any(|item| values_equal(item, actual.as_ref())),
                    None => false,
                };
                if matches!(op, ComparisonOp::In) {
                    membership
                } else {
                    !membership
                }
            }
            ComparisonOp::Between => match node.value.as_array() {
                Some([low, high]) => match (actual.as_ref().and_then(JsonValue::as_f64), low.as_f64(), high.as_f64()) {
                    (Some(a), Some(lo), Some(hi)) => a >= lo && a <= hi,
                    _ => false,
                },
                _ => false,
            },
        }
    }

    fn eval_temporal(op: crate::filter::TemporalOp, node: &FilterNode, memory: &Memory) -> bool {
        use crate::filter::TemporalOp::*;
        let actual_instant = resolve_field(memory, &node.field)
            .and_then(|v| v.as_str_coerced())
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        match op {
            Before | After => match (actual_instant, node.value.as_str_coerced().and_then(|s| DateTime::parse_from_rfc3339(&s).ok())) {
                (Some(a), Some(b)) => {
                    let b = b.with_timezone(&Utc);
                    if matches!(op, Before) { a < b } else { a > b }
                }
                _ => false,
            },
            Within => match (actual_instant, node.value.as_f64()) {
                (Some(a), Some(days)) => {
                    let age_days = (Utc::now() - a).num_seconds() as f64 / 86_400.0;
                    age_days.abs() <= days
                }
                _ => false,
            },
            AgeLt | AgeGt => match (actual_instant, node.value.as_f64()) {
                (Some(a), Some(target)) => {
                    let age_days = (Utc::now() - a).num_seconds() as f64 / 86_400.0;
                    if matches!(op, AgeLt) { age_days < target } else { age_days > target }
                }
                _ => false,
            },
        }
    }
}

fn like_regex(pattern: &str) -> Option<Regex> {
    let mut regex_pattern = String::from("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            c if regex_syntax::is_meta_character(c) => {
                regex_pattern.push('\\');
                regex_pattern.push(c);
            }
            c => regex_pattern.push(c),
        }
    }
    regex_pattern.push('$');
    Regex::new(&regex_pattern).ok()
}

/// Resolves a dotted field path against either a known top-level `Memory`
/// column or, failing that, `processedData`. Returns `None` ("undefined")
/// when nothing resolves.
pub fn resolve_field(memory: &Memory, field: &str) -> Option<JsonValue> {
    let (head, rest) = match field.split_once('.') {
        Some((h, r)) => (h, Some(r)),
        None => (field, None),
    };

    let top_level = match head {
        "id" => Some(JsonValue::String(memory.id.clone())),
        "namespace" => Some(JsonValue::String(memory.namespace.clone())),
        "searchableContent" => Some(JsonValue::String(memory.searchable_content.clone())),
        "summary" => Some(JsonValue::String(memory.summary.clone())),
        "classification" => Some(JsonValue::String(memory.classification.as_str().to_string())),
        "importance" => Some(JsonValue::String(memory.importance.as_str().to_string())),
        "importanceScore" => Some(JsonValue::Number(memory.importance_score)),
        "confidenceScore" => Some(JsonValue::Number(memory.confidence_score)),
        "topic" => memory.topic.clone().map(JsonValue::String),
        "entities" => Some(JsonValue::Array(memory.entities.iter().cloned().map(JsonValue::String).collect())),
        "keywords" => Some(JsonValue::Array(memory.keywords.iter().cloned().map(JsonValue::String).collect())),
        "categoryPrimary" => Some(JsonValue::String(memory.category_primary.clone())),
        "classificationReason" => Some(JsonValue::String(memory.classification_reason.clone())),
        "retentionType" => Some(JsonValue::String(memory.retention_type.as_str().to_string())),
        "extractionTimestamp" => Some(JsonValue::String(memory.extraction_timestamp.to_rfc3339())),
        "createdAt" => Some(JsonValue::String(memory.created_at.to_rfc3339())),
        "duplicateOf" => memory.duplicate_of.clone().map(JsonValue::String),
        _ => None,
    };

    match (top_level, rest) {
        (Some(value), None) => Some(value),
        (Some(value), Some(path)) => value.get_path(path).cloned(),
        (None, _) => memory.metadata_path(field).cloned(),
    }
}

fn values_equal(expected: &FilterValue, actual: Option<&JsonValue>) -> bool {
    match actual {
        None => matches!(expected, FilterValue::Null),
        Some(JsonValue::Null) => matches!(expected, FilterValue::Null),
        Some(actual) => match expected {
            FilterValue::Null => false,
            FilterValue::Bool(b) => matches!(actual, JsonValue::Bool(a) if a == b),
            FilterValue::Number(n) => actual.as_f64().map(|a| (a - n).abs() < f64::EPSILON).unwrap_or(false),
            FilterValue::String(s) => actual.as_str_coerced().map(|a| &a == s).unwrap_or(false),
            FilterValue::Array(_) => false,
        },
    }
}

/// Result of translating a filter subtree into SQL.
#[derive(Debug, Clone)]
pub struct SqlPushdown {
    pub sql: String,
    pub parameters: Vec<rusqlite::types::Value>,
    pub estimated_cost: u32,
    pub can_use_index: bool,
}

/// Only `eq`, `gt`, `lt`, `ge`, `le`, `between`, `in`, `contains`, `and`,
/// `or` on non-nested fields are pushed down; anything else degrades to an
/// always-true predicate so the executor finishes the job in memory.
pub fn to_sql(node: &FilterNode) -> SqlPushdown {
    let mut parameters = Vec::new();
    let sql = build_sql(node, &mut parameters);
    let can_use_index = is_fully_pushdownable(node);
    SqlPushdown { sql, parameters, estimated_cost: crate::filter::optimizer::estimate_cost(node), can_use_index }
}

fn is_fully_pushdownable(node: &FilterNode) -> bool {
    match node.operator {
        Operator::Logical(LogicalOp::And) | Operator::Logical(LogicalOp::Or) => {
            node.children.iter().all(is_fully_pushdownable)
        }
        Operator::Comparison(op) => {
            !node.field.contains('.')
                && matches!(
                    op,
                    ComparisonOp::Eq
                        | ComparisonOp::Gt
                        | ComparisonOp::Lt
                        | ComparisonOp::Ge
                        | ComparisonOp::Le
                        | ComparisonOp::Between
                        | ComparisonOp::In
                        | ComparisonOp::Contains
                )
        }
        _ => false,
    }
}

fn build_sql(node: &FilterNode, parameters: &mut Vec<rusqlite::types::Value>) -> String {
    if !is_fully_pushdownable(node) {
        return "1=1".to_string();
    }

    match node.operator {
        Operator::Logical(LogicalOp::And) => {
            let parts: Vec<String> = node.children.iter().map(|c| build_sql(c, parameters)).collect();
            format!("({})", parts.join(" AND "))
        }
        Operator::Logical(LogicalOp::Or) => {
            let parts: Vec<String> = node.children.iter().map(|c| build_sql(c, parameters)).collect();
            format!("({})", parts.join(" OR "))
        }
        Operator::Comparison(op) => {
            let column = format!("json_extract(processed_data,'{}')", json_path(&node.field));
            match op {
                ComparisonOp::Eq => {
                    parameters.push(filter_value_to_sql(&node.value));
                    format!("{column} = ?")
                }
                ComparisonOp::Gt => {
                    parameters.push(filter_value_to_sql(&node.value));
                    format!("CAST({column} AS REAL) > ?")
                }
                ComparisonOp::Lt => {
                    parameters.push(filter_value_to_sql(&node.value));
                    format!("CAST({column} AS REAL) < ?")
                }
                ComparisonOp::Ge => {
                    parameters.push(filter_value_to_sql(&node.value));
                    format!("CAST({column} AS REAL) >= ?")
                }
                ComparisonOp::Le => {
                    parameters.push(filter_value_to_sql(&node.value));
                    format!("CAST({column} AS REAL) <= ?")
                }
                ComparisonOp::Between => {
                    if let Some([low, high]) = node.value.as_array() {
                        parameters.push(filter_value_to_sql(low));
                        parameters.push(filter_value_to_sql(high));
                        format!("CAST({column} AS REAL) BETWEEN ? AND ?")
                    } else {
                        "1=1".to_string()
                    }
                }
                ComparisonOp::In => {
                    if let Some(items) = node.value.as_array() {
                        let placeholders = vec!["?"; items.len()].join(",");
                        for item in items {
                            parameters.push(filter_value_to_sql(item));
                        }
                        format!("{column} IN ({placeholders})")
                    } else {
                        "1=1".to_string()
                    }
                }
                ComparisonOp::Contains => {
                    let text = node.value.as_str_coerced().unwrap_or_default();
                    parameters.push(rusqlite::types::Value::Text(format!("%{text}%")));
                    format!("{column} LIKE ?")
                }
                _ => "1=1".to_string(),
            }
        }
        _ => "1=1".to_string(),
    }
}

fn filter_value_to_sql(value: &FilterValue) -> rusqlite::types::Value {
    match value {
        FilterValue::Null => rusqlite::types::Value::Null,
        FilterValue::Bool(b) => rusqlite::types::Value::Integer(*b as i64),
        FilterValue::Number(n) => rusqlite::types::Value::Real(*n),
        FilterValue::String(s) => rusqlite::types::Value::Text(s.clone()),
        FilterValue::Array(_) => rusqlite::types::Value::Null,
    }
}

/// Whitelists a field path and renders it as a JSON path, nested segments
/// joined as `$.a.$.b.$.c` per the metadata strategy's predicate table.
fn json_path(field: &str) -> String {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex");
    let segments: Vec<&str> = field.split('.').collect();
    if segments.iter().all(|s| re.is_match(s)) {
        format!("$.{}", segments.join(".$."))
    } else {
        "$.invalid_field".to_string()
    }
}

mod regex_syntax {
    pub fn is_meta_character(c: char) -> bool {
        matches!(c, '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\')
    }
}
