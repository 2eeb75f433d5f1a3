//! Filter Validator
//!
//! Walks a `FilterNode` tree and emits errors (block execution) and
//! warnings (advisory only).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::filter::{ComparisonOp, FilterNode, FilterValue, LogicalOp, Operator};

const MAX_DEPTH_WARNING: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub field: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, code: &str, message: impl Into<String>, field: impl Into<String>) {
        self.errors.push(ValidationIssue { code: code.to_string(), message: message.into(), field: field.into() });
    }

    fn warning(&mut self, code: &str, message: impl Into<String>, field: impl Into<String>) {
        self.warnings.push(ValidationIssue { code: code.to_string(), message: message.into(), field: field.into() });
    }
}

/// Validates a filter tree, returning a result with `isValid = errors.is_empty()`.
pub fn validate(node: &FilterNode) -> ValidationResult {
    let mut result = ValidationResult::default();
    walk(node, 0, &mut result);
    result
}

fn walk(node: &FilterNode, depth: usize, result: &mut ValidationResult) {
    if depth > MAX_DEPTH_WARNING {
        result.warning("excessive_nesting", format!("filter nests {depth} levels deep"), node.field.clone());
    }

    match node.operator {
        Operator::Logical(LogicalOp::And) | Operator::Logical(LogicalOp::Or) => {
            if node.children.len() < 2 {
                result.error("invalid_shape", "and/or nodes require at least 2 children", "");
            }
            check_redundant_siblings(&node.children, result);
        }
        Operator::Logical(LogicalOp::Not) => {
            if node.children.len() != 1 {
                result.error("invalid_shape", "not nodes require exactly 1 child", "");
            }
        }
        Operator::Comparison(op) => validate_comparison(node, op, result),
        Operator::Spatial(_) => {
            tracing::debug!(field = %node.field, operator = node.operator.name(), "rejected unsupported spatial operator");
            result.error(
                "unsupported_operator",
                format!("spatial operator '{}' is not supported", node.operator.name()),
                node.field.clone(),
            );
        }
        Operator::Temporal(_) | Operator::Semantic(_) => {
            if node.field.is_empty() {
                result.error("invalid_shape", "field must be non-empty", "");
            }
        }
    }

    if !node.is_logical() && node.field.is_empty() {
        result.error("invalid_shape", "comparison nodes require a non-empty field", "");
    }

    for child in &node.children {
        walk(child, depth + 1, result);
    }
}

fn validate_comparison(node: &FilterNode, op: ComparisonOp, result: &mut ValidationResult) {
    match op {
        ComparisonOp::In | ComparisonOp::NotIn => {
            if node.value.as_array().is_none() {
                result.error("invalid_value", format!("{} requires an array value", node.operator.name()), node.field.clone());
            }
        }
        ComparisonOp::Between => match node.value.as_array() {
            Some(items) if items.len() == 2 => {}
            _ => result.error("invalid_value", "between requires an array of exactly 2 values", node.field.clone()),
        },
        ComparisonOp::Regex => match node.value.as_str_coerced() {
            Some(pattern) => {
                match Regex::new(&pattern) {
                    Ok(_) => {
                        if pattern.starts_with(".*") || pattern.starts_with("^.*") {
                            result.warning("inefficient_regex", "leading wildcard regex scans every candidate", node.field.clone());
                        }
                    }
                    Err(e) => result.error("invalid_regex", e.to_string(), node.field.clone()),
                }
            }
            None => result.error("invalid_value", "regex requires a string pattern", node.field.clone()),
        },
        ComparisonOp::Gt | ComparisonOp::Lt | ComparisonOp::Ge | ComparisonOp::Le => {
            if node.value.as_f64().is_none() {
                result.warning("type_mismatch", "numeric operator used with non-numeric literal", node.field.clone());
            }
        }
        _ => {}
    }
}

fn check_redundant_siblings(children: &[FilterNode], result: &mut ValidationResult) {
    let mut seen: HashSet<(String, &'static str, String)> = HashSet::new();
    for child in children {
        let key = (child.field.clone(), child.operator.name(), format_value(&child.value));
        if !seen.insert(key) {
            result.warning("redundant_filters", "duplicate (field, operator, value) among siblings", child.field.clone());
        }
    }
}

fn format_value(value: &FilterValue) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
