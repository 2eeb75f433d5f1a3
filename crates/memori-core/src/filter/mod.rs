//! Filter AST & operators
//!
//! A `FilterNode` is a value object: built per query, walked by the
//! validator and optimizer, evaluated (or translated to SQL) by the
//! executor, then discarded.

pub mod executor;
pub mod optimizer;
pub mod parser;
pub mod validator;

pub use executor::{Executor, SqlPushdown};
pub use optimizer::{optimize, OptimizedChain, OptimizerContext};
pub use parser::Parser;
pub use validator::{validate, ValidationResult};

use serde::{Deserialize, Serialize};

/// A typed filter value. Distinct from `JsonValue` because filter literals
/// never need object/nested-array shapes — only scalars and flat lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<FilterValue>),
}

impl FilterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Number(n) => Some(*n),
            FilterValue::String(s) => s.trim().parse().ok(),
            FilterValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str_coerced(&self) -> Option<String> {
        match self {
            FilterValue::String(s) => Some(s.clone()),
            FilterValue::Number(n) => Some(format!("{n}")),
            FilterValue::Bool(b) => Some(b.to_string()),
            FilterValue::Null => None,
            FilterValue::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FilterValue]> {
        match self {
            FilterValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

/// Comparison operators, valid on `Comparison` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Between,
    Like,
    Regex,
}

/// Logical operators, valid on `Logical` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Temporal operators, valid on `Temporal` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalOp {
    Before,
    After,
    Within,
    AgeLt,
    AgeGt,
}

/// Spatial operators. Never executed: the validator rejects them at parse
/// time (Open Question resolution, see design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialOp {
    Near,
    WithinRadius,
    ContainsPoint,
}

/// Semantic operators, valid on `Semantic` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticOp {
    SimilarTo,
    RelatedTo,
}

/// The operator carried by a node, tagged by which group it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "group", rename_all = "snake_case")]
pub enum Operator {
    Comparison(ComparisonOp),
    Logical(LogicalOp),
    Temporal(TemporalOp),
    Spatial(SpatialOp),
    Semantic(SemanticOp),
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Comparison(ComparisonOp::Eq) => "eq",
            Operator::Comparison(ComparisonOp::Ne) => "ne",
            Operator::Comparison(ComparisonOp::Gt) => "gt",
            Operator::Comparison(ComparisonOp::Lt) => "lt",
            Operator::Comparison(ComparisonOp::Ge) => "ge",
            Operator::Comparison(ComparisonOp::Le) => "le",
            Operator::Comparison(ComparisonOp::Contains) => "contains",
            Operator::Comparison(ComparisonOp::StartsWith) => "starts_with",
            Operator::Comparison(ComparisonOp::EndsWith) => "ends_with",
            Operator::Comparison(ComparisonOp::In) => "in",
            Operator::Comparison(ComparisonOp::NotIn) => "not_in",
            Operator::Comparison(ComparisonOp::Between) => "between",
            Operator::Comparison(ComparisonOp::Like) => "like",
            Operator::Comparison(ComparisonOp::Regex) => "regex",
            Operator::Logical(LogicalOp::And) => "and",
            Operator::Logical(LogicalOp::Or) => "or",
            Operator::Logical(LogicalOp::Not) => "not",
            Operator::Temporal(TemporalOp::Before) => "before",
            Operator::Temporal(TemporalOp::After) => "after",
            Operator::Temporal(TemporalOp::Within) => "within",
            Operator::Temporal(TemporalOp::AgeLt) => "age_lt",
            Operator::Temporal(TemporalOp::AgeGt) => "age_gt",
            Operator::Spatial(SpatialOp::Near) => "near",
            Operator::Spatial(SpatialOp::WithinRadius) => "within_radius",
            Operator::Spatial(SpatialOp::ContainsPoint) => "contains_point",
            Operator::Semantic(SemanticOp::SimilarTo) => "similar_to",
            Operator::Semantic(SemanticOp::RelatedTo) => "related_to",
        }
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self, Operator::Spatial(_))
    }
}

/// Evaluation/combination hints carried alongside a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub weight: Option<f64>,
    pub combination_strategy: Option<CombinationStrategy>,
    pub case_sensitive: Option<bool>,
}

/// Strategies for combining a set of sibling filters (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationStrategy {
    Intersection,
    Union,
    Complement,
    Cascade,
    Parallel,
    Weighted,
}

/// A node in the filter AST.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterNode {
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
    pub children: Vec<FilterNode>,
    pub metadata: NodeMetadata,
}

impl FilterNode {
    pub fn comparison(field: impl Into<String>, op: ComparisonOp, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Comparison(op),
            value,
            children: Vec::new(),
            metadata: NodeMetadata::default(),
        }
    }

    pub fn and(children: Vec<FilterNode>) -> Self {
        Self {
            field: String::new(),
            operator: Operator::Logical(LogicalOp::And),
            value: FilterValue::Null,
            children,
            metadata: NodeMetadata::default(),
        }
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        Self {
            field: String::new(),
            operator: Operator::Logical(LogicalOp::Or),
            value: FilterValue::Null,
            children,
            metadata: NodeMetadata::default(),
        }
    }

    pub fn not(child: FilterNode) -> Self {
        Self {
            field: String::new(),
            operator: Operator::Logical(LogicalOp::Not),
            value: FilterValue::Null,
            children: vec![child],
            metadata: NodeMetadata::default(),
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self.operator, Operator::Logical(_))
    }

    /// Depth of this subtree, a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(FilterNode::depth).max().unwrap_or(0)
    }
}
