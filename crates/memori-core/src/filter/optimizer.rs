//! Filter Optimizer
//!
//! Reorders and groups a set of sibling filters by estimated selectivity,
//! estimates total evaluation cost, and implements the combination
//! strategies used to join several filters into one AST.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{MemoriError, Result};
use crate::filter::{ComparisonOp, FilterNode, FilterValue, LogicalOp, Operator};

/// Fixed per-operator cost table, units are arbitrary relative work.
fn operator_cost(op: &Operator) -> u32 {
    match op {
        Operator::Comparison(ComparisonOp::Eq) => 1,
        Operator::Comparison(ComparisonOp::Ne) => 1,
        Operator::Comparison(ComparisonOp::Gt)
        | Operator::Comparison(ComparisonOp::Lt)
        | Operator::Comparison(ComparisonOp::Ge)
        | Operator::Comparison(ComparisonOp::Le) => 2,
        Operator::Comparison(ComparisonOp::In) | Operator::Comparison(ComparisonOp::NotIn) => 3,
        Operator::Comparison(ComparisonOp::Between) => 3,
        Operator::Comparison(ComparisonOp::StartsWith) | Operator::Comparison(ComparisonOp::EndsWith) => 4,
        Operator::Comparison(ComparisonOp::Contains) => 5,
        Operator::Comparison(ComparisonOp::Like) => 10,
        Operator::Comparison(ComparisonOp::Regex) => 20,
        Operator::Temporal(_) => 4,
        Operator::Semantic(_) => 15,
        Operator::Spatial(_) => 15,
        Operator::Logical(_) => 0,
    }
}

/// Fixed per-operator selectivity table: higher means more rows pass,
/// i.e. less useful for early filtering.
fn operator_selectivity(op: &Operator) -> f64 {
    match op {
        Operator::Comparison(ComparisonOp::Eq) => 0.9,
        Operator::Comparison(ComparisonOp::Ne) => 0.2,
        Operator::Comparison(ComparisonOp::Gt)
        | Operator::Comparison(ComparisonOp::Lt)
        | Operator::Comparison(ComparisonOp::Ge)
        | Operator::Comparison(ComparisonOp::Le) => 0.5,
        Operator::Comparison(ComparisonOp::In) => 0.6,
        Operator::Comparison(ComparisonOp::NotIn) => 0.3,
        Operator::Comparison(ComparisonOp::Between) => 0.4,
        Operator::Comparison(ComparisonOp::StartsWith) | Operator::Comparison(ComparisonOp::EndsWith) => 0.35,
        Operator::Comparison(ComparisonOp::Contains) => 0.3,
        Operator::Comparison(ComparisonOp::Like) => 0.25,
        Operator::Comparison(ComparisonOp::Regex) => 0.2,
        Operator::Temporal(_) => 0.4,
        Operator::Semantic(_) => 0.15,
        Operator::Spatial(_) => 0.15,
        Operator::Logical(_) => 0.5,
    }
}

/// Estimates the total evaluation cost of a subtree. Costs are additive
/// over children, so `estimateCost(and(a,b)) >= estimateCost(a) + estimateCost(b)`.
pub fn estimate_cost(node: &FilterNode) -> u32 {
    operator_cost(&node.operator) + node.children.iter().map(estimate_cost).sum::<u32>()
}

/// Context controlling optimizer behavior.
#[derive(Debug, Clone)]
pub struct OptimizerContext {
    pub strategy: crate::filter::CombinationStrategy,
    pub timeout: Duration,
    pub early_termination: bool,
}

impl Default for OptimizerContext {
    fn default() -> Self {
        Self {
            strategy: crate::filter::CombinationStrategy::Cascade,
            timeout: Duration::from_secs(5),
            early_termination: true,
        }
    }
}

/// The result of optimizing a set of sibling filters.
#[derive(Debug, Clone)]
pub struct OptimizedChain {
    pub execution_order: Vec<FilterNode>,
    pub parallel_groups: Vec<Vec<FilterNode>>,
    pub estimated_cost: u32,
    pub optimization_hints: Vec<String>,
}

/// Optimizes a set of sibling filters (typically the children of an `and`).
/// Deduplicates redundant siblings, sorts by descending selectivity, and
/// partitions by field for potential parallel evaluation.
pub fn optimize(siblings: &[FilterNode], context: &OptimizerContext) -> OptimizedChain {
    let mut hints = Vec::new();

    let deduped = dedup_siblings(siblings, &mut hints);

    let mut ordered = deduped.clone();
    ordered.sort_by(|a, b| {
        operator_selectivity(&b.operator)
            .partial_cmp(&operator_selectivity(&a.operator))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if matches!(context.strategy, crate::filter::CombinationStrategy::Cascade) {
        hints.push("cascade: ordered by descending selectivity".to_string());
    }

    let mut groups: BTreeMap<String, Vec<FilterNode>> = BTreeMap::new();
    for node in &ordered {
        groups.entry(node.field.clone()).or_default().push(node.clone());
    }
    let parallel_groups: Vec<Vec<FilterNode>> = groups.into_values().collect();
    if parallel_groups.len() > 1 {
        hints.push(format!("{} independent field groups can fan out", parallel_groups.len()));
    }

    let estimated_cost = ordered.iter().map(estimate_cost).sum();

    OptimizedChain { execution_order: ordered, parallel_groups, estimated_cost, optimization_hints: hints }
}

fn dedup_siblings(siblings: &[FilterNode], hints: &mut Vec<String>) -> Vec<FilterNode> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for node in siblings {
        let key = (node.field.clone(), node.operator.name(), serde_json::to_string(&node.value).unwrap_or_default());
        if seen.insert(key) {
            out.push(node.clone());
        }
    }
    if out.len() != siblings.len() {
        hints.push(format!("removed {} redundant sibling(s)", siblings.len() - out.len()));
    }
    out
}

/// Joins a set of filters into a single AST per the named combination
/// strategy.
pub fn combine(filters: Vec<FilterNode>, strategy: crate::filter::CombinationStrategy) -> Result<FilterNode> {
    use crate::filter::CombinationStrategy::*;
    match strategy {
        Intersection => Ok(FilterNode::and(filters)),
        Union => {
            let mut hints = Vec::new();
            Ok(FilterNode::or(dedup_siblings(&filters, &mut hints)))
        }
        Complement => {
            if filters.len() != 2 {
                return Err(MemoriError::validation("filters", filters.len(), "complement requires exactly 2 filters"));
            }
            let mut iter = filters.into_iter();
            let first = iter.next().unwrap();
            let second = iter.next().unwrap();
            Ok(FilterNode::and(vec![first, FilterNode::not(second)]))
        }
        Cascade => {
            let mut sorted = filters;
            sorted.sort_by(|a, b| {
                operator_selectivity(&b.operator)
                    .partial_cmp(&operator_selectivity(&a.operator))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(FilterNode::and(sorted))
        }
        Parallel => {
            let mut groups: BTreeMap<String, Vec<FilterNode>> = BTreeMap::new();
            for node in filters {
                groups.entry(node.field.clone()).or_default().push(node);
            }
            let anded: Vec<FilterNode> = groups.into_values().map(FilterNode::and).collect();
            Ok(FilterNode::or(anded))
        }
        Weighted => {
            let mut weighted = filters;
            for (i, node) in weighted.iter_mut().enumerate() {
                node.metadata.weight = Some(1.0 / (i as f64 + 1.0));
            }
            Ok(FilterNode::and(weighted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterValue;

    fn eq(field: &str, value: f64) -> FilterNode {
        FilterNode::comparison(field, ComparisonOp::Eq, FilterValue::Number(value))
    }

    #[test]
    fn cost_is_monotonic_under_and() {
        let a = eq("a", 1.0);
        let b = FilterNode::comparison("b", ComparisonOp::Regex, FilterValue::String(".*x".into()));
        let combined = FilterNode::and(vec![a.clone(), b.clone()]);
        assert!(estimate_cost(&combined) >= estimate_cost(&a) + estimate_cost(&b));
    }

    #[test]
    fn optimizer_sorts_by_descending_selectivity() {
        let regex = FilterNode::comparison("x", ComparisonOp::Regex, FilterValue::String("a".into()));
        let equality = eq("y", 1.0);
        let chain = optimize(&[regex.clone(), equality.clone()], &OptimizerContext::default());
        assert_eq!(chain.execution_order[0].field, "y");
    }

    #[test]
    fn optimizer_dedups_redundant_siblings() {
        let chain = optimize(&[eq("x", 1.0), eq("x", 1.0)], &OptimizerContext::default());
        assert_eq!(chain.execution_order.len(), 1);
    }

    #[test]
    fn weighted_combination_assigns_decaying_weights() {
        let combined = combine(vec![eq("a", 1.0), eq("b", 2.0), eq("c", 3.0)], crate::filter::CombinationStrategy::Weighted).expect("combine");
        let weights: Vec<f64> = combined.children.iter().map(|c| c.metadata.weight.unwrap()).collect();
        assert_eq!(weights, vec![1.0, 0.5, 1.0 / 3.0]);
    }

    #[test]
    fn complement_requires_exactly_two_filters() {
        let result = combine(vec![eq("a", 1.0)], crate::filter::CombinationStrategy::Complement);
        assert!(result.is_err());
    }
}
