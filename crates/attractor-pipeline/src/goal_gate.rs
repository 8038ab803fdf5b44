use std::collections::HashMap;

use attractor_dot::AttributeValue;
use attractor_types::{AttractorError, Outcome, StageStatus};

use crate::graph::{PipelineGraph, PipelineNode};

/// Result of checking all goal gate nodes.
#[derive(Debug)]
pub struct GoalGateResult {
    pub all_satisfied: bool,
    pub failed_node_id: Option<String>,
    pub retry_target: Option<String>,
}

/// Check whether all visited goal gate nodes have succeeded.
/// Only checks nodes that appear in `node_outcomes` (visited nodes).
pub fn check_goal_gates(
    graph: &PipelineGraph,
    node_outcomes: &HashMap<String, Outcome>,
) -> GoalGateResult {
    for (node_id, outcome) in node_outcomes {
        if let Some(node) = graph.node(node_id) {
            if node.goal_gate
                && !matches!(
                    outcome.status,
                    StageStatus::Success | StageStatus::PartialSuccess
                )
            {
                let retry = resolve_retry_target(node, graph);
                return GoalGateResult {
                    all_satisfied: false,
                    failed_node_id: Some(node_id.clone()),
                    retry_target: retry,
                };
            }
        }
    }
    GoalGateResult {
        all_satisfied: true,
        failed_node_id: None,
        retry_target: None,
    }
}

/// Resolve the retry target using 4-level fallback:
/// 1. Node `retry_target`
/// 2. Node `fallback_retry_target`
/// 3. Graph `retry_target` attribute
/// 4. Graph `fallback_retry_target` attribute
fn resolve_retry_target(node: &PipelineNode, graph: &PipelineGraph) -> Option<String> {
    node.retry_target
        .clone()
        .or_else(|| node.fallback_retry_target.clone())
        .or_else(|| {
            graph.attrs.get("retry_target").and_then(|v| match v {
                AttributeValue::String(s) => Some(s.clone()),
                _ => None,
            })
        })
        .or_else(|| {
            graph
                .attrs
                .get("fallback_retry_target")
                .and_then(|v| match v {
                    AttributeValue::String(s) => Some(s.clone()),
                    _ => None,
                })
        })
}

/// Enforce goal gates: if unsatisfied and no retry target, return error.
pub fn enforce_goal_gates(
    graph: &PipelineGraph,
    node_outcomes: &HashMap<String, Outcome>,
) -> Result<GoalGateResult, AttractorError> {
    let result = check_goal_gates(graph, node_outcomes);
    if !result.all_satisfied && result.retry_target.is_none() {
        return Err(AttractorError::GoalGateUnsatisfied {
            node: result.failed_node_id.unwrap_or_default(),
        });
    }
    Ok(result)
}
