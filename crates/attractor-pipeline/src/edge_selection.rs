//! Edge selection cascade.
//!
//! After a node completes, this module determines which outgoing edge to follow
//! based on a priority cascade: condition gate, preferred-label narrowing,
//! weight/lexical tie-break.

use crate::condition::{evaluate_condition, parse_condition};
use crate::graph::{PipelineEdge, PipelineGraph};

/// Select the next edge to follow after a node completes.
/// Returns `None` if no edges are available, or if a condition gate eliminates
/// every edge and no unconditioned edge exists to fall back on.
pub fn select_edge<'a>(
    node_id: &str,
    outcome: &attractor_types::Outcome,
    resolve: &dyn Fn(&str) -> String,
    graph: &'a PipelineGraph,
) -> Option<&'a PipelineEdge> {
    let edges = graph.outgoing_edges(node_id);
    if edges.is_empty() {
        return None;
    }

    // Step 2: condition gate. Edges with no condition pass through; edges
    // whose condition evaluates false are eliminated.
    let survivors: Vec<&PipelineEdge> = edges
        .iter()
        .copied()
        .filter(|e| match &e.condition {
            Some(cond) => parse_condition(cond)
                .map(|expr| evaluate_condition(&expr, resolve))
                .unwrap_or(false),
            None => true,
        })
        .collect();

    if survivors.is_empty() {
        // Step 5: nothing survived the condition gate and there were no
        // unconditioned edges to fall back on.
        return None;
    }

    // Step 3: preferred-label narrowing, case-sensitive, no normalization.
    let mut candidates = survivors;
    if let Some(label) = outcome.preferred_label.as_deref().filter(|l| !l.is_empty()) {
        let matching: Vec<&PipelineEdge> = candidates
            .iter()
            .copied()
            .filter(|e| e.label.as_deref() == Some(label))
            .collect();
        if !matching.is_empty() {
            candidates = matching;
        }
    }

    // Step 4: weight/lexical tie-break.
    Some(best_by_weight_then_lexical(&candidates))
}

/// Pick the edge with the highest weight; break ties by lexicographically
/// smallest `to` field.
fn best_by_weight_then_lexical<'a>(edges: &[&'a PipelineEdge]) -> &'a PipelineEdge {
    edges
        .iter()
        .copied()
        .max_by(|a, b| {
            a.weight
                .cmp(&b.weight)
                .then(b.to.cmp(&a.to)) // lexical ascending = reverse compare
        })
        .unwrap()
}
