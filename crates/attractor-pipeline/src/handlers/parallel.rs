use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use attractor_types::{Context, Outcome, Result, StageStatus};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::{NodeExecutor, NodeHandler};

/// One branch's result, as recorded into the `parallel.results` context key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BranchResult {
    node_id: String,
    status: StageStatus,
    notes: String,
    context_updates: HashMap<String, String>,
}

fn status_rank(status: StageStatus) -> u8 {
    match status {
        StageStatus::Success => 2,
        StageStatus::PartialSuccess => 1,
        _ => 0,
    }
}

/// Handler for "parallel" type nodes (shape="component").
/// Treats each outgoing edge as the head of a branch, run concurrently via the
/// node-executor callback supplied by the runner.
pub struct ParallelHandler;

#[async_trait]
impl NodeHandler for ParallelHandler {
    fn handler_type(&self) -> &str {
        "parallel"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        _context: &Context,
        graph: &PipelineGraph,
        _logs_root: &Path,
        executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        let branch_targets: Vec<String> = graph
            .outgoing_edges(&node.id)
            .iter()
            .map(|e| e.to.clone())
            .collect();

        tracing::info!(
            node = %node.id,
            branches = branch_targets.len(),
            targets = ?branch_targets,
            "Parallel fan-out"
        );

        let Some(executor) = executor else {
            return Ok(Outcome::fail(
                "parallel handler requires a node executor",
            ));
        };

        if branch_targets.is_empty() {
            return Ok(Outcome::success("no branches to fan out to"));
        }

        let futures = branch_targets.iter().map(|target| executor(target));
        let outcomes = join_all(futures).await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (target, outcome) in branch_targets.iter().zip(outcomes.into_iter()) {
            let (status, notes, context_updates) = match outcome {
                Ok(o) => (o.status, o.notes, o.context_updates),
                Err(e) => (StageStatus::Fail, e.to_string(), HashMap::new()),
            };
            results.push(BranchResult {
                node_id: target.clone(),
                status,
                notes,
                context_updates,
            });
        }

        let succeeded = results.iter().filter(|r| r.status == StageStatus::Success).count();
        let failed = results.iter().filter(|r| r.status == StageStatus::Fail).count();

        let status = if failed == 0 {
            StageStatus::Success
        } else if succeeded > 0 || failed < results.len() {
            StageStatus::PartialSuccess
        } else {
            StageStatus::Fail
        };

        let mut context_updates = HashMap::new();
        context_updates.insert(
            "parallel.results".to_string(),
            serde_json::to_string(&results).unwrap_or_default(),
        );

        Ok(Outcome {
            status,
            preferred_label: None,
            suggested_next_ids: vec![],
            context_updates,
            notes: format!("{} of {} branches succeeded", succeeded, results.len()),
            failure_reason: if status == StageStatus::Fail {
                Some("all branches failed".to_string())
            } else {
                None
            },
        })
    }
}

/// Handler for "parallel.fan_in" type nodes (shape="tripleoctagon").
/// Merges the `parallel.results` produced by a preceding fan-out.
pub struct FanInHandler;

impl FanInHandler {
    /// Pick the "best" branch with a deterministic heuristic: highest status
    /// rank wins, ties broken by original (insertion) order.
    fn pick_best(results: &[BranchResult]) -> Option<&BranchResult> {
        results
            .iter()
            .enumerate()
            .max_by_key(|(i, r)| (status_rank(r.status), std::cmp::Reverse(*i)))
            .map(|(_, r)| r)
    }
}

#[async_trait]
impl NodeHandler for FanInHandler {
    fn handler_type(&self) -> &str {
        "parallel.fan_in"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        context: &Context,
        _graph: &PipelineGraph,
        _logs_root: &Path,
        _executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        tracing::info!(node = %node.id, "Fan-in merge point");

        let raw = context.get("parallel.results").await.unwrap_or_default();
        let results: Vec<BranchResult> = serde_json::from_str(&raw).unwrap_or_default();

        if results.is_empty() {
            return Ok(Outcome::success("no upstream parallel results to merge"));
        }

        // `prompt` on a fan-in node is an optional hint for an LM-backed chooser; this
        // handler has no LM backend wired in, so it always falls back to the heuristic.
        let best = Self::pick_best(&results);

        let mut context_updates = HashMap::new();
        if let Some(best) = best {
            context_updates.insert("parallel.fan_in.best_id".to_string(), best.node_id.clone());
            context_updates.insert(
                "parallel.fan_in.best_outcome".to_string(),
                status_string(best.status),
            );
        }

        Ok(Outcome {
            status: StageStatus::Success,
            preferred_label: None,
            suggested_next_ids: vec![],
            context_updates,
            notes: format!("merged {} branch result(s)", results.len()),
            failure_reason: None,
        })
    }
}

fn status_string(status: StageStatus) -> String {
    match status {
        StageStatus::Success => "success",
        StageStatus::PartialSuccess => "partial_success",
        StageStatus::Retry => "retry",
        StageStatus::Fail => "fail",
        StageStatus::Skipped => "skipped",
    }
    .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::make_node;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn make_executor(
        calls: Arc<AtomicUsize>,
        fail_targets: Vec<&'static str>,
    ) -> impl Fn(&str) -> crate::handler::NodeExecutorFuture<'static> {
        move |target: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            let target = target.to_string();
            let should_fail = fail_targets.contains(&target.as_str());
            Box::pin(async move {
                if should_fail {
                    Ok(Outcome::fail("branch failed"))
                } else {
                    Ok(Outcome::success(format!("{target} done")))
                }
            })
        }
    }

    #[tokio::test]
    async fn parallel_handler_runs_branches_and_reports_success() {
        let handler = ParallelHandler;
        let dot = r#"digraph G {
            fork [shape="component"]
            branch_a [shape="box"]
            branch_b [shape="box"]
            fork -> branch_a
            fork -> branch_b
        }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = graph.node("fork").unwrap().clone();
        let ctx = Context::default();
        let logs_root = std::env::temp_dir();

        let calls = Arc::new(AtomicUsize::new(0));
        let executor = make_executor(calls.clone(), vec![]);

        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, Some(&executor))
            .await
            .unwrap();

        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let raw = outcome.context_updates.get("parallel.results").unwrap();
        let results: Vec<BranchResult> = serde_json::from_str(raw).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node_id, "branch_a");
        assert_eq!(results[1].node_id, "branch_b");
    }

    #[tokio::test]
    async fn parallel_handler_reports_partial_success_on_mixed_outcomes() {
        let handler = ParallelHandler;
        let dot = r#"digraph G {
            fork [shape="component"]
            branch_a [shape="box"]
            branch_b [shape="box"]
            fork -> branch_a
            fork -> branch_b
        }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = graph.node("fork").unwrap().clone();
        let ctx = Context::default();
        let logs_root = std::env::temp_dir();

        let calls = Arc::new(AtomicUsize::new(0));
        let executor = make_executor(calls, vec!["branch_b"]);

        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, Some(&executor))
            .await
            .unwrap();

        assert_eq!(outcome.status, StageStatus::PartialSuccess);
    }

    #[tokio::test]
    async fn parallel_handler_without_executor_fails() {
        let handler = ParallelHandler;
        let dot = r#"digraph G {
            fork [shape="component"]
            branch_a [shape="box"]
            fork -> branch_a
        }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = graph.node("fork").unwrap().clone();
        let ctx = Context::default();
        let logs_root = std::env::temp_dir();

        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, StageStatus::Fail);
    }

    #[tokio::test]
    async fn fan_in_handler_picks_best_by_heuristic() {
        let handler = FanInHandler;
        let dot = r#"digraph G { A -> B }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = make_node("merge", "tripleoctagon", None, Default::default());
        let ctx = Context::default();
        let logs_root = std::env::temp_dir();

        let results = vec![
            BranchResult {
                node_id: "branch_a".into(),
                status: StageStatus::PartialSuccess,
                notes: "meh".into(),
                context_updates: HashMap::new(),
            },
            BranchResult {
                node_id: "branch_b".into(),
                status: StageStatus::Success,
                notes: "great".into(),
                context_updates: HashMap::new(),
            },
        ];
        ctx.set("parallel.results", serde_json::to_string(&results).unwrap())
            .await;

        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(
            outcome.context_updates.get("parallel.fan_in.best_id"),
            Some(&"branch_b".to_string())
        );
        assert_eq!(
            outcome.context_updates.get("parallel.fan_in.best_outcome"),
            Some(&"success".to_string())
        );
    }

    #[tokio::test]
    async fn fan_in_handler_with_no_results_succeeds_trivially() {
        let handler = FanInHandler;
        let dot = r#"digraph G { A -> B }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = make_node("merge", "tripleoctagon", None, Default::default());
        let ctx = Context::default();
        let logs_root = std::env::temp_dir();

        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert!(outcome.context_updates.is_empty());
    }
}
