//! Manager loop handler for "house" shaped nodes.
//!
//! Supervises a set of sub-tasks named by the node's outgoing edges, driving
//! each sequentially via the node-executor callback the runner injects.

use std::path::Path;

use async_trait::async_trait;
use attractor_types::{Context, Outcome, Result, StageStatus};

use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::{NodeExecutor, NodeHandler};

/// Handler for "stack.manager_loop" type nodes (shape="house").
/// Runs each outgoing edge's target in sequence, halting early on the first
/// FAIL, so it models a supervising loop rather than a fan-out.
pub struct ManagerLoopHandler;

#[async_trait]
impl NodeHandler for ManagerLoopHandler {
    fn handler_type(&self) -> &str {
        "stack.manager_loop"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        _context: &Context,
        graph: &PipelineGraph,
        _logs_root: &Path,
        executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        let prompt = node.prompt.as_deref().unwrap_or("Supervise sub-tasks");
        tracing::info!(node = %node.id, "Manager loop executing: {}", prompt);

        let targets: Vec<String> = graph
            .outgoing_edges(&node.id)
            .iter()
            .map(|e| e.to.clone())
            .collect();

        let mut context_updates = std::collections::HashMap::new();

        let Some(executor) = executor else {
            if targets.is_empty() {
                context_updates.insert(format!("{}.managed_count", node.id), "0".to_string());
                context_updates.insert(format!("{}.managed", node.id), "true".to_string());
                return Ok(Outcome {
                    status: StageStatus::Success,
                    preferred_label: None,
                    suggested_next_ids: vec![],
                    context_updates,
                    notes: format!("Manager completed: {}", prompt),
                    failure_reason: None,
                });
            }
            return Ok(Outcome::fail(
                "stack.manager_loop handler requires a node executor",
            ));
        };

        let mut ran = 0usize;
        let mut any_failed = false;
        for target in &targets {
            let outcome = executor(target).await?;
            ran += 1;
            if outcome.status == StageStatus::Fail {
                any_failed = true;
                break;
            }
        }

        context_updates.insert(format!("{}.managed_count", node.id), ran.to_string());
        context_updates.insert(format!("{}.managed", node.id), "true".to_string());

        let status = if any_failed {
            StageStatus::PartialSuccess
        } else {
            StageStatus::Success
        };

        Ok(Outcome {
            status,
            preferred_label: None,
            suggested_next_ids: vec![],
            context_updates,
            notes: format!("Manager completed: {} ({ran} sub-task(s) run)", prompt),
            failure_reason: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{make_minimal_graph, make_node};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn manager_handler_type() {
        let handler = ManagerLoopHandler;
        assert_eq!(handler.handler_type(), "stack.manager_loop");
    }

    #[tokio::test]
    async fn manager_handler_with_no_edges_and_no_executor_succeeds() {
        let handler = ManagerLoopHandler;
        let node = make_node("mgr", "house", Some("Coordinate workers"), Default::default());
        let ctx = Context::default();
        let graph = make_minimal_graph();
        let logs_root = std::env::temp_dir();

        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert!(outcome.notes.contains("Coordinate workers"));
        assert_eq!(
            outcome.context_updates.get("mgr.managed"),
            Some(&"true".to_string())
        );
        assert_eq!(
            outcome.context_updates.get("mgr.managed_count"),
            Some(&"0".to_string())
        );
    }

    #[tokio::test]
    async fn manager_handler_runs_sub_tasks_sequentially() {
        let dot = r#"digraph G {
            mgr [shape="house"]
            task_a [shape="box"]
            task_b [shape="box"]
            mgr -> task_a
            mgr -> task_b
        }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = graph.node("mgr").unwrap().clone();
        let ctx = Context::default();
        let logs_root = std::env::temp_dir();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_clone = order.clone();
        let executor = move |target: &str| {
            order_clone.lock().unwrap().push(target.to_string());
            let target = target.to_string();
            Box::pin(async move { Ok(Outcome::success(format!("{target} ok"))) })
                as crate::handler::NodeExecutorFuture<'static>
        };

        let handler = ManagerLoopHandler;
        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, Some(&executor))
            .await
            .unwrap();

        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.context_updates.get("mgr.managed_count"), Some(&"2".to_string()));
        assert_eq!(*order.lock().unwrap(), vec!["task_a".to_string(), "task_b".to_string()]);
    }

    #[tokio::test]
    async fn manager_handler_halts_on_first_failure() {
        let dot = r#"digraph G {
            mgr [shape="house"]
            task_a [shape="box"]
            task_b [shape="box"]
            mgr -> task_a
            mgr -> task_b
        }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = graph.node("mgr").unwrap().clone();
        let ctx = Context::default();
        let logs_root = std::env::temp_dir();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let executor = move |target: &str| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            let target = target.to_string();
            Box::pin(async move { Ok(Outcome::fail(format!("{target} failed"))) })
                as crate::handler::NodeExecutorFuture<'static>
        };

        let handler = ManagerLoopHandler;
        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, Some(&executor))
            .await
            .unwrap();

        assert_eq!(outcome.status, StageStatus::PartialSuccess);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.context_updates.get("mgr.managed_count"), Some(&"1".to_string()));
    }
}
