//! Pipeline execution engine — the runner's state machine.
//!
//! Drives one pipeline on a single logical thread of control: terminal/goal-gate
//! check, fidelity degrade, pre/post tool hooks, handler dispatch through the
//! retry subsystem, checkpointing, edge selection, and loop-restart bookkeeping.
//! See the module-level tests for the shape of a full run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use attractor_dot::AttributeValue;
use attractor_types::{AttractorError, Checkpoint, Context, Outcome, Result, StageStatus};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::save_checkpoint;
use crate::edge_selection::select_edge;
use crate::event_data;
use crate::events::{EventEmitter, EventKind, PipelineEvent};
use crate::goal_gate::check_goal_gates;
use crate::graph::{PipelineEdge, PipelineGraph, PipelineNode};
use crate::handler::{default_registry, HandlerRegistry, NodeExecutor, NodeExecutorFuture};
use crate::retry::{execute_with_retry, RetryPolicy};
use crate::validation::validate_or_raise;

/// Default timeout applied to `tool_hooks.pre`/`tool_hooks.post` shell commands.
const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Configuration for a pipeline run.
pub struct PipelineConfig {
    pub logs_root: PathBuf,
    pub pipeline_id: String,
    pub retry_preset: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            logs_root: PathBuf::from(".attractor/logs"),
            pipeline_id: "pipeline".to_string(),
            retry_preset: "standard".to_string(),
        }
    }
}

/// The result of a completed (or failed) pipeline run. A FAIL `status` with a
/// `failure_reason` means the engine exited its own loop cleanly; only a
/// handler-resolution failure, a missing start node, or an edge pointing at a
/// node that doesn't exist surface as a thrown [`AttractorError`] instead.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub status: StageStatus,
    /// Ids of every node actually dispatched, in order. The terminal node
    /// that ends the run is never dispatched, so it never appears here.
    pub completed_nodes: Vec<String>,
    pub node_outcomes: HashMap<String, Outcome>,
    pub final_context: HashMap<String, String>,
    pub failure_reason: Option<String>,
}

/// The core pipeline executor. Owns a handler registry and an event emitter,
/// and drives graph traversal for any number of runs.
pub struct PipelineExecutor {
    registry: HandlerRegistry,
    events: EventEmitter,
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::with_default_registry()
    }
}

impl PipelineExecutor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            events: EventEmitter::default(),
        }
    }

    pub fn with_default_registry() -> Self {
        Self::new(default_registry())
    }

    pub fn with_events(registry: HandlerRegistry, events: EventEmitter) -> Self {
        Self { registry, events }
    }

    /// The event stream for this executor's runs. Clone-cheap; subscribe before
    /// calling `run` to avoid missing early events.
    pub fn events(&self) -> EventEmitter {
        self.events.clone()
    }

    /// Run with a fresh context and default configuration.
    pub async fn run(&self, graph: &PipelineGraph) -> Result<PipelineResult> {
        self.run_with_context(graph, Context::new()).await
    }

    /// Run with a caller-provided context (e.g. pre-seeded with `workdir`).
    pub async fn run_with_context(&self, graph: &PipelineGraph, context: Context) -> Result<PipelineResult> {
        self.run_with_config(
            graph,
            context,
            PipelineConfig::default(),
            CancellationToken::new(),
        )
        .await
    }

    /// Run with full control over logs root, pipeline id, retry preset, and
    /// cooperative cancellation.
    pub async fn run_with_config(
        &self,
        graph: &PipelineGraph,
        context: Context,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        validate_or_raise(graph)?;
        mirror_graph_attrs(graph, &context).await;

        let start = graph
            .start_node()
            .ok_or_else(|| AttractorError::ValidationError("no start node found".into()))?;

        let state = RunState {
            current_id: start.id.clone(),
            incoming_edge: None,
            completed_nodes: Vec::new(),
            node_outcomes: HashMap::new(),
            node_retries: HashMap::new(),
            restart_count: 0,
            degrade_next_fidelity: false,
            logs_root: config.logs_root.clone(),
        };

        write_manifest(graph, &config).await;
        self.drive(graph, &context, state, &config, &cancel).await
    }

    /// Resume a previously-checkpointed run: reload state from
    /// `${logs_root}/checkpoint.json`, determine the next stage from the
    /// checkpoint's recorded outcome, and re-enter the run loop with fidelity
    /// degraded for the first stage executed.
    pub async fn resume(
        &self,
        graph: &PipelineGraph,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        validate_or_raise(graph)?;
        let checkpoint = crate::checkpoint::load_checkpoint(&config.logs_root)
            .await?
            .ok_or_else(|| AttractorError::Other("no checkpoint to resume from".into()))?;

        let context = Context::new();
        context.apply_updates(checkpoint.context_values.clone()).await;

        let last_status = parse_status(&context.get_string("outcome", "success").await);
        let last_outcome = checkpoint
            .node_outcomes
            .get(&checkpoint.current_node)
            .cloned()
            .unwrap_or_else(|| Outcome {
                status: last_status,
                preferred_label: context.get("preferred_label").await,
                suggested_next_ids: Vec::new(),
                context_updates: HashMap::new(),
                notes: String::new(),
                failure_reason: None,
            });

        let node = graph.node(&checkpoint.current_node).ok_or_else(|| {
            AttractorError::Other(format!(
                "checkpoint node '{}' not found in graph",
                checkpoint.current_node
            ))
        })?;

        let snapshot = context.snapshot().await;
        let resolve = move |key: &str| snapshot.get(key).cloned().unwrap_or_default();
        let selected_edge = select_edge(&node.id, &last_outcome, &resolve, graph).cloned();
        let next_id = selected_edge
            .as_ref()
            .map(|e| e.to.clone())
            .unwrap_or_else(|| node.id.clone());

        let state = RunState {
            current_id: next_id,
            incoming_edge: selected_edge,
            completed_nodes: checkpoint.completed_nodes.clone(),
            node_outcomes: checkpoint.node_outcomes.clone(),
            node_retries: checkpoint.node_retries.clone(),
            restart_count: 0,
            degrade_next_fidelity: true,
            logs_root: config.logs_root.clone(),
        };

        self.drive(graph, &context, state, &config, &cancel).await
    }

    // -----------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------

    async fn drive(
        &self,
        graph: &PipelineGraph,
        context: &Context,
        mut state: RunState,
        config: &PipelineConfig,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        let base_logs_root = config.logs_root.clone();

        self.events.emit(PipelineEvent::new(
            EventKind::PipelineStarted,
            config.pipeline_id.clone(),
            event_data! { "graph_name" => graph.name.clone(), "start" => state.current_id.clone() },
        ));

        loop {
            if cancel.is_cancelled() {
                return Ok(self.fail_and_checkpoint(context, &state, config, "cancelled").await);
            }

            let node = graph
                .node(&state.current_id)
                .cloned()
                .ok_or_else(|| AttractorError::Other(format!("node '{}' not found in graph", state.current_id)))?;

            // Step 1: terminal check.
            if is_terminal(&node) {
                let gate = check_goal_gates(graph, &state.node_outcomes);
                self.events.emit(PipelineEvent::new(
                    EventKind::GoalGateChecked,
                    config.pipeline_id.clone(),
                    event_data! { "satisfied" => gate.all_satisfied, "node_id" => node.id.clone() },
                ));
                if !gate.all_satisfied {
                    if let Some(target) = gate.retry_target.clone() {
                        state.current_id = target;
                        state.incoming_edge = None;
                        continue;
                    }
                    let reason = format!(
                        "Goal gate unsatisfied: node '{}' did not reach success",
                        gate.failed_node_id.unwrap_or_default()
                    );
                    return Ok(self.fail_and_checkpoint(context, &state, config, reason).await);
                }

                // Terminal nodes are not dispatched: the run ends on the last
                // real stage's outcome, and the terminal id itself never
                // appears in `completed_nodes`.
                let last_outcome = state
                    .completed_nodes
                    .last()
                    .and_then(|id| state.node_outcomes.get(id))
                    .cloned()
                    .unwrap_or_else(|| Outcome::success(""));

                crate::checkpoint::clear_checkpoint(&state.logs_root).await.ok();
                self.events.emit(PipelineEvent::new(
                    EventKind::PipelineCompleted,
                    config.pipeline_id.clone(),
                    event_data! { "status" => status_to_string(last_outcome.status) },
                ));
                let final_context = context.snapshot().await;
                return Ok(PipelineResult {
                    status: last_outcome.status,
                    completed_nodes: state.completed_nodes,
                    node_outcomes: state.node_outcomes,
                    final_context,
                    failure_reason: None,
                });
            }

            // Step 2: fidelity degrade.
            if state.degrade_next_fidelity {
                context.set("_fidelity.mode", "SUMMARY_HIGH").await;
                state.degrade_next_fidelity = false;
            } else {
                let (mode, thread_id) = graph.resolve_fidelity(&node.id, state.incoming_edge.as_ref());
                context.set("_fidelity.mode", mode).await;
                context.set("_fidelity.threadId", thread_id).await;
            }

            // Steps 3-5: hooks + handler dispatch + retry.
            let executor_box = self.build_executor(context, graph, &state.logs_root);
            let outcome = self
                .dispatch_with_hooks(
                    &node,
                    context,
                    graph,
                    &state.logs_root,
                    Some(executor_box.as_ref()),
                    config,
                )
                .await?;

            // Step 6: record.
            state.completed_nodes.push(node.id.clone());
            state.node_outcomes.insert(node.id.clone(), outcome.clone());
            context.apply_updates(outcome.context_updates.clone()).await;
            context.set("outcome", status_to_string(outcome.status)).await;
            if let Some(ref label) = outcome.preferred_label {
                if !label.is_empty() {
                    context.set("preferred_label", label.clone()).await;
                }
            }
            self.events.emit(PipelineEvent::new(
                EventKind::StageCompleted,
                config.pipeline_id.clone(),
                event_data! { "node_id" => node.id.clone(), "status" => status_to_string(outcome.status) },
            ));

            // Step 7: checkpoint.
            self.persist_checkpoint(context, &state, config).await;

            if cancel.is_cancelled() {
                return Ok(self.fail_and_checkpoint(context, &state, config, "cancelled").await);
            }

            // Step 8: edge selection.
            let snapshot = context.snapshot().await;
            let resolve = move |key: &str| snapshot.get(key).cloned().unwrap_or_default();
            let selected = select_edge(&node.id, &outcome, &resolve, graph).cloned();
            self.events.emit(PipelineEvent::new(
                EventKind::EdgeSelected,
                config.pipeline_id.clone(),
                event_data! {
                    "node_id" => node.id.clone(),
                    "target" => selected.as_ref().map(|e| e.to.clone()).unwrap_or_default()
                },
            ));

            let edge = match selected {
                Some(edge) => edge,
                None => {
                    if outcome.status == StageStatus::Fail {
                        let retry_target = node
                            .retry_target
                            .clone()
                            .or_else(|| string_attr(&graph.attrs, "retry_target").map(str::to_string));
                        if let Some(target) = retry_target {
                            state.current_id = target;
                            state.incoming_edge = None;
                            continue;
                        }
                        let reason = outcome
                            .failure_reason
                            .clone()
                            .unwrap_or_else(|| "stage failed with no outgoing edge".to_string());
                        return Ok(self.fail_and_checkpoint(context, &state, config, reason).await);
                    }
                    let final_context = context.snapshot().await;
                    self.events.emit(PipelineEvent::new(
                        EventKind::PipelineCompleted,
                        config.pipeline_id.clone(),
                        event_data! { "status" => status_to_string(outcome.status) },
                    ));
                    return Ok(PipelineResult {
                        status: outcome.status,
                        completed_nodes: state.completed_nodes,
                        node_outcomes: state.node_outcomes,
                        final_context,
                        failure_reason: None,
                    });
                }
            };

            // Step 9: loop restart.
            if edge.loop_restart {
                state.restart_count += 1;
                state.node_outcomes.clear();
                state.node_retries.clear();
                context.clear().await;
                mirror_graph_attrs(graph, context).await;
                state.logs_root = base_logs_root.join(format!("restart-{}", state.restart_count));
                state
                    .completed_nodes
                    .push(format!("--- restart {} ---", state.restart_count));
                self.events.emit(PipelineEvent::new(
                    EventKind::PipelineRestarted,
                    config.pipeline_id.clone(),
                    event_data! { "restart_count" => state.restart_count, "target" => edge.to.clone() },
                ));
                state.current_id = edge.to.clone();
                state.incoming_edge = None;
                continue;
            }

            // Step 10: advance.
            state.current_id = edge.to.clone();
            state.incoming_edge = Some(edge);
        }
    }

    async fn fail_and_checkpoint(
        &self,
        context: &Context,
        state: &RunState,
        config: &PipelineConfig,
        reason: impl Into<String>,
    ) -> PipelineResult {
        let reason = reason.into();
        self.persist_checkpoint(context, state, config).await;
        self.events.emit(PipelineEvent::new(
            EventKind::PipelineFailed,
            config.pipeline_id.clone(),
            event_data! { "reason" => reason.clone() },
        ));
        let final_context = context.snapshot().await;
        PipelineResult {
            status: StageStatus::Fail,
            completed_nodes: state.completed_nodes.clone(),
            node_outcomes: state.node_outcomes.clone(),
            final_context,
            failure_reason: Some(reason),
        }
    }

    async fn persist_checkpoint(&self, context: &Context, state: &RunState, config: &PipelineConfig) {
        let checkpoint = Checkpoint {
            timestamp: chrono::Utc::now(),
            current_node: state.current_id.clone(),
            completed_nodes: state.completed_nodes.clone(),
            node_retries: state.node_retries.clone(),
            node_outcomes: state.node_outcomes.clone(),
            context_values: context.snapshot().await,
            logs: context.logs().await,
        };
        match save_checkpoint(&checkpoint, &state.logs_root).await {
            Ok(_) => {
                self.events.emit(PipelineEvent::new(
                    EventKind::CheckpointSaved,
                    config.pipeline_id.clone(),
                    event_data! { "node_id" => state.current_id.clone() },
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "checkpoint save failed (non-fatal)");
            }
        }
    }

    // -----------------------------------------------------------------
    // Hooks + handler dispatch
    // -----------------------------------------------------------------

    async fn dispatch_with_hooks(
        &self,
        node: &PipelineNode,
        context: &Context,
        graph: &PipelineGraph,
        logs_root: &Path,
        executor: Option<&NodeExecutor<'_>>,
        config: &PipelineConfig,
    ) -> Result<Outcome> {
        let workdir = context.get("workdir").await;

        // Step 3: pre-hook. Gates whether the handler runs at all.
        if let Some(command) = hook_command(node, graph, "tool_hooks.pre") {
            self.events.emit(PipelineEvent::new(
                EventKind::ToolHookPre,
                config.pipeline_id.clone(),
                event_data! { "node_id" => node.id.clone() },
            ));
            let (proceed, note) = run_hook(&command, workdir.as_deref(), DEFAULT_HOOK_TIMEOUT).await;
            if !proceed {
                return Ok(Outcome {
                    status: StageStatus::Skipped,
                    preferred_label: None,
                    suggested_next_ids: Vec::new(),
                    context_updates: HashMap::new(),
                    notes: note,
                    failure_reason: None,
                });
            }
        }

        // Step 4: handler dispatch + retry.
        let outcome = self
            .dispatch_with_retry(node, context, graph, logs_root, executor, config)
            .await?;

        // Step 5: post-hook. Advisory only — it never vetoes the outcome.
        if let Some(command) = hook_command(node, graph, "tool_hooks.post") {
            self.events.emit(PipelineEvent::new(
                EventKind::ToolHookPost,
                config.pipeline_id.clone(),
                event_data! { "node_id" => node.id.clone(), "status" => status_to_string(outcome.status) },
            ));
            run_hook(&command, workdir.as_deref(), DEFAULT_HOOK_TIMEOUT).await;
        }

        Ok(outcome)
    }

    async fn dispatch_with_retry(
        &self,
        node: &PipelineNode,
        context: &Context,
        graph: &PipelineGraph,
        logs_root: &Path,
        executor: Option<&NodeExecutor<'_>>,
        config: &PipelineConfig,
    ) -> Result<Outcome> {
        let handler_type = self.registry.resolve_type(node);
        let Some(handler) = self.registry.get(&handler_type) else {
            self.events.emit(PipelineEvent::new(
                EventKind::StageFailed,
                config.pipeline_id.clone(),
                event_data! { "node_id" => node.id.clone(), "handler_type" => handler_type.clone() },
            ));
            return Err(AttractorError::HandlerError {
                handler: handler_type.clone(),
                node: node.id.clone(),
                message: format!("no handler registered for type '{handler_type}'"),
            });
        };

        self.events.emit(PipelineEvent::new(
            EventKind::StageStarted,
            config.pipeline_id.clone(),
            event_data! { "node_id" => node.id.clone(), "handler_type" => handler_type.clone() },
        ));

        let node_override = (node.max_retries > 0).then_some(node.max_retries);
        let graph_default = int_attr(&graph.attrs, "default_max_retry");
        let preset = string_attr(&graph.attrs, "retry_preset")
            .map(str::to_string)
            .unwrap_or_else(|| config.retry_preset.clone());
        let policy = RetryPolicy::build(&preset, node_override, graph_default);

        let outcome = execute_with_retry(
            || handler.execute(node, context, graph, logs_root, executor),
            &policy,
            &node.id,
            context,
            node.allow_partial,
        )
        .await;

        if outcome.status == StageStatus::Fail {
            self.events.emit(PipelineEvent::new(
                EventKind::StageFailed,
                config.pipeline_id.clone(),
                event_data! { "node_id" => node.id.clone(), "reason" => outcome.failure_reason.clone().unwrap_or_default() },
            ));
        }

        Ok(outcome)
    }

    // -----------------------------------------------------------------
    // NodeExecutor construction — lets `parallel`/`stack.manager_loop`
    // handlers re-enter dispatch for a branch without re-entering the whole
    // run loop (checkpointing, edge-level loop-restart, etc. stay owned by
    // the top-level loop; a branch just walks a chain of nodes to its end).
    // -----------------------------------------------------------------

    fn build_executor<'a>(
        &'a self,
        context: &'a Context,
        graph: &'a PipelineGraph,
        logs_root: &'a Path,
    ) -> Box<dyn Fn(&str) -> NodeExecutorFuture<'a> + Send + Sync + 'a> {
        Box::new(move |start_id: &str| {
            let start_id = start_id.to_string();
            self.run_branch(start_id, context, graph, logs_root)
        })
    }

    /// Walk a linear chain of nodes starting at `start_id`, applying each
    /// node's context updates and re-selecting edges after every step. Stops
    /// on a FAIL outcome, on reaching a `parallel.fan_in` node (without
    /// executing it — convergence is the fan-out/fan-in pair's job), or when
    /// there's no further outgoing edge. Does not recurse into nested
    /// `parallel`/`stack.manager_loop` branches.
    fn run_branch<'a>(
        &'a self,
        start_id: String,
        context: &'a Context,
        graph: &'a PipelineGraph,
        logs_root: &'a Path,
    ) -> NodeExecutorFuture<'a> {
        Box::pin(async move {
            let mut node = graph
                .node(&start_id)
                .ok_or_else(|| AttractorError::Other(format!("branch target '{start_id}' not found")))?;

            loop {
                let handler_type = self.registry.resolve_type(node);
                if handler_type == "parallel.fan_in" {
                    return Ok(Outcome::success("reached fan-in"));
                }
                let handler = self
                    .registry
                    .get(&handler_type)
                    .ok_or_else(|| AttractorError::HandlerError {
                        handler: handler_type.clone(),
                        node: node.id.clone(),
                        message: format!("no handler registered for type '{handler_type}'"),
                    })?;

                let outcome = handler.execute(node, context, graph, logs_root, None).await?;
                context.apply_updates(outcome.context_updates.clone()).await;
                context.set("outcome", status_to_string(outcome.status)).await;
                if let Some(ref label) = outcome.preferred_label {
                    if !label.is_empty() {
                        context.set("preferred_label", label.clone()).await;
                    }
                }
                if outcome.status == StageStatus::Fail {
                    return Ok(outcome);
                }

                let snapshot = context.snapshot().await;
                let resolve = move |key: &str| snapshot.get(key).cloned().unwrap_or_default();
                match select_edge(&node.id, &outcome, &resolve, graph) {
                    Some(edge) => match graph.node(&edge.to) {
                        Some(next) => node = next,
                        None => {
                            return Ok(Outcome::fail(format!(
                                "branch edge target '{}' not found",
                                edge.to
                            )))
                        }
                    },
                    None => return Ok(outcome),
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

struct RunState {
    current_id: String,
    /// The edge traversed to reach `current_id`, if any (`None` at the start
    /// node and after a goal-gate retry or loop restart jump).
    incoming_edge: Option<PipelineEdge>,
    completed_nodes: Vec<String>,
    node_outcomes: HashMap<String, Outcome>,
    node_retries: HashMap<String, usize>,
    restart_count: usize,
    degrade_next_fidelity: bool,
    logs_root: PathBuf,
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn is_terminal(node: &PipelineNode) -> bool {
    node.shape == "Msquare" || node.node_type.as_deref() == Some("exit")
}

fn status_to_string(status: StageStatus) -> String {
    match status {
        StageStatus::Success => "success",
        StageStatus::PartialSuccess => "partial_success",
        StageStatus::Retry => "retry",
        StageStatus::Fail => "fail",
        StageStatus::Skipped => "skipped",
    }
    .to_string()
}

fn parse_status(s: &str) -> StageStatus {
    match s {
        "partial_success" => StageStatus::PartialSuccess,
        "retry" => StageStatus::Retry,
        "fail" => StageStatus::Fail,
        "skipped" => StageStatus::Skipped,
        _ => StageStatus::Success,
    }
}

fn string_attr<'a>(attrs: &'a HashMap<String, AttributeValue>, key: &str) -> Option<&'a str> {
    match attrs.get(key) {
        Some(AttributeValue::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn int_attr(attrs: &HashMap<String, AttributeValue>, key: &str) -> Option<usize> {
    match attrs.get(key) {
        Some(AttributeValue::Integer(i)) if *i >= 0 => Some(*i as usize),
        _ => None,
    }
}

fn attr_to_string(value: &AttributeValue) -> String {
    match value {
        AttributeValue::String(s) => s.clone(),
        AttributeValue::Integer(i) => i.to_string(),
        AttributeValue::Float(f) => f.to_string(),
        AttributeValue::Boolean(b) => b.to_string(),
        AttributeValue::Duration(d) => d.as_millis().to_string(),
    }
}

async fn mirror_graph_attrs(graph: &PipelineGraph, context: &Context) {
    for (key, value) in &graph.attrs {
        context.set(key.clone(), attr_to_string(value)).await;
    }
}

/// Write `${logs_root}/manifest.json` describing this run. Best-effort.
async fn write_manifest(graph: &PipelineGraph, config: &PipelineConfig) {
    let manifest = serde_json::json!({
        "graphName": graph.name,
        "goal": graph.goal,
        "startedAt": chrono::Utc::now().to_rfc3339(),
        "pipelineId": config.pipeline_id,
    });
    if let Ok(json) = serde_json::to_string_pretty(&manifest) {
        if tokio::fs::create_dir_all(&config.logs_root).await.is_ok() {
            let _ = tokio::fs::write(config.logs_root.join("manifest.json"), json).await;
        }
    }
}

fn hook_command(node: &PipelineNode, graph: &PipelineGraph, key: &str) -> Option<String> {
    string_attr(&node.raw_attrs, key)
        .map(str::to_string)
        .or_else(|| string_attr(&graph.attrs, key).map(str::to_string))
}

/// Run a shell command with a timeout for the engine's `tool_hooks.pre`/`.post`,
/// grounded in the same subprocess pattern as the `tool` handler. Returns
/// `(succeeded, combined_stdout_and_stderr)`.
async fn run_hook(command: &str, workdir: Option<&str>, timeout: Duration) -> (bool, String) {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }

    let child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return (false, format!("failed to spawn hook: {e}")),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = if stderr.is_empty() {
                stdout.into_owned()
            } else {
                format!("{stdout}\n--- stderr ---\n{stderr}")
            };
            (output.status.success(), combined)
        }
        Ok(Err(e)) => (false, format!("hook execution failed: {e}")),
        Err(_) => (false, "hook timed out".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
