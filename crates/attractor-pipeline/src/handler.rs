//! Node handler trait, dynamic dispatch wrapper, and handler registry.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;

use attractor_types::{Context, Outcome, Result};

use crate::graph::{PipelineGraph, PipelineNode};

// ---------------------------------------------------------------------------
// NodeExecutor — callback a handler uses to run another node by id
// ---------------------------------------------------------------------------

/// Future returned by a [`NodeExecutor`] callback.
pub type NodeExecutorFuture<'a> = Pin<Box<dyn Future<Output = Result<Outcome>> + Send + 'a>>;

/// Callback handed to handlers (`parallel`, `stack.manager_loop`) that need to
/// drive other nodes of the same graph themselves, re-entering the engine's own
/// dispatch-and-retry machinery instead of calling a bare handler directly.
pub type NodeExecutor<'a> = dyn Fn(&str) -> NodeExecutorFuture<'a> + Send + Sync;

// ---------------------------------------------------------------------------
// NodeHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The handler type identifier (e.g. "start", "exit", "codergen").
    fn handler_type(&self) -> &str;

    /// Execute this handler for a given node.
    ///
    /// `logs_root` is the directory this run's artifacts are written under.
    /// `executor` is present when the caller supports re-entrant node
    /// execution (fan-out/fan-in and manager-loop handlers use it to run
    /// other nodes of the graph); handlers that don't need it can ignore it.
    async fn execute(
        &self,
        node: &PipelineNode,
        context: &Context,
        graph: &PipelineGraph,
        logs_root: &Path,
        executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome>;
}

// ---------------------------------------------------------------------------
// DynHandler — object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynHandler(Box<dyn NodeHandler>);

impl DynHandler {
    pub fn new(handler: impl NodeHandler + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub fn handler_type(&self) -> &str {
        self.0.handler_type()
    }

    pub async fn execute(
        &self,
        node: &PipelineNode,
        context: &Context,
        graph: &PipelineGraph,
        logs_root: &Path,
        executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        self.0.execute(node, context, graph, logs_root, executor).await
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

pub struct HandlerRegistry {
    handlers: HashMap<String, DynHandler>,
    shape_to_type: HashMap<String, String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut shape_to_type = HashMap::new();
        shape_to_type.insert("Mdiamond".into(), "start".into());
        shape_to_type.insert("Msquare".into(), "exit".into());
        shape_to_type.insert("box".into(), "codergen".into());
        shape_to_type.insert("hexagon".into(), "wait.human".into());
        shape_to_type.insert("diamond".into(), "conditional".into());
        shape_to_type.insert("component".into(), "parallel".into());
        shape_to_type.insert("tripleoctagon".into(), "parallel.fan_in".into());
        shape_to_type.insert("parallelogram".into(), "tool".into());
        shape_to_type.insert("house".into(), "stack.manager_loop".into());

        Self {
            handlers: HashMap::new(),
            shape_to_type,
        }
    }

    pub fn register(&mut self, handler: impl NodeHandler + 'static) {
        let t = handler.handler_type().to_string();
        self.handlers.insert(t, DynHandler::new(handler));
    }

    /// Resolve a node to its handler type using 3-step priority:
    /// 1. Explicit `type` attribute on the node
    /// 2. Shape-based mapping
    /// 3. Default: `"codergen"`
    ///
    /// Special case: conditional nodes with a prompt are routed to `"codergen"`
    /// so the prompt actually gets executed via Claude. The `ConditionalHandler`
    /// is a pass-through for pure routing nodes with no prompt.
    pub fn resolve_type(&self, node: &PipelineNode) -> String {
        if let Some(ref t) = node.node_type {
            if t == "conditional" && node.prompt.is_some() {
                return "codergen".to_string();
            }
            return t.clone();
        }
        if let Some(t) = self.shape_to_type.get(&node.shape) {
            if t == "conditional" && node.prompt.is_some() {
                return "codergen".to_string();
            }
            return t.clone();
        }
        "codergen".to_string()
    }

    pub fn get(&self, handler_type: &str) -> Option<&DynHandler> {
        self.handlers.get(handler_type)
    }

    pub fn has(&self, handler_type: &str) -> bool {
        self.handlers.contains_key(handler_type)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Built-in handlers
// ---------------------------------------------------------------------------

pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    fn handler_type(&self) -> &str {
        "start"
    }

    async fn execute(
        &self,
        _node: &PipelineNode,
        _ctx: &Context,
        _graph: &PipelineGraph,
        _logs_root: &Path,
        _executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        Ok(Outcome::success("Pipeline started"))
    }
}

pub struct ExitHandler;

#[async_trait]
impl NodeHandler for ExitHandler {
    fn handler_type(&self) -> &str {
        "exit"
    }

    async fn execute(
        &self,
        _node: &PipelineNode,
        _ctx: &Context,
        _graph: &PipelineGraph,
        _logs_root: &Path,
        _executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        Ok(Outcome::success("Pipeline completed"))
    }
}

pub struct ConditionalHandler;

#[async_trait]
impl NodeHandler for ConditionalHandler {
    fn handler_type(&self) -> &str {
        "conditional"
    }

    async fn execute(
        &self,
        _node: &PipelineNode,
        _ctx: &Context,
        _graph: &PipelineGraph,
        _logs_root: &Path,
        _executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        Ok(Outcome::success("Conditional pass-through"))
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

pub fn default_registry() -> HandlerRegistry {
    let mut reg = HandlerRegistry::new();
    reg.register(StartHandler);
    reg.register(ExitHandler);
    reg.register(ConditionalHandler);
    reg.register(crate::handlers::ToolHandler);
    reg.register(crate::handlers::CodergenHandler);
    reg.register(crate::handlers::ParallelHandler);
    reg.register(crate::handlers::FanInHandler);
    reg.register(crate::handlers::ManagerLoopHandler);
    reg
}

/// Create the default handler registry with WaitHumanHandler registered.
///
/// This factory function creates a registry with all the standard handlers
/// plus WaitHumanHandler configured with the provided interviewer.
/// Use this when you need to support hexagon (human review) nodes in pipelines.
pub fn default_registry_with_interviewer(
    interviewer: std::sync::Arc<dyn crate::interviewer::Interviewer>,
) -> HandlerRegistry {
    let mut reg = default_registry();
    reg.register(crate::handlers::wait_human::WaitHumanHandler::new(interviewer));
    reg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
