//! Codergen handler — runs a node's prompt against an LLM and records the reply.
//!
//! This is the default handler for `box`-shaped nodes (and for `diamond` nodes
//! that carry a prompt, since evaluating one requires a model call). The
//! prompt has already been variable-expanded and had any `@path` references
//! inlined by the time it reaches this handler.

use std::path::Path;

use async_trait::async_trait;

use attractor_llm::{AnthropicAdapter, GeminiAdapter, LlmClient, Message, OpenAiAdapter, ReasoningEffort, Request};
use attractor_types::{Context, Outcome, Result};

use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::{NodeExecutor, NodeHandler};

pub struct CodergenHandler;

impl CodergenHandler {
    /// Build a client with every provider whose API key is present in the
    /// environment. Missing keys just mean that provider is skipped; the
    /// request still succeeds as long as at least one provider (or an
    /// explicit `request.provider`/model match) resolves.
    fn build_client() -> LlmClient {
        let mut client = LlmClient::new();
        if let Ok(adapter) = AnthropicAdapter::from_env() {
            client.register_provider(adapter);
        }
        if let Ok(adapter) = OpenAiAdapter::from_env() {
            client.register_provider(adapter);
        }
        if let Ok(adapter) = GeminiAdapter::from_env() {
            client.register_provider(adapter);
        }
        client
    }
}

fn parse_reasoning_effort(effort: &str) -> Option<ReasoningEffort> {
    match effort {
        "low" => Some(ReasoningEffort::Low),
        "medium" => Some(ReasoningEffort::Medium),
        "high" => Some(ReasoningEffort::High),
        _ => None,
    }
}

#[async_trait]
impl NodeHandler for CodergenHandler {
    fn handler_type(&self) -> &str {
        "codergen"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        _context: &Context,
        _graph: &PipelineGraph,
        _logs_root: &Path,
        _executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        let mut context_updates = std::collections::HashMap::new();
        context_updates.insert(format!("{}.prompt", node.id), node.prompt.clone().unwrap_or_default());

        let Some(prompt) = node.prompt.as_ref().filter(|p| !p.is_empty()) else {
            context_updates.insert(format!("{}.completed", node.id), "true".to_string());
            return Ok(Outcome {
                context_updates,
                ..Outcome::success("no prompt configured, pass-through")
            });
        };

        let client = Self::build_client();
        let model = node
            .llm_model
            .clone()
            .unwrap_or_else(|| "claude-sonnet-4-5-20250929".to_string());

        let request = Request {
            model,
            messages: vec![Message::user(prompt.clone())],
            tools: Vec::new(),
            tool_choice: None,
            max_tokens: None,
            temperature: None,
            stop_sequences: Vec::new(),
            reasoning_effort: node
                .reasoning_effort
                .as_deref()
                .and_then(parse_reasoning_effort),
            provider: node.llm_provider.clone(),
            provider_options: None,
        };

        match client.complete(&request).await {
            Ok(response) => {
                context_updates.insert(format!("{}.response", node.id), response.text.clone());
                context_updates.insert(format!("{}.completed", node.id), "true".to_string());
                Ok(Outcome {
                    context_updates,
                    ..Outcome::success(response.text)
                })
            }
            Err(e) => {
                context_updates.insert(format!("{}.completed", node.id), "false".to_string());
                Ok(Outcome {
                    context_updates,
                    ..Outcome::fail(e.to_string())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{make_minimal_graph, make_node};

    #[tokio::test]
    async fn empty_prompt_is_a_pass_through_success() {
        let handler = CodergenHandler;
        let node = make_node("n", "box", None, Default::default());
        let ctx = Context::new();
        let graph = make_minimal_graph();
        let logs_root = std::env::temp_dir();
        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, attractor_types::StageStatus::Success);
        assert_eq!(outcome.context_updates.get("n.prompt"), Some(&"".to_string()));
        assert_eq!(outcome.context_updates.get("n.completed"), Some(&"true".to_string()));
    }

    #[tokio::test]
    async fn records_prompt_in_context_updates_even_without_providers() {
        // With no API keys in the test environment, no providers register and
        // `complete` fails — but the `.prompt` context key must still be set
        // before the LLM call is attempted.
        let handler = CodergenHandler;
        let node = make_node("step", "box", Some("Generate code"), Default::default());
        let ctx = Context::new();
        let graph = make_minimal_graph();
        let logs_root = std::env::temp_dir();
        let outcome = handler
            .execute(&node, &ctx, &graph, &logs_root, None)
            .await
            .unwrap();
        assert_eq!(
            outcome.context_updates.get("step.prompt"),
            Some(&"Generate code".to_string())
        );
    }
}
