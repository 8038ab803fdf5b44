//! WaitHumanHandler — pauses pipeline execution for human input.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use attractor_types::{Context, Outcome, Result, StageStatus};

use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::{NodeExecutor, NodeHandler};
use crate::interviewer::{Interviewer, Question, QuestionOption};

pub struct WaitHumanHandler {
    interviewer: Arc<dyn Interviewer>,
}

impl WaitHumanHandler {
    pub fn new(interviewer: Arc<dyn Interviewer>) -> Self {
        Self { interviewer }
    }
}

/// Parse a `[K] label` marker off an edge's label. `K` becomes the option
/// key; the remainder (trimmed) becomes the label. Edges without a marker
/// are indexed positionally by their insertion order.
fn option_from_edge(edge_label: Option<&str>, index: usize) -> QuestionOption {
    let marker = regex::Regex::new(r"^\[([^\]]+)\]\s*(.*)$").unwrap();
    let label = edge_label.unwrap_or("Continue");
    if let Some(caps) = marker.captures(label) {
        QuestionOption {
            key: caps[1].to_string(),
            label: caps[2].trim().to_string(),
            target_edge_index: Some(index),
        }
    } else {
        QuestionOption {
            key: index.to_string(),
            label: label.to_string(),
            target_edge_index: Some(index),
        }
    }
}

#[async_trait]
impl NodeHandler for WaitHumanHandler {
    fn handler_type(&self) -> &str {
        "wait.human"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        context: &Context,
        graph: &PipelineGraph,
        _logs_root: &Path,
        _executor: Option<&NodeExecutor<'_>>,
    ) -> Result<Outcome> {
        let edges = graph.outgoing_edges(&node.id);
        let options: Vec<QuestionOption> = if edges.is_empty() {
            vec![option_from_edge(None, 0)]
        } else {
            edges
                .iter()
                .enumerate()
                .map(|(i, e)| option_from_edge(e.label.as_deref(), i))
                .collect()
        };

        let text = node.prompt.clone().unwrap_or_else(|| node.label.clone());

        let question = Question {
            text,
            options,
            node_id: node.id.clone(),
        };

        let answer = self.interviewer.ask(&question).await?;

        context.set("human.gate.selected", answer.value.clone()).await;
        if let Some(ref text) = answer.text {
            context.set("preferred_label", text.clone()).await;
        }

        let mut context_updates = HashMap::new();
        context_updates.insert("human.gate.selected".to_string(), answer.value.clone());

        Ok(Outcome {
            status: StageStatus::Success,
            preferred_label: answer.text.clone(),
            suggested_next_ids: vec![],
            context_updates,
            notes: "Human responded".into(),
            failure_reason: None,
        })
    }
}
