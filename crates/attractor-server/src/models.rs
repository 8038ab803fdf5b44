//! Request/response bodies for the HTTP control plane.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreatePipelineRequest {
    /// DOT source for the pipeline graph.
    pub dot: String,
    /// Working directory handed to tool/codergen handlers via the context.
    #[serde(default)]
    pub workdir: Option<String>,
    /// Retry preset name (`"standard"`, `"aggressive"`, `"patient"`, `"none"`).
    #[serde(default)]
    pub retry_preset: Option<String>,
    /// Skip LLM calls; handlers that support it short-circuit.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatePipelineResponse {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PipelineStatusResponse {
    pub id: String,
    pub status: String,
    pub outcome: Option<String>,
    #[serde(rename = "completedNodes")]
    pub completed_nodes: Vec<String>,
    #[serde(rename = "failureReason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub question: Option<QuestionPayload>,
}

#[derive(Debug, Serialize)]
pub struct QuestionPayload {
    pub text: String,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub options: Vec<QuestionOptionPayload>,
}

#[derive(Debug, Serialize)]
pub struct QuestionOptionPayload {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub value: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub context: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: String,
}
