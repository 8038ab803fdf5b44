//! Shared types, errors, context, and outcome for the Attractor pipeline engine.
//!
//! This crate provides the foundational types used across all other Attractor crates:
//! - `AttractorError` — unified error taxonomy
//! - `Context` — thread-safe key-value store for pipeline state
//! - `Outcome` — result of executing a node handler
//! - `Checkpoint` — serializable snapshot for crash recovery

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified error type for all Attractor subsystems.
#[derive(Debug, thiserror::Error)]
pub enum AttractorError {
    // === LLM Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout {
        provider: String,
        timeout_ms: u64,
    },

    #[error("Context length exceeded for {provider}: {message}")]
    ContextLengthExceeded { provider: String, message: String },

    // === Parser Errors ===
    #[error("DOT parse error at line {line}, col {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
        source_snippet: Option<String>,
    },

    // === Pipeline Errors ===
    #[error("Pipeline validation failed: {0}")]
    ValidationError(String),

    #[error("Handler '{handler}' failed on node '{node}': {message}")]
    HandlerError {
        handler: String,
        node: String,
        message: String,
    },

    #[error("Goal gate unsatisfied: node '{node}' did not reach SUCCESS")]
    GoalGateUnsatisfied { node: String },

    #[error("No retry target for failed goal gate '{node}'")]
    NoRetryTarget { node: String },

    #[error("Max retries exhausted for node '{node}' after {attempts} attempts")]
    RetriesExhausted { node: String, attempts: usize },

    // === Tool Errors ===
    #[error("Tool '{tool}' error: {message}")]
    ToolError { tool: String, message: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    // === Agent Errors ===
    #[error("Agent loop detected after {window} consecutive identical tool calls")]
    LoopDetected { window: usize },

    #[error("Turn limit reached: {turns} turns")]
    TurnLimitReached { turns: usize },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AttractorError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttractorError::RateLimited { .. }
                | AttractorError::CommandTimeout { .. }
                | AttractorError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttractorError::AuthError { .. }
                | AttractorError::ValidationError(_)
                | AttractorError::ContextLengthExceeded { .. }
        )
    }

    /// Maps the error to an HTTP status code for server mode.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AttractorError::RateLimited { .. } => Some(429),
            AttractorError::AuthError { .. } => Some(401),
            AttractorError::ProviderError { status, .. } => Some(*status),
            AttractorError::RequestTimeout { .. } | AttractorError::CommandTimeout { .. } => {
                Some(504)
            }
            AttractorError::ValidationError(_) => Some(400),
            AttractorError::ContextLengthExceeded { .. } => Some(413),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, AttractorError>`.
pub type Result<T> = std::result::Result<T, AttractorError>;

// ---------------------------------------------------------------------------
// Context — thread-safe key-value store for pipeline state
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe flat string-to-string key-value store shared across pipeline nodes.
///
/// All values are stored as strings; numeric/boolean typing is conventional on
/// read — callers parse what they expect. Cloning a `Context` yields another
/// handle to the **same** inner state. Use
/// [`clone_isolated`](Context::clone_isolated) to get a deep copy for parallel
/// branch isolation.
#[derive(Clone)]
pub struct Context {
    inner: Arc<tokio::sync::RwLock<ContextInner>>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ContextInner {
    values: HashMap<String, String>,
    logs: Vec<String>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(ContextInner {
                values: HashMap::new(),
                logs: Vec::new(),
            })),
        }
    }

    /// Insert or overwrite a key.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().await.values.insert(key.into(), value.into());
    }

    /// Read a value by key (cloned).
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.values.get(key).cloned()
    }

    /// Convenience accessor that falls back to `default` when the key is absent.
    pub async fn get_string(&self, key: &str, default: &str) -> String {
        self.inner
            .read()
            .await
            .values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_owned())
    }

    /// Whether a key is present.
    pub async fn has(&self, key: &str) -> bool {
        self.inner.read().await.values.contains_key(key)
    }

    /// Append a free-form log entry.
    pub async fn append_log(&self, entry: impl Into<String>) {
        self.inner.write().await.logs.push(entry.into());
    }

    /// Return the append-only log buffer.
    pub async fn logs(&self) -> Vec<String> {
        self.inner.read().await.logs.clone()
    }

    /// Shallow copy of the current values map.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().await.values.clone()
    }

    /// Deep copy that is fully independent of the original context.
    pub async fn clone_isolated(&self) -> Context {
        let guard = self.inner.read().await;
        Context {
            inner: Arc::new(tokio::sync::RwLock::new(guard.clone())),
        }
    }

    /// Merge `updates` into the context (last-writer-wins bulk merge).
    /// Existing keys not present in `updates` are preserved.
    pub async fn apply_updates(&self, updates: HashMap<String, String>) {
        let mut guard = self.inner.write().await;
        guard.values.extend(updates);
    }

    /// Drop every key, leaving the append-only log intact. Used by loop-restart
    /// to rebuild context from scratch without losing run history.
    pub async fn clear(&self) {
        self.inner.write().await.values.clear();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StageStatus — outcome status of a pipeline node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    PartialSuccess,
    Retry,
    Fail,
    Skipped,
}

// ---------------------------------------------------------------------------
// Outcome — result of executing a node handler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: StageStatus,
    pub preferred_label: Option<String>,
    pub suggested_next_ids: Vec<String>,
    pub context_updates: HashMap<String, String>,
    pub notes: String,
    pub failure_reason: Option<String>,
}

impl Outcome {
    /// Create a successful outcome with the given notes.
    pub fn success(notes: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Success,
            preferred_label: None,
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: notes.into(),
            failure_reason: None,
        }
    }

    /// Create a failed outcome with the given reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: StageStatus::Fail,
            preferred_label: None,
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: String::new(),
            failure_reason: Some(reason),
        }
    }

    /// Create an outcome with a specific status and preferred label.
    pub fn with_label(status: StageStatus, label: impl Into<String>) -> Self {
        Self {
            status,
            preferred_label: Some(label.into()),
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: String::new(),
            failure_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint — serializable snapshot for crash recovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub current_node: String,
    pub completed_nodes: Vec<String>,
    pub node_retries: HashMap<String, usize>,
    /// Full outcome per completed node. Older checkpoints predating this field
    /// deserialize it as empty via `#[serde(default)]` (back-fill on load).
    #[serde(default)]
    pub node_outcomes: HashMap<String, Outcome>,
    pub context_values: HashMap<String, String>,
    pub logs: Vec<String>,
}

impl Checkpoint {
    /// Serialize this checkpoint to JSON and write it to `path` via an atomic
    /// replace (write to a sibling temp file, then rename over the target).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Read a checkpoint from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let checkpoint: Self = serde_json::from_str(&data)?;
        Ok(checkpoint)
    }
}

// ---------------------------------------------------------------------------
// FidelityMode — controls output fidelity/compression level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FidelityMode {
    Full,
    Truncate,
    Compact,
    SummaryLow,
    SummaryMedium,
    SummaryHigh,
}
