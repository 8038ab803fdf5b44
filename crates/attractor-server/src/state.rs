//! Shared server state: the registry of in-flight and finished pipeline runs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use attractor_pipeline::{
    default_registry_with_interviewer, PipelineConfig, PipelineExecutor, PipelineGraph,
    PipelineResult, WebInterviewer,
};
use attractor_types::Context;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

const QUESTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Outcome of a tracked run, as seen by a poller.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Running,
    Finished(PipelineResult),
    Errored(String),
}

pub struct PipelineRun {
    pub id: String,
    pub interviewer: Arc<WebInterviewer>,
    pub cancel: CancellationToken,
    pub outcome: RwLock<RunOutcome>,
}

#[derive(Clone)]
pub struct AppState {
    pub runs: Arc<RwLock<HashMap<String, Arc<PipelineRun>>>>,
    pub logs_root: PathBuf,
}

impl AppState {
    pub fn new(logs_root: PathBuf) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            logs_root,
        }
    }

    /// Parse, validate, and launch a pipeline in the background. Returns the new run id.
    pub async fn launch(
        &self,
        dot: &str,
        workdir: Option<&str>,
        retry_preset: Option<&str>,
        dry_run: bool,
    ) -> attractor_types::Result<String> {
        let parsed = attractor_dot::parse(dot)?;
        let graph = PipelineGraph::from_dot(parsed)?;
        attractor_pipeline::validate_or_raise(&graph)?;

        let id = uuid::Uuid::new_v4().to_string();
        let context = Context::new();
        if let Some(dir) = workdir {
            context.set("workdir", dir.to_string()).await;
        }
        if dry_run {
            context.set("dry_run", "true").await;
        }

        let interviewer = Arc::new(WebInterviewer::new(QUESTION_TIMEOUT));
        let cancel = CancellationToken::new();
        let run = Arc::new(PipelineRun {
            id: id.clone(),
            interviewer: interviewer.clone(),
            cancel: cancel.clone(),
            outcome: RwLock::new(RunOutcome::Running),
        });

        self.runs.write().await.insert(id.clone(), run.clone());

        let config = PipelineConfig {
            logs_root: self.logs_root.join(&id),
            pipeline_id: id.clone(),
            retry_preset: retry_preset.unwrap_or("standard").to_string(),
        };

        tokio::spawn(async move {
            let registry = default_registry_with_interviewer(interviewer);
            let executor = PipelineExecutor::new(registry);
            let result = executor.run_with_config(&graph, context, config, cancel).await;
            let mut outcome = run.outcome.write().await;
            *outcome = match result {
                Ok(r) => RunOutcome::Finished(r),
                Err(e) => RunOutcome::Errored(e.to_string()),
            };
        });

        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<PipelineRun>> {
        self.runs.read().await.get(id).cloned()
    }
}
