//! HTTP route handlers for the pipeline control plane.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use attractor_pipeline::Answer;
use attractor_types::StageStatus;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    CancelResponse, ContextResponse, CreatePipelineRequest, CreatePipelineResponse,
    PipelineStatusResponse, QuestionOptionPayload, QuestionPayload, QuestionResponse,
    SubmitAnswerRequest,
};
use crate::state::{AppState, RunOutcome};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/pipelines", post(create_pipeline))
        .route("/pipelines/:id", get(get_pipeline))
        .route("/pipelines/:id/questions", get(get_question).post(submit_answer))
        .route("/pipelines/:id/context", get(get_context))
        .route("/pipelines/:id/cancel", post(cancel_pipeline))
        .with_state(state)
}

async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<CreatePipelineRequest>,
) -> ApiResult<(axum::http::StatusCode, Json<CreatePipelineResponse>)> {
    let id = state
        .launch(
            &req.dot,
            req.workdir.as_deref(),
            req.retry_preset.as_deref(),
            req.dry_run,
        )
        .await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreatePipelineResponse {
            id,
            status: "running".to_string(),
        }),
    ))
}

async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PipelineStatusResponse>> {
    let run = state
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no pipeline run '{id}'")))?;

    let outcome = run.outcome.read().await;
    let response = match &*outcome {
        RunOutcome::Running => PipelineStatusResponse {
            id: id.clone(),
            status: "running".to_string(),
            outcome: None,
            completed_nodes: Vec::new(),
            failure_reason: None,
        },
        RunOutcome::Finished(result) => {
            let status = match result.status {
                StageStatus::Fail if result.failure_reason.as_deref() == Some("cancelled") => {
                    "cancelled"
                }
                StageStatus::Fail => "failed",
                _ => "completed",
            };
            PipelineStatusResponse {
                id: id.clone(),
                status: status.to_string(),
                outcome: Some(status_label(result.status)),
                completed_nodes: result.completed_nodes.clone(),
                failure_reason: result.failure_reason.clone(),
            }
        }
        RunOutcome::Errored(message) => PipelineStatusResponse {
            id: id.clone(),
            status: "failed".to_string(),
            outcome: None,
            completed_nodes: Vec::new(),
            failure_reason: Some(message.clone()),
        },
    };
    Ok(Json(response))
}

async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<QuestionResponse>> {
    let run = state
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no pipeline run '{id}'")))?;

    let question = run.interviewer.pending_question().map(|q| QuestionPayload {
        text: q.text,
        node_id: q.node_id,
        options: q
            .options
            .into_iter()
            .map(|o| QuestionOptionPayload {
                key: o.key,
                label: o.label,
            })
            .collect(),
    });
    Ok(Json(QuestionResponse { question }))
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> ApiResult<axum::http::StatusCode> {
    let run = state
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no pipeline run '{id}'")))?;

    let Some(pending) = run.interviewer.pending_question() else {
        return Err(ApiError::NotFound(format!("no pending question for pipeline '{id}'")));
    };
    let selected_option = pending.options.into_iter().find(|o| o.key == req.value);

    run.interviewer
        .submit_answer(Answer {
            value: req.value,
            text: req.text,
            selected_option,
        })
        .map_err(ApiError::from)?;

    Ok(axum::http::StatusCode::OK)
}

async fn get_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ContextResponse>> {
    let run = state
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no pipeline run '{id}'")))?;

    let outcome = run.outcome.read().await;
    let context = match &*outcome {
        RunOutcome::Finished(result) => result.final_context.clone(),
        _ => Default::default(),
    };
    Ok(Json(ContextResponse { context }))
}

async fn cancel_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let run = state
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no pipeline run '{id}'")))?;

    run.cancel.cancel();
    Ok(Json(CancelResponse {
        status: "cancelled".to_string(),
    }))
}

fn status_label(status: StageStatus) -> String {
    match status {
        StageStatus::Success => "success",
        StageStatus::PartialSuccess => "partial_success",
        StageStatus::Retry => "retry",
        StageStatus::Fail => "fail",
        StageStatus::Skipped => "skipped",
    }
    .to_string()
}
