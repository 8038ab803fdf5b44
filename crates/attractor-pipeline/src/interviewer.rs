//! Interviewer trait and built-in implementations for human interaction.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use attractor_types::{AttractorError, Result};

/// A single option a human can pick, derived from one outgoing edge of a
/// wait-for-human node.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOption {
    pub key: String,
    pub label: String,
    pub target_edge_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Question {
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub node_id: String,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub value: String,
    pub text: Option<String>,
    pub selected_option: Option<QuestionOption>,
}

#[async_trait]
pub trait Interviewer: Send + Sync {
    async fn ask(&self, question: &Question) -> Result<Answer>;
}

// ---------------------------------------------------------------------------
// QueueInterviewer — pre-loaded FIFO of answers, errors when exhausted
// ---------------------------------------------------------------------------

pub struct QueueInterviewer {
    answers: Mutex<VecDeque<Answer>>,
}

impl QueueInterviewer {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Interviewer for QueueInterviewer {
    async fn ask(&self, _question: &Question) -> Result<Answer> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AttractorError::Other("queue interviewer has no queued answers left".into()))
    }
}

// ---------------------------------------------------------------------------
// AutoApproveInterviewer
// ---------------------------------------------------------------------------

pub struct AutoApproveInterviewer {
    default_key: Option<String>,
}

impl AutoApproveInterviewer {
    pub fn new() -> Self {
        Self { default_key: None }
    }

    pub fn with_default(key: impl Into<String>) -> Self {
        Self {
            default_key: Some(key.into()),
        }
    }
}

impl Default for AutoApproveInterviewer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interviewer for AutoApproveInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        let chosen = match &self.default_key {
            Some(key) => question
                .options
                .iter()
                .find(|o| &o.key == key)
                .or_else(|| question.options.first()),
            None => question.options.first(),
        };
        Ok(match chosen {
            Some(opt) => Answer {
                value: opt.key.clone(),
                text: Some(opt.label.clone()),
                selected_option: Some(opt.clone()),
            },
            None => Answer {
                value: String::new(),
                text: None,
                selected_option: None,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// CallbackInterviewer — hands the question to an embedding host
// ---------------------------------------------------------------------------

pub type AskFuture = Pin<Box<dyn Future<Output = Result<Answer>> + Send>>;

pub struct CallbackInterviewer {
    callback: Box<dyn Fn(Question) -> AskFuture + Send + Sync>,
}

impl CallbackInterviewer {
    pub fn new(callback: impl Fn(Question) -> AskFuture + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Interviewer for CallbackInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        (self.callback)(question.clone()).await
    }
}

// ---------------------------------------------------------------------------
// RecordingInterviewer — pass-through wrapper that records question/answer pairs
// ---------------------------------------------------------------------------

pub struct RecordingInterviewer {
    inner: Arc<dyn Interviewer>,
    pairs: Mutex<Vec<(Question, Answer)>>,
}

impl RecordingInterviewer {
    pub fn new(inner: Arc<dyn Interviewer>) -> Self {
        Self {
            inner,
            pairs: Mutex::new(Vec::new()),
        }
    }

    pub fn pairs(&self) -> Vec<(Question, Answer)> {
        self.pairs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Interviewer for RecordingInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        let answer = self.inner.ask(question).await?;
        self.pairs.lock().unwrap().push((question.clone(), answer.clone()));
        Ok(answer)
    }
}

// ---------------------------------------------------------------------------
// WebInterviewer — single-slot rendezvous; a remote POST fills the slot
// ---------------------------------------------------------------------------

pub struct WebInterviewer {
    timeout: Duration,
    slot: Mutex<Option<(Question, tokio::sync::oneshot::Sender<Answer>)>>,
}

impl WebInterviewer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            slot: Mutex::new(None),
        }
    }

    /// The question currently awaiting an answer, if any — for a web UI to render.
    pub fn pending_question(&self) -> Option<Question> {
        self.slot.lock().unwrap().as_ref().map(|(q, _)| q.clone())
    }

    /// Fill the slot from an external caller (e.g. an HTTP handler). Errors if
    /// there is no pending question or the waiter already gave up.
    pub fn submit_answer(&self, answer: Answer) -> Result<()> {
        let occupant = self.slot.lock().unwrap().take();
        match occupant {
            Some((_, tx)) => tx
                .send(answer)
                .map_err(|_| AttractorError::Other("web interviewer's waiter is gone".into())),
            None => Err(AttractorError::Other("no pending question to answer".into())),
        }
    }
}

#[async_trait]
impl Interviewer for WebInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        let rx = {
            let mut slot = self.slot.lock().unwrap();
            if slot.is_some() {
                return Err(AttractorError::Other(
                    "web interviewer already has a question pending".into(),
                ));
            }
            let (tx, rx) = tokio::sync::oneshot::channel();
            *slot = Some((question.clone(), tx));
            rx
        };

        let result = tokio::time::timeout(self.timeout, rx).await;
        self.slot.lock().unwrap().take();
        match result {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(AttractorError::Other("web interviewer's sender was dropped".into())),
            Err(_) => Err(AttractorError::Other("timed out waiting for a web answer".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// ConsoleInterviewer — interactive stdin prompt
// ---------------------------------------------------------------------------

pub struct ConsoleInterviewer;

#[async_trait]
impl Interviewer for ConsoleInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        println!("\n{}", question.text);
        for opt in &question.options {
            println!("  [{}] {}", opt.key, opt.label);
        }
        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(AttractorError::Io)?;
        let trimmed = input.trim();
        if let Some(opt) = question.options.iter().find(|o| o.key == trimmed) {
            return Ok(Answer {
                value: opt.key.clone(),
                text: Some(opt.label.clone()),
                selected_option: Some(opt.clone()),
            });
        }
        Ok(Answer {
            value: trimmed.to_string(),
            text: Some(trimmed.to_string()),
            selected_option: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
